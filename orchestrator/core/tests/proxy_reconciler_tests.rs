// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{FakeEngine, Harness};
use devstack_core::application::{ProxyAction, ProxyContainerState};
use devstack_core::domain::instance::GlobalField;
use devstack_core::infrastructure::ConflictResolution;

fn register_proxied(h: &Harness, prefix: &str, host: Option<&str>, port: Option<u16>) {
    let dir = h.write_recipe(prefix, prefix, host);
    h.service
        .register(&Harness::recipe_path(&dir), None, ConflictResolution::Abort)
        .expect("register");
    h.registry.set_proxy_port(prefix, port).expect("set port");
}

fn enable(h: &Harness) {
    h.registry
        .set_global_field(GlobalField::ProxyModeEnabled(true))
        .unwrap();
}

#[tokio::test]
async fn test_regenerate_routes_proxied_instances_only() {
    let h = Harness::new(FakeEngine::default());
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));
    register_proxied(&h, "bar", Some("bar.test"), None);
    register_proxied(&h, "nohost", None, Some(8124));

    let report = h.service.proxy().regenerate_config().expect("regenerate");

    assert_eq!(report.routes.len(), 1);
    assert_eq!(report.routes[0].hostname, "foo.test");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name_prefix, "nohost");

    let config = std::fs::read_to_string(h.paths.proxy_config_file()).unwrap();
    assert!(config.contains("server_name foo.test;"));
    assert!(config.contains("host.docker.internal:8123"));
    assert!(!config.contains("bar.test"));
    assert!(config.contains("return 444;"));
    // Files only; live routing is untouched
    assert!(h.engine.mutations().is_empty());
}

#[tokio::test]
async fn test_regenerate_skips_unloadable_recipe() {
    let h = Harness::new(FakeEngine::default());
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));
    register_proxied(&h, "broken", Some("broken.test"), Some(8124));
    std::fs::write(h.dir.path().join("broken").join("devstack.yml"), "name_prefix: [unclosed").unwrap();

    let report = h.service.proxy().regenerate_config().expect("regenerate");

    assert_eq!(report.routes.len(), 1);
    assert_eq!(report.skipped[0].name_prefix, "broken");
    let config = std::fs::read_to_string(report.path).unwrap();
    assert!(config.contains("foo.test"));
    assert!(!config.contains("broken.test"));
}

#[tokio::test]
async fn test_regenerate_skips_host_that_is_not_a_server_name() {
    let h = Harness::new(FakeEngine::default());
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));
    register_proxied(&h, "evil", Some("evil.test; return 200"), Some(8124));

    let report = h.service.proxy().regenerate_config().expect("regenerate");

    assert_eq!(report.routes.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name_prefix, "evil");
    assert!(report.skipped[0].reason.contains("not a valid server name"));
    let config = std::fs::read_to_string(report.path).unwrap();
    assert!(config.contains("server_name foo.test;"));
    assert!(!config.contains("evil.test"));
}

#[tokio::test]
async fn test_regenerate_with_empty_registry_keeps_catch_all() {
    let h = Harness::new(FakeEngine::default());

    let report = h.service.proxy().regenerate_config().expect("regenerate");

    assert!(report.routes.is_empty());
    let config = std::fs::read_to_string(report.path).unwrap();
    assert!(config.contains("default_server"));
    assert!(!config.contains("upstream"));
}

#[tokio::test]
async fn test_ensure_running_when_disabled_touches_nothing() {
    let h = Harness::new(FakeEngine::default());

    let action = h.service.proxy().ensure_running().await.expect("ensure");

    assert_eq!(action, ProxyAction::Disabled);
    assert!(h.engine.calls().is_empty());
    assert!(!h.paths.proxy_config_file().exists());
}

#[tokio::test]
async fn test_ensure_running_creates_absent_proxy() {
    let h = Harness::new(FakeEngine::default());
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));
    enable(&h);

    let action = h.service.proxy().ensure_running().await.expect("ensure");

    assert_eq!(action, ProxyAction::Created);
    assert!(h.paths.proxy_config_file().exists());
    let proxy = h.engine.container("devstack-proxy").expect("proxy container");
    assert!(proxy.running);
    assert_eq!(proxy.image, "nginx:alpine");
    assert_eq!(proxy.host_ports, vec![80]);
}

#[tokio::test]
async fn test_ensure_running_is_idempotent() {
    let h = Harness::new(FakeEngine::default().with_container("devstack-proxy", true));
    enable(&h);

    let action = h.service.proxy().ensure_running().await.expect("ensure");

    assert_eq!(action, ProxyAction::AlreadyRunning);
    assert!(h.engine.mutations().is_empty());
}

#[tokio::test]
async fn test_ensure_running_starts_stopped_proxy() {
    let h = Harness::new(FakeEngine::default().with_container("devstack-proxy", false));
    enable(&h);

    let action = h.service.proxy().ensure_running().await.expect("ensure");

    assert_eq!(action, ProxyAction::Started);
    assert_eq!(h.engine.mutations(), vec!["start devstack-proxy"]);
}

#[tokio::test]
async fn test_apply_and_restart_restarts_existing_proxy() {
    let h = Harness::new(FakeEngine::default().with_container("devstack-proxy", true));
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));

    let (report, action) = h.service.proxy().apply_and_restart().await.expect("apply");

    assert_eq!(action, ProxyAction::Restarted);
    assert_eq!(report.routes.len(), 1);
    assert_eq!(h.engine.mutations(), vec!["restart devstack-proxy"]);
}

#[tokio::test]
async fn test_enable_then_disable() {
    let h = Harness::new(FakeEngine::default());
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));

    let (_, action) = h.service.proxy().enable().await.expect("enable");
    assert_eq!(action, ProxyAction::Created);
    assert!(h.registry.get_global().unwrap().proxy_mode_enabled);

    let action = h.service.proxy().disable().await.expect("disable");
    assert_eq!(action, ProxyAction::Stopped);
    assert!(!h.registry.get_global().unwrap().proxy_mode_enabled);
    assert!(!h.engine.container("devstack-proxy").unwrap().running);

    // Second disable finds nothing running
    assert_eq!(h.service.proxy().disable().await.unwrap(), ProxyAction::Disabled);
}

#[tokio::test]
async fn test_status_reports_state_and_routes() {
    let h = Harness::new(FakeEngine::default().with_container("devstack-proxy", false));
    register_proxied(&h, "foo", Some("foo.test"), Some(8123));

    let status = h.service.proxy().status().await.expect("status");

    assert!(!status.enabled);
    assert_eq!(status.container, ProxyContainerState::Stopped);
    assert_eq!(status.routes.len(), 1);
    assert!(status.skipped.is_empty());
}

#[tokio::test]
async fn test_assign_port_reloads_enabled_proxy() {
    let h = Harness::new(FakeEngine::default().with_container("devstack-proxy", true));
    let dir = h.write_recipe("foo", "foo", Some("foo.test"));
    h.service
        .register(&Harness::recipe_path(&dir), None, ConflictResolution::Abort)
        .unwrap();
    enable(&h);

    let port = h.service.assign_proxy_port("foo").await.expect("assign");

    assert_eq!(port, 8100);
    assert_eq!(h.engine.mutations(), vec!["restart devstack-proxy"]);
    let config = std::fs::read_to_string(h.paths.proxy_config_file()).unwrap();
    assert!(config.contains("host.docker.internal:8100"));
}
