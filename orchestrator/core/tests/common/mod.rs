// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use devstack_core::application::LifecycleService;
use devstack_core::domain::engine::{
    ContainerEngine, ContainerRecord, ContainerSpec, EngineError, NetworkRecord, VolumeRecord,
};
use devstack_core::domain::settings::{Paths, Settings};
use devstack_core::infrastructure::{InstanceRegistry, YamlRecipeLoader};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: String,
    pub image: String,
    pub running: bool,
    pub host_ports: Vec<u16>,
}

#[derive(Default)]
struct EngineState {
    containers: Vec<FakeContainer>,
    volumes: Vec<String>,
    networks: Vec<String>,
    calls: Vec<String>,
    failing: HashSet<String>,
    unavailable: bool,
}

/// In-memory container engine that records every call
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeContainer {
    /// `name` may be comma-joined like a real `NAMES` cell
    fn answers_to(&self, name: &str) -> bool {
        self.name.split(',').any(|n| n == name)
    }
}

const MUTATING: &[&str] = &["start ", "stop ", "restart ", "rm ", "run ", "volume rm ", "network rm ", "exec "];

impl FakeEngine {
    pub fn with_container(self, name: &str, running: bool) -> Self {
        self.state.lock().containers.push(FakeContainer {
            name: name.to_string(),
            image: "demo-image".to_string(),
            running,
            host_ports: Vec::new(),
        });
        self
    }

    pub fn with_published_port(self, name: &str, port: u16) -> Self {
        self.state.lock().containers.push(FakeContainer {
            name: name.to_string(),
            image: "demo-image".to_string(),
            running: true,
            host_ports: vec![port],
        });
        self
    }

    pub fn with_volume(self, name: &str) -> Self {
        self.state.lock().volumes.push(name.to_string());
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.state.lock().networks.push(name.to_string());
        self
    }

    /// A volume that appears after construction, e.g. between plan and execute
    pub fn add_volume(&self, name: &str) {
        self.state.lock().volumes.push(name.to_string());
    }

    /// Make the call with this exact key fail, e.g. `"start demo-app"`
    pub fn failing(self, call: &str) -> Self {
        self.state.lock().failing.insert(call.to_string());
        self
    }

    /// Every query fails as if the engine daemon were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.starts_with(m)))
            .collect()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().containers.iter().find(|c| c.answers_to(name)).cloned()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state.lock().volumes.clone()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.lock().networks.clone()
    }

    pub fn stop_externally(&self, name: &str) {
        if let Some(c) = self.state.lock().containers.iter_mut().find(|c| c.answers_to(name)) {
            c.running = false;
        }
    }

    fn record(&self, call: String) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        if state.failing.contains(&call) {
            return Err(EngineError::EngineExecFailed {
                command: format!("docker {}", call),
                exit_code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn query(&self, call: String) -> Result<(), EngineError> {
        let unavailable = self.state.lock().unavailable;
        self.record(call.clone())?;
        if unavailable {
            return Err(EngineError::EngineQueryFailed {
                command: format!("docker {}", call),
                exit_code: Some(1),
                stderr: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        Ok(())
    }

    fn missing(call: &str) -> EngineError {
        EngineError::EngineExecFailed {
            command: format!("docker {}", call),
            exit_code: Some(1),
            stderr: "No such container".to_string(),
        }
    }

    fn set_running(&self, call: String, name: &str, running: bool) -> Result<(), EngineError> {
        self.record(call.clone())?;
        let mut state = self.state.lock();
        match state.containers.iter_mut().find(|c| c.answers_to(name)) {
            Some(c) => {
                c.running = running;
                Ok(())
            }
            None => Err(Self::missing(&call)),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, EngineError> {
        self.query(if include_stopped { "ps -a".into() } else { "ps".into() })?;
        Ok(self
            .state
            .lock()
            .containers
            .iter()
            .filter(|c| include_stopped || c.running)
            .map(|c| ContainerRecord {
                id: format!("id-{}", c.name),
                image: c.image.clone(),
                status: if c.running {
                    "Up 5 minutes".to_string()
                } else {
                    "Exited (0) 1 minute ago".to_string()
                },
                ports: c
                    .host_ports
                    .iter()
                    .map(|p| format!("0.0.0.0:{}->80/tcp", p))
                    .collect::<Vec<_>>()
                    .join(", "),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, EngineError> {
        self.query("network ls".into())?;
        Ok(self
            .networks()
            .into_iter()
            .map(|name| NetworkRecord {
                id: format!("id-{}", name),
                name,
                driver: "bridge".to_string(),
                scope: "local".to_string(),
            })
            .collect())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, EngineError> {
        self.query("volume ls".into())?;
        Ok(self
            .volumes()
            .into_iter()
            .map(|name| VolumeRecord {
                driver: "local".to_string(),
                name,
            })
            .collect())
    }

    async fn container_exists(&self, name: &str) -> Result<bool, EngineError> {
        self.query(format!("exists {}", name))?;
        Ok(self.container(name).is_some())
    }

    async fn is_running(&self, name: &str) -> Result<bool, EngineError> {
        self.query(format!("inspect {}", name))?;
        self.container(name)
            .map(|c| c.running)
            .ok_or_else(|| EngineError::EngineQueryFailed {
                command: format!("docker inspect {}", name),
                exit_code: Some(1),
                stderr: format!("Error: No such object: {}", name),
            })
    }

    async fn start(&self, name: &str) -> Result<(), EngineError> {
        self.set_running(format!("start {}", name), name, true)
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.set_running(format!("stop {}", name), name, false)
    }

    async fn restart(&self, name: &str) -> Result<(), EngineError> {
        self.set_running(format!("restart {}", name), name, true)
    }

    async fn remove(&self, name: &str) -> Result<(), EngineError> {
        let call = format!("rm {}", name);
        self.record(call.clone())?;
        let mut state = self.state.lock();
        let before = state.containers.len();
        state.containers.retain(|c| !c.answers_to(name));
        if state.containers.len() == before {
            return Err(Self::missing(&call));
        }
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<(), EngineError> {
        self.record(format!("run {}", spec.name))?;
        self.state.lock().containers.push(FakeContainer {
            name: spec.name.clone(),
            image: spec.image.clone(),
            running: true,
            host_ports: spec.published_ports.iter().map(|(host, _)| *host).collect(),
        });
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<bool, EngineError> {
        self.record(format!("volume rm {}", name))?;
        let mut state = self.state.lock();
        let before = state.volumes.len();
        state.volumes.retain(|v| v != name);
        Ok(state.volumes.len() != before)
    }

    async fn remove_network(&self, name: &str) -> Result<bool, EngineError> {
        self.record(format!("network rm {}", name))?;
        let mut state = self.state.lock();
        let before = state.networks.len();
        state.networks.retain(|n| n != name);
        Ok(state.networks.len() != before)
    }

    async fn execute(&self, container: &str, command: &[&str]) -> Result<String, EngineError> {
        self.record(format!("exec {} {}", container, command.join(" ")))?;
        Ok(String::new())
    }
}

/// A lifecycle service wired to a temp directory and a fake engine
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub paths: Paths,
    pub engine: Arc<FakeEngine>,
    pub registry: Arc<InstanceRegistry>,
    pub service: LifecycleService,
}

impl Harness {
    pub fn new(engine: FakeEngine) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(dir.path().join("home"));
        let settings = Settings::default();
        let engine = Arc::new(engine);
        let registry = Arc::new(InstanceRegistry::open(&paths).expect("open registry"));
        let recipes = Arc::new(YamlRecipeLoader::new(settings.recipe_file_name.clone()));
        let service = LifecycleService::new(
            registry.clone(),
            engine.clone(),
            recipes,
            paths.clone(),
            settings,
        );
        Self {
            dir,
            paths,
            engine,
            registry,
            service,
        }
    }

    /// Write `<tmp>/<project>/devstack.yml` and return the project directory
    pub fn write_recipe(&self, project: &str, prefix: &str, host: Option<&str>) -> PathBuf {
        let project_dir = self.dir.path().join(project);
        std::fs::create_dir_all(&project_dir).expect("project dir");
        let mut yaml = format!("name_prefix: {}\n", prefix);
        if let Some(host) = host {
            yaml.push_str(&format!("host: {}\n", host));
        }
        std::fs::write(project_dir.join("devstack.yml"), yaml).expect("write recipe");
        project_dir
    }

    /// Like [`write_recipe`](Self::write_recipe) with an explicit service list
    pub fn write_recipe_with_services(&self, project: &str, prefix: &str, services: &[&str]) -> PathBuf {
        let project_dir = self.write_recipe(project, prefix, None);
        let mut yaml = format!("name_prefix: {}\nservices:\n", prefix);
        for service in services {
            yaml.push_str(&format!("  - {}\n", service));
        }
        std::fs::write(project_dir.join("devstack.yml"), yaml).expect("write recipe");
        project_dir
    }

    pub fn recipe_path(project_dir: &Path) -> PathBuf {
        project_dir.join("devstack.yml")
    }
}
