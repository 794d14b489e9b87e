// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! nginx route configuration
//!
//! Renders the whole routing file for the shared proxy: one upstream and one
//! server block per proxied instance, then a default server that closes the
//! connection for any unmatched host (`return 444`). The file is always
//! regenerated wholesale.

use std::fmt::Write;

/// Port the proxy listens on inside its container
pub const PROXY_CONTAINER_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub name_prefix: String,
    pub hostname: String,
    pub upstream_host: String,
    pub upstream_port: u16,
}

impl ProxyRoute {
    /// Sanitising alone can collide (`a-b` and `a_b`), so the route's
    /// position in the file keeps every upstream name distinct
    fn upstream_name(&self, index: usize) -> String {
        let sanitised: String = self
            .name_prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}_upstream", sanitised, index)
    }
}

/// Whether `host` can be written into `server_name` as-is. Only hostname
/// characters and the `*` wildcard are accepted.
pub fn is_valid_server_name(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '*'))
}

pub fn render_nginx_config(routes: &[ProxyRoute]) -> String {
    let mut out = String::from("# Generated by devstack. Manual edits are overwritten.\n\n");

    for (index, route) in routes.iter().enumerate() {
        let upstream = route.upstream_name(index);
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "upstream {upstream} {{\n    server {host}:{port};\n}}\n\n\
             server {{\n    listen {listen};\n    server_name {hostname};\n\n    \
             location / {{\n        proxy_pass http://{upstream};\n        \
             proxy_set_header Host $host;\n        \
             proxy_set_header X-Real-IP $remote_addr;\n        \
             proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n        \
             proxy_set_header X-Forwarded-Proto $scheme;\n    }}\n}}\n\n",
            upstream = upstream,
            host = route.upstream_host,
            port = route.upstream_port,
            listen = PROXY_CONTAINER_PORT,
            hostname = route.hostname,
        );
    }

    let _ = write!(
        out,
        "server {{\n    listen {listen} default_server;\n    server_name _;\n    return 444;\n}}\n",
        listen = PROXY_CONTAINER_PORT,
    );
    out
}
