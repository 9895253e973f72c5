/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

mod auth;
mod cache;
mod filter;
mod server;
mod upstream;

pub use auth::AuthConfig;
pub use cache::CacheConfig;
pub use server::{ServerConfig, TimeoutConfig};
pub use upstream::{NextProxyConfig, UpstreamConfig};

use crate::filter::FilterRegistry;

/// The whole configuration, built once at startup and never changed afterwards.
#[derive(Debug, Default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub filter: FilterRegistry,
}

impl ProxyConfig {
    pub fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        match v {
            Yaml::Hash(map) => hcp_yaml::foreach_kv(map, |k, v| self.set(k, v)),
            Yaml::Null => Ok(()),
            _ => Err(anyhow!("root value type should be hash")),
        }
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match hcp_yaml::key::normalize(k).as_str() {
            "server" => self.server.parse_yaml(v).context("invalid server config"),
            "cache" => self.cache.parse_yaml(v).context("invalid cache config"),
            "upstream" => self.upstream.parse_yaml(v).context("invalid upstream config"),
            "auth" => self.auth.parse_yaml(v).context("invalid auth config"),
            "filter" => filter::parse_registry(&mut self.filter, v).context("invalid filter config"),
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        self.server.check()?;
        self.cache.check()?;
        self.upstream.check()?;
        Ok(())
    }
}

pub fn load(path: &Path) -> anyhow::Result<ProxyConfig> {
    let mut config = ProxyConfig::default();
    hcp_yaml::foreach_doc(path, |_, doc| config.parse_yaml(doc))?;
    config.check()?;
    Ok(config)
}

#[cfg(test)]
fn load_str(s: &str) -> anyhow::Result<ProxyConfig> {
    let mut config = ProxyConfig::default();
    for doc in yaml_rust::YamlLoader::load_from_str(s)? {
        config.parse_yaml(&doc)?;
    }
    config.check()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn full() {
        let config = load_str(
            r#"
server:
  listen: 127.0.0.1:3128
  req-header-max-size: 32KiB
  timeout:
    recv_req_header: 10s
    upstream_connect: 3s
    upstream_body_idle: 20s
cache:
  max_object_size: 1MiB
  max_entries: 100
  warn_on_stale: false
upstream:
  proxy: parent.example.net:8080
  proxy_username: u
  proxy_password: p
  pool_max_idle_per_host: 2
auth:
  realm: test
  users:
    - username: alice
      password: secret
filter:
  request:
    - match: "^http://ads\\."
      action: block
  response:
    - match: "^image/"
      action: rewrite
      set_header:
        X-Filtered: yes
"#,
        )
        .unwrap();

        assert_eq!(config.server.listen.port(), 3128);
        assert_eq!(config.server.req_header_max_size, 32 * 1024);
        assert_eq!(config.server.timeout.recv_req_header, Duration::from_secs(10));
        assert_eq!(config.server.timeout.upstream_connect, Duration::from_secs(3));
        assert_eq!(config.server.timeout.recv_rsp_header, Duration::from_secs(60));
        assert_eq!(config.server.timeout.upstream_body_idle, Duration::from_secs(20));
        assert_eq!(config.server.timeout.client_body_idle, Duration::from_secs(60));
        assert_eq!(config.cache.max_object_size, 1024 * 1024);
        assert_eq!(config.cache.max_entries, 100);
        assert!(!config.cache.warn_on_stale);
        let proxy = config.upstream.proxy.as_ref().unwrap();
        assert_eq!(proxy.host, "parent.example.net");
        assert_eq!(proxy.port, 8080);
        assert!(proxy.auth_line.is_some());
        assert_eq!(config.upstream.pool_max_idle_per_host, 2);
        assert_eq!(config.auth.realm, "test");
        assert!(config.auth.check("alice", "secret"));
        assert!(!config.filter.is_empty());
    }

    #[test]
    fn empty() {
        let config = load_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert!(config.cache.enabled);
        assert!(config.upstream.proxy.is_none());
        assert!(!config.auth.enabled());
        assert!(config.filter.is_empty());
    }

    #[test]
    fn unknown_key() {
        assert!(load_str("servers: {}").is_err());
        assert!(load_str("server:\n  port: 1").is_err());
        assert!(load_str("- a").is_err());
    }

    #[test]
    fn zero_idle_timeout() {
        assert!(load_str("server:\n  timeout:\n    client_body_idle: 0").is_err());
    }
}
