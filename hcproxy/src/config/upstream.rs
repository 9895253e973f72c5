/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::Yaml;

const DEFAULT_PROXY_PORT: u16 = 3128;

/// A chained proxy which receives every request in absolute-form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextProxyConfig {
    pub host: String,
    pub port: u16,
    /// complete `Proxy-Authorization` header line
    pub auth_line: Option<String>,
}

#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub proxy: Option<NextProxyConfig>,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    proxy_username: Option<String>,
    proxy_password: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            proxy: None,
            pool_idle_timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 8,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

impl UpstreamConfig {
    pub(super) fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'upstream' should be 'map'"));
        };
        hcp_yaml::foreach_kv(map, |k, v| self.set(k, v))?;

        if let Some(proxy) = &mut self.proxy {
            proxy.auth_line = match (&self.proxy_username, &self.proxy_password) {
                (Some(u), Some(p)) => Some(hcp_http::header::proxy_authorization_basic(u, p)),
                (Some(u), None) => Some(hcp_http::header::proxy_authorization_basic(u, "")),
                _ => None,
            };
        }
        Ok(())
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match hcp_yaml::key::normalize(k).as_str() {
            "proxy" | "next_proxy" => {
                let (host, port) = hcp_yaml::value::as_upstream_addr(v, DEFAULT_PROXY_PORT)?;
                self.proxy = Some(NextProxyConfig {
                    host,
                    port,
                    auth_line: None,
                });
                Ok(())
            }
            "proxy_username" => {
                self.proxy_username = Some(hcp_yaml::value::as_string(v)?);
                Ok(())
            }
            "proxy_password" => {
                self.proxy_password = Some(hcp_yaml::value::as_string(v)?);
                Ok(())
            }
            "pool_idle_timeout" => {
                self.pool_idle_timeout = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "pool_max_idle_per_host" => {
                self.pool_max_idle_per_host = hcp_yaml::value::as_usize(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub(super) fn check(&self) -> anyhow::Result<()> {
        if self.proxy.is_none() && (self.proxy_username.is_some() || self.proxy_password.is_some())
        {
            return Err(anyhow!("proxy credentials set without a proxy address"));
        }
        Ok(())
    }
}
