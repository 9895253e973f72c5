/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::Yaml;

#[derive(Clone, Debug)]
pub struct TimeoutConfig {
    pub recv_req_header: Duration,
    pub recv_rsp_header: Duration,
    pub upstream_connect: Duration,
    pub client_body_drain: Duration,
    pub upstream_body_idle: Duration,
    pub client_body_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            recv_req_header: Duration::from_secs(30),
            recv_rsp_header: Duration::from_secs(60),
            upstream_connect: Duration::from_secs(10),
            client_body_drain: Duration::from_secs(5),
            upstream_body_idle: Duration::from_secs(60),
            client_body_idle: Duration::from_secs(60),
        }
    }
}

impl TimeoutConfig {
    fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'timeout' should be 'map'"));
        };
        hcp_yaml::foreach_kv(map, |k, v| match hcp_yaml::key::normalize(k).as_str() {
            "recv_req_header" => {
                self.recv_req_header = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "recv_rsp_header" => {
                self.recv_rsp_header = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "upstream_connect" => {
                self.upstream_connect = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "client_body_drain" => {
                self.client_body_drain = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "upstream_body_idle" => {
                self.upstream_body_idle = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            "client_body_idle" => {
                self.client_body_idle = hcp_yaml::humanize::as_duration(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        })
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub req_header_max_size: usize,
    pub rsp_header_max_size: usize,
    pub body_line_max_size: usize,
    pub request_line_max_size: usize,
    pub client_body_drain_max_size: u64,
    pub timeout: TimeoutConfig,
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            req_header_max_size: 64 * 1024,
            rsp_header_max_size: 64 * 1024,
            body_line_max_size: 8 * 1024,
            request_line_max_size: 8 * 1024,
            client_body_drain_max_size: 64 * 1024,
            timeout: TimeoutConfig::default(),
            worker_threads: None,
        }
    }
}

impl ServerConfig {
    pub(super) fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'server' should be 'map'"));
        };
        hcp_yaml::foreach_kv(map, |k, v| self.set(k, v))
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match hcp_yaml::key::normalize(k).as_str() {
            "listen" => {
                self.listen = hcp_yaml::value::as_sockaddr(v)?;
                Ok(())
            }
            "req_header_max_size" => {
                self.req_header_max_size = hcp_yaml::humanize::as_usize(v)?;
                Ok(())
            }
            "rsp_header_max_size" => {
                self.rsp_header_max_size = hcp_yaml::humanize::as_usize(v)?;
                Ok(())
            }
            "body_line_max_size" => {
                self.body_line_max_size = hcp_yaml::humanize::as_usize(v)?;
                Ok(())
            }
            "request_line_max_size" => {
                self.request_line_max_size = hcp_yaml::humanize::as_usize(v)?;
                Ok(())
            }
            "client_body_drain_max_size" => {
                self.client_body_drain_max_size = hcp_yaml::humanize::as_u64(v)?;
                Ok(())
            }
            "timeout" => self.timeout.parse_yaml(v),
            "worker_threads" => {
                self.worker_threads = Some(hcp_yaml::value::as_usize(v)?);
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub(super) fn check(&self) -> anyhow::Result<()> {
        if self.request_line_max_size > self.req_header_max_size {
            return Err(anyhow!(
                "request_line_max_size should not be larger than req_header_max_size"
            ));
        }
        if self.timeout.upstream_body_idle.is_zero() || self.timeout.client_body_idle.is_zero() {
            return Err(anyhow!("body idle timeouts should be greater than 0"));
        }
        if self.worker_threads == Some(0) {
            return Err(anyhow!("worker_threads should be greater than 0"));
        }
        Ok(())
    }
}
