/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use anyhow::anyhow;
use yaml_rust::Yaml;

/// A socket address, or a bare port which listens on all addresses.
pub fn as_sockaddr(v: &Yaml) -> anyhow::Result<SocketAddr> {
    match v {
        Yaml::String(s) => {
            if let Ok(port) = u16::from_str(s) {
                return Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port));
            }
            SocketAddr::from_str(s).map_err(|e| anyhow!("invalid socket address {s}: {e}"))
        }
        Yaml::Integer(i) => {
            let port = u16::try_from(*i)?;
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        }
        _ => Err(anyhow!(
            "yaml value type for 'SocketAddr' should be 'string' or 'integer'"
        )),
    }
}

/// A `host:port` pair where host may be a domain name.
pub fn as_upstream_addr(v: &Yaml, default_port: u16) -> anyhow::Result<(String, u16)> {
    let Yaml::String(s) = v else {
        return Err(anyhow!("yaml value type for upstream address should be 'string'"));
    };
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("empty upstream address"));
    }

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let Some((host, after)) = rest.split_once(']') else {
            return Err(anyhow!("unclosed ipv6 address in {s}"));
        };
        match after.strip_prefix(':') {
            Some(p) => (host, Some(p)),
            None if after.is_empty() => (host, None),
            None => return Err(anyhow!("invalid upstream address {s}")),
        }
    } else {
        match s.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (s, None),
        }
    };
    if host.is_empty() {
        return Err(anyhow!("no host found in {s}"));
    }
    let port = match port {
        Some(p) => u16::from_str(p).map_err(|e| anyhow!("invalid port in {s}: {e}"))?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}
