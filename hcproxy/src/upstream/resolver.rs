/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use hcp_http::server::HttpProxyClientRequest;

use crate::config::NextProxyConfig;

/// Where a request is sent to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NextHop {
    Direct {
        host: String,
        port: u16,
    },
    Proxy {
        host: String,
        port: u16,
        auth_line: Option<String>,
    },
}

impl NextHop {
    pub(crate) fn host(&self) -> &str {
        match self {
            NextHop::Direct { host, .. } | NextHop::Proxy { host, .. } => host,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        match self {
            NextHop::Direct { port, .. } | NextHop::Proxy { port, .. } => *port,
        }
    }

    /// The next hop is itself a proxy, so the request target must be in absolute-form.
    #[inline]
    pub(crate) fn is_proxy(&self) -> bool {
        matches!(self, NextHop::Proxy { .. })
    }

    pub(crate) fn auth_line(&self) -> Option<&str> {
        match self {
            NextHop::Direct { .. } => None,
            NextHop::Proxy { auth_line, .. } => auth_line.as_deref(),
        }
    }

    pub(crate) fn pool_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_proxy() { "proxy" } else { "direct" };
        if self.host().contains(':') {
            write!(f, "{kind}/[{}]:{}", self.host(), self.port())
        } else {
            write!(f, "{kind}/{}:{}", self.host(), self.port())
        }
    }
}

pub(crate) trait UpstreamResolver: Send + Sync {
    fn resolve(&self, req: &HttpProxyClientRequest) -> Option<NextHop>;
}

/// Send everything through the configured next proxy, or straight to the origin.
pub(crate) struct ConfiguredResolver {
    proxy: Option<NextProxyConfig>,
}

impl ConfiguredResolver {
    pub(crate) fn new(proxy: Option<NextProxyConfig>) -> Self {
        ConfiguredResolver { proxy }
    }
}

impl UpstreamResolver for ConfiguredResolver {
    fn resolve(&self, req: &HttpProxyClientRequest) -> Option<NextHop> {
        if let Some(proxy) = &self.proxy {
            return Some(NextHop::Proxy {
                host: proxy.host.clone(),
                port: proxy.port,
                auth_line: proxy.auth_line.clone(),
            });
        }
        let (host, port) = req.upstream_host_port()?;
        Some(NextHop::Direct { host, port })
    }
}
