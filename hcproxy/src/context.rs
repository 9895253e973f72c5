/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use slog::Logger;

use hcp_cache::{CacheStore, MemoryCacheStore};

use crate::config::ProxyConfig;
use crate::stats::ProxyStats;
use crate::upstream::{ConfiguredResolver, TcpDialer, UpstreamDialer, UpstreamPool, UpstreamResolver};

/// Everything shared by the connection tasks, built once at startup.
pub struct ProxyContext {
    pub(crate) config: Arc<ProxyConfig>,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
    pub(crate) pool: UpstreamPool,
    pub(crate) resolver: Box<dyn UpstreamResolver>,
    pub(crate) dialer: Box<dyn UpstreamDialer>,
    pub(crate) stats: ProxyStats,
    pub(crate) task_logger: Logger,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig) -> Self {
        let dialer = TcpDialer::new(config.server.timeout.upstream_connect);
        let task_logger = slog_scope::logger().new(slog::o!("log_type" => "task"));
        ProxyContext::build(config, Box::new(dialer), task_logger)
    }

    fn build(config: ProxyConfig, dialer: Box<dyn UpstreamDialer>, task_logger: Logger) -> Self {
        let cache = config.cache.enabled.then(|| {
            let store = MemoryCacheStore::new(config.cache.max_object_size, config.cache.max_entries);
            Arc::new(store) as Arc<dyn CacheStore>
        });
        let pool = UpstreamPool::new(
            config.upstream.pool_idle_timeout,
            config.upstream.pool_max_idle_per_host,
        );
        let resolver = ConfiguredResolver::new(config.upstream.proxy.clone());
        ProxyContext {
            config: Arc::new(config),
            cache,
            pool,
            resolver: Box::new(resolver),
            dialer,
            stats: ProxyStats::default(),
            task_logger,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_dialer(config: ProxyConfig, dialer: Box<dyn UpstreamDialer>) -> Self {
        let task_logger = Logger::root(slog::Discard, slog::o!());
        ProxyContext::build(config, dialer, task_logger)
    }

    #[inline]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
