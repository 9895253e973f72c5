/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::Mutex;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use log::trace;
use tokio::io::BufReader;

use super::{BoxAsyncRead, BoxAsyncWrite};

pub(crate) struct UpstreamConnection {
    pub(crate) reader: BufReader<BoxAsyncRead>,
    pub(crate) writer: BoxAsyncWrite,
    key: String,
    released_at: Option<Instant>,
}

impl UpstreamConnection {
    pub(crate) fn new(key: String, reader: BoxAsyncRead, writer: BoxAsyncWrite) -> Self {
        UpstreamConnection {
            reader: BufReader::new(reader),
            writer,
            key,
            released_at: None,
        }
    }

    /// The connection has served a previous request and was returned cleanly.
    #[inline]
    pub(crate) fn is_reused(&self) -> bool {
        self.released_at.is_some()
    }
}

/// Idle upstream connections keyed by next hop.
pub(crate) struct UpstreamPool {
    idle_timeout: Duration,
    max_idle_per_host: usize,
    idle: Mutex<AHashMap<String, Vec<UpstreamConnection>>>,
}

impl UpstreamPool {
    pub(crate) fn new(idle_timeout: Duration, max_idle_per_host: usize) -> Self {
        UpstreamPool {
            idle_timeout,
            max_idle_per_host,
            idle: Mutex::new(AHashMap::new()),
        }
    }

    fn is_fresh(&self, conn: &UpstreamConnection) -> bool {
        conn.released_at
            .map(|t| t.elapsed() < self.idle_timeout)
            .unwrap_or(false)
    }

    pub(crate) fn checkout(&self, key: &str) -> Option<UpstreamConnection> {
        let mut map = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let list = map.get_mut(key)?;
        let found = loop {
            let Some(conn) = list.pop() else {
                break None;
            };
            if self.is_fresh(&conn) {
                break Some(conn);
            }
            trace!("drop idle upstream connection to {key}");
        };
        if list.is_empty() {
            map.remove(key);
        }
        found
    }

    /// Return a connection which is ready for the next request.
    ///
    /// Expired connections to every host are dropped at the same time.
    pub(crate) fn release(&self, mut conn: UpstreamConnection) {
        if self.max_idle_per_host == 0 || !conn.reader.buffer().is_empty() {
            return;
        }
        conn.released_at = Some(Instant::now());
        let mut map = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|key, list| {
            list.retain(|c| self.is_fresh(c));
            if list.is_empty() {
                trace!("no idle upstream connection left to {key}");
                false
            } else {
                true
            }
        });
        let list = map.entry(conn.key.clone()).or_default();
        if list.len() < self.max_idle_per_host {
            list.push(conn);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self, key: &str) -> usize {
        let map = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        map.get(key).map(|l| l.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn host_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
