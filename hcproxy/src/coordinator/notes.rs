/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use http::Method;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestPhase {
    Filtering,
    CacheLookup,
    ServingFromCache,
    Connecting,
    Validating,
    ServingResponse,
    Tunneling,
}

impl RequestPhase {
    pub(crate) fn brief(&self) -> &'static str {
        match self {
            RequestPhase::Filtering => "Filtering",
            RequestPhase::CacheLookup => "CacheLookup",
            RequestPhase::ServingFromCache => "ServingFromCache",
            RequestPhase::Connecting => "Connecting",
            RequestPhase::Validating => "Validating",
            RequestPhase::ServingResponse => "ServingResponse",
            RequestPhase::Tunneling => "Tunneling",
        }
    }
}

/// How the cache took part in answering a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CacheOutcome {
    None,
    Hit,
    Miss,
    Revalidated,
    Stale,
}

impl CacheOutcome {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::None => "none",
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Revalidated => "revalidated",
            CacheOutcome::Stale => "stale",
        }
    }
}

pub(crate) struct HttpForwardTaskNotes {
    pub(crate) stage: RequestPhase,
    pub(crate) client_addr: SocketAddr,
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) rsp_status: u16,
    pub(crate) cache: CacheOutcome,
    pub(crate) upstream_attempts: usize,
    pub(crate) keep_alive: bool,
    create_ins: Instant,
}

impl HttpForwardTaskNotes {
    pub(crate) fn new(client_addr: SocketAddr, method: Method, uri: String) -> Self {
        HttpForwardTaskNotes {
            stage: RequestPhase::Filtering,
            client_addr,
            method,
            uri,
            rsp_status: 0,
            cache: CacheOutcome::None,
            upstream_attempts: 0,
            keep_alive: false,
            create_ins: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn time_elapsed(&self) -> Duration {
        self.create_ins.elapsed()
    }
}
