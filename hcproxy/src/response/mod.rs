/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod client;
pub(crate) use client::HttpProxyClientResponse;

mod assembler;
pub(crate) use assembler::{
    CachePlan, ClientFraming, plan_cached_response, write_cached_response, write_not_modified,
};

mod forward;
pub(crate) use forward::{PendingCacheWrite, ResponseForwarder};
