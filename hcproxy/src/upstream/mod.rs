/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod error;
pub(crate) use error::UpstreamConnectError;

mod resolver;
pub(crate) use resolver::{ConfiguredResolver, NextHop, UpstreamResolver};

mod dialer;
pub(crate) use dialer::{BoxAsyncRead, BoxAsyncWrite, TcpDialer, UpstreamDialer};

mod pool;
pub(crate) use pool::{UpstreamConnection, UpstreamPool};

mod connector;
pub(crate) use connector::{MAX_ATTEMPTS, UpstreamConnector, UpstreamExchange};

#[cfg(test)]
pub(crate) mod mock;
