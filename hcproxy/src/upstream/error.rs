/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use hcp_http::client::HttpResponseParseError;

#[derive(Debug, Error)]
pub(crate) enum UpstreamConnectError {
    #[error("no upstream address found in request")]
    NoUpstreamAddress,
    #[error("gave up after {attempts} attempts, last error: {last:?}")]
    AttemptsExhausted { attempts: usize, last: io::Error },
    #[error("failed at attempt {attempts} and unsafe to retry: {last:?}")]
    NotRetryable { attempts: usize, last: io::Error },
    #[error("invalid upstream response: {0}")]
    InvalidResponse(HttpResponseParseError),
    #[error("idle while sending client body")]
    ClientBodyIdle,
    #[error("read client body failed: {0:?}")]
    ClientReadFailed(io::Error),
    #[error("write to client failed: {0:?}")]
    ClientWriteFailed(io::Error),
}

impl UpstreamConnectError {
    /// The upstream side failed, a stale cache entry may stand in for it.
    pub(crate) fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            UpstreamConnectError::AttemptsExhausted { .. }
                | UpstreamConnectError::NotRetryable { .. }
                | UpstreamConnectError::InvalidResponse(_)
        )
    }
}
