/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;

use http::StatusCode;
use thiserror::Error;

use hcp_http::BodyCopyError;
use hcp_http::client::HttpResponseParseError;
use hcp_http::server::HttpRequestParseError;

use crate::upstream::UpstreamConnectError;

#[derive(Error, Debug)]
pub(crate) enum ServerTaskError {
    #[error("internal server error: {0}")]
    InternalServerError(&'static str),
    #[error("invalid client protocol: {0}")]
    InvalidClientProtocol(&'static str),
    #[error("request line too long")]
    ClientRequestLineTooLong,
    #[error("request header too large")]
    ClientHeaderTooLarge,
    #[error("unimplemented protocol")]
    UnimplementedProtocol,
    #[error("forbidden by rule: {0}")]
    ForbiddenByRule(StatusCode),
    #[error("client authentication failed")]
    ClientAuthFailed,
    #[error("unsupported expectation")]
    UnsupportedExpectation,
    #[error("tcp read from client: {0:?}")]
    ClientTcpReadFailed(io::Error),
    #[error("tcp write to client: {0:?}")]
    ClientTcpWriteFailed(io::Error),
    #[error("client app timeout: {0}")]
    ClientAppTimeout(&'static str),
    #[error("upstream not connected: {0}")]
    UpstreamNotConnected(UpstreamConnectError),
    #[error("invalid upstream protocol: {0}")]
    InvalidUpstreamProtocol(&'static str),
    #[error("read from upstream: {0:?}")]
    UpstreamReadFailed(io::Error),
    #[error("write to upstream: {0:?}")]
    UpstreamWriteFailed(io::Error),
    #[error("upstream app timeout: {0}")]
    UpstreamAppTimeout(&'static str),
    #[error("closed by upstream")]
    ClosedByUpstream,
    #[error("closed early by client")]
    ClosedEarlyByClient,
}

impl ServerTaskError {
    pub(crate) fn brief(&self) -> &'static str {
        match self {
            ServerTaskError::InternalServerError(_) => "InternalServerError",
            ServerTaskError::InvalidClientProtocol(_) => "InvalidClientProtocol",
            ServerTaskError::ClientRequestLineTooLong => "ClientRequestLineTooLong",
            ServerTaskError::ClientHeaderTooLarge => "ClientHeaderTooLarge",
            ServerTaskError::UnimplementedProtocol => "UnimplementedProtocol",
            ServerTaskError::ForbiddenByRule(_) => "ForbiddenByRule",
            ServerTaskError::ClientAuthFailed => "ClientAuthFailed",
            ServerTaskError::UnsupportedExpectation => "UnsupportedExpectation",
            ServerTaskError::ClientTcpReadFailed(_) => "ClientTcpReadFailed",
            ServerTaskError::ClientTcpWriteFailed(_) => "ClientTcpWriteFailed",
            ServerTaskError::ClientAppTimeout(_) => "ClientAppTimeout",
            ServerTaskError::UpstreamNotConnected(_) => "UpstreamNotConnected",
            ServerTaskError::InvalidUpstreamProtocol(_) => "InvalidUpstreamProtocol",
            ServerTaskError::UpstreamReadFailed(_) => "UpstreamReadFailed",
            ServerTaskError::UpstreamWriteFailed(_) => "UpstreamWriteFailed",
            ServerTaskError::UpstreamAppTimeout(_) => "UpstreamAppTimeout",
            ServerTaskError::ClosedByUpstream => "ClosedByUpstream",
            ServerTaskError::ClosedEarlyByClient => "ClosedEarlyByClient",
        }
    }
}

pub(crate) type ServerTaskResult<T> = Result<T, ServerTaskError>;

impl From<HttpRequestParseError> for ServerTaskError {
    fn from(e: HttpRequestParseError) -> ServerTaskError {
        match e {
            HttpRequestParseError::ClientClosed => ServerTaskError::ClosedEarlyByClient,
            HttpRequestParseError::TooLargeHeader(_) => ServerTaskError::ClientHeaderTooLarge,
            HttpRequestParseError::TooLongRequestLine(_) => {
                ServerTaskError::ClientRequestLineTooLong
            }
            HttpRequestParseError::UnsupportedMethod(_) => ServerTaskError::UnimplementedProtocol,
            HttpRequestParseError::IoFailed(e) => ServerTaskError::ClientTcpReadFailed(e),
            HttpRequestParseError::MissedHost => {
                ServerTaskError::InvalidClientProtocol("missed host header")
            }
            _ => ServerTaskError::InvalidClientProtocol("invalid client request"),
        }
    }
}

impl From<HttpResponseParseError> for ServerTaskError {
    fn from(e: HttpResponseParseError) -> ServerTaskError {
        match e {
            HttpResponseParseError::RemoteClosed => ServerTaskError::ClosedByUpstream,
            HttpResponseParseError::TooLargeHeader(_) => {
                ServerTaskError::InvalidUpstreamProtocol("too large header in remote response")
            }
            HttpResponseParseError::IoFailed(e) => ServerTaskError::UpstreamReadFailed(e),
            _ => ServerTaskError::InvalidUpstreamProtocol("invalid remote response"),
        }
    }
}

impl From<UpstreamConnectError> for ServerTaskError {
    fn from(e: UpstreamConnectError) -> Self {
        match e {
            UpstreamConnectError::ClientBodyIdle => {
                ServerTaskError::ClientAppTimeout("idle while reading request body")
            }
            UpstreamConnectError::ClientReadFailed(e) => ServerTaskError::ClientTcpReadFailed(e),
            UpstreamConnectError::ClientWriteFailed(e) => ServerTaskError::ClientTcpWriteFailed(e),
            UpstreamConnectError::InvalidResponse(e) => ServerTaskError::from(e),
            e => ServerTaskError::UpstreamNotConnected(e),
        }
    }
}

impl ServerTaskError {
    /// Map a failed response body transfer from upstream to client.
    pub(crate) fn from_rsp_body_copy(e: BodyCopyError) -> Self {
        match e {
            BodyCopyError::ReadFailed(e) => {
                if e.kind() == io::ErrorKind::InvalidData {
                    ServerTaskError::InvalidUpstreamProtocol("invalid response body")
                } else {
                    ServerTaskError::UpstreamReadFailed(e)
                }
            }
            BodyCopyError::WriteFailed(e) => ServerTaskError::ClientTcpWriteFailed(e),
        }
    }
}
