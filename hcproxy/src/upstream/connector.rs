/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime};

use http::{Method, Version};
use log::debug;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};

use hcp_http::client::{HttpResponseParseError, HttpUpstreamResponse};
use hcp_http::server::HttpProxyClientRequest;
use hcp_http::{BodyCopyError, ChunkedEncodeTransfer, HttpBodyReader, HttpBodyType};

use super::{NextHop, UpstreamConnectError, UpstreamConnection, UpstreamDialer, UpstreamPool};
use crate::ProxyContext;
use crate::response::HttpProxyClientResponse;
use crate::serve::{ActiveReader, run_with_idle_check};

/// Hard limit of establish attempts for one request.
pub(crate) const MAX_ATTEMPTS: usize = 5;
const BODY_YIELD_SIZE: usize = 1 << 20;

/// A final response header read from an upstream connection.
pub(crate) struct UpstreamExchange {
    pub(crate) conn: UpstreamConnection,
    pub(crate) response: HttpUpstreamResponse,
    pub(crate) request_time: SystemTime,
    pub(crate) response_time: SystemTime,
}

enum AttemptError {
    Retry(io::Error),
    Fatal(UpstreamConnectError),
}

pub(crate) struct UpstreamConnector<'a> {
    pool: &'a UpstreamPool,
    dialer: &'a dyn UpstreamDialer,
    hop: NextHop,
    rsp_header_max_size: usize,
    body_line_max_size: usize,
    rsp_header_timeout: Duration,
    client_body_idle: Duration,
    attempts: usize,
    body_sent: bool,
    continue_sent: bool,
}

impl<'a> UpstreamConnector<'a> {
    pub(crate) fn new(ctx: &'a ProxyContext, hop: NextHop) -> Self {
        let server = &ctx.config.server;
        UpstreamConnector {
            pool: &ctx.pool,
            dialer: ctx.dialer.as_ref(),
            hop,
            rsp_header_max_size: server.rsp_header_max_size,
            body_line_max_size: server.body_line_max_size,
            rsp_header_timeout: server.timeout.recv_rsp_header,
            client_body_idle: server.timeout.client_body_idle,
            attempts: 0,
            body_sent: false,
            continue_sent: false,
        }
    }

    #[inline]
    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }

    /// Whether the client body has been consumed, at least partially.
    #[inline]
    pub(crate) fn body_sent(&self) -> bool {
        self.body_sent
    }

    pub(crate) fn release(&self, conn: UpstreamConnection) {
        self.pool.release(conn);
    }

    /// Send the request, with its body read from `clt_r`, and wait for the final response header.
    ///
    /// Interim 1xx responses are relayed to HTTP/1.1 clients.
    pub(crate) async fn establish<CR, CW>(
        &mut self,
        req: &HttpProxyClientRequest,
        extra_lines: &[String],
        clt_r: &mut CR,
        clt_w: &mut CW,
    ) -> Result<UpstreamExchange, UpstreamConnectError>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        loop {
            self.attempts += 1;
            match self.try_once(req, extra_lines, clt_r, clt_w).await {
                Ok(exchange) => return Ok(exchange),
                Err(AttemptError::Retry(e)) => {
                    debug!(
                        "upstream attempt {} to {} failed: {e}",
                        self.attempts, self.hop
                    );
                    if self.attempts >= MAX_ATTEMPTS {
                        return Err(UpstreamConnectError::AttemptsExhausted {
                            attempts: self.attempts,
                            last: e,
                        });
                    }
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn failed_after_send(&self, safe: bool, e: io::Error) -> AttemptError {
        if safe && !self.body_sent {
            AttemptError::Retry(e)
        } else {
            AttemptError::Fatal(UpstreamConnectError::NotRetryable {
                attempts: self.attempts,
                last: e,
            })
        }
    }

    async fn connect(&self) -> io::Result<UpstreamConnection> {
        let key = self.hop.pool_key();
        if let Some(conn) = self.pool.checkout(&key) {
            return Ok(conn);
        }
        let (r, w) = self.dialer.dial(self.hop.host(), self.hop.port()).await?;
        Ok(UpstreamConnection::new(key, r, w))
    }

    async fn try_once<CR, CW>(
        &mut self,
        req: &HttpProxyClientRequest,
        extra_lines: &[String],
        clt_r: &mut CR,
        clt_w: &mut CW,
    ) -> Result<UpstreamExchange, AttemptError>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let mut conn = self.connect().await.map_err(AttemptError::Retry)?;
        // a stale pooled connection fails on first use, whatever the method
        let safe = matches!(req.method, Method::GET | Method::HEAD) || conn.is_reused();

        let head = if self.hop.is_proxy() {
            let mut lines = extra_lines.to_vec();
            if let Some(line) = self.hop.auth_line() {
                lines.push(line.to_string());
            }
            req.serialize_for_proxy(true, &lines)
        } else {
            req.serialize_for_origin(true, extra_lines)
        };
        let request_time = SystemTime::now();
        if let Err(e) = conn.writer.write_all(&head).await {
            return Err(self.failed_after_send(safe, e));
        }

        if let Some(body_type) = req.body_type() {
            if req.expect_continue() && req.version == Version::HTTP_11 && !self.continue_sent {
                HttpProxyClientResponse::reply_continue(req.version, clt_w)
                    .await
                    .map_err(|e| AttemptError::Fatal(UpstreamConnectError::ClientWriteFailed(e)))?;
                self.continue_sent = true;
            }
            self.body_sent = true;
            self.send_body(&body_type, clt_r, &mut conn).await?;
        }
        if let Err(e) = conn.writer.flush().await {
            return Err(self.failed_after_send(safe, e));
        }

        loop {
            let r = tokio::time::timeout(
                self.rsp_header_timeout,
                HttpUpstreamResponse::parse(
                    &mut conn.reader,
                    &req.method,
                    true,
                    self.rsp_header_max_size,
                ),
            )
            .await;
            let rsp = match r {
                Ok(Ok(rsp)) => rsp,
                Ok(Err(HttpResponseParseError::RemoteClosed)) => {
                    return Err(self.failed_after_send(
                        safe,
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "upstream closed before sending response",
                        ),
                    ));
                }
                Ok(Err(HttpResponseParseError::IoFailed(e))) => {
                    return Err(self.failed_after_send(safe, e));
                }
                Ok(Err(e)) => {
                    return Err(AttemptError::Fatal(UpstreamConnectError::InvalidResponse(e)));
                }
                Err(_) => {
                    return Err(self.failed_after_send(
                        safe,
                        io::Error::new(
                            io::ErrorKind::TimedOut,
                            "timed out reading upstream response header",
                        ),
                    ));
                }
            };

            if rsp.is_informational() {
                if req.version == Version::HTTP_11 {
                    let head = rsp.serialize_informational();
                    let r = async {
                        clt_w.write_all(&head).await?;
                        clt_w.flush().await
                    }
                    .await;
                    r.map_err(|e| AttemptError::Fatal(UpstreamConnectError::ClientWriteFailed(e)))?;
                }
                continue;
            }

            return Ok(UpstreamExchange {
                conn,
                response: rsp,
                request_time,
                response_time: SystemTime::now(),
            });
        }
    }

    async fn send_body<CR>(
        &self,
        body_type: &HttpBodyType,
        clt_r: &mut CR,
        conn: &mut UpstreamConnection,
    ) -> Result<(), AttemptError>
    where
        CR: AsyncBufRead + Unpin,
    {
        let active = AtomicBool::new(false);
        let mut body_reader = BufReader::new(ActiveReader::new(
            HttpBodyReader::new(clt_r, body_type, self.body_line_max_size),
            &active,
        ));
        let copy = async {
            match body_type {
                HttpBodyType::Chunked => {
                    ChunkedEncodeTransfer::new(&mut body_reader, &mut conn.writer, BODY_YIELD_SIZE)
                        .await
                }
                _ => hcp_http::copy_body(&mut body_reader, &mut conn.writer).await,
            }
        };
        let Some(r) = run_with_idle_check(copy, &active, self.client_body_idle).await else {
            return Err(AttemptError::Fatal(UpstreamConnectError::ClientBodyIdle));
        };
        match r {
            Ok(_) => Ok(()),
            Err(BodyCopyError::ReadFailed(e)) => Err(AttemptError::Fatal(
                UpstreamConnectError::ClientReadFailed(e),
            )),
            Err(BodyCopyError::WriteFailed(e)) => {
                Err(AttemptError::Fatal(UpstreamConnectError::NotRetryable {
                    attempts: self.attempts,
                    last: e,
                }))
            }
        }
    }
}
