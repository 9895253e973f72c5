/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use http::{HeaderValue, Method, Version, header};
use log::debug;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};

use hcp_cache::{CacheControl, CacheEntry, CacheEntryMeta, CacheKey, CacheStore, CacheWriter};
use hcp_http::client::HttpUpstreamResponse;
use hcp_http::{ChunkedEncodeTransfer, HttpBodyReader, HttpBodyType};

use super::ClientFraming;
use crate::coordinator::ConnectionState;
use crate::serve::{ActiveReader, ServerTaskError, ServerTaskResult, run_with_idle_check};

const BODY_YIELD_SIZE: usize = 1 << 20;
const DEFAULT_BODY_IDLE: Duration = Duration::from_secs(60);

/// Copies every byte read through it into an optional cache writer.
pub(crate) struct CacheTeeReader<'a, R> {
    inner: R,
    cache: Option<&'a mut CacheWriter>,
    copied: u64,
}

impl<'a, R> CacheTeeReader<'a, R> {
    pub(crate) fn new(inner: R, cache: Option<&'a mut CacheWriter>) -> Self {
        CacheTeeReader {
            inner,
            cache,
            copied: 0,
        }
    }

    pub(crate) fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Bytes passed through so far.
    pub(crate) fn copied(&self) -> u64 {
        self.copied
    }
}

impl<R> AsyncRead for CacheTeeReader<'_, R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        let data = &buf.filled()[before..];
        self.copied += data.len() as u64;
        if let Some(writer) = self.cache.as_mut()
            && !writer.is_failed()
        {
            // an oversized object only stops the caching
            let _ = writer.write(data);
        }
        Poll::Ready(Ok(()))
    }
}

/// A response being stored while it is forwarded.
pub(crate) struct PendingCacheWrite {
    store: Arc<dyn CacheStore>,
    writer: CacheWriter,
    meta: CacheEntryMeta,
}

impl PendingCacheWrite {
    pub(crate) fn new(
        store: Arc<dyn CacheStore>,
        key: CacheKey,
        expected_size: Option<u64>,
        meta: CacheEntryMeta,
    ) -> Self {
        let writer = store.create(key, expected_size);
        PendingCacheWrite {
            store,
            writer,
            meta,
        }
    }

    #[inline]
    pub(crate) fn writer_mut(&mut self) -> &mut CacheWriter {
        &mut self.writer
    }

    pub(crate) fn commit(self) -> Option<Arc<CacheEntry>> {
        let PendingCacheWrite {
            store,
            writer,
            mut meta,
        } = self;
        let key = writer.key().clone();

        let cc = CacheControl::from_headers(&meta.headers);
        for field in cc.restricted_fields() {
            meta.headers.remove(field);
        }
        meta.headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(writer.len() as u64),
        );

        match store.commit(writer, meta) {
            Ok(entry) => {
                debug!("cache stored {key}, {} bytes", entry.size());
                Some(entry)
            }
            Err(e) => {
                debug!("cache store of {key} dropped: {e}");
                None
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ForwardOutcome {
    pub(crate) body_len: u64,
    /// the upstream connection ended at a message boundary and may be pooled
    pub(crate) upstream_reusable: bool,
}

/// Sends an upstream response to the client, re-framing the body when needed.
pub(crate) struct ResponseForwarder<'a> {
    method: &'a Method,
    client_version: Version,
    proxy_connection: bool,
    body_line_max_size: usize,
    body_idle: Duration,
}

impl<'a> ResponseForwarder<'a> {
    pub(crate) fn new(
        method: &'a Method,
        client_version: Version,
        proxy_connection: bool,
        body_line_max_size: usize,
    ) -> Self {
        ResponseForwarder {
            method,
            client_version,
            proxy_connection,
            body_line_max_size,
            body_idle: DEFAULT_BODY_IDLE,
        }
    }

    pub(crate) fn set_body_idle_timeout(&mut self, idle: Duration) {
        self.body_idle = idle;
    }

    /// Framing header lines for the client, updating the connection state.
    fn framing_lines(
        &self,
        rsp: &HttpUpstreamResponse,
        body_type: Option<&HttpBodyType>,
        state: &mut ConnectionState,
    ) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);
        match body_type {
            None => {
                if rsp.code != 204
                    && rsp.code != 304
                    && let Some(len) = rsp.content_length()
                {
                    lines.push(hcp_http::header::content_length(len));
                }
            }
            Some(HttpBodyType::ContentLength(len)) => {
                lines.push(hcp_http::header::content_length(*len));
            }
            Some(_) => {
                if self.client_version == Version::HTTP_11 {
                    state.chunked_out = true;
                    lines.push(hcp_http::header::transfer_encoding_chunked().to_string());
                } else {
                    // the end of the body is marked by closing the connection
                    state.keep_alive.revoke();
                }
            }
        }
        lines
    }

    pub(crate) async fn forward<UR, CW>(
        &self,
        rsp: &HttpUpstreamResponse,
        state: &mut ConnectionState,
        ups_r: &mut UR,
        clt_w: &mut CW,
        cache: Option<&mut CacheWriter>,
    ) -> ServerTaskResult<ForwardOutcome>
    where
        UR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let body_type = rsp.body_type(self.method);
        let mut lines = self.framing_lines(rsp, body_type.as_ref(), state);
        let framing = ClientFraming {
            keep_alive: state.keep_alive.get(),
            proxy_connection: self.proxy_connection,
        };
        if let Some(line) = framing.proxy_connection_line() {
            lines.push(line);
        }

        let head = rsp.serialize(framing.keep_alive, &lines);
        clt_w
            .write_all(&head)
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;

        let Some(body_type) = body_type else {
            clt_w
                .flush()
                .await
                .map_err(ServerTaskError::ClientTcpWriteFailed)?;
            return Ok(ForwardOutcome {
                body_len: 0,
                upstream_reusable: rsp.keep_alive(),
            });
        };

        let active = AtomicBool::new(false);
        let body_reader = HttpBodyReader::new(ups_r, &body_type, self.body_line_max_size);
        let mut tee = BufReader::new(CacheTeeReader::new(
            ActiveReader::new(body_reader, &active),
            cache,
        ));
        let chunked_out = state.chunked_out;
        let copy = async {
            if chunked_out {
                ChunkedEncodeTransfer::new(&mut tee, &mut *clt_w, BODY_YIELD_SIZE).await
            } else {
                hcp_http::copy_body(&mut tee, &mut *clt_w).await
            }
        };
        let Some(r) = run_with_idle_check(copy, &active, self.body_idle).await else {
            state.keep_alive.revoke();
            return Err(ServerTaskError::UpstreamAppTimeout(
                "idle while transferring response body",
            ));
        };
        r.map_err(ServerTaskError::from_rsp_body_copy)?;
        clt_w
            .flush()
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;

        let tee = tee.get_ref();
        Ok(ForwardOutcome {
            body_len: tee.copied(),
            upstream_reusable: rsp.keep_alive() && tee.get_ref().get_ref().finished(),
        })
    }
}
