/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use http::{HeaderMap, Method, StatusCode, Uri};
use log::debug;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite};

use hcp_cache::validator::{self, CacheVerdict, ConditionalHeader, StaleCheck};
use hcp_cache::{CacheControl, CacheEntry, CacheEntryMeta, CacheKey, CacheStore, VaryValues};
use hcp_http::server::HttpProxyClientRequest;
use hcp_http::{HttpBodyReader, HttpBodyType};

use super::notes::{CacheOutcome, HttpForwardTaskNotes, RequestPhase};
use super::state::ConnectionState;
use crate::ProxyContext;
use crate::auth;
use crate::log::task::TaskLogForHttpForward;
use crate::response::{
    CachePlan, ClientFraming, HttpProxyClientResponse, PendingCacheWrite, ResponseForwarder,
    plan_cached_response, write_cached_response, write_not_modified,
};
use crate::serve::{ServerTaskError, ServerTaskResult};
use crate::tunnel;
use crate::upstream::{UpstreamConnectError, UpstreamConnector, UpstreamExchange};

/// One request on a client connection, from the parsed header to the end of the response.
pub(crate) struct HttpForwardTask<'a> {
    ctx: &'a ProxyContext,
    req: HttpProxyClientRequest,
    state: ConnectionState,
    notes: HttpForwardTaskNotes,
    body_consumed: bool,
    rsp_started: bool,
    finished: bool,
}

impl<'a> HttpForwardTask<'a> {
    pub(crate) fn new(
        ctx: &'a ProxyContext,
        req: HttpProxyClientRequest,
        client_addr: SocketAddr,
    ) -> Self {
        let notes = HttpForwardTaskNotes::new(client_addr, req.method.clone(), req.absolute_uri());
        let mut state = ConnectionState::default();
        state.keep_alive.and(req.keep_alive());
        HttpForwardTask {
            ctx,
            req,
            state,
            notes,
            body_consumed: false,
            rsp_started: false,
            finished: false,
        }
    }

    fn framing(&self) -> ClientFraming {
        ClientFraming {
            keep_alive: self.state.keep_alive.get(),
            proxy_connection: self.req.uses_proxy_connection(),
        }
    }

    /// Serve the request, returns whether the client connection may be reused.
    pub(crate) async fn run<CR, CW>(mut self, clt_r: &mut CR, clt_w: &mut CW) -> bool
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        self.ctx.stats.add_request();
        match self.run_inner(clt_r, clt_w).await {
            Ok(()) => self.finish(None),
            Err(e) => {
                self.reply_task_error(&e, clt_r, clt_w).await;
                self.finish(Some(&e));
            }
        }
        self.state.keep_alive.get()
    }

    fn finish(&mut self, e: Option<&ServerTaskError>) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.notes.keep_alive = self.state.keep_alive.get();
        let stats = &self.ctx.stats;
        match self.notes.cache {
            CacheOutcome::Hit => stats.add_cache_hit(),
            CacheOutcome::Miss => stats.add_cache_miss(),
            CacheOutcome::Revalidated => stats.add_cache_revalidated(),
            CacheOutcome::Stale => stats.add_stale_served(),
            CacheOutcome::None => {}
        }
        TaskLogForHttpForward {
            logger: &self.ctx.task_logger,
            task_notes: &self.notes,
        }
        .log(e);
    }

    async fn run_inner<CR, CW>(&mut self, clt_r: &mut CR, clt_w: &mut CW) -> ServerTaskResult<()>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let ctx = self.ctx;
        if self.req.unsupported_expectation().is_some() {
            return Err(ServerTaskError::UnsupportedExpectation);
        }
        if !auth::check_proxy_auth(&ctx.config.auth, &self.req) {
            return Err(ServerTaskError::ClientAuthFailed);
        }
        let must_tunnel = auth::must_tunnel(&self.req);

        self.notes.stage = RequestPhase::Filtering;
        ctx.config
            .filter
            .filter_request(&self.notes.uri, &mut self.req.headers)
            .map_err(ServerTaskError::ForbiddenByRule)?;

        if self.req.method == Method::CONNECT || must_tunnel {
            return self.run_tunnel(must_tunnel, clt_r, clt_w).await;
        }

        let req_cc = CacheControl::from_headers(&self.req.headers);
        if req_cc.no_store {
            self.state.may_cache.revoke();
        }
        let store = match self.req.method {
            Method::GET | Method::HEAD => ctx.cache.clone(),
            _ => None,
        };
        if store.is_none() {
            self.state.bypass_cache();
        }

        self.notes.stage = RequestPhase::CacheLookup;
        // HEAD is answered from the GET entry
        let key = CacheKey::new(&Method::GET, &self.notes.uri);
        let entry = match &store {
            Some(store) if self.state.may_use_cache.get() => store.lookup(&key),
            _ => None,
        };

        let check = validator::check_conditional(
            &self.req.headers,
            self.req.uri.query().is_some(),
            entry.as_deref(),
            SystemTime::now(),
        );
        self.state.must_revalidate = check.must_revalidate;
        let mut conditional = None;
        match check.verdict {
            CacheVerdict::UseCached => {
                if let Some(entry) = &entry {
                    self.notes.stage = RequestPhase::ServingFromCache;
                    if self.serve_entry(entry, false, clt_r, clt_w).await? {
                        self.notes.cache = CacheOutcome::Hit;
                        return Ok(());
                    }
                    debug!("cached {} does not hold the requested range", entry.key());
                }
            }
            CacheVerdict::MustRevalidate(header) => {
                self.state.may_use_cache.revoke();
                conditional = header;
            }
            CacheVerdict::Bypass => {}
        }

        self.fetch(store, key, entry, conditional, clt_r, clt_w)
            .await
    }

    async fn fetch<CR, CW>(
        &mut self,
        store: Option<Arc<dyn CacheStore>>,
        key: CacheKey,
        entry: Option<Arc<CacheEntry>>,
        conditional: Option<ConditionalHeader>,
        clt_r: &mut CR,
        clt_w: &mut CW,
    ) -> ServerTaskResult<()>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let ctx = self.ctx;
        self.notes.stage = RequestPhase::Connecting;
        let hop = ctx
            .resolver
            .resolve(&self.req)
            .ok_or(ServerTaskError::UpstreamNotConnected(
                UpstreamConnectError::NoUpstreamAddress,
            ))?;
        let mut connector = UpstreamConnector::new(ctx, hop);
        let extra_lines: Vec<String> = conditional.iter().map(|h| h.to_line()).collect();
        let r = connector
            .establish(&self.req, &extra_lines, clt_r, clt_w)
            .await;
        self.notes.upstream_attempts = connector.attempts();
        if connector.body_sent() {
            self.body_consumed = true;
        }

        let exchange = match r {
            Ok(exchange) => exchange,
            Err(e) => {
                if connector.body_sent() {
                    // we can't tell how much of the body is left
                    self.state.keep_alive.revoke();
                }
                if e.is_upstream_failure() {
                    ctx.stats.add_upstream_failure();
                    if let Some(entry) = &entry
                        && !self.state.must_revalidate
                    {
                        debug!("serve stale {} as upstream failed: {e}", entry.key());
                        self.notes.stage = RequestPhase::ServingFromCache;
                        if self.serve_entry(entry, true, clt_r, clt_w).await? {
                            self.notes.cache = CacheOutcome::Stale;
                            return Ok(());
                        }
                    }
                }
                return Err(e.into());
            }
        };

        self.notes.stage = RequestPhase::Validating;
        let UpstreamExchange {
            mut conn,
            mut response,
            request_time,
            response_time,
        } = exchange;
        self.notes.rsp_status = response.code;

        if let Some(entry) = &entry {
            if response.code == 304 && conditional.is_some() {
                // the answer to our own validator, the client never asked for it
                if response.keep_alive() {
                    connector.release(conn);
                }
                let entry = self.refresh_entry(
                    store.as_deref(),
                    entry,
                    &response.headers,
                    request_time,
                    response_time,
                );
                self.notes.cache = CacheOutcome::Revalidated;
                self.notes.stage = RequestPhase::ServingFromCache;
                if self.serve_entry(&entry, false, clt_r, clt_w).await? {
                    return Ok(());
                }
                return Err(ServerTaskError::InternalServerError(
                    "revalidated entry does not hold the requested range",
                ));
            }

            match validator::check_stale_cache(
                entry,
                response.code,
                &response.headers,
                response.content_length(),
            ) {
                StaleCheck::Invalidate => {
                    if let Some(store) = &store {
                        store.remove(entry.key());
                    }
                }
                StaleCheck::RejectOlder => self.state.may_cache.revoke(),
                StaleCheck::Update => {}
            }
        }

        if CacheControl::from_headers(&response.headers).no_transform {
            self.state.may_filter.revoke();
        }
        if self.state.may_filter.get() {
            ctx.config
                .filter
                .filter_response(&mut response.headers)
                .map_err(ServerTaskError::ForbiddenByRule)?;
        }

        if let Some(store) = &ctx.cache
            && let Ok(uri) = Uri::from_str(&self.notes.uri)
        {
            validator::remove_other_stale_caches(
                store.as_ref(),
                &self.req.method,
                response.code,
                &uri,
                &response.headers,
            );
        }

        let mut pending = match &store {
            Some(store)
                if self.state.may_cache.get()
                    && validator::is_cacheable(
                        &self.req.method,
                        response.code,
                        &self.req.headers,
                        &response.headers,
                    ) =>
            {
                let meta = CacheEntryMeta {
                    vary: VaryValues::collect(&response.headers, &self.req.headers),
                    reason: response.reason.clone(),
                    headers: response.headers.clone(),
                    request_time,
                    response_time,
                    expires: validator::explicit_expires(&response.headers, response_time),
                };
                Some(PendingCacheWrite::new(
                    store.clone(),
                    key,
                    response.content_length(),
                    meta,
                ))
            }
            _ => None,
        };
        if store.is_some() {
            self.notes.cache = CacheOutcome::Miss;
        }

        self.notes.stage = RequestPhase::ServingResponse;
        self.rsp_started = true;
        let mut forwarder = ResponseForwarder::new(
            &self.req.method,
            self.req.version,
            self.req.uses_proxy_connection(),
            ctx.config.server.body_line_max_size,
        );
        forwarder.set_body_idle_timeout(ctx.config.server.timeout.upstream_body_idle);
        let outcome = forwarder
            .forward(
                &response,
                &mut self.state,
                &mut conn.reader,
                clt_w,
                pending.as_mut().map(|p| p.writer_mut()),
            )
            .await?;
        debug!(
            "forwarded {} body bytes for {}",
            outcome.body_len, self.notes.uri
        );

        if outcome.upstream_reusable {
            connector.release(conn);
        }
        if let Some(pending) = pending
            && self.state.may_cache.get()
        {
            pending.commit();
        }
        Ok(())
    }

    fn refresh_entry(
        &self,
        store: Option<&dyn CacheStore>,
        entry: &Arc<CacheEntry>,
        fresh: &HeaderMap,
        request_time: SystemTime,
        response_time: SystemTime,
    ) -> Arc<CacheEntry> {
        let Some(store) = store else {
            return entry.clone();
        };
        if !self.state.may_cache.get()
            || validator::check_stale_cache(entry, 304, fresh, None) == StaleCheck::RejectOlder
        {
            return entry.clone();
        }
        let mut meta = entry.meta();
        meta.headers = validator::refresh_headers(&entry.headers, fresh);
        meta.request_time = request_time;
        meta.response_time = response_time;
        meta.expires = validator::explicit_expires(&meta.headers, response_time);
        store.supersede(entry, entry.key().clone(), meta)
    }

    /// Answer from a cache entry, returns false if the entry can't serve this request.
    async fn serve_entry<CR, CW>(
        &mut self,
        entry: &CacheEntry,
        stale: bool,
        clt_r: &mut CR,
        clt_w: &mut CW,
    ) -> ServerTaskResult<bool>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let now = SystemTime::now();
        if let Some(status) = validator::is_not_modified(&self.req.headers, &entry.headers) {
            self.drain_before_reply(clt_r).await;
            if status == StatusCode::NOT_MODIFIED {
                self.notes.rsp_status = status.as_u16();
                self.rsp_started = true;
                write_not_modified(entry, now, self.framing(), clt_w)
                    .await
                    .map_err(ServerTaskError::ClientTcpWriteFailed)?;
            } else {
                let rsp = HttpProxyClientResponse::from_standard(
                    status,
                    self.req.version,
                    !self.state.keep_alive.get(),
                );
                self.reply_synthetic(&rsp, clt_w).await?;
            }
            return Ok(true);
        }

        let plan = plan_cached_response(entry, &self.req.headers, now);
        match &plan {
            CachePlan::NotCovered => return Ok(false),
            CachePlan::Unsatisfiable { total } => {
                self.drain_before_reply(clt_r).await;
                let rsp = HttpProxyClientResponse::range_not_satisfiable(
                    self.req.version,
                    !self.state.keep_alive.get(),
                    *total,
                );
                self.reply_synthetic(&rsp, clt_w).await?;
            }
            CachePlan::Serve { status, .. } => {
                self.drain_before_reply(clt_r).await;
                self.notes.rsp_status = status.as_u16();
                self.rsp_started = true;
                let warn = stale && self.ctx.config.cache.warn_on_stale;
                write_cached_response(&plan, &self.req.method, warn, self.framing(), clt_w)
                    .await
                    .map_err(ServerTaskError::ClientTcpWriteFailed)?;
            }
        }
        Ok(true)
    }

    async fn run_tunnel<CR, CW>(
        &mut self,
        must_tunnel: bool,
        clt_r: &mut CR,
        clt_w: &mut CW,
    ) -> ServerTaskResult<()>
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let ctx = self.ctx;
        self.state.bypass_cache();
        self.state.keep_alive.revoke();

        self.notes.stage = RequestPhase::Connecting;
        let hop = ctx
            .resolver
            .resolve(&self.req)
            .ok_or(ServerTaskError::UpstreamNotConnected(
                UpstreamConnectError::NoUpstreamAddress,
            ))?;
        self.notes.upstream_attempts = 1;
        let stream = if must_tunnel {
            tunnel::open_request_tunnel(ctx, &hop, &self.req).await?
        } else {
            let stream = tunnel::open_connect(ctx, &hop, &self.req).await?;
            let rsp =
                HttpProxyClientResponse::from_standard(StatusCode::OK, self.req.version, false);
            self.notes.rsp_status = 200;
            self.rsp_started = true;
            rsp.reply_ok_to_connect(clt_w)
                .await
                .map_err(ServerTaskError::ClientTcpWriteFailed)?;
            stream
        };
        self.rsp_started = true;
        self.body_consumed = true;

        self.notes.stage = RequestPhase::Tunneling;
        let (up, down) = tunnel::relay(clt_r, clt_w, stream).await?;
        debug!("tunnel {} closed, {up} bytes up, {down} bytes down", self.notes.uri);
        Ok(())
    }

    /// Read away the request body the upstream never saw, so the connection stays usable.
    async fn drain_before_reply<CR>(&mut self, clt_r: &mut CR)
    where
        CR: AsyncBufRead + Unpin,
    {
        if self.body_consumed {
            return;
        }
        let Some(body_type) = self.req.body_type() else {
            return;
        };
        self.body_consumed = true;
        if self.req.expect_continue() || self.req.unsupported_expectation().is_some() {
            // the client may wait for an interim response that never comes
            self.state.keep_alive.revoke();
            return;
        }

        let server = &self.ctx.config.server;
        let max = server.client_body_drain_max_size;
        if let HttpBodyType::ContentLength(len) = body_type
            && len > max
        {
            self.state.keep_alive.revoke();
            return;
        }
        let mut reader =
            HttpBodyReader::new(clt_r, &body_type, server.body_line_max_size).take(max + 1);
        let r = tokio::time::timeout(
            server.timeout.client_body_drain,
            tokio::io::copy(&mut reader, &mut tokio::io::sink()),
        )
        .await;
        match r {
            Ok(Ok(n)) if n <= max && reader.get_ref().finished() => {}
            _ => self.state.keep_alive.revoke(),
        }
    }

    async fn reply_synthetic<CW>(
        &mut self,
        rsp: &HttpProxyClientResponse,
        clt_w: &mut CW,
    ) -> ServerTaskResult<()>
    where
        CW: AsyncWrite + Unpin,
    {
        if rsp.should_close() {
            self.state.keep_alive.revoke();
        }
        self.notes.rsp_status = rsp.status();
        self.rsp_started = true;
        rsp.reply_err(clt_w)
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)
    }

    async fn reply_task_error<CR, CW>(&mut self, e: &ServerTaskError, clt_r: &mut CR, clt_w: &mut CW)
    where
        CR: AsyncBufRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        if self.rsp_started {
            // part of the response may be out already
            self.state.keep_alive.revoke();
            return;
        }

        self.drain_before_reply(clt_r).await;
        let version = self.req.version;
        let close = !self.state.keep_alive.get();
        let realm = &self.ctx.config.auth.realm;
        let rsp = match e {
            ServerTaskError::ClientAuthFailed => Some(HttpProxyClientResponse::need_proxy_login(
                version, close, realm,
            )),
            ServerTaskError::ForbiddenByRule(status) if *status == StatusCode::UNAUTHORIZED => {
                Some(HttpProxyClientResponse::need_login(version, close, realm))
            }
            _ => HttpProxyClientResponse::from_task_err(e, version, close),
        };
        let Some(rsp) = rsp else {
            self.state.keep_alive.revoke();
            return;
        };
        if self.reply_synthetic(&rsp, clt_w).await.is_err() {
            self.state.keep_alive.revoke();
        }
    }
}
