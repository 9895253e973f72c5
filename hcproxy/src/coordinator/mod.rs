/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;

use http::Version;
use log::debug;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use hcp_http::server::{HttpProxyClientRequest, HttpRequestParseError};

use crate::ProxyContext;
use crate::response::HttpProxyClientResponse;

mod notes;
pub(crate) use notes::HttpForwardTaskNotes;

mod state;
pub(crate) use state::ConnectionState;

mod task;
use task::HttpForwardTask;

/// Serve requests on one client connection until it has to be closed.
pub(crate) async fn serve_client<CR, CW>(
    ctx: &ProxyContext,
    client_addr: SocketAddr,
    clt_r: &mut CR,
    clt_w: &mut CW,
) where
    CR: AsyncBufRead + Unpin,
    CW: AsyncWrite + Unpin,
{
    let server = &ctx.config.server;
    loop {
        let mut version = Version::HTTP_11;
        let r = tokio::time::timeout(
            server.timeout.recv_req_header,
            HttpProxyClientRequest::parse(
                clt_r,
                server.request_line_max_size,
                server.req_header_max_size,
                &mut version,
            ),
        )
        .await;
        let req = match r {
            Ok(Ok(req)) => req,
            Ok(Err(HttpRequestParseError::ClientClosed)) => break,
            Ok(Err(e)) => {
                debug!("invalid request from {client_addr}: {e}");
                if let Some(rsp) = HttpProxyClientResponse::from_request_error(&e, version) {
                    let _ = rsp.reply_err(clt_w).await;
                }
                break;
            }
            Err(_) => {
                debug!("timed out waiting request header from {client_addr}");
                break;
            }
        };

        let task = HttpForwardTask::new(ctx, req, client_addr);
        if !task.run(clt_r, clt_w).await {
            break;
        }
    }
    let _ = clt_w.shutdown().await;
}
