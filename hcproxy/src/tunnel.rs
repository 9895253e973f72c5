/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};

use http::Method;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};

use hcp_http::client::HttpUpstreamResponse;
use hcp_http::server::HttpProxyClientRequest;

use crate::ProxyContext;
use crate::serve::{ServerTaskError, ServerTaskResult};
use crate::upstream::{BoxAsyncRead, BoxAsyncWrite, NextHop, UpstreamConnectError};

pub(crate) struct TunnelStream {
    pub(crate) reader: BufReader<BoxAsyncRead>,
    pub(crate) writer: BoxAsyncWrite,
}

fn not_connected(e: io::Error) -> ServerTaskError {
    ServerTaskError::UpstreamNotConnected(UpstreamConnectError::NotRetryable {
        attempts: 1,
        last: e,
    })
}

async fn dial(ctx: &ProxyContext, hop: &NextHop) -> ServerTaskResult<TunnelStream> {
    let (r, w) = ctx
        .dialer
        .dial(hop.host(), hop.port())
        .await
        .map_err(not_connected)?;
    Ok(TunnelStream {
        reader: BufReader::new(r),
        writer: w,
    })
}

/// Open the byte stream for a `CONNECT` request, through the next proxy if there is one.
pub(crate) async fn open_connect(
    ctx: &ProxyContext,
    hop: &NextHop,
    req: &HttpProxyClientRequest,
) -> ServerTaskResult<TunnelStream> {
    let mut stream = dial(ctx, hop).await?;
    if !hop.is_proxy() {
        return Ok(stream);
    }

    let authority = req.authority().unwrap_or_default();
    let mut head = Vec::with_capacity(256);
    let _ = write!(head, "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(line) = hop.auth_line() {
        head.extend_from_slice(line.as_bytes());
    }
    head.extend_from_slice(b"\r\n");
    stream
        .writer
        .write_all(&head)
        .await
        .map_err(ServerTaskError::UpstreamWriteFailed)?;
    stream
        .writer
        .flush()
        .await
        .map_err(ServerTaskError::UpstreamWriteFailed)?;

    let server = &ctx.config.server;
    let rsp = tokio::time::timeout(
        server.timeout.recv_rsp_header,
        HttpUpstreamResponse::parse(
            &mut stream.reader,
            &Method::CONNECT,
            false,
            server.rsp_header_max_size,
        ),
    )
    .await
    .map_err(|_| ServerTaskError::UpstreamAppTimeout("timed out waiting for CONNECT reply"))??;
    if !(200..300).contains(&rsp.code) {
        return Err(not_connected(io::Error::other(format!(
            "next proxy {hop} refused CONNECT with status {}",
            rsp.code
        ))));
    }
    Ok(stream)
}

/// Send the request head as is and open the stream for the rest of the connection.
pub(crate) async fn open_request_tunnel(
    ctx: &ProxyContext,
    hop: &NextHop,
    req: &HttpProxyClientRequest,
) -> ServerTaskResult<TunnelStream> {
    let mut stream = dial(ctx, hop).await?;
    let head = if hop.is_proxy() {
        let mut lines = Vec::with_capacity(1);
        if let Some(v) = req.proxy_authorization() {
            // the connection based credential is for the next proxy
            lines.push(format!("Proxy-Authorization: {v}\r\n"));
        }
        req.serialize_for_proxy(req.keep_alive(), &lines)
    } else {
        req.serialize_for_origin(req.keep_alive(), &[])
    };
    stream
        .writer
        .write_all(&head)
        .await
        .map_err(ServerTaskError::UpstreamWriteFailed)?;
    Ok(stream)
}

/// Copy bytes both ways until each side has closed its sending half.
pub(crate) async fn relay<CR, CW>(
    clt_r: &mut CR,
    clt_w: &mut CW,
    stream: TunnelStream,
) -> ServerTaskResult<(u64, u64)>
where
    CR: AsyncBufRead + Unpin,
    CW: AsyncWrite + Unpin,
{
    let TunnelStream {
        mut reader,
        mut writer,
    } = stream;

    let clt_to_ups = async {
        let n = tokio::io::copy_buf(clt_r, &mut writer)
            .await
            .map_err(ServerTaskError::ClientTcpReadFailed)?;
        let _ = writer.shutdown().await;
        Ok::<u64, ServerTaskError>(n)
    };
    let ups_to_clt = async {
        let n = tokio::io::copy_buf(&mut reader, clt_w)
            .await
            .map_err(ServerTaskError::UpstreamReadFailed)?;
        let _ = clt_w.shutdown().await;
        Ok::<u64, ServerTaskError>(n)
    };
    tokio::try_join!(clt_to_ups, ups_to_clt)
}
