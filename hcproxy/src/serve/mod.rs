/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, warn};
use tokio::io::BufReader;
use tokio::net::TcpListener;

use crate::ProxyContext;
use crate::coordinator::serve_client;

mod error;
pub(crate) use error::{ServerTaskError, ServerTaskResult};

mod idle_check;
pub(crate) use idle_check::{ActiveReader, run_with_idle_check};

/// Bind the configured address and serve until interrupted.
pub async fn run(ctx: Arc<ProxyContext>) -> anyhow::Result<()> {
    let listen = ctx.config.server.listen;
    let listener = TcpListener::bind(listen)
        .await
        .context(format!("failed to bind to {listen}"))?;
    info!("listening on {listen}");
    serve(listener, ctx).await;
    Ok(())
}

async fn serve(listener: TcpListener, ctx: Arc<ProxyContext>) {
    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stop accepting new connections");
                break;
            }
            r = listener.accept() => {
                let (stream, peer) = match r {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };
                ctx.stats.add_connection();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("failed to set nodelay for client {peer}: {e}");
                    }
                    let (r, mut w) = stream.into_split();
                    let mut r = BufReader::new(r);
                    serve_client(&ctx, peer, &mut r, &mut w).await;
                    debug!("client {peer} closed, {:?}", ctx.stats.snapshot());
                });
            }
        }
    }
}
