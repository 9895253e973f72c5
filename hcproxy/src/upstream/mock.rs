/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::{BoxAsyncRead, BoxAsyncWrite, UpstreamDialer};

/// Behavior of one dialed test upstream.
#[derive(Clone, Copy, Debug)]
pub(crate) enum MockUpstream {
    Refuse,
    /// answer every request head with the same bytes
    Respond(&'static [u8]),
    Echo,
}

pub(crate) struct MockDialer {
    plan: Mutex<VecDeque<MockUpstream>>,
    fallback: MockUpstream,
    dials: Arc<AtomicUsize>,
}

impl MockDialer {
    pub(crate) fn new(plan: Vec<MockUpstream>, fallback: MockUpstream) -> (Self, Arc<AtomicUsize>) {
        let dials = Arc::new(AtomicUsize::new(0));
        let dialer = MockDialer {
            plan: Mutex::new(plan.into()),
            fallback,
            dials: dials.clone(),
        };
        (dialer, dials)
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn respond(mut stream: DuplexStream, rsp: &'static [u8]) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&tmp[..n]);
        while let Some(pos) = find_head_end(&buf) {
            buf.drain(..pos + 4);
            if stream.write_all(rsp).await.is_err() {
                return;
            }
        }
    }
}

async fn echo(stream: DuplexStream) {
    let (mut r, mut w) = tokio::io::split(stream);
    let _ = tokio::io::copy(&mut r, &mut w).await;
}

#[async_trait]
impl UpstreamDialer for MockDialer {
    async fn dial(&self, _host: &str, _port: u16) -> io::Result<(BoxAsyncRead, BoxAsyncWrite)> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut plan = self.plan.lock().unwrap();
            plan.pop_front().unwrap_or(self.fallback)
        };
        let (local, remote) = tokio::io::duplex(1 << 16);
        match next {
            MockUpstream::Refuse => {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            MockUpstream::Respond(rsp) => {
                tokio::spawn(respond(remote, rsp));
            }
            MockUpstream::Echo => {
                tokio::spawn(echo(remote));
            }
        }
        let (r, w) = tokio::io::split(local);
        Ok((Box::new(r), Box::new(w)))
    }
}
