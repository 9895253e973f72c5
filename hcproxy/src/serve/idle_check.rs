/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

/// Marks every read that yields data, so a copy over it can be checked for idleness.
pub(crate) struct ActiveReader<'a, R> {
    inner: R,
    active: &'a AtomicBool,
}

impl<'a, R> ActiveReader<'a, R> {
    pub(crate) fn new(inner: R, active: &'a AtomicBool) -> Self {
        ActiveReader { inner, active }
    }

    pub(crate) fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R> AsyncRead for ActiveReader<'_, R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let r = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &r
            && buf.filled().len() > before
        {
            self.active.store(true, Ordering::Relaxed);
        }
        r
    }
}

/// Drive `copy` until it completes, or until a whole `idle` interval passes
/// without the reader making progress, in which case `None` is returned.
///
/// A copy stuck on its write side stops reading too, so both directions are covered.
pub(crate) async fn run_with_idle_check<F, T>(
    copy: F,
    active: &AtomicBool,
    idle: Duration,
) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::pin!(copy);
    let mut idle_interval = tokio::time::interval_at(Instant::now() + idle, idle);
    loop {
        tokio::select! {
            biased;

            r = &mut copy => return Some(r),
            _ = idle_interval.tick() => {
                if !active.swap(false, Ordering::Relaxed) {
                    return None;
                }
            }
        }
    }
}
