/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Sender, TrySendError};
use slog::{Drain, OwnedKVList, Record};

#[derive(Clone, Debug)]
pub struct AsyncLogConfig {
    pub channel_capacity: usize,
    pub thread_name: String,
}

impl AsyncLogConfig {
    pub fn with_name(thread_name: &str) -> Self {
        AsyncLogConfig {
            channel_capacity: 1024,
            thread_name: thread_name.to_string(),
        }
    }
}

impl Default for AsyncLogConfig {
    fn default() -> Self {
        AsyncLogConfig::with_name("log-process")
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    pub total: u64,
    pub passed: u64,
    pub size: u64,
    pub format_failed: u64,
    pub channel_overflow: u64,
    pub channel_closed: u64,
    pub io_failed: u64,
}

#[derive(Default)]
pub struct LogStats {
    total: AtomicU64,
    passed: AtomicU64,
    size: AtomicU64,
    format_failed: AtomicU64,
    channel_overflow: AtomicU64,
    channel_closed: AtomicU64,
    io_failed: AtomicU64,
}

impl LogStats {
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            total: self.total.load(Ordering::Relaxed),
            passed: self.passed.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
            format_failed: self.format_failed.load(Ordering::Relaxed),
            channel_overflow: self.channel_overflow.load(Ordering::Relaxed),
            channel_closed: self.channel_closed.load(Ordering::Relaxed),
            io_failed: self.io_failed.load(Ordering::Relaxed),
        }
    }

    fn add_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_passed(&self, size: usize) {
        self.passed.fetch_add(1, Ordering::Relaxed);
        self.size.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_format_failed(&self) {
        self.format_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn add_channel_overflow(&self) {
        self.channel_overflow.fetch_add(1, Ordering::Relaxed);
    }

    fn add_channel_closed(&self) {
        self.channel_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_io_failed(&self) {
        self.io_failed.fetch_add(1, Ordering::Relaxed);
    }
}

pub trait AsyncLogFormatter<T> {
    fn format_slog(&self, record: &Record, logger_values: &OwnedKVList) -> Result<T, slog::Error>;
}

/// A slog drain that never blocks, records are dropped when the channel is full.
pub struct AsyncLogger<T, F>
where
    F: AsyncLogFormatter<T>,
{
    sender: Sender<T>,
    formatter: F,
    stats: Arc<LogStats>,
}

impl<T, F> AsyncLogger<T, F>
where
    F: AsyncLogFormatter<T>,
{
    pub fn new(sender: Sender<T>, formatter: F, stats: Arc<LogStats>) -> Self {
        AsyncLogger {
            sender,
            formatter,
            stats,
        }
    }
}

impl<T, F> Drain for AsyncLogger<T, F>
where
    F: AsyncLogFormatter<T>,
{
    type Ok = ();
    type Err = slog::Error;

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), slog::Error> {
        self.stats.add_total();

        let v = self.formatter.format_slog(record, logger_values).map_err(|e| {
            self.stats.add_format_failed();
            e
        })?;
        match self.sender.try_send(v) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => self.stats.add_channel_overflow(),
            Err(TrySendError::Disconnected(_)) => self.stats.add_channel_closed(),
        }
        Ok(())
    }
}
