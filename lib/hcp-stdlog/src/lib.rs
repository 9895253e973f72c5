/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};
use std::sync::Arc;

use chrono::Local;
use flume::Receiver;
use slog::Level;

mod async_log;
pub use async_log::{AsyncLogConfig, AsyncLogger, LogStats};

mod format;
use format::StdLogFormatter;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct StdLogValue {
    level: Level,
    message: String,
    kv_pairs: Vec<(String, String)>,
    location: Option<String>,
}

impl StdLogValue {
    fn message_str(&self) -> &str {
        if self.message.is_empty() {
            "()"
        } else {
            &self.message
        }
    }

    fn write_to<IO: Write>(&self, io: &mut IO) -> io::Result<()> {
        write!(io, "{}", Local::now().format(TIME_FORMAT))?;
        write!(io, " {}", self.level.as_short_str())?;
        for (k, v) in &self.kv_pairs {
            write!(io, " {k}: {v},")?;
        }
        write!(io, " {}", self.message_str())?;
        if let Some(location) = &self.location {
            write!(io, " <{location}>")?;
        }
        writeln!(io)
    }
}

/// Create a drain which formats in the caller thread and writes to stderr in a dedicated thread.
pub fn new_async_logger(
    async_conf: &AsyncLogConfig,
    append_code_position: bool,
) -> AsyncLogger<StdLogValue, StdLogFormatter> {
    let (sender, receiver) = flume::bounded::<StdLogValue>(async_conf.channel_capacity);

    let stats = Arc::new(LogStats::default());

    let io_thread = AsyncIoThread {
        receiver,
        stats: Arc::clone(&stats),
    };

    let _detached_thread = std::thread::Builder::new()
        .name(async_conf.thread_name.clone())
        .spawn(move || io_thread.run(io::stderr()));

    AsyncLogger::new(sender, StdLogFormatter::new(append_code_position), stats)
}

struct AsyncIoThread {
    receiver: Receiver<StdLogValue>,
    stats: Arc<LogStats>,
}

impl AsyncIoThread {
    fn run<IO: Write>(&self, mut io: IO) {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        while let Ok(v) = self.receiver.recv() {
            self.write_value(&mut io, &mut buf, v);

            // drain what is queued before flushing
            while let Ok(v) = self.receiver.try_recv() {
                self.write_value(&mut io, &mut buf, v);
            }

            let _ = io.flush();
        }
    }

    fn write_value<IO: Write>(&self, io: &mut IO, buf: &mut Vec<u8>, v: StdLogValue) {
        buf.clear();
        if v.write_to(buf).is_err() {
            self.stats.add_format_failed();
            return;
        }
        match io.write_all(buf) {
            Ok(_) => self.stats.add_passed(buf.len()),
            Err(_) => self.stats.add_io_failed(),
        }
    }
}
