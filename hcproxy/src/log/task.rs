/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use slog::{Logger, slog_info};

use super::{LtDuration, LtHttpUri};
use crate::coordinator::HttpForwardTaskNotes;
use crate::serve::ServerTaskError;

const URI_LOG_MAX_CHARS: usize = 1024;

pub(crate) struct TaskLogForHttpForward<'a> {
    pub(crate) logger: &'a Logger,
    pub(crate) task_notes: &'a HttpForwardTaskNotes,
}

impl TaskLogForHttpForward<'_> {
    pub(crate) fn log(&self, e: Option<&ServerTaskError>) {
        let notes = self.task_notes;
        slog_info!(self.logger, "{}", e.map(|e| e.to_string()).unwrap_or_default();
            "task_type" => "HttpForward",
            "stage" => notes.stage.brief(),
            "client_addr" => notes.client_addr,
            "method" => notes.method.as_str(),
            "uri" => LtHttpUri::new(&notes.uri, URI_LOG_MAX_CHARS),
            "rsp_status" => notes.rsp_status,
            "cache" => notes.cache.as_str(),
            "upstream_attempts" => notes.upstream_attempts,
            "keep_alive" => notes.keep_alive,
            "total_time" => LtDuration(notes.time_elapsed()),
            "reason" => e.map(|e| e.brief()),
        )
    }
}
