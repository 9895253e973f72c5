/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use slog::{Record, Serializer, Value};

pub(crate) struct LtDuration(pub(crate) Duration);

impl Value for LtDuration {
    fn serialize(
        &self,
        _record: &Record,
        key: slog::Key,
        serializer: &mut dyn Serializer,
    ) -> slog::Result {
        if self.0.is_zero() {
            serializer.emit_none(key)
        } else {
            serializer.emit_arguments(key, &format_args!("{:.3?}", self.0))
        }
    }
}

/// An absolute request uri with the userinfo password masked, cut at `max_chars`.
pub(crate) struct LtHttpUri<'a> {
    uri: &'a str,
    max_chars: usize,
}

impl<'a> LtHttpUri<'a> {
    pub(crate) fn new(uri: &'a str, max_chars: usize) -> Self {
        LtHttpUri { uri, max_chars }
    }

    fn masked(&self) -> String {
        let (scheme, rest) = match self.uri.split_once("://") {
            Some((s, r)) => (Some(s), r),
            None => (None, self.uri),
        };
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        let mut s = String::with_capacity(self.uri.len());
        if let Some(scheme) = scheme {
            s.push_str(scheme);
            s.push_str("://");
        }
        match authority.rfind('@') {
            Some(at) => {
                let userinfo = &authority[..at];
                match userinfo.find(':') {
                    Some(p) => {
                        s.push_str(&userinfo[..=p]);
                        s.push_str("xyz");
                    }
                    None => s.push_str(userinfo),
                }
                s.push_str(&authority[at..]);
            }
            None => s.push_str(authority),
        }
        s.push_str(&rest[authority_end..]);
        s
    }
}

impl Value for LtHttpUri<'_> {
    fn serialize(
        &self,
        _record: &Record,
        key: slog::Key,
        serializer: &mut dyn Serializer,
    ) -> slog::Result {
        let uri = self.masked();
        match uri.char_indices().nth(self.max_chars) {
            Some((i, _)) => serializer.emit_str(key, &uri[..i]),
            None => serializer.emit_str(key, &uri),
        }
    }
}
