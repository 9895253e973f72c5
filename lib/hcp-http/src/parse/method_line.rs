/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use super::HttpLineParseError;

pub struct HttpMethodLine<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub version: u8,
}

impl<'a> HttpMethodLine<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<HttpMethodLine<'a>, HttpLineParseError> {
        const MINIMAL_LENGTH: usize = 15; // GET / HTTP/1.x\n

        if buf.len() < MINIMAL_LENGTH {
            return Err(HttpLineParseError::NotLongEnough);
        }

        let line = std::str::from_utf8(buf)?.trim_end();

        let Some(p1) = memchr::memchr(b' ', line.as_bytes()) else {
            return Err(HttpLineParseError::NoDelimiterFound(' '));
        };
        let Some(p2) = memchr::memrchr(b' ', line.as_bytes()) else {
            return Err(HttpLineParseError::NoDelimiterFound(' '));
        };
        if p1 == p2 {
            return Err(HttpLineParseError::NoDelimiterFound(' '));
        }

        let method = &line[0..p1];
        let uri = line[p1 + 1..p2].trim();
        if method.is_empty() || uri.is_empty() {
            return Err(HttpLineParseError::NotLongEnough);
        }

        let version = match &line[p2 + 1..] {
            "HTTP/1.0" => 0,
            "HTTP/1.1" => 1,
            _ => return Err(HttpLineParseError::InvalidVersion),
        };

        Ok(HttpMethodLine {
            method,
            uri,
            version,
        })
    }
}
