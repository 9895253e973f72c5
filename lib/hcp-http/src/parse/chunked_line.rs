/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use atoi::FromRadix16Checked;

use super::HttpLineParseError;

pub struct HttpChunkedLine {
    pub chunk_size: u64,
}

impl HttpChunkedLine {
    /// Parse a full chunk-size line, which must end with `\r\n`.
    ///
    /// Chunk extensions are skipped.
    pub fn parse(buf: &[u8]) -> Result<HttpChunkedLine, HttpLineParseError> {
        let Some(line) = buf.strip_suffix(b"\r\n") else {
            return Err(HttpLineParseError::InvalidLineEnding);
        };

        let (chunk_size, offset) = u64::from_radix_16_checked(line);
        let Some(chunk_size) = chunk_size else {
            return Err(HttpLineParseError::InvalidChunkSize);
        };
        if offset == 0 {
            return Err(HttpLineParseError::InvalidChunkSize);
        }

        let left = &line[offset..];
        let left = match left.iter().position(|c| !matches!(c, b' ' | b'\t')) {
            Some(p) => &left[p..],
            None => &[],
        };
        match left.first() {
            None | Some(b';') => Ok(HttpChunkedLine { chunk_size }),
            Some(_) => Err(HttpLineParseError::InvalidChunkSize),
        }
    }
}
