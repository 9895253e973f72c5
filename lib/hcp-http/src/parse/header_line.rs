/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use super::HttpLineParseError;

pub struct HttpHeaderLine<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> HttpHeaderLine<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<HttpHeaderLine<'a>, HttpLineParseError> {
        let line = std::str::from_utf8(buf)?;
        let Some(p) = memchr::memchr(b':', line.as_bytes()) else {
            return Err(HttpLineParseError::NoDelimiterFound(':'));
        };

        let name = line[0..p].trim();
        if name.is_empty() || name.len() != line[0..p].len() {
            // no whitespace allowed between field name and colon, rfc9112 Section 5.1
            return Err(HttpLineParseError::InvalidHeaderName);
        }
        let value = line[p + 1..].trim();

        Ok(HttpHeaderLine { name, value })
    }

    /// Continuation lines of an obsolete folded header start with SP or HTAB.
    pub fn is_continuation(buf: &[u8]) -> bool {
        matches!(buf.first(), Some(b' ' | b'\t'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal() {
        let h = HttpHeaderLine::parse(b"Host: example.com\r\n").unwrap();
        assert_eq!(h.name, "Host");
        assert_eq!(h.value, "example.com");

        let h = HttpHeaderLine::parse(b"X-Empty:\r\n").unwrap();
        assert_eq!(h.name, "X-Empty");
        assert_eq!(h.value, "");
    }

    #[test]
    fn invalid() {
        assert!(HttpHeaderLine::parse(b"Host example.com\r\n").is_err());
        assert!(HttpHeaderLine::parse(b"Host : example.com\r\n").is_err());
        assert!(HttpHeaderLine::parse(b": example.com\r\n").is_err());
    }

    #[test]
    fn continuation() {
        assert!(HttpHeaderLine::is_continuation(b" more\r\n"));
        assert!(HttpHeaderLine::is_continuation(b"\tmore\r\n"));
        assert!(!HttpHeaderLine::is_continuation(b"X-A: b\r\n"));
    }
}
