/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::Write;
use std::str::FromStr;

use bytes::BufMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use mime::Mime;
use tokio::io::AsyncBufRead;

use super::HttpResponseParseError;
use crate::{HttpBodyType, HttpHeaderLine, HttpLineParseError, HttpStatusLine, LimitedBufReadExt};

pub struct HttpUpstreamResponse {
    pub version: Version,
    pub code: u16,
    pub reason: String,
    /// end-to-end headers only, the framing headers are kept aside
    pub headers: HeaderMap,
    connection_tokens: Vec<HeaderName>,
    origin_header_size: usize,
    keep_alive: bool,
    content_length: Option<u64>,
    chunked_transfer: bool,
    byteranges_boundary: Option<String>,
}

impl HttpUpstreamResponse {
    fn new(version: Version, code: u16, reason: String) -> Self {
        HttpUpstreamResponse {
            version,
            code,
            reason,
            headers: HeaderMap::new(),
            connection_tokens: Vec::new(),
            origin_header_size: 0,
            keep_alive: false,
            content_length: None,
            chunked_transfer: false,
            byteranges_boundary: None,
        }
    }

    pub fn origin_header_size(&self) -> usize {
        self.origin_header_size
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The value of the `Content-Length` header, if one was received.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    #[inline]
    pub fn is_informational(&self) -> bool {
        self.code < 200
    }

    fn expect_no_body(&self, method: &Method) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304 || method.eq(&Method::HEAD)
    }

    pub fn body_type(&self, method: &Method) -> Option<HttpBodyType> {
        // see https://datatracker.ietf.org/doc/html/rfc9112#section-6.3 for Message Body Length
        if self.expect_no_body(method) {
            None
        } else if self.chunked_transfer {
            Some(HttpBodyType::Chunked)
        } else if let Some(len) = self.content_length {
            if len > 0 {
                Some(HttpBodyType::ContentLength(len))
            } else {
                None
            }
        } else if let Some(boundary) = &self.byteranges_boundary {
            Some(HttpBodyType::MultipartByteRanges(boundary.clone()))
        } else {
            Some(HttpBodyType::ReadUntilEnd)
        }
    }

    pub async fn parse<R>(
        reader: &mut R,
        method: &Method,
        keep_alive: bool,
        max_header_size: usize,
    ) -> Result<Self, HttpResponseParseError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buf = Vec::<u8>::with_capacity(1024);
        let mut header_size: usize = 0;

        let (found, nr) = reader
            .limited_read_until(b'\n', max_header_size, &mut line_buf)
            .await?;
        if nr == 0 {
            return Err(HttpResponseParseError::RemoteClosed);
        }
        if !found {
            return if nr < max_header_size {
                Err(HttpResponseParseError::RemoteClosed)
            } else {
                Err(HttpResponseParseError::TooLargeHeader(max_header_size))
            };
        }
        header_size += nr;

        let mut rsp = HttpUpstreamResponse::build_from_status_line(line_buf.as_ref())?;
        rsp.keep_alive = keep_alive && rsp.version == Version::HTTP_11;

        let mut pending: Option<(HeaderName, String)> = None;
        loop {
            if header_size >= max_header_size {
                return Err(HttpResponseParseError::TooLargeHeader(max_header_size));
            }
            line_buf.clear();
            let max_len = max_header_size - header_size;
            let (found, nr) = reader
                .limited_read_until(b'\n', max_len, &mut line_buf)
                .await?;
            if nr == 0 {
                return Err(HttpResponseParseError::RemoteClosed);
            }
            if !found {
                return if nr < max_len {
                    Err(HttpResponseParseError::RemoteClosed)
                } else {
                    Err(HttpResponseParseError::TooLargeHeader(max_header_size))
                };
            }
            header_size += nr;
            if (line_buf.len() == 1 && line_buf[0] == b'\n')
                || (line_buf.len() == 2 && line_buf[0] == b'\r' && line_buf[1] == b'\n')
            {
                // header end line
                break;
            }

            if HttpHeaderLine::is_continuation(&line_buf) {
                let Some((_, value)) = pending.as_mut() else {
                    return Err(HttpResponseParseError::InvalidHeaderLine(
                        HttpLineParseError::InvalidHeaderValue,
                    ));
                };
                let more = std::str::from_utf8(&line_buf)
                    .map_err(|e| HttpResponseParseError::InvalidHeaderLine(e.into()))?;
                value.push(' ');
                value.push_str(more.trim());
                continue;
            }

            if let Some((name, value)) = pending.take() {
                rsp.handle_header(name, &value, keep_alive)?;
            }
            let header = HttpHeaderLine::parse(line_buf.as_ref())
                .map_err(HttpResponseParseError::InvalidHeaderLine)?;
            let name = HeaderName::from_str(header.name).map_err(|_| {
                HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderName)
            })?;
            pending = Some((name, header.value.to_string()));
        }
        if let Some((name, value)) = pending.take() {
            rsp.handle_header(name, &value, keep_alive)?;
        }
        rsp.origin_header_size = header_size;

        rsp.post_check_and_fix(method);
        Ok(rsp)
    }

    fn post_check_and_fix(&mut self, method: &Method) {
        for name in &self.connection_tokens {
            self.headers.remove(name);
        }

        if !self.chunked_transfer && !self.expect_no_body(method) && self.content_length.is_none()
        {
            // read to end and close the connection
            self.keep_alive = false;
        }
    }

    fn build_from_status_line(line_buf: &[u8]) -> Result<Self, HttpResponseParseError> {
        let rsp =
            HttpStatusLine::parse(line_buf).map_err(HttpResponseParseError::InvalidStatusLine)?;
        let version = match rsp.version {
            0 => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        Ok(HttpUpstreamResponse::new(
            version,
            rsp.code,
            rsp.reason.to_string(),
        ))
    }

    fn append_header(
        &mut self,
        name: HeaderName,
        value: &str,
    ) -> Result<(), HttpResponseParseError> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderValue)
        })?;
        self.headers.append(name, value);
        Ok(())
    }

    fn handle_header(
        &mut self,
        name: HeaderName,
        value: &str,
        request_keep_alive: bool,
    ) -> Result<(), HttpResponseParseError> {
        match name.as_str() {
            "connection" | "proxy-connection" => {
                // proxy-connection is not standard, but some servers still send it
                for v in value.split(',') {
                    let v = v.trim();
                    if v.is_empty() {
                        continue;
                    }

                    if v.eq_ignore_ascii_case("keep-alive") {
                        // an HTTP/1.0 server may opt in
                        self.keep_alive = request_keep_alive;
                    } else if v.eq_ignore_ascii_case("close") {
                        self.keep_alive = false;
                    } else if let Ok(h) = HeaderName::from_str(v) {
                        self.connection_tokens.push(h);
                    }
                }
                Ok(())
            }
            "keep-alive" | "te" | "trailer" | "upgrade" | "proxy-authenticate" => Ok(()),
            "transfer-encoding" => {
                if self.content_length.take().is_some() {
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                }

                let v = value.to_lowercase();
                if v.ends_with("chunked") {
                    self.chunked_transfer = true;
                } else if v.contains("chunked") {
                    return Err(HttpResponseParseError::InvalidChunkedTransferEncoding);
                }
                Ok(())
            }
            "content-length" => {
                if self.chunked_transfer {
                    // ignore content-length
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                    return Ok(());
                }

                let content_length = u64::from_str(value)
                    .map_err(|_| HttpResponseParseError::InvalidContentLength)?;
                if let Some(len) = self.content_length
                    && len != content_length
                {
                    return Err(HttpResponseParseError::InvalidContentLength);
                }
                self.content_length = Some(content_length);
                Ok(())
            }
            "content-type" => {
                if let Ok(mime) = Mime::from_str(value)
                    && mime.type_() == mime::MULTIPART
                    && mime.subtype() == "byteranges"
                    && let Some(boundary) = mime.get_param(mime::BOUNDARY)
                {
                    self.byteranges_boundary = Some(boundary.to_string());
                }
                self.append_header(name, value)
            }
            _ => self.append_header(name, value),
        }
    }

    /// Response head for the client. The status line is always sent as HTTP/1.1.
    ///
    /// Each of `extra_lines` must be a complete header line ending with CRLF, the
    /// framing headers should be among them.
    pub fn serialize(&self, keep_alive: bool, extra_lines: &[String]) -> Vec<u8> {
        const RESERVED_LEN_FOR_EXTRA_HEADERS: usize = 256;
        let mut buf =
            Vec::<u8>::with_capacity(self.origin_header_size + RESERVED_LEN_FOR_EXTRA_HEADERS);
        let _ = write!(buf, "HTTP/1.1 {} {}\r\n", self.code, self.reason);
        for (name, value) in self.headers.iter() {
            buf.put_slice(name.as_ref());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        for line in extra_lines {
            buf.put_slice(line.as_bytes());
        }
        buf.put_slice(crate::header::connection_as_bytes(!keep_alive));
        buf.put_slice(b"\r\n");
        buf
    }

    /// Interim 1xx response head, relayed as is.
    pub fn serialize_informational(&self) -> Vec<u8> {
        let mut buf = Vec::<u8>::with_capacity(self.origin_header_size);
        let _ = write!(buf, "HTTP/1.1 {} {}\r\n", self.code, self.reason);
        for (name, value) in self.headers.iter() {
            buf.put_slice(name.as_ref());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use std::io;
    use tokio::io::BufReader;
    use tokio_util::io::StreamReader;

    async fn parse_one(
        content: &'static [u8],
        method: &Method,
    ) -> Result<HttpUpstreamResponse, HttpResponseParseError> {
        let stream = stream::iter(vec![io::Result::Ok(Bytes::from_static(content))]);
        let mut buf_stream = BufReader::new(StreamReader::new(stream));
        HttpUpstreamResponse::parse(&mut buf_stream, method, true, 4096).await
    }

    #[tokio::test]
    async fn read_get() {
        let method = Method::GET;
        let rsp = parse_one(
            b"HTTP/1.1 200 OK\r\n\
            Date: Fri, 11 Nov 2022 03:22:03 GMT\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            Content-Length: 4\r\n\
            Connection: keep-alive\r\n\r\n",
            &method,
        )
        .await
        .unwrap();
        assert_eq!(rsp.code, 200);
        assert!(rsp.keep_alive());
        assert_eq!(rsp.body_type(&method), Some(HttpBodyType::ContentLength(4)));
        assert!(!rsp.headers.contains_key(http::header::CONTENT_LENGTH));
        assert!(!rsp.headers.contains_key(http::header::CONNECTION));
    }

    #[tokio::test]
    async fn read_until_end() {
        let method = Method::GET;
        let rsp = parse_one(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n", &method)
            .await
            .unwrap();
        assert!(!rsp.keep_alive());
        assert_eq!(rsp.body_type(&method), Some(HttpBodyType::ReadUntilEnd));
    }

    #[tokio::test]
    async fn http10_keep_alive() {
        let method = Method::GET;
        let rsp = parse_one(
            b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n",
            &method,
        )
        .await
        .unwrap();
        assert!(rsp.keep_alive());
        assert!(rsp.body_type(&method).is_none());

        let rsp = parse_one(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n", &method)
            .await
            .unwrap();
        assert!(!rsp.keep_alive());
    }

    #[tokio::test]
    async fn no_body() {
        let rsp = parse_one(
            b"HTTP/1.1 304 Not Modified\r\nETag: \"abc\"\r\n\r\n",
            &Method::GET,
        )
        .await
        .unwrap();
        assert!(rsp.keep_alive());
        assert!(rsp.body_type(&Method::GET).is_none());

        let rsp = parse_one(
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n",
            &Method::HEAD,
        )
        .await
        .unwrap();
        assert!(rsp.body_type(&Method::HEAD).is_none());
        assert_eq!(rsp.content_length(), Some(100));
    }

    #[tokio::test]
    async fn chunked_overrides_length() {
        let method = Method::GET;
        let rsp = parse_one(
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n",
            &method,
        )
        .await
        .unwrap();
        assert_eq!(rsp.body_type(&method), Some(HttpBodyType::Chunked));
        assert!(!rsp.keep_alive());
    }

    #[tokio::test]
    async fn informational() {
        let rsp = parse_one(b"HTTP/1.1 100 Continue\r\n\r\n", &Method::POST)
            .await
            .unwrap();
        assert!(rsp.is_informational());
        assert_eq!(
            rsp.serialize_informational().as_slice(),
            b"HTTP/1.1 100 Continue\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn serialize() {
        let rsp = parse_one(
            b"HTTP/1.0 200 OK\r\n\
            X-Folded: a\r\n b\r\n\
            Content-Length: 3\r\n\r\n",
            &Method::GET,
        )
        .await
        .unwrap();
        let extra = vec!["Content-Length: 3\r\n".to_string()];
        assert_eq!(
            rsp.serialize(false, &extra).as_slice(),
            b"HTTP/1.1 200 OK\r\nx-folded: a b\r\nContent-Length: 3\r\nConnection: Close\r\n\r\n"
        );
    }
}
