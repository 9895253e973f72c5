/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::Write;
use std::str::FromStr;

use bytes::BufMut;
use http::uri::Authority;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use mime::Mime;
use tokio::io::AsyncBufRead;

use super::HttpRequestParseError;
use crate::{HttpBodyType, HttpHeaderLine, HttpLineParseError, HttpMethodLine, LimitedBufReadExt};

pub struct HttpProxyClientRequest {
    pub version: Version,
    pub method: Method,
    pub uri: Uri,
    /// end-to-end headers only, `Host` and the framing headers are kept aside
    pub headers: HeaderMap,
    pub host: Option<String>,
    connection_tokens: Vec<HeaderName>,
    origin_header_size: usize,
    keep_alive: bool,
    proxy_connection: bool,
    content_length: Option<u64>,
    chunked_transfer: bool,
    byteranges_boundary: Option<String>,
    expect_continue: bool,
    unsupported_expect: Option<String>,
    proxy_authorization: Option<String>,
}

impl HttpProxyClientRequest {
    fn new(method: Method, uri: Uri, version: Version) -> Self {
        HttpProxyClientRequest {
            version,
            method,
            uri,
            headers: HeaderMap::new(),
            host: None,
            connection_tokens: Vec::new(),
            origin_header_size: 0,
            keep_alive: version == Version::HTTP_11,
            proxy_connection: false,
            content_length: None,
            chunked_transfer: false,
            byteranges_boundary: None,
            expect_continue: false,
            unsupported_expect: None,
            proxy_authorization: None,
        }
    }

    #[inline]
    pub fn origin_header_size(&self) -> usize {
        self.origin_header_size
    }

    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The client used the legacy `Proxy-Connection` header.
    #[inline]
    pub fn uses_proxy_connection(&self) -> bool {
        self.proxy_connection
    }

    #[inline]
    pub fn expect_continue(&self) -> bool {
        self.expect_continue
    }

    /// Any `Expect` value other than `100-continue`.
    #[inline]
    pub fn unsupported_expectation(&self) -> Option<&str> {
        self.unsupported_expect.as_deref()
    }

    #[inline]
    pub fn proxy_authorization(&self) -> Option<&str> {
        self.proxy_authorization.as_deref()
    }

    pub fn body_type(&self) -> Option<HttpBodyType> {
        if self.chunked_transfer {
            Some(HttpBodyType::Chunked)
        } else if let Some(len) = self.content_length {
            if len > 0 {
                Some(HttpBodyType::ContentLength(len))
            } else {
                None
            }
        } else {
            self.byteranges_boundary
                .as_ref()
                .map(|b| HttpBodyType::MultipartByteRanges(b.clone()))
        }
    }

    /// `scheme://authority/path?query`, used as cache key and in logs.
    pub fn absolute_uri(&self) -> String {
        if self.method == Method::CONNECT {
            return self.authority().unwrap_or_default().to_string();
        }
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let authority = self.authority().unwrap_or_default();
        format!("{scheme}://{authority}{}", self.path_and_query())
    }

    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// The authority from the request target, or from `Host` for origin-form targets.
    pub fn authority(&self) -> Option<&str> {
        self.uri
            .authority()
            .map(|a| a.as_str())
            .or(self.host.as_deref())
    }

    /// Host and port of the origin server the request is addressed to.
    pub fn upstream_host_port(&self) -> Option<(String, u16)> {
        let authority = Authority::from_str(self.authority()?).ok()?;
        let default_port = if self.method == Method::CONNECT {
            443
        } else {
            match self.uri.scheme_str() {
                Some(s) if s.eq_ignore_ascii_case("https") => 443,
                _ => 80,
            }
        };
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        Some((host.to_string(), authority.port_u16().unwrap_or(default_port)))
    }

    pub async fn parse<R>(
        reader: &mut R,
        max_line_size: usize,
        max_header_size: usize,
        version: &mut Version,
    ) -> Result<Self, HttpRequestParseError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buf = Vec::<u8>::with_capacity(1024);
        let mut header_size: usize = 0;

        let (found, nr) = reader
            .limited_read_until(b'\n', max_line_size, &mut line_buf)
            .await?;
        if nr == 0 {
            return Err(HttpRequestParseError::ClientClosed);
        }
        if !found {
            return if nr < max_line_size {
                Err(HttpRequestParseError::ClientClosed)
            } else {
                Err(HttpRequestParseError::TooLongRequestLine(max_line_size))
            };
        }
        header_size += nr;

        let mut req = HttpProxyClientRequest::build_from_method_line(line_buf.as_ref())?;
        *version = req.version; // always set version in case of error

        let mut pending: Option<(HeaderName, String)> = None;
        loop {
            if header_size >= max_header_size {
                return Err(HttpRequestParseError::TooLargeHeader(max_header_size));
            }
            line_buf.clear();
            let max_len = max_header_size - header_size;
            let (found, nr) = reader
                .limited_read_until(b'\n', max_len, &mut line_buf)
                .await?;
            if nr == 0 {
                return Err(HttpRequestParseError::ClientClosed);
            }
            if !found {
                return if nr < max_len {
                    Err(HttpRequestParseError::ClientClosed)
                } else {
                    Err(HttpRequestParseError::TooLargeHeader(max_header_size))
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
                // obsolete line folding, rfc9112 Section 5.2
                let Some((_, value)) = pending.as_mut() else {
                    return Err(HttpRequestParseError::InvalidHeaderLine(
                        HttpLineParseError::InvalidHeaderValue,
                    ));
                };
                let more = std::str::from_utf8(&line_buf)
                    .map_err(|e| HttpRequestParseError::InvalidHeaderLine(e.into()))?;
                value.push(' ');
                value.push_str(more.trim());
                continue;
            }

            if let Some((name, value)) = pending.take() {
                req.handle_header(name, &value)?;
            }
            let header = HttpHeaderLine::parse(line_buf.as_ref())
                .map_err(HttpRequestParseError::InvalidHeaderLine)?;
            let name = HeaderName::from_str(header.name).map_err(|_| {
                HttpRequestParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderName)
            })?;
            pending = Some((name, header.value.to_string()));
        }
        if let Some((name, value)) = pending.take() {
            req.handle_header(name, &value)?;
        }
        req.origin_header_size = header_size;

        req.post_check_and_fix()?;
        Ok(req)
    }

    fn post_check_and_fix(&mut self) -> Result<(), HttpRequestParseError> {
        for name in &self.connection_tokens {
            self.headers.remove(name);
        }

        if self.uri.authority().is_none() {
            if self.method == Method::CONNECT {
                return Err(HttpRequestParseError::InvalidRequestTarget);
            }
            if self.host.is_none() {
                return Err(HttpRequestParseError::MissedHost);
            }
        }
        if self.version == Version::HTTP_11 && self.host.is_none() {
            // rfc9112 Section 3.2
            return Err(HttpRequestParseError::MissedHost);
        }
        Ok(())
    }

    fn build_from_method_line(line_buf: &[u8]) -> Result<Self, HttpRequestParseError> {
        let req =
            HttpMethodLine::parse(line_buf).map_err(HttpRequestParseError::InvalidMethodLine)?;

        let version = match req.version {
            0 => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let method = Method::from_str(req.method)
            .map_err(|_| HttpRequestParseError::UnsupportedMethod(req.method.to_string()))?;
        let uri =
            Uri::from_str(req.uri).map_err(|_| HttpRequestParseError::InvalidRequestTarget)?;
        if let Some(scheme) = uri.scheme_str()
            && !scheme.eq_ignore_ascii_case("http")
        {
            return Err(HttpRequestParseError::InvalidRequestTarget);
        }
        Ok(HttpProxyClientRequest::new(method, uri, version))
    }

    fn parse_header_connection(&mut self, value: &str) {
        for v in value.split(',') {
            let v = v.trim();
            if v.is_empty() {
                continue;
            }

            if v.eq_ignore_ascii_case("keep-alive") {
                self.keep_alive = true;
            } else if v.eq_ignore_ascii_case("close") {
                self.keep_alive = false;
            } else if let Ok(h) = HeaderName::from_str(v) {
                self.connection_tokens.push(h);
            }
        }
    }

    fn append_header(&mut self, name: HeaderName, value: &str) -> Result<(), HttpRequestParseError> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            HttpRequestParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderValue)
        })?;
        self.headers.append(name, value);
        Ok(())
    }

    fn handle_header(&mut self, name: HeaderName, value: &str) -> Result<(), HttpRequestParseError> {
        match name.as_str() {
            "host" => {
                if self.host.is_some() {
                    return Err(HttpRequestParseError::InvalidHost);
                }
                if value.is_empty() || Authority::from_str(value).is_err() {
                    return Err(HttpRequestParseError::InvalidHost);
                }
                self.host = Some(value.to_string());
                Ok(())
            }
            "connection" => {
                self.parse_header_connection(value);
                Ok(())
            }
            "proxy-connection" => {
                self.proxy_connection = true;
                self.parse_header_connection(value);
                Ok(())
            }
            "keep-alive" | "te" | "trailer" | "upgrade" | "proxy-authenticate" => Ok(()),
            "proxy-authorization" => {
                self.proxy_authorization = Some(value.to_string());
                Ok(())
            }
            "expect" => {
                if value.eq_ignore_ascii_case("100-continue") {
                    self.expect_continue = true;
                } else {
                    self.unsupported_expect = Some(value.to_string());
                }
                Ok(())
            }
            "transfer-encoding" => {
                if self.content_length.take().is_some() {
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                }
                let v = value.to_lowercase();
                if v.ends_with("chunked") {
                    self.chunked_transfer = true;
                    Ok(())
                } else {
                    Err(HttpRequestParseError::InvalidChunkedTransferEncoding)
                }
            }
            "content-length" => {
                if self.chunked_transfer {
                    self.keep_alive = false; // according to rfc9112 Section 6.1
                    return Ok(());
                }

                let content_length = u64::from_str(value)
                    .map_err(|_| HttpRequestParseError::InvalidContentLength)?;
                if let Some(len) = self.content_length
                    && len != content_length
                {
                    return Err(HttpRequestParseError::InvalidContentLength);
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

    fn serialize(&self, target: &str, keep_alive: bool, extra_lines: &[String]) -> Vec<u8> {
        const RESERVED_LEN_FOR_EXTRA_HEADERS: usize = 256;
        let mut buf =
            Vec::<u8>::with_capacity(self.origin_header_size + RESERVED_LEN_FOR_EXTRA_HEADERS);
        let _ = write!(buf, "{} {target} HTTP/1.1\r\n", self.method);
        if let Some(authority) = self.authority() {
            let _ = write!(buf, "Host: {authority}\r\n");
        }
        for (name, value) in self.headers.iter() {
            buf.put_slice(name.as_ref());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        match self.body_type() {
            Some(HttpBodyType::ContentLength(len)) => {
                buf.put_slice(crate::header::content_length(len).as_bytes())
            }
            Some(HttpBodyType::Chunked) => {
                buf.put_slice(crate::header::transfer_encoding_chunked().as_bytes())
            }
            _ => {}
        }
        for line in extra_lines {
            buf.put_slice(line.as_bytes());
        }
        buf.put_slice(crate::header::connection_as_bytes(!keep_alive));
        buf.put_slice(b"\r\n");
        buf
    }

    /// Request head to send to an origin server, with an origin-form target.
    ///
    /// Each of `extra_lines` must be a complete header line ending with CRLF.
    pub fn serialize_for_origin(&self, keep_alive: bool, extra_lines: &[String]) -> Vec<u8> {
        if self.method == Method::CONNECT {
            return self.serialize(self.authority().unwrap_or_default(), keep_alive, extra_lines);
        }
        if self.method == Method::OPTIONS && self.path_and_query() == "*" {
            return self.serialize("*", keep_alive, extra_lines);
        }
        self.serialize(self.path_and_query(), keep_alive, extra_lines)
    }

    /// Request head to send to a next hop proxy, with an absolute-form target.
    pub fn serialize_for_proxy(&self, keep_alive: bool, extra_lines: &[String]) -> Vec<u8> {
        let target = self.absolute_uri();
        self.serialize(&target, keep_alive, extra_lines)
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
    ) -> Result<HttpProxyClientRequest, HttpRequestParseError> {
        let stream = stream::iter(vec![io::Result::Ok(Bytes::from_static(content))]);
        let mut buf_stream = BufReader::new(StreamReader::new(stream));
        let mut version = Version::HTTP_11;
        HttpProxyClientRequest::parse(&mut buf_stream, 1024, 4096, &mut version).await
    }

    #[tokio::test]
    async fn read_get() {
        let content = b"GET http://example.com/v/a/x HTTP/1.1\r\n\
            Host: example.com\r\n\
            Connection: Keep-Alive\r\n\
            Accept-Language: en-us,en;q=0.5\r\n\
            Accept: */*\r\n\r\n";
        let stream = stream::iter(vec![io::Result::Ok(Bytes::from_static(content))]);
        let mut buf_stream = BufReader::new(StreamReader::new(stream));
        let mut version = Version::HTTP_11;
        let request = HttpProxyClientRequest::parse(&mut buf_stream, 1024, 4096, &mut version)
            .await
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.keep_alive());
        assert!(request.body_type().is_none());
        assert_eq!(request.absolute_uri(), "http://example.com/v/a/x");
        assert_eq!(
            request.upstream_host_port(),
            Some(("example.com".to_string(), 80))
        );
        assert!(!request.headers.contains_key(http::header::CONNECTION));

        let result = HttpProxyClientRequest::parse(&mut buf_stream, 1024, 4096, &mut version).await;
        assert!(matches!(result, Err(HttpRequestParseError::ClientClosed)));
    }

    #[tokio::test]
    async fn connection_close() {
        let request = parse_one(
            b"GET http://api.example.com/v1/files?ids=xyz HTTP/1.1\r\n\
            host: api.example.com\r\n\
            Connection: close\r\n\r\n",
        )
        .await
        .unwrap();
        assert!(!request.keep_alive());
    }

    #[tokio::test]
    async fn http10_proxy_connection() {
        let request = parse_one(
            b"GET http://example.com/ HTTP/1.0\r\n\
            Proxy-Connection: keep-alive\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(request.version, Version::HTTP_10);
        assert!(request.keep_alive());
        assert!(request.uses_proxy_connection());

        let request = parse_one(b"GET http://example.com/ HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        assert!(!request.keep_alive());
    }

    #[tokio::test]
    async fn folded_header() {
        let request = parse_one(
            b"GET http://example.com/ HTTP/1.1\r\n\
            Host: example.com\r\n\
            X-Long: part1\r\n\
            \tpart2\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(request.headers.get("x-long").unwrap(), "part1 part2");

        let r = parse_one(b"GET http://example.com/ HTTP/1.1\r\n folded\r\n\r\n").await;
        assert!(matches!(r, Err(HttpRequestParseError::InvalidHeaderLine(_))));
    }

    #[tokio::test]
    async fn missing_host() {
        let r = parse_one(b"GET http://example.com/ HTTP/1.1\r\nAccept: */*\r\n\r\n").await;
        let e = r.err().unwrap();
        assert_eq!(e.status_code(), Some(http::StatusCode::BAD_REQUEST));

        let r = parse_one(b"GET /index.html HTTP/1.0\r\n\r\n").await;
        assert!(matches!(r, Err(HttpRequestParseError::MissedHost)));
    }

    #[tokio::test]
    async fn too_long_request_line() {
        let mut content = b"GET http://example.com/".to_vec();
        content.resize(2048, b'a');
        content.extend_from_slice(b" HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let stream = stream::iter(vec![io::Result::Ok(Bytes::from(content))]);
        let mut buf_stream = BufReader::new(StreamReader::new(stream));
        let mut version = Version::HTTP_11;
        let e = HttpProxyClientRequest::parse(&mut buf_stream, 1024, 4096, &mut version)
            .await
            .err()
            .unwrap();
        assert_eq!(e.status_code(), Some(http::StatusCode::URI_TOO_LONG));
    }

    #[tokio::test]
    async fn too_large_header() {
        let mut content = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nX-Big: ".to_vec();
        content.resize(8192, b'b');
        content.extend_from_slice(b"\r\n\r\n");
        let stream = stream::iter(vec![io::Result::Ok(Bytes::from(content))]);
        let mut buf_stream = BufReader::new(StreamReader::new(stream));
        let mut version = Version::HTTP_11;
        let e = HttpProxyClientRequest::parse(&mut buf_stream, 1024, 4096, &mut version)
            .await
            .err()
            .unwrap();
        assert_eq!(
            e.status_code(),
            Some(http::StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        );
    }

    #[tokio::test]
    async fn expect_and_body() {
        let request = parse_one(
            b"POST http://example.com/upload HTTP/1.1\r\n\
            Host: example.com\r\n\
            Expect: 100-continue\r\n\
            Transfer-Encoding: chunked\r\n\r\n",
        )
        .await
        .unwrap();
        assert!(request.expect_continue());
        assert!(request.unsupported_expectation().is_none());
        assert_eq!(request.body_type(), Some(HttpBodyType::Chunked));

        let request = parse_one(
            b"PUT http://example.com/a HTTP/1.1\r\n\
            Host: example.com\r\n\
            Expect: something-else\r\n\
            Content-Length: 12\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(request.unsupported_expectation(), Some("something-else"));
        assert_eq!(request.body_type(), Some(HttpBodyType::ContentLength(12)));
    }

    #[tokio::test]
    async fn multipart_byteranges_body() {
        let request = parse_one(
            b"POST http://example.com/a HTTP/1.1\r\n\
            Host: example.com\r\n\
            Content-Type: multipart/byteranges; boundary=THIS_STRING_SEPARATES\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(
            request.body_type(),
            Some(HttpBodyType::MultipartByteRanges(
                "THIS_STRING_SEPARATES".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn connect_target() {
        let request = parse_one(b"CONNECT example.com:8443 HTTP/1.1\r\nHost: example.com:8443\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(
            request.upstream_host_port(),
            Some(("example.com".to_string(), 8443))
        );
    }

    #[tokio::test]
    async fn serialize() {
        let request = parse_one(
            b"GET http://example.com/a?b=1 HTTP/1.0\r\n\
            Proxy-Connection: keep-alive\r\n\
            Proxy-Authorization: Basic dXNlcjpwYXNz\r\n\
            Accept: */*\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(request.proxy_authorization(), Some("Basic dXNlcjpwYXNz"));

        let extra = vec!["If-None-Match: \"x\"\r\n".to_string()];
        let data = request.serialize_for_origin(true, &extra);
        assert_eq!(
            data.as_slice(),
            b"GET /a?b=1 HTTP/1.1\r\n\
            Host: example.com\r\n\
            accept: */*\r\n\
            If-None-Match: \"x\"\r\n\
            Connection: Keep-Alive\r\n\r\n"
        );

        let data = request.serialize_for_proxy(false, &[]);
        assert!(data.starts_with(b"GET http://example.com/a?b=1 HTTP/1.1\r\n"));
        assert!(data.ends_with(b"Connection: Close\r\n\r\n"));
    }
}
