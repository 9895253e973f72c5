/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! Responses built from a cache entry.

use std::io::Write;
use std::time::SystemTime;

use bytes::{BufMut, Bytes};
use http::{HeaderMap, Method, StatusCode, header};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use hcp_cache::{CacheEntry, EntityTag, validator};
use hcp_http::{HttpByteRange, RangeParseError, parse_range_header};

pub(crate) const BYTERANGES_BOUNDARY: &str = "HCPROXY_BYTERANGES_SEPARATOR";

/// The body part of a response served from cache.
#[derive(Debug)]
pub(crate) enum CachedBody {
    Full(Bytes),
    Single(HttpByteRange, Bytes),
    Multi {
        /// `Content-Type` of the stored representation, repeated in every part
        content_type: Option<String>,
        parts: Vec<(HttpByteRange, Bytes)>,
    },
}

#[derive(Debug)]
pub(crate) enum CachePlan {
    Serve {
        status: StatusCode,
        headers: HeaderMap,
        body: CachedBody,
        total: u64,
    },
    /// the requested range is invalid for the stored representation
    Unsatisfiable { total: u64 },
    /// the entry does not hold the requested bytes, fetch from upstream
    NotCovered,
}

fn if_range_matches(req_headers: &HeaderMap, entry: &CacheEntry) -> bool {
    let Some(value) = req_headers
        .get(header::IF_RANGE)
        .and_then(|v| v.to_str().ok())
    else {
        return true;
    };
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/") {
        let Some(tag) = EntityTag::parse(value) else {
            return false;
        };
        // a weak validator never allows a sub-range
        return EntityTag::from_headers(&entry.headers)
            .map(|stored| stored.strong_eq(&tag))
            .unwrap_or(false);
    }
    let Ok(date) = httpdate::parse_http_date(value) else {
        return false;
    };
    entry
        .headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| httpdate::parse_http_date(s.trim()).ok())
        .map(|lm| lm == date)
        .unwrap_or(false)
}

/// Decide what to send for a request answered by `entry`.
pub(crate) fn plan_cached_response(
    entry: &CacheEntry,
    req_headers: &HeaderMap,
    now: SystemTime,
) -> CachePlan {
    let total = entry.total_size();
    let mut headers = entry.headers.clone();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_RANGE);
    validator::set_age(&mut headers, entry, now);

    let range_value = req_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|_| if_range_matches(req_headers, entry));
    let ranges = match range_value.map(|v| parse_range_header(v, total)) {
        None | Some(Err(RangeParseError::UnsupportedUnit | RangeParseError::TooManyRanges)) => {
            None
        }
        Some(Err(RangeParseError::InvalidSpec | RangeParseError::Unsatisfiable)) => {
            return CachePlan::Unsatisfiable { total };
        }
        Some(Ok(ranges)) => Some(ranges),
    };

    let Some(ranges) = ranges else {
        if entry.size() != total {
            return CachePlan::NotCovered;
        }
        return CachePlan::Serve {
            status: StatusCode::OK,
            headers,
            body: CachedBody::Full(entry.body().clone()),
            total,
        };
    };

    let mut parts = Vec::with_capacity(ranges.len());
    for range in ranges {
        let Some(data) = entry.slice(&range) else {
            return CachePlan::NotCovered;
        };
        parts.push((range, data));
    }
    let body = if parts.len() == 1 {
        let (range, data) = parts.remove(0);
        CachedBody::Single(range, data)
    } else {
        let content_type = headers
            .remove(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok().map(|s| s.to_string()));
        CachedBody::Multi {
            content_type,
            parts,
        }
    };
    CachePlan::Serve {
        status: StatusCode::PARTIAL_CONTENT,
        headers,
        body,
        total,
    }
}

fn part_header(content_type: Option<&str>, range: &HttpByteRange, total: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    let _ = write!(buf, "\r\n--{BYTERANGES_BOUNDARY}\r\n");
    if let Some(ct) = content_type {
        let _ = write!(buf, "Content-Type: {ct}\r\n");
    }
    buf.put_slice(hcp_http::header::content_range_sized(range.start, range.end, total).as_bytes());
    buf.put_slice(b"\r\n");
    buf
}

fn multipart_end() -> String {
    format!("\r\n--{BYTERANGES_BOUNDARY}--\r\n")
}

impl CachedBody {
    fn framing_lines(&self, total: u64) -> Vec<String> {
        match self {
            CachedBody::Full(data) => vec![hcp_http::header::content_length(data.len() as u64)],
            CachedBody::Single(range, data) => vec![
                hcp_http::header::content_range_sized(range.start, range.end, total),
                hcp_http::header::content_length(data.len() as u64),
            ],
            CachedBody::Multi {
                content_type,
                parts,
            } => {
                let mut len = multipart_end().len() as u64;
                for (range, data) in parts {
                    len += part_header(content_type.as_deref(), range, total).len() as u64;
                    len += data.len() as u64;
                }
                vec![
                    format!(
                        "Content-Type: multipart/byteranges; boundary={BYTERANGES_BOUNDARY}\r\n"
                    ),
                    hcp_http::header::content_length(len),
                ]
            }
        }
    }

    async fn write_to<W>(&self, writer: &mut W, total: u64) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            CachedBody::Full(data) | CachedBody::Single(_, data) => writer.write_all(data).await,
            CachedBody::Multi {
                content_type,
                parts,
            } => {
                for (range, data) in parts {
                    writer
                        .write_all(&part_header(content_type.as_deref(), range, total))
                        .await?;
                    writer.write_all(data).await?;
                }
                writer.write_all(multipart_end().as_bytes()).await
            }
        }
    }
}

/// Options for a response which leaves the proxy.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClientFraming {
    pub(crate) keep_alive: bool,
    pub(crate) proxy_connection: bool,
}

impl ClientFraming {
    fn finish_head(&self, buf: &mut Vec<u8>) {
        buf.put_slice(hcp_http::header::connection_as_bytes(!self.keep_alive));
        if self.proxy_connection {
            buf.put_slice(hcp_http::header::proxy_connection_as_bytes(!self.keep_alive));
        }
        buf.put_slice(b"\r\n");
    }

    /// The `Proxy-Connection` line for heads serialized elsewhere.
    pub(crate) fn proxy_connection_line(&self) -> Option<String> {
        self.proxy_connection.then(|| {
            String::from_utf8_lossy(hcp_http::header::proxy_connection_as_bytes(
                !self.keep_alive,
            ))
            .to_string()
        })
    }
}

fn write_head_start(buf: &mut Vec<u8>, status: StatusCode, headers: &HeaderMap) {
    let _ = write!(
        buf,
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    for (name, value) in headers.iter() {
        buf.put_slice(name.as_ref());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

/// Write a planned cache response, the body is skipped for `HEAD`.
///
/// Returns the number of body bytes written.
pub(crate) async fn write_cached_response<W>(
    plan: &CachePlan,
    method: &Method,
    stale: bool,
    framing: ClientFraming,
    writer: &mut W,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let CachePlan::Serve {
        status,
        headers,
        body,
        total,
    } = plan
    else {
        return Ok(0);
    };

    let mut head = Vec::with_capacity(1024);
    write_head_start(&mut head, *status, headers);
    for line in body.framing_lines(*total) {
        head.put_slice(line.as_bytes());
    }
    if stale {
        head.put_slice(hcp_http::header::warning_stale().as_bytes());
    }
    framing.finish_head(&mut head);
    writer.write_all(&head).await?;

    let mut body_len = 0;
    if *method != Method::HEAD {
        body.write_to(writer, *total).await?;
        body_len = match body {
            CachedBody::Full(d) | CachedBody::Single(_, d) => d.len() as u64,
            CachedBody::Multi { parts, .. } => parts.iter().map(|(_, d)| d.len() as u64).sum(),
        };
    }
    writer.flush().await?;
    Ok(body_len)
}

/// Headers of a stored response which are repeated in a `304`.
const NOT_MODIFIED_HEADERS: &[header::HeaderName] = &[
    header::CACHE_CONTROL,
    header::CONTENT_LOCATION,
    header::DATE,
    header::ETAG,
    header::EXPIRES,
    header::LAST_MODIFIED,
    header::VARY,
];

/// Answer a satisfied conditional request from the stored entry, without a body.
pub(crate) async fn write_not_modified<W>(
    entry: &CacheEntry,
    now: SystemTime,
    framing: ClientFraming,
    writer: &mut W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut headers = HeaderMap::new();
    for name in NOT_MODIFIED_HEADERS {
        for v in entry.headers.get_all(name) {
            headers.append(name.clone(), v.clone());
        }
    }
    validator::set_age(&mut headers, entry, now);

    let mut head = Vec::with_capacity(512);
    write_head_start(&mut head, StatusCode::NOT_MODIFIED, &headers);
    framing.finish_head(&mut head);
    writer.write_all(&head).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcp_cache::{CacheEntryMeta, CacheKey, VaryValues};
    use http::HeaderValue;

    fn entry(extra: &[(&'static str, &'static str)], body: Vec<u8>) -> CacheEntry {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        for (k, v) in extra {
            headers.insert(*k, HeaderValue::from_static(v));
        }
        let now = SystemTime::now();
        CacheEntry::new(
            CacheKey::new(&Method::GET, "http://example.com/r"),
            CacheEntryMeta {
                vary: VaryValues::default(),
                reason: "OK".to_string(),
                headers,
                request_time: now,
                response_time: now,
                expires: None,
            },
            Bytes::from(body),
        )
    }

    fn body100() -> Vec<u8> {
        (0..100u8).collect()
    }

    fn req(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    const FRAMING: ClientFraming = ClientFraming {
        keep_alive: true,
        proxy_connection: false,
    };

    async fn render(plan: &CachePlan, method: &Method) -> String {
        let mut buf = Vec::new();
        write_cached_response(plan, method, false, FRAMING, &mut buf)
            .await
            .unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn single_range() {
        let e = entry(&[], body100());
        let plan = plan_cached_response(&e, &req(&[("range", "bytes=10-19")]), SystemTime::now());
        let CachePlan::Serve { status, body, .. } = &plan else {
            panic!("not served");
        };
        assert_eq!(*status, StatusCode::PARTIAL_CONTENT);
        let CachedBody::Single(range, data) = body else {
            panic!("not a single range");
        };
        assert_eq!(*range, HttpByteRange { start: 10, end: 19 });
        assert_eq!(data.as_ref(), &body100()[10..20]);

        let mut buf = Vec::new();
        write_cached_response(&plan, &Method::GET, false, FRAMING, &mut buf)
            .await
            .unwrap();
        let pos = buf.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&buf[..pos]).to_string();
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(head.contains("Content-Range: bytes 10-19/100"));
        assert!(head.contains("Content-Length: 10"));
        assert!(head.contains("Connection: Keep-Alive"));
        assert!(head.contains("age: "));
        assert_eq!(&buf[pos + 4..], &body100()[10..20]);
    }

    #[tokio::test]
    async fn full_and_head() {
        let e = entry(&[], b"hello".to_vec());
        let plan = plan_cached_response(&e, &HeaderMap::new(), SystemTime::now());
        let s = render(&plan, &Method::GET).await;
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nhello"));

        let s = render(&plan, &Method::HEAD).await;
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn multi_range() {
        let e = entry(&[], body100());
        let plan = plan_cached_response(
            &e,
            &req(&[("range", "bytes=0-1, 98-")]),
            SystemTime::now(),
        );
        let s = render(&plan, &Method::GET).await;
        assert!(s.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(s.contains(&format!(
            "Content-Type: multipart/byteranges; boundary={BYTERANGES_BOUNDARY}\r\n"
        )));
        assert!(!s.contains("content-type: text/plain"));
        assert!(s.contains("Content-Type: text/plain\r\nContent-Range: bytes 0-1/100\r\n"));
        assert!(s.contains("Content-Range: bytes 98-99/100\r\n"));
        assert!(s.ends_with(&format!("--{BYTERANGES_BOUNDARY}--\r\n")));

        let (head, body) = s.split_once("\r\n\r\n").unwrap();
        let len_line = head
            .lines()
            .find(|l| l.starts_with("Content-Length: "))
            .unwrap();
        let len: usize = len_line["Content-Length: ".len()..].parse().unwrap();
        assert_eq!(len, body.len());
    }

    #[tokio::test]
    async fn repeated_ranges_bounded() {
        let e = entry(&[], body100());
        let plan = plan_cached_response(&e, &req(&[("range", "bytes=0-,0-,0-")]), SystemTime::now());
        let CachePlan::Serve { status, body, .. } = &plan else {
            panic!("not served");
        };
        assert_eq!(*status, StatusCode::PARTIAL_CONTENT);
        assert!(matches!(body, CachedBody::Single(HttpByteRange { start: 0, end: 99 }, _)));
        let s = render(&plan, &Method::GET).await;
        assert!(s.contains("Content-Length: 100\r\n"));

        // many disjoint parts fall back to the whole resource
        let specs: Vec<String> = (0..50).map(|i| format!("{}-{}", i * 2, i * 2)).collect();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::RANGE,
            HeaderValue::from_str(&format!("bytes={}", specs.join(","))).unwrap(),
        );
        let plan = plan_cached_response(&e, &headers, SystemTime::now());
        assert!(matches!(
            plan,
            CachePlan::Serve {
                status: StatusCode::OK,
                body: CachedBody::Full(_),
                ..
            }
        ));
    }

    #[test]
    fn unsatisfiable() {
        let e = entry(&[], body100());
        let plan = plan_cached_response(&e, &req(&[("range", "bytes=200-300")]), SystemTime::now());
        assert!(matches!(plan, CachePlan::Unsatisfiable { total: 100 }));
        let plan = plan_cached_response(&e, &req(&[("range", "bytes=x-1")]), SystemTime::now());
        assert!(matches!(plan, CachePlan::Unsatisfiable { .. }));

        // unknown units are ignored
        let plan = plan_cached_response(&e, &req(&[("range", "items=1-2")]), SystemTime::now());
        assert!(matches!(
            plan,
            CachePlan::Serve {
                status: StatusCode::OK,
                ..
            }
        ));
    }

    #[test]
    fn not_covered() {
        let e = entry(&[("content-range", "bytes 10-19/100")], b"0123456789".to_vec());
        let plan = plan_cached_response(&e, &req(&[("range", "bytes=12-13")]), SystemTime::now());
        let CachePlan::Serve { body, .. } = plan else {
            panic!("not served");
        };
        let CachedBody::Single(_, data) = body else {
            panic!("not a single range");
        };
        assert_eq!(data.as_ref(), b"23");

        let plan = plan_cached_response(&e, &req(&[("range", "bytes=0-5")]), SystemTime::now());
        assert!(matches!(plan, CachePlan::NotCovered));
        let plan = plan_cached_response(&e, &HeaderMap::new(), SystemTime::now());
        assert!(matches!(plan, CachePlan::NotCovered));
    }

    #[test]
    fn if_range() {
        let e = entry(&[], body100());
        let plan = plan_cached_response(
            &e,
            &req(&[("range", "bytes=0-1"), ("if-range", "\"abc\"")]),
            SystemTime::now(),
        );
        assert!(matches!(
            plan,
            CachePlan::Serve {
                status: StatusCode::PARTIAL_CONTENT,
                ..
            }
        ));

        let plan = plan_cached_response(
            &e,
            &req(&[("range", "bytes=0-1"), ("if-range", "\"other\"")]),
            SystemTime::now(),
        );
        assert!(matches!(
            plan,
            CachePlan::Serve {
                status: StatusCode::OK,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn not_modified() {
        let e = entry(&[("cache-control", "max-age=60")], b"hello".to_vec());
        let mut buf = Vec::new();
        write_not_modified(&e, SystemTime::now(), FRAMING, &mut buf)
            .await
            .unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(s.contains("etag: \"abc\"\r\n"));
        assert!(s.contains("cache-control: max-age=60\r\n"));
        assert!(!s.to_ascii_lowercase().contains("content-length"));
        assert!(!s.contains("content-type"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn stale_warning() {
        let e = entry(&[], b"x".to_vec());
        let plan = plan_cached_response(&e, &HeaderMap::new(), SystemTime::now());
        let framing = ClientFraming {
            keep_alive: false,
            proxy_connection: true,
        };
        let mut buf = Vec::new();
        write_cached_response(&plan, &Method::GET, true, framing, &mut buf)
            .await
            .unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.contains("Warning: 110 \"Response is stale\"\r\n"));
        assert!(s.contains("Connection: Close\r\nProxy-Connection: Close\r\n"));
    }
}
