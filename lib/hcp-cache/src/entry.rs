/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, header};

use hcp_http::{HttpByteRange, HttpContentRange};

/// Identity of a cache entry: the request method and absolute URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, absolute_uri: &str) -> Self {
        CacheKey(format!("{method} {absolute_uri}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The request header values selected by the response `Vary` header.
#[derive(Clone, Debug, Default)]
pub struct VaryValues {
    any: bool,
    values: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl VaryValues {
    pub fn collect(rsp_headers: &HeaderMap, req_headers: &HeaderMap) -> Self {
        let mut vary = VaryValues::default();
        for v in rsp_headers.get_all(header::VARY) {
            let Ok(s) = v.to_str() else {
                continue;
            };
            for name in s.split(',') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if name == "*" {
                    vary.any = true;
                    continue;
                }
                let Ok(name) = HeaderName::from_str(name) else {
                    continue;
                };
                if vary.values.iter().any(|(n, _)| *n == name) {
                    continue;
                }
                let values = req_headers.get_all(&name).iter().cloned().collect();
                vary.values.push((name, values));
            }
        }
        vary
    }

    /// Whether the new request carries exactly the same values for every varied header.
    pub fn matches(&self, req_headers: &HeaderMap) -> bool {
        if self.any {
            return false;
        }
        self.values.iter().all(|(name, values)| {
            let mut new_values = req_headers.get_all(name).iter();
            for v in values {
                if new_values.next() != Some(v) {
                    return false;
                }
            }
            new_values.next().is_none()
        })
    }
}

/// Everything but the body needed to register an entry.
#[derive(Clone, Debug)]
pub struct CacheEntryMeta {
    pub vary: VaryValues,
    pub reason: String,
    pub headers: HeaderMap,
    pub request_time: SystemTime,
    pub response_time: SystemTime,
    pub expires: Option<SystemTime>,
}

#[derive(Debug)]
pub struct CacheEntry {
    key: CacheKey,
    pub vary: VaryValues,
    pub reason: String,
    /// stored response headers, `Content-Length` matches the stored body
    pub headers: HeaderMap,
    body: Bytes,
    pub cache_time: SystemTime,
    pub request_time: SystemTime,
    pub response_time: SystemTime,
    pub expires: Option<SystemTime>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, meta: CacheEntryMeta, body: Bytes) -> Self {
        CacheEntry {
            key,
            vary: meta.vary,
            reason: meta.reason,
            headers: meta.headers,
            body,
            cache_time: SystemTime::now(),
            request_time: meta.request_time,
            response_time: meta.response_time,
            expires: meta.expires,
        }
    }

    #[inline]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    /// The total size of the resource this entry belongs to.
    pub fn total_size(&self) -> u64 {
        self.content_range()
            .and_then(|r| r.total)
            .unwrap_or_else(|| self.size())
    }

    fn content_range(&self) -> Option<HttpContentRange> {
        self.headers
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(HttpContentRange::parse)
    }

    /// Whether the stored bytes cover `range` of the resource.
    pub fn covers(&self, range: &HttpByteRange) -> bool {
        match self.content_range() {
            Some(cr) => cr.covers(range),
            None => range.end < self.size(),
        }
    }

    /// Stored bytes for the inclusive resource `range`.
    pub fn slice(&self, range: &HttpByteRange) -> Option<Bytes> {
        let offset = match self.content_range() {
            Some(cr) => cr.range?.start,
            None => 0,
        };
        let start = usize::try_from(range.start.checked_sub(offset)?).ok()?;
        let end = usize::try_from(range.end.checked_sub(offset)?).ok()?;
        if end >= self.body.len() || start > end {
            return None;
        }
        Some(self.body.slice(start..=end))
    }

    pub fn meta(&self) -> CacheEntryMeta {
        CacheEntryMeta {
            vary: self.vary.clone(),
            reason: self.reason.clone(),
            headers: self.headers.clone(),
            request_time: self.request_time,
            response_time: self.response_time,
            expires: self.expires,
        }
    }
}
