/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! Cache usability, freshness and conditional request decisions.
//!
//! Everything here is a pure function of request headers, stored entry data
//! and the current time, apart from [`remove_other_stale_caches`] which
//! removes entries from the store it is given.

use std::str::FromStr;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};

use crate::{CacheControl, CacheEntry, CacheKey, CacheStore, EntityTag, EntityTagList};

/// Tolerance applied when comparing validator dates.
pub const CLOCK_SKEW: Duration = Duration::from_secs(60);
const HEURISTIC_LIFETIME_MAX: Duration = Duration::from_secs(24 * 3600);

/// Response headers that are never updated from a `304`, the stored body stays the same.
const EXCLUDED_FROM_REFRESH: &[&str] = &[
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "content-range",
];

/// A validator added to the upstream request by the proxy itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionalHeader {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl ConditionalHeader {
    pub fn to_line(&self) -> String {
        format!(
            "{}: {}\r\n",
            self.name.as_str(),
            String::from_utf8_lossy(self.value.as_bytes())
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheVerdict {
    UseCached,
    /// revalidate with the origin, optionally with a synthesized validator
    MustRevalidate(Option<ConditionalHeader>),
    Bypass,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionalCheck {
    pub verdict: CacheVerdict,
    /// the entry must not be served stale even if the origin is unreachable
    pub must_revalidate: bool,
}

fn header_date(headers: &HeaderMap, name: HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| httpdate::parse_http_date(s.trim()).ok())
}

fn header_u64(headers: &HeaderMap, name: HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| u64::from_str(s.trim()).ok())
}

/// Freshness lifetime of a stored response.
///
/// `s-maxage`, then `max-age`, then `Expires - Date`, then 10% of
/// `Date - Last-Modified` capped at one day.
pub fn freshness_lifetime(headers: &HeaderMap, response_time: SystemTime) -> Duration {
    let cc = CacheControl::from_headers(headers);
    if let Some(secs) = cc.s_maxage {
        return Duration::from_secs(secs);
    }
    if let Some(secs) = cc.max_age {
        return Duration::from_secs(secs);
    }

    let date = header_date(headers, header::DATE).unwrap_or(response_time);
    if headers.contains_key(header::EXPIRES) {
        // invalid dates, especially "0", mean already expired
        return header_date(headers, header::EXPIRES)
            .and_then(|expires| expires.duration_since(date).ok())
            .unwrap_or_default();
    }

    if let Some(last_modified) = header_date(headers, header::LAST_MODIFIED)
        && let Ok(diff) = date.duration_since(last_modified)
    {
        return (diff / 10).min(HEURISTIC_LIFETIME_MAX);
    }

    Duration::ZERO
}

/// The absolute expiry time, only when the response carries explicit freshness info.
pub fn explicit_expires(headers: &HeaderMap, response_time: SystemTime) -> Option<SystemTime> {
    let cc = CacheControl::from_headers(headers);
    if cc.s_maxage.is_none() && cc.max_age.is_none() && !headers.contains_key(header::EXPIRES) {
        return None;
    }
    response_time.checked_add(freshness_lifetime(headers, response_time))
}

/// Current age of a stored response, rfc7234 Section 4.2.3
pub fn current_age(entry: &CacheEntry, now: SystemTime) -> Duration {
    let date = header_date(&entry.headers, header::DATE).unwrap_or(entry.response_time);
    let apparent_age = entry
        .response_time
        .duration_since(date)
        .unwrap_or_default();
    let response_delay = entry
        .response_time
        .duration_since(entry.request_time)
        .unwrap_or_default();
    let age_value = Duration::from_secs(header_u64(&entry.headers, header::AGE).unwrap_or(0));
    let corrected_age_value = age_value + response_delay;
    let corrected_initial_age = apparent_age.max(corrected_age_value);
    let resident_time = now.duration_since(entry.response_time).unwrap_or_default();
    corrected_initial_age + resident_time
}

/// Set the `Age` header of a response served from `entry`.
pub fn set_age(headers: &mut HeaderMap, entry: &CacheEntry, now: SystemTime) {
    let age = current_age(entry, now).as_secs();
    headers.insert(header::AGE, HeaderValue::from(age));
}

/// Decide whether the stored `entry` may answer the request without contacting the origin.
pub fn check_conditional(
    req_headers: &HeaderMap,
    has_query: bool,
    entry: Option<&CacheEntry>,
    now: SystemTime,
) -> ConditionalCheck {
    let Some(entry) = entry else {
        return ConditionalCheck {
            verdict: CacheVerdict::Bypass,
            must_revalidate: false,
        };
    };

    let req_cc = CacheControl::from_headers(req_headers);
    let rsp_cc = CacheControl::from_headers(&entry.headers);
    let must_revalidate = rsp_cc.must_revalidate
        || rsp_cc.proxy_revalidate
        || rsp_cc.s_maxage.is_some()
        || rsp_cc.no_cache;

    let age = current_age(entry, now);
    let lifetime = freshness_lifetime(&entry.headers, entry.response_time);

    let revalidate = !entry.vary.matches(req_headers)
        || req_cc.request_no_cache(req_headers)
        || req_cc
            .max_age
            .is_some_and(|secs| secs == 0 || age > Duration::from_secs(secs))
        || rsp_cc.no_cache
        || has_query
        || req_cc
            .min_fresh
            .is_some_and(|secs| lifetime.saturating_sub(age) < Duration::from_secs(secs))
        || age >= lifetime;

    let verdict = if revalidate {
        CacheVerdict::MustRevalidate(conditional_header(req_headers, &entry.headers))
    } else {
        CacheVerdict::UseCached
    };
    ConditionalCheck {
        verdict,
        must_revalidate,
    }
}

fn conditional_header(
    req_headers: &HeaderMap,
    rsp_headers: &HeaderMap,
) -> Option<ConditionalHeader> {
    let (name, value) = if let Some(etag) = rsp_headers.get(header::ETAG) {
        (header::IF_NONE_MATCH, etag)
    } else if let Some(last_modified) = rsp_headers.get(header::LAST_MODIFIED) {
        (header::IF_MODIFIED_SINCE, last_modified)
    } else {
        return None;
    };
    if req_headers.contains_key(&name) {
        // the client's own validator goes upstream unchanged
        return None;
    }
    Some(ConditionalHeader {
        name,
        value: value.clone(),
    })
}

/// Evaluate the request preconditions against a stored response.
///
/// Only used for `GET` and `HEAD`, so a matching `If-None-Match` always gives `304`.
pub fn is_not_modified(req_headers: &HeaderMap, rsp_headers: &HeaderMap) -> Option<StatusCode> {
    let etag = EntityTag::from_headers(rsp_headers);
    let last_modified = header_date(rsp_headers, header::LAST_MODIFIED);
    // a sub-range must come from the very same representation
    let must_use_strong = req_headers.contains_key(header::RANGE);

    if let Some(list) = EntityTagList::from_headers(req_headers, &header::IF_MATCH) {
        if !list.matches(etag.as_ref(), true) {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    } else if let Some(since) = header_date(req_headers, header::IF_UNMODIFIED_SINCE)
        && let Some(lm) = last_modified
        && lm > since + CLOCK_SKEW
    {
        return Some(StatusCode::PRECONDITION_FAILED);
    }

    if let Some(list) = EntityTagList::from_headers(req_headers, &header::IF_NONE_MATCH) {
        return if list.matches(etag.as_ref(), must_use_strong) {
            Some(StatusCode::NOT_MODIFIED)
        } else {
            None
        };
    }

    if let Some(since) = header_date(req_headers, header::IF_MODIFIED_SINCE) {
        let lm = last_modified.or_else(|| header_date(rsp_headers, header::DATE));
        if let Some(lm) = lm
            && lm <= since + CLOCK_SKEW
        {
            return Some(StatusCode::NOT_MODIFIED);
        }
    }

    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleCheck {
    /// the fresh response may replace the stored one
    Update,
    /// the fresh response is older than the stored one
    RejectOlder,
    /// the stored entry no longer describes the resource
    Invalidate,
}

/// Compare the stored entry with a fresh upstream response for the same key.
pub fn check_stale_cache(
    entry: &CacheEntry,
    status: u16,
    fresh_headers: &HeaderMap,
    fresh_content_length: Option<u64>,
) -> StaleCheck {
    if let Some(cached_date) = header_date(&entry.headers, header::DATE)
        && let Some(fresh_date) = header_date(fresh_headers, header::DATE)
        && fresh_date < cached_date
    {
        return StaleCheck::RejectOlder;
    }

    if status == 200 {
        if fresh_content_length.is_some_and(|len| len != entry.size()) {
            return StaleCheck::Invalidate;
        }
        let content_md5 = HeaderName::from_static("content-md5");
        for name in [header::ETAG, header::LAST_MODIFIED, content_md5] {
            if let Some(fresh) = fresh_headers.get(&name)
                && entry.headers.get(&name) != Some(fresh)
            {
                return StaleCheck::Invalidate;
            }
        }
    }

    StaleCheck::Update
}

/// Stored headers updated with the ones from a `304` response.
pub fn refresh_headers(stored: &HeaderMap, fresh: &HeaderMap) -> HeaderMap {
    let mut headers = stored.clone();
    for name in fresh.keys() {
        if EXCLUDED_FROM_REFRESH.contains(&name.as_str()) {
            continue;
        }
        headers.remove(name);
        for v in fresh.get_all(name) {
            headers.append(name.clone(), v.clone());
        }
    }
    headers
}

/// Whether a fresh upstream response may be written to the cache.
pub fn is_cacheable(
    method: &Method,
    status: u16,
    req_headers: &HeaderMap,
    rsp_headers: &HeaderMap,
) -> bool {
    if method != Method::GET || status != 200 {
        return false;
    }
    let req_cc = CacheControl::from_headers(req_headers);
    let rsp_cc = CacheControl::from_headers(rsp_headers);
    if req_cc.no_store || rsp_cc.no_store || rsp_cc.private {
        return false;
    }
    if req_headers.contains_key(header::AUTHORIZATION)
        && !(rsp_cc.public || rsp_cc.s_maxage.is_some() || rsp_cc.must_revalidate)
    {
        return false;
    }
    !rsp_headers
        .get_all(header::VARY)
        .iter()
        .any(|v| v.to_str().map(|s| s.trim() == "*").unwrap_or(false))
}

fn same_origin(a: &Uri, b: &Uri) -> bool {
    let default_port = |u: &Uri| match u.scheme_str() {
        Some(s) if s.eq_ignore_ascii_case("https") => 443,
        _ => 80,
    };
    match (a.host(), b.host()) {
        (Some(ha), Some(hb)) => {
            ha.eq_ignore_ascii_case(hb)
                && a.port_u16().unwrap_or_else(|| default_port(a))
                    == b.port_u16().unwrap_or_else(|| default_port(b))
        }
        _ => false,
    }
}

/// Invalidate entries named by `Location`/`Content-Location` after a successful
/// unsafe request. Returns how many entries were removed.
pub fn remove_other_stale_caches(
    store: &dyn CacheStore,
    method: &Method,
    status: u16,
    request_uri: &Uri,
    rsp_headers: &HeaderMap,
) -> usize {
    let applies = match *method {
        Method::PUT | Method::POST => status == 201,
        Method::DELETE => status == 200,
        _ => false,
    };
    if !applies {
        return 0;
    }

    let mut removed = 0;
    for name in [header::LOCATION, header::CONTENT_LOCATION] {
        let Some(value) = rsp_headers.get(&name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let value = value.trim();
        let target = if value.starts_with('/') {
            let scheme = request_uri.scheme_str().unwrap_or("http");
            let Some(authority) = request_uri.authority() else {
                continue;
            };
            format!("{scheme}://{authority}{value}")
        } else {
            value.to_string()
        };
        let Ok(uri) = Uri::from_str(&target) else {
            continue;
        };
        if !same_origin(request_uri, &uri) {
            continue;
        }
        if store.remove(&CacheKey::new(&Method::GET, &uri.to_string())) {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheEntryMeta, MemoryCacheStore, VaryValues};
    use bytes::Bytes;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    fn entry_at(rsp_headers: HeaderMap, response_time: SystemTime) -> CacheEntry {
        let meta = CacheEntryMeta {
            vary: VaryValues::default(),
            reason: "OK".to_string(),
            headers: rsp_headers,
            request_time: response_time,
            response_time,
            expires: None,
        };
        CacheEntry::new(
            CacheKey::new(&Method::GET, "http://example.com/a"),
            meta,
            Bytes::from_static(b"0123456789"),
        )
    }

    fn http_date(t: SystemTime) -> String {
        httpdate::fmt_http_date(t)
    }

    #[test]
    fn lifetime_order() {
        let now = SystemTime::now();
        let date = http_date(now);
        let later = http_date(now + Duration::from_secs(300));
        let earlier = http_date(now - Duration::from_secs(1000));

        let h = headers(&[
            ("cache-control", "max-age=100, s-maxage=50"),
            ("expires", later.as_str()),
            ("date", date.as_str()),
        ]);
        assert_eq!(freshness_lifetime(&h, now), Duration::from_secs(50));

        let h = headers(&[("cache-control", "max-age=100"), ("expires", later.as_str())]);
        assert_eq!(freshness_lifetime(&h, now), Duration::from_secs(100));

        let h = headers(&[("expires", later.as_str()), ("date", date.as_str())]);
        assert_eq!(freshness_lifetime(&h, now), Duration::from_secs(300));

        let h = headers(&[("expires", "0"), ("date", date.as_str())]);
        assert_eq!(freshness_lifetime(&h, now), Duration::ZERO);

        let h = headers(&[("last-modified", earlier.as_str()), ("date", date.as_str())]);
        assert_eq!(freshness_lifetime(&h, now), Duration::from_secs(100));

        let long_ago = http_date(now - Duration::from_secs(30 * 24 * 3600));
        let h = headers(&[("last-modified", long_ago.as_str()), ("date", date.as_str())]);
        assert_eq!(freshness_lifetime(&h, now), HEURISTIC_LIFETIME_MAX);

        assert_eq!(freshness_lifetime(&HeaderMap::new(), now), Duration::ZERO);
    }

    #[test]
    fn age() {
        let now = SystemTime::now();
        let response_time = now - Duration::from_secs(20);
        let h = headers(&[
            ("age", "30"),
            ("date", http_date(response_time - Duration::from_secs(5)).as_str()),
        ]);
        let entry = entry_at(h, response_time);
        let age = current_age(&entry, now).as_secs();
        // max(5, 30) + 20
        assert!((50..=51).contains(&age));

        let mut out = HeaderMap::new();
        set_age(&mut out, &entry, now);
        assert!(out.get(header::AGE).is_some());
    }

    #[test]
    fn use_fresh_entry() {
        let now = SystemTime::now();
        let entry = entry_at(
            headers(&[("cache-control", "max-age=3600"), ("etag", "\"abc\"")]),
            now,
        );
        let check = check_conditional(&HeaderMap::new(), false, Some(&entry), now);
        assert_eq!(check.verdict, CacheVerdict::UseCached);
        assert!(!check.must_revalidate);

        let check = check_conditional(&HeaderMap::new(), false, None, now);
        assert_eq!(check.verdict, CacheVerdict::Bypass);
    }

    #[test]
    fn revalidate_reasons() {
        let now = SystemTime::now();
        let entry = entry_at(
            headers(&[("cache-control", "max-age=3600"), ("etag", "\"abc\"")]),
            now,
        );
        let expected = CacheVerdict::MustRevalidate(Some(ConditionalHeader {
            name: header::IF_NONE_MATCH,
            value: HeaderValue::from_static("\"abc\""),
        }));

        for req in [
            headers(&[("cache-control", "max-age=0")]),
            headers(&[("cache-control", "no-cache")]),
            headers(&[("pragma", "no-cache")]),
            headers(&[("cache-control", "min-fresh=7200")]),
        ] {
            let check = check_conditional(&req, false, Some(&entry), now);
            assert_eq!(check.verdict, expected);
        }

        let check = check_conditional(&HeaderMap::new(), true, Some(&entry), now);
        assert_eq!(check.verdict, expected);

        let stale = entry_at(
            headers(&[
                ("cache-control", "max-age=10, must-revalidate"),
                ("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ]),
            now - Duration::from_secs(60),
        );
        let check = check_conditional(&HeaderMap::new(), false, Some(&stale), now);
        assert!(check.must_revalidate);
        assert_eq!(
            check.verdict,
            CacheVerdict::MustRevalidate(Some(ConditionalHeader {
                name: header::IF_MODIFIED_SINCE,
                value: HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"),
            }))
        );

        let no_cache = entry_at(headers(&[("cache-control", "no-cache, max-age=60")]), now);
        let check = check_conditional(&HeaderMap::new(), false, Some(&no_cache), now);
        assert_eq!(check.verdict, CacheVerdict::MustRevalidate(None));
        assert!(check.must_revalidate);
    }

    #[test]
    fn client_validator_is_kept() {
        let now = SystemTime::now();
        let entry = entry_at(headers(&[("etag", "\"abc\"")]), now);
        let req = headers(&[("if-none-match", "\"xyz\"")]);
        let check = check_conditional(&req, false, Some(&entry), now);
        assert_eq!(check.verdict, CacheVerdict::MustRevalidate(None));
    }

    #[test]
    fn not_modified_etag() {
        let rsp = headers(&[("etag", "\"abc\"")]);
        let req = headers(&[("if-none-match", "\"abc\"")]);
        assert_eq!(is_not_modified(&req, &rsp), Some(StatusCode::NOT_MODIFIED));

        let req = headers(&[("if-none-match", "\"other\"")]);
        assert_eq!(is_not_modified(&req, &rsp), None);

        let req = headers(&[("if-none-match", "*")]);
        assert_eq!(is_not_modified(&req, &rsp), Some(StatusCode::NOT_MODIFIED));

        let weak = headers(&[("etag", "W/\"abc\"")]);
        let req = headers(&[("if-none-match", "\"abc\"")]);
        assert_eq!(is_not_modified(&req, &weak), Some(StatusCode::NOT_MODIFIED));
        let req = headers(&[("if-none-match", "\"abc\""), ("range", "bytes=0-1")]);
        assert_eq!(is_not_modified(&req, &weak), None);
    }

    #[test]
    fn if_match() {
        let rsp = headers(&[("etag", "\"abc\"")]);
        assert_eq!(is_not_modified(&headers(&[("if-match", "\"abc\"")]), &rsp), None);
        assert_eq!(
            is_not_modified(&headers(&[("if-match", "\"zzz\"")]), &rsp),
            Some(StatusCode::PRECONDITION_FAILED)
        );

        let weak = headers(&[("etag", "W/\"abc\"")]);
        assert_eq!(
            is_not_modified(&headers(&[("if-match", "W/\"abc\"")]), &weak),
            Some(StatusCode::PRECONDITION_FAILED)
        );
        assert_eq!(is_not_modified(&headers(&[("if-match", "*")]), &weak), None);
    }

    #[test]
    fn date_conditions() {
        let now = SystemTime::now();
        let lm = now - Duration::from_secs(3600);
        let rsp = headers(&[("last-modified", http_date(lm).as_str())]);

        let req = headers(&[("if-modified-since", http_date(lm).as_str())]);
        assert_eq!(is_not_modified(&req, &rsp), Some(StatusCode::NOT_MODIFIED));

        // inside the skew window
        let since = http_date(lm - Duration::from_secs(30));
        let req = headers(&[("if-modified-since", since.as_str())]);
        assert_eq!(is_not_modified(&req, &rsp), Some(StatusCode::NOT_MODIFIED));

        let since = http_date(lm - Duration::from_secs(600));
        let req = headers(&[("if-modified-since", since.as_str())]);
        assert_eq!(is_not_modified(&req, &rsp), None);

        let req = headers(&[("if-modified-since", "not a date")]);
        assert_eq!(is_not_modified(&req, &rsp), None);

        let req = headers(&[(
            "if-unmodified-since",
            http_date(lm - Duration::from_secs(600)).as_str(),
        )]);
        assert_eq!(
            is_not_modified(&req, &rsp),
            Some(StatusCode::PRECONDITION_FAILED)
        );
        let req = headers(&[("if-unmodified-since", http_date(now).as_str())]);
        assert_eq!(is_not_modified(&req, &rsp), None);
    }

    #[test]
    fn stale_cache() {
        let now = SystemTime::now();
        let cached_date = http_date(now);
        let entry = entry_at(
            headers(&[("date", cached_date.as_str()), ("etag", "\"v1\"")]),
            now,
        );

        let older_date = http_date(now - Duration::from_secs(100));
        let older = headers(&[("date", older_date.as_str())]);
        assert_eq!(
            check_stale_cache(&entry, 200, &older, None),
            StaleCheck::RejectOlder
        );

        let same = headers(&[("date", cached_date.as_str()), ("etag", "\"v1\"")]);
        assert_eq!(
            check_stale_cache(&entry, 200, &same, Some(10)),
            StaleCheck::Update
        );
        assert_eq!(
            check_stale_cache(&entry, 200, &same, Some(11)),
            StaleCheck::Invalidate
        );

        let changed = headers(&[("etag", "\"v2\"")]);
        assert_eq!(
            check_stale_cache(&entry, 200, &changed, None),
            StaleCheck::Invalidate
        );
        assert_eq!(
            check_stale_cache(&entry, 404, &changed, None),
            StaleCheck::Update
        );
    }

    #[test]
    fn refresh() {
        let stored = headers(&[
            ("content-length", "10"),
            ("etag", "\"v1\""),
            ("x-a", "1"),
        ]);
        let fresh = headers(&[("content-length", "0"), ("etag", "\"v1\""), ("x-a", "2")]);
        let h = refresh_headers(&stored, &fresh);
        assert_eq!(h.get("content-length").unwrap(), "10");
        assert_eq!(h.get("x-a").unwrap(), "2");
    }

    #[test]
    fn cacheable() {
        let empty = HeaderMap::new();
        assert!(is_cacheable(&Method::GET, 200, &empty, &empty));
        assert!(!is_cacheable(&Method::POST, 200, &empty, &empty));
        assert!(!is_cacheable(&Method::GET, 206, &empty, &empty));
        assert!(!is_cacheable(
            &Method::GET,
            200,
            &empty,
            &headers(&[("cache-control", "private")])
        ));
        assert!(!is_cacheable(
            &Method::GET,
            200,
            &headers(&[("cache-control", "no-store")]),
            &empty
        ));

        let auth = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert!(!is_cacheable(&Method::GET, 200, &auth, &empty));
        assert!(is_cacheable(
            &Method::GET,
            200,
            &auth,
            &headers(&[("cache-control", "public")])
        ));
        assert!(!is_cacheable(
            &Method::GET,
            200,
            &empty,
            &headers(&[("vary", "*")])
        ));
    }

    #[test]
    fn remove_by_location() {
        let store = MemoryCacheStore::new(1024, 16);
        for uri in [
            "http://example.com/items/1",
            "http://example.com/items/2",
            "http://other.com/items/1",
        ] {
            let writer = store.create(CacheKey::new(&Method::GET, uri), None);
            store
                .commit(writer, entry_at(HeaderMap::new(), SystemTime::now()).meta())
                .unwrap();
        }

        let request_uri = Uri::from_static("http://example.com/items");
        let rsp = headers(&[
            ("location", "/items/1"),
            ("content-location", "http://other.com/items/1"),
        ]);
        assert_eq!(
            remove_other_stale_caches(&store, &Method::GET, 200, &request_uri, &rsp),
            0
        );
        assert_eq!(
            remove_other_stale_caches(&store, &Method::POST, 201, &request_uri, &rsp),
            1
        );
        assert!(
            store
                .lookup(&CacheKey::new(&Method::GET, "http://example.com/items/1"))
                .is_none()
        );
        assert!(
            store
                .lookup(&CacheKey::new(&Method::GET, "http://other.com/items/1"))
                .is_some()
        );
    }
}
