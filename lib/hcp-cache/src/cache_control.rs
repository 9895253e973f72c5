/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use http::{HeaderMap, header};

/// Parsed `Cache-Control` directives, request or response side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    /// bare `no-cache`, the field list form only restricts the named headers
    pub no_cache: bool,
    pub no_cache_fields: Vec<String>,
    pub no_transform: bool,
    pub public: bool,
    /// bare `private`
    pub private: bool,
    pub private_fields: Vec<String>,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
    pub min_fresh: Option<u64>,
}

impl CacheControl {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cc = CacheControl::default();
        for v in headers.get_all(header::CACHE_CONTROL) {
            if let Ok(s) = v.to_str() {
                cc.parse_value(s);
            }
        }
        cc
    }

    pub fn parse_value(&mut self, value: &str) {
        for directive in split_comma_list(value) {
            let (name, arg) = match directive.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().trim_matches('"'))),
                None => (directive, None),
            };

            match name.to_ascii_lowercase().as_str() {
                "no-store" => self.no_store = true,
                "no-cache" => match arg {
                    Some(fields) if !fields.is_empty() => {
                        push_field_list(&mut self.no_cache_fields, fields)
                    }
                    _ => self.no_cache = true,
                },
                "no-transform" => self.no_transform = true,
                "public" => self.public = true,
                "private" => match arg {
                    Some(fields) if !fields.is_empty() => {
                        push_field_list(&mut self.private_fields, fields)
                    }
                    _ => self.private = true,
                },
                "must-revalidate" => self.must_revalidate = true,
                "proxy-revalidate" => self.proxy_revalidate = true,
                "max-age" => {
                    let v = parse_seconds(arg);
                    if self.max_age.is_some_and(|old| old != v) {
                        // conflicting values make the freshness information invalid
                        self.must_revalidate = true;
                    }
                    self.max_age = Some(self.max_age.map_or(v, |old| old.min(v)));
                }
                "s-maxage" => {
                    let v = parse_seconds(arg);
                    self.s_maxage = Some(self.s_maxage.map_or(v, |old| old.min(v)));
                }
                "min-fresh" => self.min_fresh = Some(parse_seconds(arg)),
                _ => {}
            }
        }
    }

    /// Header names that a shared cache must not store or reuse without revalidation.
    pub fn restricted_fields(&self) -> impl Iterator<Item = &str> {
        self.private_fields
            .iter()
            .chain(self.no_cache_fields.iter())
            .map(|s| s.as_str())
    }

    /// `Cache-Control: no-cache` or the HTTP/1.0 `Pragma: no-cache` on a request.
    pub fn request_no_cache(&self, headers: &HeaderMap) -> bool {
        if self.no_cache {
            return true;
        }
        headers.get_all(header::PRAGMA).iter().any(|v| {
            v.to_str()
                .map(|s| {
                    s.split(',')
                        .any(|p| p.trim().eq_ignore_ascii_case("no-cache"))
                })
                .unwrap_or(false)
        })
    }
}

fn parse_seconds(arg: Option<&str>) -> u64 {
    // invalid values are treated as already expired
    arg.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0)
}

fn push_field_list(list: &mut Vec<String>, fields: &str) {
    for f in fields.split(',') {
        let f = f.trim();
        if !f.is_empty() {
            list.push(f.to_ascii_lowercase());
        }
    }
}

/// Split on commas which are not inside a quoted string.
pub(crate) fn split_comma_list(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            ',' if !in_quote => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
        .into_iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn directives() {
        let mut cc = CacheControl::default();
        cc.parse_value("public, max-age=60, s-maxage=30, No-Transform, must-revalidate");
        assert!(cc.public);
        assert!(cc.no_transform);
        assert!(cc.must_revalidate);
        assert_eq!(cc.max_age, Some(60));
        assert_eq!(cc.s_maxage, Some(30));
        assert!(!cc.no_cache);
        assert!(!cc.no_store);
    }

    #[test]
    fn field_lists() {
        let mut cc = CacheControl::default();
        cc.parse_value("private=\"Set-Cookie, X-Secret\", no-cache=\"X-Token\", max-age=10");
        assert!(!cc.private);
        assert!(!cc.no_cache);
        assert_eq!(cc.max_age, Some(10));
        let fields: Vec<&str> = cc.restricted_fields().collect();
        assert_eq!(fields, vec!["set-cookie", "x-secret", "x-token"]);
    }

    #[test]
    fn invalid_max_age() {
        let mut cc = CacheControl::default();
        cc.parse_value("max-age=abc");
        assert_eq!(cc.max_age, Some(0));

        let mut cc = CacheControl::default();
        cc.parse_value("max-age=100, max-age=50");
        assert_eq!(cc.max_age, Some(50));
        assert!(cc.must_revalidate);
    }

    #[test]
    fn pragma() {
        let mut headers = HeaderMap::new();
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        let cc = CacheControl::from_headers(&headers);
        assert!(!cc.no_cache);
        assert!(cc.request_no_cache(&headers));

        headers.remove(header::PRAGMA);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let cc = CacheControl::from_headers(&headers);
        assert!(cc.request_no_cache(&headers));
    }
}
