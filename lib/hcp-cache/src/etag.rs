/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use http::{HeaderMap, HeaderName};

use crate::cache_control::split_comma_list;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityTag {
    weak: bool,
    /// opaque tag without the quotes
    tag: String,
}

impl EntityTag {
    pub fn new(weak: bool, tag: &str) -> Self {
        EntityTag {
            weak,
            tag: tag.to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (weak, opaque) = match value.strip_prefix("W/") {
            Some(left) => (true, left),
            None => (false, value),
        };
        // be lenient with servers that do not quote the tag
        let tag = match opaque.strip_prefix('"') {
            Some(left) => left.strip_suffix('"')?,
            None => opaque,
        };
        if tag.is_empty() && !opaque.starts_with('"') {
            return None;
        }
        if tag.contains('"') {
            return None;
        }
        Some(EntityTag::new(weak, tag))
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .and_then(EntityTag::parse)
    }

    #[inline]
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Weak comparison, rfc9110 Section 8.8.3.2
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.tag == other.tag
    }

    /// Strong comparison, neither side may be weak
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.tag)
        } else {
            write!(f, "\"{}\"", self.tag)
        }
    }
}

/// Value of `If-Match` or `If-None-Match`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityTagList {
    Any,
    Tags(Vec<EntityTag>),
}

impl EntityTagList {
    pub fn from_headers(headers: &HeaderMap, name: &HeaderName) -> Option<Self> {
        let mut tags = Vec::new();
        let mut found = false;
        for v in headers.get_all(name) {
            let Ok(s) = v.to_str() else {
                continue;
            };
            found = true;
            for part in split_comma_list(s) {
                if part == "*" {
                    return Some(EntityTagList::Any);
                }
                if let Some(tag) = EntityTag::parse(part) {
                    tags.push(tag);
                }
            }
        }
        if found {
            Some(EntityTagList::Tags(tags))
        } else {
            None
        }
    }

    pub fn matches(&self, etag: Option<&EntityTag>, strong: bool) -> bool {
        match self {
            EntityTagList::Any => true,
            EntityTagList::Tags(tags) => {
                let Some(etag) = etag else {
                    return false;
                };
                tags.iter().any(|t| {
                    if strong {
                        t.strong_eq(etag)
                    } else {
                        t.weak_eq(etag)
                    }
                })
            }
        }
    }
}
