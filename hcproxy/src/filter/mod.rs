/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! Request and response filter rules, resolved by first match.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use regex::Regex;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderRewrite {
    pub set: Vec<(HeaderName, HeaderValue)>,
    pub remove: Vec<HeaderName>,
}

impl HeaderRewrite {
    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterAction {
    Block(StatusCode),
    Rewrite(HeaderRewrite),
    Pass,
}

#[derive(Clone, Debug)]
pub struct FilterRule {
    pattern: Regex,
    action: FilterAction,
}

impl FilterRule {
    pub fn new(pattern: Regex, action: FilterAction) -> Self {
        FilterRule { pattern, action }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FilterRegistry {
    request: Vec<FilterRule>,
    response: Vec<FilterRule>,
}

fn first_match<'a>(rules: &'a [FilterRule], s: &str) -> Option<&'a FilterAction> {
    rules
        .iter()
        .find(|r| r.pattern.is_match(s))
        .map(|r| &r.action)
}

fn apply(action: Option<&FilterAction>, headers: &mut HeaderMap) -> Result<(), StatusCode> {
    match action {
        Some(FilterAction::Block(status)) => Err(*status),
        Some(FilterAction::Rewrite(rewrite)) => {
            rewrite.apply(headers);
            Ok(())
        }
        Some(FilterAction::Pass) | None => Ok(()),
    }
}

impl FilterRegistry {
    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }

    pub fn push_request_rule(&mut self, rule: FilterRule) {
        self.request.push(rule);
    }

    pub fn push_response_rule(&mut self, rule: FilterRule) {
        self.response.push(rule);
    }

    /// The rule action for an absolute request uri.
    pub fn match_request(&self, absolute_uri: &str) -> Option<&FilterAction> {
        first_match(&self.request, absolute_uri)
    }

    /// The rule action for a response `Content-Type`, an empty string when missing.
    pub fn match_response(&self, content_type: &str) -> Option<&FilterAction> {
        first_match(&self.response, content_type)
    }

    /// Run the request rules, returning the status to reply with when blocked.
    pub(crate) fn filter_request(
        &self,
        absolute_uri: &str,
        headers: &mut HeaderMap,
    ) -> Result<(), StatusCode> {
        apply(self.match_request(absolute_uri), headers)
    }

    pub(crate) fn filter_response(&self, headers: &mut HeaderMap) -> Result<(), StatusCode> {
        if self.response.is_empty() {
            return Ok(());
        }
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        apply(self.match_response(&content_type), headers)
    }
}
