/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use base64::prelude::*;

pub fn proxy_authorization_basic(username: &str, password: &str) -> String {
    format!(
        "Proxy-Authorization: Basic {}\r\n",
        BASE64_STANDARD.encode(format!("{username}:{password}"))
    )
}

pub fn proxy_authenticate_basic(realm: &str) -> String {
    format!("Proxy-Authenticate: Basic realm=\"{realm}\"\r\n")
}

pub fn www_authenticate_basic(realm: &str) -> String {
    format!("WWW-Authenticate: Basic realm=\"{realm}\"\r\n")
}

/// Get the username and password from a `Basic` (Proxy-)Authorization value.
pub fn parse_basic_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
