/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use http::header;

use hcp_http::server::HttpProxyClientRequest;

use crate::config::AuthConfig;

const TUNNEL_AUTH_SCHEMES: &[&str] = &["NTLM ", "Negotiate "];

/// Check the `Proxy-Authorization` Basic credentials of a request.
///
/// Always passes when no user is configured.
pub(crate) fn check_proxy_auth(config: &AuthConfig, req: &HttpProxyClientRequest) -> bool {
    if !config.enabled() {
        return true;
    }
    let Some(value) = req.proxy_authorization() else {
        return false;
    };
    match hcp_http::header::parse_basic_credentials(value) {
        Some((username, password)) => config.check(&username, &password),
        None => false,
    }
}

fn is_connection_auth(value: &str) -> bool {
    TUNNEL_AUTH_SCHEMES.iter().any(|scheme| {
        value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Connection oriented schemes bind the credentials to one upstream connection,
/// such requests are tunneled instead of going through the proxy pipeline.
pub(crate) fn must_tunnel(req: &HttpProxyClientRequest) -> bool {
    if req.proxy_authorization().is_some_and(is_connection_auth) {
        return true;
    }
    req.headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_connection_auth)
}
