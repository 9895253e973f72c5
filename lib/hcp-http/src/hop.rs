/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use http::{HeaderMap, HeaderName, header};

pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "proxy-connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "proxy-authorization"
            | "proxy-authenticate"
    )
}

/// Remove all hop-by-hop headers, including the ones listed in `Connection`.
pub fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    let mut listed = Vec::new();
    for name in [header::CONNECTION, HeaderName::from_static("proxy-connection")] {
        for value in headers.get_all(&name) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for token in value.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if let Ok(h) = HeaderName::from_str(token) {
                    listed.push(h);
                }
            }
        }
    }

    let names: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop_header(name))
        .cloned()
        .collect();
    for name in names.iter().chain(listed.iter()) {
        headers.remove(name);
    }
}
