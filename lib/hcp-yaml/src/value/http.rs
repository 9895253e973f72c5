/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::anyhow;
use http::{HeaderName, HeaderValue, StatusCode};
use yaml_rust::Yaml;

pub fn as_http_header_name(v: &Yaml) -> anyhow::Result<HeaderName> {
    let Yaml::String(s) = v else {
        return Err(anyhow!("yaml value type for header name should be 'string'"));
    };
    HeaderName::from_str(s).map_err(|e| anyhow!("invalid header name {s}: {e}"))
}

/// A `Name: value` header line.
pub fn as_header_line(v: &Yaml) -> anyhow::Result<(HeaderName, HeaderValue)> {
    let Yaml::String(s) = v else {
        return Err(anyhow!("yaml value type for header line should be 'string'"));
    };
    let Some((name, value)) = s.split_once(':') else {
        return Err(anyhow!("no ':' found in header line {s}"));
    };
    let name = HeaderName::from_str(name.trim())
        .map_err(|e| anyhow!("invalid header name in {s}: {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| anyhow!("invalid header value in {s}: {e}"))?;
    Ok((name, value))
}

pub fn as_status_code(v: &Yaml) -> anyhow::Result<StatusCode> {
    let code = match v {
        Yaml::Integer(i) => u16::try_from(*i)?,
        Yaml::String(s) => u16::from_str(s)?,
        _ => {
            return Err(anyhow!(
                "yaml value type for status code should be 'integer' or 'string'"
            ));
        }
    };
    StatusCode::from_u16(code).map_err(|e| anyhow!("invalid status code {code}: {e}"))
}
