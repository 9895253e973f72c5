/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use humanize_rs::ParseError;
use yaml_rust::Yaml;

/// Parse a duration, a bare number means seconds.
pub fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(d) => Ok(d),
            Err(ParseError::MissingUnit) => {
                let f = f64::from_str(value).map_err(|_| anyhow!("invalid duration {value}"))?;
                Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
            }
            Err(e) => Err(anyhow!("invalid humanize duration {value}: {e}")),
        },
        Yaml::Integer(i) => Ok(Duration::from_secs(u64::try_from(*i)?)),
        Yaml::Real(s) => {
            let f = f64::from_str(s)?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for duration should be 'string', 'integer' or 'real'"
        )),
    }
}
