/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use regex::Regex;
use yaml_rust::Yaml;

pub fn as_regex(v: &Yaml) -> anyhow::Result<Regex> {
    let Yaml::String(s) = v else {
        return Err(anyhow!("yaml value type for regex should be 'string'"));
    };
    Regex::new(s).map_err(|e| anyhow!("invalid regex {s}: {e}"))
}
