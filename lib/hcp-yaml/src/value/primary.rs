/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

pub fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::Boolean(b) => Ok(*b),
        Yaml::Integer(i) => Ok(*i != 0),
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid bool value {s}")),
        },
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean', 'string' or 'integer'"
        )),
    }
}

pub fn as_u32(v: &Yaml) -> anyhow::Result<u32> {
    match v {
        Yaml::String(s) => Ok(u32::from_str(s)?),
        Yaml::Integer(i) => Ok(u32::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'u32' should be 'string' or 'integer'"
        )),
    }
}

pub fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

pub fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Real(s) => Ok(s.clone()),
        _ => Err(anyhow!(
            "yaml value type for 'string' should be 'string', 'integer' or 'real'"
        )),
    }
}

/// A single value is accepted as a list of one.
pub fn as_list<T, F>(v: &Yaml, convert: F) -> anyhow::Result<Vec<T>>
where
    F: Fn(&Yaml) -> anyhow::Result<T>,
{
    match v {
        Yaml::Array(seq) => seq
            .iter()
            .enumerate()
            .map(|(i, v)| convert(v).context(format!("invalid list element #{i}")))
            .collect(),
        _ => {
            let node = convert(v).context("invalid single value for the list")?;
            Ok(vec![node])
        }
    }
}
