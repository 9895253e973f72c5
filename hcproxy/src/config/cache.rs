/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use yaml_rust::Yaml;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_object_size: usize,
    pub max_entries: usize,
    /// add `Warning: 110` to stale responses served on upstream failure
    pub warn_on_stale: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_object_size: 8 * 1024 * 1024,
            max_entries: 4096,
            warn_on_stale: true,
        }
    }
}

impl CacheConfig {
    pub(super) fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        match v {
            Yaml::Hash(map) => hcp_yaml::foreach_kv(map, |k, v| self.set(k, v)),
            Yaml::Boolean(enabled) => {
                self.enabled = *enabled;
                Ok(())
            }
            _ => Err(anyhow!("yaml value type for 'cache' should be 'map' or 'bool'")),
        }
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match hcp_yaml::key::normalize(k).as_str() {
            "enabled" | "enable" => {
                self.enabled = hcp_yaml::value::as_bool(v)?;
                Ok(())
            }
            "max_object_size" => {
                self.max_object_size = hcp_yaml::humanize::as_usize(v)?;
                Ok(())
            }
            "max_entries" => {
                self.max_entries = hcp_yaml::value::as_usize(v)?;
                Ok(())
            }
            "warn_on_stale" => {
                self.warn_on_stale = hcp_yaml::value::as_bool(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub(super) fn check(&self) -> anyhow::Result<()> {
        if self.enabled && self.max_entries == 0 {
            return Err(anyhow!("max_entries should be greater than 0"));
        }
        Ok(())
    }
}
