/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

pub fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        let Yaml::String(key) = k else {
            return Err(anyhow!("hash key should be string"));
        };
        f(key, v).context(format!("invalid value for key {key}"))?;
    }
    Ok(())
}

pub fn get_required<'a>(map: &'a yaml::Hash, k: &str) -> anyhow::Result<&'a Yaml> {
    map.get(&Yaml::String(k.to_owned()))
        .ok_or_else(|| anyhow!("required key {k} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterate() {
        let doc = yaml_doc!("a: 1\nb: x");
        let hash = doc.as_hash().unwrap();
        let mut keys = Vec::new();
        foreach_kv(hash, |k, _| {
            keys.push(k.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(keys, vec!["a", "b"]);

        let doc = yaml_doc!("1: a");
        assert!(foreach_kv(doc.as_hash().unwrap(), |_, _| Ok(())).is_err());

        let doc = yaml_doc!("a: 1");
        assert!(foreach_kv(doc.as_hash().unwrap(), |_, _| Err(anyhow!("bad"))).is_err());
    }

    #[test]
    fn required() {
        let doc = yaml_doc!("name: test");
        let hash = doc.as_hash().unwrap();
        assert_eq!(get_required(hash, "name").unwrap().as_str(), Some("test"));
        assert!(get_required(hash, "other").is_err());
    }
}
