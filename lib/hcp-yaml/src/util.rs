/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, YamlLoader};

pub fn load_doc(path: &Path) -> anyhow::Result<Vec<Yaml>> {
    let content = std::fs::read_to_string(path)
        .context(format!("failed to read file {}", path.display()))?;
    YamlLoader::load_from_str(&content)
        .map_err(|e| anyhow!("invalid yaml file {}: {e}", path.display()))
}

/// Run `f` on every document in the file, all docs are treated as parts of the same config.
pub fn foreach_doc<F>(path: &Path, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(usize, &Yaml) -> anyhow::Result<()>,
{
    let docs = load_doc(path)?;
    for (i, doc) in docs.iter().enumerate() {
        f(i, doc).context(format!("failed to load doc #{i} of {}", path.display()))?;
    }
    Ok(())
}
