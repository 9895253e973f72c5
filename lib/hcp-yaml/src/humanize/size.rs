/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use humanize_rs::bytes::Bytes;
use yaml_rust::Yaml;

pub fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => {
            let b = s
                .parse::<Bytes>()
                .map_err(|e| anyhow!("invalid humanize size {s}: {e}"))?;
            Ok(b.size())
        }
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for humanize size should be 'string' or 'integer'"
        )),
    }
}

pub fn as_u64(v: &Yaml) -> anyhow::Result<u64> {
    match v {
        Yaml::String(s) => {
            let b = s
                .parse::<Bytes<u64>>()
                .map_err(|e| anyhow!("invalid humanize size {s}: {e}"))?;
            Ok(b.size())
        }
        Yaml::Integer(i) => Ok(u64::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for humanize size should be 'string' or 'integer'"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(as_usize(&Yaml::String("64KiB".to_string())).unwrap(), 65536);
        assert_eq!(as_usize(&Yaml::String("1KB".to_string())).unwrap(), 1000);
        assert_eq!(as_usize(&Yaml::Integer(4096)).unwrap(), 4096);
        assert_eq!(as_u64(&Yaml::String("8MiB".to_string())).unwrap(), 8 << 20);
        assert!(as_usize(&Yaml::Integer(-1)).is_err());
        assert!(as_usize(&Yaml::String("abc".to_string())).is_err());
        assert!(as_usize(&Yaml::Boolean(true)).is_err());
    }
}
