/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use anyhow::{Context, anyhow};
use http::{HeaderName, HeaderValue, StatusCode};
use regex::Regex;
use yaml_rust::Yaml;

use crate::filter::{FilterAction, FilterRegistry, FilterRule, HeaderRewrite};

pub(super) fn parse_registry(registry: &mut FilterRegistry, v: &Yaml) -> anyhow::Result<()> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("yaml value type for 'filter' should be 'map'"));
    };
    hcp_yaml::foreach_kv(map, |k, v| match hcp_yaml::key::normalize(k).as_str() {
        "request" => {
            for rule in hcp_yaml::value::as_list(v, parse_rule)? {
                registry.push_request_rule(rule);
            }
            Ok(())
        }
        "response" => {
            for rule in hcp_yaml::value::as_list(v, parse_rule)? {
                registry.push_response_rule(rule);
            }
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })
}

fn parse_rule(v: &Yaml) -> anyhow::Result<FilterRule> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("yaml value type for filter rule should be 'map'"));
    };

    let mut pattern: Option<Regex> = None;
    let mut action = String::from("pass");
    let mut status = StatusCode::FORBIDDEN;
    let mut rewrite = HeaderRewrite::default();
    hcp_yaml::foreach_kv(map, |k, v| match hcp_yaml::key::normalize(k).as_str() {
        "match" | "pattern" => {
            pattern = Some(hcp_yaml::value::as_regex(v)?);
            Ok(())
        }
        "action" => {
            action = hcp_yaml::value::as_string(v)?.to_lowercase();
            Ok(())
        }
        "status" => {
            status = hcp_yaml::value::as_status_code(v)?;
            Ok(())
        }
        "set_header" => {
            let Yaml::Hash(headers) = v else {
                return Err(anyhow!("yaml value type for 'set_header' should be 'map'"));
            };
            hcp_yaml::foreach_kv(headers, |name, value| {
                let name = HeaderName::from_str(name)?;
                let value = HeaderValue::from_str(&hcp_yaml::value::as_string(value)?)?;
                rewrite.set.push((name, value));
                Ok(())
            })
        }
        "remove_header" => {
            rewrite.remove = hcp_yaml::value::as_list(v, hcp_yaml::value::as_http_header_name)?;
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;

    let pattern = pattern.ok_or_else(|| anyhow!("no match pattern set"))?;
    let action = match action.as_str() {
        "block" | "deny" => FilterAction::Block(status),
        "rewrite" => FilterAction::Rewrite(rewrite),
        "pass" | "allow" => FilterAction::Pass,
        _ => return Err(anyhow!("invalid filter action {action}")),
    };
    Ok(FilterRule::new(pattern, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn load(s: &str) -> anyhow::Result<FilterRegistry> {
        let doc = YamlLoader::load_from_str(s)?.into_iter().next().context("no doc")?;
        let mut r = FilterRegistry::default();
        parse_registry(&mut r, &doc)?;
        Ok(r)
    }

    #[test]
    fn rules() {
        let r = load(
            r#"
request:
  - match: "\\.exe$"
    action: block
    status: 451
  - match: "."
    action: rewrite
    set_header:
      X-Proxy: hcproxy
    remove_header: [cookie, referer]
"#,
        )
        .unwrap();
        assert_eq!(
            r.match_request("http://example.com/a.exe"),
            Some(&FilterAction::Block(
                StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
            ))
        );
        let Some(FilterAction::Rewrite(rw)) = r.match_request("http://example.com/") else {
            panic!("no rewrite rule matched");
        };
        assert_eq!(rw.set.len(), 1);
        assert_eq!(rw.remove.len(), 2);
    }

    #[test]
    fn invalid() {
        assert!(load("request: [{action: block}]").is_err());
        assert!(load("request: [{match: a, action: drop}]").is_err());
        assert!(load("other: []").is_err());
    }
}
