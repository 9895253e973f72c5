/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use ahash::AHashMap;
use anyhow::anyhow;
use yaml_rust::Yaml;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub realm: String,
    users: AHashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            realm: crate::build::PKG_NAME.to_string(),
            users: AHashMap::new(),
        }
    }
}

impl AuthConfig {
    /// Authentication is only required when at least one user is configured.
    #[inline]
    pub fn enabled(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn check(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|p| p == password)
            .unwrap_or(false)
    }

    pub(crate) fn parse_yaml(&mut self, v: &Yaml) -> anyhow::Result<()> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("yaml value type for 'auth' should be 'map'"));
        };
        hcp_yaml::foreach_kv(map, |k, v| match hcp_yaml::key::normalize(k).as_str() {
            "realm" => {
                self.realm = hcp_yaml::value::as_string(v)?;
                Ok(())
            }
            "users" => {
                let users = hcp_yaml::value::as_list(v, parse_user)?;
                for (name, password) in users {
                    if self.users.insert(name.clone(), password).is_some() {
                        return Err(anyhow!("duplicate user {name}"));
                    }
                }
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        })
    }
}

fn parse_user(v: &Yaml) -> anyhow::Result<(String, String)> {
    let Yaml::Hash(map) = v else {
        return Err(anyhow!("yaml value type for user should be 'map'"));
    };
    let mut username = None;
    let mut password = String::new();
    hcp_yaml::foreach_kv(map, |k, v| match hcp_yaml::key::normalize(k).as_str() {
        "username" | "name" => {
            username = Some(hcp_yaml::value::as_string(v)?);
            Ok(())
        }
        "password" => {
            password = hcp_yaml::value::as_string(v)?;
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;
    let username = username.ok_or_else(|| anyhow!("no username set"))?;
    Ok((username, password))
}
