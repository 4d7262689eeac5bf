//! Post-login action rules.
//!
//! Configured as `host;action;key=value[;key=value...]`, rules separated by
//! `|`. Parsed once at startup into a typed table; the first rule whose host
//! equals the service URL's hostname applies.

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Clear a cookie on the callback response.
    UnsetCookie { cookie_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRule {
    pub host: String,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRules {
    rules: Vec<LoginRule>,
}

impl LoginRules {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for (index, segment) in raw.split('|').enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut parts = segment.split(';').map(str::trim);
            let host = parts.next().unwrap_or_default().to_ascii_lowercase();
            let action = parts
                .next()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| anyhow!("login rule {} ({:?}) has no action", index, segment))?;
            if host.is_empty() {
                bail!("login rule {} ({:?}) has no host", index, segment);
            }

            let params: HashMap<&str, &str> = parts
                .filter_map(|p| p.split_once('='))
                .map(|(k, v)| (k.trim(), v.trim()))
                .collect();

            let action = match action {
                "unsetCookie" => {
                    let cookie_name = params
                        .get("cookieName")
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| {
                            anyhow!("login rule {} (unsetCookie) requires cookieName", index)
                        })?;
                    RuleAction::UnsetCookie {
                        cookie_name: cookie_name.to_string(),
                    }
                }
                other => bail!("login rule {} has unknown action {:?}", index, other),
            };

            rules.push(LoginRule { host, action });
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Action for the first rule matching the hostname of `service_url`.
    pub fn action_for(&self, service_url: &str) -> Option<&RuleAction> {
        let url = Url::parse(service_url).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.host == host)
            .map(|rule| &rule.action)
    }
}
