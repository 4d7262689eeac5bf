//! Redirect allow-list for `service` and `TARGET` URLs.

use tracing::warn;
use url::Url;

/// Hostname suffix allow-list.
#[derive(Debug, Clone, Default)]
pub struct ServiceUrlGuard {
    domains: Vec<String>,
}

impl ServiceUrlGuard {
    /// Build from configured domains. Blank entries are dropped so an unset
    /// list can never match every host.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True iff `service_url` parses and its host equals, or is a subdomain
    /// of, one of the allowed domains.
    pub fn is_allowed(&self, service_url: &str) -> bool {
        let host = match Url::parse(service_url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return false,
            },
            Err(e) => {
                warn!(service = %service_url, error = %e, "Unparsable service URL");
                return false;
            }
        };

        self.domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }
}
