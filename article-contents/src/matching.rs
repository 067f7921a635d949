//! URL normalization and domain match patterns

use tracing::debug;
use url::Url;

/// Reduce a URL to scheme, host and path.
///
/// Port, credentials, query and fragment are dropped. Input that does not
/// parse as a URL is returned unchanged.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or(""),
            parsed.path()
        ),
        Err(e) => {
            debug!("Leaving unparseable URL as is ({}): {}", e, url);
            url.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DomainEntry {
    host: String,
    path: Option<String>,
}

impl DomainEntry {
    fn parse(domain: &str) -> Self {
        let domain = domain.trim();
        match domain.find('/') {
            Some(idx) => Self {
                host: domain[..idx].to_ascii_lowercase(),
                path: Some(domain[idx..].to_string()),
            },
            None => Self {
                host: domain.to_ascii_lowercase(),
                path: None,
            },
        }
    }

    fn pattern(&self) -> String {
        match &self.path {
            Some(path) => format!("*://*.{}{}*", self.host, path),
            None => format!("*://*.{}/*", self.host),
        }
    }

    fn matches(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        };

        let host_matches = host == self.host || host.ends_with(&format!(".{}", self.host));
        let path_matches = self
            .path
            .as_deref()
            .map_or(true, |prefix| url.path().starts_with(prefix));

        host_matches && path_matches
    }
}

/// The set of pages the content observer is injected into.
///
/// Every domain also covers its subdomains. A domain may carry a path prefix
/// such as `example.com/news`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationScope {
    domains: Vec<DomainEntry>,
}

impl ObservationScope {
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        let domains = domains
            .iter()
            .map(|d| d.as_ref())
            .filter(|d| !d.trim().is_empty())
            .map(DomainEntry::parse)
            .collect();
        Self { domains }
    }

    /// Browser match patterns, one per domain
    pub fn match_patterns(&self) -> Vec<String> {
        self.domains.iter().map(DomainEntry::pattern).collect()
    }

    pub fn matches(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.domains.iter().any(|d| d.matches(&parsed)),
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
