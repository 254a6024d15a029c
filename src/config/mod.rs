//! Client configuration management

use std::env;

use anyhow::{Context, Result, bail};
use url::Url;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service base URL
    pub base_url: String,

    /// Project the data models live in
    pub project: String,

    /// Static bearer token; acquiring and refreshing tokens happens elsewhere
    pub token: Option<String>,

    /// Space used for bare external ids in relation filters
    pub default_space: Option<String>,

    /// Maximum requests per second
    pub requests_per_second: u32,

    /// Burst capacity above the steady rate
    pub burst_size: u32,

    /// Attempts per request, including the first
    pub max_retries: u32,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("VIEWGRAPH_BASE_URL")
            .unwrap_or_else(|| "https://api.cognitedata.com".to_string());
        let parsed = Url::parse(&base_url).context("Invalid VIEWGRAPH_BASE_URL")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("VIEWGRAPH_BASE_URL must be an http(s) URL, got {base_url}");
        }

        let project = lookup("VIEWGRAPH_PROJECT").context("VIEWGRAPH_PROJECT is required")?;

        Ok(Self {
            base_url,

            project,

            token: lookup("VIEWGRAPH_TOKEN").filter(|t| !t.is_empty()),

            default_space: lookup("VIEWGRAPH_DEFAULT_SPACE").filter(|s| !s.is_empty()),

            requests_per_second: lookup("VIEWGRAPH_REQUESTS_PER_SECOND")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Invalid VIEWGRAPH_REQUESTS_PER_SECOND")?,

            burst_size: lookup("VIEWGRAPH_BURST")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .context("Invalid VIEWGRAPH_BURST")?,

            max_retries: lookup("VIEWGRAPH_MAX_RETRIES")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("Invalid VIEWGRAPH_MAX_RETRIES")?,

            timeout_secs: lookup("VIEWGRAPH_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .context("Invalid VIEWGRAPH_TIMEOUT_SECS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[("VIEWGRAPH_PROJECT", "demo")])).unwrap();
        assert_eq!(config.base_url, "https://api.cognitedata.com");
        assert_eq!(config.project, "demo");
        assert_eq!(config.token, None);
        assert_eq!(config.requests_per_second, 10);
        assert_eq!(config.burst_size, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_project_is_required() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("VIEWGRAPH_PROJECT"));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("VIEWGRAPH_PROJECT", "demo"),
            ("VIEWGRAPH_BURST", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("VIEWGRAPH_BURST"));

        let err = ClientConfig::from_lookup(lookup(&[
            ("VIEWGRAPH_PROJECT", "demo"),
            ("VIEWGRAPH_BASE_URL", "ftp://example.test"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("http"));
    }
}
