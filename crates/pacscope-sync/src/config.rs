use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_FEC_API_BASE: &str = "https://api.open.fec.gov/v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub fec_api_key: Option<String>,
    pub fec_api_base: String,
    pub min_request_interval: Duration,
    pub docstore_base_url: Option<String>,
    pub docstore_token: Option<String>,
    pub notify_url: Option<String>,
    pub state_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub organizations_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset; unparsable
    /// numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            fec_api_key: var("FEC_API_KEY"),
            fec_api_base: var("FEC_API_BASE").unwrap_or_else(|| DEFAULT_FEC_API_BASE.to_string()),
            min_request_interval: Duration::from_millis(
                var("FEC_MIN_REQUEST_INTERVAL_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            docstore_base_url: var("DOCSTORE_BASE_URL"),
            docstore_token: var("DOCSTORE_TOKEN"),
            notify_url: var("PACSCOPE_NOTIFY_URL"),
            state_dir: var("PACSCOPE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./state")),
            reports_dir: var("PACSCOPE_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            organizations_path: var("PACSCOPE_ORGANIZATIONS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./organizations.yaml")),
            user_agent: var("PACSCOPE_USER_AGENT")
                .unwrap_or_else(|| "pacscope-updater/0.1".to_string()),
            http_timeout_secs: var("PACSCOPE_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// The document store is only required when results will be published.
    pub fn validate(&self, dry_run: bool) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.fec_api_key.is_none() {
            missing.push("FEC_API_KEY");
        }
        if !dry_run {
            if self.docstore_base_url.is_none() {
                missing.push("DOCSTORE_BASE_URL");
            }
            if self.docstore_token.is_none() {
                missing.push("DOCSTORE_TOKEN");
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[("FEC_API_KEY", "k"), ("FEC_MIN_REQUEST_INTERVAL_MS", "fast")]);
        assert_eq!(cfg.fec_api_base, DEFAULT_FEC_API_BASE);
        assert_eq!(cfg.min_request_interval, Duration::from_millis(3600));
        assert_eq!(cfg.state_dir, PathBuf::from("./state"));
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert!(cfg.notify_url.is_none());
    }

    #[test]
    fn publishing_requires_document_store_credentials() {
        let cfg = config(&[("FEC_API_KEY", "k"), ("DOCSTORE_TOKEN", "  ")]);
        assert_eq!(cfg.validate(true), Ok(()));
        assert_eq!(
            cfg.validate(false),
            Err(ConfigError::Missing(vec!["DOCSTORE_BASE_URL", "DOCSTORE_TOKEN"]))
        );

        let err = config(&[]).validate(true).unwrap_err();
        assert_eq!(err.to_string(), "missing required configuration: FEC_API_KEY");
    }
}
