//! Application configuration loaded from environment variables.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::fetcher::{
    Fetcher, FetcherConfig, FxTwitterClient, DEFAULT_METADATA_API, DEFAULT_USER_AGENT,
};
use crate::logging::LogConfig;
use crate::proxy_service::{ProxyServiceConfig, MAX_CONCURRENT_REQUESTS};
use crate::security::TargetPolicyConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000").
    pub bind_addr: String,

    /// User-Agent sent when fetching target pages.
    pub user_agent: String,

    /// Timeout for each outbound request.
    pub timeout: Duration,

    /// Base URL of the status metadata API.
    pub metadata_api: String,

    pub max_content_bytes: usize,

    pub max_concurrent_requests: usize,

    /// Allow localhost and private network targets.
    pub allow_private_hosts: bool,

    pub blocked_domains: HashSet<String>,

    pub log_level: String,

    /// Directory for daily-rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `READER_PROXY_BIND_ADDR` (default: "0.0.0.0:3000")
    /// - `READER_PROXY_USER_AGENT` (default: desktop Chrome)
    /// - `READER_PROXY_TIMEOUT_SECS` (default: 30)
    /// - `READER_PROXY_METADATA_API` (default: "https://api.fxtwitter.com")
    /// - `READER_PROXY_MAX_CONTENT_BYTES` (default: 10 MiB)
    /// - `READER_PROXY_MAX_CONCURRENT` (default: 500)
    /// - `READER_PROXY_ALLOW_PRIVATE_HOSTS` (default: false)
    /// - `READER_PROXY_BLOCKED_DOMAINS`: comma-separated domains
    /// - `READER_PROXY_LOG_LEVEL` (default: "info")
    /// - `READER_PROXY_LOG_DIR`
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("READER_PROXY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let user_agent = std::env::var("READER_PROXY_USER_AGENT")
            .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        let timeout = Duration::from_secs(parse_var("READER_PROXY_TIMEOUT_SECS", 30)?);

        let metadata_api = std::env::var("READER_PROXY_METADATA_API")
            .unwrap_or_else(|_| DEFAULT_METADATA_API.to_string())
            .trim_end_matches('/')
            .to_string();

        let max_content_bytes = parse_var("READER_PROXY_MAX_CONTENT_BYTES", 10 * 1024 * 1024)?;
        let max_concurrent_requests =
            parse_var("READER_PROXY_MAX_CONCURRENT", MAX_CONCURRENT_REQUESTS)?;
        anyhow::ensure!(
            max_concurrent_requests > 0,
            "READER_PROXY_MAX_CONCURRENT must be at least 1"
        );

        let allow_private_hosts = parse_var("READER_PROXY_ALLOW_PRIVATE_HOSTS", false)?;

        let blocked_domains: HashSet<String> = std::env::var("READER_PROXY_BLOCKED_DOMAINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let log_level =
            std::env::var("READER_PROXY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_dir = std::env::var("READER_PROXY_LOG_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            user_agent,
            timeout,
            metadata_api,
            max_content_bytes,
            max_concurrent_requests,
            allow_private_hosts,
            blocked_domains,
            log_level,
            log_dir,
        })
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.log_dir.clone().unwrap_or_else(|| "logs".into()),
            log_level: self.log_level.clone(),
            console_output: true,
            file_output: self.log_dir.is_some(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
            max_content_size: self.max_content_bytes,
            ..Default::default()
        }
    }

    pub fn target_policy(&self) -> TargetPolicyConfig {
        TargetPolicyConfig {
            block_private_hosts: !self.allow_private_hosts,
            blocked_domains: self.blocked_domains.clone(),
            ..Default::default()
        }
    }

    /// Service configuration with the HTTP-backed fetcher and metadata client.
    pub fn service_config(&self) -> anyhow::Result<ProxyServiceConfig> {
        let fetcher = Fetcher::new_with_config(self.fetcher_config())?;
        let metadata_client = FxTwitterClient::new(self.metadata_api.clone(), self.timeout)?;

        Ok(ProxyServiceConfig::new()
            .with_fetcher(fetcher)
            .with_metadata_provider(Arc::new(metadata_client))
            .with_target_policy(self.target_policy())
            .with_max_concurrent_requests(self.max_concurrent_requests))
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "READER_PROXY_BIND_ADDR",
        "READER_PROXY_USER_AGENT",
        "READER_PROXY_TIMEOUT_SECS",
        "READER_PROXY_METADATA_API",
        "READER_PROXY_MAX_CONTENT_BYTES",
        "READER_PROXY_MAX_CONCURRENT",
        "READER_PROXY_ALLOW_PRIVATE_HOSTS",
        "READER_PROXY_BLOCKED_DOMAINS",
        "READER_PROXY_LOG_LEVEL",
        "READER_PROXY_LOG_DIR",
    ];

    /// Runs `f` with only `vars` set among the config keys.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }

        f();

        for (k, v) in saved {
            match v {
                Some(v) => std::env::set_var(k, v),
                None => std::env::remove_var(k),
            }
        }
    }

    #[test]
    fn defaults() {
        with_env_vars(&[], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.bind_addr, "0.0.0.0:3000");
            assert_eq!(config.timeout, Duration::from_secs(30));
            assert_eq!(config.metadata_api, "https://api.fxtwitter.com");
            assert_eq!(config.max_content_bytes, 10 * 1024 * 1024);
            assert_eq!(config.max_concurrent_requests, 500);
            assert!(!config.allow_private_hosts);
            assert!(config.blocked_domains.is_empty());
            assert!(config.log_dir.is_none());
            assert!(!config.log_config().file_output);
        });
    }

    #[test]
    fn overrides() {
        with_env_vars(
            &[
                ("READER_PROXY_BIND_ADDR", "127.0.0.1:8080"),
                ("READER_PROXY_TIMEOUT_SECS", "5"),
                ("READER_PROXY_METADATA_API", "http://localhost:9000/"),
                ("READER_PROXY_ALLOW_PRIVATE_HOSTS", "true"),
                ("READER_PROXY_BLOCKED_DOMAINS", "Evil.com, ,tracker.net"),
                ("READER_PROXY_LOG_DIR", "/tmp/reader-proxy"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.bind_addr, "127.0.0.1:8080");
                assert_eq!(config.timeout, Duration::from_secs(5));
                assert_eq!(config.metadata_api, "http://localhost:9000");
                assert!(config.allow_private_hosts);
                assert!(!config.target_policy().block_private_hosts);
                assert_eq!(config.blocked_domains.len(), 2);
                assert!(config.blocked_domains.contains("evil.com"));
                assert!(config.log_config().file_output);
            },
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        with_env_vars(&[("READER_PROXY_TIMEOUT_SECS", "soon")], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("READER_PROXY_TIMEOUT_SECS"));
        });
        with_env_vars(&[("READER_PROXY_MAX_CONCURRENT", "0")], || {
            assert!(Config::from_env().is_err());
        });
    }
}
