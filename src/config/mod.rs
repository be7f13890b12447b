pub mod loader;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub use loader::load_config_or_default;

/// Longest accepted cache lifetime (one year).
pub const MAX_CACHE_TTL_HOURS: u64 = 24 * 365;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub heuristics: HeuristicConfig,
    pub blacklist: BlacklistConfig,
    pub threat_intel: ThreatIntelConfig,
    pub content_analysis: ContentAnalysisConfig,
    pub cache: CacheConfig,
    pub blocked_log: BlockedLogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub max_body_bytes: usize,
    pub cache_purge_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Accumulated weight at or above which a URL is suspicious.
    pub threshold: i32,
    pub max_url_length: usize,
    pub max_hostname_dots: usize,
    pub max_hostname_hyphens: usize,
    pub keywords: Vec<String>,
    pub weights: RuleWeights,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuleWeights {
    pub long_url: i32,
    pub single_keyword: i32,
    pub multiple_keywords: i32,
    pub hostname_dots: i32,
    pub hostname_hyphens: i32,
    pub insecure_scheme: i32,
    pub at_symbol: i32,
    pub raw_ip_host: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BlacklistConfig {
    pub domains: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ThreatIntelConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Queue URLs the provider has never seen for scanning.
    pub submit_unknown: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ContentAnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_content_chars: usize,
    pub unsafe_score_threshold: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct BlockedLogConfig {
    /// JSON-lines file; blocked URLs are only logged when unset.
    pub path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:5000".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
            cache_purge_interval_seconds: 3600,
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            threshold: 4,
            max_url_length: 150,
            max_hostname_dots: 4,
            max_hostname_hyphens: 3,
            keywords: [
                "login",
                "verify",
                "account",
                "password",
                "update",
                "secure",
                "signin",
                "banking",
                "confirm",
                "credential",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            weights: RuleWeights::default(),
        }
    }
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            long_url: 1,
            single_keyword: 1,
            multiple_keywords: 2,
            hostname_dots: 1,
            hostname_hyphens: 1,
            insecure_scheme: 2,
            at_symbol: 3,
            raw_ip_host: 4,
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            domains: vec![
                "malicious-example.com".to_string(),
                "phishing-site.net".to_string(),
                "scam-domain.org".to_string(),
            ],
        }
    }
}

impl Default for ThreatIntelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: "https://www.virustotal.com/api/v3".to_string(),
            timeout_seconds: 5,
            submit_unknown: true,
        }
    }
}

impl Default for ContentAnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_seconds: 30,
            max_content_chars: 100_000,
            unsafe_score_threshold: 50,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

impl ThreatIntelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ContentAnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours.min(MAX_CACHE_TTL_HOURS) as i64)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Provider credentials from the environment take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("VIRUSTOTAL_API_KEY").filter(|k| !k.is_empty()) {
            self.threat_intel.api_key = Some(key);
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.content_analysis.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_address
            .parse::<SocketAddr>()
            .with_context(|| {
                format!("Invalid listen address: {}", self.server.listen_address)
            })?;
        if self.heuristics.threshold <= 0 {
            bail!("heuristics.threshold must be positive");
        }
        if self.heuristics.keywords.iter().any(|k| k.trim().is_empty()) {
            bail!("heuristics.keywords must not contain empty entries");
        }
        if self.threat_intel.timeout_seconds == 0 {
            bail!("threat_intel.timeout_seconds must be positive");
        }
        if self.content_analysis.timeout_seconds == 0 {
            bail!("content_analysis.timeout_seconds must be positive");
        }
        if self.content_analysis.model.trim().is_empty() {
            bail!("content_analysis.model must not be empty");
        }
        if self.content_analysis.unsafe_score_threshold > 100 {
            bail!("content_analysis.unsafe_score_threshold must be within 0..=100");
        }
        if self.cache.ttl_hours == 0 {
            bail!("cache.ttl_hours must be positive");
        }
        if self.cache.ttl_hours > MAX_CACHE_TTL_HOURS {
            bail!("cache.ttl_hours must not exceed {MAX_CACHE_TTL_HOURS}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heuristics.threshold, 4);
        assert_eq!(config.heuristics.keywords.len(), 10);
        assert_eq!(config.cache.ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
heuristics:
  threshold: 6
blacklist:
  domains:
    - evil.example
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.heuristics.threshold, 6);
        assert_eq!(config.heuristics.max_url_length, 150);
        assert_eq!(config.heuristics.weights.raw_ip_host, 4);
        assert_eq!(config.blacklist.domains, vec!["evil.example".to_string()]);
        assert_eq!(config.threat_intel.timeout_seconds, 5);
    }

    #[test]
    fn test_empty_yaml() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.server.listen_address, "127.0.0.1:5000");
    }

    #[test]
    fn test_yaml_roundtrip_of_defaults() {
        let yaml = Config::default().to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.heuristics.keywords, Config::default().heuristics.keywords);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.heuristics.threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.content_analysis.unsafe_score_threshold = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.listen_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heuristics.keywords.push("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.ttl_hours = u64::MAX;
        assert!(config.validate().is_err());
        config.cache.ttl_hours = MAX_CACHE_TTL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_ttl_is_clamped() {
        let cache = CacheConfig {
            ttl_hours: u64::MAX,
        };
        assert_eq!(
            cache.ttl(),
            chrono::Duration::hours(MAX_CACHE_TTL_HOURS as i64)
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "VIRUSTOTAL_API_KEY" => Some("vt-key".to_string()),
            "GEMINI_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.threat_intel.api_key.as_deref(), Some("vt-key"));
        assert_eq!(config.content_analysis.api_key, None);
    }
}
