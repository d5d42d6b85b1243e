//! Configuration management for the storefront guard.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `GUARD_*` environment variables (`__` separates nested keys, e.g.
//! `GUARD_SERVER__ADDR=0.0.0.0:3000`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GuardError, Result};
use crate::throttle::{
    default_rules, PolicySelector, RateLimitPolicy, RouteRule, DEFAULT_ROUTE_CLASS,
};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "GUARD";

/// Main configuration for the guard service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Throttling configuration
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Counter storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Throttling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Policy for routes matching no rule
    #[serde(default = "default_policy")]
    pub default: RateLimitPolicy,

    /// Route rules, in match order
    #[serde(default = "default_rules")]
    pub rules: Vec<RouteRule>,

    /// Honor the forwarded-address header when resolving trackers
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,

    /// Header carrying the forwarded-address chain
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,

    /// Add `X-RateLimit-*` headers to admitted responses
    #[serde(default = "default_true")]
    pub emit_headers: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default: default_policy(),
            rules: default_rules(),
            trust_forwarded_headers: true,
            forwarded_header: default_forwarded_header(),
            emit_headers: true,
        }
    }
}

fn default_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(100, 60_000)
}

fn default_true() -> bool {
    true
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

impl ThrottleConfig {
    /// Build the policy selector described by this configuration.
    pub fn selector(&self) -> PolicySelector {
        PolicySelector::new(self.rules.clone(), self.default)
    }
}

/// Counter storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Interval between sweeps of expired counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl GuardConfig {
    /// Load configuration from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: GuardConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject policies with a zero limit or window and malformed rules.
    pub fn validate(&self) -> Result<()> {
        if !self.throttle.default.is_valid() {
            return Err(GuardError::Config(
                "default policy must have a positive limit and ttl_ms".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for rule in &self.throttle.rules {
            if rule.name.trim().is_empty() || rule.name == DEFAULT_ROUTE_CLASS {
                return Err(GuardError::Config(format!(
                    "rule name '{}' is empty or reserved",
                    rule.name
                )));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(GuardError::Config(format!(
                    "rule name '{}' is used more than once",
                    rule.name
                )));
            }
            if !rule.policy.is_valid() {
                return Err(GuardError::Config(format!(
                    "rule '{}' must have a positive limit and ttl_ms",
                    rule.name
                )));
            }
            if rule.patterns.is_empty() || rule.patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(GuardError::Config(format!(
                    "rule '{}' needs patterns, none of them blank",
                    rule.name
                )));
            }
        }

        if self.throttle.forwarded_header.trim().is_empty() {
            return Err(GuardError::Config("forwarded_header must not be empty".to_string()));
        }

        if self.storage.sweep_interval_secs == 0 {
            return Err(GuardError::Config("sweep_interval_secs must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::{auth_rule, upload_rule};

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.server.addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.throttle.default, RateLimitPolicy::new(100, 60_000));
        assert_eq!(config.throttle.rules, vec![auth_rule(), upload_rule()]);
        assert!(config.throttle.trust_forwarded_headers);
        assert_eq!(config.throttle.forwarded_header, "x-forwarded-for");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = GuardConfig::from_yaml("{}").unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
server:
  addr: 0.0.0.0:8080
logging:
  level: debug
  format: json
throttle:
  default:
    limit: 20
    ttl_ms: 1000
  trust_forwarded_headers: false
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.throttle.default, RateLimitPolicy::new(20, 1000));
        assert!(!config.throttle.trust_forwarded_headers);
        // Rules not restated keep the built-in table
        assert_eq!(config.throttle.rules.len(), 2);
    }

    #[test]
    fn test_selector_from_config() {
        let config = GuardConfig::default();
        let selector = config.throttle.selector();
        assert_eq!(selector.select("/auth/login").policy.limit, 5);
        assert_eq!(selector.select("/orders").policy, config.throttle.default);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
throttle:
  default:
    limit: 0
    ttl_ms: 60000
"#;
        assert!(matches!(GuardConfig::from_yaml(yaml), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_zero_ttl_rule_rejected() {
        let yaml = r#"
throttle:
  rules:
    - name: auth
      patterns: ["/auth/login"]
      limit: 5
      ttl_ms: 0
"#;
        let err = GuardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("auth"));
    }

    #[test]
    fn test_blank_pattern_rejected() {
        let yaml = r#"
throttle:
  rules:
    - name: auth
      patterns: ["/auth/login", ""]
      limit: 5
      ttl_ms: 60000
"#;
        let err = GuardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("auth"));

        let yaml = r#"
throttle:
  rules:
    - name: auth
      patterns: ["/auth/login", "  "]
      limit: 5
      ttl_ms: 60000
"#;
        assert!(matches!(GuardConfig::from_yaml(yaml), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_rule_without_patterns_rejected() {
        let yaml = r#"
throttle:
  rules:
    - name: auth
      patterns: []
      limit: 5
      ttl_ms: 60000
"#;
        assert!(matches!(GuardConfig::from_yaml(yaml), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        let yaml = r#"
throttle:
  rules:
    - name: strict
      patterns: ["/a"]
      limit: 1
      ttl_ms: 60000
    - name: strict
      patterns: ["/b"]
      limit: 100
      ttl_ms: 60000
"#;
        let err = GuardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_reserved_rule_name_rejected() {
        let yaml = r#"
throttle:
  rules:
    - name: default
      patterns: ["/reports"]
      limit: 1
      ttl_ms: 60000
"#;
        let err = GuardConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        assert!(matches!(
            GuardConfig::from_yaml("server: [not, a, map]"),
            Err(GuardError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        assert!(matches!(
            GuardConfig::from_file("/nonexistent/guard.yaml"),
            Err(GuardError::Io(_))
        ));
    }

    #[test]
    fn test_example_file_matches_builtin_table() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/guard.example.yaml");
        let config = GuardConfig::from_file(path).unwrap();

        assert_eq!(config.throttle, ThrottleConfig::default());
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.addr, "0.0.0.0:3000".parse().unwrap());
    }

    #[test]
    fn test_load_reads_file_source() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/guard.example.yaml"));
        let config = GuardConfig::load(Some(path)).unwrap();

        assert_eq!(config.throttle.rules, default_rules());
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = GuardConfig::load(None).unwrap();
        assert_eq!(config.throttle.rules, default_rules());
    }
}
