//! Route policy table and selection.
//!
//! A request path is matched against an ordered list of route rules. Each
//! rule carries one or more path substrings; the first rule with a matching
//! substring supplies the policy. Paths matching no rule fall back to the
//! configured default.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Route class used when no rule matches.
pub const DEFAULT_ROUTE_CLASS: &str = "default";

/// How many requests an identity may make within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests allowed in the window
    pub limit: u32,
    /// Window length in milliseconds
    pub ttl_ms: u64,
}

impl RateLimitPolicy {
    /// Create a new policy.
    pub const fn new(limit: u32, ttl_ms: u64) -> Self {
        Self { limit, ttl_ms }
    }

    /// Window length as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Whether both the limit and the window are positive.
    pub fn is_valid(&self) -> bool {
        self.limit > 0 && self.ttl_ms > 0
    }
}

/// A named group of path substrings sharing one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Route class name, also part of the counter key
    pub name: String,
    /// Path substrings selecting this rule
    pub patterns: Vec<String>,
    /// Policy applied to matching paths
    #[serde(flatten)]
    pub policy: RateLimitPolicy,
}

impl RouteRule {
    pub fn new(name: &str, patterns: &[&str], policy: RateLimitPolicy) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            policy,
        }
    }

    /// Whether any of this rule's substrings occurs in `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

/// Login and registration: 5 requests per minute.
pub fn auth_rule() -> RouteRule {
    RouteRule::new(
        "auth",
        &["/auth/login", "/auth/register"],
        RateLimitPolicy::new(5, 60_000),
    )
}

/// File uploads: 10 requests per hour.
pub fn upload_rule() -> RouteRule {
    RouteRule::new(
        "upload",
        &["/files/upload"],
        RateLimitPolicy::new(10, 3_600_000),
    )
}

/// The built-in rule table, in match order.
pub fn default_rules() -> Vec<RouteRule> {
    vec![auth_rule(), upload_rule()]
}

/// The policy chosen for one request, with the class that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedPolicy<'a> {
    pub route_class: &'a str,
    pub policy: RateLimitPolicy,
}

/// Maps request paths to rate limit policies.
#[derive(Debug, Clone)]
pub struct PolicySelector {
    rules: Vec<RouteRule>,
    default: RateLimitPolicy,
}

impl PolicySelector {
    /// Create a selector with an explicit rule table.
    pub fn new(rules: Vec<RouteRule>, default: RateLimitPolicy) -> Self {
        Self { rules, default }
    }

    /// Create a selector with the built-in rules and the given default.
    pub fn with_default(default: RateLimitPolicy) -> Self {
        Self::new(default_rules(), default)
    }

    /// Select the policy for a path. First matching rule wins.
    pub fn select(&self, path: &str) -> SelectedPolicy<'_> {
        let selected = self
            .rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| SelectedPolicy {
                route_class: rule.name.as_str(),
                policy: rule.policy,
            })
            .unwrap_or(SelectedPolicy {
                route_class: DEFAULT_ROUTE_CLASS,
                policy: self.default,
            });

        trace!(
            path = path,
            route_class = selected.route_class,
            limit = selected.policy.limit,
            ttl_ms = selected.policy.ttl_ms,
            "Selected rate limit policy"
        );

        selected
    }

    /// The fallback policy.
    pub fn default_policy(&self) -> RateLimitPolicy {
        self.default
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}
