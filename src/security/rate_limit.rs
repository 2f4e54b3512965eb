//! Per-address, per-endpoint rate limiting.
//!
//! Fixed windows with lazy reset: a counter starts on the first request of a
//! key and is restarted by the first request arriving after its window has
//! elapsed. Bursts straddling a window boundary may reach twice the nominal
//! rate.
//!
//! Counters live in a sharded concurrent map. The entry guard holds the
//! shard lock for the whole check-and-increment, so decisions for one key
//! are linearizable while unrelated keys proceed in parallel.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::schema::{RateLimitRuleConfig, DEFAULT_RULE_PATTERN};

/// Errors building a rule set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("no `default` rate limit rule configured")]
    MissingDefault,

    #[error("rule `{0}` allows zero requests")]
    ZeroLimit(String),

    #[error("rule `{0}` has a zero-length window")]
    ZeroWindow(String),

    #[error("rule pattern `{0}` is configured more than once")]
    DuplicatePattern(String),
}

/// An immutable rate limit rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub endpoint_pattern: String,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(endpoint_pattern: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            endpoint_pattern: endpoint_pattern.into(),
            max_requests,
            window,
        }
    }

    fn is_default(&self) -> bool {
        self.endpoint_pattern.eq_ignore_ascii_case(DEFAULT_RULE_PATTERN)
    }
}

impl From<&RateLimitRuleConfig> for RateLimitRule {
    fn from(cfg: &RateLimitRuleConfig) -> Self {
        Self::new(cfg.endpoint_pattern.clone(), cfg.max_requests, cfg.window())
    }
}

/// Validated rules with longest-prefix resolution.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Non-default rules with normalized patterns, longest first.
    prefixed: Vec<(String, RateLimitRule)>,
    default: RateLimitRule,
}

impl RuleSet {
    pub fn new(rules: Vec<RateLimitRule>) -> Result<Self, RuleSetError> {
        let mut default = None;
        let mut prefixed: Vec<(String, RateLimitRule)> = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.max_requests == 0 {
                return Err(RuleSetError::ZeroLimit(rule.endpoint_pattern));
            }
            if rule.window.is_zero() {
                return Err(RuleSetError::ZeroWindow(rule.endpoint_pattern));
            }

            if rule.is_default() {
                if default.is_some() {
                    return Err(RuleSetError::DuplicatePattern(rule.endpoint_pattern));
                }
                default = Some(rule);
                continue;
            }

            let normalized = normalize_pattern(&rule.endpoint_pattern);
            if prefixed.iter().any(|(p, _)| *p == normalized) {
                return Err(RuleSetError::DuplicatePattern(rule.endpoint_pattern));
            }
            prefixed.push((normalized, rule));
        }

        let default = default.ok_or(RuleSetError::MissingDefault)?;
        prefixed.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self { prefixed, default })
    }

    pub fn from_config(rules: &[RateLimitRuleConfig]) -> Result<Self, RuleSetError> {
        Self::new(rules.iter().map(RateLimitRule::from).collect())
    }

    /// The rule governing `endpoint`; never fails thanks to the default.
    pub fn resolve(&self, endpoint: &str) -> &RateLimitRule {
        let path = endpoint.to_ascii_lowercase();
        self.prefixed
            .iter()
            .find(|(pattern, _)| segment_prefix_match(pattern, &path))
            .map(|(_, rule)| rule)
            .unwrap_or(&self.default)
    }

    /// Number of rules, counting the `default` fallback.
    pub fn len(&self) -> usize {
        self.prefixed.len() + 1
    }

    /// Always false: construction rejects a set without the `default` rule.
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn normalize_pattern(pattern: &str) -> String {
    let lowered = pattern.to_ascii_lowercase();
    let trimmed = lowered.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `/api/auth` matches `/api/auth` and `/api/auth/login`, not `/api/authx`.
fn segment_prefix_match(pattern: &str, path: &str) -> bool {
    if pattern == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// What a counter is scoped to besides the address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared by every endpoint resolving to this rule pattern.
    Rule(String),
    /// An explicit-limit check on one literal endpoint.
    Endpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub address: IpAddr,
    pub scope: Scope,
}

/// Live window state for one key.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitCounter {
    pub window_start: Instant,
    pub count: u32,
    pub window: Duration,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Fixed-window limiter keyed by (address, scope).
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    counters: DashMap<CounterKey, RateLimitCounter>,
    rules: ArcSwap<RuleSet>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(rules: RuleSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            rules: ArcSwap::from_pointee(rules),
            clock,
        }
    }

    /// Consume one request against the rule matching `endpoint`.
    pub fn check_and_consume(&self, address: IpAddr, endpoint: &str) -> RateDecision {
        let rules = self.rules.load();
        let rule = rules.resolve(endpoint);
        let key = CounterKey {
            address,
            scope: Scope::Rule(rule.endpoint_pattern.to_ascii_lowercase()),
        };
        self.consume(key, rule.max_requests, rule.window)
    }

    /// Consume one request against an explicit limit for a literal endpoint.
    pub fn check_with_limit(
        &self,
        address: IpAddr,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, RuleSetError> {
        if max_requests == 0 {
            return Err(RuleSetError::ZeroLimit(endpoint.to_string()));
        }
        if window.is_zero() {
            return Err(RuleSetError::ZeroWindow(endpoint.to_string()));
        }
        let key = CounterKey {
            address,
            scope: Scope::Endpoint(endpoint.to_string()),
        };
        Ok(self.consume(key, max_requests, window))
    }

    fn consume(&self, key: CounterKey, max_requests: u32, window: Duration) -> RateDecision {
        let now = self.clock.instant();

        match self.counters.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitCounter {
                    window_start: now,
                    count: 1,
                    window,
                });
                RateDecision::Allowed {
                    remaining: max_requests - 1,
                }
            }
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                let elapsed = now.saturating_duration_since(counter.window_start);

                if elapsed >= window {
                    *counter = RateLimitCounter {
                        window_start: now,
                        count: 1,
                        window,
                    };
                    return RateDecision::Allowed {
                        remaining: max_requests - 1,
                    };
                }

                counter.count = counter.count.saturating_add(1);
                counter.window = window;
                if counter.count > max_requests {
                    RateDecision::Denied {
                        retry_after: window - elapsed,
                    }
                } else {
                    RateDecision::Allowed {
                        remaining: max_requests - counter.count,
                    }
                }
            }
        }
    }

    /// Clear counters of `address`; one endpoint's counters, or all of them.
    ///
    /// Returns how many counters were removed.
    pub fn reset(&self, address: IpAddr, endpoint: Option<&str>) -> usize {
        let before = self.counters.len();
        match endpoint {
            Some(endpoint) => {
                let rules = self.rules.load();
                let rule_scope = Scope::Rule(rules.resolve(endpoint).endpoint_pattern.to_ascii_lowercase());
                let literal_scope = Scope::Endpoint(endpoint.to_string());
                self.counters.retain(|key, _| {
                    !(key.address == address
                        && (key.scope == rule_scope || key.scope == literal_scope))
                });
            }
            None => self.counters.retain(|key, _| key.address != address),
        }
        before.saturating_sub(self.counters.len())
    }

    /// Drop counters whose window has fully elapsed.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.instant();
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now.saturating_duration_since(counter.window_start) < counter.window);
        before.saturating_sub(self.counters.len())
    }

    /// Swap the rule set; existing counters keep their state.
    pub fn replace_rules(&self, rules: RuleSet) {
        self.rules.store(Arc::new(rules));
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }
}
