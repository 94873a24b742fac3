//! The chaos injector
//!
//! Evaluates the active configuration against each request at two points:
//! pre-response (latency, error short-circuit, timeout, connection reset)
//! and during-write (the [`BodyPlan`] consumed by the body transforms).
//! The active configuration sits behind a snapshot swap; stat counters are
//! plain atomics.

use crate::config::{ChaosConfig, ChaosRule, Fault};
use mockd_core::Result;
use parking_lot::RwLock;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pre-response verdict for one request
#[derive(Debug, Clone, Default)]
pub struct PreDecision {
    pub action: PreAction,
    pub body_plan: BodyPlan,
}

/// What happens before the matcher output is rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PreAction {
    /// Continue down the pipeline
    #[default]
    Proceed,
    /// Short-circuit with this status and an empty body
    Error(u16),
    /// Hold the request for the duration, then fail as a gateway timeout
    Timeout(Duration),
    /// Abort the transport abruptly
    Reset,
}

/// Write-phase transform plan
///
/// Transforms compose in truncate -> corrupt -> throttle order so they stay
/// streaming-safe for SSE and large bodies.
#[derive(Debug, Clone, Default)]
pub struct BodyPlan {
    pub empty: bool,
    pub max_bytes: Option<usize>,
    pub corrupt_rate: Option<f64>,
    pub throttle_bps: Option<u64>,
}

impl BodyPlan {
    /// True when the body passes through untouched
    pub fn is_noop(&self) -> bool {
        !self.empty
            && self.max_bytes.is_none()
            && self.corrupt_rate.is_none()
            && self.throttle_bps.is_none()
    }
}

struct CompiledRule {
    rule: ChaosRule,
    /// Glob translation of the pattern
    glob: Option<Regex>,
    /// The pattern compiled verbatim as a regex
    verbatim: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: ChaosRule) -> Self {
        let glob = Regex::new(&glob_to_regex(&rule.path_pattern)).ok();
        let verbatim = Regex::new(&rule.path_pattern).ok();
        Self {
            rule,
            glob,
            verbatim,
        }
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        if !self.rule.methods.is_empty()
            && !self.rule.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            return false;
        }
        self.glob.as_ref().is_some_and(|re| re.is_match(path))
            || self.verbatim.as_ref().is_some_and(|re| re.is_match(path))
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            c if "\\.+?()[]{}|^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

struct Compiled {
    config: ChaosConfig,
    rules: Vec<CompiledRule>,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    injected_faults: AtomicU64,
    latency_injected: AtomicU64,
    by_kind: [(&'static str, AtomicU64); 9],
}

fn new_counters() -> Counters {
    Counters {
        by_kind: [
            ("latency", AtomicU64::new(0)),
            ("error", AtomicU64::new(0)),
            ("timeout", AtomicU64::new(0)),
            ("corrupt_body", AtomicU64::new(0)),
            ("empty_response", AtomicU64::new(0)),
            ("slow_body", AtomicU64::new(0)),
            ("connection_reset", AtomicU64::new(0)),
            ("partial_response", AtomicU64::new(0)),
            ("bandwidth", AtomicU64::new(0)),
        ],
        ..Counters::default()
    }
}

/// Monotonic counter snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosStats {
    pub total_requests: u64,
    pub injected_faults: u64,
    pub latency_injected: u64,
    pub faults_by_type: std::collections::BTreeMap<String, u64>,
}

/// Evaluates chaos rules and imposes faults
pub struct ChaosInjector {
    active: RwLock<Arc<Compiled>>,
    counters: Counters,
}

impl ChaosInjector {
    /// Create an injector from a validated configuration
    pub fn new(config: ChaosConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            active: RwLock::new(Arc::new(compile(config))),
            counters: new_counters(),
        })
    }

    /// Create a disabled injector
    pub fn disabled() -> Self {
        Self {
            active: RwLock::new(Arc::new(compile(ChaosConfig::default()))),
            counters: new_counters(),
        }
    }

    /// Swap the active configuration atomically
    pub fn update_config(&self, config: ChaosConfig) -> Result<()> {
        config.validate()?;
        *self.active.write() = Arc::new(compile(config));
        Ok(())
    }

    /// Clone of the active configuration
    pub fn config(&self) -> ChaosConfig {
        self.active.read().config.clone()
    }

    /// Counter snapshot
    pub fn stats(&self) -> ChaosStats {
        ChaosStats {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            injected_faults: self.counters.injected_faults.load(Ordering::Relaxed),
            latency_injected: self.counters.latency_injected.load(Ordering::Relaxed),
            faults_by_type: self
                .counters
                .by_kind
                .iter()
                .map(|(name, counter)| ((*name).to_string(), counter.load(Ordering::Relaxed)))
                .collect(),
        }
    }

    /// Zero all counters
    pub fn reset_stats(&self) {
        self.counters.total_requests.store(0, Ordering::Relaxed);
        self.counters.injected_faults.store(0, Ordering::Relaxed);
        self.counters.latency_injected.store(0, Ordering::Relaxed);
        for (_, counter) in &self.counters.by_kind {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn record(&self, fault: &Fault) {
        self.counters.injected_faults.fetch_add(1, Ordering::Relaxed);
        let name = fault.kind_name();
        if let Some((_, counter)) = self.counters.by_kind.iter().find(|(n, _)| *n == name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evaluate the pre-response phase, sleeping out any latency faults
    ///
    /// Latency is applied as soon as its fault fires, so an error fault later
    /// in the list short-circuits only after the sleep has elapsed.
    pub async fn apply_pre(&self, method: &str, path: &str) -> PreDecision {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::clone(&self.active.read());
        if !compiled.config.enabled {
            return PreDecision::default();
        }

        let mut decision = PreDecision::default();
        let apply_fault = |fault: &Fault, decision: &mut PreDecision| -> Option<Duration> {
            match fault {
                Fault::Latency { min, max, .. } => {
                    let (lo, hi) = (min.0.min(max.0), min.0.max(max.0));
                    let ms = if lo == hi {
                        lo
                    } else {
                        rand::rng().random_range(lo..=hi)
                    };
                    self.counters.latency_injected.fetch_add(1, Ordering::Relaxed);
                    return Some(Duration::from_millis(ms));
                }
                Fault::Error {
                    default_code,
                    status_codes,
                    ..
                } => {
                    if decision.action == PreAction::Proceed {
                        let code = if status_codes.is_empty() {
                            default_code.unwrap_or(500)
                        } else {
                            status_codes[rand::rng().random_range(0..status_codes.len())]
                        };
                        decision.action = PreAction::Error(code);
                    }
                }
                Fault::Timeout { duration, .. } => {
                    if decision.action == PreAction::Proceed {
                        decision.action = PreAction::Timeout(duration.duration());
                    }
                }
                Fault::ConnectionReset { .. } => {
                    if decision.action == PreAction::Proceed {
                        decision.action = PreAction::Reset;
                    }
                }
                Fault::EmptyResponse { .. } => decision.body_plan.empty = true,
                Fault::PartialResponse { max_bytes, .. } => {
                    decision.body_plan.max_bytes.get_or_insert(*max_bytes);
                }
                Fault::CorruptBody { rate, .. } => {
                    decision.body_plan.corrupt_rate.get_or_insert(*rate);
                }
                Fault::SlowBody { bytes_per_second, .. }
                | Fault::Bandwidth { bytes_per_second, .. } => {
                    let bps = decision
                        .body_plan
                        .throttle_bps
                        .map_or(*bytes_per_second, |prev| prev.min(*bytes_per_second));
                    decision.body_plan.throttle_bps = Some(bps);
                }
            }
            None
        };

        let rule_faults = compiled
            .rules
            .iter()
            .find(|r| r.matches(method, path))
            .filter(|r| bernoulli(r.rule.probability))
            .map(|r| r.rule.faults.0.as_slice())
            .unwrap_or_default();

        for fault in compiled.config.global_rules.0.iter().chain(rule_faults) {
            if !bernoulli(fault.probability()) {
                continue;
            }
            debug!(fault = fault.kind_name(), path = path, "chaos fault fired");
            self.record(fault);
            if let Some(delay) = apply_fault(fault, &mut decision) {
                tokio::time::sleep(delay).await;
            }
        }
        decision
    }
}

fn compile(config: ChaosConfig) -> Compiled {
    let rules = config
        .rules
        .iter()
        .cloned()
        .map(CompiledRule::compile)
        .collect();
    Compiled { config, rules }
}

fn bernoulli(probability: f64) -> bool {
    if probability <= 0.0 {
        false
    } else if probability >= 1.0 {
        true
    } else {
        rand::rng().random_bool(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurationMs, FaultList};

    fn config_with_global(faults: Vec<Fault>) -> ChaosConfig {
        ChaosConfig {
            enabled: true,
            global_rules: FaultList(faults),
            rules: vec![],
        }
    }

    #[tokio::test]
    async fn zero_probability_never_fires() {
        let injector = ChaosInjector::new(config_with_global(vec![Fault::Error {
            probability: 0.0,
            default_code: None,
            status_codes: vec![],
        }]))
        .unwrap();
        for _ in 0..100 {
            let decision = injector.apply_pre("GET", "/api/x").await;
            assert_eq!(decision.action, PreAction::Proceed);
        }
        assert_eq!(injector.stats().injected_faults, 0);
        assert_eq!(injector.stats().total_requests, 100);
    }

    #[tokio::test]
    async fn unit_probability_always_fires() {
        let injector = ChaosInjector::new(config_with_global(vec![Fault::Error {
            probability: 1.0,
            default_code: Some(503),
            status_codes: vec![],
        }]))
        .unwrap();
        for _ in 0..25 {
            let decision = injector.apply_pre("GET", "/api/x").await;
            assert_eq!(decision.action, PreAction::Error(503));
        }
        assert_eq!(injector.stats().injected_faults, 25);
        assert_eq!(injector.stats().faults_by_type["error"], 25);
    }

    #[tokio::test]
    async fn latency_sleeps_within_bounds() {
        let injector = ChaosInjector::new(config_with_global(vec![Fault::Latency {
            min: DurationMs(40),
            max: DurationMs(40),
            probability: 1.0,
        }]))
        .unwrap();
        let start = std::time::Instant::now();
        let decision = injector.apply_pre("GET", "/api/x").await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(decision.action, PreAction::Proceed);
        assert_eq!(injector.stats().latency_injected, 1);
    }

    #[tokio::test]
    async fn rule_gate_blocks_fault_list() {
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![]),
            rules: vec![ChaosRule {
                path_pattern: "/api/*".into(),
                methods: vec![],
                probability: 0.0,
                faults: FaultList(vec![Fault::Error {
                    probability: 1.0,
                    default_code: Some(500),
                    status_codes: vec![],
                }]),
            }],
        };
        let injector = ChaosInjector::new(config).unwrap();
        for _ in 0..50 {
            let decision = injector.apply_pre("GET", "/api/users").await;
            assert_eq!(decision.action, PreAction::Proceed);
        }
    }

    #[tokio::test]
    async fn per_path_rule_scopes_by_method_and_glob() {
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![]),
            rules: vec![ChaosRule {
                path_pattern: "/api/*".into(),
                methods: vec!["POST".into()],
                probability: 1.0,
                faults: FaultList(vec![Fault::EmptyResponse { probability: 1.0 }]),
            }],
        };
        let injector = ChaosInjector::new(config).unwrap();

        let hit = injector.apply_pre("POST", "/api/users").await;
        assert!(hit.body_plan.empty);

        let wrong_method = injector.apply_pre("GET", "/api/users").await;
        assert!(!wrong_method.body_plan.empty);

        let wrong_depth = injector.apply_pre("POST", "/api/users/42").await;
        assert!(!wrong_depth.body_plan.empty);
    }

    #[tokio::test]
    async fn disabled_config_is_inert() {
        let injector = ChaosInjector::disabled();
        let decision = injector.apply_pre("GET", "/x").await;
        assert_eq!(decision.action, PreAction::Proceed);
        assert!(decision.body_plan.is_noop());
        // Requests are still counted for observability.
        assert_eq!(injector.stats().total_requests, 1);
    }

    #[tokio::test]
    async fn update_config_swaps_atomically() {
        let injector = ChaosInjector::disabled();
        injector
            .update_config(config_with_global(vec![Fault::Error {
                probability: 1.0,
                default_code: Some(500),
                status_codes: vec![],
            }]))
            .unwrap();
        let decision = injector.apply_pre("GET", "/x").await;
        assert_eq!(decision.action, PreAction::Error(500));
    }

    #[test]
    fn stats_reset_zeroes_counters() {
        let injector = ChaosInjector::disabled();
        injector.counters.total_requests.fetch_add(5, Ordering::Relaxed);
        injector.reset_stats();
        assert_eq!(injector.stats().total_requests, 0);
    }

    #[test]
    fn invalid_probability_rejected_on_update() {
        let injector = ChaosInjector::disabled();
        let bad = config_with_global(vec![Fault::EmptyResponse { probability: 2.0 }]);
        assert!(injector.update_config(bad).is_err());
    }
}
