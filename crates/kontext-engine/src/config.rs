//! Layered configuration for the façade (ambient addition, SPEC_FULL.md §7):
//! defaults → optional file → `KONTEXT_`-prefixed environment variables,
//! via the `config` crate, the way `attest-rs` layers its own settings.
//!
//! This is deliberately a thin typed shell over the sub-crates' own config
//! structs (`kontext_compliance::VerifierConfig`, `kontext_rules::AnomalyConfig`,
//! `kontext_store::StoreLimits`) rather than a parallel copy of their
//! fields — `into_*` conversions do the mapping once, at wiring time.

use std::collections::HashSet;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use kontext_compliance::VerifierConfig;
use kontext_core::Severity;
use kontext_rules::{AnomalyConfig, ApprovalPolicy};
use kontext_store::StoreLimits;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub max_events: usize,
    pub max_anomalies: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let limits = StoreLimits::default();
        Self { max_events: limits.max_events, max_anomalies: limits.max_anomalies }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Decimal-string amount threshold; absent means "no threshold configured".
    pub amount_threshold: Option<String>,
    pub anomaly_window_seconds: i64,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self { amount_threshold: None, anomaly_window_seconds: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    pub max_amount: String,
    pub max_frequency_per_hour: usize,
    pub off_hours: Vec<u32>,
    pub min_interval_seconds: i64,
    pub structuring_threshold: String,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        let defaults = AnomalyConfig::default();
        Self {
            max_amount: defaults.max_amount.to_string(),
            max_frequency_per_hour: defaults.max_frequency_per_hour,
            off_hours: defaults.off_hours.into_iter().collect(),
            min_interval_seconds: defaults.min_interval_seconds,
            structuring_threshold: defaults.structuring_threshold.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub ttl_seconds: i64,
    pub amount_threshold: Option<String>,
    pub low_trust_min_score: Option<u8>,
    pub anomaly_min_severity: Option<Severity>,
    pub new_destination: bool,
    pub manual: bool,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            amount_threshold: None,
            low_trust_min_score: None,
            anomaly_min_severity: None,
            new_destination: false,
            manual: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KontextConfig {
    pub store: StoreSettings,
    pub verifier: VerifierSettings,
    pub anomaly: AnomalySettings,
    pub approval: ApprovalSettings,
}

impl KontextConfig {
    /// Load defaults, then an optional config file at `path` (if present),
    /// then `KONTEXT_`-prefixed environment variables (double-underscore
    /// separated, e.g. `KONTEXT_STORE__MAX_EVENTS`), each layer overriding
    /// the last.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&KontextConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("KONTEXT").separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits { max_events: self.store.max_events, max_anomalies: self.store.max_anomalies }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            amount_threshold: self
                .verifier
                .amount_threshold
                .as_deref()
                .and_then(|s| s.parse::<Decimal>().ok()),
            anomaly_window: chrono::Duration::seconds(self.verifier.anomaly_window_seconds),
        }
    }

    pub fn anomaly_config(&self) -> AnomalyConfig {
        AnomalyConfig {
            max_amount: self.anomaly.max_amount.parse().unwrap_or_else(|_| Decimal::from(10_000)),
            max_frequency_per_hour: self.anomaly.max_frequency_per_hour,
            off_hours: self.anomaly.off_hours.iter().copied().collect::<HashSet<u32>>(),
            min_interval_seconds: self.anomaly.min_interval_seconds,
            structuring_threshold: self
                .anomaly
                .structuring_threshold
                .parse()
                .unwrap_or_else(|_| Decimal::from(1_000)),
        }
    }

    /// Build the enabled approval policy list plus the TTL every approval
    /// request it creates inherits (spec.md §4.8).
    pub fn approval_policies(&self) -> (Vec<ApprovalPolicy>, chrono::Duration) {
        let mut policies = Vec::new();
        if let Some(threshold) = self.approval.amount_threshold.as_deref().and_then(|s| s.parse::<Decimal>().ok()) {
            policies.push(ApprovalPolicy::AmountThreshold { threshold });
        }
        if let Some(min_score) = self.approval.low_trust_min_score {
            policies.push(ApprovalPolicy::LowTrustScore { min_score });
        }
        if let Some(min_severity) = self.approval.anomaly_min_severity {
            policies.push(ApprovalPolicy::AnomalyDetected { min_severity });
        }
        if self.approval.new_destination {
            policies.push(ApprovalPolicy::NewDestination);
        }
        if self.approval.manual {
            policies.push(ApprovalPolicy::Manual);
        }
        (policies, chrono::Duration::seconds(self.approval.ttl_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file_or_env() {
        let config = KontextConfig::load(None).unwrap();
        assert_eq!(config.store.max_events, 10_000);
        assert!(config.verifier.amount_threshold.is_none());
    }

    #[test]
    fn env_override_takes_precedence_over_defaults() {
        std::env::set_var("KONTEXT_STORE__MAX_EVENTS", "42");
        let config = KontextConfig::load(None).unwrap();
        assert_eq!(config.store.max_events, 42);
        std::env::remove_var("KONTEXT_STORE__MAX_EVENTS");
    }

    #[test]
    fn anomaly_config_round_trips_decimal_fields() {
        let config = KontextConfig::default();
        let anomaly = config.anomaly_config();
        assert_eq!(anomaly.max_amount, AnomalyConfig::default().max_amount);
    }

    #[test]
    fn approval_policies_includes_anomaly_and_new_destination_when_enabled() {
        let mut config = KontextConfig::default();
        config.approval.anomaly_min_severity = Some(Severity::High);
        config.approval.new_destination = true;
        let (policies, _) = config.approval_policies();
        assert!(matches!(policies[0], ApprovalPolicy::AnomalyDetected { min_severity: Severity::High }));
        assert!(matches!(policies[1], ApprovalPolicy::NewDestination));
    }

    #[test]
    fn approval_policies_is_empty_by_default() {
        let config = KontextConfig::default();
        let (policies, _) = config.approval_policies();
        assert!(policies.is_empty());
    }
}
