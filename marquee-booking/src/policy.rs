use chrono::Duration;
use marquee_catalog::PricingConfig;
use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationPolicy;
use crate::risk::{RiskLevel, RiskScoringEngine, RiskThresholds, SignalCollector, SignalWeights};
use crate::BookingResult;
use crate::lifecycle::BookingStateMachine;

/// Static admission parameters. Integers only: rates are basis points,
/// windows are whole days or hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionPolicy {
    pub currency: String,
    pub deposit_rate_bps: u32,
    pub service_fee_bps: u32,
    pub free_cancellation_days: i64,
    pub partial_refund_days: i64,
    pub partial_refund_bps: u32,
    pub risk_medium_threshold: u32,
    pub risk_high_threshold: u32,
    pub signal_weights: SignalWeights,
    pub rapid_repeat_window_hours: i64,
    pub known_client_domains: Vec<String>,
    pub review_eta_medium_hours: i64,
    pub review_eta_high_hours: i64,
    pub alternative_slot_count: usize,
    pub alternative_slot_step_minutes: i64,
    pub alternative_slot_horizon_days: i64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            deposit_rate_bps: 5_000,
            service_fee_bps: 500,
            free_cancellation_days: 30,
            partial_refund_days: 7,
            partial_refund_bps: 5_000,
            risk_medium_threshold: 30,
            risk_high_threshold: 70,
            signal_weights: SignalWeights::default(),
            rapid_repeat_window_hours: 24,
            known_client_domains: Vec::new(),
            review_eta_medium_hours: 24,
            review_eta_high_hours: 48,
            alternative_slot_count: 3,
            alternative_slot_step_minutes: 30,
            alternative_slot_horizon_days: 14,
        }
    }
}

impl AdmissionPolicy {
    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            service_fee_bps: self.service_fee_bps,
            deposit_rate_bps: self.deposit_rate_bps,
            currency: self.currency.clone(),
        }
    }

    pub fn cancellation_policy(&self) -> BookingResult<CancellationPolicy> {
        CancellationPolicy::new(
            Duration::days(self.free_cancellation_days),
            Duration::days(self.partial_refund_days),
            self.partial_refund_bps,
        )
    }

    pub fn risk_engine(&self) -> BookingResult<RiskScoringEngine> {
        RiskScoringEngine::new(RiskThresholds {
            medium: self.risk_medium_threshold,
            high: self.risk_high_threshold,
        })
    }

    pub fn signal_collector(&self) -> BookingResult<SignalCollector> {
        SignalCollector::new(self.signal_weights.clone(), self.known_client_domains.iter().cloned())
    }

    pub fn state_machine(&self) -> BookingResult<BookingStateMachine> {
        Ok(BookingStateMachine::new(self.risk_engine()?, self.cancellation_policy()?))
    }

    /// Expected wait before a reviewer picks up a routed booking
    pub fn review_eta(&self, level: RiskLevel) -> Option<Duration> {
        match level {
            RiskLevel::Low => None,
            RiskLevel::Medium => Some(Duration::hours(self.review_eta_medium_hours)),
            RiskLevel::High => Some(Duration::hours(self.review_eta_high_hours)),
        }
    }

    pub fn rapid_repeat_window(&self) -> Duration {
        Duration::hours(self.rapid_repeat_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let policy: AdmissionPolicy = serde_json::from_str(r#"{ "partial_refund_bps": 2500 }"#).unwrap();
        assert_eq!(policy.partial_refund_bps, 2_500);
        assert_eq!(policy.deposit_rate_bps, 5_000);
        assert_eq!(policy.review_eta(RiskLevel::High), Some(Duration::hours(48)));
        assert!(policy.state_machine().is_ok());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let policy = AdmissionPolicy {
            risk_medium_threshold: 80,
            ..AdmissionPolicy::default()
        };
        assert!(policy.risk_engine().is_err());
    }
}
