//! Risk scoring and the review workflow that gates admission.
//!
//! Signals are aggregated into a 0-100 score, the score maps to a level, and
//! the level decides once per assessment whether a human must review the
//! booking and whether it is auto-blocked until they do.

use chrono::{DateTime, Utc};
use marquee_catalog::Celebrity;
use marquee_core::Actor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::Booking;
use crate::BookingError;

pub const MAX_RISK_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(BookingError::Storage(format!("unknown risk level {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    BudgetAboveRange,
    NewClientDomain,
    RapidRepeatBooking,
    TierBudgetMismatch,
    Custom(String),
}

/// One weighted observation about a booking request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskSignal {
    pub signal_type: SignalType,
    pub severity: Severity,
    pub weight: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskFactor {
    pub signal_type: SignalType,
    pub severity: Severity,
    pub description: String,
}

// ============================================================================
// Review workflow
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Escalated,
}

/// Reviewer action on an assessment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    UnderReview,
    Approved,
    Rejected,
    Escalated,
}

impl ReviewDecision {
    pub const ALL: [ReviewDecision; 4] = [
        ReviewDecision::UnderReview,
        ReviewDecision::Approved,
        ReviewDecision::Rejected,
        ReviewDecision::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::UnderReview => "under_review",
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
            ReviewDecision::Escalated => "escalated",
        }
    }
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::UnderReview => "UNDER_REVIEW",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::Escalated => "ESCALATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected | ReviewStatus::Escalated)
    }

    /// Review transition table
    pub fn after(self, decision: ReviewDecision) -> Option<ReviewStatus> {
        match self {
            ReviewStatus::Pending => Some(match decision {
                ReviewDecision::UnderReview => ReviewStatus::UnderReview,
                ReviewDecision::Approved => ReviewStatus::Approved,
                ReviewDecision::Rejected => ReviewStatus::Rejected,
                ReviewDecision::Escalated => ReviewStatus::Escalated,
            }),
            ReviewStatus::UnderReview => match decision {
                ReviewDecision::UnderReview => None,
                ReviewDecision::Approved => Some(ReviewStatus::Approved),
                ReviewDecision::Rejected => Some(ReviewStatus::Rejected),
                ReviewDecision::Escalated => Some(ReviewStatus::Escalated),
            },
            ReviewStatus::Approved | ReviewStatus::Rejected | ReviewStatus::Escalated => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReviewStatus::Pending),
            "UNDER_REVIEW" => Ok(ReviewStatus::UnderReview),
            "APPROVED" => Ok(ReviewStatus::Approved),
            "REJECTED" => Ok(ReviewStatus::Rejected),
            "ESCALATED" => Ok(ReviewStatus::Escalated),
            other => Err(BookingError::Storage(format!("unknown review status {}", other))),
        }
    }
}

/// Risk verdict for one booking.
///
/// Never re-scored in place: a new assessment supersedes the old one. Only a
/// reviewer action mutates an existing assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub requires_review: bool,
    pub auto_block: bool,
    pub review_status: ReviewStatus,
    pub reviewer_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl RiskAssessment {
    pub fn is_current(&self) -> bool {
        self.superseded_at.is_none()
    }

    /// Apply a reviewer decision, stamping the reviewer and their notes
    pub fn apply_review(
        &mut self,
        decision: ReviewDecision,
        reviewer: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReviewStatus, BookingError> {
        if self.review_status.is_terminal() || !self.is_current() {
            return Err(BookingError::AlreadyResolved(self.review_status.as_str().to_string()));
        }

        let next = self.review_status.after(decision).ok_or_else(|| BookingError::InvalidTransition {
            current: self.review_status.as_str().to_string(),
            action: decision.as_str().to_string(),
            allowed: ReviewDecision::ALL
                .iter()
                .filter(|d| self.review_status.after(**d).is_some())
                .map(|d| d.as_str().to_string())
                .collect(),
        })?;

        self.review_status = next;
        if notes.is_some() {
            self.reviewer_notes = notes;
        }
        self.reviewed_by = Some(reviewer.id.clone());
        self.reviewed_at = Some(now);
        Ok(next)
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Scores at or above this are MEDIUM
    pub medium: u32,
    /// Scores at or above this are HIGH
    pub high: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { medium: 30, high: 70 }
    }
}

/// Stateless weighted-sum scorer
#[derive(Debug, Clone, Default)]
pub struct RiskScoringEngine {
    thresholds: RiskThresholds,
}

impl RiskScoringEngine {
    pub fn new(thresholds: RiskThresholds) -> Result<Self, BookingError> {
        if thresholds.medium == 0 || thresholds.medium >= thresholds.high || thresholds.high > MAX_RISK_SCORE {
            return Err(BookingError::Validation(format!(
                "risk thresholds must satisfy 0 < medium < high <= {}",
                MAX_RISK_SCORE
            )));
        }
        Ok(Self { thresholds })
    }

    pub fn score(&self, signals: &[RiskSignal]) -> u32 {
        signals
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.weight))
            .min(MAX_RISK_SCORE)
    }

    pub fn level_for(&self, score: u32) -> RiskLevel {
        if score >= self.thresholds.high {
            RiskLevel::High
        } else if score >= self.thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Score the signals and apply the admission gate for the resulting level
    pub fn assess(&self, booking: &Booking, signals: &[RiskSignal], now: DateTime<Utc>) -> RiskAssessment {
        let risk_score = self.score(signals);
        let risk_level = self.level_for(risk_score);

        let (requires_review, auto_block, review_status) = match risk_level {
            RiskLevel::Low => (false, false, ReviewStatus::Approved),
            RiskLevel::Medium => (true, false, ReviewStatus::Pending),
            RiskLevel::High => (true, true, ReviewStatus::Pending),
        };

        RiskAssessment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            risk_score,
            risk_level,
            risk_factors: signals
                .iter()
                .map(|s| RiskFactor {
                    signal_type: s.signal_type.clone(),
                    severity: s.severity,
                    description: s.description.clone(),
                })
                .collect(),
            requires_review,
            auto_block,
            review_status,
            reviewer_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            superseded_at: None,
            version: 0,
        }
    }
}

// ============================================================================
// Signal derivation
// ============================================================================

/// Weight per severity for one signal type. Non-decreasing in severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityWeights {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl SeverityWeights {
    pub const fn new(low: u32, medium: u32, high: u32) -> Self {
        Self { low, medium, high }
    }

    pub fn for_severity(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }

    fn is_monotonic(&self) -> bool {
        self.low <= self.medium && self.medium <= self.high
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    pub budget_above_range: SeverityWeights,
    pub new_client_domain: SeverityWeights,
    pub rapid_repeat_booking: SeverityWeights,
    pub tier_budget_mismatch: SeverityWeights,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            budget_above_range: SeverityWeights::new(10, 20, 30),
            new_client_domain: SeverityWeights::new(5, 15, 25),
            rapid_repeat_booking: SeverityWeights::new(10, 20, 30),
            tier_budget_mismatch: SeverityWeights::new(10, 15, 20),
        }
    }
}

impl SignalWeights {
    pub fn validate(&self) -> Result<(), BookingError> {
        let all = [
            ("budget_above_range", &self.budget_above_range),
            ("new_client_domain", &self.new_client_domain),
            ("rapid_repeat_booking", &self.rapid_repeat_booking),
            ("tier_budget_mismatch", &self.tier_budget_mismatch),
        ];
        for (name, weights) in all {
            if !weights.is_monotonic() {
                return Err(BookingError::Validation(format!(
                    "signal weights for {} must not decrease with severity",
                    name
                )));
            }
        }
        Ok(())
    }

    fn table(&self, signal_type: &SignalType) -> Option<&SeverityWeights> {
        match signal_type {
            SignalType::BudgetAboveRange => Some(&self.budget_above_range),
            SignalType::NewClientDomain => Some(&self.new_client_domain),
            SignalType::RapidRepeatBooking => Some(&self.rapid_repeat_booking),
            SignalType::TierBudgetMismatch => Some(&self.tier_budget_mismatch),
            SignalType::Custom(_) => None,
        }
    }

    /// Build a reference signal with the weight its severity carries
    pub fn signal(&self, signal_type: SignalType, severity: Severity, description: String) -> RiskSignal {
        let weight = self
            .table(&signal_type)
            .map(|w| w.for_severity(severity))
            .unwrap_or(0);
        RiskSignal { signal_type, severity, weight, description }
    }
}

/// Facts about a request gathered before scoring
#[derive(Debug, Clone)]
pub struct SignalContext<'a> {
    pub booking: &'a Booking,
    pub celebrity: &'a Celebrity,
    /// Other bookings from the same contact within the rapid-repeat window
    pub recent_bookings_from_contact: u32,
    /// Whether an earlier booking came from the same email domain
    pub domain_seen_before: bool,
}

/// Derives the reference signal set from a booking request
#[derive(Debug, Clone, Default)]
pub struct SignalCollector {
    weights: SignalWeights,
    known_domains: HashSet<String>,
}

impl SignalCollector {
    pub fn new(weights: SignalWeights, known_domains: impl IntoIterator<Item = String>) -> Result<Self, BookingError> {
        weights.validate()?;
        Ok(Self {
            weights,
            known_domains: known_domains.into_iter().map(|d| d.to_ascii_lowercase()).collect(),
        })
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    pub fn collect(&self, ctx: &SignalContext<'_>) -> Vec<RiskSignal> {
        let mut signals = Vec::new();
        let booking = ctx.booking;

        if let Some(budget) = booking.stated_budget {
            let typical_max = ctx.celebrity.typical_fee_max as i128;
            let budget = budget as i128;
            if typical_max > 0 && budget > typical_max {
                let severity = if budget >= typical_max * 2 {
                    Severity::High
                } else if budget * 2 >= typical_max * 3 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                signals.push(self.weights.signal(
                    SignalType::BudgetAboveRange,
                    severity,
                    format!("stated budget is above {}'s typical fee range", ctx.celebrity.name),
                ));
            }

            let total = booking.pricing.total_price as i128;
            if budget < total {
                let severity = if budget * 2 < total { Severity::Medium } else { Severity::Low };
                signals.push(self.weights.signal(
                    SignalType::TierBudgetMismatch,
                    severity,
                    "stated budget is below the quoted service tier".to_string(),
                ));
            }
        }

        if let Some(domain) = booking.client.email.email_domain() {
            if !self.known_domains.contains(&domain) && !ctx.domain_seen_before {
                signals.push(self.weights.signal(
                    SignalType::NewClientDomain,
                    Severity::Medium,
                    format!("first booking from domain {}", domain),
                ));
            }
        }

        if ctx.recent_bookings_from_contact > 0 {
            let severity = if ctx.recent_bookings_from_contact >= 3 { Severity::High } else { Severity::Medium };
            signals.push(self.weights.signal(
                SignalType::RapidRepeatBooking,
                severity,
                format!("{} other booking(s) from this contact recently", ctx.recent_bookings_from_contact),
            ));
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientContact, CreateBookingRequest};
    use chrono::Duration;
    use marquee_catalog::{PricingBreakdown, QuoteSelection, SecurityTier, TravelTier};
    use marquee_core::Role;
    use marquee_shared::Masked;

    fn booking(budget: Option<i64>, email: &str) -> Booking {
        let now = Utc::now();
        let request = CreateBookingRequest {
            celebrity_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            event_start: now + Duration::days(40),
            event_duration_minutes: Some(60),
            client: ClientContact {
                name: "Sam Doe".to_string(),
                email: Masked::new(email.to_string()),
                phone: None,
            },
            selection: QuoteSelection {
                add_on_ids: vec![],
                travel_tier: TravelTier::Local,
                security_tier: SecurityTier::Standard,
            },
            stated_budget: budget,
            terms_accepted: true,
        };
        let pricing = PricingBreakdown::from_components(2_000_000, 0, 0, 0, 0, 5_000, "USD").unwrap();
        Booking::draft("client-1".to_string(), request, 60, pricing, now)
    }

    fn celebrity() -> Celebrity {
        Celebrity {
            id: Uuid::new_v4(),
            name: "Ava Stone".to_string(),
            typical_fee_min: 1_000_000,
            typical_fee_max: 3_000_000,
            deposit_rate_bps: None,
        }
    }

    fn signal(weight: u32) -> RiskSignal {
        RiskSignal {
            signal_type: SignalType::Custom("test".to_string()),
            severity: Severity::Medium,
            weight,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_thresholds_map_to_levels() {
        let engine = RiskScoringEngine::default();
        assert_eq!(engine.level_for(0), RiskLevel::Low);
        assert_eq!(engine.level_for(29), RiskLevel::Low);
        assert_eq!(engine.level_for(30), RiskLevel::Medium);
        assert_eq!(engine.level_for(69), RiskLevel::Medium);
        assert_eq!(engine.level_for(70), RiskLevel::High);
        assert_eq!(engine.level_for(100), RiskLevel::High);
    }

    #[test]
    fn test_reference_medium_assessment() {
        let engine = RiskScoringEngine::default();
        let b = booking(None, "a@b.example");
        let assessment = engine.assess(&b, &[signal(30), signal(15), signal(20)], Utc::now());

        assert_eq!(assessment.risk_score, 65);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert!(assessment.requires_review);
        assert!(!assessment.auto_block);
        assert_eq!(assessment.review_status, ReviewStatus::Pending);
        assert_eq!(assessment.risk_factors.len(), 3);
    }

    #[test]
    fn test_low_is_auto_approved_and_high_blocks() {
        let engine = RiskScoringEngine::default();
        let b = booking(None, "a@b.example");

        let low = engine.assess(&b, &[signal(10)], Utc::now());
        assert_eq!(low.review_status, ReviewStatus::Approved);
        assert!(!low.requires_review);

        let high = engine.assess(&b, &[signal(60), signal(60)], Utc::now());
        assert_eq!(high.risk_score, 100);
        assert!(high.auto_block);
        assert_eq!(high.review_status, ReviewStatus::Pending);
    }

    #[test]
    fn test_escalating_severity_never_lowers_score() {
        let weights = SignalWeights::default();
        let engine = RiskScoringEngine::default();
        let types = [
            SignalType::BudgetAboveRange,
            SignalType::NewClientDomain,
            SignalType::RapidRepeatBooking,
            SignalType::TierBudgetMismatch,
        ];
        let severities = [Severity::Low, Severity::Medium, Severity::High];

        for escalated in 0..types.len() {
            let mut last = 0;
            for severity in severities {
                let signals: Vec<RiskSignal> = types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        let s = if i == escalated { severity } else { Severity::Medium };
                        weights.signal(t.clone(), s, String::new())
                    })
                    .collect();
                let score = engine.score(&signals);
                assert!(score >= last);
                last = score;
            }
        }
    }

    #[test]
    fn test_non_monotonic_weights_rejected() {
        let mut weights = SignalWeights::default();
        weights.new_client_domain = SeverityWeights::new(20, 10, 30);
        assert!(weights.validate().is_err());
        assert!(RiskScoringEngine::new(RiskThresholds { medium: 70, high: 30 }).is_err());
    }

    #[test]
    fn test_collector_reference_signals() {
        let collector = SignalCollector::new(SignalWeights::default(), vec![]).unwrap();
        let celeb = celebrity();
        let b = booking(Some(7_000_000), "buyer@fresh.example");
        let ctx = SignalContext {
            booking: &b,
            celebrity: &celeb,
            recent_bookings_from_contact: 1,
            domain_seen_before: false,
        };

        let signals = collector.collect(&ctx);
        let score = RiskScoringEngine::default().score(&signals);

        // +30 budget, +15 new domain, +20 rapid repeat
        assert_eq!(signals.len(), 3);
        assert_eq!(score, 65);
    }

    #[test]
    fn test_collector_quiet_for_known_client() {
        let collector = SignalCollector::new(SignalWeights::default(), vec!["agency.example".to_string()]).unwrap();
        let celeb = celebrity();
        let b = booking(Some(2_500_000), "booker@Agency.example");
        let ctx = SignalContext {
            booking: &b,
            celebrity: &celeb,
            recent_bookings_from_contact: 0,
            domain_seen_before: false,
        };

        assert!(collector.collect(&ctx).is_empty());
    }

    #[test]
    fn test_budget_below_quote_is_tier_mismatch() {
        let collector = SignalCollector::new(SignalWeights::default(), vec![]).unwrap();
        let celeb = celebrity();
        let b = booking(Some(900_000), "x@y.example");
        let ctx = SignalContext {
            booking: &b,
            celebrity: &celeb,
            recent_bookings_from_contact: 0,
            domain_seen_before: true,
        };

        let signals = collector.collect(&ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::TierBudgetMismatch);
        assert_eq!(signals[0].severity, Severity::Medium);
        assert_eq!(signals[0].weight, 15);
    }

    #[test]
    fn test_review_transitions() {
        let engine = RiskScoringEngine::default();
        let b = booking(None, "a@b.example");
        let reviewer = Actor::new("rev-7", Role::Reviewer);
        let mut assessment = engine.assess(&b, &[signal(40)], Utc::now());

        let status = assessment
            .apply_review(ReviewDecision::UnderReview, &reviewer, None, Utc::now())
            .unwrap();
        assert_eq!(status, ReviewStatus::UnderReview);

        let repeat = assessment.apply_review(ReviewDecision::UnderReview, &reviewer, None, Utc::now());
        assert!(matches!(repeat, Err(BookingError::InvalidTransition { .. })));

        assessment
            .apply_review(ReviewDecision::Approved, &reviewer, Some("verified agency".to_string()), Utc::now())
            .unwrap();
        assert_eq!(assessment.reviewed_by.as_deref(), Some("rev-7"));
        assert_eq!(assessment.reviewer_notes.as_deref(), Some("verified agency"));

        let after_terminal = assessment.apply_review(ReviewDecision::Rejected, &reviewer, None, Utc::now());
        assert!(matches!(after_terminal, Err(BookingError::AlreadyResolved(_))));
    }
}
