use chrono::{DateTime, Duration, Utc};
use marquee_catalog::pricing::{apply_bps_floor, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::BookingError;

/// Refund windows measured backwards from the event start.
#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    free_window: Duration,
    partial_window: Duration,
    partial_refund_bps: u32,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            free_window: Duration::days(30),
            partial_window: Duration::days(7),
            partial_refund_bps: 5_000,
        }
    }
}

/// Window boundaries for a single event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationWindows {
    pub free_window_end: DateTime<Utc>,
    pub partial_refund_window_end: DateTime<Utc>,
    pub partial_refund_bps: u32,
    pub no_refund_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundDecision {
    pub eligible: bool,
    pub amount: i64,
    pub percentage_bps: u32,
    pub evaluated_at: DateTime<Utc>,
}

impl CancellationPolicy {
    pub fn new(free_window: Duration, partial_window: Duration, partial_refund_bps: u32) -> Result<Self, BookingError> {
        if partial_window < Duration::zero() || free_window < partial_window {
            return Err(BookingError::Validation(
                "free refund window must start before the partial refund window".to_string(),
            ));
        }
        if partial_refund_bps as i64 > BPS_DENOMINATOR {
            return Err(BookingError::Validation(format!(
                "partial refund rate {} bps exceeds 100%",
                partial_refund_bps
            )));
        }
        Ok(Self { free_window, partial_window, partial_refund_bps })
    }

    pub fn windows(&self, event_start: DateTime<Utc>) -> CancellationWindows {
        let partial_refund_window_end = event_start - self.partial_window;
        CancellationWindows {
            free_window_end: event_start - self.free_window,
            partial_refund_window_end,
            partial_refund_bps: self.partial_refund_bps,
            no_refund_after: partial_refund_window_end,
        }
    }

    /// Refund owed on `total_price` when cancelling at `now`.
    ///
    /// The free window is inclusive of its end instant; the partial window
    /// is exclusive. Amounts round down.
    pub fn evaluate(&self, event_start: DateTime<Utc>, now: DateTime<Utc>, total_price: i64) -> RefundDecision {
        let windows = self.windows(event_start);

        let percentage_bps = if now <= windows.free_window_end {
            BPS_DENOMINATOR as u32
        } else if now < windows.partial_refund_window_end {
            windows.partial_refund_bps
        } else {
            0
        };

        let amount = apply_bps_floor(total_price.max(0), percentage_bps);
        RefundDecision {
            eligible: percentage_bps > 0,
            amount,
            percentage_bps,
            evaluated_at: now,
        }
    }

    /// Full refund regardless of timing, for cancellations the client did not cause
    pub fn full_refund(&self, amount: i64, now: DateTime<Utc>) -> RefundDecision {
        RefundDecision {
            eligible: amount > 0,
            amount: amount.max(0),
            percentage_bps: BPS_DENOMINATOR as u32,
            evaluated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_full_refund_up_to_free_window_end() {
        let policy = CancellationPolicy::default();
        let windows = policy.windows(event());

        let at_boundary = policy.evaluate(event(), windows.free_window_end, 3_250_000);
        assert!(at_boundary.eligible);
        assert_eq!(at_boundary.percentage_bps, 10_000);
        assert_eq!(at_boundary.amount, 3_250_000);
    }

    #[test]
    fn test_partial_refund_rounds_down() {
        let policy = CancellationPolicy::default();
        let decision = policy.evaluate(event(), event() - Duration::days(10), 1_001);
        assert!(decision.eligible);
        assert_eq!(decision.percentage_bps, 5_000);
        assert_eq!(decision.amount, 500);
    }

    #[test]
    fn test_no_refund_after_partial_window() {
        let policy = CancellationPolicy::default();
        let windows = policy.windows(event());

        let at_end = policy.evaluate(event(), windows.partial_refund_window_end, 3_250_000);
        assert!(!at_end.eligible);
        assert_eq!(at_end.amount, 0);

        let after = policy.evaluate(
            event(),
            windows.partial_refund_window_end + Duration::nanoseconds(1),
            3_250_000,
        );
        assert_eq!(after.percentage_bps, 0);

        let just_before = policy.evaluate(
            event(),
            windows.partial_refund_window_end - Duration::seconds(1),
            3_250_000,
        );
        assert_eq!(just_before.amount, 1_625_000);
    }

    #[test]
    fn test_rejects_inverted_windows() {
        assert!(CancellationPolicy::new(Duration::days(3), Duration::days(7), 5_000).is_err());
        assert!(CancellationPolicy::new(Duration::days(30), Duration::days(7), 12_000).is_err());
    }
}
