use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::service::{Celebrity, SecurityTier, ServiceEntry, TierTables, TravelTier};

/// Rates are expressed in basis points: 10_000 bps == 100%.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// `amount × bps / 10_000`, rounded half up
pub fn apply_bps_half_up(amount: i64, bps: u32) -> i64 {
    let scaled = amount as i128 * bps as i128;
    ((scaled + (BPS_DENOMINATOR as i128 / 2)) / BPS_DENOMINATOR as i128) as i64
}

/// `amount × bps / 10_000`, rounded down
pub fn apply_bps_floor(amount: i64, bps: u32) -> i64 {
    let scaled = amount as i128 * bps as i128;
    (scaled / BPS_DENOMINATOR as i128) as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Service fee on (base price + add-ons)
    pub service_fee_bps: u32,

    /// Global deposit rate, unless the celebrity overrides it
    pub deposit_rate_bps: u32,

    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            service_fee_bps: 500,
            deposit_rate_bps: 5_000,
            currency: "USD".to_string(),
        }
    }
}

/// What the client picked on top of the catalog service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSelection {
    #[serde(default)]
    pub add_on_ids: Vec<Uuid>,
    pub travel_tier: TravelTier,
    pub security_tier: SecurityTier,
}

/// Fee breakdown in integer minor units.
///
/// `total_price` is the exact sum of the five components and
/// `deposit + balance == total_price`; rounding is absorbed by the balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingBreakdown {
    pub base_price: i64,
    pub additional_services_total: i64,
    pub travel_expenses: i64,
    pub security_fees: i64,
    pub service_fee: i64,
    pub total_price: i64,
    pub deposit_rate_bps: u32,
    pub deposit: i64,
    pub balance: i64,
    pub currency: String,
}

impl PricingBreakdown {
    pub fn from_components(
        base_price: i64,
        additional_services_total: i64,
        travel_expenses: i64,
        security_fees: i64,
        service_fee: i64,
        deposit_rate_bps: u32,
        currency: impl Into<String>,
    ) -> Result<Self, PricingError> {
        for (name, value) in [
            ("base_price", base_price),
            ("additional_services_total", additional_services_total),
            ("travel_expenses", travel_expenses),
            ("security_fees", security_fees),
            ("service_fee", service_fee),
        ] {
            if value < 0 {
                return Err(PricingError::NegativeAmount(name));
            }
        }
        if deposit_rate_bps as i64 > BPS_DENOMINATOR {
            return Err(PricingError::InvalidRate(deposit_rate_bps));
        }

        let total_price = base_price
            .checked_add(additional_services_total)
            .and_then(|t| t.checked_add(travel_expenses))
            .and_then(|t| t.checked_add(security_fees))
            .and_then(|t| t.checked_add(service_fee))
            .ok_or(PricingError::Overflow)?;

        let mut breakdown = Self {
            base_price,
            additional_services_total,
            travel_expenses,
            security_fees,
            service_fee,
            total_price,
            deposit_rate_bps,
            deposit: 0,
            balance: 0,
            currency: currency.into(),
        };
        breakdown.recompute_split();
        Ok(breakdown)
    }

    /// Re-derive total, deposit and balance from the components
    pub fn recompute_split(&mut self) {
        self.total_price = self.base_price
            + self.additional_services_total
            + self.travel_expenses
            + self.security_fees
            + self.service_fee;
        self.deposit = apply_bps_half_up(self.total_price, self.deposit_rate_bps);
        self.balance = self.total_price - self.deposit;
    }

    pub fn is_consistent(&self) -> bool {
        self.total_price
            == self.base_price
                + self.additional_services_total
                + self.travel_expenses
                + self.security_fees
                + self.service_fee
            && self.deposit + self.balance == self.total_price
            && self.balance >= 0
    }
}

/// Stateless quote calculator
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    config: PricingConfig,
}

impl PricingCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn service_fee(&self, subtotal: i64) -> i64 {
        apply_bps_half_up(subtotal, self.config.service_fee_bps)
    }

    /// Quote a catalog service with the client's selections
    pub fn quote(
        &self,
        celebrity: &Celebrity,
        entry: &ServiceEntry,
        selection: &QuoteSelection,
        tiers: &TierTables,
    ) -> Result<PricingBreakdown, PricingError> {
        if !entry.is_active {
            return Err(PricingError::ServiceInactive(entry.code.clone()));
        }

        let mut seen = HashSet::new();
        let mut additional_services_total = 0i64;
        for id in &selection.add_on_ids {
            if !seen.insert(*id) {
                return Err(PricingError::DuplicateAddOn(*id));
            }
            let add_on = entry.add_on(id).ok_or(PricingError::UnknownAddOn(*id))?;
            additional_services_total = additional_services_total
                .checked_add(add_on.price)
                .ok_or(PricingError::Overflow)?;
        }

        let travel_expenses = tiers
            .travel_fee(selection.travel_tier)
            .ok_or_else(|| PricingError::MissingTier(format!("{:?}", selection.travel_tier)))?;
        let security_fees = tiers
            .security_fee(selection.security_tier)
            .ok_or_else(|| PricingError::MissingTier(format!("{:?}", selection.security_tier)))?;

        let service_fee = self.service_fee(entry.base_price + additional_services_total);
        let deposit_rate_bps = celebrity.deposit_rate_bps.unwrap_or(self.config.deposit_rate_bps);

        PricingBreakdown::from_components(
            entry.base_price,
            additional_services_total,
            travel_expenses,
            security_fees,
            service_fee,
            deposit_rate_bps,
            self.config.currency.clone(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Service is not bookable: {0}")]
    ServiceInactive(String),

    #[error("Unknown add-on: {0}")]
    UnknownAddOn(Uuid),

    #[error("Add-on selected twice: {0}")]
    DuplicateAddOn(Uuid),

    #[error("No fee configured for tier {0}")]
    MissingTier(String),

    #[error("Negative amount for {0}")]
    NegativeAmount(&'static str),

    #[error("Rate out of range: {0} bps")]
    InvalidRate(u32),

    #[error("Price overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AddOn, ServiceTier};

    fn fixtures() -> (Celebrity, ServiceEntry, TierTables) {
        let celebrity = Celebrity {
            id: Uuid::new_v4(),
            name: "Ava Stone".to_string(),
            typical_fee_min: 1_000_000,
            typical_fee_max: 3_000_000,
            deposit_rate_bps: None,
        };
        let entry = ServiceEntry {
            id: Uuid::new_v4(),
            celebrity_id: celebrity.id,
            code: "KEYNOTE".to_string(),
            name: "Keynote".to_string(),
            tier: ServiceTier::Premium,
            base_price: 2_500_000,
            default_duration_minutes: 60,
            add_ons: vec![AddOn { id: Uuid::new_v4(), name: "Meet & greet".to_string(), price: 100_000 }],
            is_active: true,
        };
        let mut tiers = TierTables::default();
        tiers.travel.insert(TravelTier::National, 300_000);
        tiers.security.insert(SecurityTier::Enhanced, 200_000);
        (celebrity, entry, tiers)
    }

    #[test]
    fn test_reference_breakdown() {
        let breakdown = PricingBreakdown::from_components(
            2_500_000, 100_000, 300_000, 200_000, 150_000, 5_000, "USD",
        )
        .unwrap();

        assert_eq!(breakdown.total_price, 3_250_000);
        assert_eq!(breakdown.deposit, 1_625_000);
        assert_eq!(breakdown.balance, 1_625_000);
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_quote_from_catalog() {
        let (celebrity, entry, tiers) = fixtures();
        let calculator = PricingCalculator::default();
        let selection = QuoteSelection {
            add_on_ids: vec![entry.add_ons[0].id],
            travel_tier: TravelTier::National,
            security_tier: SecurityTier::Enhanced,
        };

        let quote = calculator.quote(&celebrity, &entry, &selection, &tiers).unwrap();

        // 5% of 2_600_000
        assert_eq!(quote.service_fee, 130_000);
        assert_eq!(quote.total_price, 3_230_000);
        assert_eq!(quote.deposit + quote.balance, quote.total_price);
    }

    #[test]
    fn test_celebrity_deposit_override() {
        let (mut celebrity, entry, tiers) = fixtures();
        celebrity.deposit_rate_bps = Some(10_000);
        let selection = QuoteSelection {
            add_on_ids: vec![],
            travel_tier: TravelTier::National,
            security_tier: SecurityTier::Enhanced,
        };

        let quote = PricingCalculator::default().quote(&celebrity, &entry, &selection, &tiers).unwrap();
        assert_eq!(quote.deposit, quote.total_price);
        assert_eq!(quote.balance, 0);
    }

    #[test]
    fn test_odd_total_rounds_into_balance() {
        // 3333 bps of 1001 = 333.63 -> deposit 334, balance absorbs the rest
        let breakdown = PricingBreakdown::from_components(1001, 0, 0, 0, 0, 3_333, "USD").unwrap();
        assert_eq!(breakdown.deposit, 334);
        assert_eq!(breakdown.balance, 667);
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_split_exact_across_totals() {
        for total in (0..5_000).step_by(7) {
            for bps in [0, 1, 3_333, 5_000, 6_667, 9_999, 10_000] {
                let b = PricingBreakdown::from_components(total, 0, 0, 0, 0, bps, "USD").unwrap();
                assert_eq!(b.deposit + b.balance, b.total_price);
                assert!(b.balance >= 0);
            }
        }
    }

    #[test]
    fn test_unknown_add_on_and_missing_tier() {
        let (celebrity, entry, tiers) = fixtures();
        let calculator = PricingCalculator::default();

        let unknown = QuoteSelection {
            add_on_ids: vec![Uuid::new_v4()],
            travel_tier: TravelTier::National,
            security_tier: SecurityTier::Enhanced,
        };
        assert!(matches!(
            calculator.quote(&celebrity, &entry, &unknown, &tiers),
            Err(PricingError::UnknownAddOn(_))
        ));

        let missing = QuoteSelection {
            add_on_ids: vec![],
            travel_tier: TravelTier::International,
            security_tier: SecurityTier::Enhanced,
        };
        assert!(matches!(
            calculator.quote(&celebrity, &entry, &missing, &tiers),
            Err(PricingError::MissingTier(_))
        ));
    }

    #[test]
    fn test_negative_component_rejected() {
        let result = PricingBreakdown::from_components(-1, 0, 0, 0, 0, 5_000, "USD");
        assert!(matches!(result, Err(PricingError::NegativeAmount("base_price"))));
    }
}
