pub mod service;
pub mod pricing;
pub mod calendar;

pub use service::{AddOn, CatalogError, Celebrity, SecurityTier, ServiceCatalog, ServiceEntry, ServiceTier, StaticCatalog, TierTables, TravelTier};
pub use pricing::{PricingBreakdown, PricingCalculator, PricingConfig, PricingError, QuoteSelection};
pub use calendar::{CalendarError, ConflictSummary, InMemoryCalendar, IntervalStore, Reservation, ReservationOutcome, ReservedInterval, TimeWindow};
