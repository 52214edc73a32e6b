use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus};
use crate::risk::RiskAssessment;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Stale version for {0}")]
    VersionConflict(Uuid),

    #[error("Confirmation code already taken: {0}")]
    DuplicateCode(String),

    #[error("Repository backend failure: {0}")]
    Backend(String),
}

/// Repository trait for booking persistence
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, RepositoryError>;

    /// Compare-and-swap: stores `booking` only if the persisted version still
    /// equals `expected_version`, and bumps `booking.version` on success.
    async fn update(&self, booking: &mut Booking, expected_version: u64) -> Result<(), RepositoryError>;

    /// Confirmed bookings whose event has started
    async fn due_for_start(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError>;

    /// In-progress bookings whose event has ended
    async fn due_for_completion(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError>;

    /// Bookings created since `since` with the same contact email, other than `exclude`
    async fn count_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
        exclude: Uuid,
    ) -> Result<u32, RepositoryError>;

    /// Whether any booking other than `exclude` came from `domain`
    async fn domain_seen(&self, domain: &str, exclude: Uuid) -> Result<bool, RepositoryError>;
}

/// Repository trait for risk assessments. At most one current row per booking.
#[async_trait]
pub trait RiskAssessmentRepository: Send + Sync {
    /// Store a new assessment, superseding the booking's previous one
    async fn insert_current(&self, assessment: &RiskAssessment) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError>;

    async fn current_for_booking(&self, booking_id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError>;

    /// Compare-and-swap on the review fields
    async fn update_review(&self, assessment: &mut RiskAssessment, expected_version: u64) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.write().await;
        if bookings.values().any(|b| b.confirmation_code == booking.confirmation_code) {
            return Err(RepositoryError::DuplicateCode(booking.confirmation_code.clone()));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, RepositoryError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.confirmation_code == code)
            .cloned())
    }

    async fn update(&self, booking: &mut Booking, expected_version: u64) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| RepositoryError::NotFound(booking.id.to_string()))?;

        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict(booking.id));
        }

        booking.version = expected_version + 1;
        *stored = booking.clone();
        Ok(())
    }

    async fn due_for_start(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed && b.event_start <= now)
            .cloned()
            .collect())
    }

    async fn due_for_completion(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == BookingStatus::InProgress && b.event_end() <= now)
            .cloned()
            .collect())
    }

    async fn count_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
        exclude: Uuid,
    ) -> Result<u32, RepositoryError> {
        let count = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.id != exclude && b.created_at >= since)
            .filter(|b| b.client.email.expose().eq_ignore_ascii_case(email))
            .count();
        Ok(count as u32)
    }

    async fn domain_seen(&self, domain: &str, exclude: Uuid) -> Result<bool, RepositoryError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.id != exclude)
            .any(|b| b.client.email.email_domain().as_deref() == Some(domain)))
    }
}

#[derive(Default)]
pub struct InMemoryRiskRepository {
    assessments: RwLock<HashMap<Uuid, RiskAssessment>>,
}

impl InMemoryRiskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every assessment recorded for a booking, current one included
    pub async fn history(&self, booking_id: Uuid) -> Vec<RiskAssessment> {
        let mut rows: Vec<RiskAssessment> = self
            .assessments
            .read()
            .await
            .values()
            .filter(|a| a.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        rows
    }
}

#[async_trait]
impl RiskAssessmentRepository for InMemoryRiskRepository {
    async fn insert_current(&self, assessment: &RiskAssessment) -> Result<(), RepositoryError> {
        let mut assessments = self.assessments.write().await;
        for previous in assessments
            .values_mut()
            .filter(|a| a.booking_id == assessment.booking_id && a.superseded_at.is_none())
        {
            previous.superseded_at = Some(assessment.created_at);
        }
        assessments.insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError> {
        Ok(self.assessments.read().await.get(&id).cloned())
    }

    async fn current_for_booking(&self, booking_id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError> {
        Ok(self
            .assessments
            .read()
            .await
            .values()
            .find(|a| a.booking_id == booking_id && a.superseded_at.is_none())
            .cloned())
    }

    async fn update_review(&self, assessment: &mut RiskAssessment, expected_version: u64) -> Result<(), RepositoryError> {
        let mut assessments = self.assessments.write().await;
        let stored = assessments
            .get_mut(&assessment.id)
            .ok_or_else(|| RepositoryError::NotFound(assessment.id.to_string()))?;

        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict(assessment.id));
        }

        assessment.version = expected_version + 1;
        *stored = assessment.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientContact, CreateBookingRequest};
    use crate::risk::RiskScoringEngine;
    use chrono::Duration;
    use marquee_catalog::{PricingBreakdown, QuoteSelection, SecurityTier, TravelTier};
    use marquee_shared::Masked;

    fn booking(email: &str) -> Booking {
        let now = Utc::now();
        let request = CreateBookingRequest {
            celebrity_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            event_start: now + Duration::days(20),
            event_duration_minutes: Some(60),
            client: ClientContact {
                name: "Casey Moore".to_string(),
                email: Masked::new(email.to_string()),
                phone: None,
            },
            selection: QuoteSelection {
                add_on_ids: vec![],
                travel_tier: TravelTier::Local,
                security_tier: SecurityTier::Standard,
            },
            stated_budget: None,
            terms_accepted: true,
        };
        let pricing = PricingBreakdown::from_components(100_000, 0, 0, 0, 5_000, 5_000, "USD").unwrap();
        Booking::draft("client-3".to_string(), request, 60, pricing, now)
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let repo = InMemoryBookingRepository::new();
        let mut b = booking("casey@hall.example");
        repo.insert(&b).await.unwrap();

        let mut stale = b.clone();
        repo.update(&mut b, 0).await.unwrap();
        assert_eq!(b.version, 1);

        let err = repo.update(&mut stale, 0).await.unwrap_err();
        assert!(matches!(err, RepositoryError::VersionConflict(_)));
        assert_eq!(repo.get(b.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let repo = InMemoryBookingRepository::new();
        let b = booking("casey@hall.example");
        repo.insert(&b).await.unwrap();

        let mut twin = booking("other@hall.example");
        twin.confirmation_code = b.confirmation_code.clone();
        assert!(matches!(repo.insert(&twin).await, Err(RepositoryError::DuplicateCode(_))));
        assert!(repo.get_by_code(&b.confirmation_code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_contact_history_queries() {
        let repo = InMemoryBookingRepository::new();
        let first = booking("casey@hall.example");
        let second = booking("CASEY@hall.example");
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        let since = Utc::now() - Duration::hours(24);
        assert_eq!(repo.count_recent_by_email("casey@hall.example", since, second.id).await.unwrap(), 1);
        assert!(repo.domain_seen("hall.example", second.id).await.unwrap());
        assert!(!repo.domain_seen("elsewhere.example", second.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_new_assessment_supersedes_previous() {
        let repo = InMemoryRiskRepository::new();
        let engine = RiskScoringEngine::default();
        let b = booking("casey@hall.example");

        let first = engine.assess(&b, &[], Utc::now());
        repo.insert_current(&first).await.unwrap();
        let second = engine.assess(&b, &[], Utc::now() + Duration::seconds(1));
        repo.insert_current(&second).await.unwrap();

        let current = repo.current_for_booking(b.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        let history = repo.history(b.id).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].superseded_at.is_some());
    }
}
