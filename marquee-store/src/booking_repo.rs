use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_booking::models::{Booking, CancellationRecord, ClientContact};
use marquee_booking::{BookingRepository, RepositoryError};
use marquee_catalog::{PricingBreakdown, QuoteSelection};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, confirmation_code, celebrity_id, service_id, client_id, event_start, \
     event_duration_minutes, status, client, selection, pricing, payment_state, payment_reference, \
     amount_paid, terms_accepted, stated_budget, risk_assessment_id, cancellation, rejection_reason, \
     created_at, updated_at, version";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, at: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        let sql = format!("SELECT {} FROM bookings WHERE {} ORDER BY event_start", BOOKING_COLUMNS, clause);
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(at)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    confirmation_code: String,
    celebrity_id: Uuid,
    service_id: Uuid,
    client_id: String,
    event_start: DateTime<Utc>,
    event_duration_minutes: i32,
    status: String,
    client: Json<ClientContact>,
    selection: Json<QuoteSelection>,
    pricing: Json<PricingBreakdown>,
    payment_state: String,
    payment_reference: Option<String>,
    amount_paid: i64,
    terms_accepted: bool,
    stated_budget: Option<i64>,
    risk_assessment_id: Option<Uuid>,
    cancellation: Option<Json<CancellationRecord>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            confirmation_code: row.confirmation_code,
            celebrity_id: row.celebrity_id,
            service_id: row.service_id,
            client_id: row.client_id,
            event_start: row.event_start,
            event_duration_minutes: u32::try_from(row.event_duration_minutes)
                .map_err(|_| RepositoryError::Backend(format!("negative duration on booking {}", row.id)))?,
            status: row.status.parse().map_err(|e| RepositoryError::Backend(format!("{}", e)))?,
            client: row.client.0,
            selection: row.selection.0,
            pricing: row.pricing.0,
            payment_state: row.payment_state.parse().map_err(|e| RepositoryError::Backend(format!("{}", e)))?,
            payment_reference: row.payment_reference,
            amount_paid: row.amount_paid,
            terms_accepted: row.terms_accepted,
            stated_budget: row.stated_budget,
            risk_assessment_id: row.risk_assessment_id,
            cancellation: row.cancellation.map(|c| c.0),
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version as u64,
        })
    }
}

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, confirmation_code, celebrity_id, service_id, client_id, event_start, event_end,
                event_duration_minutes, status, client, client_email, client_domain, selection, pricing,
                payment_state, payment_reference, amount_paid, terms_accepted, stated_budget,
                risk_assessment_id, cancellation, rejection_reason, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
                    $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.confirmation_code)
        .bind(booking.celebrity_id)
        .bind(booking.service_id)
        .bind(&booking.client_id)
        .bind(booking.event_start)
        .bind(booking.event_end())
        .bind(booking.event_duration_minutes as i32)
        .bind(booking.status.as_str())
        .bind(Json(&booking.client))
        .bind(booking.client.email.expose().to_ascii_lowercase())
        .bind(booking.client.email.email_domain())
        .bind(Json(&booking.selection))
        .bind(Json(&booking.pricing))
        .bind(booking.payment_state.as_str())
        .bind(&booking.payment_reference)
        .bind(booking.amount_paid)
        .bind(booking.terms_accepted)
        .bind(booking.stated_budget)
        .bind(booking.risk_assessment_id)
        .bind(booking.cancellation.as_ref().map(Json))
        .bind(&booking.rejection_reason)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::DuplicateCode(booking.confirmation_code.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, RepositoryError> {
        let sql = format!("SELECT {} FROM bookings WHERE confirmation_code = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update(&self, booking: &mut Booking, expected_version: u64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $3,
                payment_state = $4,
                payment_reference = $5,
                amount_paid = $6,
                risk_assessment_id = $7,
                cancellation = $8,
                rejection_reason = $9,
                updated_at = $10,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(booking.id)
        .bind(expected_version as i64)
        .bind(booking.status.as_str())
        .bind(booking.payment_state.as_str())
        .bind(&booking.payment_reference)
        .bind(booking.amount_paid)
        .bind(booking.risk_assessment_id)
        .bind(booking.cancellation.as_ref().map(Json))
        .bind(&booking.rejection_reason)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM bookings WHERE id = $1")
                .bind(booking.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
            return Err(match exists {
                Some(_) => RepositoryError::VersionConflict(booking.id),
                None => RepositoryError::NotFound(booking.id.to_string()),
            });
        }

        booking.version = expected_version + 1;
        Ok(())
    }

    async fn due_for_start(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        self.fetch_where("status = 'CONFIRMED' AND event_start <= $1", now).await
    }

    async fn due_for_completion(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        self.fetch_where("status = 'IN_PROGRESS' AND event_end <= $1", now).await
    }

    async fn count_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
        exclude: Uuid,
    ) -> Result<u32, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings WHERE client_email = $1 AND created_at >= $2 AND id <> $3",
        )
        .bind(email.to_ascii_lowercase())
        .bind(since)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(count as u32)
    }

    async fn domain_seen(&self, domain: &str, exclude: Uuid) -> Result<bool, RepositoryError> {
        let (seen,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE client_domain = $1 AND id <> $2)",
        )
        .bind(domain)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(seen)
    }
}
