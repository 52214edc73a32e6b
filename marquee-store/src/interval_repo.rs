use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_catalog::{
    CalendarError, ConflictSummary, IntervalStore, Reservation, ReservationOutcome, ReservedInterval, TimeWindow,
};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres interval index.
///
/// `check_and_reserve` runs in one transaction holding a transaction-scoped
/// advisory lock derived from the celebrity id, so overlapping requests for
/// one celebrity serialize while other celebrities proceed in parallel.
pub struct PgIntervalStore {
    pool: PgPool,
}

impl PgIntervalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IntervalRow {
    celebrity_id: Uuid,
    booking_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    reserved_at: DateTime<Utc>,
}

impl From<IntervalRow> for ReservedInterval {
    fn from(row: IntervalRow) -> Self {
        ReservedInterval {
            celebrity_id: row.celebrity_id,
            booking_id: row.booking_id,
            start: row.start_at,
            end: row.end_at,
            reserved_at: row.reserved_at,
        }
    }
}

fn backend(e: sqlx::Error) -> CalendarError {
    CalendarError::Backend(e.to_string())
}

const OVERLAP_QUERY: &str = "SELECT celebrity_id, booking_id, start_at, end_at, reserved_at \
     FROM reserved_intervals WHERE celebrity_id = $1 AND start_at < $3 AND end_at > $2 ORDER BY start_at";

#[async_trait]
impl IntervalStore for PgIntervalStore {
    async fn check_and_reserve(
        &self,
        celebrity_id: Uuid,
        booking_id: Uuid,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome, CalendarError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(celebrity_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let held: Option<IntervalRow> = sqlx::query_as(
            "SELECT celebrity_id, booking_id, start_at, end_at, reserved_at FROM reserved_intervals WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if let Some(row) = held {
            let existing = ReservedInterval::from(row);
            if existing.celebrity_id == celebrity_id && existing.window() == window {
                return Ok(ReservationOutcome::Reserved(Reservation::from(&existing)));
            }
            return Err(CalendarError::AlreadyReserved(booking_id));
        }

        let overlapping: Vec<IntervalRow> = sqlx::query_as(OVERLAP_QUERY)
            .bind(celebrity_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;

        if !overlapping.is_empty() {
            let conflicts = overlapping
                .into_iter()
                .map(|row| ConflictSummary::from(&ReservedInterval::from(row)))
                .collect::<Vec<_>>();
            tracing::debug!(%celebrity_id, %booking_id, conflicts = conflicts.len(), "slot conflict");
            return Ok(ReservationOutcome::Conflicted(conflicts));
        }

        let interval = ReservedInterval {
            celebrity_id,
            booking_id,
            start: window.start,
            end: window.end,
            reserved_at: now,
        };
        sqlx::query(
            "INSERT INTO reserved_intervals (celebrity_id, booking_id, start_at, end_at, reserved_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(interval.celebrity_id)
        .bind(interval.booking_id)
        .bind(interval.start)
        .bind(interval.end)
        .bind(interval.reserved_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(ReservationOutcome::Reserved(Reservation::from(&interval)))
    }

    async fn release(&self, booking_id: Uuid) -> Result<bool, CalendarError> {
        let result = sqlx::query("DELETE FROM reserved_intervals WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn conflicts(
        &self,
        celebrity_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<ConflictSummary>, CalendarError> {
        let rows: Vec<IntervalRow> = sqlx::query_as(OVERLAP_QUERY)
            .bind(celebrity_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|row| ConflictSummary::from(&ReservedInterval::from(row)))
            .collect())
    }

    async fn intervals_between(
        &self,
        celebrity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReservedInterval>, CalendarError> {
        let range = TimeWindow::new(from, to)?;
        let rows: Vec<IntervalRow> = sqlx::query_as(OVERLAP_QUERY)
            .bind(celebrity_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(ReservedInterval::from).collect())
    }
}
