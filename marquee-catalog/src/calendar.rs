use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Longest engagement a single booking may occupy
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CalendarError> {
        if end <= start {
            return Err(CalendarError::InvalidWindow(format!("end {} is not after start {}", end, start)));
        }
        Ok(Self { start, end })
    }

    pub fn from_duration(start: DateTime<Utc>, duration_minutes: u32) -> Result<Self, CalendarError> {
        if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(CalendarError::InvalidWindow(format!(
                "duration must be between 1 and {} minutes, got {}",
                MAX_DURATION_MINUTES, duration_minutes
            )));
        }
        Self::new(start, start + Duration::minutes(duration_minutes as i64))
    }

    /// Touching windows (one ends where the other starts) do not overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A calendar slot held by one active booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservedInterval {
    pub celebrity_id: Uuid,
    pub booking_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reserved_at: DateTime<Utc>,
}

impl ReservedInterval {
    pub fn window(&self) -> TimeWindow {
        TimeWindow { start: self.start, end: self.end }
    }
}

/// Booking that blocks a requested window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictSummary {
    pub booking_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&ReservedInterval> for ConflictSummary {
    fn from(interval: &ReservedInterval) -> Self {
        Self {
            booking_id: interval.booking_id,
            start: interval.start,
            end: interval.end,
        }
    }
}

/// Proof that a slot was reserved for a booking. Only issued by an [`IntervalStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub celebrity_id: Uuid,
    pub booking_id: Uuid,
    pub window: TimeWindow,
    pub reserved_at: DateTime<Utc>,
}

impl From<&ReservedInterval> for Reservation {
    fn from(interval: &ReservedInterval) -> Self {
        Self {
            celebrity_id: interval.celebrity_id,
            booking_id: interval.booking_id,
            window: interval.window(),
            reserved_at: interval.reserved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    Reserved(Reservation),
    Conflicted(Vec<ConflictSummary>),
}

/// Per-celebrity index of reserved time ranges.
///
/// `check_and_reserve` must behave as if serialized per celebrity; requests
/// for different celebrities must not contend.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Reserve `window` unless it overlaps an existing interval. A conflict
    /// leaves the store untouched. `now` is stamped as `reserved_at`.
    async fn check_and_reserve(
        &self,
        celebrity_id: Uuid,
        booking_id: Uuid,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome, CalendarError>;

    /// Drop the interval held by a booking. Returns whether one existed.
    async fn release(&self, booking_id: Uuid) -> Result<bool, CalendarError>;

    /// Read-only overlap query
    async fn conflicts(
        &self,
        celebrity_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<ConflictSummary>, CalendarError>;

    /// Intervals overlapping `[from, to)`, ordered by start
    async fn intervals_between(
        &self,
        celebrity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReservedInterval>, CalendarError>;
}

type CelebrityCalendar = Arc<tokio::sync::Mutex<Vec<ReservedInterval>>>;

/// In-process interval store with one async lock per celebrity
#[derive(Default)]
pub struct InMemoryCalendar {
    calendars: Mutex<HashMap<Uuid, CelebrityCalendar>>,
    owners: Mutex<HashMap<Uuid, Uuid>>, // booking_id -> celebrity_id
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    fn calendar_for(&self, celebrity_id: Uuid) -> CelebrityCalendar {
        let mut calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        calendars.entry(celebrity_id).or_default().clone()
    }

    fn owner_of(&self, booking_id: &Uuid) -> Option<Uuid> {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(booking_id)
            .copied()
    }
}

#[async_trait]
impl IntervalStore for InMemoryCalendar {
    async fn check_and_reserve(
        &self,
        celebrity_id: Uuid,
        booking_id: Uuid,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome, CalendarError> {
        let calendar = self.calendar_for(celebrity_id);
        let mut intervals = calendar.lock().await;

        if let Some(existing) = intervals.iter().find(|i| i.booking_id == booking_id) {
            // Retried reservation for the same slot
            if existing.window() == window {
                return Ok(ReservationOutcome::Reserved(Reservation::from(existing)));
            }
            return Err(CalendarError::AlreadyReserved(booking_id));
        }
        if self.owner_of(&booking_id).is_some() {
            return Err(CalendarError::AlreadyReserved(booking_id));
        }

        let conflicts: Vec<ConflictSummary> = intervals
            .iter()
            .filter(|i| i.window().overlaps(&window))
            .map(ConflictSummary::from)
            .collect();
        if !conflicts.is_empty() {
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
        let reservation = Reservation::from(&interval);
        intervals.push(interval);
        intervals.sort_by_key(|i| i.start);

        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(booking_id, celebrity_id);

        Ok(ReservationOutcome::Reserved(reservation))
    }

    async fn release(&self, booking_id: Uuid) -> Result<bool, CalendarError> {
        let Some(celebrity_id) = self.owner_of(&booking_id) else {
            return Ok(false);
        };

        let calendar = self.calendar_for(celebrity_id);
        let mut intervals = calendar.lock().await;
        let before = intervals.len();
        intervals.retain(|i| i.booking_id != booking_id);

        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&booking_id);

        Ok(intervals.len() < before)
    }

    async fn conflicts(
        &self,
        celebrity_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<ConflictSummary>, CalendarError> {
        let calendar = self.calendar_for(celebrity_id);
        let intervals = calendar.lock().await;
        Ok(intervals
            .iter()
            .filter(|i| i.window().overlaps(window))
            .map(ConflictSummary::from)
            .collect())
    }

    async fn intervals_between(
        &self,
        celebrity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReservedInterval>, CalendarError> {
        let range = TimeWindow::new(from, to)?;
        let calendar = self.calendar_for(celebrity_id);
        let intervals = calendar.lock().await;
        Ok(intervals
            .iter()
            .filter(|i| i.window().overlaps(&range))
            .cloned()
            .collect())
    }
}

/// Free windows of the requested length after `requested.start`, probing every
/// `step` up to `horizon` ahead and skipping anything overlapping `occupied`.
pub fn find_alternative_slots(
    occupied: &[TimeWindow],
    requested: &TimeWindow,
    step: Duration,
    horizon: Duration,
    limit: usize,
) -> Vec<TimeWindow> {
    let mut slots = Vec::new();
    if step <= Duration::zero() || limit == 0 {
        return slots;
    }

    let length = requested.duration();
    let last_start = requested.start + horizon;
    let mut start = requested.start + step;

    while start <= last_start && slots.len() < limit {
        let candidate = TimeWindow { start, end: start + length };
        if !occupied.iter().any(|o| o.overlaps(&candidate)) {
            slots.push(candidate);
        }
        start += step;
    }

    slots
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Booking already holds a different slot: {0}")]
    AlreadyReserved(Uuid),

    #[error("Calendar backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
    }

    fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        TimeWindow::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        let a = window((14, 0), (14, 30));
        assert!(a.overlaps(&window((14, 15), (14, 45))));
        assert!(a.overlaps(&window((13, 0), (15, 0))));
        assert!(!a.overlaps(&window((14, 30), (15, 0))));
        assert!(!a.overlaps(&window((13, 30), (14, 0))));
    }

    #[test]
    fn test_window_validation() {
        assert!(TimeWindow::new(at(14, 0), at(14, 0)).is_err());
        assert!(TimeWindow::from_duration(at(14, 0), 0).is_err());
        assert!(TimeWindow::from_duration(at(14, 0), MAX_DURATION_MINUTES + 1).is_err());
        assert_eq!(TimeWindow::from_duration(at(14, 0), 30).unwrap().end, at(14, 30));
    }

    #[tokio::test]
    async fn test_conflict_leaves_store_untouched() {
        let calendar = InMemoryCalendar::new();
        let celebrity = Uuid::new_v4();
        let first = Uuid::new_v4();

        let outcome = calendar.check_and_reserve(celebrity, first, window((14, 0), (14, 30)), at(8, 0)).await.unwrap();
        assert!(matches!(outcome, ReservationOutcome::Reserved(_)));

        let second = Uuid::new_v4();
        let outcome = calendar.check_and_reserve(celebrity, second, window((14, 15), (14, 45)), at(8, 0)).await.unwrap();
        match outcome {
            ReservationOutcome::Conflicted(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].booking_id, first);
                assert_eq!(conflicts[0].start, at(14, 0));
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let held = calendar.intervals_between(celebrity, at(0, 0), at(23, 0)).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].reserved_at, at(8, 0));
        assert!(!calendar.release(second).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_frees_slot() {
        let calendar = InMemoryCalendar::new();
        let celebrity = Uuid::new_v4();
        let booking = Uuid::new_v4();

        calendar.check_and_reserve(celebrity, booking, window((9, 0), (10, 0)), at(8, 0)).await.unwrap();
        assert!(calendar.release(booking).await.unwrap());
        assert!(calendar.conflicts(celebrity, &window((9, 0), (10, 0))).await.unwrap().is_empty());

        let other = Uuid::new_v4();
        let outcome = calendar.check_and_reserve(celebrity, other, window((9, 30), (10, 30)), at(8, 0)).await.unwrap();
        assert!(matches!(outcome, ReservationOutcome::Reserved(_)));
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent_per_booking() {
        let calendar = InMemoryCalendar::new();
        let celebrity = Uuid::new_v4();
        let booking = Uuid::new_v4();
        let slot = window((9, 0), (10, 0));

        calendar.check_and_reserve(celebrity, booking, slot, at(8, 0)).await.unwrap();
        let again = calendar.check_and_reserve(celebrity, booking, slot, at(8, 0)).await.unwrap();
        assert!(matches!(again, ReservationOutcome::Reserved(_)));

        let moved = calendar.check_and_reserve(celebrity, booking, window((11, 0), (12, 0)), at(8, 0)).await;
        assert!(matches!(moved, Err(CalendarError::AlreadyReserved(_))));
    }

    #[tokio::test]
    async fn test_celebrities_are_independent() {
        let calendar = InMemoryCalendar::new();
        let slot = window((14, 0), (15, 0));

        let a = calendar.check_and_reserve(Uuid::new_v4(), Uuid::new_v4(), slot, at(8, 0)).await.unwrap();
        let b = calendar.check_and_reserve(Uuid::new_v4(), Uuid::new_v4(), slot, at(8, 0)).await.unwrap();
        assert!(matches!(a, ReservationOutcome::Reserved(_)));
        assert!(matches!(b, ReservationOutcome::Reserved(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_requests_single_winner() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let celebrity = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let calendar = calendar.clone();
            // Every window contains 14:00-14:15
            let slot = TimeWindow::from_duration(at(13, 45) + Duration::minutes(i as i64), 30).unwrap();
            handles.push(tokio::spawn(async move {
                calendar.check_and_reserve(celebrity, Uuid::new_v4(), slot, at(8, 0)).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ReservationOutcome::Reserved(_)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_alternative_slots_skip_occupied() {
        let occupied = vec![window((14, 0), (14, 30)), window((15, 0), (16, 0))];
        let requested = window((14, 15), (14, 45));

        let slots = find_alternative_slots(&occupied, &requested, Duration::minutes(30), Duration::days(1), 3);

        // 14:45 overlaps 15:00-16:00, 15:15 and 15:45 too
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].start, at(16, 15));
        assert_eq!(slots[1].start, at(16, 45));
        assert!(slots.iter().all(|s| occupied.iter().all(|o| !o.overlaps(s))));
    }
}
