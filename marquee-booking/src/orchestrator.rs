//! Admission orchestrator.
//!
//! Sequences pricing, payment, risk scoring, calendar reservation and the
//! state machine for every boundary operation. The interval is reserved only
//! on the move into `confirmed`, inside the store's per-celebrity critical
//! section; every booking write is a compare-and-swap on its version.

use chrono::{DateTime, Duration, Utc};
use marquee_catalog::calendar::find_alternative_slots;
use marquee_catalog::{
    Celebrity, ConflictSummary, IntervalStore, PricingBreakdown, PricingCalculator, ReservationOutcome,
    ServiceCatalog, TimeWindow,
};
use marquee_core::{Actor, Clock, Notifier, PaymentAdapter, PaymentStatus, Role, SystemClock};
use marquee_shared::BookingEvent;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::{CancellationWindows, RefundDecision};
use crate::lifecycle::{BookingStateMachine, StatusChange};
use crate::models::{generate_confirmation_code, Booking, BookingAction, BookingStatus, CreateBookingRequest};
use crate::policy::AdmissionPolicy;
use crate::repository::{BookingRepository, RepositoryError, RiskAssessmentRepository};
use crate::risk::{ReviewDecision, ReviewStatus, RiskAssessment, RiskLevel, RiskSignal, SignalCollector, SignalContext};
use crate::{BookingError, BookingResult};

const CODE_ATTEMPTS: usize = 5;
const CANCEL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct BookingQuote {
    pub booking_id: Uuid,
    pub confirmation_code: String,
    pub status: BookingStatus,
    pub pricing: PricingBreakdown,
    pub cancellation_windows: CancellationWindows,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub assessment_id: Uuid,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub review_eta: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub refund: RefundDecision,
    pub refund_due: i64,
    pub refund_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub assessment_id: Uuid,
    pub review_status: ReviewStatus,
    pub booking_id: Uuid,
    pub booking_status: BookingStatus,
    /// Set when an approval could not take the slot
    pub conflicts: Vec<ConflictSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<ConflictSummary>,
    pub alternative_slots: Vec<TimeWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub risk_assessment: Option<RiskAssessment>,
    pub cancellation_windows: CancellationWindows,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleReport {
    pub started: Vec<Uuid>,
    pub completed: Vec<Uuid>,
    pub failed: usize,
}

enum Finalize {
    Confirmed,
    Conflicted(Vec<ConflictSummary>),
}

pub struct AdmissionOrchestrator {
    bookings: Arc<dyn BookingRepository>,
    assessments: Arc<dyn RiskAssessmentRepository>,
    calendar: Arc<dyn IntervalStore>,
    catalog: Arc<dyn ServiceCatalog>,
    payments: Arc<dyn PaymentAdapter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    machine: BookingStateMachine,
    pricing: PricingCalculator,
    signals: SignalCollector,
    policy: AdmissionPolicy,
}

impl AdmissionOrchestrator {
    pub fn new(
        policy: AdmissionPolicy,
        bookings: Arc<dyn BookingRepository>,
        assessments: Arc<dyn RiskAssessmentRepository>,
        calendar: Arc<dyn IntervalStore>,
        catalog: Arc<dyn ServiceCatalog>,
        payments: Arc<dyn PaymentAdapter>,
        notifier: Arc<dyn Notifier>,
    ) -> BookingResult<Self> {
        Ok(Self {
            bookings,
            assessments,
            calendar,
            catalog,
            payments,
            notifier,
            clock: Arc::new(SystemClock),
            machine: policy.state_machine()?,
            pricing: PricingCalculator::new(policy.pricing_config()),
            signals: policy.signal_collector()?,
            policy,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------------
    // Boundary operations
    // ------------------------------------------------------------------------

    /// Validate, quote and persist a draft booking
    pub async fn create_booking(&self, actor: &Actor, request: CreateBookingRequest) -> BookingResult<BookingQuote> {
        require_role(actor, Role::Client)?;
        let now = self.clock.now();
        request.validate(now)?;

        let service = self
            .catalog
            .get_service(request.service_id)
            .await?
            .ok_or(BookingError::ServiceNotFound(request.service_id))?;
        if service.celebrity_id != request.celebrity_id {
            return Err(BookingError::Validation(format!(
                "service {} is not offered by celebrity {}",
                service.code, request.celebrity_id
            )));
        }
        let celebrity = self.celebrity(request.celebrity_id).await?;
        let tiers = self.catalog.tier_tables().await?;
        let pricing = self.pricing.quote(&celebrity, &service, &request.selection, &tiers)?;

        let duration = request
            .event_duration_minutes
            .unwrap_or(service.default_duration_minutes);
        TimeWindow::from_duration(request.event_start, duration)?;

        let mut booking = Booking::draft(actor.id.clone(), request, duration, pricing, now);
        let mut attempts = 0;
        loop {
            match self.bookings.insert(&booking).await {
                Ok(()) => break,
                Err(RepositoryError::DuplicateCode(code)) if attempts + 1 < CODE_ATTEMPTS => {
                    tracing::debug!(%code, "confirmation code collision, regenerating");
                    booking.confirmation_code = generate_confirmation_code();
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            booking_id = %booking.id,
            celebrity_id = %booking.celebrity_id,
            total = booking.pricing.total_price,
            "draft booking created"
        );

        Ok(BookingQuote {
            booking_id: booking.id,
            confirmation_code: booking.confirmation_code.clone(),
            status: booking.status,
            cancellation_windows: self.machine.cancellation_policy().windows(booking.event_start),
            pricing: booking.pricing,
        })
    }

    /// Collect the deposit, score the booking and either confirm it or park it for review.
    ///
    /// `extra_signals` are appended to the signals derived from the request.
    pub async fn confirm_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        payment_method_ref: &str,
        extra_signals: Vec<RiskSignal>,
    ) -> BookingResult<ConfirmOutcome> {
        let mut booking = self.load(booking_id).await?;
        authorize_owner(&booking, actor)?;

        match booking.status {
            BookingStatus::Draft => {}
            BookingStatus::Pending => return self.pending_outcome(&booking).await,
            BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed => {
                return Err(BookingError::AlreadyConfirmed(booking.confirmation_code));
            }
            BookingStatus::Cancelled | BookingStatus::Rejected => {
                self.machine.ensure(&booking, BookingAction::Submit)?;
            }
        }
        if !booking.terms_accepted {
            return Err(BookingError::Validation("terms must be accepted before confirmation".to_string()));
        }

        let now = self.clock.now();
        let window = booking.window()?;

        // Nothing is charged for a slot that is already visibly taken
        let conflicts = self.calendar.conflicts(booking.celebrity_id, &window).await?;
        if !conflicts.is_empty() {
            return Err(BookingError::Conflict { conflicts });
        }

        let mut signals = self.collect_signals(&booking, now).await?;
        signals.extend(extra_signals);

        if !booking.payment_state.is_collected() {
            self.collect_deposit(&mut booking, payment_method_ref, now).await?;
        }

        let (change, assessment) = match self.machine.submit(&mut booking, &signals, now) {
            Ok(submitted) => submitted,
            Err(e) => {
                self.return_uncommitted_deposit(&booking).await;
                return Err(e);
            }
        };
        // The booking only references an assessment that is already stored
        if let Err(e) = self.assessments.insert_current(&assessment).await {
            self.return_uncommitted_deposit(&booking).await;
            return Err(e.into());
        }
        if let Err(e) = self.save(&mut booking).await {
            self.return_uncommitted_deposit(&booking).await;
            return Err(e);
        }
        self.emit(status_event(&booking, &change)).await;

        tracing::info!(
            booking_id = %booking.id,
            risk_score = assessment.risk_score,
            risk_level = assessment.risk_level.as_str(),
            "booking submitted"
        );

        if assessment.review_status != ReviewStatus::Approved {
            self.announce_review(&booking, &assessment).await;
            return Ok(ConfirmOutcome {
                booking_id: booking.id,
                status: booking.status,
                assessment_id: assessment.id,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                review_eta: self.policy.review_eta(assessment.risk_level).map(|eta| now + eta),
            });
        }

        match self.finalize(&mut booking, &assessment).await? {
            Finalize::Confirmed => Ok(ConfirmOutcome {
                booking_id: booking.id,
                status: booking.status,
                assessment_id: assessment.id,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                review_eta: None,
            }),
            Finalize::Conflicted(conflicts) => {
                // Lost the slot between the pre-check and the reservation
                self.compensate(&mut booking, "requested slot was taken before confirmation").await?;
                Err(BookingError::Conflict { conflicts })
            }
        }
    }

    /// Management approval of a pending booking whose review has cleared
    pub async fn approve_booking(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<ConfirmOutcome> {
        require_role(actor, Role::Manager)?;
        let mut booking = self.load(booking_id).await?;
        self.machine.ensure(&booking, BookingAction::Confirm)?;

        let assessment = self
            .assessments
            .current_for_booking(booking.id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("booking {} has not been assessed", booking.confirmation_code)))?;

        match self.finalize(&mut booking, &assessment).await? {
            Finalize::Confirmed => Ok(ConfirmOutcome {
                booking_id: booking.id,
                status: booking.status,
                assessment_id: assessment.id,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                review_eta: None,
            }),
            Finalize::Conflicted(conflicts) => Err(BookingError::Conflict { conflicts }),
        }
    }

    /// pending → rejected, with the deposit returned in full
    pub async fn decline_booking(&self, booking_id: Uuid, actor: &Actor, reason: &str) -> BookingResult<Booking> {
        require_role(actor, Role::Manager)?;
        let mut booking = self.load(booking_id).await?;
        self.decline(&mut booking, reason).await?;
        Ok(booking)
    }

    /// Cancel with a refund per the policy windows
    pub async fn cancel_booking(&self, booking_id: Uuid, actor: &Actor, reason: &str) -> BookingResult<CancelOutcome> {
        self.cancel_with(booking_id, actor, reason, BookingAction::Cancel).await
    }

    /// in_progress → cancelled
    pub async fn emergency_cancel(&self, booking_id: Uuid, actor: &Actor, reason: &str) -> BookingResult<CancelOutcome> {
        require_role(actor, Role::Manager)?;
        self.cancel_with(booking_id, actor, reason, BookingAction::EmergencyCancel).await
    }

    /// Apply a reviewer decision and carry it through to the booking
    pub async fn review_assessment(
        &self,
        assessment_id: Uuid,
        decision: ReviewDecision,
        actor: &Actor,
        notes: Option<String>,
    ) -> BookingResult<ReviewOutcome> {
        require_role(actor, Role::Reviewer)?;
        let mut assessment = self
            .assessments
            .get(assessment_id)
            .await?
            .ok_or(BookingError::AssessmentNotFound(assessment_id))?;

        let now = self.clock.now();
        let expected = assessment.version;
        let review_status = assessment.apply_review(decision, actor, notes, now)?;
        self.assessments.update_review(&mut assessment, expected).await?;

        tracing::info!(
            %assessment_id,
            booking_id = %assessment.booking_id,
            reviewer = %actor.id,
            status = review_status.as_str(),
            "risk review recorded"
        );

        let mut booking = self.load(assessment.booking_id).await?;
        let mut conflicts = Vec::new();

        if booking.status == BookingStatus::Pending {
            match review_status {
                ReviewStatus::Approved => {
                    if let Finalize::Conflicted(found) = self.finalize(&mut booking, &assessment).await? {
                        conflicts = found;
                    }
                }
                ReviewStatus::Rejected => {
                    self.decline(&mut booking, "risk review rejected the booking").await?;
                }
                ReviewStatus::Pending | ReviewStatus::UnderReview | ReviewStatus::Escalated => {}
            }
        }

        Ok(ReviewOutcome {
            assessment_id,
            review_status,
            booking_id: booking.id,
            booking_status: booking.status,
            conflicts,
        })
    }

    /// Collect the outstanding balance of a confirmed booking
    pub async fn record_balance_payment(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        payment_method_ref: &str,
    ) -> BookingResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        authorize_owner(&booking, actor)?;

        if !matches!(booking.status, BookingStatus::Confirmed | BookingStatus::InProgress) {
            return Err(BookingError::Validation(format!(
                "balance can only be paid on a confirmed booking, {} is {}",
                booking.confirmation_code, booking.status
            )));
        }
        let outstanding = booking.pricing.total_price - booking.amount_paid;
        if outstanding <= 0 {
            return Err(BookingError::AlreadyResolved("PAID_IN_FULL".to_string()));
        }

        let receipt = self
            .payments
            .collect(booking.id, payment_method_ref, outstanding, &booking.pricing.currency)
            .await
            .map_err(|e| BookingError::PaymentFailed(e.to_string()))?;
        if receipt.status != PaymentStatus::Succeeded {
            return Err(BookingError::PaymentRequired(format!(
                "balance payment for {} was not accepted",
                booking.confirmation_code
            )));
        }

        booking.record_balance(receipt.reference, receipt.amount, self.clock.now());
        self.save(&mut booking).await?;
        Ok(booking)
    }

    /// Read-only conflict check with alternative start times
    pub async fn check_availability(
        &self,
        celebrity_id: Uuid,
        event_start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookingResult<Availability> {
        let window = TimeWindow::from_duration(event_start, duration_minutes)?;
        let conflicts = self.calendar.conflicts(celebrity_id, &window).await?;
        if conflicts.is_empty() {
            return Ok(Availability {
                available: true,
                conflicts,
                alternative_slots: Vec::new(),
            });
        }

        let horizon = Duration::days(self.policy.alternative_slot_horizon_days);
        let occupied: Vec<TimeWindow> = self
            .calendar
            .intervals_between(celebrity_id, window.start, window.end + horizon)
            .await?
            .iter()
            .map(|i| i.window())
            .collect();
        let alternative_slots = find_alternative_slots(
            &occupied,
            &window,
            Duration::minutes(self.policy.alternative_slot_step_minutes),
            horizon,
            self.policy.alternative_slot_count,
        );

        Ok(Availability {
            available: false,
            conflicts,
            alternative_slots,
        })
    }

    pub async fn get_booking(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<BookingView> {
        let booking = self.load(booking_id).await?;
        self.view(booking, actor).await
    }

    pub async fn get_booking_by_code(&self, code: &str, actor: &Actor) -> BookingResult<BookingView> {
        let booking = self
            .bookings
            .get_by_code(code)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(code.to_string()))?;
        self.view(booking, actor).await
    }

    /// Time-driven transitions: start events that have begun, complete those
    /// that have ended and release their intervals.
    pub async fn advance_schedule(&self) -> BookingResult<ScheduleReport> {
        let now = self.clock.now();
        let mut report = ScheduleReport::default();

        for mut booking in self.bookings.due_for_start(now).await? {
            let result = match self.machine.start(&mut booking, now) {
                Ok(change) => self.save(&mut booking).await.map(|_| change),
                Err(e) => Err(e),
            };
            match result {
                Ok(change) => {
                    self.emit(status_event(&booking, &change)).await;
                    report.started.push(booking.id);
                }
                Err(e) => {
                    tracing::warn!(booking_id = %booking.id, error = %e, "failed to start booking");
                    report.failed += 1;
                }
            }
        }

        for mut booking in self.bookings.due_for_completion(now).await? {
            let result = match self.machine.complete(&mut booking, now) {
                Ok(change) => self.save(&mut booking).await.map(|_| change),
                Err(e) => Err(e),
            };
            match result {
                Ok(change) => {
                    self.release(booking.id).await;
                    self.emit(status_event(&booking, &change)).await;
                    report.completed.push(booking.id);
                }
                Err(e) => {
                    tracing::warn!(booking_id = %booking.id, error = %e, "failed to complete booking");
                    report.failed += 1;
                }
            }
        }

        if !report.started.is_empty() || !report.completed.is_empty() {
            tracing::info!(
                started = report.started.len(),
                completed = report.completed.len(),
                failed = report.failed,
                "schedule advanced"
            );
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn load(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))
    }

    async fn save(&self, booking: &mut Booking) -> BookingResult<()> {
        let expected = booking.version;
        self.bookings.update(booking, expected).await?;
        Ok(())
    }

    async fn celebrity(&self, celebrity_id: Uuid) -> BookingResult<Celebrity> {
        self.catalog
            .get_celebrity(celebrity_id)
            .await?
            .ok_or_else(|| BookingError::Validation(format!("unknown celebrity {}", celebrity_id)))
    }

    async fn view(&self, booking: Booking, actor: &Actor) -> BookingResult<BookingView> {
        if actor.role == Role::Client && !booking.is_owned_by(&actor.id) {
            return Err(BookingError::Forbidden(format!("booking {} belongs to another client", booking.id)));
        }
        let risk_assessment = self.assessments.current_for_booking(booking.id).await?;
        Ok(BookingView {
            cancellation_windows: self.machine.cancellation_policy().windows(booking.event_start),
            booking,
            risk_assessment,
        })
    }

    async fn pending_outcome(&self, booking: &Booking) -> BookingResult<ConfirmOutcome> {
        let assessment = self
            .assessments
            .current_for_booking(booking.id)
            .await?
            .ok_or_else(|| BookingError::Storage(format!("pending booking {} has no assessment", booking.id)))?;
        Ok(ConfirmOutcome {
            booking_id: booking.id,
            status: booking.status,
            assessment_id: assessment.id,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            review_eta: self
                .policy
                .review_eta(assessment.risk_level)
                .map(|eta| assessment.created_at + eta),
        })
    }

    async fn collect_signals(&self, booking: &Booking, now: DateTime<Utc>) -> BookingResult<Vec<RiskSignal>> {
        let celebrity = self.celebrity(booking.celebrity_id).await?;
        let since = now - self.policy.rapid_repeat_window();
        let recent_bookings_from_contact = self
            .bookings
            .count_recent_by_email(booking.client.email.expose(), since, booking.id)
            .await?;
        let domain_seen_before = match booking.client.email.email_domain() {
            Some(domain) => self.bookings.domain_seen(&domain, booking.id).await?,
            None => false,
        };

        Ok(self.signals.collect(&SignalContext {
            booking,
            celebrity: &celebrity,
            recent_bookings_from_contact,
            domain_seen_before,
        }))
    }

    async fn collect_deposit(&self, booking: &mut Booking, payment_method_ref: &str, now: DateTime<Utc>) -> BookingResult<()> {
        let receipt = self
            .payments
            .collect(booking.id, payment_method_ref, booking.pricing.deposit, &booking.pricing.currency)
            .await
            .map_err(|e| BookingError::PaymentFailed(e.to_string()))?;

        match receipt.status {
            PaymentStatus::Succeeded => {
                booking.record_deposit(receipt.reference, receipt.amount, now);
                Ok(())
            }
            PaymentStatus::Failed => {
                booking.record_payment_failure(now);
                self.save(booking).await?;
                Err(BookingError::PaymentRequired(format!(
                    "deposit for {} was declined",
                    booking.confirmation_code
                )))
            }
            PaymentStatus::Processing => Err(BookingError::PaymentRequired(format!(
                "deposit for {} is still processing",
                booking.confirmation_code
            ))),
        }
    }

    /// Refund a deposit that was charged but never persisted with the booking
    async fn return_uncommitted_deposit(&self, booking: &Booking) {
        if booking.amount_paid <= 0 {
            return;
        }
        if let Err(e) = self
            .payments
            .refund(
                booking.id,
                booking.payment_reference.as_deref(),
                booking.amount_paid,
                &booking.pricing.currency,
            )
            .await
        {
            tracing::error!(booking_id = %booking.id, error = %e, "failed to return uncommitted deposit");
        }
    }

    /// pending → confirmed: reserve the slot, apply the edge, persist.
    /// The interval is released again if the booking cannot be saved.
    async fn finalize(&self, booking: &mut Booking, assessment: &RiskAssessment) -> BookingResult<Finalize> {
        // Guards that need no slot are checked before one is taken
        self.machine.ensure(booking, BookingAction::Confirm)?;
        match assessment.review_status {
            ReviewStatus::Approved => {}
            ReviewStatus::Pending | ReviewStatus::UnderReview | ReviewStatus::Escalated | ReviewStatus::Rejected => {
                return Err(if assessment.auto_block {
                    BookingError::RiskBlocked(assessment.id)
                } else {
                    BookingError::ReviewPending(assessment.id)
                });
            }
        }

        let window = booking.window()?;
        let now = self.clock.now();
        let reservation = match self
            .calendar
            .check_and_reserve(booking.celebrity_id, booking.id, window, now)
            .await?
        {
            ReservationOutcome::Reserved(reservation) => reservation,
            ReservationOutcome::Conflicted(conflicts) => {
                tracing::info!(booking_id = %booking.id, conflicts = conflicts.len(), "slot conflict on confirmation");
                return Ok(Finalize::Conflicted(conflicts));
            }
        };

        let committed = match self.machine.confirm(booking, Some(assessment), &reservation, now) {
            Ok(change) => self.save(booking).await.map(|_| change),
            Err(e) => Err(e),
        };
        let change = match committed {
            Ok(change) => change,
            Err(e) => {
                self.release(booking.id).await;
                return Err(e);
            }
        };

        tracing::info!(
            booking_id = %booking.id,
            code = %booking.confirmation_code,
            start = %window.start,
            "booking confirmed"
        );
        self.emit(BookingEvent::BookingConfirmed {
            booking_id: booking.id,
            celebrity_id: booking.celebrity_id,
            confirmation_code: booking.confirmation_code.clone(),
            event_start: window.start,
            event_end: window.end,
            total_price: booking.pricing.total_price,
            currency: booking.pricing.currency.clone(),
            timestamp: now.timestamp(),
        })
        .await;
        self.emit(status_event(booking, &change)).await;

        Ok(Finalize::Confirmed)
    }

    async fn decline(&self, booking: &mut Booking, reason: &str) -> BookingResult<()> {
        let now = self.clock.now();
        let change = self.machine.decline(booking, reason, now)?;
        self.save(booking).await?;

        self.emit(BookingEvent::BookingRejected {
            booking_id: booking.id,
            celebrity_id: booking.celebrity_id,
            reason: reason.to_string(),
            timestamp: now.timestamp(),
        })
        .await;
        self.emit(status_event(booking, &change)).await;

        let paid = booking.amount_paid;
        self.issue_refund(booking, paid).await;
        Ok(())
    }

    /// System cancellation returning everything paid
    async fn compensate(&self, booking: &mut Booking, reason: &str) -> BookingResult<()> {
        let now = self.clock.now();
        let change = self.machine.compensate(booking, reason, now)?;
        self.save(booking).await?;
        self.release(booking.id).await;

        let refund_due = booking.cancellation.as_ref().map(|c| c.refund_due).unwrap_or(0);
        self.emit(cancelled_event(booking, "system", reason, refund_due, now)).await;
        self.emit(status_event(booking, &change)).await;
        self.issue_refund(booking, refund_due).await;
        Ok(())
    }

    async fn cancel_with(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        reason: &str,
        action: BookingAction,
    ) -> BookingResult<CancelOutcome> {
        let mut attempt = 0;
        let (mut booking, change) = loop {
            let mut booking = self.load(booking_id).await?;
            if !booking.is_owned_by(&actor.id) && !actor.has_role(Role::Manager) {
                return Err(BookingError::Forbidden(format!("booking {} belongs to another client", booking_id)));
            }

            let now = self.clock.now();
            let change = match action {
                BookingAction::EmergencyCancel => self.machine.emergency_cancel(&mut booking, actor, reason, now)?,
                _ => self.machine.cancel(&mut booking, actor, reason, now)?,
            };

            match self.save(&mut booking).await {
                Ok(()) => break (booking, change),
                Err(BookingError::VersionConflict(id)) if attempt + 1 < CANCEL_ATTEMPTS => {
                    tracing::debug!(booking_id = %id, attempt, "cancel raced another update, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        self.release(booking.id).await;

        let record = booking
            .cancellation
            .clone()
            .ok_or_else(|| BookingError::Storage(format!("cancelled booking {} has no cancellation record", booking.id)))?;

        tracing::info!(
            booking_id = %booking.id,
            cancelled_by = %actor.id,
            refund_due = record.refund_due,
            refund_bps = record.refund.percentage_bps,
            "booking cancelled"
        );
        self.emit(cancelled_event(&booking, &actor.id, reason, record.refund_due, change.at)).await;
        self.emit(status_event(&booking, &change)).await;

        let refund_reference = self.issue_refund(&mut booking, record.refund_due).await;

        Ok(CancelOutcome {
            booking_id: booking.id,
            status: booking.status,
            refund: record.refund,
            refund_due: record.refund_due,
            refund_reference,
        })
    }

    /// Hand a refund instruction to the gateway. Failures are logged; the
    /// amount owed stays on the cancellation record.
    async fn issue_refund(&self, booking: &mut Booking, amount: i64) -> Option<String> {
        if amount <= 0 {
            return None;
        }

        match self
            .payments
            .refund(booking.id, booking.payment_reference.as_deref(), amount, &booking.pricing.currency)
            .await
        {
            Ok(receipt) if receipt.status == PaymentStatus::Succeeded => {
                booking.record_refund(receipt.amount, self.clock.now());
                if let Err(e) = self.save(booking).await {
                    tracing::error!(booking_id = %booking.id, error = %e, "refund issued but not recorded");
                }
                Some(receipt.reference)
            }
            Ok(receipt) => {
                tracing::warn!(booking_id = %booking.id, status = ?receipt.status, "refund not completed");
                None
            }
            Err(e) => {
                tracing::error!(booking_id = %booking.id, error = %e, "refund request failed");
                None
            }
        }
    }

    async fn release(&self, booking_id: Uuid) {
        match self.calendar.release(booking_id).await {
            Ok(true) => tracing::debug!(%booking_id, "interval released"),
            Ok(false) => {}
            Err(e) => tracing::error!(%booking_id, error = %e, "failed to release interval"),
        }
    }

    async fn announce_review(&self, booking: &Booking, assessment: &RiskAssessment) {
        let timestamp = assessment.created_at.timestamp();
        self.emit(BookingEvent::BookingPendingReview {
            booking_id: booking.id,
            celebrity_id: booking.celebrity_id,
            assessment_id: assessment.id,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level.as_str().to_string(),
            timestamp,
        })
        .await;

        if assessment.risk_level == RiskLevel::High {
            tracing::warn!(
                booking_id = %booking.id,
                risk_score = assessment.risk_score,
                "high-risk booking blocked pending review"
            );
            self.emit(BookingEvent::RiskAlertRaised {
                booking_id: booking.id,
                celebrity_id: booking.celebrity_id,
                assessment_id: assessment.id,
                risk_score: assessment.risk_score,
                factors: assessment.risk_factors.iter().map(|f| f.description.clone()).collect(),
                timestamp,
            })
            .await;
        }
    }

    /// Notifications never fail a committed transition
    async fn emit(&self, event: BookingEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            tracing::warn!(topic = event.topic(), booking_id = %event.booking_id(), error = %e, "notification failed");
        }
    }
}

fn require_role(actor: &Actor, role: Role) -> BookingResult<()> {
    if actor.has_role(role) {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!("{} role required", role)))
    }
}

fn authorize_owner(booking: &Booking, actor: &Actor) -> BookingResult<()> {
    if booking.is_owned_by(&actor.id) || actor.role == Role::System {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!("booking {} belongs to another client", booking.id)))
    }
}

fn status_event(booking: &Booking, change: &StatusChange) -> BookingEvent {
    BookingEvent::BookingStatusChanged {
        booking_id: booking.id,
        celebrity_id: booking.celebrity_id,
        from: change.from.as_str().to_string(),
        to: change.to.as_str().to_string(),
        timestamp: change.at.timestamp(),
    }
}

fn cancelled_event(booking: &Booking, cancelled_by: &str, reason: &str, refund_amount: i64, at: DateTime<Utc>) -> BookingEvent {
    BookingEvent::BookingCancelled {
        booking_id: booking.id,
        celebrity_id: booking.celebrity_id,
        cancelled_by: cancelled_by.to_string(),
        reason: reason.to_string(),
        refund_amount,
        timestamp: at.timestamp(),
    }
}
