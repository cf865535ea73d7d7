//! Booking Committer.
//!
//! Turns an eligible selection into a persisted booking. Each attempt moves
//! through `Requested -> Validating -> {Committed | Rejected | Failed}`:
//!
//! 1. **Requested**: buyer contact fields are checked without touching the store.
//! 2. **Validating**: the [`AvailabilityEvaluator`] re-fetches the rows and
//!    decides eligibility.
//! 3. **Commit**: a conditional inventory write (plot counter decrement, or
//!    claiming the whole property) followed by the booking insert.
//!
//! CRITICAL: the inventory write and the booking insert are applied together
//! or not at all. When the insert fails after the inventory write succeeded,
//! the write is reversed with its compensating action before the failure is
//! reported. Retries are never automatic.

use crate::availability::{AvailabilityEvaluator, EligibleUnit, Eligibility, IneligibleReason, UnitSelection};
use crate::config::BookingConfig;
use crate::environment::Clock;
use crate::error::Recovery;
use crate::inventory::{InventoryError, compute_block_price, report_mismatch, whole_property_unit};
use crate::store::{BookingStore, CallError, Conditional, ListingStore, StoreError, bounded};
use crate::types::{
    Block, Booking, BookingId, BookingStatus, BuyerContact, PaymentStatus, Property, PropertyId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Attempt state machine
// ============================================================================

/// State of one booking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    /// Buyer submitted a selection and contact details
    Requested,
    /// Availability is being re-checked
    Validating,
    /// Inventory updated and booking persisted with status `pending`
    Committed,
    /// Refused before any write (bad input or ineligible selection)
    Rejected,
    /// A write was refused or failed; no lasting state change
    Failed,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Validating => "validating",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        })
    }
}

/// A required buyer field that was left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequiredField {
    /// Buyer name
    Name,
    /// Buyer phone number
    Phone,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Phone => "phone",
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by booking attempts and status transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Required contact fields are empty.
    #[error("missing required fields: {}", join_fields(.0))]
    MissingFields(Vec<RequiredField>),

    /// The selection is not bookable.
    #[error("selection rejected: {0}")]
    Rejected(IneligibleReason),

    /// Another booking consumed the unit between validation and commit.
    #[error("the selected unit just became unavailable, please pick another")]
    Conflict,

    /// A store call did not finish in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Name of the store operation
        operation: &'static str,
        /// The limit that was exceeded
        limit: Duration,
    },

    /// The referenced property or booking does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data violates an inventory invariant.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The caller does not own the booked property.
    #[error("only the property owner can change a booking's status")]
    Unauthorized,

    /// The requested status change is not allowed.
    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The booking insert failed and reversing the inventory write failed too.
    ///
    /// The inventory is left one unit short with no booking behind it until
    /// an operator reconciles it.
    #[error("booking failed ({cause}) and the inventory write could not be reversed ({compensation})")]
    CompensationFailed {
        /// Why the booking insert failed
        cause: String,
        /// Why the compensating write failed
        compensation: String,
    },
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl BookingError {
    /// Terminal attempt state this error corresponds to.
    #[must_use]
    pub const fn attempt_state(&self) -> AttemptState {
        match self {
            Self::MissingFields(_) | Self::Rejected(_) | Self::NotFound(_) | Self::InvalidState(_) => {
                AttemptState::Rejected
            },
            Self::Conflict
            | Self::Timeout { .. }
            | Self::Store(_)
            | Self::CompensationFailed { .. }
            | Self::Unauthorized
            | Self::InvalidTransition { .. } => AttemptState::Failed,
        }
    }

    /// How the caller should react.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::MissingFields(_) | Self::Rejected(IneligibleReason::InvalidSelection) => Recovery::FixInput,
            Self::Rejected(IneligibleReason::SoldOut | IneligibleReason::PropertyUnavailable)
            | Self::Conflict => Recovery::Requery,
            Self::Timeout { .. }
            | Self::InvalidState(_)
            | Self::Store(_)
            | Self::CompensationFailed { .. } => Recovery::RetryLater,
            Self::NotFound(_) | Self::Unauthorized | Self::InvalidTransition { .. } => Recovery::None,
        }
    }
}

impl From<CallError> for BookingError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(store) => Self::Store(store),
            CallError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

impl From<InventoryError> for BookingError {
    fn from(error: InventoryError) -> Self {
        match error {
            InventoryError::NotFound(what) => Self::NotFound(what),
            InventoryError::InvalidState(what) => Self::InvalidState(what),
            InventoryError::Store(store) => Self::Store(store),
            InventoryError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A buyer's booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// What to book
    pub selection: UnitSelection,
    /// Who is booking
    pub buyer: BuyerContact,
    /// Free-form notes for the owner
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Required contact fields that are empty after trimming.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if self.buyer.name.trim().is_empty() {
            missing.push(RequiredField::Name);
        }
        if self.buyer.phone.trim().is_empty() {
            missing.push(RequiredField::Phone);
        }
        missing
    }
}

/// Result of an owner status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// The booking after the change
    pub booking: Booking,
    /// Whether the unit was returned to inventory (cancellations with restock enabled)
    pub restocked: bool,
}

/// Inventory write applied during a commit, kept for compensation.
enum Claimed {
    Plot(Block),
    Property(Property),
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the Booking Committer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Properties and blocks
    pub listings: Arc<dyn ListingStore>,
    /// Booking records
    pub bookings: Arc<dyn BookingStore>,
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Timeouts, price epsilon and restock policy
    pub config: BookingConfig,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(
        listings: Arc<dyn ListingStore>,
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            listings,
            bookings,
            clock,
            config,
        }
    }
}

// ============================================================================
// Committer
// ============================================================================

/// Commits bookings and applies owner status changes.
#[derive(Clone)]
pub struct BookingCommitter {
    env: BookingEnvironment,
    evaluator: AvailabilityEvaluator,
}

impl BookingCommitter {
    /// Creates a new `BookingCommitter`
    #[must_use]
    pub fn new(env: BookingEnvironment) -> Self {
        let evaluator = AvailabilityEvaluator::new(Arc::clone(&env.listings), env.config.clone());
        Self { env, evaluator }
    }

    fn limit(&self) -> Duration {
        self.env.config.request_timeout
    }

    /// Run one booking attempt to a terminal state.
    ///
    /// On success the booking is persisted with status `pending` and
    /// `total_price` snapshotted from the current reconciled price.
    ///
    /// # Errors
    ///
    /// - [`BookingError::MissingFields`] before any store call
    /// - [`BookingError::Rejected`] / [`BookingError::NotFound`] /
    ///   [`BookingError::InvalidState`] during validation
    /// - [`BookingError::Conflict`] if the unit was taken by a concurrent booking
    /// - [`BookingError::Store`] / [`BookingError::Timeout`] on store failure,
    ///   after any inventory write has been reversed
    /// - [`BookingError::CompensationFailed`] if the reversal itself failed
    #[tracing::instrument(
        skip(self, request),
        fields(
            property_id = %request.selection.property_id(),
            block_id = ?request.selection.block(),
            slot = ?slot_of(&request.selection),
        )
    )]
    pub async fn book(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        tracing::debug!(state = %AttemptState::Requested, "Booking attempt received");
        let result = self.attempt(request).await;
        match &result {
            Ok(booking) => {
                tracing::info!(booking_id = %booking.id, total_price = %booking.total_price, "Booking committed");
                metrics::counter!("booking.committed").increment(1);
            },
            Err(BookingError::Conflict) => {
                tracing::warn!("Lost the race for the selected unit");
                metrics::counter!("booking.conflict").increment(1);
            },
            Err(error) if error.attempt_state() == AttemptState::Rejected => {
                tracing::debug!(state = %AttemptState::Rejected, %error, "Booking attempt rejected");
                metrics::counter!("booking.rejected").increment(1);
            },
            Err(error) => {
                tracing::warn!(state = %AttemptState::Failed, %error, "Booking attempt failed");
                metrics::counter!("booking.failed").increment(1);
            },
        }
        result
    }

    async fn attempt(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(BookingError::MissingFields(missing));
        }

        tracing::debug!(state = %AttemptState::Validating, "Re-checking availability");
        let unit = match self.evaluator.check_eligibility(&request.selection).await? {
            Eligibility::Eligible(unit) => unit,
            Eligibility::Ineligible(reason) => return Err(BookingError::Rejected(reason)),
        };

        let (property_id, price) = match &unit {
            EligibleUnit::WholeProperty(property) => (property.id.clone(), whole_property_unit(property)?.price),
            EligibleUnit::Plot { property, block, .. } => {
                let reconciled = compute_block_price(block, self.env.config.price_epsilon)?;
                if let Some(mismatch) = &reconciled.mismatch {
                    report_mismatch(mismatch);
                }
                (property.id.clone(), reconciled.amount)
            },
        };

        let claimed = self.claim(&unit).await?;

        let booking = Booking {
            id: BookingId::new(),
            property_id,
            block_id: match &claimed {
                Claimed::Plot(block) => Some(block.id),
                Claimed::Property(_) => None,
            },
            buyer: BuyerContact {
                name: request.buyer.name.trim().to_string(),
                phone: request.buyer.phone.trim().to_string(),
                ..request.buyer
            },
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_price: price,
            notes: request.notes.filter(|notes| !notes.trim().is_empty()),
            created_at: self.env.clock.now(),
        };

        match bounded(self.limit(), "insert_booking", self.env.bookings.insert_booking(booking)).await {
            Ok(booking) => Ok(booking),
            Err(cause) => Err(self.compensate(&claimed, cause).await),
        }
    }

    /// Apply the conditional inventory write for an eligible unit.
    async fn claim(&self, unit: &EligibleUnit) -> Result<Claimed, BookingError> {
        let limit = self.limit();
        match unit {
            EligibleUnit::Plot { block, .. } => {
                let outcome = bounded(
                    limit,
                    "decrement_available_plots",
                    self.env.listings.decrement_available_plots(&block.id),
                )
                .await
                .map_err(|error| unacknowledged_write(error, &block.id))?;
                match outcome {
                    Conditional::Applied(updated) => {
                        tracing::debug!(available_plots = updated.available_plots, "Plot counter decremented");
                        Ok(Claimed::Plot(updated))
                    },
                    Conditional::PreconditionFailed => Err(BookingError::Conflict),
                    Conditional::Missing => Err(BookingError::Rejected(IneligibleReason::InvalidSelection)),
                }
            },
            EligibleUnit::WholeProperty(property) => {
                let outcome = bounded(limit, "claim_property", self.env.listings.claim_property(&property.id))
                    .await
                    .map_err(|error| unacknowledged_write(error, &property.id))?;
                match outcome {
                    Conditional::Applied(updated) => {
                        tracing::debug!("Property claimed");
                        Ok(Claimed::Property(updated))
                    },
                    Conditional::PreconditionFailed => Err(BookingError::Conflict),
                    Conditional::Missing => Err(BookingError::NotFound(format!("property {}", property.id))),
                }
            },
        }
    }

    /// Reverse a claim after the booking insert failed and return the error to report.
    async fn compensate(&self, claimed: &Claimed, cause: CallError) -> BookingError {
        tracing::warn!(%cause, "Booking insert failed after inventory write; compensating");
        let limit = self.limit();
        let reversal = match claimed {
            Claimed::Plot(block) => {
                bounded(limit, "increment_available_plots", self.env.listings.increment_available_plots(&block.id))
                    .await
                    .map(|outcome| outcome.is_applied())
            },
            Claimed::Property(property) => {
                bounded(limit, "release_property", self.env.listings.release_property(&property.id))
                    .await
                    .map(|outcome| outcome.is_applied())
            },
        };

        match reversal {
            Ok(true) => {
                metrics::counter!("booking.compensated").increment(1);
                tracing::warn!("Inventory write reversed");
                cause.into()
            },
            Ok(false) => {
                tracing::error!(%cause, "Compensating write found nothing to reverse");
                BookingError::CompensationFailed {
                    cause: cause.to_string(),
                    compensation: "precondition no longer held".to_string(),
                }
            },
            Err(compensation) => {
                tracing::error!(%cause, %compensation, "Compensating write failed; inventory needs reconciliation");
                BookingError::CompensationFailed { cause: cause.to_string(), compensation: compensation.to_string() }
            },
        }
    }

    /// Move a pending booking to `confirmed` or `cancelled`.
    ///
    /// Only the owner of the booked property may do this. Cancelling returns
    /// the unit to inventory only when `restock_on_cancel` is enabled.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] if the booking or its property does not exist
    /// - [`BookingError::Unauthorized`] if `caller` is not the property owner
    /// - [`BookingError::InvalidTransition`] unless moving `pending` to `confirmed` or `cancelled`
    /// - [`BookingError::Conflict`] if the status changed concurrently
    /// - [`BookingError::Store`] / [`BookingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, to = %new_status))]
    pub async fn transition_status(
        &self,
        caller: &UserId,
        booking_id: &BookingId,
        new_status: BookingStatus,
    ) -> Result<StatusChange, BookingError> {
        let limit = self.limit();
        let booking = bounded(limit, "fetch_booking", self.env.bookings.fetch_booking(booking_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
        let property = bounded(limit, "fetch_property", self.env.listings.fetch_property(&booking.property_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("property {}", booking.property_id)))?;

        if !property.is_owned_by(caller) {
            tracing::warn!(caller = %caller, "Status change attempted by non-owner");
            return Err(BookingError::Unauthorized);
        }
        if booking.status != BookingStatus::Pending || new_status == BookingStatus::Pending {
            return Err(BookingError::InvalidTransition { from: booking.status, to: new_status });
        }

        let outcome = bounded(
            limit,
            "update_booking_status",
            self.env.bookings.update_booking_status(booking_id, BookingStatus::Pending, new_status),
        )
        .await?;
        let updated = match outcome {
            Conditional::Applied(updated) => updated,
            Conditional::PreconditionFailed => return Err(BookingError::Conflict),
            Conditional::Missing => return Err(BookingError::NotFound(format!("booking {booking_id}"))),
        };
        tracing::info!(from = %booking.status, "Booking status changed");

        let restocked = if new_status == BookingStatus::Cancelled && self.env.config.restock_on_cancel {
            self.restock(&updated).await
        } else {
            false
        };

        Ok(StatusChange { booking: updated, restocked })
    }

    async fn restock(&self, booking: &Booking) -> bool {
        let limit = self.limit();
        let outcome = match booking.block_id {
            Some(block) => {
                bounded(limit, "increment_available_plots", self.env.listings.increment_available_plots(&block))
                    .await
                    .map(|outcome| outcome.is_applied())
            },
            None => bounded(limit, "release_property", self.env.listings.release_property(&booking.property_id))
                .await
                .map(|outcome| outcome.is_applied()),
        };
        match outcome {
            Ok(applied) => {
                if !applied {
                    tracing::warn!("Cancelled unit was already back in inventory");
                }
                applied
            },
            Err(error) => {
                tracing::error!(%error, "Failed to restock cancelled booking");
                false
            },
        }
    }

    /// Bookings of an authenticated buyer, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] / [`BookingError::Timeout`] on store failure.
    pub async fn buyer_bookings(&self, buyer: &UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(bounded(self.limit(), "bookings_for_buyer", self.env.bookings.bookings_for_buyer(buyer)).await?)
    }

    /// Bookings of a property, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] / [`BookingError::Timeout`] on store failure.
    pub async fn property_bookings(&self, property_id: &PropertyId) -> Result<Vec<Booking>, BookingError> {
        Ok(bounded(self.limit(), "bookings_for_property", self.env.bookings.bookings_for_property(property_id))
            .await?)
    }

    /// Quoted price of a selection without booking it.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`BookingCommitter::book`].
    pub async fn quote(&self, selection: &UnitSelection) -> Result<Decimal, BookingError> {
        match self.evaluator.check_eligibility(selection).await? {
            Eligibility::Eligible(EligibleUnit::WholeProperty(property)) => Ok(whole_property_unit(&property)?.price),
            Eligibility::Eligible(EligibleUnit::Plot { block, .. }) => {
                Ok(compute_block_price(&block, self.env.config.price_epsilon)?.amount)
            },
            Eligibility::Ineligible(reason) => Err(BookingError::Rejected(reason)),
        }
    }
}

/// A timed-out conditional write may still have been applied; flag it for reconciliation.
fn unacknowledged_write(error: CallError, unit: &dyn fmt::Display) -> CallError {
    if let CallError::Timeout { operation, limit } = &error {
        tracing::error!(
            operation = *operation,
            unit = %unit,
            ?limit,
            "Inventory write not acknowledged in time; it may have been applied and needs reconciliation"
        );
    }
    error
}

fn slot_of(selection: &UnitSelection) -> Option<u32> {
    match selection {
        UnitSelection::Plot { slot, .. } => Some(slot.index()),
        UnitSelection::WholeProperty { .. } => None,
    }
}
