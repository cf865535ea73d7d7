//! # Plotbook Core
//!
//! Plot inventory, booking and listing core for the Plotbook real-estate
//! marketplace.
//!
//! A property is either sold whole at its base price or split into blocks of
//! interchangeable plots, each block carrying its own per-plot price and an
//! `available_plots` counter. This crate owns the rules around that
//! inventory; persistence, object storage and realtime delivery are injected
//! through traits.
//!
//! ## Components
//!
//! - **Inventory Model** ([`inventory`]): purchasable-unit view of a property
//!   and block price reconciliation
//! - **Availability Evaluator** ([`availability`]): eligibility of a selection
//!   against freshly fetched rows
//! - **Booking Committer** ([`booking`]): conditional inventory write plus
//!   booking insert, with compensation, and owner status transitions
//! - **Listings** ([`listing`]), **explore filters** ([`search`]), **saved
//!   properties** ([`favorites`]) and **messaging** ([`messaging`])
//!
//! ## Architecture Principles
//!
//! - Dependency injection: every service takes `Arc<dyn Trait>` collaborators
//! - Conditional writes at the store boundary, never read-then-write
//! - Explicit errors with a [`Recovery`](error::Recovery) classification
//!
//! ## Example
//!
//! ```ignore
//! use plotbook_core::availability::UnitSelection;
//! use plotbook_core::booking::{BookingCommitter, BookingEnvironment, BookingRequest};
//!
//! let committer = BookingCommitter::new(BookingEnvironment::new(
//!     listings, bookings, Arc::new(SystemClock), config.booking.clone(),
//! ));
//! let booking = committer
//!     .book(BookingRequest {
//!         selection: UnitSelection::Plot { property_id, block, slot: PlotSlot::new(0) },
//!         buyer,
//!         notes: None,
//!     })
//!     .await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;

/// Purchasable-unit view and price reconciliation
pub mod inventory;

/// Eligibility checks at booking time
pub mod availability;

/// Booking commits and owner status transitions
pub mod booking;

/// Listing management for owners
pub mod listing;

/// Explore filters
pub mod search;

/// Saved properties
pub mod favorites;

/// Derived conversations and message delivery
pub mod messaging;

/// Domain types
pub mod types;

/// Store traits and bounded store calls
pub mod store;

/// Object storage trait
pub mod storage;

/// Realtime message feed
pub mod realtime;

/// Clock and other injected dependencies
pub mod environment;

/// Recovery classification for errors
pub mod error;

/// Configuration from environment variables
pub mod config;

pub use availability::{AvailabilityEvaluator, Eligibility, IneligibleReason, UnitSelection};
pub use booking::{BookingCommitter, BookingEnvironment, BookingError, BookingRequest};
pub use config::Config;
pub use error::Recovery;
pub use inventory::{Inventory, InventoryError, PlotSlot, PurchasableUnits, compute_block_price};
pub use types::{Block, BlockRowId, Booking, BookingId, BookingStatus, Message, Property, PropertyId, UserId};
