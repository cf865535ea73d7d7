//! Inventory model: the purchasable units of a property.
//!
//! A property is sold either as one whole unit at its base price, or per plot
//! in each of its blocks. Plots are not stored individually; a block only
//! carries an `available_plots` counter, which is the unit of truth.
//! [`PlotSlot`] is a synthetic index into the currently available plots,
//! recomputed on every read and never persisted.
//!
//! # Pricing
//!
//! A block's per-plot price is `round(area_per_plot * price_per_unit)`. A
//! stored `total_price_per_plot` is honoured only while it stays within the
//! configured epsilon of that derived value; otherwise the derived price wins
//! and a [`PriceMismatch`] warning is reported.

use crate::config::BookingConfig;
use crate::error::Recovery;
use crate::store::{CallError, ListingStore, StoreError, bounded};
use crate::types::{AreaUnit, Block, BlockRowId, PriceType, Property, PropertyId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors produced while reading inventory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The referenced property or block does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data violates an inventory invariant.
    #[error("invalid inventory state: {0}")]
    InvalidState(String),

    /// The store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store call did not finish in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Name of the store operation
        operation: &'static str,
        /// The limit that was exceeded
        limit: Duration,
    },
}

impl InventoryError {
    /// How the caller should react.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::NotFound(_) => Recovery::None,
            Self::InvalidState(_) | Self::Store(_) | Self::Timeout { .. } => Recovery::RetryLater,
        }
    }
}

impl From<CallError> for InventoryError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(store) => Self::Store(store),
            CallError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

// ============================================================================
// Pricing
// ============================================================================

/// `round(area * unit_price)` to whole currency units, halves away from zero.
///
/// `None` if the product does not fit a `Decimal`.
#[must_use]
pub fn derived_price(area_per_plot: Decimal, price_per_unit: Decimal) -> Option<Decimal> {
    area_per_plot
        .checked_mul(price_per_unit)
        .map(|product| product.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Whether `stored` lies within `epsilon` of `derived`.
#[must_use]
pub fn within_epsilon(stored: Decimal, derived: Decimal, epsilon: Decimal) -> bool {
    // A difference too large to represent is certainly beyond epsilon.
    stored.checked_sub(derived).is_some_and(|difference| difference.abs() <= epsilon)
}

/// A stored per-plot price that disagrees with the derived price.
///
/// Non-fatal: the derived price is used and the mismatch is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMismatch {
    /// Block row
    pub block: BlockRowId,
    /// Block label
    pub block_label: String,
    /// The stored `total_price_per_plot`
    pub stored: Decimal,
    /// `round(area_per_plot * price_per_unit)`
    pub derived: Decimal,
}

impl fmt::Display for PriceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} stores price {} but area x unit price gives {}",
            self.block_label, self.stored, self.derived
        )
    }
}

/// Per-plot price after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPrice {
    /// The price to quote and to snapshot into bookings
    pub amount: Decimal,
    /// Set when the stored price was discarded
    pub mismatch: Option<PriceMismatch>,
}

/// Reconcile a block's stored per-plot price with its derived price.
///
/// Returns the stored price if present and within `epsilon` of the derived
/// value, otherwise the derived value (with a mismatch warning when a stored
/// price was discarded).
///
/// # Errors
///
/// Returns [`InventoryError::InvalidState`] if area x unit price overflows.
pub fn compute_block_price(block: &Block, epsilon: Decimal) -> Result<ReconciledPrice, InventoryError> {
    let derived = derived_price(block.area_per_plot, block.price_per_unit).ok_or_else(|| {
        InventoryError::InvalidState(format!(
            "block {} price overflows: {} x {}",
            block.block_id, block.area_per_plot, block.price_per_unit
        ))
    })?;
    Ok(match block.total_price_per_plot {
        None => ReconciledPrice { amount: derived, mismatch: None },
        Some(stored) if within_epsilon(stored, derived, epsilon) => ReconciledPrice { amount: stored, mismatch: None },
        Some(stored) => ReconciledPrice {
            amount: derived,
            mismatch: Some(PriceMismatch {
                block: block.id,
                block_label: block.block_id.clone(),
                stored,
                derived,
            }),
        },
    })
}

/// Emit the log line and metric for a discarded stored price.
pub(crate) fn report_mismatch(mismatch: &PriceMismatch) {
    tracing::warn!(
        block = %mismatch.block,
        block_label = %mismatch.block_label,
        stored = %mismatch.stored,
        derived = %mismatch.derived,
        "Stored per-plot price diverges from area x unit price; using derived price"
    );
    metrics::counter!("inventory.price_mismatch").increment(1);
}

// ============================================================================
// Units
// ============================================================================

/// Synthetic, zero-based index of one currently available plot in a block.
///
/// Valid only against the snapshot it was read from; shown to buyers as
/// "Plot n" with `n = index + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlotSlot(u32);

impl PlotSlot {
    /// Slot at a zero-based index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Slot from the one-based number shown to buyers.
    #[must_use]
    pub const fn from_display_number(number: u32) -> Option<Self> {
        match number.checked_sub(1) {
            Some(index) => Some(Self(index)),
            None => None,
        }
    }

    /// Zero-based index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// One-based number shown to buyers.
    #[must_use]
    pub fn display_number(self) -> u64 {
        u64::from(self.0) + 1
    }
}

impl fmt::Display for PlotSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plot {}", self.display_number())
    }
}

/// The single purchasable unit of a property without blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WholePropertyUnit {
    /// Property
    pub property_id: PropertyId,
    /// Listing title
    pub title: String,
    /// Base price (present and non-negative)
    pub price: Decimal,
    /// How the price is quoted
    pub price_type: PriceType,
    /// Whether the property can be booked now
    pub is_available: bool,
}

/// One block of a property with its reconciled price and current plot slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockUnit {
    /// Block row
    pub block: BlockRowId,
    /// Block label
    pub block_id: String,
    /// Display name
    pub block_name: String,
    /// Plots created with the block
    pub total_plots: u32,
    /// Plots still bookable
    pub available_plots: u32,
    /// Area of one plot
    pub area_per_plot: Decimal,
    /// Unit of `area_per_plot`
    pub area_unit: AreaUnit,
    /// Price per unit of area
    pub price_per_unit: Decimal,
    /// Reconciled per-plot price
    pub price_per_plot: Decimal,
    /// Slots `0..available_plots`
    pub plots: Vec<PlotSlot>,
}

impl BlockUnit {
    /// Whether no plot can be booked.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.available_plots == 0
    }
}

/// The purchasable view of a property. The two variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchasableUnits {
    /// Sold as a single unit at the base price.
    WholeProperty(WholePropertyUnit),
    /// Sold per plot, blocks ordered by label.
    Blocks(Vec<BlockUnit>),
}

/// Result of [`Inventory::list_units`]: the units plus any price warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitListing {
    /// The purchasable units
    pub units: PurchasableUnits,
    /// Stored prices that were discarded during reconciliation
    pub warnings: Vec<PriceMismatch>,
}

/// Build the whole-property unit, checking the base price invariant.
///
/// # Errors
///
/// Returns [`InventoryError::InvalidState`] if the price is missing or negative.
pub fn whole_property_unit(property: &Property) -> Result<WholePropertyUnit, InventoryError> {
    match property.price {
        Some(price) if !price.is_sign_negative() => Ok(WholePropertyUnit {
            property_id: property.id.clone(),
            title: property.title.clone(),
            price,
            price_type: property.price_type,
            is_available: property.is_available,
        }),
        Some(price) => Err(InventoryError::InvalidState(format!(
            "property {} has negative price {price}",
            property.id
        ))),
        None => Err(InventoryError::InvalidState(format!(
            "property {} has no blocks and no price",
            property.id
        ))),
    }
}

/// Build a block unit from a stored block.
///
/// # Errors
///
/// Returns [`InventoryError::InvalidState`] if the counters are inconsistent
/// or the price cannot be computed.
pub fn block_unit(block: &Block, epsilon: Decimal) -> Result<(BlockUnit, Option<PriceMismatch>), InventoryError> {
    if !block.counters_consistent() {
        return Err(InventoryError::InvalidState(format!(
            "block {} has {} of {} plots available",
            block.block_id, block.available_plots, block.total_plots
        )));
    }
    let price = compute_block_price(block, epsilon)?;
    let unit = BlockUnit {
        block: block.id,
        block_id: block.block_id.clone(),
        block_name: block.block_name.clone(),
        total_plots: block.total_plots,
        available_plots: block.available_plots,
        area_per_plot: block.area_per_plot,
        area_unit: block.area_unit,
        price_per_unit: block.price_per_unit,
        price_per_plot: price.amount,
        plots: (0..block.available_plots).map(PlotSlot::new).collect(),
    };
    Ok((unit, price.mismatch))
}

// ============================================================================
// Inventory service
// ============================================================================

/// Reads the purchasable units of properties from the listing store.
#[derive(Clone)]
pub struct Inventory {
    listings: Arc<dyn ListingStore>,
    config: BookingConfig,
}

impl Inventory {
    /// Creates a new `Inventory`
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, config: BookingConfig) -> Self {
        Self { listings, config }
    }

    /// Produce the purchasable-unit view of a property.
    ///
    /// Calling this twice with no intervening writes yields equal `units`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if the property does not exist
    /// - [`InventoryError::InvalidState`] if a block-less property has no valid
    ///   price, or a block's counters are inconsistent
    /// - [`InventoryError::Store`] / [`InventoryError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(property_id = %property_id))]
    pub async fn list_units(&self, property_id: &PropertyId) -> Result<UnitListing, InventoryError> {
        let limit = self.config.request_timeout;
        let property = bounded(limit, "fetch_property", self.listings.fetch_property(property_id))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("property {property_id}")))?;
        let blocks = bounded(limit, "fetch_blocks", self.listings.fetch_blocks(property_id)).await?;

        if blocks.is_empty() {
            let unit = whole_property_unit(&property).inspect_err(|error| {
                tracing::error!(%error, "Block-less property cannot be listed");
            })?;
            return Ok(UnitListing { units: PurchasableUnits::WholeProperty(unit), warnings: Vec::new() });
        }

        let mut units = Vec::with_capacity(blocks.len());
        let mut warnings = Vec::new();
        for block in &blocks {
            let (unit, mismatch) = block_unit(block, self.config.price_epsilon)?;
            if let Some(mismatch) = mismatch {
                report_mismatch(&mismatch);
                warnings.push(mismatch);
            }
            units.push(unit);
        }
        units.sort_by(|a, b| a.block_id.cmp(&b.block_id));

        tracing::debug!(blocks = units.len(), "Listed block units");
        Ok(UnitListing { units: PurchasableUnits::Blocks(units), warnings })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::PropertyId;
    use proptest::prelude::*;

    fn block(area: i64, unit_price: i64, stored: Option<Decimal>) -> Block {
        Block {
            id: BlockRowId::new(),
            property_id: PropertyId::new("PROP-TN-20250101001"),
            block_id: "A".to_string(),
            block_name: "Block A".to_string(),
            total_plots: 50,
            available_plots: 50,
            area_per_plot: Decimal::from(area),
            area_unit: AreaUnit::Sqft,
            price_per_unit: Decimal::from(unit_price),
            total_price_per_plot: stored,
        }
    }

    #[test]
    fn derives_price_from_area_and_unit_price() {
        let price = compute_block_price(&block(1200, 2500, None), DEFAULT_EPSILON).unwrap();
        assert_eq!(price.amount, Decimal::from(3_000_000));
        assert!(price.mismatch.is_none());
    }

    #[test]
    fn rounds_fractional_products_half_away_from_zero() {
        assert_eq!(derived_price(Decimal::new(25, 1), Decimal::new(3, 0)), Some(Decimal::new(8, 0)));
        assert_eq!(derived_price(Decimal::new(24, 1), Decimal::new(3, 0)), Some(Decimal::new(7, 0)));
    }

    #[test]
    fn keeps_stored_price_within_epsilon() {
        let stored = Decimal::new(30_000_004, 1); // 3,000,000.4
        let price = compute_block_price(&block(1200, 2500, Some(stored)), DEFAULT_EPSILON).unwrap();
        assert_eq!(price.amount, stored);
        assert!(price.mismatch.is_none());
    }

    #[test]
    fn replaces_divergent_stored_price_and_warns() {
        let stored = Decimal::from(2_800_000);
        let b = block(1200, 2500, Some(stored));
        let price = compute_block_price(&b, DEFAULT_EPSILON).unwrap();
        assert_eq!(price.amount, Decimal::from(3_000_000));
        let mismatch = price.mismatch.unwrap();
        assert_eq!(mismatch.stored, stored);
        assert_eq!(mismatch.derived, Decimal::from(3_000_000));
        assert_eq!(mismatch.block, b.id);
        assert!(mismatch.to_string().contains("block A"));
    }

    #[test]
    fn overflowing_price_is_invalid_state_not_a_panic() {
        let mut b = block(1, 1, None);
        b.area_per_plot = Decimal::from(10_000_000_000_000_000_i64);
        b.price_per_unit = Decimal::from(10_000_000_000_000_000_i64);
        assert_eq!(derived_price(b.area_per_plot, b.price_per_unit), None);
        assert!(matches!(compute_block_price(&b, DEFAULT_EPSILON), Err(InventoryError::InvalidState(_))));
        assert!(matches!(block_unit(&b, DEFAULT_EPSILON), Err(InventoryError::InvalidState(_))));
    }

    #[test]
    fn unrepresentable_price_gap_counts_as_mismatch() {
        let b = block(1200, 2500, Some(Decimal::MIN));
        let price = compute_block_price(&b, DEFAULT_EPSILON).unwrap();
        assert_eq!(price.amount, Decimal::from(3_000_000));
        assert_eq!(price.mismatch.unwrap().stored, Decimal::MIN);
        assert!(!within_epsilon(Decimal::MAX, Decimal::MIN, DEFAULT_EPSILON));
    }

    #[test]
    fn whole_property_requires_non_negative_price() {
        let now = chrono::Utc::now();
        let mut property = Property {
            id: PropertyId::new("PROP-TN-20250101002"),
            owner_id: crate::types::UserId::new(),
            title: "Farmland".to_string(),
            description: String::new(),
            location: String::new(),
            district: "Salem".to_string(),
            price: None,
            price_type: PriceType::Total,
            is_available: true,
            is_featured: false,
            images: vec![],
            amenities: vec![],
            size_sqft: None,
            bedrooms: None,
            bathrooms: None,
            coordinates: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(whole_property_unit(&property), Err(InventoryError::InvalidState(_))));

        property.price = Some(Decimal::from(-1));
        assert!(matches!(whole_property_unit(&property), Err(InventoryError::InvalidState(_))));

        property.price = Some(Decimal::ZERO);
        assert_eq!(whole_property_unit(&property).unwrap().price, Decimal::ZERO);
    }

    #[test]
    fn block_unit_lists_current_slots() {
        let mut b = block(1200, 2500, None);
        b.available_plots = 3;
        let (unit, _) = block_unit(&b, DEFAULT_EPSILON).unwrap();
        assert_eq!(unit.plots, vec![PlotSlot::new(0), PlotSlot::new(1), PlotSlot::new(2)]);
        assert_eq!(unit.plots[2].to_string(), "Plot 3");

        b.available_plots = 51;
        assert!(matches!(block_unit(&b, DEFAULT_EPSILON), Err(InventoryError::InvalidState(_))));
    }

    #[test]
    fn plot_slot_display_numbers() {
        assert_eq!(PlotSlot::from_display_number(7), Some(PlotSlot::new(6)));
        assert_eq!(PlotSlot::from_display_number(0), None);
        assert_eq!(PlotSlot::new(u32::MAX).display_number(), 4_294_967_296);
        assert_eq!(PlotSlot::new(u32::MAX).to_string(), "Plot 4294967296");
    }

    const DEFAULT_EPSILON: Decimal = crate::config::DEFAULT_PRICE_EPSILON;

    proptest! {
        #[test]
        fn unstored_price_always_equals_rounded_product(
            area_centi in 1i64..10_000_000,
            unit_centi in 0i64..10_000_000,
        ) {
            let mut b = block(1, 1, None);
            b.area_per_plot = Decimal::new(area_centi, 2);
            b.price_per_unit = Decimal::new(unit_centi, 2);
            let expected = (b.area_per_plot * b.price_per_unit)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            let price = compute_block_price(&b, DEFAULT_EPSILON).unwrap();
            prop_assert_eq!(price.amount, expected);
            prop_assert!(price.mismatch.is_none());
        }

        #[test]
        fn reconciled_price_never_strays_beyond_epsilon(
            area in 1i64..100_000,
            unit in 0i64..100_000,
            offset_centi in -100_000i64..100_000,
        ) {
            let derived = derived_price(Decimal::from(area), Decimal::from(unit)).unwrap();
            let stored = derived + Decimal::new(offset_centi, 2);
            let price = compute_block_price(&block(area, unit, Some(stored)), DEFAULT_EPSILON).unwrap();
            prop_assert!((price.amount - derived).abs() <= DEFAULT_EPSILON);
            prop_assert_eq!(price.mismatch.is_some(), (stored - derived).abs() > DEFAULT_EPSILON);
        }
    }
}
