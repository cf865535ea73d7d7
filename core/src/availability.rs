//! Availability Evaluator.
//!
//! Decides, at the moment of a booking attempt, whether the selected unit can
//! still be booked. Every evaluation re-fetches the property and block rows;
//! a snapshot read earlier in the session is never trusted.

use crate::config::BookingConfig;
use crate::inventory::{InventoryError, PlotSlot};
use crate::store::{ListingStore, bounded};
use crate::types::{Block, BlockRowId, Property, PropertyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The unit a buyer wants to book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSelection {
    /// The whole property of a listing without blocks.
    WholeProperty {
        /// Property to book
        property_id: PropertyId,
    },
    /// One currently available plot of a block.
    Plot {
        /// Property the block belongs to
        property_id: PropertyId,
        /// Block row
        block: BlockRowId,
        /// Slot within the block's current availability
        slot: PlotSlot,
    },
}

impl UnitSelection {
    /// The selected property.
    #[must_use]
    pub const fn property_id(&self) -> &PropertyId {
        match self {
            Self::WholeProperty { property_id } | Self::Plot { property_id, .. } => property_id,
        }
    }

    /// The selected block, if any.
    #[must_use]
    pub const fn block(&self) -> Option<BlockRowId> {
        match self {
            Self::WholeProperty { .. } => None,
            Self::Plot { block, .. } => Some(*block),
        }
    }
}

/// Why a selection cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IneligibleReason {
    /// The block has no plots left.
    SoldOut,
    /// The block/plot combination does not exist.
    InvalidSelection,
    /// The property is not open for booking.
    PropertyUnavailable,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SoldOut => "all plots in this block are booked",
            Self::InvalidSelection => "the selected plot does not exist",
            Self::PropertyUnavailable => "the property is not available for booking",
        })
    }
}

/// Rows read during an evaluation that found the selection bookable.
#[derive(Debug, Clone, PartialEq)]
pub enum EligibleUnit {
    /// The whole property.
    WholeProperty(Property),
    /// A plot of `block`.
    Plot {
        /// The property
        property: Property,
        /// The freshly fetched block
        block: Block,
        /// The selected slot
        slot: PlotSlot,
    },
}

/// Result of [`AvailabilityEvaluator::check_eligibility`].
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    /// The selection can be booked, as of the enclosed rows.
    Eligible(EligibleUnit),
    /// The selection cannot be booked.
    Ineligible(IneligibleReason),
}

impl Eligibility {
    /// Whether the selection can be booked.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// Whole-property rule: the property must be open and must not be sold per plot.
///
/// # Errors
///
/// Returns the [`IneligibleReason`] that blocks the booking.
pub const fn evaluate_whole_property(property: &Property, has_blocks: bool) -> Result<(), IneligibleReason> {
    if !property.is_available {
        return Err(IneligibleReason::PropertyUnavailable);
    }
    if has_blocks {
        return Err(IneligibleReason::InvalidSelection);
    }
    Ok(())
}

/// Plot rule: `available_plots > 0` and `slot < available_plots`.
///
/// # Errors
///
/// Returns the [`IneligibleReason`] that blocks the booking.
pub fn evaluate_plot(block: &Block, property_id: &PropertyId, slot: PlotSlot) -> Result<(), IneligibleReason> {
    if block.property_id != *property_id {
        return Err(IneligibleReason::InvalidSelection);
    }
    if block.available_plots == 0 {
        return Err(IneligibleReason::SoldOut);
    }
    if slot.index() >= block.available_plots {
        return Err(IneligibleReason::InvalidSelection);
    }
    Ok(())
}

/// Evaluates selections against freshly fetched rows.
#[derive(Clone)]
pub struct AvailabilityEvaluator {
    listings: Arc<dyn ListingStore>,
    config: BookingConfig,
}

impl AvailabilityEvaluator {
    /// Creates a new `AvailabilityEvaluator`
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, config: BookingConfig) -> Self {
        Self { listings, config }
    }

    /// Check whether `selection` can be booked right now.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if the property does not exist
    /// - [`InventoryError::InvalidState`] if the block's counters are inconsistent
    /// - [`InventoryError::Store`] / [`InventoryError::Timeout`] on store failure
    #[tracing::instrument(skip(self), fields(property_id = %selection.property_id()))]
    pub async fn check_eligibility(&self, selection: &UnitSelection) -> Result<Eligibility, InventoryError> {
        let limit = self.config.request_timeout;
        let property_id = selection.property_id();
        let property = bounded(limit, "fetch_property", self.listings.fetch_property(property_id))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("property {property_id}")))?;

        let eligibility = match selection {
            UnitSelection::WholeProperty { .. } => {
                let blocks = bounded(limit, "fetch_blocks", self.listings.fetch_blocks(property_id)).await?;
                match evaluate_whole_property(&property, !blocks.is_empty()) {
                    Ok(()) => Eligibility::Eligible(EligibleUnit::WholeProperty(property)),
                    Err(reason) => Eligibility::Ineligible(reason),
                }
            },
            UnitSelection::Plot { block, slot, .. } => {
                if !property.is_available {
                    return Ok(Eligibility::Ineligible(IneligibleReason::PropertyUnavailable));
                }
                let Some(block) = bounded(limit, "fetch_block", self.listings.fetch_block(block)).await? else {
                    return Ok(Eligibility::Ineligible(IneligibleReason::InvalidSelection));
                };
                if !block.counters_consistent() {
                    return Err(InventoryError::InvalidState(format!(
                        "block {} has {} of {} plots available",
                        block.block_id, block.available_plots, block.total_plots
                    )));
                }
                match evaluate_plot(&block, property_id, *slot) {
                    Ok(()) => Eligibility::Eligible(EligibleUnit::Plot { property, block, slot: *slot }),
                    Err(reason) => Eligibility::Ineligible(reason),
                }
            },
        };

        tracing::debug!(eligible = eligibility.is_eligible(), "Evaluated selection");
        Ok(eligibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AreaUnit, PriceType, UserId};
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn block(available: u32) -> Block {
        Block {
            id: BlockRowId::new(),
            property_id: PropertyId::new("PROP-TN-20250101001"),
            block_id: "B".to_string(),
            block_name: "Block B".to_string(),
            total_plots: 10,
            available_plots: available,
            area_per_plot: Decimal::from(1200),
            area_unit: AreaUnit::Sqft,
            price_per_unit: Decimal::from(2500),
            total_price_per_plot: None,
        }
    }

    fn property(available: bool) -> Property {
        Property {
            id: PropertyId::new("PROP-TN-20250101001"),
            owner_id: UserId::new(),
            title: "Lake view villa plots".to_string(),
            description: String::new(),
            location: String::new(),
            district: "Coimbatore".to_string(),
            price: Some(Decimal::from(5_000_000)),
            price_type: PriceType::Total,
            is_available: available,
            is_featured: false,
            images: vec![],
            amenities: vec![],
            size_sqft: None,
            bedrooms: None,
            bathrooms: None,
            coordinates: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn whole_property_rules() {
        assert_eq!(evaluate_whole_property(&property(true), false), Ok(()));
        assert_eq!(
            evaluate_whole_property(&property(false), false),
            Err(IneligibleReason::PropertyUnavailable)
        );
        assert_eq!(
            evaluate_whole_property(&property(true), true),
            Err(IneligibleReason::InvalidSelection)
        );
    }

    #[test]
    fn last_plot_is_eligible_for_exactly_one_slot() {
        let b = block(1);
        let id = b.property_id.clone();
        assert_eq!(evaluate_plot(&b, &id, PlotSlot::new(0)), Ok(()));
        assert_eq!(evaluate_plot(&b, &id, PlotSlot::new(1)), Err(IneligibleReason::InvalidSelection));
    }

    #[test]
    fn block_of_another_property_is_invalid() {
        let b = block(5);
        assert_eq!(
            evaluate_plot(&b, &PropertyId::new("PROP-TN-20250101999"), PlotSlot::new(0)),
            Err(IneligibleReason::InvalidSelection)
        );
    }

    proptest! {
        #[test]
        fn sold_out_block_is_never_eligible(slot in any::<u32>()) {
            let b = block(0);
            let id = b.property_id.clone();
            prop_assert_eq!(evaluate_plot(&b, &id, PlotSlot::new(slot)), Err(IneligibleReason::SoldOut));
        }

        #[test]
        fn eligible_iff_slot_in_range(available in 1u32..=10, slot in 0u32..64) {
            let b = block(available);
            let id = b.property_id.clone();
            let result = evaluate_plot(&b, &id, PlotSlot::new(slot));
            if slot < available {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(IneligibleReason::InvalidSelection));
            }
        }
    }
}
