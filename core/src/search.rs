//! Explore filters.
//!
//! A [`PropertyFilter`] composes independent criteria with `and`. Results are
//! ordered featured first, then newest first.

use crate::config::BookingConfig;
use crate::store::{CallError, ListingStore, bounded};
use crate::types::{PriceType, Property};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inclusive price bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    /// Lower bound
    pub min: Option<Decimal>,
    /// Upper bound
    pub max: Option<Decimal>,
}

impl PriceRange {
    /// Range between `min` and `max`, swapping reversed ends.
    #[must_use]
    pub fn new(min: Option<Decimal>, max: Option<Decimal>) -> Self {
        Self { min, max }.normalized()
    }

    /// The same range with `min <= max`.
    #[must_use]
    pub fn normalized(self) -> Self {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min > max => Self { min: Some(max), max: Some(min) },
            _ => self,
        }
    }

    /// Whether neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether `price` lies in the range. An unpriced listing only matches an unbounded range.
    #[must_use]
    pub fn contains(&self, price: Option<Decimal>) -> bool {
        let range = self.normalized();
        match price {
            None => range.is_unbounded(),
            Some(price) => range.min.is_none_or(|min| price >= min) && range.max.is_none_or(|max| price <= max),
        }
    }
}

/// Explore criteria. The default filter matches every listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    /// Base price bounds
    pub price_range: PriceRange,
    /// Exact district, case-insensitive
    pub district: Option<String>,
    /// How the price is quoted
    pub price_type: Option<PriceType>,
    /// Every one of these amenities must be present
    pub amenities: Vec<String>,
    /// Minimum size in square feet
    pub min_size_sqft: Option<u32>,
    /// Case-insensitive text found in title, description, location or district
    pub text: Option<String>,
    /// Skip listings closed for booking
    pub only_available: bool,
    /// Only promoted listings
    pub featured_only: bool,
}

impl PropertyFilter {
    /// Whether `property` passes every criterion.
    #[must_use]
    pub fn matches(&self, property: &Property) -> bool {
        if self.only_available && !property.is_available {
            return false;
        }
        if self.featured_only && !property.is_featured {
            return false;
        }
        if !self.price_range.contains(property.price) {
            return false;
        }
        if let Some(district) = self.district.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            if !property.district.trim().eq_ignore_ascii_case(district) {
                return false;
            }
        }
        if self.price_type.is_some_and(|price_type| price_type != property.price_type) {
            return false;
        }
        if let Some(min) = self.min_size_sqft {
            if property.size_sqft.is_none_or(|size| size < min) {
                return false;
            }
        }
        let has_amenity =
            |wanted: &String| property.amenities.iter().any(|a| a.trim().eq_ignore_ascii_case(wanted.trim()));
        if !self.amenities.iter().all(has_amenity) {
            return false;
        }
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            let found = [&property.title, &property.description, &property.location, &property.district]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }
        true
    }

    /// Keep the matching properties, featured first, then newest first.
    #[must_use]
    pub fn apply(&self, properties: Vec<Property>) -> Vec<Property> {
        let mut matching: Vec<Property> = properties.into_iter().filter(|p| self.matches(p)).collect();
        matching.sort_by(|a, b| b.is_featured.cmp(&a.is_featured).then_with(|| b.created_at.cmp(&a.created_at)));
        matching
    }
}

/// Buyer-facing listing search.
#[derive(Clone)]
pub struct PropertySearch {
    listings: Arc<dyn ListingStore>,
    config: BookingConfig,
}

impl PropertySearch {
    /// Creates a new `PropertySearch`
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, config: BookingConfig) -> Self {
        Self { listings, config }
    }

    /// Listings matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] if the store call fails or times out.
    pub async fn explore(&self, filter: &PropertyFilter) -> Result<Vec<Property>, CallError> {
        let properties =
            bounded(self.config.request_timeout, "list_properties", self.listings.list_properties()).await?;
        let total = properties.len();
        let matching = filter.apply(properties);
        tracing::debug!(total, matching = matching.len(), "Explored listings");
        Ok(matching)
    }
}
