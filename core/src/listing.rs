//! Listing management: posting, editing and removing properties.
//!
//! Owners create a listing with an optional set of blocks. A listing without
//! blocks is sold whole at its base price; a listing with blocks is sold per
//! plot. Every mutating operation is owner-gated.

use crate::config::{BookingConfig, ListingConfig};
use crate::environment::Clock;
use crate::error::Recovery;
use crate::inventory::{derived_price, within_epsilon};
use crate::storage::{ObjectStorage, StorageError, validate_object_path};
use crate::store::{BookingStore, CallError, Conditional, ListingStore, StoreError, bounded};
use crate::types::{
    AreaUnit, Block, BlockRowId, Booking, BookingStatus, GeoPoint, PriceType, Property, PropertyId, UserId,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Attempts at finding an unused property id before giving up.
const ID_ATTEMPTS: usize = 3;

/// Errors returned by listing management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// The submitted listing data is invalid.
    #[error("invalid listing: {0}")]
    Validation(String),

    /// The property does not exist.
    #[error("property not found: {0}")]
    NotFound(PropertyId),

    /// The caller does not own the property.
    #[error("only the owner can manage this listing")]
    Unauthorized,

    /// The uploaded file is not an image.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The uploaded file is empty or too large.
    #[error("image size {size} bytes is outside 1..={limit}")]
    ImageSize {
        /// Size of the upload
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// No unused property id was found.
    #[error("could not allocate a property id after {0} attempts")]
    IdExhausted(usize),

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A store call did not finish in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Name of the store operation
        operation: &'static str,
        /// The limit that was exceeded
        limit: Duration,
    },

    /// Object storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ListingError {
    /// How the caller should react.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::Validation(_) | Self::UnsupportedContentType(_) | Self::ImageSize { .. } => Recovery::FixInput,
            Self::NotFound(_) | Self::Unauthorized => Recovery::None,
            Self::IdExhausted(_) | Self::Store(_) | Self::Timeout { .. } | Self::Storage(_) => Recovery::RetryLater,
        }
    }
}

impl From<CallError> for ListingError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(store) => Self::Store(store),
            CallError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

/// A block submitted with a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlock {
    /// Short label, unique within the listing
    pub block_id: String,
    /// Display name; defaults to "Block <label>"
    pub block_name: Option<String>,
    /// Number of plots
    pub total_plots: u32,
    /// Area of one plot
    pub area_per_plot: Decimal,
    /// Unit of `area_per_plot`
    pub area_unit: AreaUnit,
    /// Price per unit of area
    pub price_per_unit: Decimal,
    /// Explicit per-plot price; derived from area and unit price when absent
    pub total_price_per_plot: Option<Decimal>,
}

/// A listing submitted by an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    /// Headline
    pub title: String,
    /// Description
    pub description: String,
    /// Address or landmark
    pub location: String,
    /// District
    pub district: String,
    /// Base price; required when there are no blocks
    pub price: Option<Decimal>,
    /// How the base price is quoted
    pub price_type: PriceType,
    /// Amenity labels
    pub amenities: Vec<String>,
    /// Size in square feet
    pub size_sqft: Option<u32>,
    /// Bedroom count
    pub bedrooms: Option<u16>,
    /// Bathroom count
    pub bathrooms: Option<u16>,
    /// Map position
    pub coordinates: Option<GeoPoint>,
    /// Blocks to sell per plot
    pub blocks: Vec<NewBlock>,
}

/// A property together with its blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// The property
    pub property: Property,
    /// Its blocks, ordered by label
    pub blocks: Vec<Block>,
}

/// Owner edits to a listing. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyPatch {
    /// New headline
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New address
    pub location: Option<String>,
    /// New district
    pub district: Option<String>,
    /// New base price; `Some(None)` clears it
    pub price: Option<Option<Decimal>>,
    /// New price type
    pub price_type: Option<PriceType>,
    /// New size
    pub size_sqft: Option<Option<u32>>,
    /// New bedroom count
    pub bedrooms: Option<Option<u16>>,
    /// New bathroom count
    pub bathrooms: Option<Option<u16>>,
    /// Replacement amenity list
    pub amenities: Option<Vec<String>>,
    /// Open or close the listing for booking. Applied as a conditional
    /// claim or release, never as part of the field write.
    pub is_available: Option<bool>,
    /// Promote the listing
    pub is_featured: Option<bool>,
    /// Replacement image list
    pub images: Option<Vec<String>>,
}

impl PropertyPatch {
    fn apply(self, property: &mut Property) {
        if let Some(title) = self.title {
            property.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            property.description = description;
        }
        if let Some(location) = self.location {
            property.location = location;
        }
        if let Some(district) = self.district {
            property.district = district.trim().to_string();
        }
        if let Some(price) = self.price {
            property.price = price;
        }
        if let Some(price_type) = self.price_type {
            property.price_type = price_type;
        }
        if let Some(size) = self.size_sqft {
            property.size_sqft = size;
        }
        if let Some(bedrooms) = self.bedrooms {
            property.bedrooms = bedrooms;
        }
        if let Some(bathrooms) = self.bathrooms {
            property.bathrooms = bathrooms;
        }
        if let Some(amenities) = self.amenities {
            property.amenities = normalize_amenities(amenities);
        }
        if let Some(featured) = self.is_featured {
            property.is_featured = featured;
        }
        if let Some(images) = self.images {
            property.images = images;
        }
    }
}

/// Per-property booking overview for owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDashboard {
    /// Bookings, newest first
    pub bookings: Vec<Booking>,
    /// Number of bookings
    pub total: usize,
    /// Awaiting the owner
    pub pending: usize,
    /// Accepted
    pub confirmed: usize,
    /// Rejected or withdrawn
    pub cancelled: usize,
    /// Sum of confirmed booking prices
    pub confirmed_revenue: Decimal,
}

impl BookingDashboard {
    /// Summarise a property's bookings.
    #[must_use]
    pub fn from_bookings(bookings: Vec<Booking>) -> Self {
        let count = |status| bookings.iter().filter(|b| b.status == status).count();
        let pending = count(BookingStatus::Pending);
        let confirmed = count(BookingStatus::Confirmed);
        let cancelled = count(BookingStatus::Cancelled);
        let confirmed_revenue = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| b.total_price)
            .sum();
        Self { total: bookings.len(), pending, confirmed, cancelled, confirmed_revenue, bookings }
    }
}

fn normalize_amenities(amenities: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    amenities
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty() && seen.insert(a.to_lowercase()))
        .collect()
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-').to_string();
    if cleaned.is_empty() { "image".to_string() } else { cleaned }
}

/// Check the submitted blocks and turn them into rows for `property_id`.
///
/// # Errors
///
/// Returns [`ListingError::Validation`] describing the first invalid block.
pub fn build_blocks(
    property_id: &PropertyId,
    blocks: Vec<NewBlock>,
    epsilon: Decimal,
) -> Result<Vec<Block>, ListingError> {
    let mut labels = HashSet::new();
    let mut rows = Vec::with_capacity(blocks.len());
    for new in blocks {
        let label = new.block_id.trim().to_string();
        if label.is_empty() {
            return Err(ListingError::Validation("block label must not be empty".to_string()));
        }
        if !labels.insert(label.to_lowercase()) {
            return Err(ListingError::Validation(format!("duplicate block label {label}")));
        }
        if new.total_plots == 0 {
            return Err(ListingError::Validation(format!("block {label} needs at least one plot")));
        }
        if new.area_per_plot <= Decimal::ZERO {
            return Err(ListingError::Validation(format!("block {label} needs a positive plot area")));
        }
        if new.price_per_unit.is_sign_negative() {
            return Err(ListingError::Validation(format!("block {label} has a negative unit price")));
        }
        let derived = derived_price(new.area_per_plot, new.price_per_unit).ok_or_else(|| {
            ListingError::Validation(format!("block {label} area x unit price is too large"))
        })?;
        if let Some(stored) = new.total_price_per_plot {
            if !within_epsilon(stored, derived, epsilon) {
                return Err(ListingError::Validation(format!(
                    "block {label} price per plot {stored} does not match area x unit price {derived}"
                )));
            }
        }
        rows.push(Block {
            id: BlockRowId::new(),
            property_id: property_id.clone(),
            block_name: new
                .block_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Block {label}")),
            block_id: label,
            total_plots: new.total_plots,
            available_plots: new.total_plots,
            area_per_plot: new.area_per_plot,
            area_unit: new.area_unit,
            price_per_unit: new.price_per_unit,
            total_price_per_plot: Some(new.total_price_per_plot.unwrap_or(derived)),
        });
    }
    rows.sort_by(|a, b| a.block_id.cmp(&b.block_id));
    Ok(rows)
}

fn validate_property(property: &Property, has_blocks: bool) -> Result<(), ListingError> {
    if property.title.trim().is_empty() {
        return Err(ListingError::Validation("title must not be empty".to_string()));
    }
    if property.district.trim().is_empty() {
        return Err(ListingError::Validation("district must not be empty".to_string()));
    }
    match property.price {
        Some(price) if price.is_sign_negative() => {
            Err(ListingError::Validation(format!("price must not be negative, got {price}")))
        },
        None if !has_blocks => {
            Err(ListingError::Validation("a listing without blocks needs a price".to_string()))
        },
        _ => Ok(()),
    }
}

fn random_suffix() -> u16 {
    rand::thread_rng().gen_range(0..1000)
}

/// Environment dependencies for listing management
#[derive(Clone)]
pub struct ListingEnvironment {
    /// Properties and blocks
    pub listings: Arc<dyn ListingStore>,
    /// Booking records, for the owner dashboard
    pub bookings: Arc<dyn BookingStore>,
    /// Image storage
    pub storage: Arc<dyn ObjectStorage>,
    /// Clock for timestamps and ids
    pub clock: Arc<dyn Clock>,
    /// Region code, image bucket and size limit
    pub listing: ListingConfig,
    /// Store timeout and price epsilon
    pub booking: BookingConfig,
}

/// Owner-facing listing management.
#[derive(Clone)]
pub struct ListingService {
    env: ListingEnvironment,
}

impl ListingService {
    /// Creates a new `ListingService`
    #[must_use]
    pub const fn new(env: ListingEnvironment) -> Self {
        Self { env }
    }

    fn limit(&self) -> Duration {
        self.env.booking.request_timeout
    }

    async fn owned_property(&self, caller: &UserId, property_id: &PropertyId) -> Result<Property, ListingError> {
        let property = bounded(self.limit(), "fetch_property", self.env.listings.fetch_property(property_id))
            .await?
            .ok_or_else(|| ListingError::NotFound(property_id.clone()))?;
        if !property.is_owned_by(caller) {
            tracing::warn!(caller = %caller, property_id = %property_id, "Listing change attempted by non-owner");
            return Err(ListingError::Unauthorized);
        }
        Ok(property)
    }

    /// Publish a new listing owned by `owner`.
    ///
    /// Blocks start with every plot available.
    ///
    /// # Errors
    ///
    /// - [`ListingError::Validation`] for invalid fields or blocks
    /// - [`ListingError::IdExhausted`] if every generated id was taken
    /// - [`ListingError::Store`] / [`ListingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(owner = %owner, title = %listing.title))]
    pub async fn create_listing(&self, owner: &UserId, listing: NewListing) -> Result<Listing, ListingError> {
        let now = self.env.clock.now();
        let has_blocks = !listing.blocks.is_empty();
        let mut property = Property {
            id: PropertyId::generate(&self.env.listing.region_code, now, random_suffix()),
            owner_id: *owner,
            title: listing.title.trim().to_string(),
            description: listing.description,
            location: listing.location,
            district: listing.district.trim().to_string(),
            price: listing.price,
            price_type: listing.price_type,
            is_available: true,
            is_featured: false,
            images: Vec::new(),
            amenities: normalize_amenities(listing.amenities),
            size_sqft: listing.size_sqft,
            bedrooms: listing.bedrooms,
            bathrooms: listing.bathrooms,
            coordinates: listing.coordinates,
            created_at: now,
            updated_at: now,
        };
        validate_property(&property, has_blocks)?;
        // Re-keyed below if the id has to be regenerated.
        let blocks = build_blocks(&property.id, listing.blocks, self.env.booking.price_epsilon)?;

        let mut inserted = None;
        for attempt in 1..=ID_ATTEMPTS {
            match bounded(self.limit(), "insert_property", self.env.listings.insert_property(property.clone())).await {
                Ok(stored) => {
                    inserted = Some(stored);
                    break;
                },
                Err(CallError::Store(StoreError::Duplicate(_))) => {
                    tracing::debug!(attempt, property_id = %property.id, "Property id taken, regenerating");
                    property.id = PropertyId::generate(&self.env.listing.region_code, now, random_suffix());
                },
                Err(error) => return Err(error.into()),
            }
        }
        let property = inserted.ok_or(ListingError::IdExhausted(ID_ATTEMPTS))?;

        let blocks: Vec<Block> =
            blocks.into_iter().map(|block| Block { property_id: property.id.clone(), ..block }).collect();
        let blocks = if blocks.is_empty() {
            blocks
        } else {
            match bounded(self.limit(), "insert_blocks", self.env.listings.insert_blocks(blocks)).await {
                Ok(blocks) => blocks,
                Err(error) => {
                    tracing::warn!(%error, property_id = %property.id, "Block insert failed; removing property");
                    if let Err(cleanup) =
                        bounded(self.limit(), "delete_property", self.env.listings.delete_property(&property.id)).await
                    {
                        tracing::error!(%cleanup, property_id = %property.id, "Failed to remove partial listing");
                    }
                    return Err(error.into());
                },
            }
        };

        tracing::info!(property_id = %property.id, blocks = blocks.len(), "Listing created");
        Ok(Listing { property, blocks })
    }

    /// Apply an owner's edits to a listing.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] / [`ListingError::Unauthorized`]
    /// - [`ListingError::Validation`] if the edited listing is invalid
    /// - [`ListingError::Store`] / [`ListingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(property_id = %property_id))]
    pub async fn update_listing(
        &self,
        caller: &UserId,
        property_id: &PropertyId,
        patch: PropertyPatch,
    ) -> Result<Property, ListingError> {
        let mut property = self.owned_property(caller, property_id).await?;
        let clears_price = matches!(patch.price, Some(None));
        let availability = patch.is_available;
        patch.apply(&mut property);
        property.updated_at = self.env.clock.now();

        let has_blocks = if clears_price {
            !bounded(self.limit(), "fetch_blocks", self.env.listings.fetch_blocks(property_id)).await?.is_empty()
        } else {
            // A stored listing without a price has blocks.
            property.price.is_none()
        };
        validate_property(&property, has_blocks)?;

        let mut updated =
            bounded(self.limit(), "update_property", self.env.listings.update_property(property)).await?;
        if let Some(open) = availability.filter(|open| *open != updated.is_available) {
            updated = self.set_availability(updated, open).await?;
        }
        tracing::info!("Listing updated");
        Ok(updated)
    }

    async fn set_availability(&self, mut property: Property, open: bool) -> Result<Property, ListingError> {
        let (operation, write) = if open {
            ("release_property", self.env.listings.release_property(&property.id))
        } else {
            ("claim_property", self.env.listings.claim_property(&property.id))
        };
        match bounded(self.limit(), operation, write).await? {
            Conditional::Applied(stored) => Ok(stored),
            // Someone else already moved it to the requested state.
            Conditional::PreconditionFailed => {
                property.is_available = open;
                Ok(property)
            },
            Conditional::Missing => Err(ListingError::NotFound(property.id)),
        }
    }

    /// Remove a listing, its blocks and its images.
    ///
    /// Image removal is best-effort; failures are logged.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] / [`ListingError::Unauthorized`]
    /// - [`ListingError::Store`] / [`ListingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(property_id = %property_id))]
    pub async fn delete_listing(&self, caller: &UserId, property_id: &PropertyId) -> Result<(), ListingError> {
        let property = self.owned_property(caller, property_id).await?;
        bounded(self.limit(), "delete_property", self.env.listings.delete_property(property_id)).await?;

        let bucket = &self.env.listing.image_bucket;
        for url in &property.images {
            let Some(path) = self.env.storage.object_path(bucket, url) else {
                tracing::debug!(url = %url, "Image is not in the listing bucket; skipping");
                continue;
            };
            if let Err(error) = self.env.storage.remove(bucket, &path).await {
                tracing::warn!(%error, path = %path, "Failed to remove listing image");
            }
        }
        tracing::info!(images = property.images.len(), "Listing deleted");
        Ok(())
    }

    /// Upload an image and append its public URL to the listing.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] / [`ListingError::Unauthorized`]
    /// - [`ListingError::UnsupportedContentType`] unless `content_type` is `image/*`
    /// - [`ListingError::ImageSize`] if the file is empty or too large
    /// - [`ListingError::Storage`] if the upload fails
    /// - [`ListingError::Store`] / [`ListingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(property_id = %property_id, file_name = %file_name, size = bytes.len()))]
    pub async fn attach_image(
        &self,
        caller: &UserId,
        property_id: &PropertyId,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Property, ListingError> {
        if !content_type.starts_with("image/") {
            return Err(ListingError::UnsupportedContentType(content_type.to_string()));
        }
        let limit = self.env.listing.max_image_bytes;
        if bytes.is_empty() || bytes.len() > limit {
            return Err(ListingError::ImageSize { size: bytes.len(), limit });
        }

        let mut property = self.owned_property(caller, property_id).await?;
        let now = self.env.clock.now();
        let path = format!(
            "{}/{}/{}-{}",
            property.owner_id,
            property.id,
            now.timestamp_millis(),
            sanitize_file_name(file_name)
        );
        validate_object_path(&path)?;

        let bucket = &self.env.listing.image_bucket;
        let url = self.env.storage.upload(bucket, &path, bytes, content_type).await?;
        property.images.push(url);
        property.updated_at = now;

        match bounded(self.limit(), "update_property", self.env.listings.update_property(property)).await {
            Ok(updated) => {
                tracing::info!(path = %path, "Image attached");
                Ok(updated)
            },
            Err(error) => {
                if let Err(cleanup) = self.env.storage.remove(bucket, &path).await {
                    tracing::warn!(%cleanup, path = %path, "Failed to remove orphaned upload");
                }
                Err(error.into())
            },
        }
    }

    /// Listings of `owner`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Store`] / [`ListingError::Timeout`] on store failure.
    pub async fn owner_listings(&self, owner: &UserId) -> Result<Vec<Property>, ListingError> {
        Ok(bounded(self.limit(), "properties_by_owner", self.env.listings.properties_by_owner(owner)).await?)
    }

    /// Bookings of an owned property with per-status counts.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] / [`ListingError::Unauthorized`]
    /// - [`ListingError::Store`] / [`ListingError::Timeout`] on store failure
    pub async fn booking_dashboard(
        &self,
        caller: &UserId,
        property_id: &PropertyId,
    ) -> Result<BookingDashboard, ListingError> {
        self.owned_property(caller, property_id).await?;
        let bookings =
            bounded(self.limit(), "bookings_for_property", self.env.bookings.bookings_for_property(property_id))
                .await?;
        Ok(BookingDashboard::from_bookings(bookings))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PRICE_EPSILON;

    fn new_block(label: &str) -> NewBlock {
        NewBlock {
            block_id: label.to_string(),
            block_name: None,
            total_plots: 20,
            area_per_plot: Decimal::from(1200),
            area_unit: AreaUnit::Sqft,
            price_per_unit: Decimal::from(2500),
            total_price_per_plot: None,
        }
    }

    #[test]
    fn builds_blocks_with_full_availability() {
        let id = PropertyId::new("PROP-TN-20250101001");
        let blocks = build_blocks(&id, vec![new_block("B"), new_block(" A ")], DEFAULT_PRICE_EPSILON).unwrap();
        assert_eq!(blocks[0].block_id, "A");
        assert_eq!(blocks[0].block_name, "Block A");
        assert_eq!(blocks[1].available_plots, 20);
        assert_eq!(blocks[1].total_price_per_plot, Some(Decimal::from(3_000_000)));
    }

    #[test]
    fn rejects_invalid_blocks() {
        let id = PropertyId::new("PROP-TN-20250101001");
        let dup = build_blocks(&id, vec![new_block("A"), new_block("a")], DEFAULT_PRICE_EPSILON);
        assert!(matches!(dup, Err(ListingError::Validation(msg)) if msg.contains("duplicate")));

        let mut empty = new_block("C");
        empty.total_plots = 0;
        assert!(build_blocks(&id, vec![empty], DEFAULT_PRICE_EPSILON).is_err());

        let mut mispriced = new_block("D");
        mispriced.total_price_per_plot = Some(Decimal::from(1));
        let err = build_blocks(&id, vec![mispriced], DEFAULT_PRICE_EPSILON).unwrap_err();
        assert_eq!(err.recovery(), Recovery::FixInput);
    }

    #[test]
    fn rejects_blocks_whose_price_overflows() {
        let id = PropertyId::new("PROP-TN-20250101001");
        let mut huge = new_block("E");
        huge.area_per_plot = Decimal::from(10_000_000_000_000_000_i64);
        huge.price_per_unit = Decimal::from(10_000_000_000_000_000_i64);
        let err = build_blocks(&id, vec![huge], DEFAULT_PRICE_EPSILON).unwrap_err();
        assert!(matches!(err, ListingError::Validation(msg) if msg.contains("too large")));

        let mut far_off = new_block("F");
        far_off.total_price_per_plot = Some(Decimal::MIN);
        assert!(matches!(
            build_blocks(&id, vec![far_off], DEFAULT_PRICE_EPSILON),
            Err(ListingError::Validation(msg)) if msg.contains("does not match")
        ));
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("My Photo (1).JPG"), "My-Photo--1-.JPG");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\plot.png"), "plot.png");
        assert_eq!(sanitize_file_name("..."), "image");
    }

    #[test]
    fn dedupes_amenities_case_insensitively() {
        let amenities = normalize_amenities(vec!["Water".into(), " water ".into(), String::new(), "Road".into()]);
        assert_eq!(amenities, vec!["Water".to_string(), "Road".to_string()]);
    }
}
