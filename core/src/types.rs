//! Domain types for the Plotbook marketplace.
//!
//! Identifiers, enumerations and the persisted records (properties, blocks,
//! bookings, messages) shared by every service in this crate and by the store
//! implementations.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a property listing.
///
/// Listings created through this crate use the human-readable scheme
/// `PROP-<REGION>-<YYYYMMDD><NNN>`, but any string is accepted when loading
/// rows from a store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(String);

impl PropertyId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds a listing identifier for the given region, day and sequence suffix.
    ///
    /// The suffix is reduced modulo 1000 so the identifier always has three
    /// trailing digits.
    #[must_use]
    pub fn generate(region: &str, date: DateTime<Utc>, suffix: u16) -> Self {
        Self(format!(
            "PROP-{}-{:04}{:02}{:02}{:03}",
            region.to_ascii_uppercase(),
            date.year(),
            date.month(),
            date.day(),
            suffix % 1000
        ))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create the identifier from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Internal row identifier of a block (distinct from its human label).
    BlockRowId
);
uuid_id!(
    /// Unique identifier for a booking
    BookingId
);
uuid_id!(
    /// Unique identifier for an authenticated user (owner or buyer)
    UserId
);
uuid_id!(
    /// Unique identifier for a message
    MessageId
);

// ============================================================================
// Enumerations
// ============================================================================

/// Error returned when a stored enumeration label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {value}")]
pub struct UnknownLabel {
    /// Which enumeration was being parsed
    pub kind: &'static str,
    /// The offending label
    pub value: String,
}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Storage representation of this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }

            /// Parse the storage representation.
            ///
            /// # Errors
            ///
            /// Returns [`UnknownLabel`] if the label is not recognised.
            pub fn parse(s: &str) -> Result<Self, UnknownLabel> {
                match s {
                    $( $label => Ok(Self::$variant), )+
                    _ => Err(UnknownLabel { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// How a property's base price is quoted.
    PriceType, "price type" {
        /// Rent per day
        PerDay => "per_day",
        /// One-off sale price
        Total => "total",
        /// Rent per month
        PerMonth => "per_month",
        /// Rent per year
        PerYear => "per_year",
    }
);

labelled_enum!(
    /// Unit in which a block's plot area is measured.
    AreaUnit, "area unit" {
        /// Square feet
        Sqft => "sqft",
        /// Cent (1/100 acre)
        Cent => "cent",
        /// Ground (2400 sqft)
        Ground => "ground",
        /// Acre
        Acre => "acre",
        /// Hectare
        Hectare => "hectare",
    }
);

labelled_enum!(
    /// Lifecycle state of a booking, driven by the property owner.
    BookingStatus, "booking status" {
        /// Awaiting the owner's decision
        Pending => "pending",
        /// Accepted by the owner
        Confirmed => "confirmed",
        /// Rejected or withdrawn
        Cancelled => "cancelled",
    }
);

labelled_enum!(
    /// Payment state recorded alongside a booking. Payments themselves are
    /// processed elsewhere.
    PaymentStatus, "payment status" {
        /// No payment received yet
        Pending => "pending",
        /// Paid in full
        Paid => "paid",
        /// Payment attempt failed
        Failed => "failed",
    }
);

// ============================================================================
// Records
// ============================================================================

/// Latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// A listed property.
///
/// A property with zero blocks is sold as one unit at `price`; a property with
/// blocks is sold per plot at each block's price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Listing identifier
    pub id: PropertyId,
    /// Owner of the listing
    pub owner_id: UserId,
    /// Headline
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Street address or landmark
    pub location: String,
    /// District the property is in
    pub district: String,
    /// Base price, used when the property has no blocks
    pub price: Option<Decimal>,
    /// How `price` is quoted
    pub price_type: PriceType,
    /// Whether the listing can currently be booked
    pub is_available: bool,
    /// Promoted listing
    pub is_featured: bool,
    /// Public image URLs, in display order
    pub images: Vec<String>,
    /// Amenity labels
    pub amenities: Vec<String>,
    /// Built-up or plot size in square feet
    pub size_sqft: Option<u32>,
    /// Bedroom count
    pub bedrooms: Option<u16>,
    /// Bathroom count
    pub bathrooms: Option<u16>,
    /// Map position
    pub coordinates: Option<GeoPoint>,
    /// When the listing was created
    pub created_at: DateTime<Utc>,
    /// When the listing was last edited
    pub updated_at: DateTime<Utc>,
}

impl Property {
    /// Whether `user` owns this listing.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner_id == *user
    }
}

/// A named group of plots within a property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Internal row id
    pub id: BlockRowId,
    /// Property this block belongs to
    pub property_id: PropertyId,
    /// Short label, unique within the property (e.g. "A")
    pub block_id: String,
    /// Display name
    pub block_name: String,
    /// Plots created with the block; fixed
    pub total_plots: u32,
    /// Plots still bookable
    pub available_plots: u32,
    /// Area of one plot, in `area_unit`
    pub area_per_plot: Decimal,
    /// Unit of `area_per_plot`
    pub area_unit: AreaUnit,
    /// Price per unit of area
    pub price_per_unit: Decimal,
    /// Explicit per-plot price, if one was stored
    pub total_price_per_plot: Option<Decimal>,
}

impl Block {
    /// Whether the counter fields satisfy `0 <= available <= total` and `total >= 1`.
    #[must_use]
    pub const fn counters_consistent(&self) -> bool {
        self.total_plots >= 1 && self.available_plots <= self.total_plots
    }
}

/// Contact details collected from a buyer at booking time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerContact {
    /// Full name (required)
    pub name: String,
    /// Phone number (required)
    pub phone: String,
    /// Email address
    pub email: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Authenticated account of the buyer, when logged in
    pub user_id: Option<UserId>,
}

/// A recorded booking of a whole property or of one plot in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id
    pub id: BookingId,
    /// Booked property
    pub property_id: PropertyId,
    /// Booked block, `None` for whole-property bookings
    pub block_id: Option<BlockRowId>,
    /// Buyer contact details
    pub buyer: BuyerContact,
    /// Owner-driven status
    pub status: BookingStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Price snapshotted when the booking was committed
    pub total_price: Decimal,
    /// Buyer notes
    pub notes: Option<String>,
    /// When the booking was committed
    pub created_at: DateTime<Utc>,
}

/// A message between two users about a property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id
    pub id: MessageId,
    /// Author
    pub sender_id: UserId,
    /// Recipient
    pub receiver_id: UserId,
    /// Property the message is about
    pub property_id: PropertyId,
    /// Body text
    pub content: String,
    /// When the message was sent
    pub created_at: DateTime<Utc>,
}
