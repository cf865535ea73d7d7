//! Mapping between `PostgreSQL` rows and domain records.
//!
//! Counters and sizes are stored as signed integers; values that do not fit
//! the domain's unsigned types are reported as [`StoreError::Serialization`].

use plotbook_core::store::StoreError;
use plotbook_core::types::{
    AreaUnit, Block, BlockRowId, Booking, BookingId, BookingStatus, BuyerContact, GeoPoint, Message, MessageId,
    PaymentStatus, PriceType, Property, PropertyId, UnknownLabel, UserId,
};
use sqlx::Row;
use sqlx::postgres::PgRow;

pub(crate) const PROPERTY_COLUMNS: &str = "id, owner_id, title, description, location, district, price, price_type, \
     is_available, is_featured, images, amenities, size_sqft, bedrooms, bathrooms, latitude, longitude, \
     created_at, updated_at";

pub(crate) const BLOCK_COLUMNS: &str = "id, property_id, block_id, block_name, total_plots, available_plots, \
     area_per_plot, area_unit, price_per_unit, total_price_per_plot";

pub(crate) const BOOKING_COLUMNS: &str = "id, property_id, block_id, buyer_name, buyer_phone, buyer_email, \
     buyer_address, user_id, status, payment_status, total_price, notes, created_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, property_id, content, created_at";

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| StoreError::Serialization(format!("column {name}: {e}")))
}

fn label(error: UnknownLabel) -> StoreError {
    StoreError::Serialization(error.to_string())
}

fn unsigned<T: TryFrom<i64>>(value: i64, name: &str) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::Serialization(format!("column {name}: {value} is out of range")))
}

/// Convert a domain count into the `INTEGER` column type.
pub(crate) fn to_i32(value: u32, name: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Serialization(format!("{name} {value} does not fit INTEGER")))
}

/// Convert a domain room count into the `SMALLINT` column type.
pub(crate) fn to_i16(value: u16, name: &str) -> Result<i16, StoreError> {
    i16::try_from(value).map_err(|_| StoreError::Serialization(format!("{name} {value} does not fit SMALLINT")))
}

pub(crate) fn property(row: &PgRow) -> Result<Property, StoreError> {
    let size: Option<i32> = column(row, "size_sqft")?;
    let bedrooms: Option<i16> = column(row, "bedrooms")?;
    let bathrooms: Option<i16> = column(row, "bathrooms")?;
    let latitude: Option<f64> = column(row, "latitude")?;
    let longitude: Option<f64> = column(row, "longitude")?;
    let price_type: String = column(row, "price_type")?;

    Ok(Property {
        id: PropertyId::new(column::<String>(row, "id")?),
        owner_id: UserId::from_uuid(column(row, "owner_id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        location: column(row, "location")?,
        district: column(row, "district")?,
        price: column(row, "price")?,
        price_type: PriceType::parse(&price_type).map_err(label)?,
        is_available: column(row, "is_available")?,
        is_featured: column(row, "is_featured")?,
        images: column(row, "images")?,
        amenities: column(row, "amenities")?,
        size_sqft: size.map(|v| unsigned(i64::from(v), "size_sqft")).transpose()?,
        bedrooms: bedrooms.map(|v| unsigned(i64::from(v), "bedrooms")).transpose()?,
        bathrooms: bathrooms.map(|v| unsigned(i64::from(v), "bathrooms")).transpose()?,
        coordinates: latitude.zip(longitude).map(|(latitude, longitude)| GeoPoint { latitude, longitude }),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn block(row: &PgRow) -> Result<Block, StoreError> {
    let total: i32 = column(row, "total_plots")?;
    let available: i32 = column(row, "available_plots")?;
    let area_unit: String = column(row, "area_unit")?;

    Ok(Block {
        id: BlockRowId::from_uuid(column(row, "id")?),
        property_id: PropertyId::new(column::<String>(row, "property_id")?),
        block_id: column(row, "block_id")?,
        block_name: column(row, "block_name")?,
        total_plots: unsigned(i64::from(total), "total_plots")?,
        available_plots: unsigned(i64::from(available), "available_plots")?,
        area_per_plot: column(row, "area_per_plot")?,
        area_unit: AreaUnit::parse(&area_unit).map_err(label)?,
        price_per_unit: column(row, "price_per_unit")?,
        total_price_per_plot: column(row, "total_price_per_plot")?,
    })
}

pub(crate) fn booking(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = column(row, "status")?;
    let payment_status: String = column(row, "payment_status")?;
    let block: Option<uuid::Uuid> = column(row, "block_id")?;
    let user: Option<uuid::Uuid> = column(row, "user_id")?;

    Ok(Booking {
        id: BookingId::from_uuid(column(row, "id")?),
        property_id: PropertyId::new(column::<String>(row, "property_id")?),
        block_id: block.map(BlockRowId::from_uuid),
        buyer: BuyerContact {
            name: column(row, "buyer_name")?,
            phone: column(row, "buyer_phone")?,
            email: column(row, "buyer_email")?,
            address: column(row, "buyer_address")?,
            user_id: user.map(UserId::from_uuid),
        },
        status: BookingStatus::parse(&status).map_err(label)?,
        payment_status: PaymentStatus::parse(&payment_status).map_err(label)?,
        total_price: column(row, "total_price")?,
        notes: column(row, "notes")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn message(row: &PgRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: MessageId::from_uuid(column(row, "id")?),
        sender_id: UserId::from_uuid(column(row, "sender_id")?),
        receiver_id: UserId::from_uuid(column(row, "receiver_id")?),
        property_id: PropertyId::new(column::<String>(row, "property_id")?),
        content: column(row, "content")?,
        created_at: column(row, "created_at")?,
    })
}
