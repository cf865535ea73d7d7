//! `PostgreSQL` implementation of the Plotbook store traits.

use crate::rows::{self, BLOCK_COLUMNS, BOOKING_COLUMNS, MESSAGE_COLUMNS, PROPERTY_COLUMNS, to_i16, to_i32};
use plotbook_core::config::DatabaseConfig;
use plotbook_core::store::{
    BookingStore, Conditional, FavoritesStore, ListingStore, MessageStore, StoreError, StoreFuture,
};
use plotbook_core::types::{
    Block, BlockRowId, Booking, BookingId, BookingStatus, Message, Property, PropertyId, UserId,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Channel that carries inserted messages as JSON.
pub const MESSAGE_CHANNEL: &str = "plotbook_messages";

/// Map a sqlx error onto the store taxonomy.
fn db_error(context: &str, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return StoreError::Duplicate(format!("{context}: {db}"));
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(format!("{context}: {db}"));
        }
    }
    StoreError::Database(format!("{context}: {error}"))
}

/// `PostgreSQL`-backed store.
///
/// Implements [`ListingStore`], [`BookingStore`], [`MessageStore`] and
/// [`FavoritesStore`] over one connection pool. Every write to
/// `available_plots`, `is_available` and booking `status` is a single
/// conditional `UPDATE ... WHERE <precondition> RETURNING`, so concurrent
/// callers cannot both observe the precondition and both succeed.
///
/// # Example
///
/// ```no_run
/// use plotbook_postgres::PostgresStore;
///
/// # async fn example() -> Result<(), plotbook_core::store::StoreError> {
/// let store = PostgresStore::new("postgres://localhost/plotbook").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(|e| db_error("connect", e))?;
        Ok(Self { pool })
    }

    /// Connect with the pool settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| db_error("connect", e))?;
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Distinguish a failed precondition from a missing row after a
    /// conditional update matched nothing.
    async fn unmatched<T>(
        &self,
        table: &'static str,
        exists_sql: &str,
        key: Key<'_>,
    ) -> Result<Conditional<T>, StoreError> {
        let query = sqlx::query_as::<_, (bool,)>(exists_sql);
        let query = match key {
            Key::Text(id) => query.bind(id),
            Key::Uuid(id) => query.bind(id),
        };
        let (exists,) = query.fetch_one(&self.pool).await.map_err(|e| db_error(table, e))?;
        if exists {
            tracing::debug!(table, "Conditional update precondition failed");
            metrics::counter!("store.precondition_failed", "table" => table).increment(1);
            Ok(Conditional::PreconditionFailed)
        } else {
            Ok(Conditional::Missing)
        }
    }

    async fn conditional_block(
        &self,
        sql: String,
        id: BlockRowId,
        context: &'static str,
    ) -> Result<Conditional<Block>, StoreError> {
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(context, e))?;
        match row {
            Some(row) => Ok(Conditional::Applied(rows::block(&row)?)),
            None => {
                self.unmatched(
                    "property_blocks",
                    "SELECT EXISTS(SELECT 1 FROM property_blocks WHERE id = $1)",
                    Key::Uuid(*id.as_uuid()),
                )
                .await
            },
        }
    }

    async fn conditional_property(
        &self,
        id: PropertyId,
        from: bool,
        context: &'static str,
    ) -> Result<Conditional<Property>, StoreError> {
        let sql = format!(
            "UPDATE properties SET is_available = $2, updated_at = now() \
             WHERE id = $1 AND is_available = $3 RETURNING {PROPERTY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(!from)
            .bind(from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(context, e))?;
        match row {
            Some(row) => Ok(Conditional::Applied(rows::property(&row)?)),
            None => {
                self.unmatched(
                    "properties",
                    "SELECT EXISTS(SELECT 1 FROM properties WHERE id = $1)",
                    Key::Text(id.as_str()),
                )
                .await
            },
        }
    }
}

enum Key<'a> {
    Text(&'a str),
    Uuid(uuid::Uuid),
}

// ============================================================================
// ListingStore
// ============================================================================

impl ListingStore for PostgresStore {
    fn fetch_property(&self, id: &PropertyId) -> StoreFuture<'_, Option<Property>> {
        let id = id.clone();
        Box::pin(async move {
            let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("fetch_property", e))?;
            row.as_ref().map(rows::property).transpose()
        })
    }

    fn list_properties(&self) -> StoreFuture<'_, Vec<Property>> {
        Box::pin(async move {
            let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY created_at DESC");
            let found = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("list_properties", e))?;
            found.iter().map(rows::property).collect()
        })
    }

    fn properties_by_owner(&self, owner: &UserId) -> StoreFuture<'_, Vec<Property>> {
        let owner = *owner.as_uuid();
        Box::pin(async move {
            let sql =
                format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE owner_id = $1 ORDER BY created_at DESC");
            let found = sqlx::query(&sql)
                .bind(owner)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("properties_by_owner", e))?;
            found.iter().map(rows::property).collect()
        })
    }

    fn insert_property(&self, property: Property) -> StoreFuture<'_, Property> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO properties ({PROPERTY_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
                 RETURNING {PROPERTY_COLUMNS}"
            );
            let row = bind_property(sqlx::query(&sql), &property)?
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("insert_property", e))?;
            rows::property(&row)
        })
    }

    fn update_property(&self, property: Property) -> StoreFuture<'_, Property> {
        Box::pin(async move {
            // is_available is written only by claim_property / release_property.
            let sql = format!(
                "UPDATE properties SET title = $2, description = $3, location = $4, district = $5, \
                 price = $6, price_type = $7, is_featured = $8, images = $9, amenities = $10, \
                 size_sqft = $11, bedrooms = $12, bathrooms = $13, latitude = $14, longitude = $15, \
                 updated_at = $16 WHERE id = $1 RETURNING {PROPERTY_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(property.id.as_str())
                .bind(&property.title)
                .bind(&property.description)
                .bind(&property.location)
                .bind(&property.district)
                .bind(property.price)
                .bind(property.price_type.as_str())
                .bind(property.is_featured)
                .bind(&property.images)
                .bind(&property.amenities)
                .bind(property.size_sqft.map(|v| to_i32(v, "size_sqft")).transpose()?)
                .bind(property.bedrooms.map(|v| to_i16(v, "bedrooms")).transpose()?)
                .bind(property.bathrooms.map(|v| to_i16(v, "bathrooms")).transpose()?)
                .bind(property.coordinates.map(|c| c.latitude))
                .bind(property.coordinates.map(|c| c.longitude))
                .bind(property.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("update_property", e))?
                .ok_or_else(|| StoreError::NotFound(format!("property {}", property.id)))?;
            rows::property(&row)
        })
    }

    fn delete_property(&self, id: &PropertyId) -> StoreFuture<'_, ()> {
        let id = id.clone();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM properties WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete_property", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("property {id}")));
            }
            Ok(())
        })
    }

    fn fetch_blocks(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Block>> {
        let property_id = property_id.clone();
        Box::pin(async move {
            let sql = format!("SELECT {BLOCK_COLUMNS} FROM property_blocks WHERE property_id = $1 ORDER BY block_id");
            let found = sqlx::query(&sql)
                .bind(property_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("fetch_blocks", e))?;
            found.iter().map(rows::block).collect()
        })
    }

    fn fetch_block(&self, id: &BlockRowId) -> StoreFuture<'_, Option<Block>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let sql = format!("SELECT {BLOCK_COLUMNS} FROM property_blocks WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("fetch_block", e))?;
            row.as_ref().map(rows::block).transpose()
        })
    }

    fn insert_blocks(&self, blocks: Vec<Block>) -> StoreFuture<'_, Vec<Block>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO property_blocks ({BLOCK_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {BLOCK_COLUMNS}"
            );
            let mut tx = self.pool.begin().await.map_err(|e| db_error("insert_blocks", e))?;
            let mut stored = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let row = sqlx::query(&sql)
                    .bind(block.id.as_uuid())
                    .bind(block.property_id.as_str())
                    .bind(&block.block_id)
                    .bind(&block.block_name)
                    .bind(to_i32(block.total_plots, "total_plots")?)
                    .bind(to_i32(block.available_plots, "available_plots")?)
                    .bind(block.area_per_plot)
                    .bind(block.area_unit.as_str())
                    .bind(block.price_per_unit)
                    .bind(block.total_price_per_plot)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| db_error("insert_blocks", e))?;
                stored.push(rows::block(&row)?);
            }
            tx.commit().await.map_err(|e| db_error("insert_blocks", e))?;
            stored.sort_by(|a, b| a.block_id.cmp(&b.block_id));
            Ok(stored)
        })
    }

    fn decrement_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>> {
        let id = *id;
        Box::pin(async move {
            let sql = format!(
                "UPDATE property_blocks SET available_plots = available_plots - 1 \
                 WHERE id = $1 AND available_plots > 0 RETURNING {BLOCK_COLUMNS}"
            );
            self.conditional_block(sql, id, "decrement_available_plots").await
        })
    }

    fn increment_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>> {
        let id = *id;
        Box::pin(async move {
            let sql = format!(
                "UPDATE property_blocks SET available_plots = available_plots + 1 \
                 WHERE id = $1 AND available_plots < total_plots RETURNING {BLOCK_COLUMNS}"
            );
            self.conditional_block(sql, id, "increment_available_plots").await
        })
    }

    fn claim_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>> {
        let id = id.clone();
        Box::pin(async move { self.conditional_property(id, true, "claim_property").await })
    }

    fn release_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>> {
        let id = id.clone();
        Box::pin(async move { self.conditional_property(id, false, "release_property").await })
    }
}

fn bind_property<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    property: &'q Property,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>, StoreError> {
    Ok(query
        .bind(property.id.as_str())
        .bind(property.owner_id.as_uuid())
        .bind(&property.title)
        .bind(&property.description)
        .bind(&property.location)
        .bind(&property.district)
        .bind(property.price)
        .bind(property.price_type.as_str())
        .bind(property.is_available)
        .bind(property.is_featured)
        .bind(&property.images)
        .bind(&property.amenities)
        .bind(property.size_sqft.map(|v| to_i32(v, "size_sqft")).transpose()?)
        .bind(property.bedrooms.map(|v| to_i16(v, "bedrooms")).transpose()?)
        .bind(property.bathrooms.map(|v| to_i16(v, "bathrooms")).transpose()?)
        .bind(property.coordinates.map(|c| c.latitude))
        .bind(property.coordinates.map(|c| c.longitude))
        .bind(property.created_at)
        .bind(property.updated_at))
}

// ============================================================================
// BookingStore
// ============================================================================

impl BookingStore for PostgresStore {
    fn insert_booking(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO bookings ({BOOKING_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING {BOOKING_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(booking.id.as_uuid())
                .bind(booking.property_id.as_str())
                .bind(booking.block_id.map(|id| *id.as_uuid()))
                .bind(&booking.buyer.name)
                .bind(&booking.buyer.phone)
                .bind(&booking.buyer.email)
                .bind(&booking.buyer.address)
                .bind(booking.buyer.user_id.map(|id| *id.as_uuid()))
                .bind(booking.status.as_str())
                .bind(booking.payment_status.as_str())
                .bind(booking.total_price)
                .bind(&booking.notes)
                .bind(booking.created_at)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("insert_booking", e))?;
            rows::booking(&row)
        })
    }

    fn fetch_booking(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("fetch_booking", e))?;
            row.as_ref().map(rows::booking).transpose()
        })
    }

    fn bookings_for_property(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Booking>> {
        let property_id = property_id.clone();
        Box::pin(async move {
            let sql =
                format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE property_id = $1 ORDER BY created_at DESC");
            let found = sqlx::query(&sql)
                .bind(property_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("bookings_for_property", e))?;
            found.iter().map(rows::booking).collect()
        })
    }

    fn bookings_for_buyer(&self, buyer: &UserId) -> StoreFuture<'_, Vec<Booking>> {
        let buyer = *buyer.as_uuid();
        Box::pin(async move {
            let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC");
            let found = sqlx::query(&sql)
                .bind(buyer)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("bookings_for_buyer", e))?;
            found.iter().map(rows::booking).collect()
        })
    }

    fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> StoreFuture<'_, Conditional<Booking>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let sql = format!(
                "UPDATE bookings SET status = $3 WHERE id = $1 AND status = $2 RETURNING {BOOKING_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(id)
                .bind(expected.as_str())
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("update_booking_status", e))?;
            match row {
                Some(row) => Ok(Conditional::Applied(rows::booking(&row)?)),
                None => {
                    self.unmatched("bookings", "SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1)", Key::Uuid(id))
                        .await
                },
            }
        })
    }
}

// ============================================================================
// MessageStore
// ============================================================================

impl MessageStore for PostgresStore {
    fn insert_message(&self, message: Message) -> StoreFuture<'_, Message> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
            );
            let mut tx = self.pool.begin().await.map_err(|e| db_error("insert_message", e))?;
            let row = sqlx::query(&sql)
                .bind(message.id.as_uuid())
                .bind(message.sender_id.as_uuid())
                .bind(message.receiver_id.as_uuid())
                .bind(message.property_id.as_str())
                .bind(&message.content)
                .bind(message.created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_error("insert_message", e))?;
            let stored = rows::message(&row)?;

            // Delivered to listeners when the transaction commits.
            let payload =
                serde_json::to_string(&stored).map_err(|e| StoreError::Serialization(e.to_string()))?;
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(MESSAGE_CHANNEL)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert_message", e))?;
            tx.commit().await.map_err(|e| db_error("insert_message", e))?;
            Ok(stored)
        })
    }

    fn messages_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Message>> {
        let user = *user.as_uuid();
        Box::pin(async move {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE sender_id = $1 OR receiver_id = $1 ORDER BY created_at"
            );
            let found = sqlx::query(&sql)
                .bind(user)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("messages_for_user", e))?;
            found.iter().map(rows::message).collect()
        })
    }
}

// ============================================================================
// FavoritesStore
// ============================================================================

impl FavoritesStore for PostgresStore {
    fn save_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()> {
        let user = *user.as_uuid();
        let property_id = property_id.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO saved_properties (user_id, property_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id, property_id) DO NOTHING",
            )
            .bind(user)
            .bind(property_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("save_property", e))?;
            Ok(())
        })
    }

    fn unsave_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()> {
        let user = *user.as_uuid();
        let property_id = property_id.clone();
        Box::pin(async move {
            sqlx::query("DELETE FROM saved_properties WHERE user_id = $1 AND property_id = $2")
                .bind(user)
                .bind(property_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("unsave_property", e))?;
            Ok(())
        })
    }

    fn saved_property_ids(&self, user: &UserId) -> StoreFuture<'_, Vec<PropertyId>> {
        let user = *user.as_uuid();
        Box::pin(async move {
            let ids: Vec<(String,)> = sqlx::query_as(
                "SELECT property_id FROM saved_properties WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("saved_property_ids", e))?;
            Ok(ids.into_iter().map(|(id,)| PropertyId::new(id)).collect())
        })
    }
}
