//! `PostgreSQL` backend for Plotbook.
//!
//! This crate provides [`PostgresStore`], which implements every store trait
//! from `plotbook-core` on top of a sqlx connection pool, and
//! [`PgMessageFeed`], a realtime message feed built on `LISTEN`/`NOTIFY`.
//!
//! - Conditional plot and availability updates in a single statement
//! - Bundled schema migrations ([`PostgresStore::migrate`])
//! - Connection pooling configured from [`DatabaseConfig`](plotbook_core::config::DatabaseConfig)
//!
//! # Example
//!
//! ```ignore
//! use plotbook_postgres::{PgMessageFeed, PostgresStore};
//!
//! async fn example(config: &DatabaseConfig) -> Result<(), StoreError> {
//!     let store = PostgresStore::connect(config).await?;
//!     store.migrate().await?;
//!     let feed = PgMessageFeed::new(store.pool().clone());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod feed;
mod rows;
mod store;

pub use feed::PgMessageFeed;
pub use store::{MESSAGE_CHANNEL, PostgresStore};
