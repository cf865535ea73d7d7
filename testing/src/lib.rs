//! # Plotbook Testing
//!
//! Testing utilities for Plotbook.
//!
//! This crate provides:
//! - [`InMemoryBackend`]: every store trait over shared in-memory state, with
//!   fault injection for compensation and timeout paths
//! - [`InMemoryMessageFeed`] and [`InMemoryObjectStorage`]
//! - [`FixedClock`] for deterministic time
//! - [`fixtures`] for properties, blocks, bookings and messages
//!
//! ## Example
//!
//! ```ignore
//! use plotbook_testing::{InMemoryBackend, booking_environment, fixtures};
//!
//! #[tokio::test]
//! async fn books_a_plot() {
//!     let backend = Arc::new(InMemoryBackend::new());
//!     let committer = BookingCommitter::new(booking_environment(&backend, BookingConfig::default()));
//!     // seed a property and block, then book
//! }
//! ```

use chrono::{DateTime, Utc};
use plotbook_core::booking::BookingEnvironment;
use plotbook_core::config::BookingConfig;
use plotbook_core::environment::Clock;
use std::sync::Arc;

mod backend;
mod feed;
pub mod fixtures;

pub use backend::InMemoryBackend;
pub use feed::{InMemoryMessageFeed, InMemoryObjectStorage};

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use plotbook_testing::mocks::FixedClock;
    /// use plotbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};

/// Booking environment wired to `backend` and the fixed test clock.
#[must_use]
pub fn booking_environment(backend: &Arc<InMemoryBackend>, config: BookingConfig) -> BookingEnvironment {
    BookingEnvironment::new(backend.clone(), backend.clone(), Arc::new(test_clock()), config)
}

/// Install a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `plotbook=debug`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "plotbook=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
