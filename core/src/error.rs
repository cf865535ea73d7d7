//! Caller-facing recovery classification shared by every error in this crate.
//!
//! Each error type maps itself onto a [`Recovery`] so the presentation layer
//! can tell "fix your input" apart from "conditions changed" and "system
//! problem" without matching on individual variants.

use serde::{Deserialize, Serialize};

/// What the caller should do after an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recovery {
    /// Fix the input and retry immediately (missing fields, invalid selection).
    FixInput,
    /// Conditions changed: re-query current state, then retry with a new choice.
    Requery,
    /// System problem: retry later or contact support.
    RetryLater,
    /// Retrying cannot help (unknown id, not permitted).
    None,
}

impl Recovery {
    /// Whether any kind of retry can succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::None)
    }
}
