//! Error handling and fetch statistics.
//!
//! This module provides:
//! - The fetch failure taxonomy (`FetchError`) and initialization errors
//! - Error categorization for statistics
//! - Thread-safe counters for failures and fetch outcomes

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{categorize_reqwest_error, categorize_status, update_error_stats};
pub use stats::FetchStats;
pub use types::{ErrorType, FetchError, InitializationError, OutcomeType};
