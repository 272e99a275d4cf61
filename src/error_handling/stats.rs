//! Fetch statistics tracking.
//!
//! This module provides thread-safe counters for fetch failures and fetch
//! outcomes, shared between concurrent fetches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::{ErrorType, OutcomeType};

/// Thread-safe fetch statistics tracker.
///
/// Tracks failures per `ErrorType` and resolutions per `OutcomeType` using
/// atomic counters. All categories are initialized to zero on creation, so
/// the struct can be shared across tasks behind an `Arc`.
#[derive(Debug)]
pub struct FetchStats {
    errors: HashMap<ErrorType, AtomicUsize>,
    outcomes: HashMap<OutcomeType, AtomicUsize>,
}

impl Default for FetchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchStats {
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in ErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }

        let mut outcomes = HashMap::new();
        for outcome in OutcomeType::iter() {
            outcomes.insert(outcome, AtomicUsize::new(0));
        }

        FetchStats { errors, outcomes }
    }

    /// Increment an error counter.
    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map",
                error
            );
        }
    }

    /// Increment an outcome counter.
    pub fn increment_outcome(&self, outcome: OutcomeType) {
        if let Some(counter) = self.outcomes.get(&outcome) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment outcome counter for {:?} which is not in the map",
                outcome
            );
        }
    }

    /// Get the count for an error type.
    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get the count for an outcome type.
    pub fn get_outcome_count(&self, outcome: OutcomeType) -> usize {
        self.outcomes
            .get(&outcome)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get total error count across all error types.
    pub fn total_errors(&self) -> usize {
        ErrorType::iter().map(|e| self.get_error_count(e)).sum()
    }

    /// Get total number of resolved fetches.
    pub fn total_outcomes(&self) -> usize {
        OutcomeType::iter().map(|o| self.get_outcome_count(o)).sum()
    }

    /// Error categories with a non-zero count, most frequent first.
    pub fn nonzero_errors(&self) -> Vec<(ErrorType, usize)> {
        let mut counts: Vec<(ErrorType, usize)> = ErrorType::iter()
            .map(|e| (e, self.get_error_count(e)))
            .filter(|(_, count)| *count > 0)
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}
