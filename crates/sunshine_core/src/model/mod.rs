//! Weather domain model.
//!
//! # Responsibility
//! - Define the per-day forecast record cached by the local store.
//! - Define the narrow list projection used by forecast list views.
//!
//! # Invariants
//! - At most one stored entry exists per calendar date.
//! - Dates have day granularity and are interpreted in UTC.

pub mod weather;
