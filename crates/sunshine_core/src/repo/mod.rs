//! Local store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the data access contract the repository depends on.
//! - Keep SQL details inside the persistence boundary.
//! - Publish a change version after every committed mutation.
//!
//! # Invariants
//! - Batch writes are all-or-nothing.
//! - Bulk inserts validate every entry before touching the table; merges
//!   skip invalid entries instead.

pub mod weather_repo;
