//! Use-case services over the local store and the remote source.
//!
//! # Responsibility
//! - Mediate between cached weather and the network forecast stream.
//! - Keep callers decoupled from storage and scheduling details.

pub mod sunshine_repository;
