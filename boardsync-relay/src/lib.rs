//! `BoardSync` relay server library.
//!
//! Exposes the relay and its in-memory board service for use in tests and
//! embedding. The relay fans authoritative task records out to board
//! subscribers and is the only place task versions are assigned.

pub mod api;
pub mod config;
pub mod relay;
pub mod store;
pub mod topics;
