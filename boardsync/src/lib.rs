//! `BoardSync` — real-time collaborative Kanban board client library.
//!
//! - [`board`] holds the local view and the pure ordering, mutation and
//!   reconciliation algorithms
//! - [`api`] loads boards and performs CRUD against the board service
//! - [`channel`] carries moves and authoritative task records over the relay
//! - [`session`] ties the three together for one open board

pub mod api;
pub mod board;
pub mod channel;
pub mod config;
pub mod session;
