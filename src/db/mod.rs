//! Database module for homedash.
//!
//! Durable job table in SQLite, shared by every process replica.

mod models;
mod store;

pub use models::*;
pub use store::*;
