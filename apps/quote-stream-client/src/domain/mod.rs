//! Domain Layer - Core market data types and connection rules.
//!
//! This layer has no I/O. Types here are plain Rust with serialization
//! support.

/// Market data types (quote updates, snapshots, bars).
pub mod streaming;

/// Fixed product-code subscription.
pub mod subscription;

/// Connection lifecycle states.
pub mod connection;
