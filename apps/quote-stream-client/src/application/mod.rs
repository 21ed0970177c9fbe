//! Application Layer - Port definitions.
//!
//! The traits here define how the streaming core talks to the socket and
//! to whoever consumes decoded quotes.

/// Port interfaces for external systems (transport, quote consumer).
pub mod ports;
