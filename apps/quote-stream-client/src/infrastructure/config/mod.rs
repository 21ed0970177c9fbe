//! Configuration Module
//!
//! Configuration loading for the quote stream client.

mod settings;

pub use settings::{ClientConfig, ConfigError, RestSettings, StreamSettings};
