//! Core domain + application logic for the channel relay.
//!
//! This crate is framework-agnostic. Telegram lives behind the `RelayPort`
//! trait implemented in the adapter crate.

pub mod config;
pub mod content;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod media;
pub mod ports;
pub mod relay;
pub mod throttled;
pub mod window;

pub use errors::{Error, Result};
