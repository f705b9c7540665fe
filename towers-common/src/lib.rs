//! Towers Common Types and Utilities
//!
//! Shared configuration, error handling and wire types for the towers crates.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::TowersConfig;
pub use error::{Error, Result};
pub use types::{BodyProperty, BodyType, Principal, Rights};
