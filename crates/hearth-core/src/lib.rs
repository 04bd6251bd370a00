//! Hearth Core — error taxonomy and configuration.

pub mod config;
pub mod error;

pub use config::{DataPaths, HearthConfig};
pub use error::{Error, Result};
