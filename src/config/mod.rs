//! # Configuration
//!
//! Settings loaded from environment variables.

mod settings;

pub use settings::Settings;
