//! Session state, synthesis parameters and the settings file.

pub mod settings;
pub mod types;

pub use settings::Settings;
pub use types::*;
