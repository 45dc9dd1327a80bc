//! finsight-config
//!
//! Engine configuration surface: defaults, overrides, and JSON persistence
//! under a base directory.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::EngineConfig;
