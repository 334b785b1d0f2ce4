//! Configuration Management
//!
//! Hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (platform config dir)
//! 3. Project config (.bizpulse/config.toml)
//! 4. Environment variables (BIZPULSE_*)
//! 5. CLI arguments (highest priority, applied by commands)

mod loader;
mod types;

pub use loader::{ConfigLoader, PROJECT_DIR};
pub use types::*;
