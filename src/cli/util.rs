//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, ConfigLoader, PROJECT_DIR};
use crate::storage::{Database, PoolConfig, SharedDatabase};
use crate::types::{PulseError, Result};

/// Command execution context
///
/// Created via `CommandContext::load()` by every command that touches the
/// report database.
#[derive(Clone)]
pub struct CommandContext {
    /// Project data directory (.bizpulse)
    pub project_dir: PathBuf,
    pub db: SharedDatabase,
    /// Merged configuration
    pub config: Config,
}

impl CommandContext {
    /// Validates initialization, loads config and opens the database.
    pub fn load() -> Result<Self> {
        let project_dir = require_initialized()?;
        let config = ConfigLoader::load()?;
        let db = open_database(&config)?;

        Ok(Self {
            project_dir,
            db: Arc::new(db),
            config,
        })
    }
}

/// Returns the .bizpulse directory, or `PulseError::NotInitialized`.
pub fn require_initialized() -> Result<PathBuf> {
    let project_dir = Path::new(PROJECT_DIR);

    if !project_dir.exists() {
        return Err(PulseError::NotInitialized);
    }

    Ok(project_dir.to_path_buf())
}

fn pool_config(config: &Config) -> PoolConfig {
    config
        .database
        .pool_max_size
        .map(PoolConfig::with_max_size)
        .unwrap_or_default()
}

/// Open the configured database. Migrations are applied on open so an older
/// file keeps working after an upgrade.
pub fn open_database(config: &Config) -> Result<Database> {
    let path = &config.database.path;
    if !path.exists() {
        return Err(PulseError::NotInitialized);
    }

    let db = Database::open_with_config(path, pool_config(config))?;
    db.initialize()?;
    Ok(db)
}

/// Create the database file and its schema.
pub fn create_database(config: &Config) -> Result<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open_with_config(path, pool_config(config))?;
    db.initialize()?;
    Ok(db)
}

// Commands resolve paths against the current directory, so they are covered
// by the store tests rather than here.
