//! Init Command
//!
//! Initialize bizpulse in the current directory.

use crate::cli::ui::Output;
use crate::cli::util::create_database;
use crate::config::{ConfigLoader, PROJECT_DIR};
use crate::types::{PulseError, Result};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let project_dir = root.join(PROJECT_DIR);

    if project_dir.exists() && !force {
        return Err(PulseError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    ConfigLoader::init_project(&root)?;

    // Never overwrite an existing global config from here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let config = ConfigLoader::load()?;
    create_database(&config)?;

    let out = Output::new();
    out.success(&format!("Initialized bizpulse in {}/", PROJECT_DIR));
    out.field("Database", config.database.path.display());
    println!();
    println!("Next steps:");
    println!("  1. Load tenant data into the database");
    println!("  2. bizpulse tenant configure --tenant <ID> --cadence weekly --recipient <ADDR>");
    println!("  3. bizpulse run --tenant <ID> --preview");

    Ok(())
}
