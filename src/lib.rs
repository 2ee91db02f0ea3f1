pub mod classify;
pub mod config;
pub mod db;
pub mod health;
pub mod scheduler;
pub mod sensor;
pub mod service;
pub mod settings;
pub mod upload;
mod utils;

#[cfg(test)]
mod testing;

use std::path::Path;

use anyhow::{Context, Result};

pub use config::PipelineConfig;
pub use db::{Database, RecordKind};
pub use service::{Collaborators, CollectionService, ServiceStatus};
pub use utils::init_logging;

/// Host entry point: logging, configuration and the collection service.
///
/// Directories for the store and preferences file are created when missing.
pub fn start_pipeline(config_path: Option<&Path>, parts: Collaborators) -> Result<CollectionService> {
    init_logging();
    log::info!("hcplus starting up...");

    let config = PipelineConfig::load(config_path)?;
    for path in [&config.db_path, &config.settings_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    CollectionService::new(config, parts)
}
