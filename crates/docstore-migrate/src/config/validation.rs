//! Configuration validation.

use super::{Config, StoreConfig, StoreKind};
use crate::error::{MigrateError, Result};

fn validate_store(role: &str, store: &StoreConfig) -> Result<()> {
    match store.r#type {
        StoreKind::JsonFile => match &store.path {
            Some(path) if !path.as_os_str().is_empty() => {}
            _ => {
                return Err(MigrateError::Config(format!(
                    "{}.path is required for json_file stores",
                    role
                )))
            }
        },
        StoreKind::Memory => {}
    }
    if let Some(0) = store.max_page_size {
        return Err(MigrateError::Config(format!(
            "{}.max_page_size must be at least 1",
            role
        )));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_store("source", &config.source)?;
    validate_store("target", &config.target)?;

    // Cannot migrate a file onto itself
    if config.source.r#type == StoreKind::JsonFile
        && config.target.r#type == StoreKind::JsonFile
        && config.source.path == config.target.path
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same store".into(),
        ));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if migration.max_retries == 0 {
        return Err(MigrateError::Config(
            "migration.max_retries must be at least 1".into(),
        ));
    }
    if migration.workers == 0 {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if migration.container.is_some() && migration.database.is_none() {
        return Err(MigrateError::Config(
            "migration.container requires migration.database".into(),
        ));
    }
    for (name, value) in [
        ("database", &migration.database),
        ("container", &migration.container),
    ] {
        if let Some(v) = value {
            if v.trim().is_empty() {
                return Err(MigrateError::Config(format!(
                    "migration.{} must not be empty",
                    name
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, StoreConfig};

    fn valid_config() -> Config {
        Config {
            source: StoreConfig::json_file("source.json"),
            target: StoreConfig::json_file("target.json"),
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_json_file_requires_path() {
        let mut config = valid_config();
        config.source.path = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_memory_store_needs_no_path() {
        let mut config = valid_config();
        config.target = StoreConfig::memory("scratch");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_same_file_rejected() {
        let mut config = valid_config();
        config.target = StoreConfig::json_file("source.json");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.migration.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_container_requires_database() {
        let mut config = valid_config();
        config.migration.container = Some("orders".into());
        assert!(validate(&config).is_err());
        config.migration.database = Some("shop".into());
        assert!(validate(&config).is_ok());
    }
}
