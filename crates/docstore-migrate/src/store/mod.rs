//! Concrete [`DocumentStore`] implementations.
//!
//! - [`MemoryStore`]: in-process account, used for tests and dry runs
//! - [`JsonFileStore`]: account persisted as a JSON snapshot file

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::{AccountSnapshot, CollectionSnapshot, DatabaseSnapshot, MemoryStore};

use std::sync::Arc;

use tracing::info;

use crate::config::{StoreConfig, StoreKind};
use crate::core::DocumentStore;
use crate::error::{MigrateError, Result};

/// Build the store described by `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let name = config.display_name();
    match config.r#type {
        StoreKind::Memory => {
            info!("Opening in-memory store {}", name);
            let mut store = MemoryStore::new(name);
            if let Some(max) = config.max_page_size {
                store = store.with_max_page_size(max);
            }
            Ok(Arc::new(store))
        }
        StoreKind::JsonFile => {
            let path = config.path.as_ref().ok_or_else(|| {
                MigrateError::Config(format!("store {} of type json_file needs a path", name))
            })?;
            info!("Opening JSON file store {} at {}", name, path.display());
            Ok(Arc::new(JsonFileStore::open(name, path)?))
        }
    }
}
