use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    Result,
    backends::{FileQueueStore, MemoryQueueStore, file::DEFAULT_PATH},
    r#trait::QueueStore,
};

/// Configuration for the queue store
///
/// File-backed store in RON config:
/// ```ron
/// Courier (
///     store: File(
///         path: "/var/lib/courier/email_queue.bin",
///     ),
/// )
/// ```
///
/// Memory-backed store, nothing survives a restart:
/// ```ron
/// Courier (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum StoreConfig {
    /// Single snapshot file
    File {
        #[serde(default = "default_path")]
        path: PathBuf,
    },
    /// In-process only
    Memory,
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_PATH)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: default_path(),
        }
    }
}

impl StoreConfig {
    /// Filesystem path for file-backed stores
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Build and initialise the configured store
    ///
    /// # Errors
    /// If the file path is invalid or its directory cannot be prepared
    pub fn into_store(self) -> Result<Arc<dyn QueueStore>> {
        match self {
            Self::File { path } => {
                let store = FileQueueStore::builder().path(path).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(MemoryQueueStore::new())),
        }
    }
}
