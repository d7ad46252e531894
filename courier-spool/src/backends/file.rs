use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use courier_common::{EmailTask, internal};
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    Result, SerializationError, ValidationError, error::SpoolError, r#trait::QueueStore,
};

/// Leading bytes of every snapshot file, followed by a format version.
const MAGIC: &[u8; 4] = b"CRQ\x01";

/// Default location of the snapshot, relative to the working directory.
pub const DEFAULT_PATH: &str = "email_queue.bin";

/// Single-file snapshot store
///
/// The whole queue is written as one file: a short magic header followed by
/// the bincode encoding of the task sequence.
///
/// # Atomicity
/// Every snapshot is written to `{path}.tmp`, flushed to disk, and then
/// renamed over `{path}`. A crash at any point leaves either the previous
/// snapshot or the new one in place, never a mix. A leftover `.tmp` file is
/// removed by [`FileQueueStore::init`].
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    /// Validate a snapshot path
    ///
    /// Relative paths are allowed and resolve against the working directory.
    ///
    /// # Errors
    /// If the path is empty, climbs with `..`, or points into a system directory
    pub fn validate_path(path: &Path) -> std::result::Result<(), ValidationError> {
        if path.as_os_str().is_empty() || path.file_name().is_none() {
            return Err(ValidationError::EmptyPath);
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentTraversal(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc",
            "/bin",
            "/sbin",
            "/usr/bin",
            "/usr/sbin",
            "/boot",
            "/sys",
            "/proc",
            "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::SystemDirectory {
                    prefix: (*prefix).to_string(),
                    path: path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Create a new `FileQueueStore` builder
    #[must_use]
    pub fn builder() -> FileQueueStoreBuilder {
        FileQueueStoreBuilder::default()
    }

    /// Location of the snapshot file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Prepare the snapshot location
    ///
    /// Creates the parent directory if it is missing and removes a temporary
    /// file left behind by an interrupted snapshot.
    ///
    /// # Errors
    /// - If the parent directory cannot be created
    /// - If the snapshot path exists but is a directory
    pub fn init(&self) -> Result<()> {
        internal!("Initialising queue store at {} ...", self.path.display());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.try_exists()?
        {
            internal!("{} does not exist, creating...", parent.display());
            std::fs::create_dir_all(parent)?;
        }

        if self.path.is_dir() {
            return Err(ValidationError::IsDirectory(self.path.display().to_string()).into());
        }

        let temp = self.temp_path();
        if temp.try_exists()? {
            std::fs::remove_file(&temp)?;
            internal!(
                level = INFO,
                "Removed interrupted snapshot {}",
                temp.display()
            );
        }

        Ok(())
    }

    fn encode(tasks: &[EmailTask]) -> Result<Vec<u8>> {
        let body = bincode::serde::encode_to_vec(tasks, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let mut bytes = Vec::with_capacity(MAGIC.len() + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Vec<EmailTask>> {
        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| SerializationError::Corrupt("missing queue header".to_string()))?;

        let (tasks, read): (Vec<EmailTask>, usize) =
            bincode::serde::decode_from_slice(body, bincode::config::standard())
                .map_err(SerializationError::from)?;

        if read != body.len() {
            return Err(SerializationError::Corrupt(format!(
                "{} trailing bytes after queue contents",
                body.len() - read
            ))
            .into());
        }

        Ok(tasks)
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(count = tasks.len()))]
    async fn snapshot(&self, tasks: &[EmailTask]) -> Result<()> {
        let bytes = Self::encode(tasks)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &self.path).await?;

        internal!(
            level = DEBUG,
            "Saved {} tasks to {}",
            tasks.len(),
            self.path.display()
        );

        Ok(())
    }

    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all)]
    async fn restore(&self) -> Result<Vec<EmailTask>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                internal!("No saved queue at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(err) => return Err(SpoolError::Io(err)),
        };

        let tasks = Self::decode(&bytes)?;

        internal!(
            level = DEBUG,
            "Loaded {} tasks from {}",
            tasks.len(),
            self.path.display()
        );

        Ok(tasks)
    }
}

/// Builder for `FileQueueStore`
#[derive(Debug)]
pub struct FileQueueStoreBuilder {
    path: PathBuf,
}

impl Default for FileQueueStoreBuilder {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
        }
    }
}

impl FileQueueStoreBuilder {
    /// Set the snapshot file path
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the final `FileQueueStore`
    ///
    /// # Errors
    /// Returns an error if the path is invalid
    pub fn build(self) -> Result<FileQueueStore> {
        FileQueueStore::validate_path(&self.path)?;
        Ok(FileQueueStore { path: self.path })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_is_required() {
        let err = FileQueueStore::decode(b"not a queue").unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = FileQueueStore::encode(&[EmailTask::new("s", "b", "a@b.io")]).unwrap();
        bytes.push(0);

        let err = FileQueueStore::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            SpoolError::Serialization(SerializationError::Corrupt(_))
        ));
    }

    #[test]
    fn temp_path_sits_next_to_snapshot() {
        let store = FileQueueStore::builder()
            .path("/var/lib/courier/queue.bin")
            .build()
            .unwrap();
        assert_eq!(
            store.temp_path(),
            PathBuf::from("/var/lib/courier/queue.bin.tmp")
        );
    }

    #[test]
    fn relative_default_is_valid() {
        assert!(FileQueueStore::validate_path(Path::new(DEFAULT_PATH)).is_ok());
    }

    #[test]
    fn rejects_dangerous_paths() {
        assert!(matches!(
            FileQueueStore::validate_path(Path::new("../queue.bin")),
            Err(ValidationError::ParentTraversal(_))
        ));
        assert!(matches!(
            FileQueueStore::validate_path(Path::new("/etc/queue.bin")),
            Err(ValidationError::SystemDirectory { .. })
        ));
        assert!(matches!(
            FileQueueStore::validate_path(Path::new("")),
            Err(ValidationError::EmptyPath)
        ));
    }
}
