use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::{
    MessageId, MessageRecord, SpoolError,
    backends::BackingStore,
    error::{SerializationError, ValidationError},
};

/// Filesystem backing store implementation
///
/// Each record is one bincode-encoded file named `<ulid>.bin` inside the spool
/// directory. Writes go to a temporary file which is fsynced and then renamed
/// into place, so a crash mid-write leaves either the old record or the new
/// one, never a torn file.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl FileBackingStore {
    /// Open (creating if necessary) a spool directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the path exists but is not a
    /// directory, or the directory cannot be created or written to.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();

        tokio::fs::create_dir_all(&path).await.map_err(|err| {
            ValidationError::PathNotFound(format!("{}: {err}", path.display()))
        })?;

        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_dir() {
            return Err(ValidationError::NotDirectory(path.display().to_string()).into());
        }

        // Probe writability up front rather than failing on the first enqueue
        let probe = path.join(".probe");
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|err| ValidationError::NotWritable(format!("{}: {err}", path.display())))?;
        tokio::fs::remove_file(&probe).await?;

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_path(&self, id: MessageId) -> PathBuf {
        self.path.join(id.filename())
    }

    async fn read_record(&self, path: &Path) -> crate::Result<MessageRecord> {
        let bytes = tokio::fs::read(path).await?;
        let (record, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(SerializationError::Decode)?;
        Ok(record)
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    async fn store(&self, record: &MessageRecord) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(SerializationError::Encode)?;

        let target = self.record_path(record.id);
        let temp = self.path.join(format!(".{}.tmp", record.id));

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &target).await?;

        Ok(())
    }

    async fn load(&self, id: MessageId) -> crate::Result<MessageRecord> {
        let path = self.record_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SpoolError::UnknownId(id));
        }

        self.read_record(&path).await
    }

    async fn load_all(&self) -> crate::Result<Vec<MessageRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            // Temp files, probes, and anything else that is not a record
            if MessageId::from_filename(name).is_none() {
                continue;
            }

            match self.read_record(&entry.path()).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    // A corrupt record should not take the whole queue down
                    warn!("Skipping unreadable spool file {name}: {err}");
                }
            }
        }

        Ok(records)
    }

    async fn remove(&self, id: MessageId) -> crate::Result<()> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SpoolError::UnknownId(id))
            }
            Err(err) => Err(err.into()),
        }
    }
}
