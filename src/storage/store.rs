use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::index::{Header, HeaderIndex, INDEX_FILE};
use crate::storage::record::{DatasetKind, Record, Room, Section};
use crate::storage::{validate_id, StorageError};

const DATASET_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

/// First line of every dataset file. Readable without parsing the records.
#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    id: String,
    kind: DatasetKind,
    #[serde(rename = "numRows")]
    num_rows: usize,
    /// CRC of the record line
    checksum: u32,
}

/// A fully loaded dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub kind: DatasetKind,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn num_rows(&self) -> usize {
        self.records.len()
    }
}

/// Durable store of whole datasets plus a header index for cheap listing.
///
/// Layout inside `base_dir`:
/// - `<id>.json`: a JSON header line followed by a JSON array of records
/// - `dataset_index.json`: the headers of every stored dataset
///
/// Every file is replaced atomically (temp file + rename). Mutations are
/// serialized per dataset id; loads hold the id's read lock.
pub struct DatasetStore {
    /// Directory holding dataset files and the index
    base_dir: PathBuf,
    /// Cached copy of the on-disk header index
    index: RwLock<HeaderIndex>,
    /// One lock per dataset id
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    crc: Crc<u32>,
}

impl DatasetStore {
    /// Opens (or creates) a store in `base_dir`, repairing the index against the dataset files
    pub async fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await?;

        let store = Self {
            base_dir,
            index: RwLock::new(HeaderIndex::new()),
            locks: Mutex::new(HashMap::new()),
            crc: Crc::<u32>::new(&CRC_32_ISCSI),
        };

        let index = store.recover_index().await?;
        if index.is_empty() {
            info!("Opened empty dataset store at {}", store.base_dir.display());
        } else {
            info!(
                "Opened dataset store at {} with {} dataset(s)",
                store.base_dir.display(),
                index.len()
            );
        }
        *store.index.write().await = index;

        Ok(store)
    }

    /// Persists a new dataset and returns the ids of all stored datasets
    pub async fn add(
        &self,
        id: &str,
        kind: DatasetKind,
        records: Vec<Record>,
    ) -> Result<Vec<String>, StorageError> {
        validate_id(id)?;
        if records.is_empty() {
            return Err(StorageError::EmptyDataset(id.to_string()));
        }
        if records.iter().any(|record| record.kind() != kind) {
            return Err(StorageError::KindMismatch(id.to_string()));
        }

        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.write().await;
            self.add_locked(id, kind, records).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn add_locked(
        &self,
        id: &str,
        kind: DatasetKind,
        records: Vec<Record>,
    ) -> Result<Vec<String>, StorageError> {
        if self.index.read().await.contains(id) {
            return Err(StorageError::DuplicateId(id.to_string()));
        }

        let body = serde_json::to_string(&records)?;
        let header = BlobHeader {
            id: id.to_string(),
            kind,
            num_rows: records.len(),
            checksum: self.checksum(body.as_bytes()),
        };
        let mut contents = serde_json::to_vec(&header)?;
        contents.push(b'\n');
        contents.extend_from_slice(body.as_bytes());
        contents.push(b'\n');

        let blob_path = self.blob_path(id);
        self.write_atomic(&blob_path, &contents).await?;

        let mut index = self.index.write().await;
        index.insert(Header::new(id.to_string(), kind, records.len()));
        if let Err(e) = self.persist_index(&index).await {
            index.remove(id);
            if let Err(cleanup) = fs::remove_file(&blob_path).await {
                warn!("Failed to clean up dataset file for '{}': {}", id, cleanup);
            }
            return Err(e);
        }

        info!(
            "Added dataset: id={}, kind={}, rows={}",
            id,
            kind,
            records.len()
        );

        Ok(index.ids())
    }

    /// Deletes a dataset file and its header, returning the removed header
    pub async fn remove(&self, id: &str) -> Result<Header, StorageError> {
        validate_id(id)?;
        if !self.contains(id).await {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.write().await;
            self.remove_locked(id).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn remove_locked(&self, id: &str) -> Result<Header, StorageError> {
        // Re-checked under the lock: a concurrent remove may have won
        if !self.index.read().await.contains(id) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        // Blob first: a crash before the index write is repaired on open by dropping the entry
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Dataset file for '{}' was already missing", id);
            }
            Err(e) => return Err(e.into()),
        }

        let mut index = self.index.write().await;
        let header = index
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.persist_index(&index).await?;

        info!("Removed dataset: id={}", id);
        Ok(header)
    }

    /// Returns all headers without touching any dataset file
    pub async fn list(&self) -> Vec<Header> {
        self.index.read().await.headers().to_vec()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.index.read().await.contains(id)
    }

    /// Loads the full record collection of a dataset
    pub async fn get(&self, id: &str) -> Result<Dataset, StorageError> {
        validate_id(id)?;
        if !self.contains(id).await {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.read().await;
            self.get_locked(id).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn get_locked(&self, id: &str) -> Result<Dataset, StorageError> {
        let indexed_kind = match self.index.read().await.get(id) {
            Some(header) => header.kind,
            None => return Err(StorageError::NotFound(id.to_string())),
        };

        let contents = match fs::read_to_string(self.blob_path(id)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let (header_line, body) = contents
            .split_once('\n')
            .ok_or_else(|| StorageError::Corrupted(format!("{}: missing record section", id)))?;
        let header: BlobHeader = serde_json::from_str(header_line)?;
        let body = body.trim_end_matches('\n');

        if header.id != id || header.kind != indexed_kind {
            return Err(StorageError::Corrupted(format!(
                "{}: header does not match the index",
                id
            )));
        }
        if self.checksum(body.as_bytes()) != header.checksum {
            return Err(StorageError::Corrupted(format!("{}: checksum mismatch", id)));
        }

        let records: Vec<Record> = match header.kind {
            DatasetKind::Sections => serde_json::from_str::<Vec<Section>>(body)?
                .into_iter()
                .map(Record::Section)
                .collect(),
            DatasetKind::Rooms => serde_json::from_str::<Vec<Room>>(body)?
                .into_iter()
                .map(Record::Room)
                .collect(),
        };
        if records.len() != header.num_rows {
            return Err(StorageError::Corrupted(format!(
                "{}: expected {} rows, found {}",
                id,
                header.num_rows,
                records.len()
            )));
        }

        debug!("Loaded dataset: id={}, rows={}", id, records.len());

        Ok(Dataset {
            id: header.id,
            kind: header.kind,
            records,
        })
    }

    /// Loads the persisted index and reconciles it with the dataset files on disk
    async fn recover_index(&self) -> Result<HeaderIndex, StorageError> {
        let mut index = match fs::read(self.index_path()).await {
            Ok(bytes) => HeaderIndex::from_json(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HeaderIndex::new(),
            Err(e) => return Err(e.into()),
        };
        let mut repaired = false;

        let mut stale = Vec::new();
        for header in index.headers() {
            if !fs::try_exists(self.blob_path(&header.id)).await? {
                stale.push(header.id.clone());
            }
        }
        for id in stale {
            warn!("Dropping index entry '{}': dataset file is missing", id);
            index.remove(&id);
            repaired = true;
        }

        let mut entries = fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if file_name.starts_with('.') && file_name.ends_with(TEMP_SUFFIX) {
                debug!("Removing leftover temp file {}", file_name);
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!("Failed to remove temp file {}: {}", file_name, e);
                }
                continue;
            }
            if file_name == INDEX_FILE {
                continue;
            }
            let Some(id) = file_name.strip_suffix(DATASET_SUFFIX) else {
                continue;
            };
            if index.contains(id) || validate_id(id).is_err() {
                continue;
            }

            match self.read_blob_header(&entry.path()).await {
                Ok(blob) if blob.id == id => {
                    warn!("Re-indexing dataset '{}' found without an index entry", id);
                    index.insert(Header::new(blob.id, blob.kind, blob.num_rows));
                    repaired = true;
                }
                Ok(blob) => {
                    warn!("Skipping {}: its header names dataset '{}'", file_name, blob.id);
                }
                Err(e) => warn!("Skipping unreadable dataset file {}: {}", file_name, e),
            }
        }

        if repaired {
            self.persist_index(&index).await?;
        }

        Ok(index)
    }

    async fn read_blob_header(&self, path: &Path) -> Result<BlobHeader, StorageError> {
        let file = fs::File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(serde_json::from_str(line.trim_end())?)
    }

    async fn persist_index(&self, index: &HeaderIndex) -> Result<(), StorageError> {
        let contents = index.to_json()?;
        self.write_atomic(&self.index_path(), &contents).await
    }

    /// Writes `contents` to a temp file in the store directory and renames it over `path`
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self
            .base_dir
            .join(format!(".{}.{}{}", file_name, Uuid::new_v4(), TEMP_SUFFIX));

        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                debug!("Temp file {} not removed: {}", tmp_path.display(), cleanup);
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn lock_for(&self, id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    /// Drops the caller's handle and prunes the entry once no other operation holds it.
    /// Handles are only cloned under the map mutex, so a count of one means nobody is waiting.
    async fn release_lock(&self, id: &str, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(id);
        }
    }

    fn checksum(&self, bytes: &[u8]) -> u32 {
        let mut digest = self.crc.digest();
        digest.update(bytes);
        digest.finalize()
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}{}", id, DATASET_SUFFIX))
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }
}
