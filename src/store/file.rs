//! File-backed store.
//!
//! Layout of a store directory:
//!
//! ```text
//! <path>/LOCK                exclusive lock held while the store is open
//! <path>/<key>.list          one file per key
//! ```
//!
//! Each list file is `magic | version | encoding | len (u32 LE) | body | crc32 (u32 LE)`.
//! Writes go to a temporary file that is synced and renamed over the old one.

use super::PersistentStore;
use crate::error::StorageError;
use crate::types::NotificationRecord;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for list files.
const LIST_MAGIC: &[u8; 4] = b"HRL\0";

/// Current list format version.
const LIST_VERSION: u8 = 1;

/// Upper bound on a list body. Far above any bounded history.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Body encoding for list files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreEncoding {
    #[default]
    Json,
    MessagePack,
}

impl StoreEncoding {
    fn tag(self) -> u8 {
        match self {
            StoreEncoding::Json => 0,
            StoreEncoding::MessagePack => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, StorageError> {
        match tag {
            0 => Ok(StoreEncoding::Json),
            1 => Ok(StoreEncoding::MessagePack),
            other => Err(StorageError::InvalidFormat(format!(
                "Unknown list encoding: {}",
                other
            ))),
        }
    }

    fn encode(self, records: &[NotificationRecord]) -> Result<Vec<u8>, StorageError> {
        match self {
            StoreEncoding::Json => Ok(serde_json::to_vec(records)?),
            StoreEncoding::MessagePack => Ok(rmp_serde::to_vec_named(records)?),
        }
    }

    fn decode(self, body: &[u8]) -> Result<Vec<NotificationRecord>, StorageError> {
        match self {
            StoreEncoding::Json => Ok(serde_json::from_slice(body)?),
            StoreEncoding::MessagePack => Ok(rmp_serde::from_slice(body)?),
        }
    }
}

/// File store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Directory holding the list files.
    pub path: PathBuf,

    /// Encoding used for new writes. Existing files are read in whatever
    /// encoding their header names.
    pub encoding: StoreEncoding,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./herald"),
            encoding: StoreEncoding::Json,
            create_if_missing: true,
        }
    }
}

/// Durable store writing one file per key.
pub struct FileStore {
    config: FileStoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Serializes writers so temp files never collide.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store directory, creating it if configured to.
    pub fn open(config: FileStoreConfig) -> Result<Self, StorageError> {
        if !config.path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(&config.path)?;
            } else {
                return Err(StorageError::NotInitialized);
            }
        }

        let lock_file = Self::acquire_lock(&config.path)?;
        debug!(path = %config.path.display(), encoding = ?config.encoding, "opened file store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            write_lock: Mutex::new(()),
        })
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn acquire_lock(path: &Path) -> Result<File, StorageError> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        Ok(lock_file)
    }

    fn list_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.config.path.join(format!("{}.list", key)))
    }

    fn read_list(path: &Path) -> Result<Vec<NotificationRecord>, StorageError> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LIST_MAGIC {
            return Err(StorageError::InvalidFormat("Invalid list magic".into()));
        }

        let mut header = [0u8; 2];
        file.read_exact(&mut header)?;
        if header[0] != LIST_VERSION {
            return Err(StorageError::InvalidFormat(format!(
                "Unsupported list version: {}",
                header[0]
            )));
        }
        let encoding = StoreEncoding::from_tag(header[1])?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_BODY_BYTES {
            return Err(StorageError::Corruption("List body too large".into()));
        }

        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let expected = u32::from_le_bytes(checksum_bytes);
        let got = crc32fast::hash(&body);
        if expected != got {
            return Err(StorageError::ChecksumMismatch { expected, got });
        }

        encoding.decode(&body)
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<NotificationRecord>>, StorageError> {
        let path = self.list_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_list(&path).map(Some)
    }

    fn set(&self, key: &str, records: &[NotificationRecord]) -> Result<(), StorageError> {
        let path = self.list_path(key)?;
        let encoding = self.config.encoding;
        let body = encoding.encode(records)?;
        if body.len() > MAX_BODY_BYTES {
            return Err(StorageError::Serialization("List body too large".into()));
        }

        let _lock = self.write_lock.lock();

        let tmp_path = path.with_extension("list.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(LIST_MAGIC)?;
            file.write_all(&[LIST_VERSION, encoding.tag()])?;
            file.write_all(&(body.len() as u32).to_le_bytes())?;
            file.write_all(&body)?;
            file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        Ok(())
    }
}
