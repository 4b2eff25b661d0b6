//! Filesystem-backed store.
//!
//! Each dataset lives in a directory named after its dot-path segments:
//! attributes in `attrs.json`, array metadata in `array.json` with raw
//! element bytes in `array.bin`, record tables in `records.json`. Writes go
//! through a temp file and rename, so each object update is atomic.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use season_core::StorageType;

use super::{AttrMap, DatasetPath, GridStore, ObjectInfo, StoredArray};
use crate::error::{ArchiveError, Result};

const ATTRS_FILE: &str = "attrs.json";
const ARRAY_META_FILE: &str = "array.json";
const ARRAY_DATA_FILE: &str = "array.bin";
const RECORDS_FILE: &str = "records.json";

#[derive(Debug, Serialize, Deserialize)]
struct ArrayMeta {
    storage: StorageType,
    shape: Vec<usize>,
}

/// Store rooted at a filesystem directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, path: &DatasetPath) -> PathBuf {
        let mut dir = self.root.clone();
        for seg in path.segments() {
            dir.push(seg);
        }
        dir
    }

    fn require_dir(&self, path: &DatasetPath) -> Result<PathBuf> {
        let dir = self.object_dir(path);
        if !dir.is_dir() {
            return Err(ArchiveError::NotFound(path.to_string()));
        }
        Ok(dir)
    }

    /// Write `bytes` to `target` atomically (temp file + rename).
    fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, target)?;
        Ok(())
    }

    fn read_array_meta(dir: &Path) -> Result<ArrayMeta> {
        let bytes = fs::read(dir.join(ARRAY_META_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl GridStore for FsStore {
    fn exists(&self, path: &DatasetPath) -> bool {
        let dir = self.object_dir(path);
        dir.join(ARRAY_META_FILE).is_file() || dir.join(RECORDS_FILE).is_file()
    }

    fn describe(&self, path: &DatasetPath) -> Result<ObjectInfo> {
        let dir = self.require_dir(path)?;

        if dir.join(ARRAY_META_FILE).is_file() {
            let meta = Self::read_array_meta(&dir)?;
            return Ok(ObjectInfo::Array {
                storage: meta.storage,
                shape: meta.shape,
            });
        }

        if dir.join(RECORDS_FILE).is_file() {
            let rows = self.read_records(path)?;
            return Ok(ObjectInfo::Records { len: rows.len() });
        }

        Err(ArchiveError::NotFound(path.to_string()))
    }

    fn create_array(&mut self, path: &DatasetPath, array: StoredArray) -> Result<()> {
        if self.exists(path) {
            return Err(ArchiveError::storage(format!(
                "object already exists: {}",
                path
            )));
        }

        let dir = self.object_dir(path);
        fs::create_dir_all(&dir)?;

        let meta = ArrayMeta {
            storage: array.storage_type(),
            shape: array.shape().to_vec(),
        };
        Self::write_atomic(&dir.join(ARRAY_DATA_FILE), &array.to_bytes())?;
        Self::write_atomic(&dir.join(ARRAY_META_FILE), &serde_json::to_vec(&meta)?)?;
        Ok(())
    }

    fn read_array(&self, path: &DatasetPath) -> Result<StoredArray> {
        let dir = self.require_dir(path)?;
        let meta = Self::read_array_meta(&dir)?;
        let bytes = fs::read(dir.join(ARRAY_DATA_FILE))?;
        StoredArray::from_bytes(meta.storage, &meta.shape, &bytes)
    }

    fn write_array(&mut self, path: &DatasetPath, array: &StoredArray) -> Result<()> {
        let dir = self.require_dir(path)?;
        let meta = Self::read_array_meta(&dir)?;
        if meta.storage != array.storage_type() || meta.shape != array.shape() {
            return Err(ArchiveError::storage(format!(
                "cannot change array layout of {}: datasets are never resized",
                path
            )));
        }
        Self::write_atomic(&dir.join(ARRAY_DATA_FILE), &array.to_bytes())
    }

    fn create_records(&mut self, path: &DatasetPath, len: usize) -> Result<()> {
        if self.exists(path) {
            return Err(ArchiveError::storage(format!(
                "object already exists: {}",
                path
            )));
        }

        let dir = self.object_dir(path);
        fs::create_dir_all(&dir)?;

        let rows: Vec<Option<serde_json::Value>> = vec![None; len];
        Self::write_atomic(&dir.join(RECORDS_FILE), &serde_json::to_vec(&rows)?)
    }

    fn read_records(&self, path: &DatasetPath) -> Result<Vec<Option<serde_json::Value>>> {
        let dir = self.require_dir(path)?;
        let bytes = fs::read(dir.join(RECORDS_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_records(
        &mut self,
        path: &DatasetPath,
        offset: usize,
        rows: &[serde_json::Value],
    ) -> Result<()> {
        let dir = self.require_dir(path)?;
        let mut all = self.read_records(path)?;

        if offset + rows.len() > all.len() {
            return Err(ArchiveError::storage(format!(
                "record write {}..{} exceeds table length {} in {}",
                offset,
                offset + rows.len(),
                all.len(),
                path
            )));
        }

        for (i, row) in rows.iter().enumerate() {
            all[offset + i] = Some(row.clone());
        }
        Self::write_atomic(&dir.join(RECORDS_FILE), &serde_json::to_vec(&all)?)
    }

    fn read_attrs(&self, path: &DatasetPath) -> Result<AttrMap> {
        let dir = self.require_dir(path)?;
        let attrs_path = dir.join(ATTRS_FILE);
        if !attrs_path.is_file() {
            return Ok(AttrMap::new());
        }
        let bytes = fs::read(attrs_path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_attrs(&mut self, path: &DatasetPath, attrs: &AttrMap) -> Result<()> {
        let dir = self.require_dir(path)?;
        Self::write_atomic(&dir.join(ATTRS_FILE), &serde_json::to_vec_pretty(attrs)?)
    }
}
