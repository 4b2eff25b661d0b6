//! The persistent store substrate.
//!
//! The archive only assumes a hierarchical store of named objects with
//! per-object key/value attributes and atomic single-object read/write.
//! Everything richer (region writes, reconciliation, packing) is layered on
//! top by this crate. Two backends ship here: a filesystem store and an
//! in-memory store for tests.

pub mod array;
pub mod fs;
pub mod memory;

pub use array::StoredArray;
pub use fs::FsStore;
pub use memory::MemoryStore;

use season_core::StorageType;

use crate::error::{ArchiveError, Result};

/// Attribute map of a stored object. Keys are strings; values JSON.
pub type AttrMap = serde_json::Map<String, serde_json::Value>;

/// A dot-addressed dataset path, e.g. `"prcp.global.daily"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetPath(String);

impl DatasetPath {
    /// Parse a dot-addressed path. Segments must be non-empty and free of
    /// path separators.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let valid = !path.is_empty()
            && path.split('.').all(|seg| {
                !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });
        if !valid {
            return Err(ArchiveError::invalid_metadata(format!(
                "invalid dataset path: '{}'",
                path
            )));
        }
        Ok(Self(path))
    }

    /// The dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The path of this dataset's provenance companion.
    pub fn provenance(&self) -> Self {
        Self(format!("{}.provenance", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape and kind of a stored object, readable without loading its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectInfo {
    /// A numeric array dataset.
    Array {
        storage: StorageType,
        shape: Vec<usize>,
    },
    /// A time-indexed record table (provenance rows).
    Records { len: usize },
}

/// Narrow interface to the persistent substrate.
///
/// Implementations provide atomic reads and writes of whole objects; callers
/// must externally serialize writes (single-writer assumption).
pub trait GridStore {
    /// Whether an object exists at `path`.
    fn exists(&self, path: &DatasetPath) -> bool;

    /// Describe an object without loading its data.
    fn describe(&self, path: &DatasetPath) -> Result<ObjectInfo>;

    /// Create an array dataset with initial contents.
    fn create_array(&mut self, path: &DatasetPath, array: StoredArray) -> Result<()>;

    /// Read an entire array dataset.
    fn read_array(&self, path: &DatasetPath) -> Result<StoredArray>;

    /// Replace an entire array dataset (atomic per object).
    fn write_array(&mut self, path: &DatasetPath, array: &StoredArray) -> Result<()>;

    /// Create a record table with `len` empty rows.
    fn create_records(&mut self, path: &DatasetPath, len: usize) -> Result<()>;

    /// Read all rows of a record table; unwritten rows are `None`.
    fn read_records(&self, path: &DatasetPath) -> Result<Vec<Option<serde_json::Value>>>;

    /// Write consecutive rows starting at `offset` (atomic per object).
    fn write_records(
        &mut self,
        path: &DatasetPath,
        offset: usize,
        rows: &[serde_json::Value],
    ) -> Result<()>;

    /// Read an object's attribute map.
    fn read_attrs(&self, path: &DatasetPath) -> Result<AttrMap>;

    /// Replace an object's attribute map in a single commit.
    fn write_attrs(&mut self, path: &DatasetPath, attrs: &AttrMap) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_path_valid() {
        let p = DatasetPath::new("prcp.global.daily").unwrap();
        assert_eq!(p.segments().collect::<Vec<_>>(), vec!["prcp", "global", "daily"]);
        assert_eq!(p.to_string(), "prcp.global.daily");
    }

    #[test]
    fn test_dataset_path_invalid() {
        assert!(DatasetPath::new("").is_err());
        assert!(DatasetPath::new("a..b").is_err());
        assert!(DatasetPath::new("a/b").is_err());
        assert!(DatasetPath::new(".a").is_err());
    }

    #[test]
    fn test_provenance_companion_path() {
        let p = DatasetPath::new("prcp.daily").unwrap();
        assert_eq!(p.provenance().as_str(), "prcp.daily.provenance");
    }
}
