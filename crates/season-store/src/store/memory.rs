//! In-memory store, primarily for tests.

use std::collections::BTreeMap;

use super::{AttrMap, DatasetPath, GridStore, ObjectInfo, StoredArray};
use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone)]
enum Body {
    Array(StoredArray),
    Records(Vec<Option<serde_json::Value>>),
}

#[derive(Debug, Clone)]
struct Object {
    attrs: AttrMap,
    body: Body,
}

/// Store keeping all objects in a map. Cheap to construct, nothing persists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<DatasetPath, Object>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn object(&self, path: &DatasetPath) -> Result<&Object> {
        self.objects
            .get(path)
            .ok_or_else(|| ArchiveError::NotFound(path.to_string()))
    }

    fn object_mut(&mut self, path: &DatasetPath) -> Result<&mut Object> {
        self.objects
            .get_mut(path)
            .ok_or_else(|| ArchiveError::NotFound(path.to_string()))
    }

    fn create(&mut self, path: &DatasetPath, body: Body) -> Result<()> {
        if self.objects.contains_key(path) {
            return Err(ArchiveError::storage(format!(
                "object already exists: {}",
                path
            )));
        }
        self.objects.insert(
            path.clone(),
            Object {
                attrs: AttrMap::new(),
                body,
            },
        );
        Ok(())
    }
}

impl GridStore for MemoryStore {
    fn exists(&self, path: &DatasetPath) -> bool {
        self.objects.contains_key(path)
    }

    fn describe(&self, path: &DatasetPath) -> Result<ObjectInfo> {
        Ok(match &self.object(path)?.body {
            Body::Array(a) => ObjectInfo::Array {
                storage: a.storage_type(),
                shape: a.shape().to_vec(),
            },
            Body::Records(rows) => ObjectInfo::Records { len: rows.len() },
        })
    }

    fn create_array(&mut self, path: &DatasetPath, array: StoredArray) -> Result<()> {
        self.create(path, Body::Array(array))
    }

    fn read_array(&self, path: &DatasetPath) -> Result<StoredArray> {
        match &self.object(path)?.body {
            Body::Array(a) => Ok(a.clone()),
            Body::Records(_) => Err(ArchiveError::storage(format!(
                "{} is a record table, not an array",
                path
            ))),
        }
    }

    fn write_array(&mut self, path: &DatasetPath, array: &StoredArray) -> Result<()> {
        let object = self.object_mut(path)?;
        match &mut object.body {
            Body::Array(existing) => {
                if existing.storage_type() != array.storage_type()
                    || existing.shape() != array.shape()
                {
                    return Err(ArchiveError::storage(format!(
                        "cannot change array layout of {}: datasets are never resized",
                        path
                    )));
                }
                *existing = array.clone();
                Ok(())
            }
            Body::Records(_) => Err(ArchiveError::storage(format!(
                "{} is a record table, not an array",
                path
            ))),
        }
    }

    fn create_records(&mut self, path: &DatasetPath, len: usize) -> Result<()> {
        self.create(path, Body::Records(vec![None; len]))
    }

    fn read_records(&self, path: &DatasetPath) -> Result<Vec<Option<serde_json::Value>>> {
        match &self.object(path)?.body {
            Body::Records(rows) => Ok(rows.clone()),
            Body::Array(_) => Err(ArchiveError::storage(format!(
                "{} is an array, not a record table",
                path
            ))),
        }
    }

    fn write_records(
        &mut self,
        path: &DatasetPath,
        offset: usize,
        rows: &[serde_json::Value],
    ) -> Result<()> {
        let object = self.object_mut(path)?;
        match &mut object.body {
            Body::Records(all) => {
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
                Ok(())
            }
            Body::Array(_) => Err(ArchiveError::storage(format!(
                "{} is an array, not a record table",
                path
            ))),
        }
    }

    fn read_attrs(&self, path: &DatasetPath) -> Result<AttrMap> {
        Ok(self.object(path)?.attrs.clone())
    }

    fn write_attrs(&mut self, path: &DatasetPath, attrs: &AttrMap) -> Result<()> {
        self.object_mut(path)?.attrs = attrs.clone();
        Ok(())
    }
}
