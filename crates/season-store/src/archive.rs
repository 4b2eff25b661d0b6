//! The archive's operation surface.
//!
//! [`Archive`] owns a store and a generator registry and exposes the
//! operations producers and consumers call. Each operation opens the dataset
//! handle fresh, mutates through it, and commits metadata before returning,
//! so a handle never outlives one logical operation. Writes assume a single
//! writer; callers serialize writes to a given dataset externally.

use ndarray::{ArrayD, ArrayViewD};
use serde_json::Value;

use season_core::TimeKey;

use crate::config::ArchiveConfig;
use crate::dataset::{Dataset, Reconcilable, Validity};
use crate::error::Result;
use crate::provenance::{self, GeneratorRegistry};
use crate::store::{DatasetPath, FsStore, GridStore};
use crate::{builder, insert, validity};

/// An open archive: a store plus the statistic generators it may run.
#[derive(Debug)]
pub struct Archive<S: GridStore> {
    store: S,
    registry: GeneratorRegistry,
}

impl Archive<FsStore> {
    /// Open a filesystem-backed archive rooted at `root`.
    pub fn open_fs(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::new(FsStore::open(root)?))
    }
}

impl<S: GridStore> Archive<S> {
    /// Wrap a store with the built-in generators.
    pub fn new(store: S) -> Self {
        Self::with_registry(store, GeneratorRegistry::builtin())
    }

    pub fn with_registry(store: S, registry: GeneratorRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Create every dataset a schema declares; existing ones are left alone.
    pub fn build(&mut self, config: &ArchiveConfig) -> Result<usize> {
        builder::build_archive(&mut self.store, config, &self.registry)
    }

    fn open(&self, id: &str) -> Result<Dataset> {
        Dataset::open(&self.store, DatasetPath::new(id)?)
    }

    /// Write an authoritative observation block starting at `start`.
    ///
    /// Advances the observation watermark (and `source`'s, when given) and
    /// reconciles any forecast window. Returns the end time of the write.
    pub fn write_observation(
        &mut self,
        id: &str,
        start: &TimeKey,
        block: &ArrayD<f64>,
        source: Option<&str>,
    ) -> Result<TimeKey> {
        let mut ds = self.open(id)?;
        validity::write_observation(&mut self.store, &mut ds, start, block, source)
    }

    /// Write a provisional forecast block starting at `start`.
    ///
    /// Overlap with observed data trims the block to its unconfirmed
    /// remainder; a fully superseded block fails.
    pub fn write_forecast(
        &mut self,
        id: &str,
        start: &TimeKey,
        block: &ArrayD<f64>,
    ) -> Result<TimeKey> {
        let mut ds = self.open(id)?;
        validity::write_forecast(&mut self.store, &mut ds, start, block)
    }

    /// Drop the dataset's forecast window.
    pub fn remove_forecast(&mut self, id: &str) -> Result<()> {
        let mut ds = self.open(id)?;
        validity::remove_forecast(&mut self.store, &mut ds)
    }

    /// Read the inclusive time range `[start, end]` as semantic values.
    pub fn read_slice(&self, id: &str, start: &TimeKey, end: &TimeKey) -> Result<ArrayD<f64>> {
        let ds = self.open(id)?;
        insert::read_slice(&self.store, &ds, start, end, None)
    }

    /// Read the dataset's reconciliation state.
    pub fn read_validity(&self, id: &str) -> Result<Validity> {
        let ds = self.open(id)?;
        Ok(*ds.validity())
    }

    /// Generate and write provenance rows for `parent_id`'s companion table,
    /// then advance the table's own validity watermark.
    ///
    /// `inputs` are semantic blocks carrying an explicit time dimension, one
    /// per array the table's generator expects.
    pub fn update_provenance(
        &mut self,
        parent_id: &str,
        start: &TimeKey,
        inputs: &[ArrayViewD<'_, f64>],
        source: Option<&str>,
    ) -> Result<TimeKey> {
        let prov_path = DatasetPath::new(parent_id)?.provenance();
        let mut ds = Dataset::open(&self.store, prov_path)?;
        let records = provenance::generate_records(&ds, &self.registry, start, inputs, source)?;
        provenance::update_provenance(&mut self.store, &mut ds, start, &records, source)
    }

    /// Read all provenance rows for `parent_id`; unwritten steps are `None`.
    pub fn read_provenance(&self, parent_id: &str) -> Result<Vec<Option<Value>>> {
        let prov_path = DatasetPath::new(parent_id)?.provenance();
        self.store.read_records(&prov_path)
    }
}
