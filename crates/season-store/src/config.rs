//! Declarative archive schema.
//!
//! The set of datasets an archive holds is described once in a YAML document
//! and validated at load time; nothing downstream probes attribute bags for
//! optional keys. The schema names each dataset's season, period, view,
//! storage layout, and optional packing and provenance declarations.
//!
//! ```yaml
//! datasets:
//!   - id: prcp.global.daily
//!     period: date
//!     start: 2020-01-01
//!     end: 2020-12-31
//!     view: tyx
//!     storage: int16
//!     spatial_shape: [181, 360]
//!     packing:
//!       unpack: "(float,nan)"
//!       multiplier: 10.0
//!       missing: -32768
//!     provenance:
//!       generator: daily_stats
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use season_core::{Period, SemanticType, StorageType, TimeAxis, TimeKey, View};

use crate::dataset::{axis_from_keys, key_from_value, PackingSpec};
use crate::error::{ArchiveError, Result};
use crate::provenance::GeneratorRegistry;
use crate::store::DatasetPath;

/// The archive schema: every dataset the builder will create.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    pub datasets: Vec<DatasetConfig>,
}

/// One dataset's declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Dot-addressed dataset id.
    pub id: String,
    pub period: Period,
    /// Season start; a date string, or an integer for doy/year periods.
    pub start: serde_json::Value,
    /// Season end, inclusive.
    pub end: serde_json::Value,
    pub view: View,
    /// Stored element type, e.g. `int16` or `float64`.
    pub storage: String,
    /// Spatial dimensions in storage order (excluding time).
    pub spatial_shape: Vec<usize>,
    #[serde(default)]
    pub packing: Option<PackingConfig>,
    #[serde(default)]
    pub provenance: Option<ProvenanceConfig>,
}

/// Packing declaration, in the same form as the stored attributes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackingConfig {
    /// Semantic type and marker, e.g. `"(float,nan)"`.
    pub unpack: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Storage-side missing sentinel. Defaults to NaN.
    pub missing: Option<f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Provenance companion declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvenanceConfig {
    /// Name of a registered statistic generator.
    pub generator: String,
}

impl ArchiveConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ArchiveError::Config(format!("bad archive config: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Validate every declaration once, up front.
    pub fn validate(&self, registry: &GeneratorRegistry) -> Result<()> {
        let mut seen = BTreeSet::new();
        for ds in &self.datasets {
            if !seen.insert(ds.id.as_str()) {
                return Err(ArchiveError::Config(format!(
                    "duplicate dataset id '{}'",
                    ds.id
                )));
            }
            ds.validate(registry)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.id == id)
    }
}

impl DatasetConfig {
    pub fn path(&self) -> Result<DatasetPath> {
        DatasetPath::new(self.id.as_str())
            .map_err(|_| ArchiveError::Config(format!("invalid dataset id '{}'", self.id)))
    }

    pub fn storage_type(&self) -> Result<StorageType> {
        StorageType::from_str(&self.storage).ok_or_else(|| {
            ArchiveError::Config(format!(
                "dataset '{}': unknown storage type '{}'",
                self.id, self.storage
            ))
        })
    }

    /// Build the declared time axis.
    pub fn axis(&self) -> Result<TimeAxis> {
        let start = self.key(&self.start, "start")?;
        let end = self.key(&self.end, "end")?;
        axis_from_keys(start, end).map_err(|_| {
            ArchiveError::Config(format!(
                "dataset '{}': invalid season {}..{}",
                self.id, start, end
            ))
        })
    }

    /// Decode the declared packing, if any.
    pub fn packing_spec(&self) -> Result<Option<PackingSpec>> {
        let Some(p) = &self.packing else {
            return Ok(None);
        };
        let semantic = SemanticType::parse_unpack(&p.unpack).ok_or_else(|| {
            ArchiveError::Config(format!(
                "dataset '{}': bad unpack declaration '{}'",
                self.id, p.unpack
            ))
        })?;
        Ok(Some(PackingSpec {
            semantic,
            multiplier: p.multiplier,
            missing: p.missing.unwrap_or(f64::NAN),
        }))
    }

    fn key(&self, value: &serde_json::Value, which: &str) -> Result<TimeKey> {
        key_from_value(self.period, value).map_err(|_| {
            ArchiveError::Config(format!(
                "dataset '{}': cannot read {} '{}' as a {} key",
                self.id, which, value, self.period
            ))
        })
    }

    fn validate(&self, registry: &GeneratorRegistry) -> Result<()> {
        self.path()?;
        self.storage_type()?;
        let axis = self.axis()?;

        if self.period == Period::Doy {
            for key in [axis.start(), axis.end()] {
                if let TimeKey::Doy(d) = key {
                    if !(1..=366).contains(&d) {
                        return Err(ArchiveError::Config(format!(
                            "dataset '{}': day-of-year {} outside 1..=366",
                            self.id, d
                        )));
                    }
                }
            }
        }

        if self.spatial_shape.is_empty() || self.spatial_shape.contains(&0) {
            return Err(ArchiveError::Config(format!(
                "dataset '{}': spatial shape {:?} must be non-empty with non-zero dims",
                self.id, self.spatial_shape
            )));
        }

        if let Some(p) = self.packing_spec()? {
            if p.multiplier == 0.0 {
                return Err(ArchiveError::Config(format!(
                    "dataset '{}': zero packing multiplier",
                    self.id
                )));
            }
        }

        if let Some(prov) = &self.provenance {
            if !registry.contains(&prov.generator) {
                return Err(ArchiveError::UnknownGenerator(prov.generator.clone()));
            }
        }

        Ok(())
    }
}
