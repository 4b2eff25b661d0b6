//! Seasonal grid archive: persistence and reconciliation for time-indexed
//! geospatial datasets.
//!
//! An archive holds fixed-season, fixed-shape gridded datasets (see
//! [`season_core`] for the time/axis/packing vocabulary) in a [`GridStore`]
//! and layers three things on top of the raw storage:
//!
//! - the packed write/read path ([`insert`], [`codec`]), converting between
//!   the compact stored representation and semantic floating-point blocks;
//! - the observation/forecast reconciliation state machine ([`validity`]),
//!   which keeps each dataset's validity attributes consistent as
//!   authoritative and provisional feeds race each other through a season;
//! - derived per-time-step summary records ([`provenance`]).
//!
//! [`Archive`] ties these together behind the operation surface producers
//! and consumers call; [`config`] and [`builder`] create the datasets a YAML
//! schema declares.

pub mod archive;
pub mod builder;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod insert;
pub mod provenance;
pub mod store;
pub mod validity;

pub use archive::Archive;
pub use config::{ArchiveConfig, DatasetConfig};
pub use dataset::{Dataset, DatasetMeta, PackingSpec, Validity};
pub use dataset::{Packed, Provenanced, Reconcilable, TimeIndexed};
pub use error::{ArchiveError, Result};
pub use provenance::{GeneratorRegistry, ProvenanceRecord};
pub use store::{DatasetPath, FsStore, GridStore, MemoryStore, StoredArray};
