//! Dataset handles and their attribute metadata.
//!
//! A dataset is a stored array (or record table) plus an attribute map with
//! a stable schema: season bounds, period, view, packing parameters, and the
//! validity attributes owned by the reconciliation state machine. The handle
//! decodes attributes once at open and commits them back in a single
//! attribute-map write.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use season_core::{Packing, Period, SemanticType, StorageType, TimeAxis, TimeKey, View};

use crate::error::{ArchiveError, Result};
use crate::store::{AttrMap, DatasetPath, GridStore, ObjectInfo};

pub const ATTR_PERIOD: &str = "period";
pub const ATTR_VIEW: &str = "view";
pub const ATTR_START_DATE: &str = "start_date";
pub const ATTR_END_DATE: &str = "end_date";
pub const ATTR_MISSING: &str = "missing";
pub const ATTR_MULTIPLIER: &str = "multiplier";
pub const ATTR_UNPACK: &str = "unpack";
pub const ATTR_CREATED: &str = "created";
pub const ATTR_UPDATED: &str = "updated";
pub const ATTR_LAST_OBS: &str = "last_obs_date";
pub const ATTR_LAST_VALID: &str = "last_valid_date";
pub const ATTR_FCAST_START: &str = "fcast_start_date";
pub const ATTR_FCAST_END: &str = "fcast_end_date";
pub const ATTR_GENERATOR: &str = "generator";

const WATERMARK_SUFFIX: &str = "_end_date";

/// Packing parameters as persisted in attributes. The storage type is a
/// property of the array itself, not of the attribute map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingSpec {
    pub semantic: SemanticType,
    pub multiplier: f64,
    pub missing: f64,
}

impl PackingSpec {
    /// Combine with the array's storage type into full packing parameters.
    pub fn with_storage(&self, storage: StorageType) -> Packing {
        Packing {
            storage,
            semantic: self.semantic,
            multiplier: self.multiplier,
            missing: self.missing,
        }
    }
}

impl From<Packing> for PackingSpec {
    fn from(p: Packing) -> Self {
        Self {
            semantic: p.semantic,
            multiplier: p.multiplier,
            missing: p.missing,
        }
    }
}

/// The reconciliation state of one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Validity {
    /// Highest time claimed by authoritative data. Monotonic non-decreasing.
    pub last_obs: Option<TimeKey>,
    /// Highest time with any valid data: max of `last_obs` and `fcast_end`.
    pub last_valid: Option<TimeKey>,
    /// Start of the provisional forecast window. Present iff `fcast_end` is.
    pub fcast_start: Option<TimeKey>,
    /// End of the provisional forecast window. Present iff `fcast_start` is.
    pub fcast_end: Option<TimeKey>,
}

impl Validity {
    /// The forecast window, when one is present.
    pub fn window(&self) -> Option<(TimeKey, TimeKey)> {
        match (self.fcast_start, self.fcast_end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    /// Clear the forecast window. Both attributes go together.
    pub fn clear_window(&mut self) {
        self.fcast_start = None;
        self.fcast_end = None;
    }
}

/// Decoded attribute metadata of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetMeta {
    pub axis: TimeAxis,
    pub view: View,
    pub packing: Option<PackingSpec>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub validity: Validity,
    /// Statistic generator name; set on provenance datasets.
    pub generator: Option<String>,
    /// Per-source analysis end-watermarks, keyed by source name.
    pub watermarks: BTreeMap<String, TimeKey>,
}

impl DatasetMeta {
    pub fn new(axis: TimeAxis, view: View) -> Self {
        Self {
            axis,
            view,
            packing: None,
            created: None,
            updated: None,
            validity: Validity::default(),
            generator: None,
            watermarks: BTreeMap::new(),
        }
    }

    /// Decode from a stored attribute map.
    pub fn from_attrs(attrs: &AttrMap) -> Result<Self> {
        let period = required_str(attrs, ATTR_PERIOD)?;
        let period = Period::from_str(period)
            .ok_or_else(|| ArchiveError::invalid_metadata(format!("unknown period '{}'", period)))?;

        let view = required_str(attrs, ATTR_VIEW)?;
        let view = View::from_str(view)
            .ok_or_else(|| ArchiveError::invalid_metadata(format!("unknown view '{}'", view)))?;

        let start = key_from_value(period, required(attrs, ATTR_START_DATE)?)?;
        let end = key_from_value(period, required(attrs, ATTR_END_DATE)?)?;
        let axis = axis_from_keys(start, end)?;

        let packing = match attrs.get(ATTR_UNPACK) {
            Some(v) => {
                let s = v.as_str().ok_or_else(|| {
                    ArchiveError::invalid_metadata("'unpack' attribute must be a string")
                })?;
                let semantic = SemanticType::parse_unpack(s).ok_or_else(|| {
                    ArchiveError::UnpackableType(format!("bad unpack attribute '{}'", s))
                })?;
                Some(PackingSpec {
                    semantic,
                    multiplier: attrs
                        .get(ATTR_MULTIPLIER)
                        .and_then(Value::as_f64)
                        .unwrap_or(1.0),
                    missing: attrs
                        .get(ATTR_MISSING)
                        .map(missing_from_value)
                        .transpose()?
                        .unwrap_or(f64::NAN),
                })
            }
            None => None,
        };

        let validity = Validity {
            last_obs: optional_key(attrs, period, ATTR_LAST_OBS)?,
            last_valid: optional_key(attrs, period, ATTR_LAST_VALID)?,
            fcast_start: optional_key(attrs, period, ATTR_FCAST_START)?,
            fcast_end: optional_key(attrs, period, ATTR_FCAST_END)?,
        };
        if validity.fcast_start.is_some() != validity.fcast_end.is_some() {
            return Err(ArchiveError::invalid_metadata(
                "forecast window attributes must be present together or not at all",
            ));
        }

        let mut watermarks = BTreeMap::new();
        for (name, value) in attrs {
            if let Some(source) = name.strip_suffix(WATERMARK_SUFFIX) {
                if !source.is_empty() && name != ATTR_END_DATE && name != ATTR_FCAST_END {
                    watermarks.insert(source.to_string(), key_from_value(period, value)?);
                }
            }
        }

        Ok(Self {
            axis,
            view,
            packing,
            created: optional_timestamp(attrs, ATTR_CREATED)?,
            updated: optional_timestamp(attrs, ATTR_UPDATED)?,
            validity,
            generator: attrs
                .get(ATTR_GENERATOR)
                .and_then(Value::as_str)
                .map(str::to_string),
            watermarks,
        })
    }

    /// Encode as an attribute map for a single-commit write.
    pub fn to_attrs(&self) -> AttrMap {
        let mut attrs = AttrMap::new();
        attrs.insert(ATTR_PERIOD.into(), Value::from(self.axis.period().as_str()));
        attrs.insert(ATTR_VIEW.into(), Value::from(self.view.as_str()));
        attrs.insert(ATTR_START_DATE.into(), key_to_value(&self.axis.start()));
        attrs.insert(ATTR_END_DATE.into(), key_to_value(&self.axis.end()));

        if let Some(p) = &self.packing {
            attrs.insert(ATTR_UNPACK.into(), Value::from(p.semantic.format_unpack()));
            attrs.insert(ATTR_MULTIPLIER.into(), Value::from(p.multiplier));
            attrs.insert(ATTR_MISSING.into(), missing_to_value(p.missing));
        }

        if let Some(t) = &self.created {
            attrs.insert(ATTR_CREATED.into(), Value::from(t.to_rfc3339()));
        }
        if let Some(t) = &self.updated {
            attrs.insert(ATTR_UPDATED.into(), Value::from(t.to_rfc3339()));
        }

        if let Some(k) = &self.validity.last_obs {
            attrs.insert(ATTR_LAST_OBS.into(), key_to_value(k));
        }
        if let Some(k) = &self.validity.last_valid {
            attrs.insert(ATTR_LAST_VALID.into(), key_to_value(k));
        }
        if let Some((start, end)) = self.validity.window() {
            attrs.insert(ATTR_FCAST_START.into(), key_to_value(&start));
            attrs.insert(ATTR_FCAST_END.into(), key_to_value(&end));
        }

        if let Some(g) = &self.generator {
            attrs.insert(ATTR_GENERATOR.into(), Value::from(g.clone()));
        }

        for (source, key) in &self.watermarks {
            attrs.insert(format!("{}{}", source, WATERMARK_SUFFIX), key_to_value(key));
        }

        attrs
    }
}

/// Time-index resolution against a dataset's declared span.
pub trait TimeIndexed {
    fn axis(&self) -> &TimeAxis;

    fn index_of(&self, key: &TimeKey) -> Result<usize> {
        Ok(self.axis().index_of(key)?)
    }

    fn time_of(&self, offset: usize) -> Result<TimeKey> {
        Ok(self.axis().time_of(offset)?)
    }

    fn index_range_of(&self, start: &TimeKey, end: &TimeKey) -> Result<(usize, usize)> {
        Ok(self.axis().index_range_of(start, end)?)
    }
}

/// Access to packing parameters.
pub trait Packed {
    fn packing_spec(&self) -> Option<&PackingSpec>;
}

/// Access to the provenance generator declaration.
pub trait Provenanced {
    fn generator(&self) -> Option<&str>;
}

/// Access to the reconciliation state.
pub trait Reconcilable {
    fn validity(&self) -> &Validity;
    fn validity_mut(&mut self) -> &mut Validity;
    fn watermark(&self, source: &str) -> Option<TimeKey>;
    fn set_watermark(&mut self, source: &str, key: TimeKey);
}

/// An open dataset: decoded metadata plus the object's layout. Does not hold
/// a borrow of the store; operations pass the store alongside the handle and
/// commit metadata with [`Dataset::flush_meta`].
#[derive(Debug, Clone)]
pub struct Dataset {
    path: DatasetPath,
    meta: DatasetMeta,
    info: ObjectInfo,
}

impl Dataset {
    /// Open a dataset, decoding its attributes.
    pub fn open<S: GridStore + ?Sized>(store: &S, path: DatasetPath) -> Result<Self> {
        let info = store.describe(&path)?;
        let attrs = store.read_attrs(&path)?;
        let meta = DatasetMeta::from_attrs(&attrs)
            .map_err(|e| ArchiveError::invalid_metadata(format!("{}: {}", path, e)))?;

        if let ObjectInfo::Array { shape, .. } = &info {
            let expected = meta.view.full_shape(
                meta.axis.len(),
                meta.view.spatial_shape(shape),
            );
            if &expected != shape {
                return Err(ArchiveError::invalid_metadata(format!(
                    "{}: array shape {:?} does not cover the {}-step season",
                    path,
                    shape,
                    meta.axis.len()
                )));
            }
        }

        Ok(Self { path, meta, info })
    }

    pub fn path(&self) -> &DatasetPath {
        &self.path
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }

    /// Storage type and full shape; fails for record tables.
    pub fn array_layout(&self) -> Result<(StorageType, &[usize])> {
        match &self.info {
            ObjectInfo::Array { storage, shape } => Ok((*storage, shape)),
            ObjectInfo::Records { .. } => Err(ArchiveError::invalid_metadata(format!(
                "{} is a record table, not an array",
                self.path
            ))),
        }
    }

    /// Length of the record table; fails for arrays.
    pub fn record_len(&self) -> Result<usize> {
        match &self.info {
            ObjectInfo::Records { len } => Ok(*len),
            ObjectInfo::Array { .. } => Err(ArchiveError::invalid_metadata(format!(
                "{} is an array, not a record table",
                self.path
            ))),
        }
    }

    /// Resolve the packing to use for a read or write.
    ///
    /// An explicit override wins; otherwise the attribute-declared packing is
    /// combined with the array's storage type; unscaled f64 arrays fall back
    /// to identity packing. Anything else is unpackable.
    pub fn effective_packing(&self, packing_override: Option<Packing>) -> Result<Packing> {
        if let Some(p) = packing_override {
            return Ok(p);
        }
        let (storage, _) = self.array_layout()?;
        match &self.meta.packing {
            Some(spec) => Ok(spec.with_storage(storage)),
            None if storage == StorageType::F64 => Ok(Packing::identity()),
            None => Err(ArchiveError::UnpackableType(self.path.to_string())),
        }
    }

    /// Stamp the `updated` attribute.
    pub fn touch(&mut self) {
        self.meta.updated = Some(Utc::now());
    }

    /// Commit the decoded metadata back as one atomic attribute-map write.
    pub fn flush_meta<S: GridStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        store.write_attrs(&self.path, &self.meta.to_attrs())
    }
}

impl TimeIndexed for Dataset {
    fn axis(&self) -> &TimeAxis {
        &self.meta.axis
    }
}

impl Packed for Dataset {
    fn packing_spec(&self) -> Option<&PackingSpec> {
        self.meta.packing.as_ref()
    }
}

impl Provenanced for Dataset {
    fn generator(&self) -> Option<&str> {
        self.meta.generator.as_deref()
    }
}

impl Reconcilable for Dataset {
    fn validity(&self) -> &Validity {
        &self.meta.validity
    }

    fn validity_mut(&mut self) -> &mut Validity {
        &mut self.meta.validity
    }

    fn watermark(&self, source: &str) -> Option<TimeKey> {
        self.meta.watermarks.get(source).copied()
    }

    fn set_watermark(&mut self, source: &str, key: TimeKey) {
        self.meta.watermarks.insert(source.to_string(), key);
    }
}

fn required<'a>(attrs: &'a AttrMap, key: &str) -> Result<&'a Value> {
    attrs
        .get(key)
        .ok_or_else(|| ArchiveError::invalid_metadata(format!("missing attribute '{}'", key)))
}

fn required_str<'a>(attrs: &'a AttrMap, key: &str) -> Result<&'a str> {
    required(attrs, key)?.as_str().ok_or_else(|| {
        ArchiveError::invalid_metadata(format!("attribute '{}' must be a string", key))
    })
}

fn optional_key(attrs: &AttrMap, period: Period, key: &str) -> Result<Option<TimeKey>> {
    attrs
        .get(key)
        .map(|v| key_from_value(period, v))
        .transpose()
}

fn optional_timestamp(attrs: &AttrMap, key: &str) -> Result<Option<DateTime<Utc>>> {
    attrs
        .get(key)
        .map(|v| {
            let s = v.as_str().ok_or_else(|| {
                ArchiveError::invalid_metadata(format!("attribute '{}' must be a string", key))
            })?;
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| ArchiveError::invalid_metadata(format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
}

pub(crate) fn axis_from_keys(start: TimeKey, end: TimeKey) -> Result<TimeAxis> {
    let axis = match (start, end) {
        (TimeKey::Date(s), TimeKey::Date(e)) if s <= e => TimeAxis::Date { start: s, end: e },
        (TimeKey::Doy(s), TimeKey::Doy(e)) if s <= e => TimeAxis::DayOfYear { start: s, end: e },
        (TimeKey::Year(s), TimeKey::Year(e)) if s <= e => TimeAxis::Year { start: s, end: e },
        _ => {
            return Err(ArchiveError::invalid_metadata(format!(
                "invalid season bounds {}..{}",
                start, end
            )))
        }
    };
    Ok(axis)
}

/// Decode a time key attribute for the given period kind.
pub(crate) fn key_from_value(period: Period, value: &Value) -> Result<TimeKey> {
    let key = match value {
        Value::String(s) => TimeKey::parse(period, s),
        Value::Number(n) => match period {
            Period::Doy => n.as_u64().map(|v| TimeKey::Doy(v as u32)),
            Period::Year => n.as_i64().map(|v| TimeKey::Year(v as i32)),
            Period::Date => None,
        },
        _ => None,
    };
    key.ok_or_else(|| {
        ArchiveError::invalid_metadata(format!(
            "cannot read {} time key from {}",
            period, value
        ))
    })
}

/// Encode a time key attribute: dates as strings, doy/year as integers.
pub(crate) fn key_to_value(key: &TimeKey) -> Value {
    match key {
        TimeKey::Date(_) => Value::from(key.to_string()),
        TimeKey::Doy(d) => Value::from(*d),
        TimeKey::Year(y) => Value::from(*y),
    }
}

/// JSON has no NaN, so a NaN sentinel is stored as the string "nan".
fn missing_to_value(missing: f64) -> Value {
    if missing.is_nan() {
        Value::from("nan")
    } else {
        Value::from(missing)
    }
}

fn missing_from_value(value: &Value) -> Result<f64> {
    match value {
        Value::String(s) if s == "nan" => Ok(f64::NAN),
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            ArchiveError::invalid_metadata(format!("bad missing sentinel {}", n))
        }),
        other => Err(ArchiveError::invalid_metadata(format!(
            "bad missing sentinel {}",
            other
        ))),
    }
}
