//! Derived per-time-step summary records.
//!
//! Each primary dataset can carry a companion record table holding one
//! summary row per time step: min/max/mean/median of the written block, a
//! generation timestamp, and optionally a source tag. The statistic to apply
//! is named by the companion's `generator` attribute and looked up in an
//! explicit [`GeneratorRegistry`] built at startup; there is no ambient
//! global registry.
//!
//! Rows are stored raw (never packed) in a fixed field order per generator,
//! with missing statistics as JSON nulls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ndarray::{ArrayViewD, Axis};
use num_traits::Float;
use serde_json::Value;

use season_core::TimeKey;

use crate::dataset::{self, Dataset, Provenanced, TimeIndexed};
use crate::error::{ArchiveError, Result};
use crate::store::GridStore;
use crate::validity;

pub const GEN_DAILY_STATS: &str = "daily_stats";
pub const GEN_DAILY_ACCUM_STATS: &str = "daily_accum_stats";
pub const GEN_PAIRED_EXTREMA: &str = "paired_extrema";

/// min/max/mean/median of one array, missing cells ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl SummaryStats {
    /// Compute over a single time step, skipping nulls. An all-null step
    /// yields all-NaN statistics (serialized as nulls).
    pub fn of<F>(step: &ArrayViewD<'_, F>) -> Self
    where
        F: Float,
        f64: From<F>,
    {
        let mut values: Vec<f64> = step
            .iter()
            .filter(|v| !v.is_nan())
            .map(|&v| f64::from(v))
            .collect();
        if values.is_empty() {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                median: f64::NAN,
            };
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let n = values.len();
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        Self {
            min: values[0],
            max: values[n - 1],
            mean: values.iter().sum::<f64>() / n as f64,
            median,
        }
    }
}

/// min/max/mean of one array, used by the paired-extrema generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremaStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ExtremaStats {
    pub fn of<F>(step: &ArrayViewD<'_, F>) -> Self
    where
        F: Float,
        f64: From<F>,
    {
        let s = SummaryStats::of(step);
        Self {
            min: s.min,
            max: s.max,
            mean: s.mean,
        }
    }
}

/// One time step's worth of inputs, handed to a generator function.
pub struct StepInput<'a> {
    pub key: TimeKey,
    pub arrays: Vec<ArrayViewD<'a, f64>>,
    pub source: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
}

impl<'a> StepInput<'a> {
    fn array(&self, idx: usize, generator: &str) -> Result<&ArrayViewD<'a, f64>> {
        self.arrays.get(idx).ok_or_else(|| {
            ArchiveError::invalid_metadata(format!(
                "generator '{}' needs {} input array(s), got {}",
                generator,
                idx + 1,
                self.arrays.len()
            ))
        })
    }
}

/// A generated summary row.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvenanceRecord {
    /// `(timeKey, min, max, mean, median, timestamp)`
    Daily {
        key: TimeKey,
        stats: SummaryStats,
        timestamp: DateTime<Utc>,
    },
    /// `(timeKey, dailyMin..dailyMedian, accumMin..accumMedian, timestamp)`
    DailyAccum {
        key: TimeKey,
        daily: SummaryStats,
        accum: SummaryStats,
        timestamp: DateTime<Utc>,
    },
    /// `(timeKey, minA, maxA, meanA, minB, maxB, meanB, sourceTag, timestamp)`
    PairedExtrema {
        key: TimeKey,
        a: ExtremaStats,
        b: ExtremaStats,
        source: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ProvenanceRecord {
    pub fn key(&self) -> TimeKey {
        match self {
            Self::Daily { key, .. }
            | Self::DailyAccum { key, .. }
            | Self::PairedExtrema { key, .. } => *key,
        }
    }

    /// Encode as a fixed-order JSON row. NaN statistics become nulls.
    pub fn to_row(&self) -> Value {
        let mut row = Vec::new();
        match self {
            Self::Daily {
                key,
                stats,
                timestamp,
            } => {
                row.push(dataset::key_to_value(key));
                push_stat(&mut row, stats.min);
                push_stat(&mut row, stats.max);
                push_stat(&mut row, stats.mean);
                push_stat(&mut row, stats.median);
                row.push(Value::from(timestamp.to_rfc3339()));
            }
            Self::DailyAccum {
                key,
                daily,
                accum,
                timestamp,
            } => {
                row.push(dataset::key_to_value(key));
                for s in [daily, accum] {
                    push_stat(&mut row, s.min);
                    push_stat(&mut row, s.max);
                    push_stat(&mut row, s.mean);
                    push_stat(&mut row, s.median);
                }
                row.push(Value::from(timestamp.to_rfc3339()));
            }
            Self::PairedExtrema {
                key,
                a,
                b,
                source,
                timestamp,
            } => {
                row.push(dataset::key_to_value(key));
                for s in [a, b] {
                    push_stat(&mut row, s.min);
                    push_stat(&mut row, s.max);
                    push_stat(&mut row, s.mean);
                }
                row.push(match source {
                    Some(s) => Value::from(s.clone()),
                    None => Value::Null,
                });
                row.push(Value::from(timestamp.to_rfc3339()));
            }
        }
        Value::Array(row)
    }
}

fn push_stat(row: &mut Vec<Value>, v: f64) {
    row.push(if v.is_nan() { Value::Null } else { Value::from(v) });
}

/// A statistic-generator function, one call per time step.
pub type Generator = fn(&StepInput<'_>) -> Result<ProvenanceRecord>;

fn daily_stats(input: &StepInput<'_>) -> Result<ProvenanceRecord> {
    Ok(ProvenanceRecord::Daily {
        key: input.key,
        stats: SummaryStats::of(input.array(0, GEN_DAILY_STATS)?),
        timestamp: input.timestamp,
    })
}

fn daily_accum_stats(input: &StepInput<'_>) -> Result<ProvenanceRecord> {
    Ok(ProvenanceRecord::DailyAccum {
        key: input.key,
        daily: SummaryStats::of(input.array(0, GEN_DAILY_ACCUM_STATS)?),
        accum: SummaryStats::of(input.array(1, GEN_DAILY_ACCUM_STATS)?),
        timestamp: input.timestamp,
    })
}

fn paired_extrema(input: &StepInput<'_>) -> Result<ProvenanceRecord> {
    Ok(ProvenanceRecord::PairedExtrema {
        key: input.key,
        a: ExtremaStats::of(input.array(0, GEN_PAIRED_EXTREMA)?),
        b: ExtremaStats::of(input.array(1, GEN_PAIRED_EXTREMA)?),
        source: input.source.map(str::to_string),
        timestamp: input.timestamp,
    })
}

/// Named statistic generators, constructed at startup and passed explicitly.
#[derive(Clone)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Generator>,
}

impl GeneratorRegistry {
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// The built-in generators.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(GEN_DAILY_STATS, daily_stats);
        reg.register(GEN_DAILY_ACCUM_STATS, daily_accum_stats);
        reg.register(GEN_PAIRED_EXTREMA, paired_extrema);
        reg
    }

    pub fn register(&mut self, name: &str, generator: Generator) {
        self.generators.insert(name.to_string(), generator);
    }

    pub fn get(&self, name: &str) -> Result<Generator> {
        self.generators
            .get(name)
            .copied()
            .ok_or_else(|| ArchiveError::UnknownGenerator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("names", &self.generators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Generate one record per time step of the input blocks.
///
/// Every input must carry an explicit time dimension (placed per the record
/// table's view) of the same length; the generator named by the table's
/// `generator` attribute is applied step by step.
pub fn generate_records(
    ds: &Dataset,
    registry: &GeneratorRegistry,
    start: &TimeKey,
    inputs: &[ArrayViewD<'_, f64>],
    source: Option<&str>,
) -> Result<Vec<ProvenanceRecord>> {
    let name = ds.generator().ok_or_else(|| {
        ArchiveError::invalid_metadata(format!("{} has no generator attribute", ds.path()))
    })?;
    let generator = registry.get(name)?;

    let first = inputs.first().ok_or_else(|| {
        ArchiveError::invalid_metadata("provenance generation needs at least one input array")
    })?;
    let view = ds.meta().view;
    let time_axis = Axis(view.time_axis(first.ndim()));
    let steps = first.shape()[time_axis.0];
    for input in inputs {
        if input.ndim() != first.ndim() || input.shape()[time_axis.0] != steps {
            return Err(ArchiveError::ShapeMismatch {
                payload: input.shape().to_vec(),
                expected: first.shape().to_vec(),
            });
        }
    }

    let start_offset = ds.index_of(start)?;
    let timestamp = Utc::now();

    let mut records = Vec::with_capacity(steps);
    for step in 0..steps {
        let key = ds.time_of(start_offset + step)?;
        let input = StepInput {
            key,
            arrays: inputs
                .iter()
                .map(|a| a.index_axis(time_axis, step))
                .collect(),
            source,
            timestamp,
        };
        records.push(generator(&input)?);
    }
    Ok(records)
}

/// Write generated records into the table starting at `startTime`.
pub fn insert_provenance<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    records: &[ProvenanceRecord],
) -> Result<TimeKey> {
    if records.is_empty() {
        return Err(ArchiveError::invalid_metadata(
            "no provenance records to write",
        ));
    }
    let start_offset = ds.index_of(start)?;
    let end = ds.time_of(start_offset + records.len() - 1)?;

    let rows: Vec<Value> = records.iter().map(ProvenanceRecord::to_row).collect();
    store.write_records(ds.path(), start_offset, &rows)?;

    ds.touch();
    ds.flush_meta(store)?;

    tracing::debug!(
        dataset = %ds.path(),
        start = %start,
        end = %end,
        rows = records.len(),
        "wrote provenance records"
    );
    Ok(end)
}

/// Insert records, then advance the table's own validity watermark so
/// provenance stays observationally consistent with its parent.
pub fn update_provenance<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    records: &[ProvenanceRecord],
    source: Option<&str>,
) -> Result<TimeKey> {
    let end = insert_provenance(store, ds, start, records)?;
    validity::mark_observed(store, ds, end, source)?;
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::{ArrayD, IxDyn};
    use season_core::{TimeAxis, View};

    use crate::dataset::{DatasetMeta, Reconcilable};
    use crate::store::{DatasetPath, MemoryStore};

    fn date(m: u32, d: u32) -> TimeKey {
        TimeKey::Date(NaiveDate::from_ymd_opt(2020, m, d).unwrap())
    }

    fn setup(generator: &str) -> (MemoryStore, Dataset) {
        let mut store = MemoryStore::new();
        let path = DatasetPath::new("prcp.daily").unwrap().provenance();

        let axis = TimeAxis::Date {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 1, 10).unwrap(),
        };
        let mut meta = DatasetMeta::new(axis, View::Txy);
        meta.generator = Some(generator.to_string());

        store.create_records(&path, axis.len()).unwrap();
        store.write_attrs(&path, &meta.to_attrs()).unwrap();

        let ds = Dataset::open(&store, path).unwrap();
        (store, ds)
    }

    fn block(values: Vec<f64>, steps: usize) -> ArrayD<f64> {
        let per_step = values.len() / steps;
        ArrayD::from_shape_vec(IxDyn(&[steps, 1, per_step]), values).unwrap()
    }

    #[test]
    fn test_summary_stats_ignores_missing() {
        let step = block(vec![1.0, f64::NAN, 3.0, 2.0], 1);
        let s = SummaryStats::of(&step.index_axis(Axis(0), 0));
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.median, 2.0);
    }

    #[test]
    fn test_summary_stats_all_missing() {
        let step = block(vec![f64::NAN, f64::NAN], 1);
        let s = SummaryStats::of(&step.index_axis(Axis(0), 0));
        assert!(s.min.is_nan());
        assert!(s.median.is_nan());
    }

    #[test]
    fn test_even_count_median_interpolates() {
        let step = block(vec![1.0, 2.0, 3.0, 4.0], 1);
        let s = SummaryStats::of(&step.index_axis(Axis(0), 0));
        assert_eq!(s.median, 2.5);
    }

    #[test]
    fn test_generate_daily_records() {
        let (_, ds) = setup(GEN_DAILY_STATS);
        let reg = GeneratorRegistry::builtin();
        let input = block(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);

        let records =
            generate_records(&ds, &reg, &date(1, 2), &[input.view()], None).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key(), date(1, 2));
        assert_eq!(records[2].key(), date(1, 4));

        match &records[1] {
            ProvenanceRecord::Daily { stats, .. } => {
                assert_eq!(stats.min, 3.0);
                assert_eq!(stats.max, 4.0);
            }
            other => panic!("expected daily record, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_row_layout() {
        let record = ProvenanceRecord::Daily {
            key: date(1, 5),
            stats: SummaryStats {
                min: 0.5,
                max: 9.0,
                mean: 4.0,
                median: f64::NAN,
            },
            timestamp: Utc::now(),
        };
        let row = record.to_row();
        let row = row.as_array().unwrap();
        assert_eq!(row.len(), 6);
        assert_eq!(row[0], Value::from("2020-01-05"));
        assert_eq!(row[1], Value::from(0.5));
        assert_eq!(row[4], Value::Null);
        assert!(row[5].is_string());
    }

    #[test]
    fn test_paired_extrema_row_layout() {
        let record = ProvenanceRecord::PairedExtrema {
            key: date(1, 5),
            a: ExtremaStats { min: 1.0, max: 2.0, mean: 1.5 },
            b: ExtremaStats { min: 3.0, max: 4.0, mean: 3.5 },
            source: Some("gdas".to_string()),
            timestamp: Utc::now(),
        };
        let row = record.to_row();
        let row = row.as_array().unwrap();
        assert_eq!(row.len(), 9);
        assert_eq!(row[7], Value::from("gdas"));
    }

    #[test]
    fn test_unknown_generator() {
        let (_, ds) = setup("no_such_stat");
        let reg = GeneratorRegistry::builtin();
        let input = block(vec![1.0, 2.0], 1);

        let err = generate_records(&ds, &reg, &date(1, 1), &[input.view()], None);
        assert!(matches!(err, Err(ArchiveError::UnknownGenerator(_))));
    }

    #[test]
    fn test_paired_generator_needs_two_inputs() {
        let (_, ds) = setup(GEN_DAILY_ACCUM_STATS);
        let reg = GeneratorRegistry::builtin();
        let input = block(vec![1.0, 2.0], 1);

        let err = generate_records(&ds, &reg, &date(1, 1), &[input.view()], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_insert_provenance_writes_rows() {
        let (mut store, mut ds) = setup(GEN_DAILY_STATS);
        let reg = GeneratorRegistry::builtin();
        let input = block(vec![1.0, 2.0, 3.0, 4.0], 2);

        let records =
            generate_records(&ds, &reg, &date(1, 3), &[input.view()], None).unwrap();
        let end = insert_provenance(&mut store, &mut ds, &date(1, 3), &records).unwrap();
        assert_eq!(end, date(1, 4));

        let rows = store.read_records(ds.path()).unwrap();
        assert!(rows[0].is_none());
        assert!(rows[2].is_some());
        assert!(rows[3].is_some());
        assert!(rows[4].is_none());
    }

    #[test]
    fn test_update_provenance_advances_validity() {
        let (mut store, mut ds) = setup(GEN_DAILY_STATS);
        let reg = GeneratorRegistry::builtin();
        let input = block(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);

        let records =
            generate_records(&ds, &reg, &date(1, 1), &[input.view()], Some("gdas")).unwrap();
        update_provenance(&mut store, &mut ds, &date(1, 1), &records, Some("gdas")).unwrap();

        assert_eq!(ds.validity().last_obs, Some(date(1, 3)));
        assert_eq!(ds.validity().last_valid, Some(date(1, 3)));
        assert_eq!(ds.watermark("gdas"), Some(date(1, 3)));
    }

    #[test]
    fn test_insert_provenance_out_of_bounds() {
        let (mut store, mut ds) = setup(GEN_DAILY_STATS);
        let records: Vec<ProvenanceRecord> = (0..3)
            .map(|i| ProvenanceRecord::Daily {
                key: date(1, 9 + i),
                stats: SummaryStats { min: 0.0, max: 0.0, mean: 0.0, median: 0.0 },
                timestamp: Utc::now(),
            })
            .collect();
        // Jan 9 + 3 rows runs past the Jan 10 season end
        let err = insert_provenance(&mut store, &mut ds, &date(1, 9), &records);
        assert!(matches!(err, Err(ArchiveError::Bounds { .. })));
    }
}
