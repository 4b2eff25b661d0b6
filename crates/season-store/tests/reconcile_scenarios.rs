//! End-to-end reconciliation scenarios against a filesystem-backed archive.
//!
//! Walks one season through the full observation/forecast lifecycle and
//! checks the validity attributes, the stored cells, and persistence across
//! reopen at each stage.

use chrono::NaiveDate;
use ndarray::{ArrayD, IxDyn};
use serde_json::Value;

use season_core::TimeKey;
use season_store::{Archive, ArchiveConfig, ArchiveError, FsStore};

const SCHEMA: &str = r#"
datasets:
  - id: prcp.global.daily
    period: date
    start: 2020-01-01
    end: 2020-12-31
    view: tyx
    storage: int16
    spatial_shape: [3, 4]
    packing:
      unpack: "(float,nan)"
      multiplier: 10.0
      missing: -32768
    provenance:
      generator: daily_stats
"#;

const DATASET: &str = "prcp.global.daily";

fn date(m: u32, d: u32) -> TimeKey {
    TimeKey::Date(NaiveDate::from_ymd_opt(2020, m, d).unwrap())
}

fn block(steps: usize, value: f64) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(&[steps, 3, 4]), value)
}

fn open_archive(root: &std::path::Path) -> Archive<FsStore> {
    let mut archive = Archive::open_fs(root).unwrap();
    let config = ArchiveConfig::from_yaml(SCHEMA).unwrap();
    archive.build(&config).unwrap();
    archive
}

#[test]
fn test_season_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = open_archive(dir.path());

    // ten days of observations from the season start
    let end = archive
        .write_observation(DATASET, &date(1, 1), &block(10, 1.0), Some("gdas"))
        .unwrap();
    assert_eq!(end, date(1, 10));
    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.last_obs, Some(date(1, 10)));
    assert_eq!(v.last_valid, Some(date(1, 10)));
    assert_eq!(v.window(), None);

    // a seven-day forecast picks up where observations end
    let end = archive
        .write_forecast(DATASET, &date(1, 11), &block(7, 0.5))
        .unwrap();
    assert_eq!(end, date(1, 17));
    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.window(), Some((date(1, 11), date(1, 17))));
    assert_eq!(v.last_valid, Some(date(1, 17)));

    // observations catch up into the forecast window; it narrows
    archive
        .write_observation(DATASET, &date(1, 8), &block(8, 2.0), Some("gdas"))
        .unwrap();
    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.last_obs, Some(date(1, 15)));
    assert_eq!(v.window(), Some((date(1, 16), date(1, 17))));
    assert_eq!(v.last_valid, Some(date(1, 17)));

    // observations pass the window end; the window clears
    archive
        .write_observation(DATASET, &date(1, 16), &block(5, 3.0), Some("gdas"))
        .unwrap();
    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.last_obs, Some(date(1, 20)));
    assert_eq!(v.window(), None);
    assert_eq!(v.last_valid, Some(date(1, 20)));

    // a forecast entirely behind the observations is rejected outright
    let err = archive.write_forecast(DATASET, &date(1, 5), &block(3, 0.5));
    assert!(matches!(err, Err(ArchiveError::ForecastStale { .. })));

    // observed cells reflect the latest writes, forecast overwrites included
    let out = archive.read_slice(DATASET, &date(1, 1), &date(1, 20)).unwrap();
    assert_eq!(out.shape(), &[20, 3, 4]);
    assert_eq!(out[[0, 0, 0]], 1.0); // Jan 1, first pass
    assert_eq!(out[[9, 2, 3]], 2.0); // Jan 10, overwritten by the second pass
    assert_eq!(out[[16, 0, 0]], 0.5); // Jan 17, forecast remainder
    assert_eq!(out[[19, 1, 1]], 3.0); // Jan 20, third pass
}

#[test]
fn test_validity_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut archive = open_archive(dir.path());
        archive
            .write_observation(DATASET, &date(1, 1), &block(10, 1.0), Some("gdas"))
            .unwrap();
        archive
            .write_forecast(DATASET, &date(1, 11), &block(7, 0.5))
            .unwrap();
    }

    // a fresh handle sees the committed state
    let archive = Archive::open_fs(dir.path()).unwrap();
    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.last_obs, Some(date(1, 10)));
    assert_eq!(v.window(), Some((date(1, 11), date(1, 17))));
    assert_eq!(v.last_valid, Some(date(1, 17)));

    let out = archive.read_slice(DATASET, &date(1, 10), &date(1, 11)).unwrap();
    assert_eq!(out[[0, 0, 0]], 1.0);
    assert_eq!(out[[1, 0, 0]], 0.5);
}

#[test]
fn test_overlapping_forecast_is_trimmed_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = open_archive(dir.path());

    archive
        .write_observation(DATASET, &date(1, 1), &block(10, 1.0), None)
        .unwrap();
    // supplied Jan 8..Jan 14; the Jan 8..10 prefix is already observed
    let end = archive
        .write_forecast(DATASET, &date(1, 8), &block(7, 0.5))
        .unwrap();
    assert_eq!(end, date(1, 14));

    let v = archive.read_validity(DATASET).unwrap();
    assert_eq!(v.window(), Some((date(1, 11), date(1, 14))));

    let out = archive.read_slice(DATASET, &date(1, 8), &date(1, 11)).unwrap();
    assert_eq!(out[[0, 0, 0]], 1.0);
    assert_eq!(out[[2, 0, 0]], 1.0);
    assert_eq!(out[[3, 0, 0]], 0.5);
}

#[test]
fn test_forecast_before_season_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = open_archive(dir.path());

    let start = TimeKey::Date(NaiveDate::from_ymd_opt(2019, 12, 28).unwrap());
    let err = archive.write_forecast(DATASET, &start, &block(5, 0.5));
    assert!(matches!(err, Err(ArchiveError::SeasonBoundary { .. })));
}

#[test]
fn test_provenance_rows_follow_observations() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = open_archive(dir.path());

    let mut data = block(3, 0.0);
    for step in 0..3 {
        for y in 0..3 {
            for x in 0..4 {
                data[[step, y, x]] = (step * 10 + y * 4 + x) as f64;
            }
        }
    }
    archive
        .write_observation(DATASET, &date(1, 1), &data, Some("gdas"))
        .unwrap();
    archive
        .update_provenance(DATASET, &date(1, 1), &[data.view()], Some("gdas"))
        .unwrap();

    let rows = archive.read_provenance(DATASET).unwrap();
    assert_eq!(rows.len(), 366);

    // Jan 2 holds values 10..=21
    let row = rows[1].as_ref().unwrap().as_array().unwrap().clone();
    assert_eq!(row[0], Value::from("2020-01-02"));
    assert_eq!(row[1], Value::from(10.0)); // min
    assert_eq!(row[2], Value::from(21.0)); // max
    assert_eq!(row[3], Value::from(15.5)); // mean
    assert_eq!(row[4], Value::from(15.5)); // median
    assert!(rows[3].is_none());
}

#[test]
fn test_read_outside_season_is_bounds_error() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(dir.path());

    let late = TimeKey::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
    let err = archive.read_slice(DATASET, &date(12, 30), &late);
    assert!(matches!(err, Err(ArchiveError::Bounds { .. })));
}
