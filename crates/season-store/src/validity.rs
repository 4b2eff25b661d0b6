//! Observation/forecast reconciliation.
//!
//! Two producers write into the same time axis: an authoritative
//! observation/reanalysis feed and a provisional forecast feed. The state
//! machine here decides which writes are accepted, which are trimmed, and
//! which fail, and keeps the per-dataset validity attributes consistent:
//!
//! - `last_obs_date` only ever moves forward;
//! - the forecast window never includes a time the observation feed has
//!   claimed (`fcast_start_date > last_obs_date` whenever both exist);
//! - `last_valid_date` is always `max(last_obs_date, fcast_end_date)`,
//!   treating an absent operand as identity.
//!
//! All transitions work in offset space and convert back to time keys at the
//! edges; attribute updates are committed as a single atomic map write.

use ndarray::ArrayD;

use season_core::TimeKey;

use crate::dataset::{Dataset, Reconcilable, TimeIndexed};
use crate::error::{ArchiveError, Result};
use crate::insert;
use crate::store::GridStore;

/// Write an authoritative observation block and reconcile the forecast
/// window against it.
///
/// Advances `last_obs_date` (and the `<source>_end_date` watermark when a
/// source is named) monotonically, then narrows or clears the forecast
/// window as required. Returns the end time of the write.
pub fn write_observation<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    payload: &ArrayD<f64>,
    source: Option<&str>,
) -> Result<TimeKey> {
    let end = insert::insert(store, ds, start, payload, None)?;
    mark_observed(store, ds, end, source)?;
    Ok(end)
}

/// Record that authoritative data now extends through `end`, and reconcile.
///
/// Also used by the provenance path to keep a record table's validity
/// attributes in step with the rows just written.
pub(crate) fn mark_observed<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    end: TimeKey,
    source: Option<&str>,
) -> Result<()> {
    let end_offset = ds.index_of(&end)?;

    let last_obs = match ds.validity().last_obs {
        Some(prev) if ds.index_of(&prev)? >= end_offset => prev,
        _ => end,
    };
    ds.validity_mut().last_obs = Some(last_obs);

    if let Some(source) = source {
        let watermark = match ds.watermark(source) {
            Some(prev) if ds.index_of(&prev)? >= end_offset => prev,
            _ => end,
        };
        ds.set_watermark(source, watermark);
    }

    // reconcile against the (possibly further advanced) observation watermark
    let obs_offset = ds.index_of(&last_obs)?;
    reconcile(ds, obs_offset)?;
    recompute_last_valid(ds)?;

    ds.flush_meta(store)
}

/// T2: reconcile the forecast window with observations through `obs_offset`.
fn reconcile(ds: &mut Dataset, obs_offset: usize) -> Result<()> {
    let season_end = ds.axis().len() - 1;

    if obs_offset == season_end {
        // season complete; any forecast is moot
        if ds.validity().window().is_some() {
            tracing::debug!(dataset = %ds.path(), "season complete, dropping forecast window");
            ds.validity_mut().clear_window();
        }
        return Ok(());
    }

    let (window_start, window_end) = match ds.validity().window() {
        Some(w) => w,
        None => return Ok(()),
    };
    let start_offset = ds.index_of(&window_start)?;
    let end_offset = ds.index_of(&window_end)?;

    if start_offset > obs_offset {
        // forecast starts strictly after the observations; untouched
        return Ok(());
    }

    if end_offset <= obs_offset {
        tracing::debug!(
            dataset = %ds.path(),
            window_end = %window_end,
            "forecast fully superseded by observations"
        );
        ds.validity_mut().clear_window();
        return Ok(());
    }

    // the window still reaches past the observations; shrink it to the
    // unconfirmed remainder (metadata only, cells are not rewritten)
    let candidate = obs_offset + 1;
    if candidate < end_offset && candidate < season_end {
        let new_start = ds.time_of(candidate)?;
        tracing::debug!(
            dataset = %ds.path(),
            old_start = %window_start,
            new_start = %new_start,
            "narrowing forecast window"
        );
        ds.validity_mut().fcast_start = Some(new_start);
    } else {
        ds.validity_mut().clear_window();
    }

    Ok(())
}

/// T3: write a provisional forecast block.
///
/// A window that starts at or before `last_obs_date` is trimmed to its
/// still-unconfirmed remainder (with a logged notice); a window that is
/// entirely superseded fails with [`ArchiveError::ForecastStale`]. A start
/// before the season start fails with [`ArchiveError::SeasonBoundary`].
pub fn write_forecast<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    payload: &ArrayD<f64>,
) -> Result<TimeKey> {
    let signed = ds.axis().signed_offset(start)?;
    if signed < 0 {
        return Err(ArchiveError::SeasonBoundary {
            start: start.to_string(),
            season_start: ds.axis().start().to_string(),
        });
    }
    let start_offset = signed as usize;
    let layout = insert::payload_layout(ds, payload)?;

    let last_obs = match ds.validity().last_obs {
        None => return insert_forecast(store, ds, start, payload),
        Some(k) => k,
    };
    let obs_offset = ds.index_of(&last_obs)?;

    if start_offset > obs_offset {
        return insert_forecast(store, ds, start, payload);
    }

    let supplied_end = start_offset + layout.steps - 1;
    if supplied_end <= obs_offset {
        return Err(ArchiveError::ForecastStale {
            start: start.to_string(),
            end: ds.time_of(supplied_end)?.to_string(),
            last_obs: last_obs.to_string(),
        });
    }

    // partial overlap: keep only the part past the observation watermark
    let skip = obs_offset + 1 - start_offset;
    let trimmed_start = ds.time_of(obs_offset + 1)?;
    let trimmed = insert::trim_leading_steps(ds.meta().view, payload, skip);
    tracing::warn!(
        dataset = %ds.path(),
        supplied_start = %start,
        trimmed_start = %trimmed_start,
        dropped_steps = skip,
        "forecast truncated: window overlaps observations"
    );
    insert_forecast(store, ds, &trimmed_start, &trimmed)
}

/// T4: insert an already-reconciled forecast block and extend the window.
fn insert_forecast<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    payload: &ArrayD<f64>,
) -> Result<TimeKey> {
    let end = insert::insert(store, ds, start, payload, None)?;
    let end_offset = ds.index_of(&end)?;

    // window start is sticky: set once, immutable until cleared
    if ds.validity().fcast_start.is_none() {
        ds.validity_mut().fcast_start = Some(*start);
    }

    let window_end = match ds.validity().fcast_end {
        Some(prev) if ds.index_of(&prev)? >= end_offset => prev,
        _ => end,
    };
    ds.validity_mut().fcast_end = Some(window_end);

    let last_valid = match ds.validity().last_valid {
        Some(prev) if ds.index_of(&prev)? >= end_offset => prev,
        _ => end,
    };
    ds.validity_mut().last_valid = Some(last_valid);

    ds.flush_meta(store)?;
    Ok(end)
}

/// T5: drop the forecast window. Both attributes are cleared together.
pub fn remove_forecast<S: GridStore + ?Sized>(store: &mut S, ds: &mut Dataset) -> Result<()> {
    ds.validity_mut().clear_window();
    recompute_last_valid(ds)?;
    ds.flush_meta(store)
}

/// `last_valid_date := max(last_obs_date, fcast_end_date)`, nulls ignored.
fn recompute_last_valid(ds: &mut Dataset) -> Result<()> {
    let last_valid = match (ds.validity().last_obs, ds.validity().fcast_end) {
        (Some(obs), Some(fcast)) => {
            if ds.index_of(&fcast)? > ds.index_of(&obs)? {
                Some(fcast)
            } else {
                Some(obs)
            }
        }
        (Some(obs), None) => Some(obs),
        (None, Some(fcast)) => Some(fcast),
        (None, None) => None,
    };
    ds.validity_mut().last_valid = last_valid;
    Ok(())
}
