//! Time-series write path.
//!
//! Writes a semantic payload (one time step, or a block whose time dimension
//! matches the dataset's view) into the correct array region. This layer
//! never truncates: a block that overruns the season fails with a bounds
//! error before anything is written. Truncation is a policy decision made by
//! the validity state machine.

use ndarray::{ArrayD, Axis, Slice};

use season_core::{Packing, TimeKey, View};

use crate::codec;
use crate::dataset::{Dataset, TimeIndexed};
use crate::error::{ArchiveError, Result};
use crate::store::GridStore;

/// How a payload maps onto the time axis.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PayloadLayout {
    /// Number of time steps covered.
    pub steps: usize,
    /// Whether the payload carries an explicit time dimension.
    pub has_time_dim: bool,
}

/// Validate a payload against the dataset's spatial shape and view.
pub(crate) fn payload_layout(ds: &Dataset, payload: &ArrayD<f64>) -> Result<PayloadLayout> {
    let (_, shape) = ds.array_layout()?;
    let view = ds.meta().view;
    let spatial = view.spatial_shape(shape);

    if payload.ndim() == spatial.len() {
        if payload.shape() != spatial {
            return Err(shape_mismatch(payload.shape(), spatial));
        }
        return Ok(PayloadLayout {
            steps: 1,
            has_time_dim: false,
        });
    }

    if payload.ndim() == spatial.len() + 1 {
        let payload_spatial = view.spatial_shape(payload.shape());
        if payload_spatial != spatial {
            return Err(shape_mismatch(payload.shape(), spatial));
        }
        let steps = payload.shape()[view.time_axis(payload.ndim())];
        if steps == 0 {
            return Err(shape_mismatch(payload.shape(), spatial));
        }
        return Ok(PayloadLayout {
            steps,
            has_time_dim: true,
        });
    }

    Err(shape_mismatch(payload.shape(), spatial))
}

fn shape_mismatch(payload: &[usize], expected: &[usize]) -> ArchiveError {
    ArchiveError::ShapeMismatch {
        payload: payload.to_vec(),
        expected: expected.to_vec(),
    }
}

/// Drop the first `skip` time steps from a block payload.
pub(crate) fn trim_leading_steps(view: View, payload: &ArrayD<f64>, skip: usize) -> ArrayD<f64> {
    let time_axis = Axis(view.time_axis(payload.ndim()));
    payload
        .slice_axis(time_axis, Slice::from(skip as isize..))
        .to_owned()
}

/// Write `payload` into the dataset starting at `startTime`.
///
/// Returns the time key of the last step written. Fails with a bounds error
/// if the payload runs past the season end; nothing is written in that case.
pub fn insert<S: GridStore + ?Sized>(
    store: &mut S,
    ds: &mut Dataset,
    start: &TimeKey,
    payload: &ArrayD<f64>,
    packing_override: Option<Packing>,
) -> Result<TimeKey> {
    let layout = payload_layout(ds, payload)?;
    let start_offset = ds.index_of(start)?;
    let end_offset = start_offset + layout.steps - 1;
    let end = ds.time_of(end_offset)?;

    let packing = ds.effective_packing(packing_override)?;
    let view = ds.meta().view;

    // give single-step payloads an explicit, length-one time dimension
    let block = if layout.has_time_dim {
        payload.view()
    } else {
        payload
            .view()
            .insert_axis(Axis(view.time_axis(payload.ndim() + 1)))
    };
    let packed = codec::pack_block(&block.to_owned(), &packing);

    let (_, shape) = ds.array_layout()?;
    let slices = view.time_slices(shape.len(), start_offset, end_offset + 1);

    let mut array = store.read_array(ds.path())?;
    array.assign_region(&slices, &packed)?;
    store.write_array(ds.path(), &array)?;

    ds.touch();
    ds.flush_meta(store)?;

    tracing::debug!(
        dataset = %ds.path(),
        start = %start,
        end = %end,
        steps = layout.steps,
        "wrote time block"
    );

    Ok(end)
}

/// Read the inclusive time range `[start, end]`, unpacked to semantic values.
pub fn read_slice<S: GridStore + ?Sized>(
    store: &S,
    ds: &Dataset,
    start: &TimeKey,
    end: &TimeKey,
    packing_override: Option<Packing>,
) -> Result<ArrayD<f64>> {
    let (t0, t1) = ds.index_range_of(start, end)?;
    let packing = ds.effective_packing(packing_override)?;
    let (_, shape) = ds.array_layout()?;
    let slices = ds.meta().view.time_slices(shape.len(), t0, t1);

    let array = store.read_array(ds.path())?;
    Ok(codec::unpack_block(&array.slice_region(&slices), &packing))
}
