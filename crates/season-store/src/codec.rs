//! Value codec: stored ↔ semantic conversion.
//!
//! The semantic side is `f64` with the dataset's missing marker (NaN for
//! float data, an explicit sentinel for integer data). The stored side is a
//! scaled value in one of the storage types, with its own missing sentinel.
//! Comparisons against the float marker always use an is-null test; NaN is
//! not self-equal.

use ndarray::ArrayD;
use season_core::{Packing, StorageType};

use crate::store::StoredArray;

/// Convert one semantic value to storage units.
///
/// The result is still an `f64`; the caller casts it into the storage type.
/// Integer storage values are rounded at the cast, not here.
pub fn pack_value(value: f64, packing: &Packing) -> f64 {
    if packing.semantic.is_missing(value) {
        packing.missing
    } else {
        value * packing.multiplier
    }
}

/// Convert one stored value (widened to `f64`) back to its semantic form.
pub fn unpack_value(stored: f64, packing: &Packing) -> f64 {
    if packing.is_stored_missing(stored) {
        packing.semantic.missing_marker()
    } else {
        stored / packing.multiplier
    }
}

/// Scalar edge for callers that want an explicit null: `None` is missing.
pub fn pack_opt(value: Option<f64>, packing: &Packing) -> f64 {
    match value {
        Some(v) => pack_value(v, packing),
        None => packing.missing,
    }
}

/// Scalar edge inverse of [`pack_opt`].
pub fn unpack_opt(stored: f64, packing: &Packing) -> Option<f64> {
    let v = unpack_value(stored, packing);
    if packing.semantic.is_missing(v) {
        None
    } else {
        Some(v)
    }
}

/// Pack a semantic block into a stored array of the packing's storage type.
pub fn pack_block(block: &ArrayD<f64>, packing: &Packing) -> StoredArray {
    let staged = block.mapv(|v| pack_value(v, packing));
    match packing.storage {
        StorageType::I16 => StoredArray::I16(staged.mapv(|v| v.round() as i16)),
        StorageType::I32 => StoredArray::I32(staged.mapv(|v| v.round() as i32)),
        StorageType::F32 => StoredArray::F32(staged.mapv(|v| v as f32)),
        StorageType::F64 => StoredArray::F64(staged),
    }
}

/// Unpack a stored array into a semantic block.
pub fn unpack_block(stored: &StoredArray, packing: &Packing) -> ArrayD<f64> {
    let widened = match stored {
        StoredArray::I16(a) => a.mapv(|v| v as f64),
        StoredArray::I32(a) => a.mapv(|v| v as f64),
        StoredArray::F32(a) => a.mapv(|v| v as f64),
        StoredArray::F64(a) => a.clone(),
    };
    widened.mapv(|v| unpack_value(v, packing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use season_core::SemanticType;

    fn scaled_i16() -> Packing {
        Packing {
            storage: StorageType::I16,
            semantic: SemanticType::Float,
            multiplier: 10.0,
            missing: -32768.0,
        }
    }

    #[test]
    fn test_pack_unpack_scalar_roundtrip() {
        let p = scaled_i16();
        for x in [0.0, 1.5, -7.3, 120.4] {
            let stored = pack_value(x, &p).round();
            let back = unpack_value(stored, &p);
            assert!((back - x).abs() < 1e-9, "{} -> {} -> {}", x, stored, back);
        }
    }

    #[test]
    fn test_pack_missing_becomes_sentinel() {
        let p = scaled_i16();
        assert_eq!(pack_value(f64::NAN, &p), -32768.0);
        assert!(unpack_value(-32768.0, &p).is_nan());
    }

    #[test]
    fn test_unpack_missing_is_null_not_equal() {
        let p = scaled_i16();
        let missing = unpack_value(-32768.0, &p);
        // the marker is not self-equal; is_nan is the only valid test
        assert_ne!(missing, missing);
        assert!(missing.is_nan());
    }

    #[test]
    fn test_opt_scalar_edge() {
        let p = scaled_i16();
        assert_eq!(pack_opt(None, &p), -32768.0);
        assert_eq!(pack_opt(Some(1.5), &p), 15.0);
        assert_eq!(unpack_opt(-32768.0, &p), None);
        assert_eq!(unpack_opt(15.0, &p), Some(1.5));
    }

    #[test]
    fn test_int_semantic_sentinel() {
        let p = Packing {
            storage: StorageType::I32,
            semantic: SemanticType::Int(-9999),
            multiplier: 1.0,
            missing: -999999.0,
        };
        assert_eq!(pack_value(-9999.0, &p), -999999.0);
        assert_eq!(unpack_value(-999999.0, &p), -9999.0);
        assert_eq!(unpack_value(42.0, &p), 42.0);
    }

    #[test]
    fn test_block_roundtrip_with_missing() {
        let p = scaled_i16();
        let block = ArrayD::from_shape_vec(
            IxDyn(&[2, 2]),
            vec![1.5, f64::NAN, -7.3, 0.0],
        )
        .unwrap();

        let stored = pack_block(&block, &p);
        match &stored {
            StoredArray::I16(a) => {
                assert_eq!(a[[0, 0]], 15);
                assert_eq!(a[[0, 1]], -32768);
                assert_eq!(a[[1, 0]], -73);
                assert_eq!(a[[1, 1]], 0);
            }
            _ => panic!("expected i16 storage"),
        }

        let back = unpack_block(&stored, &p);
        assert_eq!(back[[0, 0]], 1.5);
        assert!(back[[0, 1]].is_nan());
        assert_eq!(back[[1, 0]], -7.3);
        assert_eq!(back[[1, 1]], 0.0);
    }

    #[test]
    fn test_identity_packing_passes_nan_through() {
        let p = Packing::identity();
        let block = ArrayD::from_shape_vec(IxDyn(&[2]), vec![3.25, f64::NAN]).unwrap();
        let stored = pack_block(&block, &p);
        let back = unpack_block(&stored, &p);
        assert_eq!(back[[0]], 3.25);
        assert!(back[[1]].is_nan());
    }
}
