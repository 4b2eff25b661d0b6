//! Typed stored arrays.
//!
//! A stored array is the on-disk representation of a dataset: one of a small
//! set of element types, dynamic-dimensional. The codec converts between
//! these and the semantic `f64`/missing-marker side.

use ndarray::{ArrayD, IxDyn, SliceInfoElem};
use season_core::StorageType;

use crate::error::{ArchiveError, Result};

/// A dynamic-dimensional array in one of the supported storage types.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredArray {
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl StoredArray {
    /// The element type.
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::I16(_) => StorageType::I16,
            Self::I32(_) => StorageType::I32,
            Self::F32(_) => StorageType::F32,
            Self::F64(_) => StorageType::F64,
        }
    }

    /// The array shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::I16(a) => a.shape(),
            Self::I32(a) => a.shape(),
            Self::F32(a) => a.shape(),
            Self::F64(a) => a.shape(),
        }
    }

    /// Create an array of the given type and shape, filled with `fill`
    /// expressed in storage units (e.g. the missing sentinel).
    pub fn filled(storage: StorageType, shape: &[usize], fill: f64) -> Self {
        let dim = IxDyn(shape);
        match storage {
            StorageType::I16 => Self::I16(ArrayD::from_elem(dim, fill as i16)),
            StorageType::I32 => Self::I32(ArrayD::from_elem(dim, fill as i32)),
            StorageType::F32 => Self::F32(ArrayD::from_elem(dim, fill as f32)),
            StorageType::F64 => Self::F64(ArrayD::from_elem(dim, fill)),
        }
    }

    /// Assign `src` into the region selected by `slices`. The source must
    /// have the same element type as the target.
    pub fn assign_region(&mut self, slices: &[SliceInfoElem], src: &StoredArray) -> Result<()> {
        match (self, src) {
            (Self::I16(dst), Self::I16(s)) => dst.slice_mut(slices).assign(s),
            (Self::I32(dst), Self::I32(s)) => dst.slice_mut(slices).assign(s),
            (Self::F32(dst), Self::F32(s)) => dst.slice_mut(slices).assign(s),
            (Self::F64(dst), Self::F64(s)) => dst.slice_mut(slices).assign(s),
            (dst, s) => {
                return Err(ArchiveError::storage(format!(
                    "element type mismatch: cannot write {} into {}",
                    s.storage_type(),
                    dst.storage_type()
                )))
            }
        }
        Ok(())
    }

    /// Copy out the region selected by `slices`.
    pub fn slice_region(&self, slices: &[SliceInfoElem]) -> StoredArray {
        match self {
            Self::I16(a) => Self::I16(a.slice(slices).to_owned()),
            Self::I32(a) => Self::I32(a.slice(slices).to_owned()),
            Self::F32(a) => Self::F32(a.slice(slices).to_owned()),
            Self::F64(a) => Self::F64(a.slice(slices).to_owned()),
        }
    }

    /// Serialize the element data to native-endian bytes in row-major order.
    pub fn to_bytes(&self) -> Vec<u8> {
        fn bytes<T: bytemuck::NoUninit>(iter: impl Iterator<Item = T>) -> Vec<u8> {
            let values: Vec<T> = iter.collect();
            bytemuck::cast_slice(&values).to_vec()
        }

        match self {
            Self::I16(a) => bytes(a.iter().copied()),
            Self::I32(a) => bytes(a.iter().copied()),
            Self::F32(a) => bytes(a.iter().copied()),
            Self::F64(a) => bytes(a.iter().copied()),
        }
    }

    /// Reconstruct an array from bytes produced by [`to_bytes`].
    ///
    /// [`to_bytes`]: Self::to_bytes
    pub fn from_bytes(storage: StorageType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        let expected: usize = shape.iter().product::<usize>() * storage.size_of();
        if bytes.len() != expected {
            return Err(ArchiveError::storage(format!(
                "array data is {} bytes, expected {} for shape {:?} of {}",
                bytes.len(),
                expected,
                shape,
                storage
            )));
        }

        fn build<T: bytemuck::Pod>(
            shape: &[usize],
            bytes: &[u8],
        ) -> Result<ArrayD<T>> {
            let values: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
            ArrayD::from_shape_vec(IxDyn(shape), values)
                .map_err(|e| ArchiveError::storage(e.to_string()))
        }

        Ok(match storage {
            StorageType::I16 => Self::I16(build(shape, bytes)?),
            StorageType::I32 => Self::I32(build(shape, bytes)?),
            StorageType::F32 => Self::F32(build(shape, bytes)?),
            StorageType::F64 => Self::F64(build(shape, bytes)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use season_core::View;

    #[test]
    fn test_filled_uses_storage_units() {
        let arr = StoredArray::filled(StorageType::I16, &[2, 3], -32768.0);
        match &arr {
            StoredArray::I16(a) => {
                assert_eq!(a.shape(), &[2, 3]);
                assert!(a.iter().all(|&v| v == -32768));
            }
            _ => panic!("expected i16 array"),
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let arr = StoredArray::I16(
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1i16, -2, 3, -32768]).unwrap(),
        );
        let bytes = arr.to_bytes();
        assert_eq!(bytes.len(), 8);
        let back = StoredArray::from_bytes(StorageType::I16, &[2, 2], &bytes).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn test_from_bytes_length_check() {
        let err = StoredArray::from_bytes(StorageType::F64, &[2, 2], &[0u8; 7]);
        assert!(err.is_err());
    }

    #[test]
    fn test_assign_and_slice_region() {
        let mut full = StoredArray::filled(StorageType::F32, &[4, 2], f64::NAN);
        let block = StoredArray::F32(
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap(),
        );

        let slices = View::Txy.time_slices(2, 1, 3);
        full.assign_region(&slices, &block).unwrap();

        let out = full.slice_region(&slices);
        assert_eq!(out, block);

        match &full {
            StoredArray::F32(a) => {
                assert!(a[[0, 0]].is_nan());
                assert_eq!(a[[1, 0]], 1.0);
                assert_eq!(a[[2, 1]], 4.0);
                assert!(a[[3, 1]].is_nan());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_assign_region_type_mismatch() {
        let mut full = StoredArray::filled(StorageType::F32, &[4], f64::NAN);
        let block = StoredArray::filled(StorageType::I16, &[2], 0.0);
        let slices = View::Txy.time_slices(1, 0, 2);
        assert!(full.assign_region(&slices, &block).is_err());
    }
}
