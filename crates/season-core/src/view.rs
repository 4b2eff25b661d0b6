//! Axis-order view tags.
//!
//! A dataset's `view` attribute declares where the time dimension sits in its
//! array shape and whether y precedes x. The time index resolver works in
//! logical offsets; the view translates those into physical slices.

use ndarray::SliceInfoElem;
use serde::{Deserialize, Serialize};

/// Axis order of a time-indexed dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Time leading, x before y.
    Txy,
    /// Time leading, y before x.
    Tyx,
    /// Time trailing, x before y.
    Xyt,
    /// Time trailing, y before x.
    Yxt,
}

impl View {
    /// Parse from an attribute string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "txy" => Some(Self::Txy),
            "tyx" => Some(Self::Tyx),
            "xyt" => Some(Self::Xyt),
            "yxt" => Some(Self::Yxt),
            _ => None,
        }
    }

    /// Attribute string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txy => "txy",
            Self::Tyx => "tyx",
            Self::Xyt => "xyt",
            Self::Yxt => "yxt",
        }
    }

    /// Whether the time dimension is the leading array axis.
    pub fn time_leading(&self) -> bool {
        matches!(self, Self::Txy | Self::Tyx)
    }

    /// Index of the time dimension in an array with `ndim` axes.
    pub fn time_axis(&self, ndim: usize) -> usize {
        if self.time_leading() {
            0
        } else {
            ndim - 1
        }
    }

    /// Spatial part of a full dataset shape, in storage order.
    pub fn spatial_shape<'a>(&self, shape: &'a [usize]) -> &'a [usize] {
        if self.time_leading() {
            &shape[1..]
        } else {
            &shape[..shape.len() - 1]
        }
    }

    /// Full dataset shape for the given time length and spatial shape.
    pub fn full_shape(&self, time_len: usize, spatial: &[usize]) -> Vec<usize> {
        let mut shape = Vec::with_capacity(spatial.len() + 1);
        if self.time_leading() {
            shape.push(time_len);
            shape.extend_from_slice(spatial);
        } else {
            shape.extend_from_slice(spatial);
            shape.push(time_len);
        }
        shape
    }

    /// Slice selecting the half-open time range `t0..t1` and every spatial cell.
    pub fn time_slices(&self, ndim: usize, t0: usize, t1: usize) -> Vec<SliceInfoElem> {
        let time_axis = self.time_axis(ndim);
        (0..ndim)
            .map(|axis| {
                if axis == time_axis {
                    SliceInfoElem::Slice {
                        start: t0 as isize,
                        end: Some(t1 as isize),
                        step: 1,
                    }
                } else {
                    SliceInfoElem::Slice {
                        start: 0,
                        end: None,
                        step: 1,
                    }
                }
            })
            .collect()
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(View::from_str("txy"), Some(View::Txy));
        assert_eq!(View::from_str("yxt"), Some(View::Yxt));
        assert_eq!(View::from_str("xty"), None);
    }

    #[test]
    fn test_time_axis_position() {
        assert_eq!(View::Txy.time_axis(3), 0);
        assert_eq!(View::Tyx.time_axis(3), 0);
        assert_eq!(View::Xyt.time_axis(3), 2);
        assert_eq!(View::Yxt.time_axis(2), 1);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(View::Txy.full_shape(366, &[10, 20]), vec![366, 10, 20]);
        assert_eq!(View::Xyt.full_shape(366, &[10, 20]), vec![10, 20, 366]);

        let shape = [366, 10, 20];
        assert_eq!(View::Tyx.spatial_shape(&shape), &[10, 20]);
        let shape = [10, 20, 366];
        assert_eq!(View::Yxt.spatial_shape(&shape), &[10, 20]);
    }

    #[test]
    fn test_time_slices_selects_range() {
        use ndarray::ArrayD;

        let arr = ArrayD::from_shape_vec(
            vec![4, 2, 3],
            (0..24).map(|v| v as f64).collect(),
        )
        .unwrap();
        let slices = View::Txy.time_slices(3, 1, 3);
        let sub = arr.slice(slices.as_slice());
        assert_eq!(sub.shape(), &[2, 2, 3]);
        assert_eq!(sub[[0, 0, 0]], 6.0);

        let slices = View::Xyt.time_slices(3, 2, 4);
        let arr = ArrayD::from_shape_vec(
            vec![2, 3, 4],
            (0..24).map(|v| v as f64).collect(),
        )
        .unwrap();
        let sub = arr.slice(slices.as_slice());
        assert_eq!(sub.shape(), &[2, 3, 2]);
        assert_eq!(sub[[0, 0, 0]], 2.0);
    }
}
