//! Packing descriptors.
//!
//! Datasets store a compact numeric representation (typically a scaled
//! integer with a missing sentinel) while the in-memory, semantic side is
//! floating point with an explicit null marker. The descriptor here is pure
//! metadata; the actual conversion lives in the store crate's codec.

use serde::{Deserialize, Serialize};

/// On-disk element type of a stored array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    I16,
    I32,
    F32,
    F64,
}

impl StorageType {
    /// Parse from an attribute string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "i16" | "int16" => Some(Self::I16),
            "i32" | "int32" => Some(Self::I32),
            "f32" | "float32" => Some(Self::F32),
            "f64" | "float64" => Some(Self::F64),
            _ => None,
        }
    }

    /// Attribute string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    /// Element size in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic element type and its missing marker.
///
/// Floating data uses NaN as the marker; integer data carries an explicit
/// sentinel since integers have no non-self-equal null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "missing")]
pub enum SemanticType {
    Float,
    Int(i64),
}

impl SemanticType {
    /// Parse the `unpack` attribute string, e.g. `"(float,nan)"` or
    /// `"(int,-9999)"`.
    pub fn parse_unpack(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('(')?.strip_suffix(')')?;
        let (kind, marker) = inner.split_once(',')?;
        match (kind.trim(), marker.trim()) {
            ("float", "nan") => Some(Self::Float),
            ("int", m) => m.parse().ok().map(Self::Int),
            _ => None,
        }
    }

    /// Format as the `unpack` attribute string.
    pub fn format_unpack(&self) -> String {
        match self {
            Self::Float => "(float,nan)".to_string(),
            Self::Int(m) => format!("(int,{})", m),
        }
    }

    /// The missing marker on the semantic side, as an f64.
    pub fn missing_marker(&self) -> f64 {
        match self {
            Self::Float => f64::NAN,
            Self::Int(m) => *m as f64,
        }
    }

    /// Is-null test for a semantic value. NaN is not self-equal, so the float
    /// marker must be tested with `is_nan`, never `==`.
    pub fn is_missing(&self, value: f64) -> bool {
        match self {
            Self::Float => value.is_nan(),
            Self::Int(m) => value == *m as f64,
        }
    }
}

/// Full packing parameters for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Packing {
    /// Stored element type.
    pub storage: StorageType,
    /// Semantic element type and missing marker.
    pub semantic: SemanticType,
    /// Scale multiplier: stored = semantic * multiplier.
    pub multiplier: f64,
    /// Missing sentinel on the storage side.
    pub missing: f64,
}

impl Packing {
    /// Identity packing for unscaled floating data: stored f64, NaN sentinel.
    pub fn identity() -> Self {
        Self {
            storage: StorageType::F64,
            semantic: SemanticType::Float,
            multiplier: 1.0,
            missing: f64::NAN,
        }
    }

    /// Is-null test for a stored value.
    pub fn is_stored_missing(&self, value: f64) -> bool {
        if self.missing.is_nan() {
            value.is_nan()
        } else {
            value == self.missing
        }
    }
}
