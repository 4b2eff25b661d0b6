//! Time axes for seasonal datasets.
//!
//! A dataset covers a fixed span (its "season") along one of three period
//! kinds: calendar dates, day-of-year integers, or years. The axis maps a
//! point in time to a zero-based array offset and back; it knows nothing
//! about where the time dimension sits in the array (see [`crate::View`]).

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// The period kind of a dataset's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Indexed by calendar date.
    Date,
    /// Indexed by day-of-year, independent of calendar year.
    Doy,
    /// Indexed by year.
    Year,
}

impl Period {
    /// Parse from an attribute string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "date" => Some(Self::Date),
            "doy" => Some(Self::Doy),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// Attribute string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Doy => "doy",
            Self::Year => "year",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point on a dataset's time axis.
///
/// The variant must match the dataset's [`Period`]; mixing variants across
/// axes is rejected rather than coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeKey {
    Date(NaiveDate),
    Doy(u32),
    Year(i32),
}

impl TimeKey {
    pub fn period(&self) -> Period {
        match self {
            Self::Date(_) => Period::Date,
            Self::Doy(_) => Period::Doy,
            Self::Year(_) => Period::Year,
        }
    }

    /// Parse from an attribute string for the given period kind.
    pub fn parse(period: Period, s: &str) -> Option<Self> {
        match period {
            Period::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Self::Date),
            Period::Doy => s.parse().ok().map(Self::Doy),
            Period::Year => s.parse().ok().map(Self::Year),
        }
    }
}

impl std::fmt::Display for TimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Doy(d) => write!(f, "{}", d),
            Self::Year(y) => write!(f, "{}", y),
        }
    }
}

impl From<NaiveDate> for TimeKey {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

/// Errors from time axis resolution.
#[derive(Debug, thiserror::Error)]
pub enum TimeAxisError {
    #[error("time {key} is outside the season {start}..{end}")]
    OutOfBounds {
        key: String,
        start: String,
        end: String,
    },

    #[error("offset {offset} is outside the axis (length {len})")]
    OffsetOutOfBounds { offset: usize, len: usize },

    #[error("time key {key} does not match period '{period}'")]
    PeriodMismatch { key: String, period: Period },

    #[error("range start {start} is after range end {end}")]
    EmptyRange { start: String, end: String },
}

/// The declared time span of a dataset, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeAxis {
    Date { start: NaiveDate, end: NaiveDate },
    DayOfYear { start: u32, end: u32 },
    Year { start: i32, end: i32 },
}

impl TimeAxis {
    pub fn period(&self) -> Period {
        match self {
            Self::Date { .. } => Period::Date,
            Self::DayOfYear { .. } => Period::Doy,
            Self::Year { .. } => Period::Year,
        }
    }

    /// First key on the axis.
    pub fn start(&self) -> TimeKey {
        match *self {
            Self::Date { start, .. } => TimeKey::Date(start),
            Self::DayOfYear { start, .. } => TimeKey::Doy(start),
            Self::Year { start, .. } => TimeKey::Year(start),
        }
    }

    /// Last key on the axis.
    pub fn end(&self) -> TimeKey {
        match *self {
            Self::Date { end, .. } => TimeKey::Date(end),
            Self::DayOfYear { end, .. } => TimeKey::Doy(end),
            Self::Year { end, .. } => TimeKey::Year(end),
        }
    }

    /// Number of time steps covered by the axis.
    pub fn len(&self) -> usize {
        match *self {
            Self::Date { start, end } => (end - start).num_days() as usize + 1,
            Self::DayOfYear { start, end } => (end - start) as usize + 1,
            Self::Year { start, end } => (end - start) as usize + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false // start <= end is validated at construction; an axis has at least one step
    }

    /// Signed distance from the axis start, without a bounds check. Fails
    /// only when the key's variant does not match the axis period.
    pub fn signed_offset(&self, key: &TimeKey) -> Result<i64, TimeAxisError> {
        match (self, key) {
            (Self::Date { start, .. }, TimeKey::Date(d)) => Ok((*d - *start).num_days()),
            (Self::DayOfYear { start, .. }, TimeKey::Doy(d)) => Ok(*d as i64 - *start as i64),
            (Self::Year { start, .. }, TimeKey::Year(y)) => Ok(*y as i64 - *start as i64),
            _ => Err(TimeAxisError::PeriodMismatch {
                key: key.to_string(),
                period: self.period(),
            }),
        }
    }

    /// Resolve a time key to a zero-based offset.
    pub fn index_of(&self, key: &TimeKey) -> Result<usize, TimeAxisError> {
        let offset = self.signed_offset(key)?;

        if offset < 0 || offset >= self.len() as i64 {
            return Err(self.out_of_bounds(key));
        }

        Ok(offset as usize)
    }

    /// Resolve the key at a zero-based offset (the inverse of [`index_of`]).
    ///
    /// [`index_of`]: Self::index_of
    pub fn time_of(&self, offset: usize) -> Result<TimeKey, TimeAxisError> {
        if offset >= self.len() {
            return Err(TimeAxisError::OffsetOutOfBounds {
                offset,
                len: self.len(),
            });
        }

        Ok(match *self {
            Self::Date { start, .. } => TimeKey::Date(start + Duration::days(offset as i64)),
            Self::DayOfYear { start, .. } => TimeKey::Doy(start + offset as u32),
            Self::Year { start, .. } => TimeKey::Year(start + offset as i32),
        })
    }

    /// Resolve an inclusive key range to a half-open offset range.
    pub fn index_range_of(
        &self,
        start: &TimeKey,
        end: &TimeKey,
    ) -> Result<(usize, usize), TimeAxisError> {
        let lo = self.index_of(start)?;
        let hi = self.index_of(end)?;

        if lo > hi {
            return Err(TimeAxisError::EmptyRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok((lo, hi + 1))
    }

    fn out_of_bounds(&self, key: &TimeKey) -> TimeAxisError {
        TimeAxisError::OutOfBounds {
            key: key.to_string(),
            start: self.start().to_string(),
            end: self.end().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn season_2020() -> TimeAxis {
        TimeAxis::Date {
            start: date(2020, 1, 1),
            end: date(2020, 12, 31),
        }
    }

    #[test]
    fn test_date_axis_len() {
        // 2020 is a leap year
        assert_eq!(season_2020().len(), 366);
    }

    #[test]
    fn test_date_index_of() {
        let axis = season_2020();
        assert_eq!(axis.index_of(&TimeKey::Date(date(2020, 1, 1))).unwrap(), 0);
        assert_eq!(axis.index_of(&TimeKey::Date(date(2020, 1, 10))).unwrap(), 9);
        assert_eq!(
            axis.index_of(&TimeKey::Date(date(2020, 12, 31))).unwrap(),
            365
        );
    }

    #[test]
    fn test_date_index_of_out_of_bounds() {
        let axis = season_2020();
        assert!(axis.index_of(&TimeKey::Date(date(2019, 12, 31))).is_err());
        assert!(axis.index_of(&TimeKey::Date(date(2021, 1, 1))).is_err());
    }

    #[test]
    fn test_index_of_period_mismatch() {
        let axis = season_2020();
        match axis.index_of(&TimeKey::Doy(5)) {
            Err(TimeAxisError::PeriodMismatch { .. }) => {}
            other => panic!("expected PeriodMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_all_offsets() {
        let axis = season_2020();
        for offset in 0..axis.len() {
            let key = axis.time_of(offset).unwrap();
            assert_eq!(axis.index_of(&key).unwrap(), offset);
        }
    }

    #[test]
    fn test_doy_axis() {
        let axis = TimeAxis::DayOfYear { start: 91, end: 304 };
        assert_eq!(axis.len(), 214);
        assert_eq!(axis.index_of(&TimeKey::Doy(91)).unwrap(), 0);
        assert_eq!(axis.index_of(&TimeKey::Doy(304)).unwrap(), 213);
        assert!(axis.index_of(&TimeKey::Doy(90)).is_err());
        assert_eq!(axis.time_of(10).unwrap(), TimeKey::Doy(101));
    }

    #[test]
    fn test_year_axis() {
        let axis = TimeAxis::Year { start: 1981, end: 2020 };
        assert_eq!(axis.len(), 40);
        assert_eq!(axis.index_of(&TimeKey::Year(2000)).unwrap(), 19);
        assert_eq!(axis.time_of(39).unwrap(), TimeKey::Year(2020));
    }

    #[test]
    fn test_index_range_of() {
        let axis = season_2020();
        let (lo, hi) = axis
            .index_range_of(
                &TimeKey::Date(date(2020, 1, 8)),
                &TimeKey::Date(date(2020, 1, 15)),
            )
            .unwrap();
        assert_eq!((lo, hi), (7, 15));
    }

    #[test]
    fn test_index_range_of_inverted() {
        let axis = season_2020();
        assert!(axis
            .index_range_of(
                &TimeKey::Date(date(2020, 2, 1)),
                &TimeKey::Date(date(2020, 1, 1)),
            )
            .is_err());
    }

    #[test]
    fn test_time_key_parse_and_display() {
        let key = TimeKey::parse(Period::Date, "2020-03-15").unwrap();
        assert_eq!(key, TimeKey::Date(date(2020, 3, 15)));
        assert_eq!(key.to_string(), "2020-03-15");

        assert_eq!(TimeKey::parse(Period::Doy, "120"), Some(TimeKey::Doy(120)));
        assert_eq!(TimeKey::parse(Period::Year, "1999"), Some(TimeKey::Year(1999)));
        assert_eq!(TimeKey::parse(Period::Date, "not-a-date"), None);
    }
}
