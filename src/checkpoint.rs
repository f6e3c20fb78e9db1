//! Monthly checkpoints and the checkpoint sequence builder.
//!
//! A [`Checkpoint`] is a calendar month, stored as structured `(year, month)`
//! integers. The derived ordering compares year first, then month, which is
//! exactly the order of the zero-padded `"YYYY-MM"` labels it renders to. Labels
//! that are not in that fixed-width shape are rejected at parse time, so the two
//! representations can never disagree about ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CheckpointError;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Largest year representable in a four-digit label.
pub const MAX_YEAR: u16 = 9999;

/// A monthly checkpoint: "all compounds first seen at or before this month".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checkpoint {
    year: u16,
    month: u8,
}

impl Checkpoint {
    /// Create a checkpoint, validating the month (1..=12) and year (0..=9999).
    pub fn new(year: u16, month: u8) -> CheckpointResult<Self> {
        if year > MAX_YEAR || !(1..=12).contains(&month) {
            return Err(CheckpointError::Malformed {
                label: format!("{year}-{month}"),
            });
        }
        Ok(Self { year, month })
    }

    pub fn year(self) -> u16 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }

    /// The following calendar month, or `None` past December 9999.
    pub fn next(self) -> Option<Self> {
        if self.month == 12 {
            (self.year < MAX_YEAR).then(|| Self {
                year: self.year + 1,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// The zero-padded `"YYYY-MM"` label.
    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Checkpoint {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CheckpointError::Malformed {
            label: s.to_string(),
        };
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(malformed());
        }
        let digits_ok = bytes[..4]
            .iter()
            .chain(&bytes[5..])
            .all(u8::is_ascii_digit);
        if !digits_ok {
            return Err(malformed());
        }
        let year: u16 = s[..4].parse().map_err(|_| malformed())?;
        let month: u8 = s[5..].parse().map_err(|_| malformed())?;
        Checkpoint::new(year, month).map_err(|_| malformed())
    }
}

impl Serialize for Checkpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Checkpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

/// Build every monthly checkpoint from January of `start_year` through
/// December of `end_year` (inclusive), in calendar order.
///
/// Always yields `12 * (end_year - start_year + 1)` entries for a valid range.
pub fn build_month_list(start_year: i64, end_year: i64) -> CheckpointResult<Vec<Checkpoint>> {
    if start_year > end_year || start_year < 0 || end_year > i64::from(MAX_YEAR) {
        return Err(CheckpointError::InvalidRange {
            start: start_year,
            end: end_year,
        });
    }

    let mut months = Vec::with_capacity(((end_year - start_year + 1) * 12) as usize);
    for year in start_year..=end_year {
        for month in 1..=12u8 {
            months.push(Checkpoint {
                year: year as u16,
                month,
            });
        }
    }
    Ok(months)
}

/// Parse and validate a list of checkpoint labels, sorting them chronologically.
///
/// Duplicates are removed. Any malformed label fails the whole list.
pub fn parse_checkpoints<S: AsRef<str>>(labels: &[S]) -> CheckpointResult<Vec<Checkpoint>> {
    let mut parsed = labels
        .iter()
        .map(|l| l.as_ref().parse())
        .collect::<CheckpointResult<Vec<Checkpoint>>>()?;
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(label: &str) -> Checkpoint {
        label.parse().unwrap()
    }

    #[test]
    fn two_year_range_has_24_months_in_order() {
        let months = build_month_list(1999, 2000).unwrap();
        assert_eq!(months.len(), 24);
        assert_eq!(months[0].label(), "1999-01");
        assert_eq!(months[23].label(), "2000-12");
        assert!(months.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn single_year_has_12_months() {
        let months = build_month_list(2005, 2005).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months[8].label(), "2005-09");
        assert_eq!(months[9].label(), "2005-10");
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            build_month_list(2001, 2000),
            Err(CheckpointError::InvalidRange { .. })
        ));
    }

    #[test]
    fn ordering_matches_label_ordering() {
        let months = build_month_list(1998, 2001).unwrap();
        for a in &months {
            for b in &months {
                assert_eq!(a.cmp(b), a.label().cmp(&b.label()));
            }
        }
    }

    #[test]
    fn parse_rejects_unpadded_and_out_of_range() {
        for bad in ["1999-1", "99-01", "1999-13", "1999-00", "1999/01", "1999-0a", ""] {
            assert!(bad.parse::<Checkpoint>().is_err(), "accepted {bad:?}");
        }
        assert_eq!(cp("0999-07").year(), 999);
    }

    #[test]
    fn next_rolls_over_december() {
        assert_eq!(cp("1999-12").next(), Some(cp("2000-01")));
        assert_eq!(cp("2000-03").next(), Some(cp("2000-04")));
        assert_eq!(cp("9999-12").next(), None);
    }

    #[test]
    fn parse_checkpoints_sorts_and_dedups() {
        let parsed = parse_checkpoints(&["2000-02", "1999-12", "2000-02"]).unwrap();
        assert_eq!(parsed, vec![cp("1999-12"), cp("2000-02")]);
        assert!(parse_checkpoints(&["2000-02", "bogus"]).is_err());
    }

    #[test]
    fn serde_uses_label_form() {
        let json = serde_json::to_string(&cp("2003-04")).unwrap();
        assert_eq!(json, "\"2003-04\"");
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp("2003-04"));
        assert!(serde_json::from_str::<Checkpoint>("\"2003-4\"").is_err());
    }
}
