//! Datetime interval parsing and temporal filter clauses.
//!
//! Accepted forms:
//! - Single instant: "2025-01-01T00:00:00Z"
//! - Interval: "2025-01-01T00:00:00Z/2025-12-31T23:59:59Z"
//! - Open start: "../2025-12-31T23:59:59Z"
//! - Open end: "2025-01-01T00:00:00Z/.."

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::{Result, SearchError};
use crate::query::{Clause, RangeOp};

const OPEN: &str = "..";

/// Parsed datetime interval; `None` marks an open side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatetimeInterval {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DatetimeInterval {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        let Some((start, end)) = s.split_once('/') else {
            // Instant: the item interval has to contain this moment
            let dt = parse_single(s)?;
            return Ok(DatetimeInterval {
                start: Some(dt),
                end: Some(dt),
            });
        };

        if end.contains('/') {
            return Err(SearchError::invalid(
                "datetime interval must have exactly 2 parts separated by /",
            ));
        }

        let start = if start == OPEN { None } else { Some(parse_single(start)?) };
        let end = if end == OPEN { None } else { Some(parse_single(end)?) };

        match (start, end) {
            (None, None) => Err(SearchError::invalid(
                "datetime interval cannot be open on both sides",
            )),
            (Some(s), Some(e)) if s >= e => Err(SearchError::invalid(
                "datetime interval start must be before its end",
            )),
            _ => Ok(DatetimeInterval { start, end }),
        }
    }
}

fn parse_single(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Date-only values are read as midnight UTC
    if let Some(dt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }
    Err(SearchError::invalid(format!("invalid datetime format: {:?}", s)))
}

/// Canonical wire form: RFC 3339 with a `Z` suffix.
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Names of an item's own start/end temporal fields in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFields {
    pub start: &'static str,
    pub end: &'static str,
}

/// Interval containment clauses: `start >= lower` and `end <= upper`,
/// skipping whichever side is open.
pub fn clauses(datetime: Option<&str>, fields: TemporalFields) -> Result<Vec<Clause>> {
    let Some(datetime) = datetime else {
        return Ok(Vec::new());
    };

    let interval = DatetimeInterval::parse(datetime)?;
    let mut clauses = Vec::with_capacity(2);

    if let Some(lower) = interval.start {
        clauses.push(Clause::range(fields.start, RangeOp::Gte, format_instant(&lower)));
    }
    if let Some(upper) = interval.end {
        clauses.push(Clause::range(fields.end, RangeOp::Lte, format_instant(&upper)));
    }

    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: TemporalFields = TemporalFields {
        start: "time_coverage_start",
        end: "time_coverage_end",
    };

    #[test]
    fn test_absent_datetime_has_no_clauses() {
        assert!(clauses(None, FIELDS).unwrap().is_empty());
    }

    #[test]
    fn test_open_end_interval() {
        let got = clauses(Some("2020-01-01T00:00:00Z/.."), FIELDS).unwrap();
        assert_eq!(
            got,
            vec![Clause::range("time_coverage_start", RangeOp::Gte, "2020-01-01T00:00:00Z")]
        );
    }

    #[test]
    fn test_open_start_interval() {
        let got = clauses(Some("../2021-06-30T12:00:00Z"), FIELDS).unwrap();
        assert_eq!(
            got,
            vec![Clause::range("time_coverage_end", RangeOp::Lte, "2021-06-30T12:00:00Z")]
        );
    }

    #[test]
    fn test_instant_bounds_both_sides() {
        let got = clauses(Some("2020-05-01T10:00:00Z"), FIELDS).unwrap();
        assert_eq!(
            got,
            vec![
                Clause::range("time_coverage_start", RangeOp::Gte, "2020-05-01T10:00:00Z"),
                Clause::range("time_coverage_end", RangeOp::Lte, "2020-05-01T10:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_offsets_normalised_to_utc() {
        let interval = DatetimeInterval::parse("2020-01-01T02:00:00+02:00/..").unwrap();
        assert_eq!(format_instant(&interval.start.unwrap()), "2020-01-01T00:00:00Z");
    }

    #[test]
    fn test_date_only() {
        let interval = DatetimeInterval::parse("2020-01-01/2020-02-01").unwrap();
        assert_eq!(format_instant(&interval.end.unwrap()), "2020-02-01T00:00:00Z");
    }

    #[test]
    fn test_rejects_double_open() {
        assert!(matches!(
            DatetimeInterval::parse("../.."),
            Err(SearchError::InvalidQueryParameter(_))
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "yesterday",
            "2020-01-01T00:00:00Z/2020-02-01T00:00:00Z/..",
            "2020-13-01T00:00:00Z",
            "2021-01-01T00:00:00Z/2020-01-01T00:00:00Z",
        ] {
            assert!(DatetimeInterval::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }
}
