//! Monthly sales series helpers.
//!
//! `sales_by_month` aggregates by `YYYY-MM`. These helpers pick the default
//! reporting window and turn sparse aggregate rows into a dense,
//! chronological series with one point per month.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wire format for window boundaries and month starts
pub const ISO_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Default number of months in the reporting window
pub const TRAILING_MONTHS: u32 = 12;

/// One month of sales
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// First instant of the month, e.g. `2024-03-01T00:00:00Z`
    pub month: String,
    pub total_cents: i64,
}

/// Direction of the second half of a series relative to the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Absolute change between the halves, in percent
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub months: usize,
    pub total_cents: i64,
    pub peak: Option<MonthlyPoint>,
    pub trough: Option<MonthlyPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

pub fn format_iso(dt: DateTime<Utc>) -> String {
    dt.format(ISO_UTC_FORMAT).to_string()
}

/// Parse the date shapes accepted by the sales tools.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`
/// with an optional trailing `Z`.
pub fn parse_flexible(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Storage-friendly form of a boundary: `T` and `Z` replaced for SQLite text comparison
pub fn to_storage_format(input: &str) -> String {
    input.replace('T', " ").replace('Z', "")
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_second_of_month(date: NaiveDate) -> NaiveDateTime {
    let next = first_of_month(date)
        .checked_add_months(Months::new(1))
        .unwrap_or(date);
    let last_day = next.pred_opt().unwrap_or(date);
    last_day.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

/// Trailing twelve-month window ending in the month of `now`.
///
/// Starts on the first day of the month eleven months back and ends on the
/// last second of the current month.
pub fn trailing_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let start_month = today
        .checked_sub_months(Months::new(TRAILING_MONTHS - 1))
        .unwrap_or(today);
    let start = first_of_month(start_month).and_time(NaiveTime::MIN);
    let end = last_second_of_month(today);
    (Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
}

/// Month starts from the month of `start` through the month of `end`, inclusive
pub fn month_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let last = first_of_month(end);
    let mut current = first_of_month(start);
    while current <= last {
        months.push(current);
        match current.checked_add_months(Months::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    months
}

/// Turn sparse `(YYYY-MM, total)` rows into one point per month of the window.
///
/// Months without a row get `0`. Rows outside the window are ignored.
pub fn normalize_series(rows: &[(String, i64)], start: NaiveDate, end: NaiveDate) -> Vec<MonthlyPoint> {
    month_range(start, end)
        .into_iter()
        .map(|month| {
            let key = month.format("%Y-%m").to_string();
            let total_cents = rows
                .iter()
                .find(|(ym, _)| *ym == key)
                .map(|(_, total)| *total)
                .unwrap_or(0);
            MonthlyPoint {
                month: format!("{}-01T00:00:00Z", key),
                total_cents,
            }
        })
        .collect()
}

/// Totals, extremes and (for six months or more) a half-period trend
pub fn summarize(points: &[MonthlyPoint]) -> SeriesSummary {
    let total_cents = points.iter().map(|p| p.total_cents).sum();

    let mut peak: Option<&MonthlyPoint> = None;
    let mut trough: Option<&MonthlyPoint> = None;
    for point in points {
        if peak.is_none_or(|p| point.total_cents > p.total_cents) {
            peak = Some(point);
        }
        if trough.is_none_or(|t| point.total_cents < t.total_cents) {
            trough = Some(point);
        }
    }

    let trend = if points.len() >= 6 {
        let mid = points.len() / 2;
        let first: i64 = points[..mid].iter().map(|p| p.total_cents).sum();
        let second: i64 = points[mid..].iter().map(|p| p.total_cents).sum();
        (first > 0).then(|| {
            let delta = (second - first) as f64 / first as f64;
            Trend {
                direction: if delta >= 0.0 {
                    TrendDirection::Up
                } else {
                    TrendDirection::Down
                },
                change_percent: (delta.abs() * 1000.0).round() / 10.0,
            }
        })
    } else {
        None
    };

    SeriesSummary {
        months: points.len(),
        total_cents,
        peak: peak.cloned(),
        trough: trough.cloned(),
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trailing_window_spans_twelve_months() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let (start, end) = trailing_window(now);
        assert_eq!(format_iso(start), "2023-04-01T00:00:00Z");
        assert_eq!(format_iso(end), "2024-03-31T23:59:59Z");
        assert_eq!(month_range(start.date_naive(), end.date_naive()).len(), 12);
    }

    #[test]
    fn test_trailing_window_handles_leap_february() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let (start, end) = trailing_window(now);
        assert_eq!(format_iso(start), "2023-03-01T00:00:00Z");
        assert_eq!(format_iso(end), "2024-02-29T23:59:59Z");
    }

    #[test]
    fn test_parse_flexible_shapes() {
        let expected = ymd(2024, 5, 1).and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(parse_flexible("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_flexible("2024-05-01T12:00:00"), Some(expected));
        assert_eq!(parse_flexible("2024-05-01 12:00:00"), Some(expected));
        assert_eq!(
            parse_flexible("2024-05-01"),
            Some(ymd(2024, 5, 1).and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_flexible("05/01/2024"), None);
        assert_eq!(parse_flexible("2024-13-01"), None);
    }

    #[test]
    fn test_to_storage_format() {
        assert_eq!(to_storage_format("2024-05-01T12:00:00Z"), "2024-05-01 12:00:00");
    }

    #[test]
    fn test_normalize_zero_fills_gaps_in_order() {
        let rows = vec![
            ("2024-03".to_string(), 500),
            ("2024-01".to_string(), 100),
            ("2023-06".to_string(), 999),
        ];
        let series = normalize_series(&rows, ymd(2024, 1, 10), ymd(2024, 4, 30));

        let months: Vec<&str> = series.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(
            months,
            vec![
                "2024-01-01T00:00:00Z",
                "2024-02-01T00:00:00Z",
                "2024-03-01T00:00:00Z",
                "2024-04-01T00:00:00Z",
            ]
        );
        let totals: Vec<i64> = series.iter().map(|p| p.total_cents).collect();
        assert_eq!(totals, vec![100, 0, 500, 0]);
    }

    #[test]
    fn test_summarize_reports_extremes_and_trend() {
        let rows: Vec<(String, i64)> = (1..=6)
            .map(|m| (format!("2024-{:02}", m), m as i64 * 100))
            .collect();
        let series = normalize_series(&rows, ymd(2024, 1, 1), ymd(2024, 6, 1));
        let summary = summarize(&series);

        assert_eq!(summary.total_cents, 2100);
        assert_eq!(summary.peak.unwrap().total_cents, 600);
        assert_eq!(summary.trough.unwrap().month, "2024-01-01T00:00:00Z");
        let trend = summary.trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        // first half 600, second half 1500
        assert_eq!(trend.change_percent, 150.0);
    }

    #[test]
    fn test_summarize_short_series_has_no_trend() {
        let series = normalize_series(&[], ymd(2024, 1, 1), ymd(2024, 3, 1));
        let summary = summarize(&series);
        assert_eq!(summary.months, 3);
        assert_eq!(summary.total_cents, 0);
        assert!(summary.trend.is_none());
        assert_eq!(summary.peak.unwrap().month, "2024-01-01T00:00:00Z");
    }
}
