//! Month-granularity calendar helpers.
//!
//! Every date that enters the estimation core is normalized to the first day
//! of its month, so comparisons between panel dates and window bounds are exact.

use chrono::{Datelike, Days, Months, NaiveDate};

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// First day of the month before the month containing `date`.
pub fn prev_month(date: NaiveDate) -> NaiveDate {
    month_start(month_start(date) - Days::new(1))
}

/// Month start shifted forward by `n` months (saturating at the calendar bound).
pub fn add_months(date: NaiveDate, n: u32) -> NaiveDate {
    let start = month_start(date);
    start.checked_add_months(Months::new(n)).unwrap_or(start)
}

/// Parse a calendar date and normalize it to month start.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` and `YYYY/MM`.
pub fn parse_month(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(month_start(d));
        }
    }

    // Month-only forms: append the first day so chrono can parse them.
    for (sep, fmt) in [('-', "%Y-%m-%d"), ('/', "%Y/%m/%d")] {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}{sep}01"), fmt) {
            return Ok(d);
        }
    }

    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, YYYY/MM/DD, YYYY-MM, YYYY/MM."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_start_and_prev_month() {
        assert_eq!(month_start(ymd(2014, 11, 17)), ymd(2014, 11, 1));
        assert_eq!(prev_month(ymd(2014, 11, 1)), ymd(2014, 10, 1));
        assert_eq!(prev_month(ymd(2015, 1, 20)), ymd(2014, 12, 1));
        assert_eq!(add_months(ymd(2010, 1, 31), 48), ymd(2014, 1, 1));
    }

    #[test]
    fn parse_month_accepts_common_forms() {
        assert_eq!(parse_month("2014-11-01").unwrap(), ymd(2014, 11, 1));
        assert_eq!(parse_month("2014-11-30").unwrap(), ymd(2014, 11, 1));
        assert_eq!(parse_month("2014/11/15").unwrap(), ymd(2014, 11, 1));
        assert_eq!(parse_month("2014-11").unwrap(), ymd(2014, 11, 1));
        assert_eq!(parse_month(" 2014/02 ").unwrap(), ymd(2014, 2, 1));
        assert!(parse_month("Nov 2014").is_err());
    }
}
