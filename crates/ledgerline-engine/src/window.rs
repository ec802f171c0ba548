//! Date-window planning for partitioned extraction.

use chrono::{Days, NaiveDate};
use ledgerline_types::DateWindow;

use crate::error::PipelineError;

/// Split `[start_date, end_date]` into consecutive windows of
/// `days_per_page` days. The last window is clamped to `end_date`.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if `days_per_page < 1` or
/// `start_date > end_date`.
pub fn plan_windows(
    start_date: NaiveDate,
    end_date: NaiveDate,
    days_per_page: i64,
) -> Result<Vec<DateWindow>, PipelineError> {
    if days_per_page < 1 {
        return Err(PipelineError::Configuration(format!(
            "days_per_page must be at least 1, got {days_per_page}"
        )));
    }
    if start_date > end_date {
        return Err(PipelineError::Configuration(format!(
            "start_date {start_date} is after end_date {end_date}"
        )));
    }

    // days_per_page >= 1 here, so the cast cannot wrap.
    #[allow(clippy::cast_sign_loss)]
    let span = Days::new(days_per_page as u64 - 1);

    let mut windows = Vec::new();
    let mut page_start = start_date;
    loop {
        let page_end = page_start
            .checked_add_days(span)
            .map_or(end_date, |d| d.min(end_date));
        windows.push(DateWindow::new(page_start, page_end));

        if page_end >= end_date {
            break;
        }
        // page_end < end_date, so the successor exists.
        page_start = page_end
            .succ_opt()
            .ok_or_else(|| PipelineError::Configuration("date range overflows".into()))?;
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn ten_days_in_five_day_pages() {
        let windows = plan_windows(d(2024, 1, 1), d(2024, 1, 10), 5).unwrap();
        assert_eq!(
            windows,
            vec![
                DateWindow::new(d(2024, 1, 1), d(2024, 1, 5)),
                DateWindow::new(d(2024, 1, 6), d(2024, 1, 10)),
            ]
        );
    }

    #[test]
    fn last_window_is_clamped() {
        let windows = plan_windows(d(2024, 1, 1), d(2024, 1, 12), 5).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2], DateWindow::new(d(2024, 1, 11), d(2024, 1, 12)));
    }

    #[test]
    fn single_day_range_yields_one_window() {
        let windows = plan_windows(d(2024, 6, 1), d(2024, 6, 1), 30).unwrap();
        assert_eq!(windows, vec![DateWindow::new(d(2024, 6, 1), d(2024, 6, 1))]);
    }

    #[test]
    fn page_larger_than_range_yields_one_window() {
        let windows = plan_windows(d(2024, 1, 1), d(2024, 1, 3), 365).unwrap();
        assert_eq!(windows, vec![DateWindow::new(d(2024, 1, 1), d(2024, 1, 3))]);
    }

    #[test]
    fn one_day_pages_cross_month_boundary() {
        let windows = plan_windows(d(2024, 2, 28), d(2024, 3, 1), 1).unwrap();
        let starts: Vec<_> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert!(windows.iter().all(|w| w.start == w.end));
    }

    #[test]
    fn zero_or_negative_page_size_is_rejected() {
        for bad in [0, -3] {
            let err = plan_windows(d(2024, 1, 1), d(2024, 1, 10), bad).unwrap_err();
            assert!(matches!(err, PipelineError::Configuration(_)), "got {err:?}");
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = plan_windows(d(2024, 2, 1), d(2024, 1, 1), 5).unwrap_err();
        assert!(err.to_string().contains("after end_date"));
    }
}
