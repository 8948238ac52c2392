//! Time-window expansion for range queries
//!
//! Backfill passes walk the history oldest-first so that, once results are
//! concatenated, the last point seen for an entity is the most recent one.
//! Workload exports walk newest-first.

use crate::config::{ConfigError, Interval, RunMode, Settings};
use crate::models::{QueryMode, Sample};
use crate::source::{FetchError, MetricsSource};
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use tracing::debug;

/// Sampling step appended to every range request
pub const RANGE_STEP: &str = "5m";

const PARAM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// A `[start, end)` range request window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn start_param(&self) -> String {
        self.start.format(PARAM_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(PARAM_FORMAT).to_string()
    }

    /// `&start=..&end=..&step=5m`, appended to a query expression
    pub fn range_params(&self) -> String {
        format!(
            "&start={}&end={}&step={}",
            self.start_param(),
            self.end_param(),
            RANGE_STEP
        )
    }

    /// Window start as used in workload file names (`2026-10-18T00.00.00`)
    pub fn file_suffix(&self) -> String {
        self.start.format("%Y-%m-%dT%H.%M.%S").to_string()
    }
}

/// `reference` moved back `count` units; fails outside chrono's date range
fn offset(reference: DateTime<Utc>, interval: Interval, count: i64) -> Result<DateTime<Utc>, ConfigError> {
    let delta = match interval {
        Interval::Days => Duration::try_days(count),
        Interval::Hours => Duration::try_hours(count),
        Interval::Minutes => Duration::try_minutes(count),
    };
    delta
        .and_then(|delta| reference.checked_sub_signed(delta))
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "a history of {} {} reaches outside the supported date range",
                count, interval
            ))
        })
}

fn midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Align a window start to its unit boundary
fn align_start(interval: Interval, t: DateTime<Utc>) -> DateTime<Utc> {
    match interval {
        Interval::Days => midnight(t),
        Interval::Hours => midnight(t) + Duration::hours(i64::from(t.hour())),
        Interval::Minutes => {
            midnight(t)
                + Duration::hours(i64::from(t.hour()))
                + Duration::minutes(i64::from(t.minute()))
        }
    }
}

/// Align a window end; day windows close at 23:00:00
fn align_end(interval: Interval, t: DateTime<Utc>) -> DateTime<Utc> {
    match interval {
        Interval::Days => midnight(t) + Duration::hours(23),
        other => align_start(other, t),
    }
}

/// Windows for backfill passes, oldest first
///
/// Counts run from `history` down to 0 in steps of `interval_size`; each
/// window spans `reference - count` to `reference - (count - interval_size)`.
pub fn backfill_windows(
    reference: DateTime<Utc>,
    history: u32,
    interval: Interval,
    interval_size: u32,
) -> Result<Vec<TimeWindow>, ConfigError> {
    let step = i64::from(interval_size.max(1));
    let mut windows = Vec::new();
    let mut count = i64::from(history);

    while count > -1 {
        windows.push(TimeWindow {
            start: align_start(interval, offset(reference, interval, count)?),
            end: align_end(interval, offset(reference, interval, count - step)?),
        });
        count -= step;
    }

    Ok(windows)
}

/// Windows for workload exports, newest first
pub fn export_windows(
    reference: DateTime<Utc>,
    history: u32,
    interval: Interval,
    interval_size: u32,
) -> Result<Vec<TimeWindow>, ConfigError> {
    let step = i64::from(interval_size.max(1));
    let oldest = i64::from(history);
    offset(reference, interval, oldest)?;

    let mut windows = Vec::new();
    let mut count = 0i64;

    while count < oldest {
        windows.push(TimeWindow {
            start: align_start(interval, offset(reference, interval, count + step)?),
            end: align_end(interval, offset(reference, interval, count)?),
        });
        count += step;
    }

    Ok(windows)
}

/// Runs queries either as one instant query or across the backfill windows
pub struct HistoryCollector<'a> {
    source: &'a dyn MetricsSource,
    mode: RunMode,
    windows: Vec<TimeWindow>,
}

impl<'a> HistoryCollector<'a> {
    pub fn new(
        source: &'a dyn MetricsSource,
        settings: &Settings,
        reference: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let windows = match settings.mode {
            RunMode::Current => Vec::new(),
            RunMode::All => backfill_windows(
                reference,
                settings.history,
                settings.interval,
                settings.interval_size,
            )?,
        };

        Ok(Self {
            source,
            mode: settings.mode,
            windows,
        })
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// Collect `query` over the configured history
    ///
    /// Current mode issues one instant query. Historical mode issues one range
    /// query per window, oldest first, and concatenates the results. The first
    /// failing window aborts the whole collection.
    pub async fn collect(&self, query: &str, result_field: &str) -> Result<Vec<Sample>, FetchError> {
        if self.mode == RunMode::Current {
            return self.collect_instant(query, result_field).await;
        }

        let mut samples = Vec::new();
        for window in &self.windows {
            debug!(start = %window.start_param(), end = %window.end_param(), "Collecting window");
            let ranged = format!("{}{}", query, window.range_params());
            samples.extend(self.source.fetch(&ranged, result_field, QueryMode::Range).await?);
        }
        Ok(samples)
    }

    /// Collect `query` as a single instant query regardless of mode
    pub async fn collect_instant(&self, query: &str, result_field: &str) -> Result<Vec<Sample>, FetchError> {
        self.source.fetch(query, result_field, QueryMode::Instant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 37, 12).unwrap()
    }

    #[test]
    fn test_day_backfill_windows_oldest_first() {
        let windows = backfill_windows(reference(), 2, Interval::Days, 1).unwrap();

        let params: Vec<(String, String)> = windows
            .iter()
            .map(|w| (w.start_param(), w.end_param()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("2026-10-17T00:00:00.000Z".to_string(), "2026-10-18T23:00:00.000Z".to_string()),
                ("2026-10-18T00:00:00.000Z".to_string(), "2026-10-19T23:00:00.000Z".to_string()),
                ("2026-10-19T00:00:00.000Z".to_string(), "2026-10-20T23:00:00.000Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_backfill_with_larger_interval_size() {
        let windows = backfill_windows(reference(), 4, Interval::Days, 2).unwrap();
        let starts: Vec<String> = windows.iter().map(TimeWindow::start_param).collect();
        assert_eq!(
            starts,
            vec![
                "2026-10-15T00:00:00.000Z",
                "2026-10-17T00:00:00.000Z",
                "2026-10-19T00:00:00.000Z",
            ]
        );
    }

    #[test]
    fn test_hour_and_minute_alignment() {
        let hours = backfill_windows(reference(), 1, Interval::Hours, 1).unwrap();
        assert_eq!(hours[0].start_param(), "2026-10-19T13:00:00.000Z");
        assert_eq!(hours[0].end_param(), "2026-10-19T14:00:00.000Z");

        let minutes = backfill_windows(reference(), 0, Interval::Minutes, 1).unwrap();
        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].start_param(), "2026-10-19T14:37:00.000Z");
        assert_eq!(minutes[0].end_param(), "2026-10-19T14:38:00.000Z");
    }

    #[test]
    fn test_export_windows_newest_first() {
        let windows = export_windows(reference(), 2, Interval::Days, 1).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_param(), "2026-10-18T00:00:00.000Z");
        assert_eq!(windows[0].end_param(), "2026-10-19T23:00:00.000Z");
        assert_eq!(windows[1].start_param(), "2026-10-17T00:00:00.000Z");
        assert_eq!(windows[0].file_suffix(), "2026-10-18T00.00.00");

        assert!(export_windows(reference(), 0, Interval::Days, 1).unwrap().is_empty());
    }

    #[test]
    fn test_history_beyond_date_range_is_an_error() {
        let err = export_windows(reference(), 100_000_000, Interval::Days, 100_000_000).unwrap_err();
        assert!(err.to_string().contains("supported date range"));

        assert!(backfill_windows(reference(), u32::MAX, Interval::Days, 1).is_err());
        assert!(export_windows(reference(), u32::MAX, Interval::Days, u32::MAX).is_err());
    }

    #[test]
    fn test_range_params() {
        let window = backfill_windows(reference(), 0, Interval::Hours, 1).unwrap()[0];
        assert_eq!(
            window.range_params(),
            "&start=2026-10-19T14:00:00.000Z&end=2026-10-19T15:00:00.000Z&step=5m"
        );
    }

    #[tokio::test]
    async fn test_current_mode_issues_one_instant_query() {
        let source = FakeSource::new(|_, _| Vec::new());
        let settings = Settings {
            address: "h".to_string(),
            history: 5,
            ..Settings::default()
        };

        let collector = HistoryCollector::new(&source, &settings, reference()).unwrap();
        collector.collect("up", "result").await.unwrap();

        assert_eq!(source.calls(), vec![("up".to_string(), QueryMode::Instant)]);
    }

    #[tokio::test]
    async fn test_historical_mode_queries_windows_in_order() {
        let source = FakeSource::new(|query, _| {
            vec![crate::testing::range_sample(&[("window", query)], &[(1.0, "1")])]
        });
        let settings = Settings {
            address: "h".to_string(),
            mode: RunMode::All,
            history: 2,
            ..Settings::default()
        };

        let collector = HistoryCollector::new(&source, &settings, reference()).unwrap();
        let samples = collector.collect("up", "result").await.unwrap();

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, mode)| *mode == QueryMode::Range));
        assert!(calls[0].0.starts_with("up&start=2026-10-17T00:00:00.000Z"));
        assert!(calls[2].0.starts_with("up&start=2026-10-19T00:00:00.000Z"));
        assert!(calls[0].0.ends_with("&step=5m"));

        // concatenated in the order the windows were queried
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].label("window"), Some(calls[2].0.as_str()));
    }

    #[tokio::test]
    async fn test_failing_window_aborts_collection() {
        let source = FakeSource::failing_when(|query| query.contains("2026-10-18T00"));
        let settings = Settings {
            address: "h".to_string(),
            mode: RunMode::All,
            history: 2,
            ..Settings::default()
        };

        let collector = HistoryCollector::new(&source, &settings, reference()).unwrap();
        assert!(collector.collect("up", "result").await.is_err());
        // the newest window is never requested after the failure
        assert_eq!(source.calls().len(), 2);
    }
}
