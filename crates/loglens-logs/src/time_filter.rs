use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use loglens_types::parse_timestamp;

use crate::notify::{ChangeNotifier, Subscription};

/// `1h30m`, `15m`, `2d`, `45s`, `500ms`
static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(ms|s|m|h|d|w)").expect("duration pattern is valid")
});

/// Parse a compact duration such as `15m` or `1h30m`.
/// Amounts too large for a `Duration` are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut consumed = 0;
    for cap in DURATION_PART.captures_iter(input) {
        let whole = cap.get(0)?;
        if !input[consumed..whole.start()].trim().is_empty() {
            return None;
        }
        consumed = whole.end();

        let amount: i64 = cap[1].parse().ok()?;
        let part = match cap[2].to_lowercase().as_str() {
            "ms" => Duration::try_milliseconds(amount),
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            _ => None,
        }?;
        total = total.checked_add(&part)?;
    }

    (consumed == input.len() && total > Duration::zero()).then_some(total)
}

/// Active window of the time filter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeWindow {
    /// The last `duration` up to now
    Relative {
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// Inclusive bounds; a missing bound is open
    Absolute {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::Relative {
            duration: Duration::minutes(15),
        }
    }
}

impl TimeWindow {
    fn contains(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            // A window reaching before the representable range has no lower bound
            Self::Relative { duration } => {
                now.checked_sub_signed(*duration).is_none_or(|from| ts >= from) && ts <= now
            }
            Self::Absolute { from, to } => {
                from.is_none_or(|from| ts >= from) && to.is_none_or(|to| ts <= to)
            }
        }
    }
}

/// Serializable snapshot of the filter
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilterState {
    pub enabled: bool,
    pub window: TimeWindow,
}

/// Time filter over raw entry timestamps
#[derive(Debug, Default)]
pub struct TimeFilter {
    state: TimeFilterState,
    revision: u64,
    notifier: ChangeNotifier,
}

impl TimeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: TimeFilterState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Does the raw timestamp fall into the window right now?
    /// Always true while disabled; unparseable timestamps never match.
    pub fn matches_ts(&self, ts: Option<&str>) -> bool {
        self.matches_at(ts, Utc::now())
    }

    /// Same as [`matches_ts`](Self::matches_ts) against an explicit clock
    pub fn matches_at(&self, ts: Option<&str>, now: DateTime<Utc>) -> bool {
        if !self.state.enabled {
            return true;
        }
        ts.and_then(parse_timestamp)
            .is_some_and(|ts| self.state.window.contains(ts, now))
    }

    pub fn set_relative(&mut self, duration: Duration) {
        self.set_window(TimeWindow::Relative { duration });
    }

    pub fn set_absolute(&mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        self.set_window(TimeWindow::Absolute { from, to });
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.state.enabled != enabled {
            self.state.enabled = enabled;
            self.changed();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn state(&self) -> TimeFilterState {
        self.state.clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    fn set_window(&mut self, window: TimeWindow) {
        if self.state.window != window {
            self.state.window = window;
            self.changed();
        }
    }

    fn changed(&mut self) {
        self.revision += 1;
        self.notifier.notify();
    }
}

mod duration_millis {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Duration::try_milliseconds(millis).ok_or_else(|| D::Error::custom("duration out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m"), Some(Duration::minutes(15)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("2D"), Some(Duration::days(2)));
        assert_eq!(parse_duration("1h 15m"), Some(Duration::minutes(75)));
        assert_eq!(parse_duration("500ms"), Some(Duration::milliseconds(500)));
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("15x"), None);
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert_eq!(parse_duration("99999999999999w"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
        assert_eq!(parse_duration("9223372036854775807ms 9223372036854775807ms"), None);
        assert!(parse_duration("100000000w").is_some());
    }

    #[test]
    fn test_huge_relative_window_has_open_lower_bound() {
        let mut filter = TimeFilter::new();
        filter.set_enabled(true);
        filter.set_relative(parse_duration("100000000w").unwrap());
        let now = at("2024-01-01T12:00:00Z");

        assert!(filter.matches_at(Some("1970-01-01T00:00:00Z"), now));
        assert!(filter.matches_at(Some("2024-01-01T12:00:00Z"), now));
        assert!(!filter.matches_at(Some("2024-01-01T12:00:01Z"), now));
    }

    #[test]
    fn test_disabled_matches_everything() {
        let filter = TimeFilter::new();
        assert!(filter.matches_ts(None));
        assert!(filter.matches_ts(Some("garbage")));
    }

    #[test]
    fn test_relative_window() {
        let mut filter = TimeFilter::new();
        filter.set_enabled(true);
        filter.set_relative(Duration::minutes(15));
        let now = at("2024-01-01T12:00:00Z");

        assert!(filter.matches_at(Some("2024-01-01T11:50:00Z"), now));
        assert!(!filter.matches_at(Some("2024-01-01T11:40:00Z"), now));
        assert!(!filter.matches_at(Some("garbage"), now));
        assert!(!filter.matches_at(None, now));
    }

    #[test]
    fn test_absolute_window_with_open_bound() {
        let mut filter = TimeFilter::new();
        filter.set_enabled(true);
        filter.set_absolute(Some(at("2024-01-01T00:00:00Z")), None);
        let now = at("2024-06-01T00:00:00Z");

        assert!(filter.matches_at(Some("2024-01-01T00:00:00Z"), now));
        assert!(filter.matches_at(Some("2030-01-01T00:00:00Z"), now));
        assert!(!filter.matches_at(Some("2023-12-31T23:59:59Z"), now));
    }

    #[test]
    fn test_revision_only_moves_on_change() {
        let mut filter = TimeFilter::new();
        filter.set_relative(Duration::minutes(15));
        assert_eq!(filter.revision(), 0);
        filter.set_relative(Duration::minutes(5));
        filter.set_enabled(true);
        filter.set_enabled(true);
        assert_eq!(filter.revision(), 2);
    }

    #[test]
    fn test_state_serializes() {
        let mut filter = TimeFilter::new();
        filter.set_enabled(true);
        filter.set_relative(Duration::hours(1));
        let json = serde_json::to_string(&filter.state()).unwrap();
        let state: TimeFilterState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, filter.state());
    }
}
