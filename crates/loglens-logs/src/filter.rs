use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use loglens_types::{LogEntry, Mdc};

use crate::ArcLogEntry;
use crate::dc_filter::DcFilter;
use crate::expr::MessageExpr;
use crate::time_filter::TimeFilter;

/// A filter collaborator failed on one entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("matcher failed: {0}")]
pub struct MatchError(pub String);

/// Predicate over an entry's diagnostic context
pub trait MdcMatcher {
    fn matches(&self, mdc: &Mdc) -> Result<bool, MatchError>;
}

/// Predicate over an entry's raw timestamp
pub trait TimeMatcher {
    fn matches_ts(&self, ts: Option<&str>) -> Result<bool, MatchError>;
}

impl MdcMatcher for DcFilter {
    fn matches(&self, mdc: &Mdc) -> Result<bool, MatchError> {
        Ok(DcFilter::matches(self, mdc))
    }
}

impl TimeMatcher for TimeFilter {
    fn matches_ts(&self, ts: Option<&str>) -> Result<bool, MatchError> {
        Ok(TimeFilter::matches_ts(self, ts))
    }
}

/// Field filters, applied as one group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFilters {
    /// Case-insensitive exact match
    pub level: String,
    /// Case-insensitive substring
    pub logger: String,
    /// Case-insensitive substring
    pub thread: String,
    /// Contains-expression, see [`MessageExpr`]
    pub message: String,
    pub enabled: bool,
}

impl StandardFilters {
    pub fn is_empty(&self) -> bool {
        self.level.trim().is_empty()
            && self.logger.trim().is_empty()
            && self.thread.trim().is_empty()
            && MessageExpr::parse(&self.message).is_empty()
    }
}

/// Field filters plus the "only marked" switch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub standard: StandardFilters,
    pub only_marked: bool,
}

/// [`FilterState`] with its strings pre-lowered and the message expression parsed
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    level: Option<String>,
    logger: Option<String>,
    thread: Option<String>,
    message: MessageExpr,
    standard_enabled: bool,
    only_marked: bool,
}

fn lowered(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_lowercase())
}

impl CompiledFilter {
    pub fn new(state: &FilterState) -> Self {
        let std = &state.standard;
        Self {
            level: lowered(&std.level),
            logger: lowered(&std.logger),
            thread: lowered(&std.thread),
            message: MessageExpr::parse(&std.message),
            standard_enabled: std.enabled,
            only_marked: state.only_marked,
        }
    }

    /// Only-marked and standard stages
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.only_marked && entry.mark.is_none() {
            return false;
        }
        !self.standard_enabled || self.matches_standard(entry)
    }

    fn matches_standard(&self, entry: &LogEntry) -> bool {
        if let Some(level) = &self.level {
            if entry.level.trim().to_lowercase() != *level {
                return false;
            }
        }
        if let Some(logger) = &self.logger {
            if !entry.logger.to_lowercase().contains(logger.as_str()) {
                return false;
            }
        }
        if let Some(thread) = &self.thread {
            if !entry.thread.to_lowercase().contains(thread.as_str()) {
                return false;
            }
        }
        self.message.matches(&entry.message)
    }
}

/// Positions (in store order) of entries passing every active stage.
///
/// Stages run in order: only-marked, standard fields, time window (remote
/// entries only), diagnostic context. A collaborator error skips that stage
/// for that entry alone.
pub fn compute_visible(
    entries: &[ArcLogEntry],
    state: &FilterState,
    dc_filter: &dyn MdcMatcher,
    time_filter: &dyn TimeMatcher,
) -> Vec<usize> {
    let compiled = CompiledFilter::new(state);
    let empty = Mdc::new();

    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            if !compiled.matches(entry) {
                return false;
            }

            if entry.origin().is_remote() {
                match time_filter.matches_ts(entry.timestamp.as_deref()) {
                    Ok(false) => return false,
                    Ok(true) => {}
                    Err(err) => warn!(id = entry.id, %err, "time matcher failed, stage skipped"),
                }
            }

            match dc_filter.matches(entry.mdc.as_ref().unwrap_or(&empty)) {
                Ok(matched) => matched,
                Err(err) => {
                    warn!(id = entry.id, %err, "mdc matcher failed, stage skipped");
                    true
                }
            }
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Free-text search used for match navigation and highlighting
#[derive(Clone, Debug)]
pub struct SearchText {
    regex: Option<Regex>,
    pattern: String,
}

impl SearchText {
    /// Case-insensitive literal search; blank text matches nothing
    pub fn new(text: &str) -> Self {
        let regex = (!text.trim().is_empty())
            .then(|| {
                RegexBuilder::new(&regex::escape(text))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .flatten();

        Self {
            regex,
            pattern: text.to_string(),
        }
    }

    /// Does the message, logger, thread or stack trace contain the text?
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let Some(re) = &self.regex else {
            return false;
        };
        re.is_match(&entry.message)
            || re.is_match(&entry.logger)
            || re.is_match(&entry.thread)
            || entry.stack_trace.as_deref().is_some_and(|st| re.is_match(st))
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct Failing;

    impl MdcMatcher for Failing {
        fn matches(&self, _: &Mdc) -> Result<bool, MatchError> {
            Err(MatchError("boom".into()))
        }
    }

    impl TimeMatcher for Failing {
        fn matches_ts(&self, _: Option<&str>) -> Result<bool, MatchError> {
            Err(MatchError("boom".into()))
        }
    }

    fn entries() -> Vec<ArcLogEntry> {
        vec![
            LogEntry::new(Some("2020-01-01T00:00:00Z"), "com.acme.Db", "connection refused")
                .with_level("ERROR")
                .with_thread("pool-1")
                .with_source("elastic://logs")
                .with_mdc("traceId", "t1"),
            LogEntry::new(Some("2020-01-01T00:00:01Z"), "com.acme.Web", "request served")
                .with_level("info")
                .with_thread("http-2")
                .with_source("app.log"),
            LogEntry::new(Some("2020-01-01T00:00:02Z"), "com.acme.Db", "retrying connection")
                .with_level("WARN")
                .with_thread("pool-1")
                .with_source("app.log")
                .with_mdc("trace_id", "t2"),
        ]
        .into_iter()
        .map(Arc::new)
        .collect()
    }

    fn std_filter(f: impl FnOnce(&mut StandardFilters)) -> FilterState {
        let mut state = FilterState::default();
        state.standard.enabled = true;
        f(&mut state.standard);
        state
    }

    #[test]
    fn test_no_filters_show_everything() {
        let visible = compute_visible(&entries(), &FilterState::default(), &DcFilter::new(), &TimeFilter::new());
        assert_eq!(visible, vec![0, 1, 2]);
    }

    #[test]
    fn test_level_is_exact_case_insensitive() {
        let state = std_filter(|s| s.level = "error".into());
        let visible = compute_visible(&entries(), &state, &DcFilter::new(), &TimeFilter::new());
        assert_eq!(visible, vec![0]);

        let state = std_filter(|s| s.level = "err".into());
        assert!(compute_visible(&entries(), &state, &DcFilter::new(), &TimeFilter::new()).is_empty());
    }

    #[test]
    fn test_logger_thread_substring_and_message_expr() {
        let state = std_filter(|s| {
            s.logger = "acme.db".into();
            s.thread = "POOL".into();
            s.message = "connection & !retrying".into();
        });
        let visible = compute_visible(&entries(), &state, &DcFilter::new(), &TimeFilter::new());
        assert_eq!(visible, vec![0]);
    }

    #[test]
    fn test_disabled_group_keeps_other_stages() {
        let mut state = std_filter(|s| s.level = "nothing".into());
        state.standard.enabled = false;

        let mut dc = DcFilter::new();
        dc.add_entry("traceId", Some("t2"));
        let visible = compute_visible(&entries(), &state, &dc, &TimeFilter::new());
        assert_eq!(visible, vec![2]);

        let mut time = TimeFilter::new();
        time.set_enabled(true);
        let visible = compute_visible(&entries(), &state, &DcFilter::new(), &time);
        // The remote entry from 2020 falls outside the last 15 minutes
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn test_time_filter_ignores_non_remote_entries() {
        let mut time = TimeFilter::new();
        time.set_enabled(true);
        time.set_absolute(
            loglens_types::parse_timestamp("2019-01-01T00:00:00Z"),
            loglens_types::parse_timestamp("2019-12-31T00:00:00Z"),
        );
        let visible = compute_visible(&entries(), &FilterState::default(), &DcFilter::new(), &time);
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn test_only_marked() {
        let mut list = entries();
        let mut marked = LogEntry::clone(&list[1]);
        marked.mark = Some("red".into());
        list[1] = Arc::new(marked);

        let state = FilterState {
            only_marked: true,
            ..Default::default()
        };
        let visible = compute_visible(&list, &state, &DcFilter::new(), &TimeFilter::new());
        assert_eq!(visible, vec![1]);
    }

    #[test]
    #[traced_test]
    fn test_failing_collaborators_do_not_blank_view() {
        let visible = compute_visible(&entries(), &FilterState::default(), &Failing, &Failing);
        assert_eq!(visible, vec![0, 1, 2]);

        logs_assert(|lines: &[&str]| {
            let warned = |msg: &str| lines.iter().filter(|l| l.contains("WARN") && l.contains(msg)).count();
            match (warned("time matcher failed"), warned("mdc matcher failed")) {
                (1, 3) => Ok(()),
                counts => Err(format!("unexpected warnings: {counts:?}")),
            }
        });
    }

    #[test]
    fn test_search_text() {
        let search = SearchText::new("CONNECTION");
        let list = entries();
        assert!(search.matches(&list[0]));
        assert!(!search.matches(&list[1]));
        assert_eq!(search.find_matches("a connection, another Connection").len(), 2);

        let search = SearchText::new("a.b(");
        assert!(search.find_matches("xa.b(y").len() == 1);

        assert!(SearchText::new("  ").is_empty());
        assert!(!SearchText::new("").matches(&list[0]));
    }

    #[test]
    fn test_standard_filters_is_empty() {
        assert!(StandardFilters::default().is_empty());
        assert!(StandardFilters { message: " & ".into(), ..Default::default() }.is_empty());
        assert!(!StandardFilters { logger: "x".into(), ..Default::default() }.is_empty());
    }
}
