//! Shared types for loglens
//!
//! This crate contains data structures used across multiple loglens crates.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Origin
// ============================================================================

/// Scheme used by entries that came back from the remote search backend
pub const REMOTE_SCHEME: &str = "elastic";

/// Where an entry came from, derived from its `source` tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// `elastic://...` entries produced by the search paginator
    Remote,
    /// A plain path with no scheme
    File,
    /// Anything else: TCP, HTTP polling, or no source at all
    Other,
}

impl Origin {
    /// Classify a `source` tag
    pub fn classify(source: Option<&str>) -> Self {
        let Some(source) = source.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Other;
        };

        match source.split_once("://") {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case(REMOTE_SCHEME) => Self::Remote,
            Some(_) => Self::Other,
            None => Self::File,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote)
    }
}

// ============================================================================
// Log Level
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" | "trc" | "trce" | "finest" => Self::Trace,
            "debug" | "dbg" | "debg" | "fine" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "erro" | "severe" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Unknown => "???",
        }
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parse an entry timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` and `YYYY-MM-DDTHH:MM:SS[.fff]`
/// without offset (read as UTC), and integer epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S,%3f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

// ============================================================================
// Signature
// ============================================================================

/// Content key `timestamp|logger|message` used for dedup and for marks.
///
/// Two entries with the same signature are duplicates within one dedup scope,
/// even when other fields differ.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn of(entry: &LogEntry) -> Self {
        Self(format!(
            "{}|{}|{}",
            entry.timestamp.as_deref().unwrap_or_default(),
            entry.logger,
            entry.message
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Signature {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Signature {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Log Entry
// ============================================================================

/// Diagnostic context attached to an entry
pub type Mdc = BTreeMap<String, serde_json::Value>;

/// A single log entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Sequential ID assigned by the store on ingestion
    #[serde(default)]
    pub id: u64,

    /// Raw timestamp as delivered by the source
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub logger: String,

    #[serde(default)]
    pub thread: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Diagnostic context, keys as delivered (not canonicalized)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mdc: Option<Mdc>,

    /// Origin tag, e.g. a file path or `elastic://index`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Highlight color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
}

impl LogEntry {
    /// Create a new entry with minimal fields
    pub fn new(timestamp: Option<&str>, logger: &str, message: &str) -> Self {
        Self {
            timestamp: timestamp.map(str::to_string),
            logger: logger.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_thread(mut self, thread: &str) -> Self {
        self.thread = thread.to_string();
        self
    }

    pub fn with_mdc(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.mdc
            .get_or_insert_with(Mdc::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn origin(&self) -> Origin {
        Origin::classify(self.source.as_deref())
    }

    pub fn signature(&self) -> Signature {
        Signature::of(self)
    }

    /// Parsed timestamp, `None` when missing or unparseable
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// Detected severity of the free-form `level` field
    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.level)
    }

    /// Ordering key used by the store: timestamp first, then id
    pub fn sort_key(&self) -> (Option<DateTime<Utc>>, u64) {
        (self.parsed_timestamp(), self.id)
    }
}

/// Render a scalar MDC value for display and matching (strings unquoted)
pub fn mdc_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_classify() {
        assert_eq!(Origin::classify(Some("elastic://prod-logs")), Origin::Remote);
        assert_eq!(Origin::classify(Some("/var/log/app.log")), Origin::File);
        assert_eq!(Origin::classify(Some("tcp://0.0.0.0:4560")), Origin::Other);
        assert_eq!(Origin::classify(Some("")), Origin::Other);
        assert_eq!(Origin::classify(None), Origin::Other);
    }

    #[test]
    fn test_signature_format() {
        let entry = LogEntry::new(Some("2024-01-01T00:00:00Z"), "svc", "boot");
        assert_eq!(entry.signature().as_str(), "2024-01-01T00:00:00Z|svc|boot");

        let untimed = LogEntry::new(None, "svc", "boot");
        assert_eq!(untimed.signature().as_str(), "|svc|boot");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15T10:30:00.123Z").is_some());
        assert!(parse_timestamp("2024-01-15T10:30:00+02:00").is_some());
        assert!(parse_timestamp("2024-01-15 10:30:00.123").is_some());
        assert!(parse_timestamp("2024-01-15 10:30:00,123").is_some());
        assert_eq!(
            parse_timestamp("1704067200000"),
            parse_timestamp("2024-01-01T00:00:00Z")
        );
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_deserialize_numeric_timestamp() {
        let entry: LogEntry =
            serde_json::from_str(r#"{"timestamp":1704067200000,"message":"hi"}"#).unwrap();
        assert_eq!(entry.timestamp.as_deref(), Some("1704067200000"));
        assert!(entry.parsed_timestamp().is_some());
    }

    #[test]
    fn test_deserialize_camel_case_fields() {
        let entry: LogEntry = serde_json::from_str(
            r#"{"message":"boom","stackTrace":"at x","mdc":{"traceId":"abc","n":3}}"#,
        )
        .unwrap();
        assert_eq!(entry.stack_trace.as_deref(), Some("at x"));
        let mdc = entry.mdc.unwrap();
        assert_eq!(mdc_value_to_string(&mdc["traceId"]), "abc");
        assert_eq!(mdc_value_to_string(&mdc["n"]), "3");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("severe"), LogLevel::Error);
        assert_eq!(LogLevel::parse("noise"), LogLevel::Unknown);
    }
}
