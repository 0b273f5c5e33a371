use serde_json::{Map, Value};

use loglens_types::{LogEntry, LogLevel, Mdc, mdc_value_to_string, parse_timestamp};

const TIMESTAMP_FIELDS: &[&str] = &["@timestamp", "timestamp", "time", "ts"];
const LEVEL_FIELDS: &[&str] = &["level", "severity", "lvl", "log.level", "log_level"];
const LOGGER_FIELDS: &[&str] = &["logger", "logger_name", "loggerName"];
const THREAD_FIELDS: &[&str] = &["thread", "thread_name", "threadName"];
const MESSAGE_FIELDS: &[&str] = &["message", "msg"];
const STACK_FIELDS: &[&str] = &["stack_trace", "stackTrace", "exception"];
const MDC_FIELDS: &[&str] = &["mdc", "context"];

/// Log parser turning raw file lines into entries
pub struct LogParser;

impl LogParser {
    /// Parse every non-blank line of a file's content
    pub fn parse_lines(content: &str, source: &str) -> Vec<LogEntry> {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Self::parse_line(line, source))
            .collect()
    }

    /// Parse one line: a JSON object if it is one, plain text otherwise
    pub fn parse_line(line: &str, source: &str) -> LogEntry {
        let mut entry = Self::try_parse_json(line).unwrap_or_else(|| Self::parse_text(line));
        entry.source = Some(source.to_string());
        entry
    }

    fn try_parse_json(line: &str) -> Option<LogEntry> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let Value::Object(mut obj) = serde_json::from_str::<Value>(trimmed).ok()? else {
            return None;
        };

        let timestamp = take_field(&mut obj, TIMESTAMP_FIELDS).and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let level = take_field(&mut obj, LEVEL_FIELDS)
            .map(|v| match v {
                Value::Number(n) => n.as_u64().map(numeric_level).unwrap_or_default().to_string(),
                other => mdc_value_to_string(&other),
            })
            .unwrap_or_default();

        let mut entry = LogEntry {
            timestamp,
            level,
            logger: take_string(&mut obj, LOGGER_FIELDS),
            thread: take_string(&mut obj, THREAD_FIELDS),
            message: take_string(&mut obj, MESSAGE_FIELDS),
            stack_trace: Some(take_string(&mut obj, STACK_FIELDS)).filter(|s| !s.is_empty()),
            ..Default::default()
        };

        entry.mdc = match take_field(&mut obj, MDC_FIELDS) {
            Some(Value::Object(explicit)) => Some(scalars(explicit)),
            _ => Some(scalars(obj)),
        }
        .filter(|mdc| !mdc.is_empty());

        Some(entry)
    }

    fn parse_text(line: &str) -> LogEntry {
        let (timestamp, content) = extract_timestamp(line);
        let level = level_name(extract_level_from_text(content));
        LogEntry {
            timestamp: timestamp.map(str::to_string),
            level: level.to_string(),
            message: content.to_string(),
            ..Default::default()
        }
    }
}

fn take_field(obj: &mut Map<String, Value>, names: &[&str]) -> Option<Value> {
    names.iter().find_map(|name| obj.remove(*name))
}

fn take_string(obj: &mut Map<String, Value>, names: &[&str]) -> String {
    take_field(obj, names)
        .map(|v| mdc_value_to_string(&v))
        .unwrap_or_default()
}

/// Keep scalar values only; nested objects and arrays are not context
fn scalars(obj: Map<String, Value>) -> Mdc {
    obj.into_iter()
        .filter(|(_, v)| !matches!(v, Value::Object(_) | Value::Array(_) | Value::Null))
        .collect()
}

/// Leading timestamp, as one token (`2024-01-15T10:30:00Z`) or two
/// (`2024-01-15 10:30:00.123`)
fn extract_timestamp(line: &str) -> (Option<&str>, &str) {
    let line = line.trim_start();
    let mut token_ends = line
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(idx, _)| idx)
        .chain(std::iter::once(line.len()));

    for _ in 0..2 {
        let Some(end) = token_ends.next() else {
            break;
        };
        let candidate = &line[..end];
        // Bare epoch numbers at line start are too ambiguous to treat as time
        if !candidate.contains('-') {
            continue;
        }
        if parse_timestamp(candidate).is_some() {
            return (Some(candidate), line[end..].trim_start());
        }
    }
    (None, line)
}

fn numeric_level(num: u64) -> &'static str {
    match num {
        0..=10 => "TRACE",
        11..=20 => "DEBUG",
        21..=30 => "INFO",
        31..=40 => "WARN",
        41..=50 => "ERROR",
        _ => "FATAL",
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "TRACE",
        LogLevel::Debug => "DEBUG",
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
        LogLevel::Fatal => "FATAL",
        LogLevel::Unknown => "",
    }
}

/// Extract log level from plain text patterns
fn extract_level_from_text(content: &str) -> LogLevel {
    let upper = content.to_uppercase();

    // Bracketed patterns first: [ERROR], [WARN], ...
    let bracket_patterns = [
        ("[FATAL]", LogLevel::Fatal),
        ("[PANIC]", LogLevel::Fatal),
        ("[CRITICAL]", LogLevel::Fatal),
        ("[ERROR]", LogLevel::Error),
        ("[ERR]", LogLevel::Error),
        ("[WARN]", LogLevel::Warn),
        ("[WARNING]", LogLevel::Warn),
        ("[INFO]", LogLevel::Info),
        ("[DEBUG]", LogLevel::Debug),
        ("[TRACE]", LogLevel::Trace),
    ];
    for (pattern, level) in bracket_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    let colon_patterns = [
        ("FATAL:", LogLevel::Fatal),
        ("ERROR:", LogLevel::Error),
        ("WARNING:", LogLevel::Warn),
        ("WARN:", LogLevel::Warn),
        ("INFO:", LogLevel::Info),
        ("DEBUG:", LogLevel::Debug),
        ("TRACE:", LogLevel::Trace),
    ];
    for (pattern, level) in colon_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    let spaced_patterns = [
        (" FATAL ", LogLevel::Fatal),
        (" ERROR ", LogLevel::Error),
        (" WARN ", LogLevel::Warn),
        (" WARNING ", LogLevel::Warn),
        (" INFO ", LogLevel::Info),
        (" DEBUG ", LogLevel::Debug),
        (" TRACE ", LogLevel::Trace),
    ];
    for (pattern, level) in spaced_patterns {
        if upper.contains(pattern) {
            return level;
        }
    }

    // Level as the first word
    upper
        .split_whitespace()
        .next()
        .map(LogLevel::parse)
        .unwrap_or(LogLevel::Unknown)
}
