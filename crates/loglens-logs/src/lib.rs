//! Log engine for loglens
//!
//! This crate provides the entry store, marks, filtering, selection and the
//! view that ties them together.

use std::sync::Arc;

mod dc_filter;
mod dedup;
mod expr;
mod filter;
mod marks;
mod mdc;
mod notify;
mod parser;
mod selection;
mod settings;
mod store;
mod time_filter;
mod view;

/// Shared entry handle; marks are applied by swapping the `Arc`
pub type ArcLogEntry = Arc<LogEntry>;

pub use dc_filter::{DcFilter, DcFilterEntry, DcFilterState};
pub use dedup::Deduplicator;
pub use expr::{MessageExpr, message_matches};
pub use filter::{
    CompiledFilter, FilterState, MatchError, MdcMatcher, SearchText, StandardFilters, TimeMatcher,
    compute_visible,
};
pub use marks::MarkManager;
pub use mdc::{MdcKeyGroup, MdcValueCount, aggregate_selection, canonical_mdc_key, entry_mdc_pairs};
pub use notify::{ChangeNotifier, Subscription};
pub use parser::LogParser;
pub use selection::{Selection, marked_positions, search_match_positions};
pub use settings::{JsonSettingsFile, MemorySettings, Settings, SettingsError, SettingsPatch, SettingsStore};
pub use store::{AppendOptions, IngestSink, LevelCounts, LogStore};
pub use time_filter::{TimeFilter, TimeFilterState, TimeWindow, parse_duration};
pub use view::LogView;

// Re-export types used in our public API
pub use loglens_types::{LogEntry, LogLevel, Mdc, Origin, Signature};
