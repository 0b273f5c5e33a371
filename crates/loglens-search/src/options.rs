use serde::{Deserialize, Serialize};
use serde_json::Value;

use loglens_types::LogEntry;

use crate::backend::BackendError;

/// Sort direction on the timestamp field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// How the environment name is matched against the index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentCase {
    #[default]
    Original,
    Lower,
    Upper,
}

/// One page request to the search backend.
///
/// `search_after` and `pit_session_id` are filled in by the paginator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    pub index: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,

    /// Relative window such as `15m`; ignored when `from`/`to` are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    #[serde(rename = "application_name", default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default)]
    pub environment_case: EnvironmentCase,

    #[serde(rename = "allowInsecureTLS", default, skip_serializing_if = "Option::is_none")]
    pub allow_insecure_tls: Option<bool>,

    /// Session keep-alive, e.g. `1m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,

    /// Opaque continuation token from the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Value>,

    /// Opaque session handle kept alive across pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_session_id: Option<String>,
}

/// Raw backend reply
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub ok: bool,
    #[serde(default)]
    pub entries: Option<Vec<LogEntry>>,
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub next_search_after: Option<Value>,
    #[serde(default)]
    pub pit_session_id: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A successful page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
    pub entries: Vec<LogEntry>,
    pub has_more: bool,
    pub next_search_after: Option<Value>,
    pub session: Option<String>,
    pub total: Option<u64>,
}

impl SearchResponse {
    /// `ok: false` becomes a [`BackendError::Rejected`]
    pub fn into_page(self) -> Result<SearchPage, BackendError> {
        if !self.ok {
            return Err(BackendError::Rejected(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(SearchPage {
            entries: self.entries.unwrap_or_default(),
            has_more: self.has_more.unwrap_or(false),
            next_search_after: self.next_search_after,
            session: self.pit_session_id,
            total: self.total,
        })
    }
}
