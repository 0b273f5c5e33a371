//! Remote search for loglens
//!
//! The request/response contract of the paged search backend and the
//! paginator that loads results into the store under a budget.

mod backend;
mod options;
mod paginator;

pub use backend::{BackendError, SearchBackend};
pub use options::{EnvironmentCase, SearchOptions, SearchPage, SearchResponse, SortOrder};
pub use paginator::{FetchReport, LoadMode, PaginationState, PaginatorState, SearchError, SearchPaginator};
