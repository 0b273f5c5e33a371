use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use loglens_logs::{AppendOptions, IngestSink};
use loglens_types::LogEntry;

use crate::backend::{BackendError, SearchBackend};
use crate::options::{SearchOptions, SearchResponse};

/// Source tag given to backend entries that arrive without one
const REMOTE_SOURCE_PREFIX: &str = "elastic://";

/// Tag untagged hits as remote so they count against the budget
fn stamp_source(mut entry: LogEntry, source: &str) -> LogEntry {
    if entry.source.as_deref().is_none_or(|s| s.trim().is_empty()) {
        entry.source = Some(source.to_string());
    }
    entry
}

/// Whether a new search adds to the store or starts over
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    #[default]
    Append,
    Replace,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaginatorState {
    #[default]
    Idle,
    Fetching,
    /// The backend reported no further pages
    Exhausted,
    /// The budget stopped fetching while more pages exist
    Capped,
}

/// Cursor of the current search
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaginationState {
    pub has_more: bool,
    /// Token that requests the next page to read
    pub continuation_token: Option<Value>,
    pub session_handle: Option<String>,
    pub total_known: Option<u64>,
    /// Remote entries already held when the search started
    pub baseline: usize,
    pub budget: usize,
    /// Records of the page behind `continuation_token` already ingested
    pub page_offset: usize,
}

/// Outcome of one fetch sequence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub ingested: usize,
    pub pages: usize,
    pub state: PaginatorState,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("a search is already in progress")]
    Busy,
    #[error("no search to resume")]
    NotResumable,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Single-flight flag, released on drop
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SearchError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| SearchError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    state: PaginatorState,
    pagination: PaginationState,
    options: Option<SearchOptions>,
    /// Skip remote history checks while ingesting (replace mode)
    ignore_existing: bool,
    /// Sink epoch the cursor belongs to; a later clear invalidates it
    epoch: u64,
}

/// Loads a paged remote search into an ingestion sink without letting the
/// number of remote entries exceed the budget.
pub struct SearchPaginator<B, S> {
    backend: B,
    sink: S,
    busy: AtomicBool,
    inner: Mutex<Inner>,
}

impl<B, S> SearchPaginator<B, S>
where
    B: SearchBackend,
    S: IngestSink,
{
    pub fn new(backend: B, sink: S, budget: usize) -> Self {
        Self {
            backend,
            sink,
            busy: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: PaginatorState::Idle,
                pagination: PaginationState {
                    budget,
                    ..Default::default()
                },
                options: None,
                ignore_existing: false,
                epoch: 0,
            }),
        }
    }

    pub fn state(&self) -> PaginatorState {
        self.inner.lock().state
    }

    pub fn pagination(&self) -> PaginationState {
        self.inner.lock().pagination.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> usize {
        self.inner.lock().pagination.budget
    }

    /// Change the budget; takes effect on the next fetch
    pub fn set_budget(&self, budget: usize) {
        self.inner.lock().pagination.budget = budget;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Start a new search and fetch pages until the budget or the results run out
    pub async fn start_search(&self, options: SearchOptions, mode: LoadMode) -> Result<FetchReport, SearchError> {
        let _guard = BusyGuard::acquire(&self.busy)?;

        let stale_session = self.inner.lock().pagination.session_handle.take();
        if let Some(session) = stale_session {
            if let Err(err) = self.backend.close_session(&session).await {
                warn!(%err, %session, "failed to close search session");
            }
        }

        let baseline = match mode {
            LoadMode::Replace => {
                self.sink.clear();
                0
            }
            LoadMode::Append => self.sink.remote_count(),
        };

        let available = {
            let mut inner = self.inner.lock();
            let budget = inner.pagination.budget;
            inner.pagination = PaginationState {
                has_more: true,
                baseline,
                budget,
                ..Default::default()
            };
            inner.options = Some(options);
            inner.ignore_existing = mode == LoadMode::Replace;
            inner.epoch = self.sink.epoch();
            budget.saturating_sub(baseline)
        };
        info!(?mode, baseline, available, "starting remote search");

        if available == 0 {
            self.set_state(PaginatorState::Capped);
            return Ok(FetchReport {
                state: PaginatorState::Capped,
                ..Default::default()
            });
        }
        self.fetch_loop(available).await
    }

    /// Continue a capped or interrupted search from the retained cursor
    pub async fn fetch_more(&self) -> Result<FetchReport, SearchError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.reset_if_cleared().await;

        let available = {
            let inner = self.inner.lock();
            let resumable = inner.options.is_some()
                && inner.pagination.has_more
                && matches!(inner.state, PaginatorState::Capped | PaginatorState::Idle);
            if !resumable {
                return Err(SearchError::NotResumable);
            }
            inner.pagination.budget.saturating_sub(self.sink.remote_count())
        };

        if available == 0 {
            debug!("budget still exhausted, nothing fetched");
            self.set_state(PaginatorState::Capped);
            return Ok(FetchReport {
                state: PaginatorState::Capped,
                ..Default::default()
            });
        }
        self.fetch_loop(available).await
    }

    async fn fetch_loop(&self, mut available: usize) -> Result<FetchReport, SearchError> {
        self.set_state(PaginatorState::Fetching);
        let mut report = FetchReport::default();

        loop {
            let (request, skip, ignore_existing) = self.next_request()?;
            let remote_source = format!("{REMOTE_SOURCE_PREFIX}{}", request.index);
            debug!(skip, available, token = ?request.search_after, "requesting page");

            let page = match self.backend.search(&request).await.and_then(SearchResponse::into_page) {
                Ok(page) => page,
                Err(err) => {
                    // Cursor stays on the last good page so fetch_more can retry
                    warn!(%err, "search page failed");
                    self.set_state(PaginatorState::Idle);
                    return Err(err.into());
                }
            };
            report.pages += 1;

            let fresh: Vec<LogEntry> = page.entries.into_iter().skip(skip).collect();
            let offered = fresh.len();
            let take = available.min(offered);
            let batch: Vec<LogEntry> = fresh
                .into_iter()
                .take(take)
                .map(|entry| stamp_source(entry, &remote_source))
                .collect();
            let accepted = self.sink.append(
                batch,
                AppendOptions {
                    ignore_existing_for_elastic: ignore_existing,
                },
            );
            available -= accepted.min(available);
            report.ingested += accepted;
            debug!(offered, taken = take, accepted, "ingested page");

            let consumed = take == offered;
            let finished = consumed && (!page.has_more || offered == 0);
            {
                let mut inner = self.inner.lock();
                let cursor = &mut inner.pagination;
                if page.session.is_some() {
                    cursor.session_handle = page.session;
                }
                if page.total.is_some() {
                    cursor.total_known = page.total;
                }
                if consumed {
                    cursor.continuation_token = page.next_search_after;
                    cursor.page_offset = 0;
                    cursor.has_more = page.has_more;
                } else {
                    cursor.page_offset = skip + take;
                    cursor.has_more = true;
                }
                if finished {
                    cursor.has_more = false;
                    cursor.session_handle = None;
                }
            }

            if finished {
                report.state = PaginatorState::Exhausted;
                break;
            }
            if available == 0 {
                report.state = PaginatorState::Capped;
                break;
            }
        }

        self.set_state(report.state);
        info!(ingested = report.ingested, pages = report.pages, state = ?report.state, "remote search stopped");
        Ok(report)
    }

    /// Drop the cursor when the sink was cleared behind our back
    async fn reset_if_cleared(&self) {
        let stale_session = {
            let mut inner = self.inner.lock();
            let epoch = self.sink.epoch();
            if inner.options.is_none() || inner.epoch == epoch {
                return;
            }
            info!(from = inner.epoch, to = epoch, "store was cleared, search cursor dropped");
            let budget = inner.pagination.budget;
            let session = inner.pagination.session_handle.take();
            inner.pagination = PaginationState {
                budget,
                ..Default::default()
            };
            inner.options = None;
            inner.ignore_existing = false;
            inner.epoch = epoch;
            inner.state = PaginatorState::Idle;
            session
        };
        if let Some(session) = stale_session {
            if let Err(err) = self.backend.close_session(&session).await {
                warn!(%err, %session, "failed to close search session");
            }
        }
    }

    fn next_request(&self) -> Result<(SearchOptions, usize, bool), SearchError> {
        let inner = self.inner.lock();
        let mut request = inner.options.clone().ok_or(SearchError::NotResumable)?;
        request.search_after = inner.pagination.continuation_token.clone();
        request.pit_session_id = inner.pagination.session_handle.clone();
        Ok((request, inner.pagination.page_offset, inner.ignore_existing))
    }

    fn set_state(&self, state: PaginatorState) {
        let mut inner = self.inner.lock();
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "paginator state");
            inner.state = state;
        }
    }
}
