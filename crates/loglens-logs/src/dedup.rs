use std::collections::{HashMap, HashSet};

use loglens_types::{LogEntry, Origin, Signature};

/// Per-scope record of signatures already accepted into the store.
///
/// Remote entries share one scope. File entries get one scope per distinct
/// `source`, so the same line in two files is kept twice. Other entries are
/// never deduplicated.
#[derive(Debug, Default)]
pub struct Deduplicator {
    remote_seen: HashSet<Signature>,
    file_seen: HashMap<String, HashSet<Signature>>,
}

/// Scope key for one batch pass
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Scope {
    Remote,
    File(String),
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records already known in their scope or repeated within `batch`.
    ///
    /// Accepted records keep their relative order and are recorded as seen.
    /// With `ignore_existing_remote`, remote records are only checked against
    /// the rest of the batch, not against history.
    pub fn filter_batch(&mut self, batch: Vec<LogEntry>, ignore_existing_remote: bool) -> Vec<LogEntry> {
        let mut batch_seen: HashMap<Scope, HashSet<Signature>> = HashMap::new();
        let mut accepted = Vec::with_capacity(batch.len());

        for entry in batch {
            let scope = match entry.origin() {
                Origin::Remote => Scope::Remote,
                Origin::File => Scope::File(entry.source.clone().unwrap_or_default()),
                Origin::Other => {
                    accepted.push(entry);
                    continue;
                }
            };

            let signature = entry.signature();
            let known = match &scope {
                Scope::Remote => !ignore_existing_remote && self.remote_seen.contains(&signature),
                Scope::File(source) => self
                    .file_seen
                    .get(source)
                    .is_some_and(|seen| seen.contains(&signature)),
            };
            if known {
                continue;
            }

            if !batch_seen.entry(scope).or_default().insert(signature) {
                continue;
            }
            accepted.push(entry);
        }

        for (scope, signatures) in batch_seen {
            match scope {
                Scope::Remote => self.remote_seen.extend(signatures),
                Scope::File(source) => self.file_seen.entry(source).or_default().extend(signatures),
            }
        }

        accepted
    }

    /// Forget every scope
    pub fn reset(&mut self) {
        self.remote_seen.clear();
        self.file_seen.clear();
    }

    /// Number of distinct file scopes seen so far
    pub fn file_scopes(&self) -> usize {
        self.file_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(source: &str, message: &str) -> LogEntry {
        LogEntry::new(Some("2024-01-01T00:00:00Z"), "svc", message).with_source(source)
    }

    #[test]
    fn test_same_file_collapses_within_batch() {
        let mut dedup = Deduplicator::new();
        let accepted = dedup.filter_batch(vec![line("a.log", "x"), line("a.log", "x")], false);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn test_different_files_are_separate_scopes() {
        let mut dedup = Deduplicator::new();
        let accepted = dedup.filter_batch(vec![line("a.log", "x"), line("b.log", "x")], false);
        assert_eq!(accepted.len(), 2);
        assert_eq!(dedup.file_scopes(), 2);
    }

    #[test]
    fn test_history_is_checked_across_batches() {
        let mut dedup = Deduplicator::new();
        assert_eq!(dedup.filter_batch(vec![line("elastic://idx", "x")], false).len(), 1);
        assert_eq!(dedup.filter_batch(vec![line("elastic://idx", "x")], false).len(), 0);
        assert_eq!(dedup.filter_batch(vec![line("elastic://other", "x")], false).len(), 0);
    }

    #[test]
    fn test_ignore_existing_remote_still_collapses_batch() {
        let mut dedup = Deduplicator::new();
        dedup.filter_batch(vec![line("elastic://idx", "x")], false);

        let accepted = dedup.filter_batch(
            vec![line("elastic://idx", "x"), line("elastic://idx", "x")],
            true,
        );
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn test_other_origin_never_deduplicated() {
        let mut dedup = Deduplicator::new();
        let batch = vec![line("tcp://host:4560", "x"), line("tcp://host:4560", "x")];
        assert_eq!(dedup.filter_batch(batch, false).len(), 2);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut dedup = Deduplicator::new();
        dedup.filter_batch(vec![line("a.log", "x")], false);
        dedup.reset();
        assert_eq!(dedup.filter_batch(vec![line("a.log", "x")], false).len(), 1);
    }
}
