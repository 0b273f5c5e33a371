use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use loglens_types::{Mdc, mdc_value_to_string};

use crate::mdc::canonical_mdc_key;
use crate::notify::{ChangeNotifier, Subscription};

/// One configured constraint. `value: None` accepts any value of the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcFilterEntry {
    pub key: String,
    pub value: Option<String>,
    pub active: bool,
}

/// Serializable snapshot of the filter
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcFilterState {
    pub enabled: bool,
    pub entries: Vec<DcFilterEntry>,
}

/// Diagnostic-context filter.
///
/// Active constraints on the same key are OR'ed, distinct keys are AND'ed.
/// Keys are compared in canonical form on both sides.
#[derive(Debug)]
pub struct DcFilter {
    entries: Vec<DcFilterEntry>,
    enabled: bool,
    revision: u64,
    notifier: ChangeNotifier,
}

impl Default for DcFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DcFilter {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            enabled: true,
            revision: 0,
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn from_state(state: DcFilterState) -> Self {
        let mut filter = Self::new();
        filter.enabled = state.enabled;
        for entry in state.entries {
            filter.add_entry(&entry.key, entry.value.as_deref());
            filter.set_active(&entry.key, entry.value.as_deref(), entry.active);
        }
        filter.revision = 0;
        filter
    }

    /// Does the context satisfy every active constraint?
    pub fn matches(&self, mdc: &Mdc) -> bool {
        if !self.enabled {
            return true;
        }

        let mut wanted: BTreeMap<&str, Vec<Option<&str>>> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| e.active) {
            wanted.entry(entry.key.as_str()).or_default().push(entry.value.as_deref());
        }
        if wanted.is_empty() {
            return true;
        }

        let mut present: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, value) in mdc {
            present
                .entry(canonical_mdc_key(key).into_owned())
                .or_default()
                .insert(mdc_value_to_string(value));
        }

        wanted.iter().all(|(key, values)| {
            let Some(seen) = present.get(*key) else {
                return false;
            };
            values.iter().any(|value| match value {
                None => true,
                Some(value) => seen.contains(*value),
            })
        })
    }

    /// Add a constraint (`value: None` for any value). Re-adding an existing
    /// constraint re-activates it.
    pub fn add_entry(&mut self, key: &str, value: Option<&str>) {
        let key = canonical_mdc_key(key).into_owned();
        if key.is_empty() {
            return;
        }
        let value = value.map(str::to_string);

        match self.position(&key, value.as_deref()) {
            Some(idx) if self.entries[idx].active => return,
            Some(idx) => self.entries[idx].active = true,
            None => self.entries.push(DcFilterEntry {
                key,
                value,
                active: true,
            }),
        }
        self.changed();
    }

    pub fn remove_entry(&mut self, key: &str, value: Option<&str>) -> bool {
        let key = canonical_mdc_key(key);
        match self.position(&key, value) {
            Some(idx) => {
                self.entries.remove(idx);
                self.changed();
                true
            }
            None => false,
        }
    }

    /// Toggle a constraint without removing it
    pub fn set_active(&mut self, key: &str, value: Option<&str>, active: bool) -> bool {
        let key = canonical_mdc_key(key);
        match self.position(&key, value) {
            Some(idx) if self.entries[idx].active != active => {
                self.entries[idx].active = active;
                self.changed();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.changed();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.changed();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn entries(&self) -> &[DcFilterEntry] {
        &self.entries
    }

    pub fn state(&self) -> DcFilterState {
        DcFilterState {
            enabled: self.enabled,
            entries: self.entries.clone(),
        }
    }

    /// Bumped on every change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    fn position(&self, key: &str, value: Option<&str>) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.key == key && e.value.as_deref() == value)
    }

    fn changed(&mut self) {
        self.revision += 1;
        self.notifier.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mdc(pairs: &[(&str, &str)]) -> Mdc {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = DcFilter::new();
        assert!(filter.matches(&Mdc::new()));
        assert!(filter.matches(&mdc(&[("traceId", "a")])));
    }

    #[test]
    fn test_or_within_key_and_across_keys() {
        let mut filter = DcFilter::new();
        filter.add_entry("traceId", Some("a"));
        filter.add_entry("traceId", Some("b"));
        filter.add_entry("tenant", Some("acme"));

        assert!(filter.matches(&mdc(&[("trace_id", "b"), ("tenantId", "acme")])));
        assert!(!filter.matches(&mdc(&[("traceId", "c"), ("tenantId", "acme")])));
        assert!(!filter.matches(&mdc(&[("traceId", "a")])));
    }

    #[test]
    fn test_wildcard_requires_presence() {
        let mut filter = DcFilter::new();
        filter.add_entry("requestId", None);
        assert!(filter.matches(&mdc(&[("x-request-id", "r1")])));
        assert!(!filter.matches(&Mdc::new()));
    }

    #[test]
    fn test_disabled_and_inactive_entries_are_ignored() {
        let mut filter = DcFilter::new();
        filter.add_entry("traceId", Some("a"));
        assert!(!filter.matches(&Mdc::new()));

        filter.set_enabled(false);
        assert!(filter.matches(&Mdc::new()));

        filter.set_enabled(true);
        assert!(filter.set_active("trace_id", Some("a"), false));
        assert!(filter.matches(&Mdc::new()));
    }

    #[test]
    fn test_add_is_deduplicated_and_notifies() {
        let mut filter = DcFilter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = filter.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        filter.add_entry("traceId", Some("a"));
        filter.add_entry("trace_id", Some("a"));
        assert_eq!(filter.entries().len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(filter.remove_entry("TRACE_ID", Some("a")));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(filter.revision(), 2);
    }

    #[test]
    fn test_state_round_trip() {
        let mut filter = DcFilter::new();
        filter.add_entry("traceId", Some("a"));
        filter.add_entry("spanId", None);
        filter.set_active("spanId", None, false);
        filter.set_enabled(false);

        let restored = DcFilter::from_state(filter.state());
        assert_eq!(restored.state(), filter.state());
    }
}
