//! The view context: one store, its filters, search and selection, wired
//! together with a cached visible index set.

use std::sync::Arc;

use tracing::{debug, warn};

use loglens_types::{LogEntry, Signature};

use crate::ArcLogEntry;
use crate::dc_filter::DcFilter;
use crate::filter::{FilterState, SearchText, StandardFilters, compute_visible};
use crate::marks::MarkManager;
use crate::mdc::{MdcKeyGroup, aggregate_selection};
use crate::selection::{Selection, marked_positions, search_match_positions};
use crate::settings::{SettingsError, SettingsPatch, SettingsStore};
use crate::store::{AppendOptions, LogStore};
use crate::time_filter::TimeFilter;

/// Everything the visible set depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CacheKey {
    generation: u64,
    filters: u64,
    dc_filter: u64,
    time_filter: u64,
}

/// Cache for the filtered view, rebuilt only when an input moved
#[derive(Default)]
struct VisibleCache {
    key: Option<CacheKey>,
    /// Store epoch of `entries`
    epoch: u64,
    entries: Vec<ArcLogEntry>,
    visible: Vec<usize>,
}

/// Store, filters, search and selection of one log window
pub struct LogView {
    store: LogStore,
    filters: FilterState,
    filters_revision: u64,
    dc_filter: DcFilter,
    time_filter: TimeFilter,
    selection: Selection,
    search: SearchText,
    settings: Arc<dyn SettingsStore>,
    cache: VisibleCache,

    /// Last failure to surface to the user
    error_message: Option<String>,
}

impl LogView {
    pub fn new(store: LogStore, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            filters: FilterState::default(),
            filters_revision: 0,
            dc_filter: DcFilter::new(),
            time_filter: TimeFilter::new(),
            selection: Selection::new(),
            search: SearchText::new(""),
            settings,
            cache: VisibleCache::default(),
            error_message: None,
        }
    }

    /// Build a view over a fresh store seeded from persisted settings
    pub fn load(settings: Arc<dyn SettingsStore>) -> Result<Self, SettingsError> {
        let saved = settings.get()?;
        let store = LogStore::with_marks(MarkManager::from_parts(saved.marks, saved.custom_colors));
        let mut view = Self::new(store, settings);
        view.filters.only_marked = saved.only_marked;
        Ok(view)
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Append through the store. Producers holding a store clone get the
    /// same selection handling on the next read.
    pub fn append(&mut self, batch: Vec<LogEntry>, opts: AppendOptions) -> usize {
        self.store.append(batch, opts)
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.selection.clear();
    }

    // ------------------------------------------------------------------
    // Visible set
    // ------------------------------------------------------------------

    /// Global positions of visible entries, ascending
    pub fn visible(&mut self) -> &[usize] {
        self.refresh();
        &self.cache.visible
    }

    /// Store snapshot the visible positions refer to
    pub fn entries(&mut self) -> &[ArcLogEntry] {
        self.refresh();
        &self.cache.entries
    }

    pub fn visible_entries(&mut self) -> Vec<ArcLogEntry> {
        self.refresh();
        self.cache
            .visible
            .iter()
            .filter_map(|&pos| self.cache.entries.get(pos).cloned())
            .collect()
    }

    /// Force a recompute, e.g. when a relative time window moved with the clock
    pub fn invalidate(&mut self) {
        self.cache.key = None;
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            generation: self.store.generation(),
            filters: self.filters_revision,
            dc_filter: self.dc_filter.revision(),
            time_filter: self.time_filter.revision(),
        }
    }

    fn refresh(&mut self) {
        let key = self.cache_key();
        if self.cache.key == Some(key) {
            return;
        }

        let (epoch, entries) = self.store.snapshot();
        if epoch != self.cache.epoch {
            debug!(epoch, "store was cleared, dropping selection");
            self.selection.clear();
        } else if self.cache.key.map(|k| k.generation) != Some(key.generation) {
            // Selected positions refer to the previous snapshot
            self.selection.remap(&self.cache.entries, &entries);
        }

        let visible = compute_visible(&entries, &self.filters, &self.dc_filter, &self.time_filter);
        debug!(total = entries.len(), visible = visible.len(), "recomputed visible entries");

        self.selection.retain_visible(&visible);
        self.cache = VisibleCache {
            key: Some(key),
            epoch,
            entries,
            visible,
        };
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn set_standard_filters(&mut self, standard: StandardFilters) {
        if self.filters.standard != standard {
            self.filters.standard = standard;
            self.filters_revision += 1;
        }
    }

    /// Toggle the standard group without losing its values
    pub fn set_standard_enabled(&mut self, enabled: bool) {
        if self.filters.standard.enabled != enabled {
            self.filters.standard.enabled = enabled;
            self.filters_revision += 1;
        }
    }

    pub fn set_only_marked(&mut self, only_marked: bool) {
        if self.filters.only_marked == only_marked {
            return;
        }
        self.filters.only_marked = only_marked;
        self.filters_revision += 1;
        self.persist(SettingsPatch {
            only_marked: Some(only_marked),
            ..Default::default()
        });
    }

    pub fn dc_filter(&self) -> &DcFilter {
        &self.dc_filter
    }

    pub fn dc_filter_mut(&mut self) -> &mut DcFilter {
        &mut self.dc_filter
    }

    pub fn time_filter(&self) -> &TimeFilter {
        &self.time_filter
    }

    pub fn time_filter_mut(&mut self) -> &mut TimeFilter {
        &mut self.time_filter
    }

    // ------------------------------------------------------------------
    // Search and navigation
    // ------------------------------------------------------------------

    pub fn set_search(&mut self, text: &str) {
        self.search = SearchText::new(text);
    }

    pub fn search(&self) -> &SearchText {
        &self.search
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn toggle(&mut self, global: usize, extend: bool, additive: bool) {
        self.refresh();
        self.selection.toggle(global, extend, additive, &self.cache.visible);
    }

    pub fn move_by(&mut self, direction: isize, extend: bool) -> Option<usize> {
        self.refresh();
        self.selection.move_by(direction, extend, &self.cache.visible)
    }

    pub fn goto_start(&mut self) -> Option<usize> {
        self.refresh();
        self.selection.goto_start(&self.cache.visible)
    }

    pub fn goto_end(&mut self) -> Option<usize> {
        self.refresh();
        self.selection.goto_end(&self.cache.visible)
    }

    pub fn goto_marked(&mut self, direction: isize) -> Option<usize> {
        self.refresh();
        let marked = marked_positions(&self.cache.entries, &self.cache.visible);
        self.selection.goto_marked(direction, &marked, &self.cache.visible)
    }

    pub fn goto_search_match(&mut self, direction: isize) -> Option<usize> {
        self.refresh();
        let matches = search_match_positions(&self.cache.entries, &self.cache.visible, &self.search);
        self.selection.goto_search_match(direction, &matches, &self.cache.visible)
    }

    pub fn selected_entries(&mut self) -> Vec<ArcLogEntry> {
        self.refresh();
        self.selection
            .selected()
            .iter()
            .filter_map(|&pos| self.cache.entries.get(pos).cloned())
            .collect()
    }

    /// Diagnostic-context overview of the current selection
    pub fn selection_mdc(&mut self) -> Vec<MdcKeyGroup> {
        let selected = self.selected_entries();
        aggregate_selection(selected.iter().map(|e| &**e))
    }

    // ------------------------------------------------------------------
    // Marks
    // ------------------------------------------------------------------

    /// Set or remove a mark. Applied in memory first; a failed save is
    /// reported through [`error_message`](Self::error_message).
    pub fn set_mark(&mut self, signature: Signature, color: Option<String>) -> bool {
        if !self.store.set_mark(signature, color) {
            return false;
        }
        self.persist(SettingsPatch {
            marks: Some(self.store.marks()),
            ..Default::default()
        });
        true
    }

    /// Mark (or unmark with `None`) every selected entry
    pub fn mark_selected(&mut self, color: Option<&str>) -> usize {
        let signatures: Vec<Signature> = self.selected_entries().iter().map(|e| e.signature()).collect();
        let mut changed = 0;
        for signature in signatures {
            if self.store.set_mark(signature, color.map(str::to_string)) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist(SettingsPatch {
                marks: Some(self.store.marks()),
                ..Default::default()
            });
        }
        changed
    }

    pub fn add_custom_color(&mut self, color: &str) -> bool {
        let added = self.store.add_custom_color(color);
        if added {
            self.persist_colors();
        }
        added
    }

    pub fn remove_custom_color(&mut self, color: &str) -> bool {
        let removed = self.store.remove_custom_color(color);
        if removed {
            self.persist_colors();
        }
        removed
    }

    fn persist_colors(&mut self) {
        self.persist(SettingsPatch {
            custom_colors: Some(self.store.custom_colors()),
            ..Default::default()
        });
    }

    fn persist(&mut self, patch: SettingsPatch) {
        if let Err(err) = self.settings.set(patch) {
            warn!(%err, "failed to persist settings");
            self.show_error(format!("Could not save settings: {err}"));
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Show an error message
    pub fn show_error(&mut self, msg: String) {
        self.error_message = Some(msg);
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Dismiss the error message
    pub fn dismiss_error(&mut self) {
        self.error_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettings, Settings};
    use crate::store::IngestSink;

    struct BrokenSettings;

    impl SettingsStore for BrokenSettings {
        fn get(&self) -> Result<Settings, SettingsError> {
            Ok(Settings::default())
        }

        fn set(&self, _: SettingsPatch) -> Result<(), SettingsError> {
            Err(SettingsError::Unavailable("disk full".into()))
        }
    }

    fn entry(secs: u32, message: &str) -> LogEntry {
        LogEntry::new(Some(&format!("2024-01-01T00:00:{secs:02}Z")), "svc", message).with_source("a.log")
    }

    fn view_with(settings: Arc<dyn SettingsStore>) -> LogView {
        let mut view = LogView::new(LogStore::new(), settings);
        view.append(
            vec![entry(1, "boot"), entry(2, "ready"), entry(3, "request failed"), entry(4, "shutdown")],
            AppendOptions::default(),
        );
        view
    }

    #[test]
    fn test_visible_follows_filters() {
        let mut view = view_with(Arc::new(MemorySettings::default()));
        assert_eq!(view.visible(), &[0, 1, 2, 3]);

        view.set_standard_filters(StandardFilters {
            message: "boot | shutdown".into(),
            enabled: true,
            ..Default::default()
        });
        assert_eq!(view.visible(), &[0, 3]);

        view.set_standard_enabled(false);
        assert_eq!(view.visible(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_cache_refreshes_on_append() {
        let mut view = view_with(Arc::new(MemorySettings::default()));
        assert_eq!(view.visible().len(), 4);
        view.append(vec![entry(5, "late")], AppendOptions::default());
        assert_eq!(view.visible().len(), 5);
    }

    #[test]
    fn test_selection_survives_resorting_append() {
        let mut view = view_with(Arc::new(MemorySettings::default()));
        view.toggle(1, false, false);
        view.append(vec![entry(0, "earlier")], AppendOptions::default());

        let selected = view.selected_entries();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].message, "ready");
        assert!(view.selection().is_selected(2));
    }

    #[test]
    fn test_selection_follows_producer_appends_and_clears() {
        let mut view = view_with(Arc::new(MemorySettings::default()));
        let producer: Box<dyn IngestSink> = Box::new(view.store().clone());
        view.toggle(1, false, false);

        producer.append(vec![entry(0, "earlier")], AppendOptions::default());
        let selected: Vec<_> = view.selected_entries().iter().map(|e| e.message.clone()).collect();
        assert_eq!(selected, vec!["ready"]);
        assert_eq!(view.selection().anchor(), Some(2));

        producer.clear();
        producer.append(vec![entry(7, "x"), entry(8, "y")], AppendOptions::default());
        assert!(view.selected_entries().is_empty());
        assert!(view.selection().anchor().is_none());
        assert_eq!(view.move_by(1, false), Some(0));
    }

    #[test]
    fn test_mark_persists_and_navigates() {
        let settings = Arc::new(MemorySettings::default());
        let mut view = view_with(settings.clone());

        let sig = view.entries()[2].signature();
        assert!(view.set_mark(sig.clone(), Some("red".into())));
        assert_eq!(settings.get().unwrap().marks.get(&sig).map(String::as_str), Some("red"));

        assert_eq!(view.goto_marked(1), Some(2));
        view.set_only_marked(true);
        assert_eq!(view.visible(), &[2]);
        assert!(settings.get().unwrap().only_marked);
    }

    #[test]
    fn test_failed_save_keeps_mark_and_reports() {
        let mut view = view_with(Arc::new(BrokenSettings));
        let sig = view.entries()[0].signature();

        assert!(view.set_mark(sig, Some("blue".into())));
        assert_eq!(view.entries()[0].mark.as_deref(), Some("blue"));
        assert!(view.error_message().unwrap().contains("disk full"));

        view.dismiss_error();
        assert!(view.error_message().is_none());
    }

    #[test]
    fn test_load_restores_marks() {
        let mut saved = Settings::default();
        saved
            .marks
            .insert(Signature::from("2024-01-01T00:00:02Z|svc|ready"), "green".into());
        let mut view = LogView::load(Arc::new(MemorySettings::new(saved))).unwrap();

        view.append(vec![entry(1, "boot"), entry(2, "ready")], AppendOptions::default());
        assert_eq!(view.entries()[1].mark.as_deref(), Some("green"));
    }

    #[test]
    fn test_search_navigation_and_mdc_overview() {
        let mut view = LogView::new(LogStore::new(), Arc::new(MemorySettings::default()));
        view.append(
            vec![
                entry(1, "GET /a").with_mdc("traceId", "t1"),
                entry(2, "POST /b").with_mdc("trace_id", "t2"),
                entry(3, "GET /c").with_mdc("traceId", "t1"),
            ],
            AppendOptions::default(),
        );

        view.set_search("get");
        assert_eq!(view.goto_search_match(1), Some(0));
        assert_eq!(view.goto_search_match(1), Some(2));
        assert_eq!(view.goto_search_match(1), None);
        assert!(view.selection().is_selected(2));

        view.goto_start();
        view.move_by(1, true);
        view.move_by(1, true);
        let groups = view.selection_mdc();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].occurrences(), 3);

        groups[0].add_selected_values_to(view.dc_filter_mut(), &["t2"]);
        assert_eq!(view.visible(), &[1]);
    }

    #[test]
    fn test_mark_selected() {
        let mut view = view_with(Arc::new(MemorySettings::default()));
        view.toggle(0, false, false);
        view.toggle(1, false, true);
        assert_eq!(view.mark_selected(Some("yellow")), 2);
        assert_eq!(view.store().marks().len(), 2);
        assert_eq!(view.mark_selected(None), 2);
        assert!(view.store().marks().is_empty());
    }
}
