use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use loglens_types::{LogEntry, Signature};

use crate::ArcLogEntry;

/// Signature to color map, the source of truth for highlights.
///
/// Entries carry a denormalized copy of their mark so filters don't need the
/// map; [`MarkManager::sync_entries`] keeps the copies in line.
#[derive(Clone, Debug, Default)]
pub struct MarkManager {
    marks: HashMap<Signature, String>,
    custom_colors: Vec<String>,
}

impl MarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted state
    pub fn from_parts(marks: BTreeMap<Signature, String>, custom_colors: Vec<String>) -> Self {
        let mut manager = Self {
            marks: marks.into_iter().collect(),
            custom_colors: Vec::new(),
        };
        for color in custom_colors {
            manager.add_custom_color(&color);
        }
        manager
    }

    /// Set or remove (`None`) the mark for a signature. Returns whether the map changed.
    pub fn set_mark(&mut self, signature: Signature, color: Option<String>) -> bool {
        match color {
            Some(color) => self.marks.insert(signature, color.clone()).as_ref() != Some(&color),
            None => self.marks.remove(&signature).is_some(),
        }
    }

    pub fn color_for(&self, signature: &Signature) -> Option<&str> {
        self.marks.get(signature).map(String::as_str)
    }

    /// Write the mapped color (or none) onto a fresh entry
    pub fn apply(&self, entry: &mut LogEntry) {
        entry.mark = self.color_for(&entry.signature()).map(str::to_string);
    }

    /// Bring every entry's mark in line with the map.
    ///
    /// Unaffected entries come back as the same `Arc`; only changed ones are copied.
    pub fn sync_entries(&self, entries: &[ArcLogEntry]) -> Vec<ArcLogEntry> {
        entries
            .iter()
            .map(|entry| {
                let wanted = self.color_for(&entry.signature());
                if entry.mark.as_deref() == wanted {
                    Arc::clone(entry)
                } else {
                    let mut updated = LogEntry::clone(entry);
                    updated.mark = wanted.map(str::to_string);
                    Arc::new(updated)
                }
            })
            .collect()
    }

    /// Sorted snapshot for persistence
    pub fn marks(&self) -> BTreeMap<Signature, String> {
        self.marks
            .iter()
            .map(|(sig, color)| (sig.clone(), color.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn custom_colors(&self) -> &[String] {
        &self.custom_colors
    }

    /// Add a color to the palette, ignoring duplicates (case-insensitive)
    pub fn add_custom_color(&mut self, color: &str) -> bool {
        let color = color.trim();
        if color.is_empty()
            || self
                .custom_colors
                .iter()
                .any(|c| c.eq_ignore_ascii_case(color))
        {
            return false;
        }
        self.custom_colors.push(color.to_string());
        true
    }

    pub fn remove_custom_color(&mut self, color: &str) -> bool {
        let before = self.custom_colors.len();
        self.custom_colors.retain(|c| !c.eq_ignore_ascii_case(color.trim()));
        self.custom_colors.len() != before
    }
}
