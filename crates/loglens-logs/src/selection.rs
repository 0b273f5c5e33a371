//! Selection and keyboard navigation over the filtered view.
//!
//! Selected rows are stored as global positions in the store. Navigation
//! works in view positions (indices into the visible list) and translates
//! back. `visible` is always the ascending output of the filter pipeline.

use std::collections::{BTreeSet, HashMap};

use crate::ArcLogEntry;
use crate::filter::SearchText;

/// Multi-row selection with an anchor for range extension
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<usize>,
    /// Origin of range extension
    anchor: Option<usize>,
    /// Last navigated row; the moving end of an extended range
    focus: Option<usize>,
}

fn view_position(visible: &[usize], global: usize) -> Option<usize> {
    visible.binary_search(&global).ok()
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn is_selected(&self, global: usize) -> bool {
        self.selected.contains(&global)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Click-style selection.
    ///
    /// No modifier replaces the selection; `additive` flips `global` in or out;
    /// `extend` selects the visible run between the anchor and `global`,
    /// falling back to a single row when either end is not visible.
    pub fn toggle(&mut self, global: usize, extend: bool, additive: bool, visible: &[usize]) {
        if extend {
            if self.extend_to(global, visible) {
                return;
            }
            self.select_only(global);
        } else if additive {
            if !self.selected.remove(&global) {
                self.selected.insert(global);
            }
            self.anchor = Some(global);
            self.focus = Some(global);
        } else {
            self.select_only(global);
        }
    }

    /// Move one row up (`direction < 0`) or down, optionally extending.
    /// Returns the newly focused global position.
    pub fn move_by(&mut self, direction: isize, extend: bool, visible: &[usize]) -> Option<usize> {
        if visible.is_empty() || direction == 0 {
            return None;
        }
        let last = visible.len() - 1;

        let target = match self.focus {
            None if direction > 0 => 0,
            None => last,
            Some(focus) => match visible.binary_search(&focus) {
                Ok(current) => current.saturating_add_signed(direction.signum()).min(last),
                // Focused row is filtered out: step to its neighbour in the view
                Err(insert_at) if direction > 0 => insert_at.min(last),
                Err(insert_at) => insert_at.saturating_sub(1),
            },
        };

        let global = visible[target];
        if !(extend && self.extend_to(global, visible)) {
            self.select_only(global);
        }
        Some(global)
    }

    pub fn goto_start(&mut self, visible: &[usize]) -> Option<usize> {
        let global = *visible.first()?;
        self.select_only(global);
        Some(global)
    }

    pub fn goto_end(&mut self, visible: &[usize]) -> Option<usize> {
        let global = *visible.last()?;
        self.select_only(global);
        Some(global)
    }

    /// Jump to the next/previous marked row. `marked` holds view positions.
    pub fn goto_marked(&mut self, direction: isize, marked: &[usize], visible: &[usize]) -> Option<usize> {
        self.goto_candidate(direction, marked, visible)
    }

    /// Jump to the next/previous search match. `matches` holds view positions.
    pub fn goto_search_match(
        &mut self,
        direction: isize,
        matches: &[usize],
        visible: &[usize],
    ) -> Option<usize> {
        self.goto_candidate(direction, matches, visible)
    }

    /// Keep the selection on the same entries after the store re-sorted
    pub fn remap(&mut self, old: &[ArcLogEntry], new: &[ArcLogEntry]) {
        if self.selected.is_empty() && self.anchor.is_none() && self.focus.is_none() {
            return;
        }
        let by_id: HashMap<u64, usize> = new.iter().enumerate().map(|(pos, e)| (e.id, pos)).collect();
        let translate = |pos: usize| old.get(pos).and_then(|e| by_id.get(&e.id).copied());

        self.selected = self.selected.iter().filter_map(|&pos| translate(pos)).collect();
        self.anchor = self.anchor.and_then(translate);
        self.focus = self.focus.and_then(translate);
    }

    /// Drop selected rows that are no longer visible
    pub fn retain_visible(&mut self, visible: &[usize]) {
        self.selected.retain(|&pos| view_position(visible, pos).is_some());
    }

    fn select_only(&mut self, global: usize) {
        self.selected.clear();
        self.selected.insert(global);
        self.anchor = Some(global);
        self.focus = Some(global);
    }

    /// Select the visible run between anchor and `global`, keeping the anchor
    fn extend_to(&mut self, global: usize, visible: &[usize]) -> bool {
        let Some(anchor) = self.anchor else {
            return false;
        };
        let (Some(from), Some(to)) = (view_position(visible, anchor), view_position(visible, global)) else {
            return false;
        };

        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        self.selected = visible[lo..=hi].iter().copied().collect();
        self.focus = Some(global);
        true
    }

    /// Step to the nearest candidate strictly past the focus. Nothing moves
    /// when the focus is already on or beyond the last candidate that way.
    fn goto_candidate(&mut self, direction: isize, candidates: &[usize], visible: &[usize]) -> Option<usize> {
        let (&first, &last) = (candidates.first()?, candidates.last()?);
        if direction == 0 {
            return None;
        }

        let current = self.focus.map(|focus| visible.binary_search(&focus));
        let target = match (current, direction > 0) {
            (None, true) => first,
            (None, false) => last,
            (Some(Ok(at)), true) => candidates.iter().copied().find(|&c| c > at)?,
            (Some(Err(insert_at)), true) => candidates.iter().copied().find(|&c| c >= insert_at)?,
            (Some(Ok(at) | Err(at)), false) => candidates.iter().rev().copied().find(|&c| c < at)?,
        };

        let global = *visible.get(target)?;
        self.select_only(global);
        Some(global)
    }
}

/// View positions of marked entries
pub fn marked_positions(entries: &[ArcLogEntry], visible: &[usize]) -> Vec<usize> {
    visible
        .iter()
        .enumerate()
        .filter(|&(_, &global)| entries.get(global).is_some_and(|e| e.mark.is_some()))
        .map(|(view, _)| view)
        .collect()
}

/// View positions of entries matching the search text
pub fn search_match_positions(entries: &[ArcLogEntry], visible: &[usize], search: &SearchText) -> Vec<usize> {
    if search.is_empty() {
        return Vec::new();
    }
    visible
        .iter()
        .enumerate()
        .filter(|&(_, &global)| entries.get(global).is_some_and(|e| search.matches(e)))
        .map(|(view, _)| view)
        .collect()
}
