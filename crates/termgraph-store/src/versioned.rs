//! Branch-scoped version chains.
//!
//! Every component is stored as a chain of rows, each row recording the
//! branch path it was written on, the timepoint it became current (`start`)
//! and the timepoint it stopped being current on that path (`end`).
//! Deletions are tombstone rows that retain the last component body so
//! change-and-deletion scans can still surface the deleted component's
//! identifiers.
//!
//! Visibility is window arithmetic: a row is *in window* at a cutoff `c`
//! when `start <= c && (end is none || end > c)`. Resolution walks the
//! criteria levels nearest-branch-first and takes the first level holding an
//! in-window row; a tombstone there shadows anything further up the lineage.

use std::collections::HashMap;

use crate::branch::BranchPoint;
use crate::component::Component;
use crate::criteria::ChangeScope;

/// One version of a component, on one branch path.
#[derive(Debug, Clone)]
pub(crate) struct Row<T> {
    pub component: T,
    pub path: String,
    pub start: u64,
    pub end: Option<u64>,
    pub tombstone: bool,
}

impl<T> Row<T> {
    fn in_window(&self, cutoff: u64) -> bool {
        self.start <= cutoff && self.end.map_or(true, |end| end > cutoff)
    }
}

/// An uncommitted write buffered inside an open commit.
#[derive(Debug, Clone)]
pub(crate) struct Pending<T> {
    pub component: T,
    pub tombstone: bool,
}

/// Version chains for one component kind, keyed by the component key.
#[derive(Debug)]
pub(crate) struct VersionedCollection<T: Component> {
    rows: HashMap<T::Key, Vec<Row<T>>>,
}

impl<T: Component> Default for VersionedCollection<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T: Component> VersionedCollection<T> {
    /// Write a new current version on `path`, superseding the path's open
    /// row for the same key.
    pub fn write(&mut self, path: &str, timepoint: u64, component: T) {
        self.push_row(path, timepoint, component, false);
    }

    /// Record a deletion tombstone on `path`.
    pub fn delete(&mut self, path: &str, timepoint: u64, component: T) {
        self.push_row(path, timepoint, component, true);
    }

    fn push_row(&mut self, path: &str, timepoint: u64, component: T, tombstone: bool) {
        let chain = self.rows.entry(component.key()).or_default();
        for row in chain.iter_mut() {
            if row.path == path && row.end.is_none() {
                row.end = Some(timepoint);
            }
        }
        chain.push(Row {
            component,
            path: path.to_owned(),
            start: timepoint,
            end: None,
            tombstone,
        });
    }

    /// End every open row on `source_path` and re-publish it (tombstones
    /// included) on `target_path` at `timepoint`.
    pub fn promote_open_rows(&mut self, source_path: &str, target_path: &str, timepoint: u64) {
        for chain in self.rows.values_mut() {
            let mut moved: Vec<(T, bool)> = Vec::new();
            for row in chain.iter_mut() {
                if row.path == source_path && row.end.is_none() {
                    row.end = Some(timepoint);
                    moved.push((row.component.clone(), row.tombstone));
                }
            }
            for row in chain.iter_mut() {
                if !moved.is_empty() && row.path == target_path && row.end.is_none() {
                    row.end = Some(timepoint);
                }
            }
            for (component, tombstone) in moved {
                chain.push(Row {
                    component,
                    path: target_path.to_owned(),
                    start: timepoint,
                    end: None,
                    tombstone,
                });
            }
        }
    }

    /// Nearest in-window row for `key` across `levels`, tombstones included.
    fn resolve<'s>(&'s self, levels: &[BranchPoint], key: &T::Key) -> Option<&'s Row<T>> {
        let chain = self.rows.get(key)?;
        for level in levels {
            let hit = chain
                .iter()
                .filter(|row| row.path == level.path && row.in_window(level.timepoint))
                .max_by_key(|row| row.start);
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    /// The component's current version under the given criteria parts, or
    /// `None` when it is absent (never written, deleted, or outside the
    /// scope).
    pub fn current<'s>(
        &'s self,
        levels: &[BranchPoint],
        scope: ChangeScope,
        overlay: Option<&'s HashMap<T::Key, Pending<T>>>,
        key: &T::Key,
    ) -> Option<&'s T> {
        if let Some(pending) = overlay.and_then(|map| map.get(key)) {
            return yielded(&pending.component, pending.tombstone, scope);
        }
        let row = self.resolve(levels, key)?;
        yielded(&row.component, row.tombstone, scope)
    }

    /// Keys whose current version under the criteria satisfies `matches`.
    pub fn matching_keys<F>(
        &self,
        levels: &[BranchPoint],
        scope: ChangeScope,
        overlay: Option<&HashMap<T::Key, Pending<T>>>,
        matches: F,
    ) -> Vec<T::Key>
    where
        F: Fn(&T) -> bool,
    {
        let mut keys = Vec::new();
        for key in self.rows.keys() {
            if let Some(component) = self.current(levels, scope, overlay, key) {
                if matches(component) {
                    keys.push(key.clone());
                }
            }
        }
        if let Some(map) = overlay {
            for key in map.keys() {
                if self.rows.contains_key(key) {
                    continue;
                }
                if let Some(component) = self.current(levels, scope, overlay, key) {
                    if matches(component) {
                        keys.push(key.clone());
                    }
                }
            }
        }
        keys
    }
}

fn yielded<T>(component: &T, tombstone: bool, scope: ChangeScope) -> Option<&T> {
    match scope {
        ChangeScope::UnpromotedChangesAndDeletions => Some(component),
        ChangeScope::Visible | ChangeScope::UnpromotedChanges => {
            if tombstone {
                None
            } else {
                Some(component)
            }
        }
    }
}
