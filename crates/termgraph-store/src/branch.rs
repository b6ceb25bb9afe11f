//! Branches, branch paths and branch metadata.
//!
//! A branch is a named mutable view of the graph. Paths are slash-delimited
//! and form a tree rooted at [`ROOT_PATH`]; the parent relationship is
//! derived purely from the path. Every branch carries the timepoint pair
//! that drives visibility (`base`, the parent state it last captured, and
//! `head`, its own latest commit) and a nested string-valued metadata map.
//!
//! The only metadata key this workspace itself maintains is
//! `internal.integrityIssue`, written through the typed helpers below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the root branch.
pub const ROOT_PATH: &str = "MAIN";

/// Metadata submap that holds machine-managed flags.
pub const INTERNAL_METADATA_KEY: &str = "internal";

/// Parent of a slash-delimited branch path, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BranchError {
    #[error("branch not found: {0}")]
    NotFound(String),
    #[error("branch already exists: {0}")]
    AlreadyExists(String),
    #[error("branch {0} has no parent")]
    NoParent(String),
}

// ============================================================================
// Metadata
// ============================================================================

/// A metadata value: either a string or a nested map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

/// The mutable, nested metadata map attached to a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchMetadata {
    entries: BTreeMap<String, MetadataValue>,
}

impl BranchMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), MetadataValue::String(value.into()));
    }

    /// Read a string value from the `internal` submap.
    pub fn internal_value(&self, key: &str) -> Option<&str> {
        match self.entries.get(INTERNAL_METADATA_KEY)? {
            MetadataValue::Map(internal) => match internal.get(key)? {
                MetadataValue::String(value) => Some(value),
                MetadataValue::Map(_) => None,
            },
            MetadataValue::String(_) => None,
        }
    }

    /// Write a string value into the `internal` submap, creating it if
    /// needed.
    pub fn set_internal(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let internal = self
            .entries
            .entry(INTERNAL_METADATA_KEY.to_owned())
            .or_insert_with(|| MetadataValue::Map(BTreeMap::new()));
        if let MetadataValue::Map(map) = internal {
            map.insert(key.into(), MetadataValue::String(value.into()));
        }
    }

    /// Remove a key from the `internal` submap, returning the removed string
    /// value if there was one.
    pub fn remove_internal(&mut self, key: &str) -> Option<String> {
        match self.entries.get_mut(INTERNAL_METADATA_KEY)? {
            MetadataValue::Map(map) => match map.remove(key)? {
                MetadataValue::String(value) => Some(value),
                MetadataValue::Map(_) => None,
            },
            MetadataValue::String(_) => None,
        }
    }
}

// ============================================================================
// Branch
// ============================================================================

/// A point on a branch: the path together with a visibility cutoff
/// timepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPoint {
    pub path: String,
    pub timepoint: u64,
}

/// A branch value as returned by the store's registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub path: String,
    /// Timepoint of the parent state this branch last captured (creation,
    /// rebase or promotion).
    pub base_timestamp: u64,
    /// Timepoint of the branch's own latest commit.
    pub head_timestamp: u64,
    pub metadata: BranchMetadata,
    /// Ancestor visibility snapshot, nearest ancestor first. Captured when
    /// the branch is created or rebased so that later movement of an
    /// ancestor cannot leak into this branch's view.
    pub(crate) ancestor_levels: Vec<BranchPoint>,
}

impl Branch {
    pub(crate) fn root(timepoint: u64) -> Self {
        Self {
            path: ROOT_PATH.to_owned(),
            base_timestamp: timepoint,
            head_timestamp: timepoint,
            metadata: BranchMetadata::new(),
            ancestor_levels: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }

    pub fn parent_path(&self) -> Option<&str> {
        parent_path(&self.path)
    }
}
