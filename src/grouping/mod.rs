//! Heuristic grouping of diff files into review steps.
//!
//! Rule-based (non-model) classification and merging. Everything here is
//! deterministic: identical input yields an identical plan.

pub mod heuristics;

use crate::diff::DiffFileEntry;
use serde::{Deserialize, Serialize};

/// Semantic bucket a diff file falls into, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Docs,
    Tests,
    Config,
    Feature,
    /// Synthetic bucket created when capping collapses low-weight groups.
    Misc,
}

impl Category {
    /// Fixed sort rank: docs first, misc always last.
    pub fn rank(&self) -> u8 {
        match self {
            Category::Docs => 0,
            Category::Tests => 1,
            Category::Config => 2,
            Category::Feature => 3,
            Category::Misc => 4,
        }
    }

    /// Human-readable label used in overview summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Docs => "documentation",
            Category::Tests => "tests",
            Category::Config => "configuration",
            Category::Feature => "code",
            Category::Misc => "mixed updates",
        }
    }
}

/// Accumulated grouping state for one key.
///
/// Created per-file during classification, merged by key, then capped and
/// sorted; discarded after step synthesis.
#[derive(Debug, Clone)]
pub struct GroupContext {
    /// `docs`, `tests`, `config`, `feature:<segment>`, or `misc`.
    pub key: String,
    pub category: Category,
    /// Top path segment, present only for feature groups.
    pub segment: Option<String>,
    /// First-seen order is preserved through merging.
    pub files: Vec<DiffFileEntry>,
}

impl GroupContext {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total hunks across the group, the weight used when capping.
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }
}
