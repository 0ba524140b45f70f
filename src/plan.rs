//! Review-plan contract types and structural validation.
//!
//! These are the JSON boundary shapes consumed by rendering and produced by
//! both grouping strategies. A plan is immutable once produced; consumers
//! never mutate it in place.

use crate::diff::DiffIndex;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Format marker for the review plan JSON boundary shape.
pub const REVIEW_PLAN_VERSION: u32 = 1;

/// Hard cap on the number of steps in any plan.
pub const MAX_REVIEW_STEPS: usize = 6;

/// Reviewer-facing priority of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Optional PR metadata supplied by an external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A step's pointer into the diff index: one file plus the hunks it covers.
///
/// A reference with zero hunk ids is invalid and must not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRef {
    pub file_id: String,
    pub hunk_ids: Vec<String>,
}

/// One reviewer-facing unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStep {
    /// `step-<n>`, 1-based, assigned after final ordering.
    pub step_id: String,
    pub title: String,
    pub description: String,
    pub objective: String,
    pub priority: Priority,
    pub diff_refs: Vec<DiffRef>,
    #[serde(default)]
    pub notes_suggested: Vec<String>,
    #[serde(default)]
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrOverview {
    pub title: String,
    pub summary: String,
}

/// What "done" looks like for the whole review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndState {
    pub acceptance_checks: Vec<String>,
    pub risk_calls: Vec<String>,
}

/// An ordered, bounded walkthrough of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub version: u32,
    pub pr_overview: PrOverview,
    pub steps: Vec<ReviewStep>,
    pub end_state: EndState,
}

impl ReviewPlan {
    /// Check the structural invariants of a plan against the index that
    /// produced it. Violations in a heuristic plan are engine bugs; in a
    /// model plan they are schema mismatches handled by the adapter.
    pub fn validate(&self, index: &DiffIndex) -> Result<()> {
        if self.version != REVIEW_PLAN_VERSION {
            bail!(
                "unsupported review plan version {} (expected {})",
                self.version,
                REVIEW_PLAN_VERSION
            );
        }
        if self.steps.len() > MAX_REVIEW_STEPS {
            bail!(
                "plan has {} steps, exceeding the cap of {}",
                self.steps.len(),
                MAX_REVIEW_STEPS
            );
        }
        let index_has_hunks = index.files.iter().any(|f| !f.hunks.is_empty());
        if self.steps.is_empty() && index_has_hunks {
            bail!("plan has zero steps for a diff index with hunks");
        }
        if self.end_state.acceptance_checks.is_empty() {
            bail!("end state is missing acceptance checks");
        }
        if self.end_state.risk_calls.is_empty() {
            bail!("end state is missing risk calls");
        }

        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                bail!("a step has an empty step_id");
            }
            if step.diff_refs.is_empty() {
                bail!("step {} references no diff content", step.step_id);
            }
            for diff_ref in &step.diff_refs {
                if diff_ref.hunk_ids.is_empty() {
                    bail!(
                        "step {} has a reference to {} with zero hunk ids",
                        step.step_id,
                        diff_ref.file_id
                    );
                }
                if index.file(&diff_ref.file_id).is_none() {
                    bail!(
                        "step {} references unknown file {}",
                        step.step_id,
                        diff_ref.file_id
                    );
                }
                for hunk_id in &diff_ref.hunk_ids {
                    if !index.contains_hunk(&diff_ref.file_id, hunk_id) {
                        bail!(
                            "step {} references unknown hunk {} in {}",
                            step.step_id,
                            hunk_id,
                            diff_ref.file_id
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// JSON Schema for `ReviewPlan`, handed to the structured generation call.
///
/// Mirrors the boundary shape exactly; the adapter still re-validates the
/// parsed plan defensively.
pub fn review_plan_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "version": { "type": "integer", "const": 1 },
            "pr_overview": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "title": { "type": "string" },
                    "summary": { "type": "string" }
                },
                "required": ["title", "summary"]
            },
            "steps": {
                "type": "array",
                "maxItems": 6,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "step_id": { "type": "string" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "objective": { "type": "string" },
                        "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                        "diff_refs": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "additionalProperties": false,
                                "properties": {
                                    "file_id": { "type": "string" },
                                    "hunk_ids": {
                                        "type": "array",
                                        "minItems": 1,
                                        "items": { "type": "string" }
                                    }
                                },
                                "required": ["file_id", "hunk_ids"]
                            }
                        },
                        "notes_suggested": { "type": "array", "items": { "type": "string" } },
                        "badges": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": [
                        "step_id", "title", "description", "objective",
                        "priority", "diff_refs", "notes_suggested", "badges"
                    ]
                }
            },
            "end_state": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "acceptance_checks": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string" }
                    },
                    "risk_calls": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string" }
                    }
                },
                "required": ["acceptance_checks", "risk_calls"]
            }
        },
        "required": ["version", "pr_overview", "steps", "end_state"]
    })
}
