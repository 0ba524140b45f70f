//! Model-assisted review-plan construction.
//!
//! Builds a bounded prompt from the diff index plus a baseline heuristic
//! plan, invokes the structured-generation client, validates the result
//! against the plan contract, and retries only on schema-mismatch failures.

use super::client::{call_llm_structured, SchemaMismatch, StructuredResponse};
use super::models::Model;
use super::prompts::REVIEW_PLAN_SYSTEM;
use crate::config::Config;
use crate::diff::DiffIndex;
use crate::grouping::heuristics;
use crate::plan::{review_plan_schema, PrMetadata, ReviewPlan};
use crate::util::truncate;
use anyhow::Result;
use std::fmt::Write as _;

/// Attempt budget when neither the caller nor config supplies one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Prompt bounds: files and per-file hunks beyond these collapse into a
/// "+N more" note so the prompt stays a bounded size.
const PROMPT_MAX_FILES: usize = 40;
const PROMPT_MAX_HUNKS_PER_FILE: usize = 8;
const PROMPT_MAX_DESCRIPTION_CHARS: usize = 1500;

/// Build a review plan with the external model.
///
/// The baseline plan (computed heuristically when not supplied) grounds the
/// prompt; it is never returned as an implicit fallback for a failed model
/// call. For an index with zero files the baseline is returned directly and
/// no model call is made.
///
/// Schema-mismatch failures are retried up to the attempt budget; any other
/// error propagates immediately. When all attempts fail on schema errors,
/// the last such error propagates.
pub async fn build_model_review_plan(
    index: &DiffIndex,
    metadata: Option<&PrMetadata>,
    baseline: Option<ReviewPlan>,
    max_attempts: Option<u32>,
) -> Result<ReviewPlan> {
    let baseline = match baseline {
        Some(plan) => plan,
        None => heuristics::build_review_plan(index, metadata)?,
    };
    if index.files.is_empty() {
        return Ok(baseline);
    }

    let attempts = max_attempts
        .or_else(|| Config::load().grouping_max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS)
        .max(1);

    let user = build_grouping_prompt(index, metadata, &baseline);
    let schema = review_plan_schema();

    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        let result = call_llm_structured::<ReviewPlan>(
            REVIEW_PLAN_SYSTEM,
            &user,
            Model::Balanced,
            "review_plan",
            schema.clone(),
        )
        .await;

        match result {
            Ok(StructuredResponse { data: plan, .. }) => match validate_model_plan(&plan, index) {
                Ok(()) => return Ok(plan),
                Err(err) => {
                    eprintln!(
                        "  Model plan failed validation (attempt {}/{}): {}",
                        attempt, attempts, err
                    );
                    last_err = Some(err);
                }
            },
            Err(err) if is_schema_mismatch(&err) => {
                eprintln!(
                    "  Model produced no valid plan (attempt {}/{}): {}",
                    attempt, attempts, err
                );
                last_err = Some(err);
            }
            // Infrastructure failures (network, auth, provider) are not
            // retriable here; surface them on first occurrence.
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("model grouping produced no result")))
}

/// Whether an adapter error belongs to the retriable schema-mismatch class.
pub fn is_schema_mismatch(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SchemaMismatch>().is_some()
}

/// Defensive re-validation of a parsed model plan. A violation is a schema
/// mismatch, not an infrastructure failure, so it joins the retriable class.
fn validate_model_plan(plan: &ReviewPlan, index: &DiffIndex) -> Result<()> {
    plan.validate(index).map_err(|err| {
        anyhow::Error::new(SchemaMismatch(format!(
            "model plan failed contract validation: {}",
            err
        )))
    })
}

/// Render the bounded user prompt: PR metadata, capped diff summary, and the
/// baseline plan as compact grounding lines.
fn build_grouping_prompt(
    index: &DiffIndex,
    metadata: Option<&PrMetadata>,
    baseline: &ReviewPlan,
) -> String {
    let mut prompt = String::new();

    if let Some(meta) = metadata {
        if let Some(title) = meta.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let _ = writeln!(prompt, "PR TITLE: {}", title);
        }
        if let Some(description) = meta
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            let _ = writeln!(
                prompt,
                "PR DESCRIPTION: {}",
                truncate(description, PROMPT_MAX_DESCRIPTION_CHARS)
            );
        }
        if !prompt.is_empty() {
            prompt.push('\n');
        }
    }

    let _ = writeln!(prompt, "DIFF SUMMARY ({} files):", index.files.len());
    for file in index.files.iter().take(PROMPT_MAX_FILES) {
        let language = file.language.as_deref().unwrap_or("none");
        let _ = writeln!(
            prompt,
            "- {} [{}  lang: {}]",
            file.file_id,
            file.status.verb(),
            language
        );
        for hunk in file.hunks.iter().take(PROMPT_MAX_HUNKS_PER_FILE) {
            let _ = writeln!(prompt, "  {}  {}", hunk.hunk_id, hunk.header);
        }
        let hidden_hunks = file.hunks.len().saturating_sub(PROMPT_MAX_HUNKS_PER_FILE);
        if hidden_hunks > 0 {
            let _ = writeln!(prompt, "  (+{} more hunks omitted)", hidden_hunks);
        }
    }
    let hidden_files = index.files.len().saturating_sub(PROMPT_MAX_FILES);
    if hidden_files > 0 {
        let _ = writeln!(prompt, "(+{} more files omitted)", hidden_files);
    }

    let _ = writeln!(prompt, "\nBASELINE PLAN (heuristic, for grounding):");
    for step in &baseline.steps {
        let refs: Vec<String> = step
            .diff_refs
            .iter()
            .map(|r| {
                let hunks: Vec<&str> = r
                    .hunk_ids
                    .iter()
                    .map(|h| h.rsplit('#').next().unwrap_or(h))
                    .collect();
                format!("{}[{}]", r.file_id, hunks.join(","))
            })
            .collect();
        let _ = writeln!(
            prompt,
            "{} {} -> {}",
            step.step_id,
            step.title,
            refs.join("; ")
        );
    }

    prompt.push_str(
        "\nRegroup these changes into 2-6 review steps using only the identifiers above.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;

    fn sample_index(file_count: usize, hunks_per_file: usize) -> DiffIndex {
        let mut text = String::new();
        for i in 0..file_count {
            text.push_str(&format!(
                "diff --git a/pkg{i}/file.rs b/pkg{i}/file.rs\n--- a/pkg{i}/file.rs\n+++ b/pkg{i}/file.rs\n"
            ));
            for h in 0..hunks_per_file {
                text.push_str(&format!(
                    "@@ -{start},1 +{start},2 @@\n context\n+line\n",
                    start = h * 10 + 1
                ));
            }
        }
        diff::parse(&text)
    }

    #[tokio::test]
    async fn test_empty_index_returns_baseline_without_model_call() {
        let index = diff::parse("");
        let plan = build_model_review_plan(&index, None, None, None)
            .await
            .unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.pr_overview.title, "No diff content detected");
    }

    #[tokio::test]
    async fn test_supplied_baseline_is_returned_for_empty_index() {
        let index = diff::parse("");
        let mut baseline = heuristics::build_review_plan(&index, None).unwrap();
        baseline.pr_overview.title = "Custom baseline".to_string();
        let plan = build_model_review_plan(&index, None, Some(baseline), None)
            .await
            .unwrap();
        assert_eq!(plan.pr_overview.title, "Custom baseline");
    }

    #[test]
    fn test_prompt_is_bounded_and_notes_omissions() {
        let index = sample_index(45, 10);
        let baseline = heuristics::build_review_plan(&index, None).unwrap();
        let prompt = build_grouping_prompt(&index, None, &baseline);

        assert!(prompt.contains("DIFF SUMMARY (45 files):"));
        assert!(prompt.contains("(+5 more files omitted)"));
        assert!(prompt.contains("(+2 more hunks omitted)"));
        // Files beyond the cap never appear.
        assert!(!prompt.contains("pkg40/file.rs ["));
    }

    #[test]
    fn test_prompt_includes_metadata_and_baseline() {
        let index = sample_index(2, 1);
        let baseline = heuristics::build_review_plan(&index, None).unwrap();
        let metadata = PrMetadata {
            title: Some("Add frobnicator".to_string()),
            description: Some("Long story.".to_string()),
        };
        let prompt = build_grouping_prompt(&index, Some(&metadata), &baseline);

        assert!(prompt.contains("PR TITLE: Add frobnicator"));
        assert!(prompt.contains("PR DESCRIPTION: Long story."));
        assert!(prompt.contains("BASELINE PLAN"));
        assert!(prompt.contains("step-1"));
        assert!(prompt.contains("pkg0/file.rs[h0]"));
    }

    #[test]
    fn test_error_classifier() {
        let schema_err = anyhow::Error::new(SchemaMismatch("bad shape".to_string()));
        assert!(is_schema_mismatch(&schema_err));

        let infra_err = anyhow::anyhow!("connection refused");
        assert!(!is_schema_mismatch(&infra_err));
    }

    #[test]
    fn test_invalid_model_plan_classified_as_schema_mismatch() {
        let index = sample_index(1, 1);
        let mut plan = heuristics::build_review_plan(&index, None).unwrap();
        plan.steps[0].diff_refs[0].file_id = "invented/file.rs".to_string();
        let err = validate_model_plan(&plan, &index).unwrap_err();
        assert!(is_schema_mismatch(&err));
    }
}
