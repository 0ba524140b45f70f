//! Heuristic review-plan construction.
//!
//! Pattern-based classification of diff files into review steps:
//! - documentation, test, and config detection by extension/path/filename
//! - feature grouping by top path segment
//! - hunk-weight capping into a synthetic misc bucket
//! - fixed per-category templates for titles, objectives, and end state

use super::{Category, GroupContext};
use crate::diff::{DiffFileEntry, DiffIndex, FileStatus};
use crate::plan::{
    DiffRef, EndState, PrMetadata, PrOverview, Priority, ReviewPlan, ReviewStep,
    MAX_REVIEW_STEPS, REVIEW_PLAN_VERSION,
};
use anyhow::{Context, Result};

/// Groups that survive capping unchanged; the rest merge into misc.
const CAPPED_KEEP: usize = MAX_REVIEW_STEPS - 1;

/// Documentation file extensions.
const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "rst", "adoc", "txt"];

/// Case-insensitive substrings that mark a path as test-related.
const TEST_KEYWORDS: &[&str] = &["__tests__", "spec", "test", "fixture"];

/// Configuration file extensions.
const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "lock", "properties",
];

/// Well-known config filenames without a telling extension.
const CONFIG_FILENAMES: &[&str] = &[
    "dockerfile",
    "makefile",
    "justfile",
    ".gitignore",
    ".gitattributes",
    ".editorconfig",
    ".dockerignore",
    ".nvmrc",
    ".npmrc",
    ".prettierrc",
    ".eslintrc",
    ".babelrc",
];

/// Label used for feature files with no directory component.
const ROOT_SEGMENT: &str = "(root)";

/// Build a deterministic review plan from a diff index.
///
/// Identical input always yields an identical plan, down to the bytes of its
/// JSON rendering. The returned plan is self-validated; an error here is an
/// internal invariant failure, not a data problem.
pub fn build_review_plan(index: &DiffIndex, metadata: Option<&PrMetadata>) -> Result<ReviewPlan> {
    let files: Vec<&DiffFileEntry> = index.files.iter().filter(|f| !f.hunks.is_empty()).collect();
    if files.is_empty() {
        return Ok(empty_plan());
    }

    let groups = sort_groups(cap_groups(collect_groups(&files)));

    let steps: Vec<ReviewStep> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| synthesize_step(i, g))
        .collect();

    let plan = ReviewPlan {
        version: REVIEW_PLAN_VERSION,
        pr_overview: build_overview(metadata, &groups, files.len(), steps.len()),
        steps,
        end_state: build_end_state(&groups),
    };

    plan.validate(index)
        .context("heuristic review plan failed self-validation")?;
    Ok(plan)
}

/// Canonical plan for a diff with nothing to review.
fn empty_plan() -> ReviewPlan {
    ReviewPlan {
        version: REVIEW_PLAN_VERSION,
        pr_overview: PrOverview {
            title: "No diff content detected".to_string(),
            summary: "The supplied diff contained no reviewable hunks, so no walkthrough steps were produced.".to_string(),
        },
        steps: Vec::new(),
        end_state: EndState {
            acceptance_checks: vec![
                "Confirm the source diff was fetched correctly and is not empty.".to_string(),
            ],
            risk_calls: vec![
                "An empty diff may indicate an upstream fetch or parsing problem.".to_string(),
            ],
        },
    }
}

// ── Classification ──

/// Map a file to its grouping key. First match wins: docs, tests, config,
/// then feature by top path segment.
fn classify(file: &DiffFileEntry) -> (String, Category, Option<String>) {
    let path_lower = file.file_id.to_ascii_lowercase();

    if is_docs(file, &path_lower) {
        return ("docs".to_string(), Category::Docs, None);
    }
    if is_tests(&path_lower) {
        return ("tests".to_string(), Category::Tests, None);
    }
    if is_config(file, &path_lower) {
        return ("config".to_string(), Category::Config, None);
    }

    let segment = top_segment(&file.file_id);
    (
        format!("feature:{}", segment),
        Category::Feature,
        Some(segment),
    )
}

fn is_docs(file: &DiffFileEntry, path_lower: &str) -> bool {
    if let Some(language) = &file.language {
        if DOC_EXTENSIONS.contains(&language.as_str()) {
            return true;
        }
    }
    has_dir_segment(path_lower, "docs")
        || path_lower.contains("readme")
        || path_lower.contains("changelog")
}

fn is_tests(path_lower: &str) -> bool {
    TEST_KEYWORDS.iter().any(|k| path_lower.contains(k))
}

fn is_config(file: &DiffFileEntry, path_lower: &str) -> bool {
    if let Some(language) = &file.language {
        if CONFIG_EXTENSIONS.contains(&language.as_str()) {
            return true;
        }
    }
    let filename = path_lower.rsplit('/').next().unwrap_or(path_lower);
    CONFIG_FILENAMES.contains(&filename)
        || has_dir_segment(path_lower, "config")
        || path_lower.contains(".github/")
}

/// Whether `path` starts with `<segment>/` or contains `/<segment>/`.
fn has_dir_segment(path: &str, segment: &str) -> bool {
    path.starts_with(&format!("{}/", segment)) || path.contains(&format!("/{}/", segment))
}

/// First path segment, or the root sentinel for bare filenames.
fn top_segment(file_id: &str) -> String {
    match file_id.split_once('/') {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => ROOT_SEGMENT.to_string(),
    }
}

// ── Grouping, capping, sorting ──

/// Merge files into groups by key, preserving first-seen order both across
/// groups and within each group.
fn collect_groups(files: &[&DiffFileEntry]) -> Vec<GroupContext> {
    let mut groups: Vec<GroupContext> = Vec::new();
    for file in files {
        let (key, category, segment) = classify(file);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.files.push((*file).clone()),
            None => groups.push(GroupContext {
                key,
                category,
                segment,
                files: vec![(*file).clone()],
            }),
        }
    }
    groups
}

/// Enforce the step cap: when more than `MAX_REVIEW_STEPS` groups exist, the
/// five heaviest (by total hunk count) survive unchanged and everything else
/// merges into one synthetic misc group.
///
/// Hunk-count ties are broken by the same ordering the final sort uses
/// (category rank, then key) rather than relying on sort stability.
fn cap_groups(mut groups: Vec<GroupContext>) -> Vec<GroupContext> {
    if groups.len() <= MAX_REVIEW_STEPS {
        return groups;
    }

    groups.sort_by(|a, b| {
        b.hunk_count()
            .cmp(&a.hunk_count())
            .then_with(|| a.category.rank().cmp(&b.category.rank()))
            .then_with(|| a.key.cmp(&b.key))
    });

    let remainder = groups.split_off(CAPPED_KEEP);
    let mut misc_files = Vec::new();
    for group in remainder {
        misc_files.extend(group.files);
    }
    groups.push(GroupContext {
        key: "misc".to_string(),
        category: Category::Misc,
        segment: None,
        files: misc_files,
    });
    groups
}

/// Final step order: category rank, then file count descending, then key.
/// Applied after capping, so misc always sorts last by rank alone.
fn sort_groups(mut groups: Vec<GroupContext>) -> Vec<GroupContext> {
    groups.sort_by(|a, b| {
        a.category
            .rank()
            .cmp(&b.category.rank())
            .then_with(|| b.file_count().cmp(&a.file_count()))
            .then_with(|| a.key.cmp(&b.key))
    });
    groups
}

// ── Step synthesis ──

/// Render one group into a review step. Pure function of the group and its
/// final position; templates dispatch on the category variant.
fn synthesize_step(position: usize, group: &GroupContext) -> ReviewStep {
    let files_summary = summarize_files(&group.files);
    let status_summary = summarize_statuses(&group.files);

    let (title, description, objective, priority, notes, badges) = match group.category {
        Category::Docs => (
            "Review documentation".to_string(),
            format!("Documentation updates in {} ({}).", files_summary, status_summary),
            "Confirm the written guidance matches the current behavior of the code.".to_string(),
            Priority::Low,
            vec!["Check for stale references to renamed or removed code.".to_string()],
            vec!["docs".to_string()],
        ),
        Category::Tests => (
            "Review test changes".to_string(),
            format!("Test changes in {} ({}).", files_summary, status_summary),
            "Verify the tests encode the intended behavior and still fail when it breaks."
                .to_string(),
            Priority::Medium,
            vec!["Watch for assertions loosened to make a failing test pass.".to_string()],
            vec!["tests".to_string()],
        ),
        Category::Config => (
            "Review configuration".to_string(),
            format!("Configuration changes in {} ({}).", files_summary, status_summary),
            "Confirm configuration edits are intentional and consistent across environments."
                .to_string(),
            Priority::Medium,
            vec!["Map each configuration edit to a reason; they change behavior without touching code.".to_string()],
            vec!["config".to_string()],
        ),
        Category::Feature => {
            let label = humanize_segment(group.segment.as_deref());
            (
                format!("Review changes in {}", label),
                format!("Code changes in {} ({}).", files_summary, status_summary),
                format!("Understand what changed in {} and check for regressions.", label),
                Priority::High,
                vec!["Trace the changed code paths end to end before approving.".to_string()],
                vec!["feature".to_string()],
            )
        }
        Category::Misc => (
            "Review consolidated updates".to_string(),
            format!("Remaining changes in {} ({}).", files_summary, status_summary),
            "Skim the remaining files for anything unexpected.".to_string(),
            Priority::Medium,
            vec!["These files carried the least change weight; confirm nothing surprising hides here.".to_string()],
            vec!["misc".to_string()],
        ),
    };

    ReviewStep {
        step_id: format!("step-{}", position + 1),
        title,
        description,
        objective,
        priority,
        diff_refs: group
            .files
            .iter()
            .map(|f| DiffRef {
                file_id: f.file_id.clone(),
                hunk_ids: f.hunks.iter().map(|h| h.hunk_id.clone()).collect(),
            })
            .collect(),
        notes_suggested: notes,
        badges,
    }
}

/// "A", "A and B", or "A, B +N more".
fn summarize_files(files: &[DiffFileEntry]) -> String {
    match files {
        [one] => one.file_id.clone(),
        [first, second] => format!("{} and {}", first.file_id, second.file_id),
        [first, second, rest @ ..] => {
            format!("{}, {} +{} more", first.file_id, second.file_id, rest.len())
        }
        [] => String::new(),
    }
}

/// Unique status verbs in canonical order, joined human-readably.
fn summarize_statuses(files: &[DiffFileEntry]) -> String {
    let verbs: Vec<&str> = FileStatus::all()
        .iter()
        .filter(|status| files.iter().any(|f| f.status == **status))
        .map(|status| status.verb())
        .collect();
    join_human(&verbs)
}

/// "X", "X and Y", "X, Y and Z".
fn join_human(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => (*one).to_string(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

/// Reviewer-friendly label for a feature group's top path segment.
fn humanize_segment(segment: Option<&str>) -> String {
    match segment {
        None => "root files".to_string(),
        Some(ROOT_SEGMENT) => "root files".to_string(),
        Some("src") => "source code".to_string(),
        Some(other) => {
            let spaced = other.replace(['-', '_'], " ");
            let mut chars = spaced.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => "root files".to_string(),
            }
        }
    }
}

// ── Overview & end state ──

/// Insertion-ordered, duplicate-rejecting string accumulator. Output order
/// is part of the deterministic contract, so a hash set won't do.
#[derive(Debug, Default)]
struct OrderedSet(Vec<String>);

impl OrderedSet {
    fn insert(&mut self, value: &str) {
        if !self.0.iter().any(|v| v == value) {
            self.0.push(value.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}

fn build_overview(
    metadata: Option<&PrMetadata>,
    groups: &[GroupContext],
    file_count: usize,
    step_count: usize,
) -> PrOverview {
    let title = metadata
        .and_then(|m| m.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "Heuristic walkthrough across {} file{}",
                file_count,
                plural(file_count)
            )
        });

    let mut labels = OrderedSet::default();
    for group in groups {
        labels.insert(group.category.label());
    }
    let coverage = if labels.is_empty() {
        "general diff inspection".to_string()
    } else {
        labels.into_vec().join(", ")
    };

    let summary = format!(
        "This walkthrough has {} step{} covering {}. Work through the steps in order; later steps assume context from earlier ones.",
        step_count,
        plural(step_count),
        coverage
    );

    PrOverview { title, summary }
}

fn build_end_state(groups: &[GroupContext]) -> EndState {
    let mut checks = OrderedSet::default();
    let mut risks = OrderedSet::default();

    for group in groups {
        match group.category {
            Category::Docs => {
                checks.insert("Documentation reads accurately against the changed behavior.");
                risks.insert("Written guidance may lag behind the code it describes.");
            }
            Category::Tests => {
                checks.insert("Changed tests still assert the intended behavior.");
                risks.insert("Weakened or deleted assertions could hide regressions.");
            }
            Category::Config => {
                checks.insert("Configuration changes are consistent across environments.");
                risks.insert("A configuration edit can alter builds or deployments far from this diff.");
            }
            Category::Feature => {
                checks.insert("Code changes behave as described and handle their edge cases.");
                risks.insert("Behavioral regressions in the changed code paths.");
            }
            Category::Misc => {
                checks.insert("Consolidated low-weight files were skimmed for surprises.");
                risks.insert("Changes bundled into a catch-all step are easy to under-review.");
            }
        }
    }

    if checks.is_empty() {
        checks.insert("The full diff was walked end to end.");
    }
    if risks.is_empty() {
        risks.insert("No category-specific risks were identified; rely on general review judgment.");
    }

    EndState {
        acceptance_checks: checks.into_vec(),
        risk_calls: risks.into_vec(),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
