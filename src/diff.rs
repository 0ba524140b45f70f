//! Unified diff parsing into a stable, normalized index.
//!
//! The parser is deliberately lenient: malformed or unrecognized constructs
//! are skipped, never raised. The output `DiffIndex` is the only artifact
//! that flows between parsing and the grouping strategies.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Format marker for the diff index JSON boundary shape.
pub const DIFF_INDEX_VERSION: u32 = 1;

const NULL_DEVICE: &str = "/dev/null";

/// How a file changed within the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
}

impl FileStatus {
    /// Past-tense verb used when describing the change to a reviewer.
    pub fn verb(&self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Deleted => "removed",
            FileStatus::Modified => "updated",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
        }
    }

    /// All statuses in canonical order (used for deterministic summaries).
    pub fn all() -> &'static [FileStatus] {
        &[
            FileStatus::Added,
            FileStatus::Deleted,
            FileStatus::Modified,
            FileStatus::Renamed,
            FileStatus::Copied,
        ]
    }
}

/// A contiguous block of changed lines, anchored by old/new start lines.
///
/// Immutable once parsed. Hunk ids are `<file_id>#h<n>`, zero-based in
/// encounter order, and stable for identical input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub hunk_id: String,
    pub old_start: u32,
    pub new_start: u32,
    /// Verbatim `@@ ... @@` header line.
    pub header: String,
}

/// One file's worth of parsed diff content.
///
/// Files with zero hunks or detected as binary never become entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFileEntry {
    /// Current path; for deletions, the path before deletion. Never empty.
    pub file_id: String,
    pub status: FileStatus,
    /// Lowercased extension of the final path segment, when present.
    pub language: Option<String>,
    pub hunks: Vec<DiffHunk>,
}

/// The normalized, stable-identifier representation of a diff.
///
/// File order is first-appearance order in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffIndex {
    pub diff_index_version: u32,
    pub files: Vec<DiffFileEntry>,
}

impl DiffIndex {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total hunk count across all files.
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }

    pub fn file(&self, file_id: &str) -> Option<&DiffFileEntry> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    /// Whether the given file/hunk pair exists in this index.
    pub fn contains_hunk(&self, file_id: &str, hunk_id: &str) -> bool {
        self.file(file_id)
            .is_some_and(|f| f.hunks.iter().any(|h| h.hunk_id == hunk_id))
    }
}

/// Parse raw unified diff text into a `DiffIndex`.
///
/// Never fails: unparseable constructs are skipped and the symptom is an
/// absent file or hunk, not an error. Accepts `\r\n` input.
pub fn parse(diff_text: &str) -> DiffIndex {
    let text = diff_text.replace("\r\n", "\n");

    let mut files: Vec<DiffFileEntry> = Vec::new();
    let mut current: Option<FileAccumulator> = None;

    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut current, &mut files);
            // An unparseable marker starts no accumulator; lines that follow
            // are ignored until the next marker.
            current = FileAccumulator::from_marker(rest);
            continue;
        }

        let Some(acc) = current.as_mut() else {
            continue;
        };
        if acc.binary {
            continue;
        }
        acc.scan_line(line);
    }
    flush(&mut current, &mut files);

    DiffIndex {
        diff_index_version: DIFF_INDEX_VERSION,
        files,
    }
}

fn flush(current: &mut Option<FileAccumulator>, files: &mut Vec<DiffFileEntry>) {
    if let Some(entry) = current.take().and_then(FileAccumulator::finalize) {
        files.push(entry);
    }
}

/// Per-file parse state, threaded through the line fold one at a time and
/// flushed on each new `diff --git` marker and at end of input.
#[derive(Debug, Default)]
struct FileAccumulator {
    old_path: Option<String>,
    new_path: Option<String>,
    /// Set when rename/copy metadata supplied the path; `---`/`+++` lines
    /// must not override it.
    old_path_fixed: bool,
    new_path_fixed: bool,
    status: Option<FileStatus>,
    binary: bool,
    /// (old_start, new_start, verbatim header), encounter order.
    hunks: Vec<(u32, u32, String)>,
}

impl FileAccumulator {
    fn from_marker(rest: &str) -> Option<Self> {
        let (old_raw, new_raw) = split_marker_paths(rest)?;
        Some(FileAccumulator {
            old_path: normalize_marker_path(&old_raw, "a/"),
            new_path: normalize_marker_path(&new_raw, "b/"),
            ..FileAccumulator::default()
        })
    }

    fn scan_line(&mut self, line: &str) {
        if line.starts_with("Binary files ") || line == "GIT binary patch" {
            self.binary = true;
            return;
        }

        if let Some((old_start, new_start)) = parse_hunk_header(line) {
            self.hunks.push((old_start, new_start, line.to_string()));
            return;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            let path = clean_file_marker_path(rest, "a/");
            if path.is_none() && self.status.is_none() {
                self.status = Some(FileStatus::Added);
            }
            if !self.old_path_fixed {
                self.old_path = path;
            }
            return;
        }
        if let Some(rest) = line.strip_prefix("+++ ") {
            let path = clean_file_marker_path(rest, "b/");
            if path.is_none() && self.status.is_none() {
                self.status = Some(FileStatus::Deleted);
            }
            if !self.new_path_fixed {
                self.new_path = path;
            }
            return;
        }

        if line.starts_with("new file mode") {
            self.status = Some(FileStatus::Added);
        } else if line.starts_with("deleted file mode") {
            self.status = Some(FileStatus::Deleted);
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            self.status = Some(FileStatus::Renamed);
            self.old_path = clean_metadata_path(rest);
            self.old_path_fixed = true;
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            self.status = Some(FileStatus::Renamed);
            self.new_path = clean_metadata_path(rest);
            self.new_path_fixed = true;
        } else if let Some(rest) = line.strip_prefix("copy from ") {
            self.status = Some(FileStatus::Copied);
            self.old_path = clean_metadata_path(rest);
            self.old_path_fixed = true;
        } else if let Some(rest) = line.strip_prefix("copy to ") {
            self.status = Some(FileStatus::Copied);
            self.new_path = clean_metadata_path(rest);
            self.new_path_fixed = true;
        }
        // Everything else (content lines, index lines, mode lines, "\ No
        // newline at end of file") is intentionally skipped.
    }

    fn finalize(self) -> Option<DiffFileEntry> {
        if self.binary || self.hunks.is_empty() {
            return None;
        }

        let status = self.status.unwrap_or(FileStatus::Modified);
        let file_id = match status {
            FileStatus::Deleted => self.old_path.or(self.new_path),
            _ => self.new_path.or(self.old_path),
        }
        .filter(|p| !p.is_empty())?;

        let language = detect_language(&file_id);
        let hunks = self
            .hunks
            .into_iter()
            .enumerate()
            .map(|(i, (old_start, new_start, header))| DiffHunk {
                hunk_id: format!("{}#h{}", file_id, i),
                old_start,
                new_start,
                header,
            })
            .collect();

        Some(DiffFileEntry {
            file_id,
            status,
            language,
            hunks,
        })
    }
}

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,\d+)? \+(\d+)(?:,\d+)? @@").expect("hunk header regex")
    })
}

/// Parse `@@ -<old>[,len] +<new>[,len] @@ ...` into start lines.
fn parse_hunk_header(line: &str) -> Option<(u32, u32)> {
    let caps = hunk_header_re().captures(line)?;
    let old_start = caps.get(1)?.as_str().parse().ok()?;
    let new_start = caps.get(2)?.as_str().parse().ok()?;
    Some((old_start, new_start))
}

/// Split the remainder of a `diff --git ` line into two raw paths.
///
/// Handles bare (`a/path b/path`) and quoted (`"a/with space"`) forms. Bare
/// paths containing spaces are ambiguous; we split at the last ` b/`
/// occurrence as a best effort, and otherwise decline the marker.
fn split_marker_paths(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    let (first, remainder) = if rest.starts_with('"') {
        take_quoted(rest)?
    } else if let Some(idx) = rest.find(" \"") {
        (rest[..idx].to_string(), &rest[idx + 1..])
    } else if let Some(idx) = rest.rfind(" b/") {
        (rest[..idx].to_string(), &rest[idx + 1..])
    } else {
        let idx = rest.find(' ')?;
        (rest[..idx].to_string(), &rest[idx + 1..])
    };

    let remainder = remainder.trim_start();
    let second = if remainder.starts_with('"') {
        take_quoted(remainder)?.0
    } else {
        remainder.to_string()
    };

    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first, second))
}

/// Read a leading `"..."` string (backslash escapes), returning the unquoted
/// content and the rest of the line.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '"' {
        return None;
    }

    let mut out = String::new();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Some((out, &s[idx + ch.len_utf8()..])),
            _ => out.push(ch),
        }
    }
    None // unterminated quote
}

/// Strip the `a/`/`b/` prefix and map the null device to an absent path.
fn normalize_marker_path(raw: &str, prefix: &str) -> Option<String> {
    if raw == NULL_DEVICE {
        return None;
    }
    let path = raw.strip_prefix(prefix).unwrap_or(raw);
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Clean a `--- `/`+++ ` marker path: unquote, drop a timestamp suffix after
/// a tab, strip the side prefix, and map the null device to absent.
fn clean_file_marker_path(rest: &str, prefix: &str) -> Option<String> {
    let raw = if rest.starts_with('"') {
        take_quoted(rest)?.0
    } else {
        let trimmed = rest.trim();
        match trimmed.find('\t') {
            Some(tab) => trimmed[..tab].to_string(),
            None => trimmed.to_string(),
        }
    };
    normalize_marker_path(&raw, prefix)
}

/// Clean a rename/copy metadata path (no side prefix in git output).
fn clean_metadata_path(rest: &str) -> Option<String> {
    let raw = if rest.starts_with('"') {
        take_quoted(rest)?.0
    } else {
        rest.trim().to_string()
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Lowercased extension of the final path segment.
///
/// Absent when there is no dot, the dot leads the segment, or the dot ends it.
fn detect_language(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot == name.len() - 1 {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_added_file() {
        let diff = r#"diff --git a/src/hello.ts b/src/hello.ts
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/src/hello.ts
@@ -0,0 +1,3 @@
+export function hello() {
+  return "hello";
+}
"#;
        let index = parse(diff);
        assert_eq!(index.diff_index_version, 1);
        assert_eq!(index.files.len(), 1);

        let file = &index.files[0];
        assert_eq!(file.file_id, "src/hello.ts");
        assert_eq!(file.status, FileStatus::Added);
        assert_eq!(file.language.as_deref(), Some("ts"));
        assert_eq!(file.hunks.len(), 1);
        assert_eq!(file.hunks[0].hunk_id, "src/hello.ts#h0");
        assert_eq!(file.hunks[0].old_start, 0);
        assert_eq!(file.hunks[0].new_start, 1);
        assert_eq!(file.hunks[0].header, "@@ -0,0 +1,3 @@");
    }

    #[test]
    fn test_hunk_ids_are_stable_and_zero_based() {
        let diff = r#"diff --git a/lib/core.rs b/lib/core.rs
index 1111111..2222222 100644
--- a/lib/core.rs
+++ b/lib/core.rs
@@ -10,4 +10,5 @@ fn first() {
 context
+added
@@ -40,3 +41,3 @@ fn second() {
-removed
+replaced
@@ -90,2 +91,2 @@
 more
"#;
        let index = parse(diff);
        let file = &index.files[0];
        assert_eq!(file.status, FileStatus::Modified);
        let ids: Vec<&str> = file.hunks.iter().map(|h| h.hunk_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["lib/core.rs#h0", "lib/core.rs#h1", "lib/core.rs#h2"]
        );
        assert_eq!(file.hunks[1].old_start, 40);
        assert_eq!(file.hunks[1].new_start, 41);
        assert_eq!(file.hunks[2].header, "@@ -90,2 +91,2 @@");
    }

    #[test]
    fn test_binary_file_is_excluded() {
        let diff = r#"diff --git a/assets/logo.png b/assets/logo.png
index 1111111..2222222 100644
Binary files a/assets/logo.png and b/assets/logo.png differ
diff --git a/src/kept.rs b/src/kept.rs
--- a/src/kept.rs
+++ b/src/kept.rs
@@ -1,2 +1,2 @@
-old
+new
"#;
        let index = parse(diff);
        assert_eq!(index.files.len(), 1);
        assert_eq!(index.files[0].file_id, "src/kept.rs");
    }

    #[test]
    fn test_binary_marker_discards_earlier_hunks() {
        let diff = r#"diff --git a/blob.bin b/blob.bin
--- a/blob.bin
+++ b/blob.bin
@@ -1,2 +1,2 @@
 looks-like-content
Binary files a/blob.bin and b/blob.bin differ
"#;
        let index = parse(diff);
        assert!(index.files.is_empty());
    }

    #[test]
    fn test_no_hunk_diff_produces_no_entry() {
        // Pure rename, no content change: no @@ line anywhere.
        let diff = r#"diff --git a/old/name.ts b/new/name.ts
similarity index 100%
rename from old/name.ts
rename to new/name.ts
"#;
        let index = parse(diff);
        assert!(index.files.is_empty());
    }

    #[test]
    fn test_rename_with_content_resolves_new_path() {
        let diff = r#"diff --git a/old/name.ts b/new/name.ts
similarity index 90%
rename from old/name.ts
rename to new/name.ts
@@ -3,2 +3,2 @@
-before
+after
"#;
        let index = parse(diff);
        let file = &index.files[0];
        assert_eq!(file.file_id, "new/name.ts");
        assert_eq!(file.status, FileStatus::Renamed);
        assert_eq!(file.hunks[0].hunk_id, "new/name.ts#h0");
    }

    #[test]
    fn test_rename_metadata_wins_over_file_markers() {
        let diff = r#"diff --git a/old/name.ts b/new/name.ts
rename from old/name.ts
rename to new/name.ts
--- a/other/path.ts
+++ b/other/path.ts
@@ -1,1 +1,1 @@
-x
+y
"#;
        let index = parse(diff);
        assert_eq!(index.files[0].file_id, "new/name.ts");
    }

    #[test]
    fn test_deleted_file_keeps_old_path() {
        let diff = r#"diff --git a/gone/file.py b/gone/file.py
deleted file mode 100644
--- a/gone/file.py
+++ /dev/null
@@ -1,3 +0,0 @@
-a
-b
-c
"#;
        let index = parse(diff);
        let file = &index.files[0];
        assert_eq!(file.file_id, "gone/file.py");
        assert_eq!(file.status, FileStatus::Deleted);
        assert_eq!(file.language.as_deref(), Some("py"));
    }

    #[test]
    fn test_quoted_paths_with_spaces() {
        let diff = "diff --git \"a/my docs/read me.md\" \"b/my docs/read me.md\"\n--- \"a/my docs/read me.md\"\n+++ \"b/my docs/read me.md\"\n@@ -1,1 +1,2 @@\n context\n+added\n";
        let index = parse(diff);
        let file = &index.files[0];
        assert_eq!(file.file_id, "my docs/read me.md");
        assert_eq!(file.language.as_deref(), Some("md"));
        assert_eq!(file.hunks[0].hunk_id, "my docs/read me.md#h0");
    }

    #[test]
    fn test_crlf_input_is_normalized() {
        let diff = "diff --git a/a.txt b/a.txt\r\n--- a/a.txt\r\n+++ b/a.txt\r\n@@ -1,1 +1,1 @@\r\n-x\r\n+y\r\n";
        let index = parse(diff);
        assert_eq!(index.files.len(), 1);
        assert_eq!(index.files[0].hunks[0].header, "@@ -1,1 +1,1 @@");
    }

    #[test]
    fn test_unparseable_marker_skips_block() {
        let diff = r#"diff --git nonsense
@@ -1,1 +1,1 @@
-x
+y
diff --git a/ok.rs b/ok.rs
--- a/ok.rs
+++ b/ok.rs
@@ -1,1 +1,1 @@
-x
+y
"#;
        let index = parse(diff);
        assert_eq!(index.files.len(), 1);
        assert_eq!(index.files[0].file_id, "ok.rs");
    }

    #[test]
    fn test_hunk_lines_before_any_marker_are_ignored() {
        let diff = "@@ -1,1 +1,1 @@\n-x\n+y\n";
        let index = parse(diff);
        assert!(index.files.is_empty());
    }

    #[test]
    fn test_marker_timestamp_suffix_is_dropped() {
        let diff = "diff --git a/a.c b/a.c\n--- a/a.c\t2024-01-01 00:00:00\n+++ b/a.c\t2024-01-02 00:00:00\n@@ -1,1 +1,1 @@\n-x\n+y\n";
        let index = parse(diff);
        assert_eq!(index.files[0].file_id, "a.c");
    }

    #[test]
    fn test_language_detection_edge_cases() {
        assert_eq!(detect_language("src/app.TS").as_deref(), Some("ts"));
        assert_eq!(detect_language("Makefile"), None);
        assert_eq!(detect_language("dir.with.dots/file"), None);
        assert_eq!(detect_language(".gitignore"), None);
        assert_eq!(detect_language("weird."), None);
        assert_eq!(detect_language("a/b/archive.tar.gz").as_deref(), Some("gz"));
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(parse("").files.is_empty());
        assert!(parse("not a diff at all\njust text\n").files.is_empty());
    }

    #[test]
    fn test_multiple_files_keep_first_appearance_order() {
        let diff = r#"diff --git a/z.rs b/z.rs
--- a/z.rs
+++ b/z.rs
@@ -1,1 +1,1 @@
-x
+y
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,1 +1,1 @@
-x
+y
"#;
        let index = parse(diff);
        let ids: Vec<&str> = index.files.iter().map(|f| f.file_id.as_str()).collect();
        assert_eq!(ids, vec!["z.rs", "a.rs"]);
    }

    #[test]
    fn test_diff_index_json_shape() {
        let diff = "diff --git a/s.rs b/s.rs\n--- a/s.rs\n+++ b/s.rs\n@@ -1,1 +1,1 @@\n-x\n+y\n";
        let index = parse(diff);
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["diff_index_version"], 1);
        assert_eq!(json["files"][0]["file_id"], "s.rs");
        assert_eq!(json["files"][0]["status"], "modified");
        assert_eq!(json["files"][0]["language"], "rs");
        assert_eq!(json["files"][0]["hunks"][0]["hunk_id"], "s.rs#h0");
        assert_eq!(json["files"][0]["hunks"][0]["old_start"], 1);
        assert_eq!(json["files"][0]["hunks"][0]["new_start"], 1);
    }

    #[test]
    fn test_contains_hunk_lookup() {
        let diff = "diff --git a/s.rs b/s.rs\n--- a/s.rs\n+++ b/s.rs\n@@ -1,1 +1,1 @@\n-x\n+y\n";
        let index = parse(diff);
        assert!(index.contains_hunk("s.rs", "s.rs#h0"));
        assert!(!index.contains_hunk("s.rs", "s.rs#h1"));
        assert!(!index.contains_hunk("t.rs", "s.rs#h0"));
    }
}
