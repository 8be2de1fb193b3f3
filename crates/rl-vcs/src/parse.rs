//! Unified diff text to structured [`Diff`].

use crate::backend::{Diff, DiffChange, DiffChangeKind, DiffFile, DiffHunk};

/// Path git prints for the missing side of an added or deleted file.
pub const NULL_DEVICE: &str = "/dev/null";

pub fn parse_unified_diff(base_ref: &str, unified: &str) -> Diff {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<HunkCursor> = None;

    for line in unified.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush_hunk(&mut current_file, &mut current_hunk);
            flush_file(&mut files, &mut current_file);
            let (from, to) = parse_git_header(rest).unwrap_or_default();
            current_file = Some(DiffFile {
                from,
                to,
                ..DiffFile::default()
            });
            continue;
        }

        if line.starts_with("@@ ") {
            flush_hunk(&mut current_file, &mut current_hunk);
            current_hunk = parse_hunk_header(line).map(HunkCursor::new);
            continue;
        }

        if let Some(cursor) = current_hunk.as_mut() {
            if let Some(file) = current_file.as_mut() {
                cursor.push(line, file);
            }
            continue;
        }

        let Some(file) = current_file.as_mut() else {
            continue;
        };
        if line.starts_with("new file mode") {
            file.is_new = true;
        } else if line.starts_with("deleted file mode") {
            file.is_deleted = true;
        } else if let Some(path) = line.strip_prefix("rename from ") {
            file.from = unquote(path);
        } else if let Some(path) = line.strip_prefix("rename to ") {
            file.to = unquote(path);
        } else if let Some(path) = line.strip_prefix("--- ") {
            file.from = strip_side_prefix(path, "a/");
        } else if let Some(path) = line.strip_prefix("+++ ") {
            file.to = strip_side_prefix(path, "b/");
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            file.is_binary = true;
        }
    }

    flush_hunk(&mut current_file, &mut current_hunk);
    flush_file(&mut files, &mut current_file);

    let total_additions = files.iter().map(|file| file.additions).sum();
    let total_deletions = files.iter().map(|file| file.deletions).sum();
    Diff {
        base_ref: base_ref.to_string(),
        files,
        total_additions,
        total_deletions,
    }
}

struct HunkCursor {
    hunk: DiffHunk,
    old_line: u32,
    new_line: u32,
}

impl HunkCursor {
    fn new(hunk: DiffHunk) -> Self {
        Self {
            old_line: hunk.old_start,
            new_line: hunk.new_start,
            hunk,
        }
    }

    fn push(&mut self, line: &str, file: &mut DiffFile) {
        let mut chars = line.chars();
        let (kind, old_line, new_line) = match chars.next() {
            Some('+') => {
                file.additions += 1;
                self.new_line += 1;
                (DiffChangeKind::Add, None, Some(self.new_line - 1))
            }
            Some('-') => {
                file.deletions += 1;
                self.old_line += 1;
                (DiffChangeKind::Delete, Some(self.old_line - 1), None)
            }
            Some(' ') | None => {
                self.old_line += 1;
                self.new_line += 1;
                (
                    DiffChangeKind::Context,
                    Some(self.old_line - 1),
                    Some(self.new_line - 1),
                )
            }
            // "\ No newline at end of file" and anything unexpected.
            Some(_) => return,
        };
        self.hunk.changes.push(DiffChange {
            kind,
            content: chars.collect(),
            old_line,
            new_line,
        });
    }
}

fn flush_hunk(file: &mut Option<DiffFile>, hunk: &mut Option<HunkCursor>) {
    if let Some(cursor) = hunk.take() {
        if let Some(file) = file.as_mut() {
            file.hunks.push(cursor.hunk);
        }
    }
}

fn flush_file(files: &mut Vec<DiffFile>, file: &mut Option<DiffFile>) {
    if let Some(mut file) = file.take() {
        file.is_renamed = file.from != file.to && file.from != NULL_DEVICE && file.to != NULL_DEVICE;
        file.path = if file.to == NULL_DEVICE || file.to.is_empty() {
            file.from.clone()
        } else {
            file.to.clone()
        };
        files.push(file);
    }
}

/// Splits `a/<from> b/<to>`, either side possibly C-quoted. Unquoted paths
/// containing " b/" are ambiguous here; the `---`/`+++` lines that follow
/// overwrite this guess when present.
fn parse_git_header(rest: &str) -> Option<(String, String)> {
    let (from, to) = if rest.starts_with('"') {
        let (from, remainder) = take_quoted(rest)?;
        let remainder = remainder.strip_prefix(' ')?;
        (from, unquote(remainder))
    } else if rest.ends_with('"') {
        let split = rest.rfind(" \"b/")?;
        (rest[..split].to_string(), unquote(&rest[split + 1..]))
    } else {
        let split = rest.rfind(" b/")?;
        (rest[..split].to_string(), rest[split + 1..].to_string())
    };
    Some((from.strip_prefix("a/")?.to_string(), to.strip_prefix("b/")?.to_string()))
}

fn strip_side_prefix(path: &str, prefix: &str) -> String {
    let path = if path.starts_with('"') {
        unquote(path)
    } else {
        path.split('\t').next().unwrap_or(path).to_string()
    };
    if path == NULL_DEVICE {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

/// Decodes a path git may have wrapped in C-style quotes; plain paths pass
/// through unchanged.
fn unquote(path: &str) -> String {
    match take_quoted(path) {
        Some((decoded, _)) => decoded,
        None => path.to_string(),
    }
}

/// Reads one `"..."` token with git's escapes (`\"`, `\\`, `\t`, `\n`, octal
/// bytes). Returns the decoded text and whatever follows the closing quote.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('"')?;
    let bytes = body.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), &body[i + 1..])),
            b'\\' => {
                let escaped = *bytes.get(i + 1)?;
                i += 2;
                let byte = match escaped {
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b'f' => 0x0c,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'v' => 0x0b,
                    b'0'..=b'7' => {
                        let digits = bytes.get(i - 1..i + 2)?;
                        if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                            return None;
                        }
                        i += 2;
                        digits
                            .iter()
                            .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'))
                            .try_into()
                            .ok()?
                    }
                    other => other,
                };
                out.push(byte);
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    None
}

fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let trimmed = line.strip_prefix("@@ ")?;
    let (ranges, header) = trimmed.split_once(" @@")?;
    let mut range_parts = ranges.split_whitespace();
    let (old_start, old_lines) = parse_range(range_parts.next()?.strip_prefix('-')?)?;
    let (new_start, new_lines) = parse_range(range_parts.next()?.strip_prefix('+')?)?;
    Some(DiffHunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
        header: header.trim().to_string(),
        changes: Vec::new(),
    })
}

fn parse_range(value: &str) -> Option<(u32, u32)> {
    match value.split_once(',') {
        Some((start, lines)) => Some((start.parse().ok()?, lines.parse().ok()?)),
        None => Some((value.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFIED: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 3b18e51..a8c2f0e 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,4 +1,5 @@ mod tests
 fn one() {}
-fn two() {}
+fn two() -> u32 { 2 }
+fn three() {}
 fn four() {}
 fn five() {}
";

    #[test]
    fn test_modified_file_line_numbers() {
        let diff = parse_unified_diff("HEAD", MODIFIED);
        assert_eq!(diff.base_ref, "HEAD");
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.total_additions, 2);
        assert_eq!(diff.total_deletions, 1);

        let file = &diff.files[0];
        assert_eq!(file.path, "src/lib.rs");
        assert!(!file.is_new && !file.is_deleted && !file.is_renamed);

        let hunk = &file.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines), (1, 4, 1, 5));
        assert_eq!(hunk.header, "mod tests");

        let kinds: Vec<_> = hunk.changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiffChangeKind::Context,
                DiffChangeKind::Delete,
                DiffChangeKind::Add,
                DiffChangeKind::Add,
                DiffChangeKind::Context,
                DiffChangeKind::Context,
            ]
        );
        assert_eq!(hunk.changes[1].old_line, Some(2));
        assert_eq!(hunk.changes[1].new_line, None);
        assert_eq!(hunk.changes[3].new_line, Some(3));
        assert_eq!(hunk.changes[4].old_line, Some(3));
        assert_eq!(hunk.changes[4].new_line, Some(4));
        assert_eq!(hunk.changes[2].content, "fn two() -> u32 { 2 }");
    }

    #[test]
    fn test_new_and_deleted_files() {
        let unified = "\
diff --git a/added.txt b/added.txt
new file mode 100644
index 0000000..ce01362
--- /dev/null
+++ b/added.txt
@@ -0,0 +1 @@
+hello
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
index ce01362..0000000
--- a/gone.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-bye
-now
\\ No newline at end of file
";
        let diff = parse_unified_diff("main", unified);
        assert_eq!(diff.files.len(), 2);

        let added = &diff.files[0];
        assert!(added.is_new);
        assert!(!added.is_renamed);
        assert_eq!(added.from, NULL_DEVICE);
        assert_eq!(added.path, "added.txt");
        assert_eq!(added.hunks[0].changes[0].new_line, Some(1));

        let gone = &diff.files[1];
        assert!(gone.is_deleted);
        assert!(!gone.is_renamed);
        assert_eq!(gone.path, "gone.txt");
        assert_eq!(gone.deletions, 2);
        assert_eq!(gone.hunks[0].changes.len(), 2);
    }

    #[test]
    fn test_rename_without_content_change() {
        let unified = "\
diff --git a/old/name.rs b/new/name.rs
similarity index 100%
rename from old/name.rs
rename to new/name.rs
";
        let diff = parse_unified_diff("HEAD", unified);
        let file = &diff.files[0];
        assert!(file.is_renamed);
        assert_eq!(file.from, "old/name.rs");
        assert_eq!(file.to, "new/name.rs");
        assert_eq!(file.path, "new/name.rs");
        assert!(file.hunks.is_empty());
    }

    #[test]
    fn test_binary_file() {
        let unified = "\
diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
";
        let diff = parse_unified_diff("HEAD", unified);
        assert!(diff.files[0].is_binary);
        assert_eq!(diff.files[0].path, "logo.png");
    }

    #[test]
    fn test_removed_line_that_looks_like_header() {
        let unified = "\
diff --git a/notes.md b/notes.md
--- a/notes.md
+++ b/notes.md
@@ -1,2 +1,1 @@
--- a/not-a-header
 kept
";
        let diff = parse_unified_diff("HEAD", unified);
        let file = &diff.files[0];
        assert_eq!(file.from, "notes.md");
        assert_eq!(file.deletions, 1);
        assert_eq!(file.hunks[0].changes[0].content, "-- a/not-a-header");
    }

    #[test]
    fn test_quoted_paths_are_unquoted() {
        let unified = r#"diff --git "a/say\"hi\".txt" "b/say\"hi\".txt"
index 1111111..2222222 100644
--- "a/say\"hi\".txt"
+++ "b/say\"hi\".txt"
@@ -1 +1 @@
-old
+new
diff --git "a/tab\tname.txt" "b/tab\tname.txt"
new file mode 100644
--- /dev/null
+++ "b/tab\tname.txt"
@@ -0,0 +1 @@
+x
diff --git "a/caf\303\251.txt" "b/caf\303\251.txt"
index 1111111..2222222 100644
Binary files "a/caf\303\251.txt" and "b/caf\303\251.txt" differ
"#;
        let diff = parse_unified_diff("HEAD", unified);
        let paths: Vec<_> = diff.files.iter().map(|file| file.path.as_str()).collect();
        assert_eq!(paths, vec!["say\"hi\".txt", "tab\tname.txt", "café.txt"]);
        assert!(diff.files.iter().all(|file| !file.is_renamed));
        assert_eq!(diff.files[0].from, "say\"hi\".txt");
        assert_eq!(diff.files[1].from, NULL_DEVICE);
    }

    #[test]
    fn test_quoted_rename() {
        let unified = r#"diff --git a/plain.txt "b/with \"quote\".txt"
similarity index 100%
rename from plain.txt
rename to "with \"quote\".txt"
"#;
        let diff = parse_unified_diff("HEAD", unified);
        let file = &diff.files[0];
        assert_eq!(file.from, "plain.txt");
        assert_eq!(file.path, "with \"quote\".txt");
        assert!(file.is_renamed);
    }

    #[test]
    fn test_empty_input() {
        let diff = parse_unified_diff("HEAD", "");
        assert!(diff.files.is_empty());
        assert_eq!(diff.total_additions, 0);
    }
}
