//! Source file storage and byte-offset to (line, display-column) mapping.
//!
//! The manager owns every source buffer for the lifetime of a session and is
//! append-only: readers never observe mutation. Columns are *display*
//! columns — East-Asian wide characters count as two cells, combining marks
//! as zero — so caret rendering lines up in a terminal.

use std::sync::Arc;

use unicode_width::UnicodeWidthChar;

use crate::span::Span;

/// 1-based line and display column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Single-line snippet for one span.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub line_text: String,
    /// 1-based line number of the snippet line.
    pub line_no: u32,
    /// 1-based display column where the caret run starts.
    pub col_lo: u32,
    /// 1-based display column one past the caret run.
    pub col_hi: u32,
}

/// Multi-line context snippet for one span.
#[derive(Debug, Clone)]
pub struct SnippetBlock {
    /// 1-based number of `lines[0]`.
    pub first_line_no: u32,
    pub lines: Vec<String>,
    /// Index into `lines` of the caret line.
    pub caret_line_offset: u32,
    pub caret_cols_before: u32,
    pub caret_cols_len: u32,
}

#[derive(Debug, Clone)]
struct File {
    name: String,
    content: Arc<str>,
    /// Byte offsets of line starts; always begins with 0.
    line_starts: Vec<u32>,
}

/// Owns named source buffers and answers position queries.
#[derive(Debug, Clone, Default)]
pub struct SourceManager {
    files: Vec<File>,
}

impl SourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source buffer and returns its file id.
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) -> u32 {
        let content: Arc<str> = Arc::from(content.into());
        let line_starts = build_line_starts(&content);
        self.files.push(File {
            name: name.into(),
            content,
            line_starts,
        });
        u32::try_from(self.files.len() - 1).expect("file id overflow")
    }

    /// Name of a file. Panics on an unknown id (programmer error).
    #[must_use]
    pub fn name(&self, file_id: u32) -> &str {
        &self.files[file_id as usize].name
    }

    /// Content of a file. Panics on an unknown id (programmer error).
    #[must_use]
    pub fn content(&self, file_id: u32) -> &str {
        &self.files[file_id as usize].content
    }

    /// Shared handle to a file's content, used by snapshots that must keep
    /// the buffer alive past a reparse.
    #[must_use]
    pub fn content_arc(&self, file_id: u32) -> Arc<str> {
        Arc::clone(&self.files[file_id as usize].content)
    }

    /// Maps a byte offset to its 1-based line and display column.
    #[must_use]
    pub fn line_col(&self, file_id: u32, byte_off: u32) -> LineCol {
        let f = &self.files[file_id as usize];
        let off = byte_off.min(u32::try_from(f.content.len()).unwrap_or(u32::MAX));
        let line_idx = line_index_from_byte(f, off);
        let line_start = f.line_starts[line_idx];
        let col = display_width_between(&f.content, line_start, off) + 1;
        LineCol {
            line: u32::try_from(line_idx).expect("line overflow") + 1,
            col,
        }
    }

    /// Single-line snippet with caret columns for `sp`.
    ///
    /// A span crossing lines clamps its highlight to the end of the first
    /// line.
    #[must_use]
    pub fn snippet_for_span(&self, sp: &Span) -> Snippet {
        let f = &self.files[sp.file_id as usize];
        let len = u32::try_from(f.content.len()).unwrap_or(u32::MAX);
        let lo = sp.lo.min(len);
        let hi = sp.hi.min(len);

        let lc_lo = self.line_col(sp.file_id, lo);
        let lc_hi = self.line_col(sp.file_id, hi);

        let line_idx = (lc_lo.line - 1) as usize;
        let line_start = f.line_starts[line_idx];
        let line_end = line_end_byte(f, line_idx);
        let line_text = f.content[line_start as usize..line_end as usize].to_owned();

        let col_hi = if lc_hi.line == lc_lo.line {
            lc_hi.col.max(lc_lo.col)
        } else {
            display_width_between(&f.content, line_start, line_end) + 1
        };

        Snippet {
            line_text,
            line_no: lc_lo.line,
            col_lo: lc_lo.col,
            col_hi,
        }
    }

    /// Multi-line snippet: the caret line plus up to `context_lines` lines
    /// above and below.
    #[must_use]
    pub fn snippet_block_for_span(&self, sp: &Span, context_lines: u32) -> SnippetBlock {
        let f = &self.files[sp.file_id as usize];
        let single = self.snippet_for_span(sp);

        let caret_line_idx = single.line_no - 1;
        let first = caret_line_idx.saturating_sub(context_lines);
        let last_line_idx = u32::try_from(f.line_starts.len() - 1).expect("line overflow");
        let last = (caret_line_idx + context_lines).min(last_line_idx);

        let mut lines = Vec::with_capacity((last - first + 1) as usize);
        for idx in first..=last {
            let start = f.line_starts[idx as usize];
            let end = line_end_byte(f, idx as usize);
            lines.push(f.content[start as usize..end as usize].to_owned());
        }

        SnippetBlock {
            first_line_no: first + 1,
            lines,
            caret_line_offset: caret_line_idx - first,
            caret_cols_before: single.col_lo - 1,
            caret_cols_len: (single.col_hi - single.col_lo).max(1),
        }
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn build_line_starts(s: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            starts.push(u32::try_from(i + 1).expect("source too large"));
        }
    }
    starts
}

fn line_index_from_byte(f: &File, byte_off: u32) -> usize {
    // partition_point: first index whose line start is > off, minus one
    let idx = f.line_starts.partition_point(|&s| s <= byte_off);
    idx.saturating_sub(1)
}

fn line_end_byte(f: &File, line_idx: usize) -> u32 {
    if line_idx + 1 < f.line_starts.len() {
        f.line_starts[line_idx + 1] - 1
    } else {
        u32::try_from(f.content.len()).expect("source too large")
    }
}

/// Sum of display widths of the characters in `[byte_lo, byte_hi)`.
fn display_width_between(s: &str, byte_lo: u32, byte_hi: u32) -> u32 {
    let slice = &s[byte_lo as usize..byte_hi as usize];
    let mut w = 0u32;
    for ch in slice.chars() {
        w += u32::try_from(ch.width().unwrap_or(0)).expect("char width");
    }
    w
}

#[cfg(test)]
mod tests {
    use super::SourceManager;
    use crate::span::Span;

    #[test]
    fn line_col_basics() {
        let mut sm = SourceManager::new();
        let id = sm.add("a.tn", "let x = 1;\nlet y = 2;\n");
        let lc = sm.line_col(id, 0);
        assert_eq!((lc.line, lc.col), (1, 1));
        let lc = sm.line_col(id, 11);
        assert_eq!((lc.line, lc.col), (2, 1));
        let lc = sm.line_col(id, 15);
        assert_eq!((lc.line, lc.col), (2, 5));
    }

    #[test]
    fn wide_chars_count_two_columns() {
        let mut sm = SourceManager::new();
        // "한" is 3 bytes, 2 display columns.
        let id = sm.add("w.tn", "한글 x\n");
        let lc = sm.line_col(id, 6);
        assert_eq!(lc.col, 5);
        let lc = sm.line_col(id, 7);
        assert_eq!(lc.col, 6);
    }

    #[test]
    fn snippet_clamps_multiline_span() {
        let mut sm = SourceManager::new();
        let id = sm.add("m.tn", "abc\ndefg\n");
        let sn = sm.snippet_for_span(&Span::new(id, 1, 6));
        assert_eq!(sn.line_text, "abc");
        assert_eq!(sn.line_no, 1);
        assert_eq!(sn.col_lo, 2);
        assert_eq!(sn.col_hi, 4);
    }

    #[test]
    fn snippet_block_context() {
        let mut sm = SourceManager::new();
        let id = sm.add("c.tn", "l1\nl2\nl3\nl4\nl5\n");
        let block = sm.snippet_block_for_span(&Span::new(id, 6, 8), 1);
        assert_eq!(block.first_line_no, 2);
        assert_eq!(block.lines, vec!["l2", "l3", "l4"]);
        assert_eq!(block.caret_line_offset, 1);
    }
}
