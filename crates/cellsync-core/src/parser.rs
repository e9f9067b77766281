//! Cell discovery: turning document text into cell-shaped regions.
//!
//! The core only depends on the [`CellParser`] trait. [`StatementParser`]
//! is the default implementation: every top-level Rust statement or item
//! of the document is one cell.

use serde::Serialize;
use syn::spanned::Spanned;

use crate::cell::Region;

/// A syntax error found while parsing the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    /// Line in the document (1-based).
    pub line: usize,
    /// Column in the line (1-based, in characters).
    pub column: usize,
    /// Byte offset of the error position.
    pub offset: usize,
    pub message: String,
}

/// Cell boundaries discovered in one version of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    /// Cell regions in document order, non-overlapping.
    pub regions: Vec<Region>,
    pub errors: Vec<ParseIssue>,
}

impl SyntaxTree {
    pub fn from_regions(regions: Vec<Region>) -> Self {
        Self {
            regions,
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Byte offset of the earliest error, if any.
    pub fn first_error_offset(&self) -> Option<usize> {
        self.errors.iter().map(|e| e.offset).min()
    }
}

/// Produces cell regions for a document. Must be a pure function of the text.
pub trait CellParser: Send {
    fn parse(&self, text: &str) -> SyntaxTree;
}

/// Byte offsets of line starts, for turning line/column pairs into offsets.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based line containing the byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Byte offset of a 1-based line and 0-based character column.
    ///
    /// Positions past the end of a line or of the document are clamped.
    pub fn offset(&self, text: &str, line: usize, column: usize) -> usize {
        let Some(&start) = self.starts.get(line.saturating_sub(1)) else {
            return self.len;
        };
        let end = self
            .starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        text[start..end]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }
}

/// Splits a Rust document into one cell per top-level statement.
///
/// `let` bindings, expression statements, items and macro invocations
/// each become a cell; the last expression may omit its semicolon. The
/// document is parsed as the body of a block with `syn`, using
/// `proc-macro2` span locations to recover positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementParser;

impl StatementParser {
    pub fn new() -> Self {
        Self
    }
}

impl CellParser for StatementParser {
    fn parse(&self, text: &str) -> SyntaxTree {
        // The wrapper adds one line before the document.
        let wrapped = format!("{{\n{}\n}}", text);
        let index = LineIndex::new(text);

        let to_offset = |pos: proc_macro2::LineColumn| -> usize {
            if pos.line < 2 {
                return 0;
            }
            index.offset(text, pos.line - 1, pos.column)
        };

        match syn::parse_str::<syn::Block>(&wrapped) {
            Ok(block) => {
                let regions = block
                    .stmts
                    .iter()
                    .map(|stmt| {
                        let span = stmt.span();
                        let from = to_offset(span.start());
                        let to = to_offset(span.end()).max(from);
                        Region::new(from, to, index.line_of(from), index.line_of(to))
                    })
                    .collect();
                SyntaxTree::from_regions(regions)
            }
            Err(err) => {
                let start = err.span().start();
                let offset = to_offset(start).min(text.len());
                let issue = ParseIssue {
                    line: index.line_of(offset),
                    column: text[..offset]
                        .rsplit('\n')
                        .next()
                        .map(|line| line.chars().count() + 1)
                        .unwrap_or(1),
                    offset,
                    message: err.to_string(),
                };
                tracing::debug!(line = issue.line, column = issue.column, "Parse error: {}", issue.message);
                SyntaxTree {
                    regions: Vec::new(),
                    errors: vec![issue],
                }
            }
        }
    }
}
