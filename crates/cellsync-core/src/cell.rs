//! The cell entity: one versioned, immutable snapshot of a code region.
//!
//! Snapshots are shared as `Arc<Cell>`. Every change (edit, remap,
//! session event) builds a new snapshot from the previous one through
//! [`CellPatch`]; an untouched cell keeps its `Arc`, which is what lets
//! downstream consumers skip work with a pointer comparison.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vars::{VarBinding, VarInfo, VarVersion};

/// Stable identifier of a cell; the join key with the session protocol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Hands out cell ids. Ids are never reused within a document session.
#[derive(Debug, Default)]
pub struct CellIdAllocator {
    next: usize,
}

impl CellIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> CellId {
        let id = CellId(self.next);
        self.next += 1;
        id
    }
}

/// Position of a code region in the document.
///
/// Offsets are UTF-8 byte offsets, lines are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub from: usize,
    pub to: usize,
    pub from_line: usize,
    pub to_line: usize,
}

impl Region {
    pub fn new(from: usize, to: usize, from_line: usize, to_line: usize) -> Self {
        Self {
            from,
            to,
            from_line,
            to_line,
        }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the two regions share at least one byte.
    pub fn overlaps(&self, from: usize, to: usize) -> bool {
        self.from < to && from < self.to
    }

    /// Whether `pos` lies within the region, boundaries included.
    pub fn contains(&self, pos: usize) -> bool {
        self.from <= pos && pos <= self.to
    }
}

/// Where a cell is in its round trip with the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Local code differs from what the session has, or the session has never seen it.
    #[default]
    CodeDirty,
    /// A command was sent; the session has not started evaluating it yet.
    CodePending,
    /// The session is evaluating the cell's current code.
    ValuePending,
    /// The session finished evaluating the cell's current code.
    CodeClean,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::CodeDirty => "code dirty",
            CellStatus::CodePending => "code pending",
            CellStatus::ValuePending => "value pending",
            CellStatus::CodeClean => "code clean",
        }
    }

    pub fn is_clean(&self) -> bool {
        *self == CellStatus::CodeClean
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output stream a console line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Diagnostic messages emitted by the session itself.
    Message,
}

/// One line of console output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub stream: StreamKind,
    pub text: String,
}

/// A diagnostic reported by the session while evaluating a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Line within the cell (1-based).
    pub line: usize,
    /// Column within the line (1-based).
    pub column: usize,
    pub message: String,
}

/// An encoded image produced by a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    /// Base64 encoded image data, as delivered by the session.
    pub data: String,
}

impl Plot {
    /// Decode the image payload.
    pub fn decode(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// One snapshot of a cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub id: CellId,

    pub from: usize,
    pub to: usize,
    pub from_line: usize,
    pub to_line: usize,

    /// Current source text of the region.
    pub doc_code: String,
    /// Document version at which `doc_code` was last set.
    pub doc_version: u64,
    /// Code last transmitted to the session.
    pub model_code: Option<String>,
    /// Document version of the last transmission.
    pub model_version: Option<u64>,
    /// Document version at which the upstream environment was last known correct.
    pub input_version: u64,

    pub console_lines: Vec<ConsoleLine>,
    pub error_infos: Vec<ErrorInfo>,
    pub plots: Vec<Plot>,
    /// Variables bound by this cell's last evaluation.
    pub var_infos: BTreeMap<String, VarBinding>,
    pub output_version: u64,

    pub status: CellStatus,
    /// Bumped on every snapshot replacement.
    pub instance_version: u64,
}

impl Cell {
    /// Create the first snapshot of a new cell.
    ///
    /// `code` must be the text of `region`; the caller slices it from the
    /// document, so a length mismatch is a contract violation.
    pub fn create(id: CellId, region: Region, code: String, doc_version: u64) -> Result<Arc<Cell>> {
        if region.from > region.to {
            return Err(Error::MalformedCell {
                id: Some(id.to_string()),
                message: format!("from {} is after to {}", region.from, region.to),
            });
        }
        if region.from_line > region.to_line {
            return Err(Error::MalformedCell {
                id: Some(id.to_string()),
                message: format!(
                    "from_line {} is after to_line {}",
                    region.from_line, region.to_line
                ),
            });
        }
        if code.len() != region.len() {
            return Err(Error::MalformedCell {
                id: Some(id.to_string()),
                message: format!(
                    "code is {} bytes but region spans {}",
                    code.len(),
                    region.len()
                ),
            });
        }

        Ok(Arc::new(Cell {
            id,
            from: region.from,
            to: region.to,
            from_line: region.from_line,
            to_line: region.to_line,
            doc_code: code,
            doc_version,
            model_code: None,
            model_version: None,
            input_version: doc_version,
            console_lines: Vec::new(),
            error_infos: Vec::new(),
            plots: Vec::new(),
            var_infos: BTreeMap::new(),
            output_version: 0,
            status: CellStatus::CodeDirty,
            instance_version: 0,
        }))
    }

    /// Start building a new snapshot from this one.
    pub fn patch(&self) -> CellPatch {
        CellPatch { cell: self.clone() }
    }

    pub fn region(&self) -> Region {
        Region::new(self.from, self.to, self.from_line, self.to_line)
    }

    /// Whether the session has ever been told about this cell.
    pub fn is_sent(&self) -> bool {
        self.model_code.is_some()
    }

    pub fn has_output(&self) -> bool {
        !self.console_lines.is_empty()
            || !self.error_infos.is_empty()
            || !self.plots.is_empty()
            || !self.var_infos.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.error_infos.is_empty()
    }
}

/// Copy-on-write builder for the next snapshot of a cell.
///
/// Fields not touched by a setter are carried over from the previous
/// snapshot.
#[must_use]
#[derive(Debug)]
pub struct CellPatch {
    cell: Cell,
}

impl CellPatch {
    pub fn region(mut self, region: Region) -> Self {
        self.cell.from = region.from;
        self.cell.to = region.to;
        self.cell.from_line = region.from_line;
        self.cell.to_line = region.to_line;
        self
    }

    /// Replace the code; the cell becomes dirty.
    pub fn code(mut self, code: String, doc_version: u64) -> Self {
        self.cell.doc_code = code;
        self.cell.doc_version = doc_version;
        self.cell.status = CellStatus::CodeDirty;
        self
    }

    pub fn status(mut self, status: CellStatus) -> Self {
        self.cell.status = status;
        self
    }

    /// Record that the current code was transmitted at `doc_version`.
    pub fn sent(mut self, doc_version: u64) -> Self {
        self.cell.model_code = Some(self.cell.doc_code.clone());
        self.cell.model_version = Some(doc_version);
        self.cell.input_version = doc_version;
        self.cell.status = CellStatus::CodePending;
        self
    }

    /// Forget a transmission that never reached the session.
    pub fn unsent(mut self) -> Self {
        self.cell.model_code = None;
        self.cell.model_version = None;
        self.cell.status = CellStatus::CodeDirty;
        self
    }

    pub fn input_version(mut self, version: u64) -> Self {
        self.cell.input_version = version;
        self
    }

    /// Drop everything produced by the previous evaluation.
    pub fn clear_outputs(mut self) -> Self {
        self.cell.console_lines.clear();
        self.cell.error_infos.clear();
        self.cell.plots.clear();
        self.cell.var_infos.clear();
        self
    }

    pub fn push_console(mut self, stream: StreamKind, text: String) -> Self {
        self.cell.console_lines.push(ConsoleLine { stream, text });
        self
    }

    pub fn push_error(mut self, error: ErrorInfo) -> Self {
        self.cell.error_infos.push(error);
        self
    }

    pub fn push_plot(mut self, plot: Plot) -> Self {
        self.cell.plots.push(plot);
        self
    }

    pub fn output_version(mut self, version: u64) -> Self {
        self.cell.output_version = version;
        self
    }

    /// Record variable bindings produced by this cell.
    pub fn bind_vars<'a>(
        mut self,
        adds: impl IntoIterator<Item = (&'a String, &'a VarInfo)>,
        drops: impl IntoIterator<Item = &'a String>,
        version: VarVersion,
    ) -> Self {
        for name in drops {
            self.cell.var_infos.remove(name);
        }
        for (name, info) in adds {
            self.cell.var_infos.insert(
                name.clone(),
                VarBinding {
                    info: info.clone(),
                    version,
                },
            );
        }
        self
    }

    /// Finish the snapshot.
    pub fn build(mut self) -> Arc<Cell> {
        self.cell.instance_version += 1;
        Arc::new(self.cell)
    }
}
