//! Commands sent to the evaluation session.

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::error::Result;

/// What a command asks the session to do with a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Add,
    Update,
    Delete,
}

/// One request unit of a command batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub line_id: CellId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Zero-based position of the cell among the live cells at send time (`add` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<usize>,
    /// Document version the command was built at; echoed back in session events.
    pub version: u64,
}

impl CodeCommand {
    pub fn add(line_id: CellId, code: String, after: usize, version: u64) -> Self {
        Self {
            kind: CommandKind::Add,
            line_id,
            code: Some(code),
            after: Some(after),
            version,
        }
    }

    pub fn update(line_id: CellId, code: String, version: u64) -> Self {
        Self {
            kind: CommandKind::Update,
            line_id,
            code: Some(code),
            after: None,
            version,
        }
    }

    pub fn delete(line_id: CellId, version: u64) -> Self {
        Self {
            kind: CommandKind::Delete,
            line_id,
            code: None,
            after: None,
            version,
        }
    }
}

/// The evaluation session as seen from the notebook.
///
/// `submit` hands a whole batch to the transport and returns without
/// waiting for the session to act on it. Results come back later as
/// [`SessionEvent`](crate::SessionEvent)s.
pub trait EvalSession {
    fn submit(&mut self, batch: Vec<CodeCommand>) -> Result<()>;
}

/// A session that keeps every batch it is given. Used for replays and tests.
#[derive(Debug, Default)]
pub struct RecordingSession {
    pub batches: Vec<Vec<CodeCommand>>,
    /// Number of upcoming submits that should fail.
    pub fail_next: usize,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` submits fail.
    pub fn failing(count: usize) -> Self {
        Self {
            batches: Vec::new(),
            fail_next: count,
        }
    }

    pub fn last_batch(&self) -> Option<&[CodeCommand]> {
        self.batches.last().map(Vec::as_slice)
    }
}

impl EvalSession for RecordingSession {
    fn submit(&mut self, batch: Vec<CodeCommand>) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(crate::Error::Send {
                commands: batch.len(),
                message: "session unavailable".to_string(),
            });
        }
        self.batches.push(batch);
        Ok(())
    }
}
