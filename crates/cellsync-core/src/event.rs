//! Asynchronous events emitted by the evaluation session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cell::{CellId, StreamKind};
use crate::vars::{VarDiff, VarInfo, VarVersion};

/// One event from the session.
///
/// Cell events carry `version`, the document version of the command that
/// started the evaluation they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Evaluation of the cell's code started.
    EvalStart { line_id: CellId, version: u64 },

    /// Evaluation of the cell's code finished.
    EvalComplete {
        line_id: CellId,
        version: u64,
        output_version: u64,
    },

    /// A line of console output.
    ConsoleOutput {
        line_id: CellId,
        version: u64,
        stream: StreamKind,
        text: String,
    },

    /// An image produced by the cell.
    PlotOutput {
        line_id: CellId,
        version: u64,
        /// Base64 encoded image data.
        data: String,
    },

    /// A diagnostic raised while evaluating the cell.
    ErrorOutput {
        line_id: CellId,
        version: u64,
        line: usize,
        column: usize,
        message: String,
    },

    /// Variables added to or removed from the global environment.
    EnvUpdate {
        #[serde(default)]
        adds: BTreeMap<String, VarInfo>,
        #[serde(default)]
        drops: Vec<String>,
        version: VarVersion,
    },
}

impl SessionEvent {
    /// The cell this event is about, if it is a cell event.
    pub fn line_id(&self) -> Option<CellId> {
        match self {
            SessionEvent::EvalStart { line_id, .. }
            | SessionEvent::EvalComplete { line_id, .. }
            | SessionEvent::ConsoleOutput { line_id, .. }
            | SessionEvent::PlotOutput { line_id, .. }
            | SessionEvent::ErrorOutput { line_id, .. } => Some(*line_id),
            SessionEvent::EnvUpdate { .. } => None,
        }
    }

    /// Command version a cell event belongs to.
    pub fn version(&self) -> Option<u64> {
        match self {
            SessionEvent::EvalStart { version, .. }
            | SessionEvent::EvalComplete { version, .. }
            | SessionEvent::ConsoleOutput { version, .. }
            | SessionEvent::PlotOutput { version, .. }
            | SessionEvent::ErrorOutput { version, .. } => Some(*version),
            SessionEvent::EnvUpdate { .. } => None,
        }
    }

    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::EvalStart { .. } => "eval_start",
            SessionEvent::EvalComplete { .. } => "eval_complete",
            SessionEvent::ConsoleOutput { .. } => "console_output",
            SessionEvent::PlotOutput { .. } => "plot_output",
            SessionEvent::ErrorOutput { .. } => "error_output",
            SessionEvent::EnvUpdate { .. } => "env_update",
        }
    }

    /// The variable diff carried by an `env_update`.
    pub fn var_diff(&self) -> Option<(VarDiff, VarVersion)> {
        match self {
            SessionEvent::EnvUpdate {
                adds,
                drops,
                version,
            } => Some((
                VarDiff {
                    adds: adds.clone(),
                    drops: drops.clone(),
                },
                *version,
            )),
            _ => None,
        }
    }
}

/// Why an event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No live cell has the event's id; it was deleted locally.
    UnknownCell,
    /// The event refers to an older command or output than the cell holds.
    StaleVersion,
    /// The cell was edited after the command was sent.
    SupersededCode,
    /// The event changes nothing.
    Duplicate,
}

/// Effect of applying one session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// A cell snapshot was replaced.
    Applied { line_id: CellId },
    /// The variable table was replaced.
    VarsUpdated,
    Dropped { reason: DropReason },
}

impl EventOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, EventOutcome::Dropped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"console_output","line_id":3,"version":2,"stream":"stdout","text":"2"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            SessionEvent::ConsoleOutput {
                line_id: CellId::new(3),
                version: 2,
                stream: StreamKind::Stdout,
                text: "2".to_string(),
            }
        );
        assert_eq!(event.line_id(), Some(CellId::new(3)));
        assert_eq!(event.kind(), "console_output");
    }

    #[test]
    fn test_env_update_deserialization() {
        let json = r#"{"type":"env_update","adds":{"x":{"summary":"1"}},"version":"0|4"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        let (diff, version) = event.var_diff().unwrap();
        assert_eq!(diff.adds["x"].summary, "1");
        assert!(diff.drops.is_empty());
        assert_eq!(version, VarVersion::new(CellId::new(0), 4));
        assert_eq!(event.line_id(), None);
    }
}
