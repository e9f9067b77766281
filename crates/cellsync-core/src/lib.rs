//! Core engine for cellsync live notebooks.
//!
//! This crate provides:
//! - Cell segmentation of an incrementally edited document
//! - Command synchronization with an external evaluation session
//! - Reconciliation of asynchronous, versioned session events
//! - Aggregated, copy-on-write document state for rendering

pub mod aggregate;
pub mod cell;
pub mod change;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod notebook;
pub mod parser;
pub mod reconcile;
pub mod segment;
pub mod sync;
pub mod vars;
pub mod version;

pub use aggregate::{Aggregator, Decoration, DocState};
pub use cell::{
    Cell, CellId, CellIdAllocator, CellPatch, CellStatus, ConsoleLine, ErrorInfo, Plot, Region,
    StreamKind,
};
pub use change::{Assoc, Change, ChangeSet};
pub use command::{CodeCommand, CommandKind, EvalSession, RecordingSession};
pub use config::NotebookConfig;
pub use error::{Error, Result};
pub use event::{DropReason, EventOutcome, SessionEvent};
pub use notebook::{EditOutcome, Notebook};
pub use parser::{CellParser, LineIndex, ParseIssue, StatementParser, SyntaxTree};
pub use reconcile::CellIndex;
pub use segment::{CellAction, Segmentation};
pub use sync::SyncBatch;
pub use vars::{VarBinding, VarDiff, VarInfo, VarTable, VarVersion};
pub use version::Freshness;
