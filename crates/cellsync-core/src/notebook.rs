//! The notebook controller.
//!
//! A [`Notebook`] owns the document text, the live cell list and the
//! variable table. Edits and session events are applied one at a time;
//! every mutating call replaces whole snapshots and ends by recomputing
//! the published [`DocState`].

use std::mem;
use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{Aggregator, DocMeta, DocState};
use crate::cell::{Cell, CellId, CellIdAllocator, CellStatus};
use crate::change::ChangeSet;
use crate::command::{CodeCommand, CommandKind, EvalSession};
use crate::config::NotebookConfig;
use crate::error::Result;
use crate::event::{EventOutcome, SessionEvent};
use crate::parser::{CellParser, ParseIssue, StatementParser};
use crate::reconcile::{reconcile, CellIndex, Reconciled};
use crate::segment::{remap_cells, segment, CellAction, Segmentation};
use crate::sync::prepare;
use crate::vars::VarTable;

/// What one edit did to the cell list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub doc_version: u64,
    /// One action per live cell, in document order.
    pub actions: Vec<CellAction>,
    /// Cells removed by the edit.
    pub deleted: Vec<CellId>,
}

/// A batch the session never received.
#[derive(Debug, Clone)]
struct FailedBatch {
    commands: Vec<CodeCommand>,
    deleted: Vec<Arc<Cell>>,
}

/// Client-side model of a notebook synchronized with an evaluation session.
pub struct Notebook {
    config: NotebookConfig,
    parser: Box<dyn CellParser>,

    text: String,
    doc_version: u64,
    cells: Vec<Arc<Cell>>,
    index: CellIndex,
    ids: CellIdAllocator,
    /// Deleted cells whose `delete` command has not been sent yet.
    pending_deletes: Vec<Arc<Cell>>,
    failed: Vec<FailedBatch>,
    var_table: Arc<VarTable>,

    parse_tree_current: bool,
    parse_errors: Vec<ParseIssue>,

    aggregator: Aggregator,
    state: Arc<DocState>,
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new(StatementParser::new(), NotebookConfig::default())
    }
}

impl Notebook {
    /// Create an empty notebook.
    pub fn new(parser: impl CellParser + 'static, config: NotebookConfig) -> Self {
        let mut notebook = Self {
            config,
            parser: Box::new(parser),
            text: String::new(),
            doc_version: 0,
            cells: Vec::new(),
            index: CellIndex::default(),
            ids: CellIdAllocator::new(),
            pending_deletes: Vec::new(),
            failed: Vec::new(),
            var_table: Arc::new(VarTable::new()),
            parse_tree_current: true,
            parse_errors: Vec::new(),
            aggregator: Aggregator::new(),
            state: Arc::new(DocState::default()),
        };
        notebook.publish();
        notebook
    }

    /// Create a notebook and load `text` as its first version.
    pub fn with_text(
        parser: impl CellParser + 'static,
        config: NotebookConfig,
        text: &str,
    ) -> Result<Self> {
        let mut notebook = Self::new(parser, config);
        notebook.load(text)?;
        Ok(notebook)
    }

    /// Replace the whole document.
    pub fn load(&mut self, text: &str) -> Result<EditOutcome> {
        let changes = ChangeSet::replace(0, self.text.len(), text, self.text.len())?;
        self.edit(&changes)
    }

    /// Apply one edit transaction.
    pub fn edit(&mut self, changes: &ChangeSet) -> Result<EditOutcome> {
        if changes.is_empty() {
            return Ok(EditOutcome {
                doc_version: self.doc_version,
                ..EditOutcome::default()
            });
        }

        let text = changes.apply(&self.text)?;
        let doc_version = self.doc_version + 1;

        let seg = if self.config.reparse_on_edit {
            self.resegment(&text, changes, doc_version)?
        } else {
            self.parse_tree_current = false;
            remap_cells(&self.cells, &text, changes, doc_version)?
        };

        self.text = text;
        self.doc_version = doc_version;
        Ok(self.install(seg))
    }

    /// Segment the current text from a fresh parse.
    ///
    /// Only needed when edits are configured not to reparse.
    pub fn reparse(&mut self) -> Result<EditOutcome> {
        let changes = ChangeSet::empty(self.text.len());
        let text = mem::take(&mut self.text);
        let seg = self.resegment(&text, &changes, self.doc_version);
        self.text = text;
        Ok(self.install(seg?))
    }

    fn resegment(
        &mut self,
        text: &str,
        changes: &ChangeSet,
        doc_version: u64,
    ) -> Result<Segmentation> {
        let tree = self.parser.parse(text);
        self.parse_tree_current = true;

        if tree.has_errors() {
            for issue in &tree.errors {
                tracing::warn!(
                    line = issue.line,
                    column = issue.column,
                    "Document does not parse: {}",
                    issue.message
                );
            }
            self.parse_errors = tree.errors;
            return remap_cells(&self.cells, text, changes, doc_version);
        }

        self.parse_errors.clear();
        segment(&self.cells, &tree, text, changes, doc_version, &mut self.ids)
    }

    fn install(&mut self, seg: Segmentation) -> EditOutcome {
        let deleted = seg.deleted.iter().map(|cell| cell.id).collect();
        self.cells = seg.cells;
        self.pending_deletes.extend(seg.deleted);
        self.index = CellIndex::build(&self.cells);
        self.publish();

        EditOutcome {
            doc_version: self.doc_version,
            actions: seg.actions,
            deleted,
        }
    }

    /// Index of the first cell that may not be sent yet.
    fn sync_boundary(&self) -> usize {
        if !self.parse_tree_current {
            return 0;
        }
        match self.parse_errors.iter().map(|issue| issue.offset).min() {
            Some(offset) => self
                .cells
                .iter()
                .position(|cell| cell.to >= offset)
                .unwrap_or(self.cells.len()),
            None => self.cells.len(),
        }
    }

    /// The commands the next [`sync`](Self::sync) would send.
    pub fn prepare_sync(&self) -> Vec<CodeCommand> {
        prepare(
            &self.cells,
            &self.pending_deletes,
            self.doc_version,
            self.sync_boundary(),
            &self.config,
        )
        .commands
    }

    /// Send every outstanding command to `session` as one batch.
    ///
    /// Returns the number of commands sent. On a send failure the cells
    /// stay `code pending` and the batch is kept for
    /// [`retry_failed`](Self::retry_failed). Cells whose `add` failed
    /// forget their model code, so the next send for them is an `add`.
    pub fn sync(&mut self, session: &mut dyn EvalSession) -> Result<usize> {
        let batch = prepare(
            &self.cells,
            &self.pending_deletes,
            self.doc_version,
            self.sync_boundary(),
            &self.config,
        );
        let deleted = mem::take(&mut self.pending_deletes);

        if batch.is_empty() {
            if !deleted.is_empty() {
                self.publish();
            }
            return Ok(0);
        }

        let count = batch.commands.len();
        self.cells = batch.cells;
        let sent = session.submit(batch.commands.clone());
        self.publish();

        match sent {
            Ok(()) => {
                tracing::info!(commands = count, doc_version = self.doc_version, "Sent command batch");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(commands = count, "Command batch failed: {}", err);
                self.forget_failed_adds(&batch.commands);
                self.publish();
                self.failed.push(FailedBatch {
                    commands: batch.commands,
                    deleted,
                });
                Err(err)
            }
        }
    }

    /// Forget the model code of cells whose `add` never reached the session.
    fn forget_failed_adds(&mut self, commands: &[CodeCommand]) {
        for command in commands {
            if command.kind != CommandKind::Add {
                continue;
            }
            let Some(position) = self.index.position(command.line_id) else {
                continue;
            };
            let cell = &self.cells[position];
            if cell.model_version == Some(command.version) {
                self.cells[position] = cell.patch().unsent().status(CellStatus::CodePending).build();
            }
        }
    }

    /// Whether a batch failed to send and has not been retried.
    pub fn has_failed_batches(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Re-mark the cells of failed batches dirty and requeue their deletes.
    ///
    /// Cells that changed since the failed send are left alone. Returns
    /// the number of cells re-marked.
    pub fn retry_failed(&mut self) -> usize {
        let mut remarked = 0;

        for batch in mem::take(&mut self.failed) {
            for command in &batch.commands {
                let Some(position) = self.index.position(command.line_id) else {
                    continue;
                };
                let cell = &self.cells[position];
                if cell.status != CellStatus::CodePending {
                    continue;
                }
                // A failed add forgot its model; a later send gives it one again.
                let expected = match command.kind {
                    CommandKind::Add => None,
                    CommandKind::Update => Some(command.version),
                    CommandKind::Delete => continue,
                };
                if cell.model_version != expected {
                    continue;
                }
                let next = cell.patch().status(CellStatus::CodeDirty).build();
                self.cells[position] = next;
                remarked += 1;
            }
            self.pending_deletes.extend(batch.deleted);
        }

        tracing::debug!(cells = remarked, "Re-marked cells of failed batches");
        self.publish();
        remarked
    }

    /// Apply one session event.
    pub fn apply_event(&mut self, event: &SessionEvent) -> EventOutcome {
        match reconcile(&self.cells, &self.index, &self.var_table, event) {
            Reconciled::Cell { position, cell } => {
                let line_id = cell.id;
                self.cells[position] = cell;
                self.publish();
                EventOutcome::Applied { line_id }
            }
            Reconciled::Vars { table, producer } => {
                self.var_table = Arc::new(table);
                if let Some((position, cell)) = producer {
                    self.cells[position] = cell;
                }
                self.publish();
                EventOutcome::VarsUpdated
            }
            Reconciled::Dropped(reason) => {
                tracing::debug!(event = event.kind(), ?reason, "Dropped session event");
                EventOutcome::Dropped { reason }
            }
        }
    }

    fn publish(&mut self) {
        let state = self.aggregator.derive(
            &self.cells,
            DocMeta {
                var_table: &self.var_table,
                doc_version: self.doc_version,
                parse_tree_current: self.parse_tree_current,
                parse_errors: &self.parse_errors,
                pending_deletes: !self.pending_deletes.is_empty(),
            },
        );
        self.state = Arc::new(state);
    }

    /// The latest published state.
    pub fn state(&self) -> Arc<DocState> {
        Arc::clone(&self.state)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn doc_version(&self) -> u64 {
        self.doc_version
    }

    pub fn cells(&self) -> &[Arc<Cell>] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> Option<&Arc<Cell>> {
        self.index.position(id).map(|position| &self.cells[position])
    }

    pub fn var_table(&self) -> &Arc<VarTable> {
        &self.var_table
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    /// Overlays served from the aggregator's cache so far.
    pub fn reused_overlays(&self) -> u64 {
        self.aggregator.reused()
    }
}
