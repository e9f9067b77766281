//! Command synchronization: turn dirty cells into a command batch.

use std::sync::Arc;

use crate::cell::{Cell, CellStatus};
use crate::command::CodeCommand;
use crate::config::NotebookConfig;

/// Commands to send, and the cell list as it will be once they are sent.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    pub commands: Vec<CodeCommand>,
    pub cells: Vec<Arc<Cell>>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Build the command batch that brings the session up to date.
///
/// `deleted` cells each get a `delete` command. Live cells before
/// `boundary` that are dirty get an `add` (never sent) or an `update`
/// and move to [`CellStatus::CodePending`]. Once any command has been
/// emitted, every later cell in the scan has its `input_version`
/// refreshed. Deletes come first in the batch, so a delete refreshes
/// every scanned cell. Cells with
/// nothing to do keep their snapshot.
pub fn prepare(
    cells: &[Arc<Cell>],
    deleted: &[Arc<Cell>],
    doc_version: u64,
    boundary: usize,
    config: &NotebookConfig,
) -> SyncBatch {
    let mut commands = Vec::new();

    for cell in deleted {
        if cell.is_sent() || config.delete_unsent_cells {
            commands.push(CodeCommand::delete(cell.id, doc_version));
        } else {
            tracing::debug!(cell = %cell.id, "Dropping unsent cell without a delete command");
        }
    }

    let boundary = boundary.min(cells.len());
    // Deletes go first, so every live cell comes after them.
    let mut upstream_changed = !commands.is_empty();
    let mut out = Vec::with_capacity(cells.len());

    for (index, cell) in cells.iter().enumerate() {
        if index >= boundary {
            out.push(Arc::clone(cell));
            continue;
        }

        if cell.status == CellStatus::CodeDirty {
            let command = if cell.is_sent() {
                CodeCommand::update(cell.id, cell.doc_code.clone(), doc_version)
            } else {
                CodeCommand::add(cell.id, cell.doc_code.clone(), index, doc_version)
            };
            commands.push(command);
            upstream_changed = true;
            out.push(cell.patch().sent(doc_version).build());
        } else if upstream_changed && cell.input_version != doc_version {
            out.push(cell.patch().input_version(doc_version).build());
        } else {
            out.push(Arc::clone(cell));
        }
    }

    SyncBatch {
        commands,
        cells: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellId, Region};
    use crate::command::CommandKind;

    fn dirty(id: usize, code: &str, from: usize) -> Arc<Cell> {
        Cell::create(
            CellId::new(id),
            Region::new(from, from + code.len(), id + 1, id + 1),
            code.to_string(),
            1,
        )
        .unwrap()
    }

    fn clean(id: usize, code: &str, from: usize) -> Arc<Cell> {
        dirty(id, code, from)
            .patch()
            .sent(1)
            .status(CellStatus::CodeClean)
            .build()
    }

    #[test]
    fn test_new_cell_is_added_at_its_index() {
        let cells = vec![dirty(0, "1+1", 0)];
        let batch = prepare(&cells, &[], 1, usize::MAX, &NotebookConfig::default());

        assert_eq!(batch.commands, vec![CodeCommand::add(CellId::new(0), "1+1".to_string(), 0, 1)]);
        let cell = &batch.cells[0];
        assert_eq!(cell.status, CellStatus::CodePending);
        assert_eq!(cell.model_version, Some(1));
        assert_eq!(cell.model_code.as_deref(), Some("1+1"));
        assert_eq!(cell.input_version, 1);
    }

    #[test]
    fn test_sent_cell_is_updated() {
        let edited = clean(0, "a;", 0).patch().code("b;".to_string(), 3).build();
        let batch = prepare(&[edited], &[], 3, usize::MAX, &NotebookConfig::default());
        assert_eq!(batch.commands[0].kind, CommandKind::Update);
        assert_eq!(batch.commands[0].code.as_deref(), Some("b;"));
        assert_eq!(batch.cells[0].model_version, Some(3));
    }

    #[test]
    fn test_clean_cells_before_edit_are_reused() {
        let cells = vec![clean(0, "a;", 0), dirty(1, "b;", 3)];
        let batch = prepare(&cells, &[], 2, usize::MAX, &NotebookConfig::default());
        assert!(Arc::ptr_eq(&batch.cells[0], &cells[0]));
        assert_eq!(batch.commands.len(), 1);
        assert_eq!(batch.commands[0].after, Some(1));
    }

    #[test]
    fn test_later_cells_get_input_version_refreshed() {
        let cells = vec![dirty(0, "a;", 0), clean(1, "b;", 3)];
        let batch = prepare(&cells, &[], 2, usize::MAX, &NotebookConfig::default());
        assert_eq!(batch.commands.len(), 1);
        assert_eq!(batch.cells[1].input_version, 2);
        assert_eq!(batch.cells[1].status, CellStatus::CodeClean);
        assert!(!Arc::ptr_eq(&batch.cells[1], &cells[1]));
    }

    #[test]
    fn test_boundary_holds_back_later_cells() {
        let cells = vec![dirty(0, "a;", 0), dirty(1, "b;", 3)];
        let batch = prepare(&cells, &[], 1, 1, &NotebookConfig::default());
        assert_eq!(batch.commands.len(), 1);
        assert_eq!(batch.cells[1].status, CellStatus::CodeDirty);
        assert!(Arc::ptr_eq(&batch.cells[1], &cells[1]));
    }

    #[test]
    fn test_pending_cells_are_not_sent_twice() {
        let pending = dirty(0, "a;", 0).patch().sent(1).build();
        let batch = prepare(&[pending], &[], 1, usize::MAX, &NotebookConfig::default());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_delete_refreshes_live_cells() {
        let cells = vec![clean(0, "a;", 0), clean(2, "c;", 3)];
        let deleted = vec![clean(1, "b;", 3)];
        let batch = prepare(&cells, &deleted, 2, usize::MAX, &NotebookConfig::default());

        assert_eq!(batch.commands, vec![CodeCommand::delete(CellId::new(1), 2)]);
        assert!(batch.cells.iter().all(|c| c.input_version == 2));
        assert!(batch.cells.iter().all(|c| c.status == CellStatus::CodeClean));
    }

    #[test]
    fn test_unsent_delete_refreshes_nothing() {
        let cells = vec![clean(0, "a;", 0)];
        let deleted = vec![dirty(1, "b;", 3)];
        let batch = prepare(&cells, &deleted, 2, usize::MAX, &NotebookConfig::default());
        assert!(batch.is_empty());
        assert!(Arc::ptr_eq(&batch.cells[0], &cells[0]));
    }

    #[test]
    fn test_deletes_for_sent_cells_only() {
        let deleted = vec![clean(4, "x;", 0), dirty(5, "y;", 3)];
        let batch = prepare(&[], &deleted, 2, usize::MAX, &NotebookConfig::default());
        assert_eq!(batch.commands, vec![CodeCommand::delete(CellId::new(4), 2)]);

        let config = NotebookConfig {
            delete_unsent_cells: true,
            ..NotebookConfig::default()
        };
        let batch = prepare(&[], &deleted, 2, usize::MAX, &config);
        assert_eq!(batch.commands.len(), 2);
    }
}
