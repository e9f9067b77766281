//! Document aggregation: derive the published state from the live cells.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellId, CellStatus};
use crate::parser::ParseIssue;
use crate::reconcile::CellIndex;
use crate::vars::VarTable;

/// One visual overlay element for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoration {
    /// Status shading for one line of a cell.
    Line {
        line: usize,
        cell: CellId,
        status: CellStatus,
        has_errors: bool,
    },
    /// Output view anchored after the cell's last character.
    Block {
        pos: usize,
        line: usize,
        cell: Arc<Cell>,
    },
}

impl Decoration {
    pub fn cell_id(&self) -> CellId {
        match self {
            Decoration::Line { cell, .. } => *cell,
            Decoration::Block { cell, .. } => cell.id,
        }
    }
}

/// Point-in-time view of a notebook.
#[derive(Debug, Clone, Default)]
pub struct DocState {
    pub cells: Vec<Arc<Cell>>,
    pub var_table: Arc<VarTable>,
    pub doc_version: u64,
    pub parse_tree_current: bool,
    pub has_parse_errors: bool,
    pub parse_errors: Vec<ParseIssue>,
    /// Any cell not clean, or a deletion the session has not been told about.
    pub has_dirty_cells: bool,
    /// Overlays of every cell, in document order.
    pub decorations: Vec<Decoration>,
    /// Position of each cell in `cells` by id.
    pub index: CellIndex,
}

impl DocState {
    pub fn cell(&self, id: CellId) -> Option<&Arc<Cell>> {
        self.index.position(id).map(|position| &self.cells[position])
    }
}

/// Inputs to one aggregation besides the cells.
#[derive(Debug, Clone, Copy)]
pub struct DocMeta<'a> {
    pub var_table: &'a Arc<VarTable>,
    pub doc_version: u64,
    pub parse_tree_current: bool,
    pub parse_errors: &'a [ParseIssue],
    pub pending_deletes: bool,
}

fn decorate(cell: &Arc<Cell>) -> Vec<Decoration> {
    let has_errors = cell.has_errors();
    let mut out: Vec<Decoration> = (cell.from_line..=cell.to_line)
        .map(|line| Decoration::Line {
            line,
            cell: cell.id,
            status: cell.status,
            has_errors,
        })
        .collect();

    if cell.has_output() {
        out.push(Decoration::Block {
            pos: cell.to,
            line: cell.to_line,
            cell: Arc::clone(cell),
        });
    }
    out
}

/// Recomputes [`DocState`] on every cycle, reusing the overlays of
/// snapshots that did not change.
#[derive(Debug, Default)]
pub struct Aggregator {
    cache: FxHashMap<CellId, (Arc<Cell>, Vec<Decoration>)>,
    reused: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many cell overlays were taken from the cache so far.
    pub fn reused(&self) -> u64 {
        self.reused
    }

    pub fn derive(&mut self, cells: &[Arc<Cell>], meta: DocMeta<'_>) -> DocState {
        let mut next = FxHashMap::default();
        let mut decorations = Vec::new();

        for cell in cells {
            let overlay = match self.cache.remove(&cell.id) {
                Some((cached, overlay)) if Arc::ptr_eq(&cached, cell) => {
                    self.reused += 1;
                    overlay
                }
                _ => decorate(cell),
            };
            decorations.extend(overlay.iter().cloned());
            next.insert(cell.id, (Arc::clone(cell), overlay));
        }
        self.cache = next;

        let has_dirty_cells =
            meta.pending_deletes || cells.iter().any(|cell| !cell.status.is_clean());

        DocState {
            cells: cells.to_vec(),
            var_table: Arc::clone(meta.var_table),
            doc_version: meta.doc_version,
            parse_tree_current: meta.parse_tree_current,
            has_parse_errors: !meta.parse_errors.is_empty(),
            parse_errors: meta.parse_errors.to_vec(),
            has_dirty_cells,
            decorations,
            index: CellIndex::build(cells),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Region, StreamKind};

    fn cell(id: usize, code: &str, lines: (usize, usize)) -> Arc<Cell> {
        Cell::create(
            CellId::new(id),
            Region::new(0, code.len(), lines.0, lines.1),
            code.to_string(),
            1,
        )
        .unwrap()
    }

    fn meta(vars: &Arc<VarTable>) -> DocMeta<'_> {
        DocMeta {
            var_table: vars,
            doc_version: 1,
            parse_tree_current: true,
            parse_errors: &[],
            pending_deletes: false,
        }
    }

    #[test]
    fn test_line_decorations_per_line() {
        let vars = Arc::new(VarTable::new());
        let state = Aggregator::new().derive(&[cell(0, "a\nb", (1, 2))], meta(&vars));

        assert_eq!(state.decorations.len(), 2);
        assert!(matches!(
            state.decorations[1],
            Decoration::Line { line: 2, status: CellStatus::CodeDirty, .. }
        ));
        assert!(state.has_dirty_cells);
    }

    #[test]
    fn test_block_only_with_output() {
        let vars = Arc::new(VarTable::new());
        let with_output = cell(0, "1+1", (1, 1))
            .patch()
            .push_console(StreamKind::Stdout, "2".to_string())
            .build();
        let state = Aggregator::new().derive(&[with_output], meta(&vars));

        let blocks = state
            .decorations
            .iter()
            .filter(|d| matches!(d, Decoration::Block { .. }))
            .count();
        assert_eq!(blocks, 1);
    }

    #[test]
    fn test_clean_cells_not_dirty() {
        let vars = Arc::new(VarTable::new());
        let clean = cell(0, "1", (1, 1))
            .patch()
            .sent(1)
            .status(CellStatus::CodeClean)
            .build();
        let mut aggregator = Aggregator::new();

        assert!(!aggregator.derive(&[clean.clone()], meta(&vars)).has_dirty_cells);

        let mut pending = meta(&vars);
        pending.pending_deletes = true;
        assert!(aggregator.derive(&[clean], pending).has_dirty_cells);
    }

    #[test]
    fn test_cell_lookup_by_id() {
        let vars = Arc::new(VarTable::new());
        let state = Aggregator::new().derive(&[cell(4, "a", (1, 1)), cell(9, "b", (2, 2))], meta(&vars));

        assert_eq!(state.cell(CellId::new(9)).unwrap().doc_code, "b");
        assert!(state.cell(CellId::new(5)).is_none());
    }

    #[test]
    fn test_reused_snapshot_skips_recompute() {
        let vars = Arc::new(VarTable::new());
        let a = cell(0, "a", (1, 1));
        let b = cell(1, "b", (2, 2));
        let mut aggregator = Aggregator::new();

        aggregator.derive(&[a.clone(), b.clone()], meta(&vars));
        assert_eq!(aggregator.reused(), 0);

        let b2 = b.patch().status(CellStatus::CodePending).build();
        let state = aggregator.derive(&[a, b2], meta(&vars));
        assert_eq!(aggregator.reused(), 1);
        assert!(matches!(
            state.decorations[1],
            Decoration::Line { status: CellStatus::CodePending, .. }
        ));
    }
}
