//! Segmentation: reconcile a new set of cell regions with the previous cells.
//!
//! Previous cells are matched to regions by structural continuity: each
//! previous cell's range is carried through the edit's change set and
//! claimed by the first new region it overlaps. Content is only compared
//! afterwards, to tell a remap from an update.
//!
//! - When one previous cell overlaps several regions (a split), the
//!   leftmost region keeps its id and the others are created fresh.
//! - When several previous cells overlap one region (a merge), the
//!   leftmost previous cell keeps its id and the others are deleted.

use std::sync::Arc;

use serde::Serialize;

use crate::cell::{Cell, CellId, CellIdAllocator, Region};
use crate::change::{Assoc, ChangeSet};
use crate::error::{Error, Result};
use crate::parser::{LineIndex, SyntaxTree};

/// What happened to one surviving cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "id", rename_all = "snake_case")]
pub enum CellAction {
    /// Same snapshot kept.
    Reuse(CellId),
    /// Moved without a code change.
    Remap(CellId),
    /// Code changed; the cell is dirty again.
    Update(CellId),
    /// A region with no previous counterpart.
    Create(CellId),
}

impl CellAction {
    pub fn id(&self) -> CellId {
        match self {
            CellAction::Reuse(id)
            | CellAction::Remap(id)
            | CellAction::Update(id)
            | CellAction::Create(id) => *id,
        }
    }
}

/// Result of reconciling the cell list with an edit.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    /// Surviving and new cells, in document order.
    pub cells: Vec<Arc<Cell>>,
    /// One action per entry of `cells`, in the same order.
    pub actions: Vec<CellAction>,
    /// Previous cells with no counterpart; they still need a `delete` command.
    pub deleted: Vec<Arc<Cell>>,
}

/// Range of a previous cell after the edit.
fn mapped_range(cell: &Cell, changes: &ChangeSet) -> (usize, usize) {
    let from = changes.map_pos(cell.from, Assoc::After);
    let to = changes.map_pos(cell.to, Assoc::Before);
    if from > to { (to, to) } else { (from, to) }
}

fn overlaps(region: &Region, (from, to): (usize, usize)) -> bool {
    if from == to {
        region.from < from && from < region.to
    } else {
        region.overlaps(from, to)
    }
}

fn slice<'a>(text: &'a str, region: &Region) -> Result<&'a str> {
    text.get(region.from..region.to).ok_or_else(|| Error::MalformedCell {
        id: None,
        message: format!(
            "region {}..{} does not fit a document of {} bytes",
            region.from,
            region.to,
            text.len()
        ),
    })
}

/// Carry one previous cell over to `region`.
fn carry_over(
    prev: &Arc<Cell>,
    region: Region,
    code: &str,
    code_untouched: bool,
    doc_version: u64,
) -> (Arc<Cell>, CellAction) {
    let same_code = code_untouched || prev.doc_code == code;
    if same_code && prev.region() == region {
        (Arc::clone(prev), CellAction::Reuse(prev.id))
    } else if same_code {
        (prev.patch().region(region).build(), CellAction::Remap(prev.id))
    } else {
        (
            prev.patch().region(region).code(code.to_string(), doc_version).build(),
            CellAction::Update(prev.id),
        )
    }
}

/// Reconcile `prev` with the regions of a freshly parsed tree.
///
/// `changes` is the edit that turned the previous document into `text`;
/// `doc_version` is the version of `text`.
pub fn segment(
    prev: &[Arc<Cell>],
    tree: &SyntaxTree,
    text: &str,
    changes: &ChangeSet,
    doc_version: u64,
    ids: &mut CellIdAllocator,
) -> Result<Segmentation> {
    let mapped: Vec<(usize, usize)> = prev.iter().map(|c| mapped_range(c, changes)).collect();
    let mut claimed = vec![false; prev.len()];
    let mut cursor = 0;
    let mut out = Segmentation::default();

    let mut last_end = 0;
    for region in &tree.regions {
        if region.from < last_end || region.from > region.to {
            return Err(Error::MalformedCell {
                id: None,
                message: format!(
                    "region {}..{} is out of order or inverted",
                    region.from, region.to
                ),
            });
        }
        last_end = region.to;

        let code = slice(text, region)?;

        // Previous cells that ended before this region can no longer be claimed.
        while cursor < prev.len()
            && !overlaps(region, mapped[cursor])
            && mapped[cursor].1 <= region.from
        {
            cursor += 1;
        }

        let candidate = (cursor..prev.len())
            .take_while(|&j| mapped[j].0 < region.to || overlaps(region, mapped[j]))
            .find(|&j| !claimed[j] && overlaps(region, mapped[j]));

        match candidate {
            Some(j) => {
                claimed[j] = true;
                cursor = j + 1;
                let untouched = !changes.touches(prev[j].from, prev[j].to)
                    && mapped[j] == (region.from, region.to);
                let (cell, action) = carry_over(&prev[j], *region, code, untouched, doc_version);
                out.cells.push(cell);
                out.actions.push(action);
            }
            None => {
                let id = ids.allocate();
                let cell = Cell::create(id, *region, code.to_string(), doc_version)?;
                out.cells.push(cell);
                out.actions.push(CellAction::Create(id));
            }
        }
    }

    out.deleted = prev
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(cell, _)| Arc::clone(cell))
        .collect();

    tracing::debug!(
        cells = out.cells.len(),
        deleted = out.deleted.len(),
        doc_version,
        "Segmented document"
    );

    Ok(out)
}

/// Carry previous cells through an edit without a parse tree.
///
/// Used while the document does not parse or before a deferred reparse:
/// boundaries are the previous ones moved through `changes`. A cell whose
/// whole range was removed is deleted.
pub fn remap_cells(
    prev: &[Arc<Cell>],
    text: &str,
    changes: &ChangeSet,
    doc_version: u64,
) -> Result<Segmentation> {
    let index = LineIndex::new(text);
    let mut out = Segmentation::default();

    for cell in prev {
        let (from, to) = mapped_range(cell, changes);
        if from == to && cell.from != cell.to {
            out.deleted.push(Arc::clone(cell));
            continue;
        }

        let region = Region::new(from, to, index.line_of(from), index.line_of(to));
        let code = slice(text, &region)?;
        let untouched = !changes.touches(cell.from, cell.to);
        let (cell, action) = carry_over(cell, region, code, untouched, doc_version);
        out.cells.push(cell);
        out.actions.push(action);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellStatus;
    use crate::change::Change;
    use crate::parser::{CellParser, StatementParser};

    /// Segment `text` from scratch.
    fn initial(text: &str, ids: &mut CellIdAllocator) -> Vec<Arc<Cell>> {
        let tree = StatementParser::new().parse(text);
        segment(&[], &tree, text, &ChangeSet::insert(0, text, 0).unwrap(), 1, ids)
            .unwrap()
            .cells
    }

    fn edit(
        prev: &[Arc<Cell>],
        old: &str,
        changes: Vec<Change>,
        version: u64,
        ids: &mut CellIdAllocator,
    ) -> (String, Segmentation) {
        let changes = ChangeSet::new(changes, old.len()).unwrap();
        let text = changes.apply(old).unwrap();
        let tree = StatementParser::new().parse(&text);
        let seg = segment(prev, &tree, &text, &changes, version, ids).unwrap();
        (text, seg)
    }

    #[test]
    fn test_initial_segmentation_creates_cells() {
        let mut ids = CellIdAllocator::new();
        let cells = initial("let a = 1;\nlet b = 2;", &mut ids);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].id, CellId::new(0));
        assert_eq!(cells[1].id, CellId::new(1));
        assert!(cells.iter().all(|c| c.status == CellStatus::CodeDirty));
    }

    #[test]
    fn test_position_shift_is_remap() {
        let mut ids = CellIdAllocator::new();
        let old = "let a = 1;\nlet b = 2;";
        let cells = initial(old, &mut ids);

        let (_, seg) = edit(&cells, old, vec![Change::new(0, 0, "\n\n")], 2, &mut ids);
        assert_eq!(
            seg.actions,
            vec![CellAction::Remap(CellId::new(0)), CellAction::Remap(CellId::new(1))]
        );
        assert_eq!(seg.cells[0].from, 2);
        assert_eq!(seg.cells[0].from_line, 3);
        assert_eq!(seg.cells[1].doc_version, 1);
        assert!(seg.deleted.is_empty());
    }

    #[test]
    fn test_untouched_cell_is_reused() {
        let mut ids = CellIdAllocator::new();
        let old = "let a = 1;\nlet b = 2;";
        let cells = initial(old, &mut ids);

        let (_, seg) = edit(&cells, old, vec![Change::new(19, 20, "3")], 2, &mut ids);
        assert_eq!(seg.actions[0], CellAction::Reuse(CellId::new(0)));
        assert!(Arc::ptr_eq(&seg.cells[0], &cells[0]));
        assert_eq!(seg.actions[1], CellAction::Update(CellId::new(1)));
        assert_eq!(seg.cells[1].doc_code, "let b = 3;");
        assert_eq!(seg.cells[1].doc_version, 2);
    }

    #[test]
    fn test_new_statement_is_created() {
        let mut ids = CellIdAllocator::new();
        let old = "let a = 1;";
        let cells = initial(old, &mut ids);

        let (_, seg) = edit(&cells, old, vec![Change::new(10, 10, "\nlet b = a;")], 2, &mut ids);
        assert_eq!(
            seg.actions,
            vec![CellAction::Reuse(CellId::new(0)), CellAction::Create(CellId::new(1))]
        );
    }

    #[test]
    fn test_removed_statement_is_deleted() {
        let mut ids = CellIdAllocator::new();
        let old = "let a = 1;\nlet b = 2;\nlet c = 3;";
        let cells = initial(old, &mut ids);

        let (_, seg) = edit(&cells, old, vec![Change::new(10, 21, "")], 2, &mut ids);
        assert_eq!(seg.cells.len(), 2);
        assert_eq!(seg.cells[1].id, CellId::new(2));
        assert_eq!(seg.deleted.len(), 1);
        assert_eq!(seg.deleted[0].id, CellId::new(1));
    }

    #[test]
    fn test_merge_keeps_leftmost_id() {
        let mut ids = CellIdAllocator::new();
        let old = "a;\nb;";
        let cells = initial(old, &mut ids);
        assert_eq!(cells.len(), 2);

        // "a;\nb;" -> "a +\nb;"
        let (text, seg) = edit(&cells, old, vec![Change::new(1, 2, " +")], 2, &mut ids);
        assert_eq!(text, "a +\nb;");
        assert_eq!(seg.actions, vec![CellAction::Update(CellId::new(0))]);
        assert_eq!(seg.cells[0].doc_code, "a +\nb;");
        assert_eq!(seg.deleted.len(), 1);
        assert_eq!(seg.deleted[0].id, CellId::new(1));
    }

    #[test]
    fn test_split_keeps_id_on_first_region() {
        let mut ids = CellIdAllocator::new();
        let old = "a - b;";
        let cells = initial(old, &mut ids);

        // "a - b;" -> "a;\n- b;"
        let (text, seg) = edit(&cells, old, vec![Change::new(1, 2, ";\n")], 2, &mut ids);
        assert_eq!(text, "a;\n- b;");
        assert_eq!(
            seg.actions,
            vec![CellAction::Update(CellId::new(0)), CellAction::Create(CellId::new(1))]
        );
        assert_eq!(seg.cells[0].doc_code, "a;");
        assert_eq!(seg.cells[1].doc_code, "- b;");
        assert!(seg.deleted.is_empty());
    }

    #[test]
    fn test_explicit_tree_regions() {
        let mut ids = CellIdAllocator::new();
        let text = "aaa bbb";
        let tree = SyntaxTree::from_regions(vec![Region::new(0, 3, 1, 1), Region::new(4, 7, 1, 1)]);
        let seg = segment(&[], &tree, text, &ChangeSet::insert(0, text, 0).unwrap(), 1, &mut ids)
            .unwrap();
        assert_eq!(seg.cells[1].doc_code, "bbb");
    }

    #[test]
    fn test_rejects_overlapping_regions() {
        let mut ids = CellIdAllocator::new();
        let text = "aaa bbb";
        let tree = SyntaxTree::from_regions(vec![Region::new(0, 5, 1, 1), Region::new(4, 7, 1, 1)]);
        let result = segment(&[], &tree, text, &ChangeSet::empty(7), 1, &mut ids);
        assert!(result.is_err());
    }

    #[test]
    fn test_remap_cells_without_tree() {
        let mut ids = CellIdAllocator::new();
        let old = "let a = 1;\nlet b = 2;\nlet c = 3;";
        let cells = initial(old, &mut ids);

        // Break the second statement and delete the third one entirely.
        let changes = ChangeSet::new(
            vec![Change::new(19, 20, ""), Change::new(22, 32, "")],
            old.len(),
        )
        .unwrap();
        let text = changes.apply(old).unwrap();
        let seg = remap_cells(&cells, &text, &changes, 2).unwrap();

        assert_eq!(seg.actions[0], CellAction::Reuse(CellId::new(0)));
        assert_eq!(seg.actions[1], CellAction::Update(CellId::new(1)));
        assert_eq!(seg.cells[1].doc_code, "let b = ;");
        assert_eq!(seg.deleted.len(), 1);
        assert_eq!(seg.deleted[0].id, CellId::new(2));
    }
}
