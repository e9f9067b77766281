//! Output reconciliation: apply one session event to the cell it belongs to.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellId, CellStatus, ErrorInfo, Plot};
use crate::event::{DropReason, SessionEvent};
use crate::vars::VarTable;
use crate::version::Freshness;

/// Position of every live cell by id. Rebuilt whenever the cell list changes shape.
#[derive(Debug, Clone, Default)]
pub struct CellIndex {
    positions: FxHashMap<CellId, usize>,
}

impl CellIndex {
    pub fn build(cells: &[Arc<Cell>]) -> Self {
        let positions = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| (cell.id, i))
            .collect();
        Self { positions }
    }

    pub fn position(&self, id: CellId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The replacement an event calls for.
#[derive(Debug, Clone)]
pub enum Reconciled {
    /// Replace the cell at `position`.
    Cell { position: usize, cell: Arc<Cell> },
    /// Replace the variable table, and the producing cell when it is live.
    Vars {
        table: VarTable,
        producer: Option<(usize, Arc<Cell>)>,
    },
    Dropped(DropReason),
}

/// Check an event's command version against the cell.
///
/// Events only apply to the evaluation of the code the cell last sent,
/// and only while the cell has not been edited since.
fn check_version(cell: &Cell, version: u64) -> Result<(), DropReason> {
    match Freshness::of(version, cell.model_version) {
        Freshness::Current if cell.status == CellStatus::CodeDirty => {
            Err(DropReason::SupersededCode)
        }
        Freshness::Current => Ok(()),
        Freshness::Stale | Freshness::Ahead => Err(DropReason::StaleVersion),
    }
}

/// Work out what `event` changes, without mutating anything.
pub fn reconcile(
    cells: &[Arc<Cell>],
    index: &CellIndex,
    vars: &VarTable,
    event: &SessionEvent,
) -> Reconciled {
    if let SessionEvent::EnvUpdate { .. } = event {
        return reconcile_vars(cells, index, vars, event);
    }

    let (Some(line_id), Some(version)) = (event.line_id(), event.version()) else {
        return Reconciled::Dropped(DropReason::UnknownCell);
    };
    let Some(position) = index.position(line_id) else {
        return Reconciled::Dropped(DropReason::UnknownCell);
    };
    let cell = &cells[position];

    if let Err(reason) = check_version(cell, version) {
        return Reconciled::Dropped(reason);
    }

    let next = match event {
        SessionEvent::EvalStart { .. } => cell
            .patch()
            .status(CellStatus::ValuePending)
            .clear_outputs()
            .build(),
        SessionEvent::ConsoleOutput { stream, text, .. } => {
            cell.patch().push_console(*stream, text.clone()).build()
        }
        SessionEvent::PlotOutput { data, .. } => {
            cell.patch().push_plot(Plot { data: data.clone() }).build()
        }
        SessionEvent::ErrorOutput {
            line,
            column,
            message,
            ..
        } => cell
            .patch()
            .push_error(ErrorInfo {
                line: *line,
                column: *column,
                message: message.clone(),
            })
            .build(),
        SessionEvent::EvalComplete { output_version, .. } => {
            match Freshness::of(*output_version, Some(cell.output_version)) {
                Freshness::Stale => return Reconciled::Dropped(DropReason::StaleVersion),
                Freshness::Current if cell.status == CellStatus::CodeClean => {
                    return Reconciled::Dropped(DropReason::Duplicate);
                }
                _ => cell
                    .patch()
                    .status(CellStatus::CodeClean)
                    .output_version(*output_version)
                    .build(),
            }
        }
        SessionEvent::EnvUpdate { .. } => return reconcile_vars(cells, index, vars, event),
    };

    Reconciled::Cell {
        position,
        cell: next,
    }
}

fn reconcile_vars(
    cells: &[Arc<Cell>],
    index: &CellIndex,
    vars: &VarTable,
    event: &SessionEvent,
) -> Reconciled {
    let Some((diff, version)) = event.var_diff() else {
        return Reconciled::Dropped(DropReason::UnknownCell);
    };

    let Some(table) = vars.apply(&diff, version) else {
        let reason = if vars.version == Some(version) {
            DropReason::Duplicate
        } else {
            DropReason::StaleVersion
        };
        return Reconciled::Dropped(reason);
    };

    let producer = index.position(version.line_id).and_then(|position| {
        let cell = &cells[position];
        if cell.status == CellStatus::CodeDirty {
            return None;
        }
        let next = cell
            .patch()
            .bind_vars(diff.adds.iter(), diff.drops.iter(), version)
            .build();
        Some((position, next))
    });

    Reconciled::Vars { table, producer }
}
