//! Replay command implementation.
//!
//! Runs a script of edits, syncs and session events against a notebook
//! backed by a recording session. Every batch sent is printed as one
//! protocol line, followed by a JSON summary of the final state.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use cellsync_core::{
    Cell, ChangeSet, EventOutcome, Notebook, NotebookConfig, ParseIssue, RecordingSession,
    SessionEvent, StatementParser, VarTable,
};
use cellsync_session::{Outbound, encode_line};
use serde::{Deserialize, Serialize};

/// Flags of the replay command.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub deferred_parse: bool,
    pub delete_unsent: bool,
    pub fail_sends: usize,
}

impl ReplayOptions {
    fn notebook_config(&self) -> NotebookConfig {
        NotebookConfig {
            reparse_on_edit: !self.deferred_parse,
            delete_unsent_cells: self.delete_unsent,
        }
    }
}

/// One step of a replay script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    Edit {
        from: usize,
        to: usize,
        #[serde(default)]
        insert: String,
    },
    Load {
        text: String,
    },
    Sync,
    Reparse,
    Retry,
    Event(SessionEvent),
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    doc_version: u64,
    text: &'a str,
    parse_tree_current: bool,
    has_parse_errors: bool,
    parse_errors: &'a [ParseIssue],
    has_dirty_cells: bool,
    failed_batches: bool,
    dropped_events: usize,
    cells: Vec<&'a Cell>,
    vars: &'a VarTable,
}

/// Execute the replay command.
pub fn execute(script_path: &str, options: &ReplayOptions) -> anyhow::Result<()> {
    let path = Path::new(script_path);
    if !path.exists() {
        anyhow::bail!("Script not found: {}", script_path);
    }
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let stdout = std::io::stdout();
    run(&script, options, &mut stdout.lock())
}

fn run(script: &str, options: &ReplayOptions, out: &mut impl Write) -> anyhow::Result<()> {
    let steps: Vec<Step> = serde_json::from_str(script).context("invalid replay script")?;

    let mut notebook = Notebook::new(StatementParser::new(), options.notebook_config());
    let mut session = RecordingSession::failing(options.fail_sends);
    let mut batch = 0u64;
    let mut dropped = 0;

    for (index, step) in steps.into_iter().enumerate() {
        match step {
            Step::Edit { from, to, insert } => {
                let changes = ChangeSet::replace(from, to, insert, notebook.text().len())
                    .with_context(|| format!("step {}: bad edit", index))?;
                let outcome = notebook
                    .edit(&changes)
                    .with_context(|| format!("step {}: edit failed", index))?;
                tracing::debug!(step = index, ?outcome, "Applied edit");
            }
            Step::Load { text } => {
                notebook.load(&text)?;
            }
            Step::Reparse => {
                let outcome = notebook.reparse()?;
                tracing::debug!(step = index, ?outcome, "Reparsed");
            }
            Step::Retry => {
                let remarked = notebook.retry_failed();
                tracing::debug!(step = index, remarked, "Retried failed batches");
            }
            Step::Sync => match notebook.sync(&mut session) {
                Ok(0) => {}
                Ok(_) => {
                    let commands = session.last_batch().unwrap_or_default().to_vec();
                    let line = encode_line(&Outbound::Commands { batch, commands })?;
                    out.write_all(line.as_bytes())?;
                    batch += 1;
                }
                Err(e) => tracing::warn!("Step {}: {}", index, e),
            },
            Step::Event(event) => {
                let outcome = notebook.apply_event(&event);
                if let EventOutcome::Dropped { reason } = outcome {
                    tracing::debug!(step = index, ?reason, "Event dropped");
                    dropped += 1;
                }
            }
        }
    }

    let state = notebook.state();
    let summary = Summary {
        doc_version: state.doc_version,
        text: notebook.text(),
        parse_tree_current: state.parse_tree_current,
        has_parse_errors: state.has_parse_errors,
        parse_errors: &state.parse_errors,
        has_dirty_cells: state.has_dirty_cells,
        failed_batches: notebook.has_failed_batches(),
        dropped_events: dropped,
        cells: state.cells.iter().map(|cell| cell.as_ref()).collect(),
        vars: &state.var_table,
    };
    writeln!(out, "{}", serde_json::to_string(&summary)?)?;

    Ok(())
}
