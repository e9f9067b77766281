//! Segment command implementation.
//!
//! Prints one line per cell: id, line range and the first line of code.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use cellsync_core::{Notebook, NotebookConfig, StatementParser};

/// Execute the segment command.
pub fn execute(path: &str) -> anyhow::Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let stdout = std::io::stdout();
    write_cells(&text, &mut stdout.lock())
}

fn write_cells(text: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let notebook = Notebook::with_text(StatementParser::new(), NotebookConfig::default(), text)?;
    let state = notebook.state();

    for cell in &state.cells {
        let first = cell.doc_code.lines().next().unwrap_or_default();
        let lines = if cell.from_line == cell.to_line {
            cell.from_line.to_string()
        } else {
            format!("{}-{}", cell.from_line, cell.to_line)
        };
        writeln!(out, "{:<8} {:<8} {}", cell.id.to_string(), lines, first)?;
    }

    for issue in &state.parse_errors {
        writeln!(out, "error    {}:{}  {}", issue.line, issue.column, issue.message)?;
    }

    Ok(())
}
