//! Wire protocol between the notebook and the evaluation session.
//!
//! Messages are JSON objects, one per line.

use cellsync_core::{CodeCommand, SessionEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;

/// Messages sent from the notebook to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// One command batch.
    Commands {
        /// Batch number, increasing by one per batch.
        batch: u64,
        commands: Vec<CodeCommand>,
    },
}

/// Messages sent from the session to the notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    /// An evaluation event.
    Event(SessionEvent),
}

/// Encode a message as one line of JSON, including the newline.
pub fn encode_line<T: Serialize>(message: &T) -> SessionResult<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line of JSON.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> SessionResult<T> {
    Ok(serde_json::from_str(line.trim())?)
}
