//! Async session runtime for cellsync notebooks.
//!
//! # Architecture
//!
//! - **Protocol**: JSON-lines messages exchanged with the evaluation session
//! - **Transport**: [`ChannelSession`] and the stream pumps around it
//! - **Driver**: the task that serializes edits and session events

pub mod driver;
pub mod error;
pub mod protocol;
pub mod transport;

pub use driver::{DriverConfig, DriverHandle, DriverInput, NotebookDriver};
pub use error::{SessionError, SessionResult};
pub use protocol::{Inbound, Outbound, decode_line, encode_line};
pub use transport::{ChannelSession, read_inbound, write_outbound};
