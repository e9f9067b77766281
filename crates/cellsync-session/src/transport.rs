//! Transport between the driver and the evaluation session process.

use cellsync_core::{CodeCommand, EvalSession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::driver::DriverHandle;
use crate::error::SessionResult;
use crate::protocol::{Inbound, Outbound, decode_line, encode_line};

/// [`EvalSession`] that hands batches to an unbounded channel.
///
/// Submitting never blocks; it only fails once the receiving side is gone.
#[derive(Debug)]
pub struct ChannelSession {
    tx: mpsc::UnboundedSender<Outbound>,
    next_batch: u64,
}

impl ChannelSession {
    /// Create a session and the receiver its batches arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, next_batch: 0 }, rx)
    }

    /// Number of batches handed to the channel so far.
    pub fn batches_sent(&self) -> u64 {
        self.next_batch
    }
}

impl EvalSession for ChannelSession {
    fn submit(&mut self, commands: Vec<CodeCommand>) -> cellsync_core::Result<()> {
        let count = commands.len();
        let message = Outbound::Commands {
            batch: self.next_batch,
            commands,
        };
        self.tx
            .send(message)
            .map_err(|_| cellsync_core::Error::Send {
                commands: count,
                message: "session channel closed".to_string(),
            })?;
        self.next_batch += 1;
        Ok(())
    }
}

/// Write every outbound message to `writer` as JSON lines until the channel closes.
pub async fn write_outbound<W>(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut writer: W,
) -> SessionResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let line = encode_line(&message)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Read JSON-line events from `reader` and forward them to the driver.
///
/// Lines that do not decode are logged and skipped. Returns the number
/// of events forwarded once the reader reaches end of input.
pub async fn read_inbound<R>(reader: R, handle: DriverHandle) -> SessionResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line::<Inbound>(&line) {
            Ok(Inbound::Event(event)) => {
                handle.event(event).await?;
                forwarded += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping malformed session message: {}", e);
            }
        }
    }

    Ok(forwarded)
}
