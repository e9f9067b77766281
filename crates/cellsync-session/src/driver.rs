//! The notebook driver task.
//!
//! Edits and session events arrive on one channel and are applied to the
//! [`Notebook`] strictly in arrival order. After each input the driver
//! publishes the notebook's state through a watch channel, so readers
//! always see a consistent snapshot.

use std::sync::Arc;
use std::time::Duration;

use cellsync_core::{ChangeSet, DocState, EvalSession, Notebook, SessionEvent};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{SessionError, SessionResult};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Capacity of the input channel.
    pub channel_capacity: usize,
    /// Quiet period after an edit before the command batch is sent.
    pub sync_debounce: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            sync_debounce: Duration::from_millis(200),
        }
    }
}

/// Input to the driver task.
#[derive(Debug, Clone)]
pub enum DriverInput {
    /// An edit transaction against the current text.
    Edit(ChangeSet),
    /// An event from the evaluation session.
    Event(SessionEvent),
    /// Send outstanding commands now.
    Flush,
    /// Re-mark cells of failed batches and send again.
    Retry,
    /// Stop the driver.
    Shutdown,
}

/// Cloneable handle for feeding the driver and reading its state.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<DriverInput>,
    state: watch::Receiver<Arc<DocState>>,
}

impl DriverHandle {
    async fn send(&self, input: DriverInput) -> SessionResult<()> {
        self.tx
            .send(input)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn edit(&self, changes: ChangeSet) -> SessionResult<()> {
        self.send(DriverInput::Edit(changes)).await
    }

    pub async fn event(&self, event: SessionEvent) -> SessionResult<()> {
        self.send(DriverInput::Event(event)).await
    }

    pub async fn flush(&self) -> SessionResult<()> {
        self.send(DriverInput::Flush).await
    }

    pub async fn retry(&self) -> SessionResult<()> {
        self.send(DriverInput::Retry).await
    }

    pub async fn shutdown(&self) -> SessionResult<()> {
        self.send(DriverInput::Shutdown).await
    }

    /// The most recently published state.
    pub fn state(&self) -> Arc<DocState> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DocState>> {
        self.state.clone()
    }
}

/// Owns a notebook and its session and serializes all access to them.
pub struct NotebookDriver {
    notebook: Notebook,
    session: Box<dyn EvalSession + Send>,
    rx: mpsc::Receiver<DriverInput>,
    state_tx: watch::Sender<Arc<DocState>>,
    config: DriverConfig,
}

impl NotebookDriver {
    /// Create a driver and the handle that feeds it.
    pub fn new(
        notebook: Notebook,
        session: impl EvalSession + Send + 'static,
        config: DriverConfig,
    ) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (state_tx, state) = watch::channel(notebook.state());

        let driver = Self {
            notebook,
            session: Box::new(session),
            rx,
            state_tx,
            config,
        };
        (driver, DriverHandle { tx, state })
    }

    /// Process inputs until shutdown or until every handle is dropped.
    ///
    /// Returns the notebook in its final state.
    pub async fn run(mut self) -> SessionResult<Notebook> {
        let mut deadline: Option<Instant> = None;

        loop {
            let input = match deadline {
                Some(at) => {
                    tokio::select! {
                        input = self.rx.recv() => input,
                        _ = tokio::time::sleep_until(at) => {
                            deadline = None;
                            self.sync();
                            self.publish();
                            continue;
                        }
                    }
                }
                None => self.rx.recv().await,
            };

            let Some(input) = input else {
                tracing::debug!("All driver handles dropped");
                break;
            };

            match input {
                DriverInput::Edit(changes) => match self.notebook.edit(&changes) {
                    Ok(outcome) => {
                        tracing::debug!(
                            doc_version = outcome.doc_version,
                            deleted = outcome.deleted.len(),
                            "Applied edit"
                        );
                        deadline = Some(Instant::now() + self.config.sync_debounce);
                    }
                    Err(e) => tracing::warn!("Rejected edit: {}", e),
                },
                DriverInput::Event(event) => {
                    self.notebook.apply_event(&event);
                    // A pending debounce will sync soon enough.
                    if deadline.is_none() {
                        self.sync();
                    }
                }
                DriverInput::Flush => {
                    deadline = None;
                    self.sync();
                }
                DriverInput::Retry => {
                    self.notebook.retry_failed();
                    deadline = None;
                    self.sync();
                }
                DriverInput::Shutdown => {
                    if deadline.is_some() {
                        self.sync();
                    }
                    self.publish();
                    break;
                }
            }

            self.publish();
        }

        Ok(self.notebook)
    }

    fn sync(&mut self) {
        match self.notebook.sync(self.session.as_mut()) {
            Ok(0) => {}
            Ok(count) => tracing::debug!(commands = count, "Synced notebook"),
            Err(e) => tracing::warn!("Sync failed, cells stay pending until retried: {}", e),
        }
    }

    fn publish(&self) {
        let state = self.notebook.state();
        let unchanged = Arc::ptr_eq(&self.state_tx.borrow(), &state);
        if !unchanged {
            self.state_tx.send_replace(state);
        }
    }
}
