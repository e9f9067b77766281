//! Driver behavior over a channel session.

use std::time::Duration;

use cellsync_core::{
    CellStatus, ChangeSet, CommandKind, Notebook, NotebookConfig, SessionEvent, StatementParser,
};
use cellsync_session::{
    ChannelSession, DriverConfig, NotebookDriver, Outbound, read_inbound,
};
use tokio::io::BufReader;
use tokio::time::Instant;

fn notebook(text: &str) -> Notebook {
    Notebook::with_text(StatementParser::new(), NotebookConfig::default(), text).unwrap()
}

fn commands(message: Outbound) -> Vec<cellsync_core::CodeCommand> {
    let Outbound::Commands { commands, .. } = message;
    commands
}

#[tokio::test(start_paused = true)]
async fn test_edits_are_debounced_into_one_batch() {
    let (session, mut outbound) = ChannelSession::channel();
    let (driver, handle) = NotebookDriver::new(notebook(""), session, DriverConfig::default());
    let task = tokio::spawn(driver.run());

    let start = Instant::now();
    handle.edit(ChangeSet::insert(0, "1+", 0).unwrap()).await.unwrap();
    handle.edit(ChangeSet::insert(2, "1", 2).unwrap()).await.unwrap();

    let batch = commands(outbound.recv().await.unwrap());
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].kind, CommandKind::Add);
    assert_eq!(batch[0].code.as_deref(), Some("1+1"));

    handle.shutdown().await.unwrap();
    let nb = task.await.unwrap().unwrap();
    assert_eq!(nb.text(), "1+1");
    assert!(outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_flush_sends_immediately() {
    let (session, mut outbound) = ChannelSession::channel();
    let config = DriverConfig {
        sync_debounce: Duration::from_secs(60),
        ..DriverConfig::default()
    };
    let (driver, handle) = NotebookDriver::new(notebook(""), session, config);
    let task = tokio::spawn(driver.run());

    let start = Instant::now();
    handle.edit(ChangeSet::insert(0, "let a = 1;", 0).unwrap()).await.unwrap();
    handle.flush().await.unwrap();

    let batch = commands(outbound.recv().await.unwrap());
    assert_eq!(batch.len(), 1);
    assert!(start.elapsed() < Duration::from_secs(60));

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_events_update_published_state() {
    let (session, mut outbound) = ChannelSession::channel();
    let (driver, handle) = NotebookDriver::new(notebook("1+1"), session, DriverConfig::default());
    let mut state = handle.subscribe();
    let task = tokio::spawn(driver.run());

    handle.flush().await.unwrap();
    let batch = commands(outbound.recv().await.unwrap());
    let id = batch[0].line_id;

    handle
        .event(SessionEvent::EvalStart { line_id: id, version: 1 })
        .await
        .unwrap();
    handle
        .event(SessionEvent::EvalComplete {
            line_id: id,
            version: 1,
            output_version: 1,
        })
        .await
        .unwrap();

    let clean = state
        .wait_for(|s| s.cells.first().is_some_and(|c| c.status == CellStatus::CodeClean))
        .await
        .unwrap()
        .clone();
    assert!(!clean.has_dirty_cells);
    assert_eq!(handle.state().doc_version, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_send_is_retried() {
    let (session, outbound) = ChannelSession::channel();
    drop(outbound);
    let (driver, handle) = NotebookDriver::new(notebook("1+1"), session, DriverConfig::default());
    let task = tokio::spawn(driver.run());

    handle.flush().await.unwrap();
    handle.retry().await.unwrap();
    handle.shutdown().await.unwrap();

    let nb = task.await.unwrap().unwrap();
    // The channel is still closed, so the retried batch failed again.
    assert!(nb.has_failed_batches());
    assert_eq!(nb.cells()[0].status, CellStatus::CodePending);
}

#[tokio::test]
async fn test_inbound_lines_reach_the_driver() {
    let (session, mut outbound) = ChannelSession::channel();
    let (driver, handle) = NotebookDriver::new(notebook("1+1"), session, DriverConfig::default());
    let task = tokio::spawn(driver.run());

    handle.flush().await.unwrap();
    let id = commands(outbound.recv().await.unwrap())[0].line_id;

    let input = format!(
        "{}\n\nnot json\n{}\n",
        serde_json::json!({"kind": "event", "type": "eval_start", "line_id": id, "version": 1}),
        serde_json::json!({
            "kind": "event",
            "type": "console_output",
            "line_id": id,
            "version": 1,
            "stream": "stdout",
            "text": "2"
        }),
    );
    let forwarded = read_inbound(BufReader::new(input.as_bytes()), handle.clone())
        .await
        .unwrap();
    assert_eq!(forwarded, 2);

    handle.shutdown().await.unwrap();
    let nb = task.await.unwrap().unwrap();
    let cell = &nb.cells()[0];
    assert_eq!(cell.status, CellStatus::ValuePending);
    assert_eq!(cell.console_lines[0].text, "2");
}

#[tokio::test]
async fn test_dropping_handles_stops_driver() {
    let (session, _outbound) = ChannelSession::channel();
    let (driver, handle) = NotebookDriver::new(notebook(""), session, DriverConfig::default());
    let task = tokio::spawn(driver.run());

    drop(handle);
    let nb = task.await.unwrap().unwrap();
    assert!(nb.cells().is_empty());
}
