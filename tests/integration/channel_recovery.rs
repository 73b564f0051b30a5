// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for losing and regaining the realtime channel.
//!
//! The relay drops every connection; the session must report the loss,
//! keep accepting local moves without publishing them, and come back to
//! the authoritative state on resync.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use boardsync::api::http::{DEFAULT_TIMEOUT, HttpBoardApi};
use boardsync::board::TargetIndex;
use boardsync::channel::ChannelStatus;
use boardsync::channel::relay::{RelayChannel, RelayChannelConfig};
use boardsync::session::{BoardSession, Session, SessionEvent, SessionOptions};
use boardsync_proto::{BoardId, ColumnId, TaskId};
use boardsync_relay::relay::{RelayState, start_server_with_state};

type LiveSession = BoardSession<HttpBoardApi, RelayChannel>;

const BOARD: BoardId = BoardId::new(1);
const TODO: ColumnId = ColumnId::new(1);
const DONE: ColumnId = ColumnId::new(3);

async fn start_relay() -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

async fn open_session(addr: SocketAddr) -> LiveSession {
    let api = HttpBoardApi::new(&format!("http://{addr}/api"), None, DEFAULT_TIMEOUT).unwrap();
    let channel = RelayChannel::new(RelayChannelConfig::new(format!("ws://{addr}/ws")));
    let mut session = BoardSession::new(api, channel, Session::default(), SessionOptions::default());
    session.open(BOARD).await.unwrap();
    assert_eq!(
        next(&mut session).await,
        SessionEvent::ChannelStatus(ChannelStatus::Connected)
    );
    session
}

async fn next(session: &mut LiveSession) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .expect("timed out waiting for a session event")
        .expect("session stream ended")
}

async fn wait_for_sessions(state: &RelayState, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.session_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay session count never settled");
}

#[tokio::test]
async fn relay_close_is_reported_as_disconnect() {
    let (addr, state) = start_relay().await;
    let mut session = open_session(addr).await;

    state.close_all_connections().await;
    assert_eq!(
        next(&mut session).await,
        SessionEvent::ChannelStatus(ChannelStatus::Disconnected)
    );
    assert_eq!(session.channel_status(), ChannelStatus::Disconnected);
    // The board stays on screen.
    assert_eq!(session.view().unwrap().task_count(), 4);
}

#[tokio::test]
async fn moves_while_down_are_local_until_resync() {
    let (addr, state) = start_relay().await;
    let mut session = open_session(addr).await;

    state.close_all_connections().await;
    next(&mut session).await;

    session
        .move_task(TaskId::new(1), DONE, TargetIndex::Top)
        .unwrap();
    assert_eq!(
        session.view().unwrap().locate(TaskId::new(1)),
        Some((DONE, 0))
    );
    assert!(session.view().unwrap().is_pending(TaskId::new(1)));
    assert_eq!(session.stats().moves_dropped, 1);

    // The move never left this client, so the service still has it in To Do.
    session.resync().await.unwrap();
    assert_eq!(session.channel_status(), ChannelStatus::Connected);
    let view = session.view().unwrap();
    assert_eq!(view.locate(TaskId::new(1)), Some((TODO, 0)));
    assert_eq!(view.pending_count(), 0);
}

#[tokio::test]
async fn resync_picks_up_changes_made_while_down() {
    let (addr, state) = start_relay().await;
    let mut watcher = open_session(addr).await;
    let mut mover = open_session(addr).await;
    wait_for_sessions(&state, 2).await;

    // Only the watcher is cut off: close everything, then bring the mover
    // back before it changes the board.
    state.close_all_connections().await;
    assert_eq!(
        next(&mut watcher).await,
        SessionEvent::ChannelStatus(ChannelStatus::Disconnected)
    );
    assert_eq!(
        next(&mut mover).await,
        SessionEvent::ChannelStatus(ChannelStatus::Disconnected)
    );
    mover.resync().await.unwrap();
    mover
        .move_task(TaskId::new(2), DONE, TargetIndex::End)
        .unwrap();
    loop {
        if let SessionEvent::TaskReconciled { task_id, .. } = next(&mut mover).await
            && task_id == TaskId::new(2)
        {
            break;
        }
    }

    assert_eq!(watcher.view().unwrap().locate(TaskId::new(2)), Some((TODO, 1)));
    watcher.resync().await.unwrap();
    assert_eq!(
        watcher.view().unwrap().locate(TaskId::new(2)).map(|(c, _)| c),
        Some(DONE)
    );
    assert_eq!(
        watcher.view().unwrap().task(TaskId::new(2)).unwrap().version,
        1
    );
}
