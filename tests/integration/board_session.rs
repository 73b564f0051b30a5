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

//! Integration tests for the board session against a live relay and REST
//! service: loading, CRUD, and propagation of CRUD results to other viewers.

use std::net::SocketAddr;
use std::time::Duration;

use boardsync::api::http::{DEFAULT_TIMEOUT, HttpBoardApi};
use boardsync::board::{ReconcileOutcome, TargetIndex};
use boardsync::channel::ChannelStatus;
use boardsync::channel::relay::{RelayChannel, RelayChannelConfig};
use boardsync::session::{
    BoardSession, Session, SessionError, SessionEvent, SessionOptions, SessionPhase, TaskPatch,
};
use boardsync_proto::{BoardId, ColumnId, CreateTaskRequest, Priority, TaskId, UserId};
use boardsync_relay::relay::start_server;

type LiveSession = BoardSession<HttpBoardApi, RelayChannel>;

const BOARD: BoardId = BoardId::new(1);
const TODO: ColumnId = ColumnId::new(1);
const IN_PROGRESS: ColumnId = ColumnId::new(2);

async fn start_relay() -> SocketAddr {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    addr
}

fn new_session(api_addr: SocketAddr, relay_url: String) -> LiveSession {
    let api =
        HttpBoardApi::new(&format!("http://{api_addr}/api"), None, DEFAULT_TIMEOUT).unwrap();
    let mut channel = RelayChannelConfig::new(relay_url);
    channel.connect_timeout = Duration::from_secs(2);
    BoardSession::new(
        api,
        RelayChannel::new(channel),
        Session {
            user_id: Some(UserId::new(1)),
            token: None,
        },
        SessionOptions::default(),
    )
}

async fn next(session: &mut LiveSession) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .expect("timed out waiting for a session event")
        .expect("session stream ended")
}

#[tokio::test]
async fn open_loads_demo_board_and_goes_live() {
    let addr = start_relay().await;
    let mut session = new_session(addr, format!("ws://{addr}/ws"));
    session.open(BOARD).await.unwrap();

    assert_eq!(session.phase(), SessionPhase::Loaded);
    assert_eq!(session.channel_status(), ChannelStatus::Connected);
    let view = session.view().unwrap();
    assert_eq!(view.board().name, "Demo board");
    assert_eq!(view.columns().len(), 3);
    assert_eq!(view.task_count(), 4);
    assert_eq!(
        view.tasks(TODO).iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![TaskId::new(1), TaskId::new(2)]
    );
    assert_eq!(
        next(&mut session).await,
        SessionEvent::ChannelStatus(ChannelStatus::Connected)
    );
}

#[tokio::test]
async fn unknown_board_fails_to_load() {
    let addr = start_relay().await;
    let mut session = new_session(addr, format!("ws://{addr}/ws"));
    let err = session.open(BoardId::new(404)).await.unwrap_err();

    match err {
        SessionError::LoadFailure(e) => assert_eq!(e.status(), Some(404)),
        other => panic!("expected LoadFailure, got {other:?}"),
    }
    assert_eq!(session.phase(), SessionPhase::Unloaded);
    assert!(session.view().is_none());
    assert!(matches!(
        session.move_task(TaskId::new(1), TODO, TargetIndex::End),
        Err(SessionError::NotLoaded)
    ));
}

#[tokio::test]
async fn board_stays_usable_without_the_relay() {
    let addr = start_relay().await;
    // Nothing listens on this port once the listener is dropped.
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("ws://{}/ws", dead.local_addr().unwrap());
    drop(dead);

    let mut session = new_session(addr, dead_url);
    session.open(BOARD).await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Loaded);
    assert_eq!(session.channel_status(), ChannelStatus::Disconnected);

    session
        .move_task(TaskId::new(4), IN_PROGRESS, TargetIndex::Top)
        .unwrap();
    assert_eq!(
        session.view().unwrap().locate(TaskId::new(4)),
        Some((IN_PROGRESS, 0))
    );
    assert_eq!(session.stats().moves_dropped, 1);
    assert_eq!(session.stats().moves_sent, 0);
}

#[tokio::test]
async fn created_task_reaches_other_viewer() {
    let addr = start_relay().await;
    let mut alice = new_session(addr, format!("ws://{addr}/ws"));
    let mut bob = new_session(addr, format!("ws://{addr}/ws"));
    alice.open(BOARD).await.unwrap();
    bob.open(BOARD).await.unwrap();
    assert_eq!(
        next(&mut bob).await,
        SessionEvent::ChannelStatus(ChannelStatus::Connected)
    );

    let mut request = CreateTaskRequest::new(IN_PROGRESS, "Write migration guide");
    request.priority = Priority::High;
    let created = alice.create_task(request).await.unwrap();
    assert_eq!(
        alice.view().unwrap().tasks(IN_PROGRESS).last().map(|t| t.id),
        Some(created.id)
    );

    assert_eq!(
        next(&mut bob).await,
        SessionEvent::TaskReconciled {
            task_id: created.id,
            outcome: ReconcileOutcome::Applied,
        }
    );
    let seen = bob.view().unwrap().task(created.id).unwrap();
    assert_eq!(seen.title, "Write migration guide");
    assert_eq!(seen.priority, Priority::High);
}

#[tokio::test]
async fn edit_and_delete_round_trip() {
    let addr = start_relay().await;
    let mut session = new_session(addr, format!("ws://{addr}/ws"));
    session.open(BOARD).await.unwrap();

    let patch = TaskPatch {
        title: Some("Draft release notes for 0.2".to_string()),
        description: Some(Some("include the sync changes".to_string())),
        ..TaskPatch::default()
    };
    let updated = session.update_task(TaskId::new(1), &patch).await.unwrap();
    assert_eq!(updated.version, 1);
    let held = session.view().unwrap().task(TaskId::new(1)).unwrap();
    assert_eq!(held.title, "Draft release notes for 0.2");
    assert_eq!(held.description.as_deref(), Some("include the sync changes"));
    // Untouched fields survive the full-replacement update.
    assert_eq!(held.priority, Priority::Medium);

    session.delete_task(TaskId::new(1)).await.unwrap();
    assert!(session.view().unwrap().task(TaskId::new(1)).is_none());

    // The service no longer has it either.
    session.resync().await.unwrap();
    assert!(session.view().unwrap().task(TaskId::new(1)).is_none());
    assert_eq!(session.view().unwrap().task_count(), 3);
}

#[tokio::test]
async fn blank_title_is_refused_before_any_request() {
    let addr = start_relay().await;
    let mut session = new_session(addr, format!("ws://{addr}/ws"));
    session.open(BOARD).await.unwrap();

    let err = session
        .create_task(CreateTaskRequest::new(TODO, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.view().unwrap().tasks(TODO).len(), 2);
}
