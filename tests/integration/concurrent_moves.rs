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

//! Integration tests for two users moving the same task at once.
//!
//! Two sessions open the demo board against a real relay. One moves a task
//! and waits for the echo; the other, still holding the old version, moves
//! the same task somewhere else. Both views must end up identical and free
//! of duplicates, whichever conflict policy the relay runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use boardsync::api::http::{DEFAULT_TIMEOUT, HttpBoardApi};
use boardsync::board::{BoardView, MoveOutcome, ReconcileOutcome, TargetIndex};
use boardsync::channel::relay::{RelayChannel, RelayChannelConfig};
use boardsync::session::{BoardSession, Session, SessionEvent, SessionOptions};
use boardsync_proto::{
    Board, BoardId, BoardMember, Column, ColumnId, Position, Role, Task, TaskId, UserId,
};
use boardsync_relay::relay::{RelayState, start_server_with_state};
use boardsync_relay::store::{BoardStore, ConflictPolicy, Seed};

type LiveSession = BoardSession<HttpBoardApi, RelayChannel>;

const BOARD: BoardId = BoardId::new(1);
const TODO: ColumnId = ColumnId::new(1);
const IN_PROGRESS: ColumnId = ColumnId::new(2);
const DONE: ColumnId = ColumnId::new(3);
const TASK: TaskId = TaskId::new(1);

async fn start_relay(policy: ConflictPolicy) -> SocketAddr {
    start_relay_with(BoardStore::demo(), policy).await
}

async fn start_relay_with(store: BoardStore, policy: ConflictPolicy) -> SocketAddr {
    let state = Arc::new(RelayState::with_config(store, 64 * 1024, policy));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .unwrap();
    addr
}

async fn open_session(addr: SocketAddr, user: i64) -> LiveSession {
    let api = HttpBoardApi::new(&format!("http://{addr}/api"), None, DEFAULT_TIMEOUT).unwrap();
    let mut channel = RelayChannelConfig::new(format!("ws://{addr}/ws"));
    channel.user_id = Some(UserId::new(user));
    let identity = Session {
        user_id: Some(UserId::new(user)),
        token: None,
    };
    let mut session = BoardSession::new(
        api,
        RelayChannel::new(channel),
        identity,
        SessionOptions::default(),
    );
    session.open(BOARD).await.unwrap();
    session
}

/// Collect events until `done` says stop, failing after five seconds.
async fn events_until(
    session: &mut LiveSession,
    mut done: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        while let Some(event) = session.next_event().await {
            let stop = done(&event);
            seen.push(event);
            if stop {
                break;
            }
        }
        seen
    })
    .await
    .expect("timed out waiting for session events")
}

fn reconciled(event: &SessionEvent, task: TaskId, version: u64, view: Option<&BoardView>) -> bool {
    matches!(event, SessionEvent::TaskReconciled { task_id, .. } if *task_id == task)
        && view.and_then(|v| v.task(task)).is_some_and(|t| t.version >= version)
}

fn layout(view: &BoardView) -> Vec<(ColumnId, Vec<TaskId>)> {
    view.columns()
        .iter()
        .map(|c| (c.id, view.tasks(c.id).iter().map(|t| t.id).collect()))
        .collect()
}

fn assert_no_duplicates(view: &BoardView) {
    let mut ids: Vec<TaskId> = view.task_ids().collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total, "task appears in more than one place");
}

#[tokio::test]
async fn rejected_conflict_converges_on_first_writer() {
    let addr = start_relay(ConflictPolicy::Reject).await;
    let mut alice = open_session(addr, 1).await;
    let mut bob = open_session(addr, 2).await;

    // Skip the initial "connected" notices.
    events_until(&mut alice, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;
    events_until(&mut bob, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;

    // Alice moves first and sees her own echo.
    let outcome = alice.move_task(TASK, IN_PROGRESS, TargetIndex::Top).unwrap();
    assert!(matches!(outcome, MoveOutcome::Applied(_)));
    let seen = events_until(&mut alice, |e| {
        matches!(e, SessionEvent::TaskReconciled { task_id, .. } if *task_id == TASK)
    })
    .await;
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::TaskReconciled {
            outcome: ReconcileOutcome::Confirmed,
            ..
        })
    ));

    // Bob still holds version 0 and moves the task elsewhere.
    bob.move_task(TASK, DONE, TargetIndex::End).unwrap();
    let seen = events_until(&mut bob, |e| matches!(e, SessionEvent::MoveRejected { .. })).await;
    assert!(
        seen.iter().any(|e| matches!(
            e,
            SessionEvent::TaskReconciled {
                outcome: ReconcileOutcome::ConflictResolved { .. },
                ..
            }
        )),
        "expected Bob's prediction to be overridden, got {seen:?}"
    );
    bob.poll_events();

    let alice_view = alice.view().unwrap();
    let bob_view = bob.view().unwrap();
    assert_eq!(alice_view.locate(TASK).unwrap().0, IN_PROGRESS);
    assert_eq!(layout(alice_view), layout(bob_view));
    assert_eq!(alice_view.task(TASK), bob_view.task(TASK));
    assert!(!bob_view.is_pending(TASK));
    assert_no_duplicates(alice_view);
    assert_no_duplicates(bob_view);
    assert_eq!(bob.stats().rejections, 1);
    assert_eq!(bob.stats().conflicts_resolved, 1);
}

#[tokio::test]
async fn rebased_conflict_converges_on_last_writer() {
    let addr = start_relay(ConflictPolicy::Rebase).await;
    let mut alice = open_session(addr, 1).await;
    let mut bob = open_session(addr, 2).await;
    events_until(&mut alice, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;
    events_until(&mut bob, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;

    alice.move_task(TASK, IN_PROGRESS, TargetIndex::Top).unwrap();
    events_until(&mut alice, |e| {
        matches!(e, SessionEvent::TaskReconciled { task_id, .. } if *task_id == TASK)
    })
    .await;

    // Bob's stale move is applied anyway and becomes version 2.
    bob.move_task(TASK, DONE, TargetIndex::End).unwrap();
    loop {
        let seen = events_until(&mut bob, |_| true).await;
        if seen.iter().any(|e| reconciled(e, TASK, 2, bob.view())) {
            break;
        }
    }
    loop {
        let seen = events_until(&mut alice, |_| true).await;
        if seen.iter().any(|e| reconciled(e, TASK, 2, alice.view())) {
            break;
        }
    }

    let alice_view = alice.view().unwrap();
    let bob_view = bob.view().unwrap();
    assert_eq!(alice_view.locate(TASK).unwrap().0, DONE);
    assert_eq!(alice_view.task(TASK).unwrap().version, 2);
    assert_eq!(layout(alice_view), layout(bob_view));
    assert_eq!(alice_view.task(TASK), bob_view.task(TASK));
    assert_no_duplicates(alice_view);
    assert_no_duplicates(bob_view);
    assert!(!alice_view.is_pending(TASK));
    assert!(!bob_view.is_pending(TASK));
}

#[tokio::test]
async fn reorder_within_column_reaches_other_viewer() {
    let addr = start_relay(ConflictPolicy::Reject).await;
    let mut alice = open_session(addr, 1).await;
    let mut bob = open_session(addr, 2).await;
    events_until(&mut alice, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;
    events_until(&mut bob, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;

    // Task 2 jumps ahead of task 1 in "To Do".
    alice
        .move_task(TaskId::new(2), TODO, TargetIndex::Top)
        .unwrap();
    assert_eq!(
        layout(alice.view().unwrap())[0],
        (TODO, vec![TaskId::new(2), TaskId::new(1)])
    );

    events_until(&mut bob, |e| {
        matches!(e, SessionEvent::TaskReconciled { task_id, .. } if *task_id == TaskId::new(2))
    })
    .await;
    assert_eq!(
        layout(bob.view().unwrap())[0],
        (TODO, vec![TaskId::new(2), TaskId::new(1)])
    );
}

/// The demo layout, but with positions that have no short binary form.
fn fractional_store() -> BoardStore {
    let owner = UserId::new(1);
    let board = Board {
        id: BOARD,
        name: "Fractions".to_string(),
        owner_id: Some(owner),
        members: vec![BoardMember {
            user_id: owner,
            username: None,
            role: Role::Owner,
        }],
    };
    let columns = [TODO, IN_PROGRESS, DONE]
        .into_iter()
        .zip(0_i32..)
        .map(|(id, position)| Column {
            id,
            board_id: BOARD,
            title: format!("c{id}"),
            position,
        })
        .collect();
    let tasks = [
        (1, TODO, 0.0),
        (2, TODO, 1.0 / 3.0),
        (3, IN_PROGRESS, 0.1),
        (4, DONE, 0.7),
        (5, DONE, 1.9),
    ]
    .into_iter()
    .map(|(id, column, position)| {
        Task::new(TaskId::new(id), column, format!("t{id}"), Position::new(position), 0)
    })
    .collect();
    BoardStore::from_seed(Seed {
        boards: vec![board],
        columns,
        tasks,
    })
}

#[tokio::test]
async fn fractional_midpoints_are_confirmed_exactly() {
    let addr = start_relay_with(fractional_store(), ConflictPolicy::Reject).await;
    let mut alice = open_session(addr, 1).await;
    let mut bob = open_session(addr, 2).await;
    events_until(&mut alice, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;
    events_until(&mut bob, |e| matches!(e, SessionEvent::ChannelStatus(_))).await;

    // Each move lands between two neighbours derived from 0 and 1/3.
    for (task, index) in [(3, 1), (4, 2), (5, 1)] {
        let task = TaskId::new(task);
        let MoveOutcome::Applied(command) = alice.move_task(task, TODO, TargetIndex::At(index)).unwrap()
        else {
            panic!("expected task {task} to move");
        };
        assert_eq!(alice.view().unwrap().locate(task), Some((TODO, index)));

        let seen = events_until(&mut alice, |e| {
            matches!(e, SessionEvent::TaskReconciled { task_id, .. } if *task_id == task)
        })
        .await;
        assert_eq!(
            seen.last(),
            Some(&SessionEvent::TaskReconciled {
                task_id: task,
                outcome: ReconcileOutcome::Confirmed,
            }),
            "echo of {} was not recognised",
            command.new_position
        );
        let held = alice.view().unwrap().task(task).unwrap().position;
        assert_eq!(held.value().to_bits(), command.new_position.value().to_bits());

        events_until(&mut bob, |e| {
            matches!(e, SessionEvent::TaskReconciled { task_id, .. } if *task_id == task)
        })
        .await;
        assert_eq!(bob.view().unwrap().task(task), alice.view().unwrap().task(task));
    }

    let alice_view = alice.view().unwrap();
    assert_eq!(
        layout(alice_view)[0],
        (
            TODO,
            [1, 5, 3, 4, 2].into_iter().map(TaskId::new).collect::<Vec<_>>()
        )
    );
    assert_eq!(layout(alice_view), layout(bob.view().unwrap()));
    assert_eq!(alice_view.pending_count(), 0);
    assert_eq!(alice.stats().moves_confirmed, 3);
    assert_eq!(alice.stats().conflicts_resolved, 0);
}
