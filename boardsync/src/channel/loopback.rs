//! Loopback channel for testing.
//!
//! Keeps everything in process: published move commands are recorded for
//! inspection, and events are injected by the test playing the server.
//! Clones share state, so a test can keep one handle while a session owns
//! another.

use std::collections::VecDeque;
use std::sync::Arc;

use boardsync_proto::{BoardId, TaskMoveRequest};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BoardChannel, ChannelError, ChannelEvent, ChannelStatus, SendStatus, Subscription};

const EVENT_BUFFER: usize = 256;

#[derive(Default)]
struct State {
    subscribed: Option<(BoardId, u64, mpsc::Sender<ChannelEvent>)>,
    generation: u64,
    sent: VecDeque<(BoardId, TaskMoveRequest)>,
    refuse_connect: bool,
    connects: usize,
}

/// In-process [`BoardChannel`] backed by `tokio::sync::mpsc`.
#[derive(Clone, Default)]
pub struct LoopbackChannel {
    state: Arc<Mutex<State>>,
}

impl LoopbackChannel {
    /// Creates an unconnected channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent connects fail with [`ChannelError::Unreachable`].
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connect = refuse;
    }

    /// Delivers `event` to the current subscription.
    ///
    /// Returns `false` if nothing is subscribed to the event's board.
    pub fn inject(&self, event: ChannelEvent) -> bool {
        let state = self.state.lock();
        match &state.subscribed {
            Some((board, _, tx)) if *board == event.board_id() => tx.try_send(event).is_ok(),
            _ => false,
        }
    }

    /// Simulates the connection dropping: the subscription gets
    /// [`ChannelEvent::Disconnected`] and further sends are refused.
    pub fn drop_connection(&self) {
        let taken = self.state.lock().subscribed.take();
        if let Some((board_id, _, tx)) = taken {
            let _ = tx.try_send(ChannelEvent::Disconnected { board_id });
        }
    }

    /// Drains the recorded move commands, oldest first.
    pub fn take_sent(&self) -> Vec<(BoardId, TaskMoveRequest)> {
        self.state.lock().sent.drain(..).collect()
    }

    /// Board currently subscribed, if any.
    #[must_use]
    pub fn subscribed_board(&self) -> Option<BoardId> {
        self.state.lock().subscribed.as_ref().map(|(b, _, _)| *b)
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }
}

impl BoardChannel for LoopbackChannel {
    async fn connect(&self, board_id: BoardId) -> Result<Subscription, ChannelError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let generation = {
            let mut state = self.state.lock();
            if state.refuse_connect {
                return Err(ChannelError::Unreachable("loopback".to_string()));
            }
            state.generation += 1;
            state.connects += 1;
            let generation = state.generation;
            state.subscribed = Some((board_id, generation, tx));
            generation
        };

        let shared = Arc::clone(&self.state);
        Ok(Subscription::new(board_id, rx, move || {
            let mut state = shared.lock();
            if state
                .subscribed
                .as_ref()
                .is_some_and(|(_, g, _)| *g == generation)
            {
                state.subscribed = None;
            }
        }))
    }

    fn send_move(&self, board_id: BoardId, command: &TaskMoveRequest) -> SendStatus {
        let mut state = self.state.lock();
        if state.subscribed.as_ref().is_some_and(|(b, _, _)| *b == board_id) {
            state.sent.push_back((board_id, command.clone()));
            SendStatus::Queued
        } else {
            SendStatus::NotConnected
        }
    }

    fn disconnect(&self) {
        self.state.lock().subscribed = None;
    }

    fn status(&self) -> ChannelStatus {
        if self.state.lock().subscribed.is_some() {
            ChannelStatus::Connected
        } else {
            ChannelStatus::Disconnected
        }
    }
}
