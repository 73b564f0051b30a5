//! Board session controller.
//!
//! [`BoardSession`] owns the [`BoardView`] for one board at a time and is
//! the only thing that mutates it. It loads the board through a
//! [`BoardApi`], subscribes to live updates through a [`BoardChannel`],
//! routes user moves through the optimistic mutator and routes every
//! authoritative record through the reconciliation engine.
//!
//! Lifecycle: `Unloaded -> Loading -> Loaded <-> Reconciling -> TornDown`.
//! A failed load goes back to `Unloaded`; nothing partial is kept.

use std::collections::VecDeque;
use std::fmt;

use boardsync_proto::relay::{MoveRefusal, RefusalKind};
use boardsync_proto::{
    BoardId, ColumnId, CreateTaskRequest, MAX_TASK_TITLE_LENGTH, Priority, Role, Task, TaskId,
    UserId,
};
use chrono::NaiveDateTime;
use futures_util::future::try_join_all;

use crate::api::{ApiError, BoardApi};
use crate::board::{
    BoardError, BoardView, MoveOutcome, PlacementPolicy, ReconcileOutcome, TargetIndex,
    apply_local_move, apply_remote, remove_task, revert_move,
};
use crate::channel::{BoardChannel, ChannelEvent, ChannelStatus, SendStatus, Subscription};

/// Who is using the board.
///
/// Passed explicitly to the controller and the CRUD client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Current user, when known. Used for role checks.
    pub user_id: Option<UserId>,
    /// Bearer token for the CRUD service.
    pub token: Option<String>,
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No board is loaded.
    Unloaded,
    /// A board load is in progress.
    Loading,
    /// A board is loaded and accepting operations.
    Loaded,
    /// An authoritative record is being merged.
    Reconciling,
    /// The session was closed.
    TornDown,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Reconciling => "reconciling",
            Self::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Tunables for a [`BoardSession`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// How moves compute their new position.
    pub placement: PlacementPolicy,
}

/// Counters describing what the session has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Newer authoritative records applied.
    pub updates_applied: u64,
    /// Pending moves confirmed as predicted.
    pub moves_confirmed: u64,
    /// Pending moves superseded by a different authoritative state.
    pub conflicts_resolved: u64,
    /// Records discarded as not newer than the held version.
    pub stale_discarded: u64,
    /// Records that moved a task out of the view.
    pub out_of_view: u64,
    /// Move commands handed to the channel.
    pub moves_sent: u64,
    /// Move commands dropped because the channel was down.
    pub moves_dropped: u64,
    /// Command errors reported by the relay.
    pub rejections: u64,
    /// Pending moves undone after the relay refused them.
    pub moves_rolled_back: u64,
}

impl SyncStats {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Applied => self.updates_applied += 1,
            ReconcileOutcome::Confirmed => self.moves_confirmed += 1,
            ReconcileOutcome::ConflictResolved { .. } => self.conflicts_resolved += 1,
            ReconcileOutcome::Stale { .. } => self.stale_discarded += 1,
            ReconcileOutcome::OutOfView => self.out_of_view += 1,
        }
    }
}

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An authoritative record was processed.
    TaskReconciled {
        /// Task the record was for.
        task_id: TaskId,
        /// What happened to it.
        outcome: ReconcileOutcome,
    },
    /// The relay refused one of our commands.
    MoveRejected {
        /// Task whose move was refused, when the relay named one.
        task_id: Option<TaskId>,
        /// Reason given by the relay.
        reason: String,
    },
    /// The realtime channel went up or down.
    ChannelStatus(ChannelStatus),
}

/// Partial edit of a task's display fields.
///
/// `None` leaves a field as it is; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New assignee.
    pub assigned_to_id: Option<Option<UserId>>,
    /// New due date.
    pub due_date: Option<Option<NaiveDateTime>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New card color.
    pub color: Option<Option<String>>,
}

impl TaskPatch {
    /// Merges the patch onto `task`, producing the full replacement body.
    #[must_use]
    pub fn apply_to(&self, task: &Task) -> CreateTaskRequest {
        CreateTaskRequest {
            title: self.title.clone().unwrap_or_else(|| task.title.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| task.description.clone()),
            column_id: task.column_id,
            assigned_to_id: self.assigned_to_id.unwrap_or(task.assigned_to_id),
            due_date: self.due_date.unwrap_or(task.due_date),
            priority: self.priority.unwrap_or(task.priority),
            color: self.color.clone().unwrap_or_else(|| task.color.clone()),
        }
    }
}

/// Errors surfaced by [`BoardSession`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The task or column is not in the current view.
    #[error(transparent)]
    NotFoundLocal(#[from] BoardError),

    /// The board could not be loaded.
    #[error("failed to load board: {0}")]
    LoadFailure(#[source] ApiError),

    /// The CRUD service refused or failed a request.
    #[error("board service request failed: {0}")]
    Crud(#[source] ApiError),

    /// The request is malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The current user may not change this board.
    #[error("role {0:?} cannot edit this board")]
    ReadOnly(Role),

    /// No board is loaded.
    #[error("no board loaded")]
    NotLoaded,
}

/// Controller for the board currently on screen.
pub struct BoardSession<A, C> {
    api: A,
    channel: C,
    identity: Session,
    options: SessionOptions,
    phase: SessionPhase,
    view: Option<BoardView>,
    subscription: Option<Subscription>,
    status: ChannelStatus,
    queued: VecDeque<SessionEvent>,
    stats: SyncStats,
}

impl<A: BoardApi, C: BoardChannel> BoardSession<A, C> {
    /// Creates an unloaded session.
    pub fn new(api: A, channel: C, identity: Session, options: SessionOptions) -> Self {
        Self {
            api,
            channel,
            identity,
            options,
            phase: SessionPhase::Unloaded,
            view: None,
            subscription: None,
            status: ChannelStatus::Disconnected,
            queued: VecDeque::new(),
            stats: SyncStats::default(),
        }
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The loaded board, if any.
    pub const fn view(&self) -> Option<&BoardView> {
        self.view.as_ref()
    }

    /// Id of the loaded board, if any.
    pub fn board_id(&self) -> Option<BoardId> {
        self.view.as_ref().map(BoardView::board_id)
    }

    /// Last known realtime channel state.
    pub const fn channel_status(&self) -> ChannelStatus {
        self.status
    }

    /// Counters accumulated since the session was created.
    pub const fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Identity the session acts as.
    pub const fn identity(&self) -> &Session {
        &self.identity
    }

    /// Placement policy used for moves.
    pub const fn options(&self) -> SessionOptions {
        self.options
    }

    /// Loads `board_id` and subscribes to its updates.
    ///
    /// Any board already open is torn down first. The channel is only
    /// connected once the board is fully loaded; a channel failure leaves
    /// the board loaded without live updates and queues a
    /// [`SessionEvent::ChannelStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoadFailure`] if any fetch fails. The session
    /// is then `Unloaded` and holds no board.
    pub async fn open(&mut self, board_id: BoardId) -> Result<(), SessionError> {
        self.release();
        self.phase = SessionPhase::Loading;
        tracing::info!(board_id = %board_id, "loading board");

        let view = match load_view(&self.api, board_id).await {
            Ok(view) => view,
            Err(e) => {
                self.phase = SessionPhase::Unloaded;
                tracing::warn!(board_id = %board_id, err = %e, "board load failed");
                return Err(SessionError::LoadFailure(e));
            }
        };
        tracing::info!(
            board_id = %board_id,
            columns = view.columns().len(),
            tasks = view.task_count(),
            "board loaded"
        );
        self.view = Some(view);
        self.phase = SessionPhase::Loaded;
        self.subscribe(board_id).await;
        Ok(())
    }

    /// Reloads the current board and re-opens the subscription.
    ///
    /// Pending marks are dropped: the reloaded state is authoritative. On
    /// failure the previous view is kept and the channel stays down.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotLoaded`] without a board and
    /// [`SessionError::LoadFailure`] if the reload fails.
    pub async fn resync(&mut self) -> Result<(), SessionError> {
        let board_id = self.board_id().ok_or(SessionError::NotLoaded)?;
        self.drop_subscription();
        self.phase = SessionPhase::Loading;
        tracing::info!(board_id = %board_id, "resyncing board");

        match load_view(&self.api, board_id).await {
            Ok(view) => {
                self.view = Some(view);
                self.phase = SessionPhase::Loaded;
                self.subscribe(board_id).await;
                Ok(())
            }
            Err(e) => {
                self.phase = SessionPhase::Loaded;
                tracing::warn!(board_id = %board_id, err = %e, "resync failed");
                Err(SessionError::LoadFailure(e))
            }
        }
    }

    /// Tears the session down: unsubscribes and forgets the board.
    pub fn close(&mut self) {
        if let Some(board_id) = self.board_id() {
            tracing::info!(board_id = %board_id, "closing board");
        }
        self.release();
        self.phase = SessionPhase::TornDown;
    }

    /// Moves a task optimistically and publishes the move.
    ///
    /// Returns immediately; confirmation arrives later as an event. When
    /// the channel is down the move stays applied locally but is not
    /// published, and is counted in [`SyncStats::moves_dropped`].
    ///
    /// # Errors
    ///
    /// Fails without side effects when no board is loaded, the user cannot
    /// edit, the task or column is not in view, or no position fits.
    pub fn move_task(
        &mut self,
        task_id: TaskId,
        dest_column: ColumnId,
        target: TargetIndex,
    ) -> Result<MoveOutcome, SessionError> {
        self.ensure_editable()?;
        let policy = self.options.placement;
        let view = self.view.as_mut().ok_or(SessionError::NotLoaded)?;
        let board_id = view.board_id();

        let outcome = apply_local_move(view, task_id, dest_column, target, policy)?;
        if let MoveOutcome::Applied(command) = &outcome {
            match self.channel.send_move(board_id, command) {
                SendStatus::Queued => self.stats.moves_sent += 1,
                SendStatus::NotConnected => {
                    self.stats.moves_dropped += 1;
                    tracing::warn!(
                        board_id = %board_id,
                        task_id = %task_id,
                        "channel down, move applied locally only"
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Creates a task through the CRUD service and merges the result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for a bad title,
    /// [`SessionError::NotFoundLocal`] if the column is not in view and
    /// [`SessionError::Crud`] if the service fails.
    pub async fn create_task(&mut self, request: CreateTaskRequest) -> Result<Task, SessionError> {
        self.ensure_editable()?;
        validate_title(&request.title)?;
        let view = self.view.as_ref().ok_or(SessionError::NotLoaded)?;
        if !view.has_column(request.column_id) {
            return Err(BoardError::ColumnNotFound(request.column_id).into());
        }
        let board_id = view.board_id();

        let task = self
            .api
            .create_task(&request)
            .await
            .map_err(SessionError::Crud)?;
        self.absorb(board_id, task.clone());
        Ok(task)
    }

    /// Edits a task's display fields through the CRUD service.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFoundLocal`] if the task is not in view,
    /// [`SessionError::Validation`] for a bad title and
    /// [`SessionError::Crud`] if the service fails.
    pub async fn update_task(&mut self, id: TaskId, patch: &TaskPatch) -> Result<Task, SessionError> {
        self.ensure_editable()?;
        let view = self.view.as_ref().ok_or(SessionError::NotLoaded)?;
        let held = view.task(id).ok_or(BoardError::TaskNotFound(id))?;
        let request = patch.apply_to(held);
        let board_id = view.board_id();
        validate_title(&request.title)?;

        let task = self
            .api
            .update_task(id, &request)
            .await
            .map_err(SessionError::Crud)?;
        self.absorb(board_id, task.clone());
        Ok(task)
    }

    /// Deletes a task through the CRUD service, then drops it from view.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFoundLocal`] if the task is not in view
    /// and [`SessionError::Crud`] if the service fails.
    pub async fn delete_task(&mut self, id: TaskId) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let view = self.view.as_ref().ok_or(SessionError::NotLoaded)?;
        if view.task(id).is_none() {
            return Err(BoardError::TaskNotFound(id).into());
        }
        let board_id = view.board_id();

        self.api.delete_task(id).await.map_err(SessionError::Crud)?;
        if let Some(view) = self.view.as_mut()
            && view.board_id() == board_id
        {
            remove_task(view, id);
        }
        Ok(())
    }

    /// Processes one channel event.
    ///
    /// Events for another board, or arriving while nothing is loaded, are
    /// dropped and yield `None`.
    pub fn handle_event(&mut self, event: ChannelEvent) -> Option<SessionEvent> {
        let Some(view) = self.view.as_mut() else {
            tracing::debug!(?event, "event with no board loaded, dropping");
            return None;
        };
        if event.board_id() != view.board_id() {
            tracing::debug!(
                expected = %view.board_id(),
                got = %event.board_id(),
                "event for another board, dropping"
            );
            return None;
        }

        match event {
            ChannelEvent::TaskUpdated { task, .. } => {
                self.phase = SessionPhase::Reconciling;
                let task_id = task.id;
                let outcome = apply_remote(view, task);
                self.stats.record(outcome);
                self.phase = SessionPhase::Loaded;
                Some(SessionEvent::TaskReconciled { task_id, outcome })
            }
            ChannelEvent::Rejected {
                reason, refusal, ..
            } => {
                self.stats.rejections += 1;
                tracing::warn!(reason = %reason, "relay rejected command");
                if let Some(refusal) = refusal
                    && roll_back(view, refusal)
                {
                    self.stats.moves_rolled_back += 1;
                }
                Some(SessionEvent::MoveRejected {
                    task_id: refusal.map(|r| r.task_id),
                    reason,
                })
            }
            ChannelEvent::Disconnected { board_id } => {
                tracing::warn!(board_id = %board_id, "realtime channel lost");
                self.subscription = None;
                self.status = ChannelStatus::Disconnected;
                Some(SessionEvent::ChannelStatus(ChannelStatus::Disconnected))
            }
        }
    }

    /// Waits for the next session event.
    ///
    /// Returns `None` once there is no subscription and nothing queued.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            let subscription = self.subscription.as_mut()?;
            match subscription.recv().await {
                Some(event) => {
                    if let Some(out) = self.handle_event(event) {
                        return Some(out);
                    }
                }
                None => {
                    self.subscription = None;
                    self.status = ChannelStatus::Disconnected;
                    return Some(SessionEvent::ChannelStatus(ChannelStatus::Disconnected));
                }
            }
        }
    }

    /// Processes everything already buffered without waiting.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut out: Vec<SessionEvent> = self.queued.drain(..).collect();
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            out.extend(self.handle_event(event));
        }
        out
    }

    async fn subscribe(&mut self, board_id: BoardId) {
        match self.channel.connect(board_id).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.status = ChannelStatus::Connected;
            }
            Err(e) => {
                tracing::warn!(board_id = %board_id, err = %e, "realtime channel unavailable");
                self.status = ChannelStatus::Disconnected;
            }
        }
        self.queued
            .push_back(SessionEvent::ChannelStatus(self.status));
    }

    fn drop_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.channel.disconnect();
        self.status = ChannelStatus::Disconnected;
    }

    fn release(&mut self) {
        self.drop_subscription();
        self.view = None;
        self.queued.clear();
        self.phase = SessionPhase::Unloaded;
    }

    fn absorb(&mut self, board_id: BoardId, task: Task) {
        match self.view.as_mut() {
            Some(view) if view.board_id() == board_id => {
                let outcome = apply_remote(view, task);
                self.stats.record(outcome);
            }
            _ => tracing::debug!(board_id = %board_id, "board changed, discarding result"),
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        let view = self.view.as_ref().ok_or(SessionError::NotLoaded)?;
        if let Some(user) = self.identity.user_id
            && let Some(role) = view.board().role_of(user)
            && !role.can_edit()
        {
            return Err(SessionError::ReadOnly(role));
        }
        Ok(())
    }
}

impl<A, C> fmt::Debug for BoardSession<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardSession")
            .field("phase", &self.phase)
            .field("board_id", &self.view.as_ref().map(BoardView::board_id))
            .field("status", &self.status)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Undoes the optimistic state behind a refused move. A task the relay no
/// longer has is dropped from view; anything else goes back to its last
/// authoritative place. Returns whether a pending move was undone.
fn roll_back(view: &mut BoardView, refusal: MoveRefusal) -> bool {
    if !view.is_pending(refusal.task_id) {
        return false;
    }
    match refusal.kind {
        RefusalKind::TaskNotFound => remove_task(view, refusal.task_id).is_some(),
        RefusalKind::Conflict | RefusalKind::ColumnNotFound | RefusalKind::Invalid => {
            revert_move(view, refusal.task_id)
        }
    }
}

/// Fetches a whole board: metadata and columns together, then every
/// column's tasks concurrently. Any failure fails the load.
async fn load_view<A: BoardApi>(api: &A, board_id: BoardId) -> Result<BoardView, ApiError> {
    let (board, columns) =
        tokio::try_join!(api.fetch_board(board_id), api.fetch_columns(board_id))?;
    let tasks = try_join_all(columns.iter().map(|column| {
        let id = column.id;
        async move { api.fetch_tasks(id).await.map(|tasks| (id, tasks)) }
    }))
    .await?;
    Ok(BoardView::new(board, columns, tasks))
}

fn validate_title(title: &str) -> Result<(), SessionError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SessionError::Validation("task title is required".to_string()));
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(SessionError::Validation(format!(
            "task title exceeds {MAX_TASK_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}
