//! CRUD routes served next to the relay.
//!
//! Mirrors the board service's REST surface closely enough for clients to
//! load a board and manage tasks outside the move path:
//!
//! | method | path                         | result |
//! |--------|------------------------------|--------|
//! | GET    | `/boards/{id}`               | board metadata |
//! | GET    | `/columns/board/{boardId}`   | ordered columns |
//! | GET    | `/tasks/column/{columnId}`   | ordered tasks |
//! | POST   | `/tasks`                     | `201` + created task, broadcast |
//! | PUT    | `/tasks/{id}`                | updated task, broadcast |
//! | DELETE | `/tasks/{id}`                | `204` |
//!
//! Bearer tokens are accepted and ignored; authentication lives elsewhere.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use boardsync_proto::{Board, BoardId, Column, ColumnId, CreateTaskRequest, Task, TaskId};

use crate::relay::RelayState;
use crate::store::StoreError;

type AppState = State<Arc<RelayState>>;

/// Builds the CRUD router, to be nested under `/api`.
pub fn routes() -> axum::Router<Arc<RelayState>> {
    axum::Router::new()
        .route("/boards/{id}", get(get_board))
        .route("/columns/board/{board_id}", get(get_columns))
        .route("/tasks/column/{column_id}", get(get_tasks))
        .route("/tasks", axum::routing::post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BoardNotFound(_) | Self::ColumnNotFound(_) | Self::TaskNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

async fn get_board(State(state): AppState, Path(id): Path<BoardId>) -> Result<Json<Board>, StoreError> {
    state
        .store
        .board(id)
        .await
        .map(Json)
        .ok_or(StoreError::BoardNotFound(id))
}

async fn get_columns(
    State(state): AppState,
    Path(board_id): Path<BoardId>,
) -> Result<Json<Vec<Column>>, StoreError> {
    state.store.columns(board_id).await.map(Json)
}

async fn get_tasks(
    State(state): AppState,
    Path(column_id): Path<ColumnId>,
) -> Result<Json<Vec<Task>>, StoreError> {
    state.store.tasks(column_id).await.map(Json)
}

async fn create_task(
    State(state): AppState,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), StoreError> {
    let (board, task) = state.store.create_task(req).await?;
    tracing::info!(board_id = %board, task_id = %task.id, "task created");
    state.publish_task(board, &task).await;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): AppState,
    Path(id): Path<TaskId>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, StoreError> {
    let (board, task) = state.store.update_task(id, req).await?;
    tracing::info!(board_id = %board, task_id = %id, version = task.version, "task updated");
    state.publish_task(board, &task).await;
    Ok(Json(task))
}

async fn delete_task(State(state): AppState, Path(id): Path<TaskId>) -> Result<StatusCode, StoreError> {
    let (board, _) = state.store.delete_task(id).await?;
    tracing::info!(board_id = %board, task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
