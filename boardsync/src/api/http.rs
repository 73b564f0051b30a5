//! REST implementation of [`BoardApi`] over `reqwest`.

use std::time::Duration;

use boardsync_proto::{Board, BoardId, Column, ColumnId, CreateTaskRequest, Task, TaskId};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{ApiError, BoardApi};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the board REST service.
///
/// Every request carries the bearer token, when one is configured.
#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpBoardApi {
    /// Creates a client for the service rooted at `base_url`, e.g.
    /// `http://localhost:8080/api`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `base_url` does not parse and
    /// [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// The service root all paths are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> Result<(RequestBuilder, Url), ApiError> {
        let url = self.base.join(path)?;
        let mut builder = self.client.request(method, url.clone());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok((builder, url))
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %url, err = %e, "board service unreachable");
            ApiError::Http(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(url = %url, status = status.as_u16(), message = %message, "board service error");
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (builder, url) = self.request(Method::GET, path)?;
        let value = self.send(builder, &url).await?.json().await?;
        tracing::debug!(url = %url, "fetched");
        Ok(value)
    }
}

impl BoardApi for HttpBoardApi {
    async fn fetch_board(&self, id: BoardId) -> Result<Board, ApiError> {
        self.get_json(&format!("boards/{id}")).await
    }

    async fn fetch_columns(&self, board_id: BoardId) -> Result<Vec<Column>, ApiError> {
        self.get_json(&format!("columns/board/{board_id}")).await
    }

    async fn fetch_tasks(&self, column_id: ColumnId) -> Result<Vec<Task>, ApiError> {
        self.get_json(&format!("tasks/column/{column_id}")).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        let (builder, url) = self.request(Method::POST, "tasks")?;
        let task: Task = self.send(builder.json(request), &url).await?.json().await?;
        tracing::info!(task_id = %task.id, column_id = %task.column_id, "task created");
        Ok(task)
    }

    async fn update_task(&self, id: TaskId, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        let (builder, url) = self.request(Method::PUT, &format!("tasks/{id}"))?;
        let task: Task = self.send(builder.json(request), &url).await?.json().await?;
        tracing::info!(task_id = %task.id, version = task.version, "task updated");
        Ok(task)
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let (builder, url) = self.request(Method::DELETE, &format!("tasks/{id}"))?;
        self.send(builder, &url).await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }
}
