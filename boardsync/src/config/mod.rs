//! Configuration system for the `BoardSync` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/boardsync/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use boardsync_proto::{BoardId, ColumnId, Priority, TaskId, UserId};

use crate::board::{DueWindow, PlacementPolicy};
use crate::channel::relay::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_BUFFER, DEFAULT_HANDSHAKE_TIMEOUT, RelayChannelConfig,
};
use crate::session::{Session, SessionOptions};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The placement policy named in the file is unknown.
    #[error("{0}")]
    InvalidPolicy(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    relay: RelayFileConfig,
    session: SessionFileConfig,
    sync: SyncFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

/// `[relay]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    handshake_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<UserId>,
    board_id: Option<BoardId>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    placement: Option<String>,
    reconnect_delay_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- CRUD service --
    /// Base URL of the board REST service.
    pub api_url: String,
    /// Bearer token sent to the REST service.
    pub token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,

    // -- Relay --
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Timeout for opening the relay WebSocket.
    pub connect_timeout: Duration,
    /// Timeout for each relay handshake acknowledgment.
    pub handshake_timeout: Duration,
    /// Capacity of the channel event queue.
    pub event_buffer: usize,

    // -- Session --
    /// Current user.
    pub user_id: Option<UserId>,
    /// Board commands act on when none is given.
    pub board_id: BoardId,

    // -- Sync --
    /// How moves compute their new position.
    pub placement: PlacementPolicy,
    /// Delay before `watch` resyncs after the channel drops.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
            relay_url: "ws://localhost:8080/ws".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            user_id: None,
            board_id: BoardId::new(1),
            placement: PlacementPolicy::Midpoint,
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if it names an unknown placement policy.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let placement = match (cli.placement, file.sync.placement.as_deref()) {
            (Some(p), _) => p,
            (None, Some(name)) => name.parse().map_err(ConfigError::InvalidPolicy)?,
            (None, None) => defaults.placement,
        };

        Ok(Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.api.base_url.clone())
                .unwrap_or(defaults.api_url),
            token: cli.token.clone().or_else(|| file.api.token.clone()),
            request_timeout: file
                .api
                .timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.relay.url.clone())
                .unwrap_or(defaults.relay_url),
            connect_timeout: file
                .relay
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            handshake_timeout: file
                .relay
                .handshake_timeout_secs
                .map_or(defaults.handshake_timeout, Duration::from_secs),
            event_buffer: file.relay.event_buffer.unwrap_or(defaults.event_buffer),
            user_id: cli.user_id.or(file.session.user_id),
            board_id: cli
                .board
                .or(file.session.board_id)
                .unwrap_or(defaults.board_id),
            placement,
            reconnect_delay: file
                .sync
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
        })
    }

    /// Identity to act as.
    #[must_use]
    pub fn session(&self) -> Session {
        Session {
            user_id: self.user_id,
            token: self.token.clone(),
        }
    }

    /// Settings for the relay channel.
    #[must_use]
    pub fn channel_config(&self) -> RelayChannelConfig {
        RelayChannelConfig {
            url: self.relay_url.clone(),
            user_id: self.user_id,
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
            event_buffer: self.event_buffer,
        }
    }

    /// Options for the session controller.
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            placement: self.placement,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time collaborative Kanban board client")]
pub struct CliArgs {
    /// Base URL of the board REST service.
    #[arg(long, env = "BOARDSYNC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// WebSocket URL of the relay server.
    #[arg(long, env = "BOARDSYNC_RELAY_URL", global = true)]
    pub relay_url: Option<String>,

    /// Bearer token for the REST service.
    #[arg(long, env = "BOARDSYNC_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Your user id.
    #[arg(long, env = "BOARDSYNC_USER_ID", global = true)]
    pub user_id: Option<UserId>,

    /// Board to act on.
    #[arg(short, long, env = "BOARDSYNC_BOARD", global = true)]
    pub board: Option<BoardId>,

    /// Placement policy for moves (midpoint, head-only).
    #[arg(long, global = true)]
    pub placement: Option<PlacementPolicy>,

    /// Path to config file (default: `~/.config/boardsync/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", env = "BOARDSYNC_LOG", global = true)]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the board.
    Show {
        /// Only tasks whose title or description contains this text.
        #[arg(long)]
        search: Option<String>,
        /// Only tasks with this priority.
        #[arg(long)]
        priority: Option<Priority>,
        /// Only tasks due in this window (overdue, today, week, month).
        #[arg(long)]
        due: Option<DueWindow>,
    },
    /// Follow live updates until interrupted.
    Watch,
    /// Move a task to a column.
    Move {
        /// Task to move.
        task: TaskId,
        /// Destination column.
        column: ColumnId,
        /// Index in the destination column (default: end).
        #[arg(long, conflicts_with_all = ["top", "before"])]
        index: Option<usize>,
        /// Place at the head of the column.
        #[arg(long, conflicts_with = "before")]
        top: bool,
        /// Place directly before this task.
        #[arg(long)]
        before: Option<TaskId>,
        /// Seconds to wait for the server to confirm.
        #[arg(long, default_value_t = 5)]
        wait_secs: u64,
    },
    /// Create a task at the end of a column.
    Create {
        /// Column to create the task in.
        column: ColumnId,
        /// Task title.
        title: String,
        /// Task description.
        #[arg(long)]
        description: Option<String>,
        /// Task priority.
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Edit a task's title, description or priority.
    Edit {
        /// Task to edit.
        task: TaskId,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New priority.
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Delete a task.
    Delete {
        /// Task to delete.
        task: TaskId,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("boardsync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
