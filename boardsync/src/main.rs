//! `BoardSync` — command-line client for a shared Kanban board.
//!
//! Loads a board from the REST service, subscribes to its live updates
//! over the relay, and applies moves optimistically. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/boardsync/config.toml`).
//!
//! ```bash
//! # Print board 1
//! cargo run --bin boardsync -- show
//!
//! # Follow live updates
//! cargo run --bin boardsync -- --board 1 watch
//!
//! # Move task 4 to the top of column 2
//! cargo run --bin boardsync -- move 4 2 --top
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use boardsync::api::ApiError;
use boardsync::api::http::HttpBoardApi;
use boardsync::board::{BoardView, MoveOutcome, ReconcileOutcome, TargetIndex, TaskFilter};
use boardsync::channel::ChannelStatus;
use boardsync::channel::relay::RelayChannel;
use boardsync::config::{CliArgs, ClientConfig, Command};
use boardsync::session::{BoardSession, SessionError, SessionEvent, TaskPatch};
use boardsync_proto::{ColumnId, CreateTaskRequest, TaskId};

type Session = BoardSession<HttpBoardApi, RelayChannel>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::debug!(api = %config.api_url, relay = %config.relay_url, "boardsync starting");

    let command = cli.command.unwrap_or(Command::Show {
        search: None,
        priority: None,
        due: None,
    });

    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging.
///
/// Logs go to `file_path` when given and to stderr otherwise, so command
/// output on stdout stays clean. A path that names no file falls back to
/// stderr with a warning. Returns a [`WorkerGuard`] that must be held until
/// shutdown to ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let target = file_path.and_then(|path| {
        let target = log_file_target(path);
        if target.is_none() {
            eprintln!(
                "Warning: cannot log to {}, logging to stderr instead",
                path.display()
            );
        }
        target
    });

    let to_file = target.is_some();
    let (non_blocking, guard) = if let Some((log_dir, file_name)) = target {
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name))
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(!to_file)
        .init();

    guard
}

/// Splits a log file path into its directory and file name. A bare file
/// name logs to the working directory.
fn log_file_target(path: &Path) -> Option<(PathBuf, String)> {
    let file_name = path.file_name()?.to_str()?.to_string();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, file_name))
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let api = HttpBoardApi::new(&config.api_url, config.token.clone(), config.request_timeout)?;
    let channel = RelayChannel::new(config.channel_config());
    let mut session = BoardSession::new(api, channel, config.session(), config.session_options());
    session.open(config.board_id).await?;

    let result = match command {
        Command::Show {
            search,
            priority,
            due,
        } => {
            let filter = TaskFilter {
                search,
                priority,
                due,
            };
            if let Some(view) = session.view() {
                print_board(view, &filter);
            }
            Ok(())
        }
        Command::Watch => {
            watch(&mut session, config.reconnect_delay).await;
            Ok(())
        }
        Command::Move {
            task,
            column,
            index,
            top,
            before,
            wait_secs,
        } => {
            let target = match (top, before, index) {
                (true, _, _) => TargetIndex::Top,
                (false, Some(anchor), _) => TargetIndex::Before(anchor),
                (false, None, Some(i)) => TargetIndex::At(i),
                (false, None, None) => TargetIndex::End,
            };
            move_and_wait(&mut session, task, column, target, Duration::from_secs(wait_secs)).await
        }
        Command::Create {
            column,
            title,
            description,
            priority,
        } => {
            let mut request = CreateTaskRequest::new(column, title);
            request.description = description;
            if let Some(priority) = priority {
                request.priority = priority;
            }
            let task = session.create_task(request).await?;
            println!("created task {} in column {}", task.id, task.column_id);
            Ok(())
        }
        Command::Edit {
            task,
            title,
            description,
            priority,
        } => {
            let patch = TaskPatch {
                title,
                description: description.map(Some),
                priority,
                ..TaskPatch::default()
            };
            let updated = session.update_task(task, &patch).await?;
            println!("updated task {} (version {})", updated.id, updated.version);
            Ok(())
        }
        Command::Delete { task } => {
            session.delete_task(task).await?;
            println!("deleted task {task}");
            Ok(())
        }
    };

    session.close();
    result
}

/// Follow live updates until interrupted, resyncing after the channel drops.
async fn watch(session: &mut Session, reconnect_delay: Duration) {
    if let Some(view) = session.view() {
        print_board(view, &TaskFilter::default());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return;
            }
            event = session.next_event() => match event {
                Some(SessionEvent::TaskReconciled { task_id, outcome }) => {
                    if outcome.is_applied()
                        && let Some(view) = session.view()
                    {
                        print_task_line(view, task_id, outcome);
                    }
                }
                Some(SessionEvent::MoveRejected { reason, .. }) => println!("! rejected: {reason}"),
                Some(SessionEvent::ChannelStatus(ChannelStatus::Connected)) => {
                    println!("* live");
                }
                Some(SessionEvent::ChannelStatus(ChannelStatus::Disconnected)) | None => {
                    println!("* channel down, resyncing in {}s", reconnect_delay.as_secs());
                    tokio::time::sleep(reconnect_delay).await;
                    if let Err(e) = session.resync().await {
                        tracing::warn!(err = %e, "resync failed");
                    } else if let Some(view) = session.view() {
                        print_board(view, &TaskFilter::default());
                    }
                }
            }
        }
    }
}

/// Move a task and wait for the authoritative answer.
async fn move_and_wait(
    session: &mut Session,
    task: TaskId,
    column: ColumnId,
    target: TargetIndex,
    wait: Duration,
) -> Result<(), CliError> {
    if session.move_task(task, column, target)? == MoveOutcome::NoOp {
        println!("task {task} is already there");
        return Ok(());
    }
    if session.channel_status() == ChannelStatus::Disconnected {
        println!("moved task {task} locally; relay unavailable, not published");
        return Ok(());
    }

    let answer = tokio::time::timeout(wait, async {
        loop {
            match session.next_event().await {
                Some(SessionEvent::TaskReconciled { task_id, outcome }) if task_id == task => {
                    return Some(Ok(outcome));
                }
                Some(SessionEvent::MoveRejected { task_id, reason })
                    if task_id.is_none_or(|id| id == task) =>
                {
                    return Some(Err(reason));
                }
                Some(_) => {}
                None => return None,
            }
        }
    })
    .await;

    match answer {
        Ok(Some(Ok(ReconcileOutcome::Confirmed))) => println!("moved task {task}"),
        Ok(Some(Ok(outcome))) => println!("task {task} settled elsewhere: {outcome:?}"),
        Ok(Some(Err(reason))) => println!("move rejected: {reason}"),
        Ok(None) => println!("channel closed before task {task} was confirmed"),
        Err(_) => println!("no confirmation for task {task} within {}s", wait.as_secs()),
    }
    Ok(())
}

fn print_board(view: &BoardView, filter: &TaskFilter) {
    let now = Utc::now().naive_utc();
    println!("# {} (board {})", view.board().name, view.board_id());
    for (column, tasks) in view.iter_columns() {
        let shown = filter.apply(tasks, now);
        println!("\n## {} [{}]", column.title, shown.len());
        for task in shown {
            let pending = if view.is_pending(task.id) { " *" } else { "" };
            println!(
                "  {:>5}  {:<8} {}{pending}",
                task.id,
                task.priority.to_string(),
                task.title
            );
        }
    }
}

fn print_task_line(view: &BoardView, task_id: TaskId, outcome: ReconcileOutcome) {
    match (view.task(task_id), view.locate(task_id)) {
        (Some(task), Some((column, index))) => {
            let column = view.column(column).map_or("?", |c| c.title.as_str());
            println!("~ {} \"{}\" -> {column} #{index} ({outcome:?})", task.id, task.title);
        }
        _ => println!("~ {task_id} left this board ({outcome:?})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_in_directory() {
        assert_eq!(
            log_file_target(Path::new("/var/log/boardsync.log")),
            Some((PathBuf::from("/var/log"), "boardsync.log".to_string()))
        );
    }

    #[test]
    fn bare_log_file_name_uses_working_directory() {
        assert_eq!(
            log_file_target(Path::new("boardsync.log")),
            Some((PathBuf::from("."), "boardsync.log".to_string()))
        );
    }

    #[test]
    fn path_without_file_name_has_no_target() {
        assert_eq!(log_file_target(Path::new("/")), None);
        assert_eq!(log_file_target(Path::new("logs/..")), None);
        assert_eq!(log_file_target(Path::new("")), None);
    }
}
