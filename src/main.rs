#![forbid(unsafe_code)]

//! `tasksync` — command-line front end for the task sync layer.
//!
//! `watch` keeps a push session open and toasts incoming notifications;
//! the other subcommands run a single task or notification operation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tasksync::api::{ApiClient, NotificationApi};
use tasksync::auth::{Authenticator, KeyringAuthenticator};
use tasksync::cache::QueryCache;
use tasksync::coordinator::TaskMutations;
use tasksync::events::EventBus;
use tasksync::models::notice::NoticeInput;
use tasksync::models::task::{TaskDraft, UpdateTaskRequest};
use tasksync::notice::{self, NoticeSnapshot, NoticeStore};
use tasksync::notifications::{NotificationService, NotificationStore};
use tasksync::realtime::{PushClient, PushMessage, WsTransport};
use tasksync::timer::TokioScheduler;
use tasksync::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tasksync", about = "Task sync client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep a push session open and show incoming notifications.
    Watch,

    /// Create, update, or delete a task.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Read and manage notifications.
    #[command(subcommand)]
    Notifications(NotificationCommand),
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// Create a task.
    Create {
        #[command(flatten)]
        fields: TaskFields,
        /// Create on behalf of `--owner-id` instead of the caller.
        #[arg(long)]
        on_behalf_of_owner: bool,
    },

    /// Update a task.
    Update {
        /// Task id.
        id: i64,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// Delete a task.
    Delete {
        /// Task id.
        id: i64,
    },
}

#[derive(Debug, Args)]
struct TaskFields {
    /// Short title.
    #[arg(long)]
    title: Option<String>,
    /// Free-form description.
    #[arg(long)]
    description: Option<String>,
    /// Workflow status label.
    #[arg(long)]
    status: Option<String>,
    /// Owning project; omit for a personal task.
    #[arg(long)]
    project_id: Option<i64>,
    /// Owning user.
    #[arg(long)]
    owner_id: Option<i64>,
    /// Scheduled start.
    #[arg(long)]
    start_date: Option<String>,
    /// Due date.
    #[arg(long)]
    due_date: Option<String>,
}

impl From<TaskFields> for TaskDraft {
    fn from(fields: TaskFields) -> Self {
        Self {
            title: fields.title,
            description: fields.description,
            status: fields.status,
            project_id: fields.project_id,
            owner_id: fields.owner_id,
            start_date: fields.start_date,
            due_date: fields.due_date,
        }
    }
}

#[derive(Debug, Subcommand)]
enum NotificationCommand {
    /// List notifications.
    List {
        /// Only unread notifications.
        #[arg(long)]
        unread_only: bool,
    },

    /// Mark one notification read.
    Read {
        /// Notification id.
        id: i64,
    },

    /// Mark every notification read.
    ReadAll,

    /// Dismiss one notification.
    Dismiss {
        /// Notification id.
        id: i64,
    },

    /// Apply `markAsRead` or `dismiss` to several notifications in order.
    Bulk {
        /// Action: `markAsRead` or `dismiss`.
        action: String,
        /// Notification ids.
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(path = %args.config.display(), "configuration loaded");

    let auth: Arc<dyn Authenticator> = Arc::new(KeyringAuthenticator);
    let api = Arc::new(ApiClient::new(&config.api, Arc::clone(&auth))?);

    match args.command {
        Command::Watch => watch(config, api, auth).await,
        Command::Task(command) => run_task(command, api).await,
        Command::Notifications(command) => run_notifications(command, api).await,
    }
}

async fn watch(config: GlobalConfig, api: Arc<ApiClient>, auth: Arc<dyn Authenticator>) -> Result<()> {
    let user_id = match config.user_id {
        Some(id) => id,
        None => api.current_user().await?.id,
    };

    let notices = NoticeStore::new(config.notices, Arc::new(TokioScheduler::new()));
    notice::install(Arc::clone(&notices));
    let _notice_log = notices.subscribe(|snapshot: &NoticeSnapshot| {
        let titles: Vec<&str> = snapshot.iter().filter_map(|n| n.title.as_deref()).collect();
        debug!(?titles, "notice queue changed");
    });

    let store = Arc::new(NotificationStore::new());
    let service = NotificationService::new(Arc::clone(&api) as Arc<dyn NotificationApi>, Arc::clone(&store));
    if let Err(err) = service.refresh(false).await {
        warn!(%err, "initial notification load failed");
    }
    if let Err(err) = service.refresh_unread_count().await {
        warn!(%err, "initial unread count failed");
    }

    let client = PushClient::new(config.push, user_id, Arc::new(WsTransport), auth, store);
    let mut messages = client.messages();
    let mut status = client.status();
    client.connect();
    info!(user_id, topic = %client.topic(), "watching notifications");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }

            message = messages.recv() => match message {
                Ok(PushMessage::Notification(notification)) => {
                    println!("[{}] {}: {}", notification.notification_id, notification.subject, notification.message);
                    notice::toast(
                        NoticeInput::titled(notification.subject).with_description(notification.message),
                    );
                }
                Ok(PushMessage::UnreadCountUpdate(count)) => println!("unread: {}", count.0),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "message stream lagged"),
                Err(RecvError::Closed) => break,
            },

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                match current.last_fault {
                    Some(fault) => info!(state = %current.state, %fault, attempts = current.attempts, "push status"),
                    None => info!(state = %current.state, attempts = current.attempts, "push status"),
                }
            }
        }
    }

    client.disconnect().await;
    notice::reset_global();
    info!("tasksync watch stopped");
    Ok(())
}

async fn run_task(command: TaskCommand, api: Arc<ApiClient>) -> Result<()> {
    let mutations = TaskMutations::new(api, QueryCache::new(), EventBus::new());
    match command {
        TaskCommand::Create {
            fields,
            on_behalf_of_owner,
        } => {
            let task = mutations.create_task(fields.into(), on_behalf_of_owner).await?;
            print_json(&task)
        }
        TaskCommand::Update { id, fields } => {
            let task = mutations
                .update_task(UpdateTaskRequest {
                    task_id: id,
                    changes: fields.into(),
                })
                .await?;
            print_json(&task)
        }
        TaskCommand::Delete { id } => {
            mutations.delete_task(id).await?;
            println!("deleted task {id}");
            Ok(())
        }
    }
}

async fn run_notifications(command: NotificationCommand, api: Arc<ApiClient>) -> Result<()> {
    let store = Arc::new(NotificationStore::new());
    let service = NotificationService::new(api, Arc::clone(&store));
    match command {
        NotificationCommand::List { unread_only } => {
            service.refresh(unread_only).await?;
            print_json(&store.snapshot().notifications)
        }
        NotificationCommand::Read { id } => service.mark_as_read(id).await,
        NotificationCommand::ReadAll => service.mark_all_as_read().await,
        NotificationCommand::Dismiss { id } => service.dismiss(id).await,
        NotificationCommand::Bulk { action, ids } => {
            let applied = service.bulk_action_named(&action, ids).await.map_err(|err| {
                error!(%err, "bulk action failed");
                err
            })?;
            println!("{action} applied to {applied} notification(s)");
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
