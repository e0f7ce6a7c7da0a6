use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use remibot_scheduler::Scheduler;
use remibot_service::{ReminderService, SystemClock, TaskService, TracingSink};
use remibot_store::TaskStore;

#[derive(Parser)]
#[command(name = "remibot", about = "Reminder task scheduler")]
struct Cli {
    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reminder scheduler until interrupted
    Run {
        /// Seconds between due-task polls (overrides config)
        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },
    /// Add a one-off or recurring task
    Add {
        /// Task title
        #[arg(long)]
        title: String,

        /// Longer description
        #[arg(long)]
        description: Option<String>,

        /// Execution time, RFC 3339 (e.g. "2026-09-01T09:00:00Z")
        #[arg(long)]
        at: String,

        /// Creator user ID
        #[arg(long)]
        creator: String,

        /// Guild ID scoping the channel
        #[arg(long)]
        guild: Option<String>,

        /// Delivery channel ID (omit for a direct message to the creator)
        #[arg(long)]
        channel: Option<String>,

        /// Recurrence pattern (daily, weekly, monthly, yearly, or <N><s|m|h|d|w>)
        #[arg(long)]
        every: Option<String>,
    },
    /// List tasks by creator or guild
    List {
        /// Filter by creator user ID
        #[arg(long)]
        creator: Option<String>,

        /// Filter by guild ID
        #[arg(long)]
        guild: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = remibot_config::load_config().unwrap_or_default();

    let db_path = match cli.db {
        Some(path) => path,
        None => {
            remibot_config::ensure_config_dir()?;
            config.db_path()?
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let store = Arc::new(TaskStore::open(&db_path)?);
        let tasks = Arc::new(TaskService::new(store, Arc::new(TracingSink)));

        match cli.command {
            Commands::Run { poll_interval_secs } => {
                let grace = Duration::from_secs(config.scheduler.shutdown_grace_secs);
                let poll = Duration::from_secs(
                    poll_interval_secs.unwrap_or(config.scheduler.poll_interval_secs),
                );

                let service = Arc::new(
                    ReminderService::new(
                        Arc::new(Scheduler::with_grace(grace)),
                        tasks,
                        Arc::new(SystemClock),
                    )
                    .with_poll_interval(poll),
                );
                service.start().await?;

                tokio::signal::ctrl_c().await?;
                info!("Interrupt received, shutting down");
                service.stop().await;
            }
            Commands::Add {
                title,
                description,
                at,
                creator,
                guild,
                channel,
                every,
            } => {
                let at: DateTime<Utc> = at
                    .parse()
                    .with_context(|| format!("invalid execution time: {at:?}"))?;

                let task = match every {
                    Some(pattern) => {
                        tasks
                            .create_recurring_task(
                                &title,
                                description.as_deref(),
                                at,
                                &pattern,
                                &creator,
                                guild.as_deref(),
                                channel.as_deref(),
                            )
                            .await?
                    }
                    None => {
                        tasks
                            .create_task(
                                &title,
                                description.as_deref(),
                                at,
                                &creator,
                                guild.as_deref(),
                                channel.as_deref(),
                            )
                            .await?
                    }
                };
                println!("Created task {} ({})", task.id, task.title);
            }
            Commands::List { creator, guild } => {
                let listed = match (creator, guild) {
                    (Some(creator), _) => tasks.tasks_by_creator(&creator).await?,
                    (None, Some(guild)) => tasks.tasks_by_guild(&guild).await?,
                    (None, None) => anyhow::bail!("pass --creator or --guild"),
                };
                for task in listed {
                    println!(
                        "{:>6}  {}  {}{}{}",
                        task.id,
                        task.execution_time.format("%Y-%m-%d %H:%M"),
                        task.title,
                        task.recurrence_pattern
                            .as_deref()
                            .map(|p| format!("  (every {p})"))
                            .unwrap_or_default(),
                        if task.completed { "  [done]" } else { "" },
                    );
                }
            }
        }
        Ok(())
    })
}
