use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rmw_board::board::models::RequestStatus;
use rmw_board::board::roles::Role;
use rmw_board::config::BoardConfig;
use uuid::Uuid;

mod cmd;

#[derive(Parser)]
#[command(name = "rmw-board")]
#[command(version, about = "Real-time Return-Material-to-Warehouse request board")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to board.toml (defaults to .rmw/board.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Board server URL. Overrides client.base_url and RMW_SERVER_URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Act as this user; role-gated commands check the user's role first
    #[arg(long = "as", global = true, env = "RMW_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the board server (REST API, change feed, time probe)
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,

        /// Open the request list in a browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// Submit a new request from a production line
    Submit {
        /// Production line id
        #[arg(short, long)]
        line: String,

        /// PO numbers, separated by commas and/or spaces
        #[arg(long)]
        po: String,

        /// Time the material is needed by (e.g. 14:00)
        #[arg(short, long)]
        required_time: String,

        #[arg(long)]
        requested_by: Option<String>,

        #[arg(short, long)]
        department: Option<String>,
    },
    /// List active requests with live timers, or completed requests
    List {
        /// Show completed requests instead of active ones
        #[arg(long)]
        completed: bool,

        /// Only show requests from this production line
        #[arg(short, long)]
        line: Option<String>,

        /// Refresh every second until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },
    /// Set a request's status (pending, in_progress, completed)
    Status { id: Uuid, status: RequestStatus },
    /// Complete a request, or only some of its PO numbers
    Complete {
        id: Uuid,

        /// Complete only these PO numbers (repeatable)
        #[arg(long = "po")]
        po: Vec<String>,
    },
    /// Complete several requests at once
    BatchComplete {
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Delete a single request
    Delete { id: Uuid },
    /// Delete every request and department
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Cumulative downtime per department
    Report,
    /// Look up or assign user roles
    Role {
        #[command(subcommand)]
        command: RoleCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum RoleCommands {
    /// Show a user's role and the view it lands on
    Get { user: String },
    /// Assign a role (admin, workstation, line)
    Set { user: String, role: Role },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default .rmw/board.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = std::env::current_dir().context("Failed to get current directory")?;

    let mut config = BoardConfig::resolve(cli.config.as_deref(), &project_dir)?;
    if let Some(url) = &cli.server {
        config.client.base_url = url.clone();
    }
    let _log_guard = rmw_board::logging::init_tracing(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve {
            port,
            db_path,
            dev,
            open,
        } => {
            cmd::cmd_serve(&config, *port, db_path.clone(), *dev, *open).await?;
        }
        Commands::Submit {
            line,
            po,
            required_time,
            requested_by,
            department,
        } => {
            let form = cmd::submission(
                &config,
                line,
                po,
                required_time,
                requested_by.as_deref(),
                department.as_deref(),
            );
            cmd::cmd_submit(&config, form).await?;
        }
        Commands::List {
            completed,
            line,
            watch,
        } => cmd::cmd_list(&config, *completed, line.as_deref(), *watch).await?,
        Commands::Status { id, status } => {
            cmd::cmd_status(&config, cli.user.as_deref(), *id, *status).await?
        }
        Commands::Complete { id, po } => {
            cmd::cmd_complete(&config, cli.user.as_deref(), *id, po).await?
        }
        Commands::BatchComplete { ids } => {
            cmd::cmd_batch_complete(&config, cli.user.as_deref(), ids).await?
        }
        Commands::Delete { id } => cmd::cmd_delete(&config, cli.user.as_deref(), *id).await?,
        Commands::Reset { yes } => cmd::cmd_reset(&config, cli.user.as_deref(), *yes).await?,
        Commands::Report => cmd::cmd_report(&config).await?,
        Commands::Role { command } => cmd::cmd_role(&config, command.clone()).await?,
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, &config, command.clone())?
        }
    }

    Ok(())
}
