use anyhow::Result;
use clap::{Parser, Subcommand};
use jornada_admin::application::*;
use jornada_admin::config::create_sample_env_file;
use jornada_admin::{ApiError, BackupError, Config};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jornada-admin")]
#[command(about = "Backup administration for the OpenJornada time-tracking API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        #[arg(long)]
        email: String,
        /// Required; never read from the terminal
        #[arg(long, env = "JORNADA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Backup lifecycle commands
    Backups {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Backup policy and general settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate sample configuration file
    InitConfig,
    /// Generate diagnostic report
    Diagnose,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// List backups with totals and the next scheduled run
    List,
    /// Show one backup in detail
    Show { id: String },
    /// Trigger a manual backup
    Create {
        /// Poll until the backup completes or fails
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value = "600")]
        wait_timeout_seconds: u64,
        #[arg(long, default_value = "2000")]
        poll_interval_ms: u64,
    },
    /// Download a completed backup
    Download {
        id: String,
        /// Destination directory (default: DOWNLOAD_DIR)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Restore a completed backup, replacing all current data
    Restore {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Delete a backup
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the stored backup policy
    Show,
    /// Save the backup policy with the given changes
    Save(DraftOverrides),
    /// Test storage connectivity with the given changes, without saving
    Test(DraftOverrides),
    /// Update the contact email
    SetEmail { email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Commands that must work with a broken configuration
    match cli.command {
        Commands::InitConfig => {
            create_sample_env_file(Path::new("."))?;
            return Ok(());
        }
        Commands::Diagnose => {
            return match Application::new(config.clone()) {
                Ok(app) => ConfigCommandHandler::new(app.container.clone()).diagnose().await,
                Err(e) => {
                    print!("{}", config.create_diagnostic_report());
                    Err(e)
                }
            };
        }
        _ => {}
    }

    if let Commands::Backups {
        command: BackupCommands::Download {
            output: Some(dir), ..
        },
    } = &cli.command
    {
        config.download_dir = dir.clone();
    }

    let app = Application::new(config)?;

    let result = match cli.command {
        Commands::Login { email, password } => {
            SessionCommandHandler::new(app.container.clone())
                .login(&email, &password)
                .await
        }
        Commands::Logout => SessionCommandHandler::new(app.container.clone()).logout(),
        Commands::Whoami => SessionCommandHandler::new(app.container.clone()).whoami().await,
        Commands::Backups { command } => handle_backup_command(command, &app).await,
        Commands::Config { command } => handle_config_command(command, &app).await,
        Commands::InitConfig | Commands::Diagnose => Ok(()),
    };

    if let Err(e) = &result {
        if is_session_expired(e) {
            warn!("🔒 Session expired; run `jornada-admin login` again");
        }
    }
    result
}

async fn handle_backup_command(command: BackupCommands, app: &Application) -> Result<()> {
    let handler = BackupCommandHandler::new(app.container.clone());
    match command {
        BackupCommands::List => handler.list().await,
        BackupCommands::Show { id } => handler.show(&id).await,
        BackupCommands::Create {
            wait,
            wait_timeout_seconds,
            poll_interval_ms,
        } => {
            handler
                .create(
                    wait,
                    Duration::from_secs(wait_timeout_seconds),
                    Duration::from_millis(poll_interval_ms),
                )
                .await
        }
        BackupCommands::Download { id, .. } => handler.download(&id).await,
        BackupCommands::Restore { id, yes } => handler.restore(&id, confirmer(yes)).await,
        BackupCommands::Delete { id, yes } => handler.delete(&id, confirmer(yes)).await,
    }
}

async fn handle_config_command(command: ConfigCommands, app: &Application) -> Result<()> {
    let handler = ConfigCommandHandler::new(app.container.clone());
    match command {
        ConfigCommands::Show => handler.show().await,
        ConfigCommands::Save(overrides) => handler.save(&overrides).await,
        ConfigCommands::Test(overrides) => handler.test(&overrides).await,
        ConfigCommands::SetEmail { email } => handler.set_email(&email).await,
    }
}

fn confirmer(assume_yes: bool) -> &'static dyn Confirm {
    if assume_yes {
        &AssumeYes
    } else {
        &StdinConfirm
    }
}

fn is_session_expired(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ApiError>(), Some(ApiError::SessionExpired))
        || matches!(
            e.downcast_ref::<BackupError>(),
            Some(BackupError::Api(ApiError::SessionExpired))
        )
}
