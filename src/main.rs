use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use mod_deployer::commands::{self, EngineState};
use mod_deployer::config::AppSettings;
use mod_deployer::models::error::SError;
use mod_deployer::models::paths::WorkspacePaths;
use mod_deployer::models::task_status::TaskStatus;
use mod_deployer::utils::logging;
use serde::Serialize;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Parser)]
#[command(name = "mod-deployer")]
#[command(about = "Stage, apply and revert manifest-driven game mods")]
#[command(version)]
struct Cli {
    /// Keep workspace, game and user folders under one directory instead of the saved settings
    #[arg(long, global = true)]
    portable: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import mod folders or .zip archives into the workspace
    Import {
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },
    /// Apply a mod to the game
    Enable {
        name: String,
        /// Go ahead even when other enabled mods write the same files
        #[arg(short, long)]
        yes: bool,
    },
    /// Revert a mod
    Disable { name: String },
    /// Move a mod to a load-order position (0 loads first)
    Reorder { name: String, position: usize },
    /// Replace the whole load order; every imported mod must be named once
    Order {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Rewrite every enabled file according to the current load order
    Reapply,
    /// List restore points taken before each reapply, newest first
    RestorePoints,
    /// Put every file of a restore point back
    Rollback { id: String },
    /// Show files written by more than one mod
    Conflicts { name: Option<String> },
    /// List imported mods in load order
    List,
    /// Disable and delete mods
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the active settings
    Settings {
        /// Store them as the defaults for later runs
        #[arg(long)]
        save: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Commands, settings: AppSettings) -> Result<(), SError> {
    if let Commands::Settings { save } = command {
        if save {
            settings.save()?;
        }
        return print_json(&settings);
    }

    let state = EngineState::open(settings)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskStatus>();
    let printer = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&status) {
                eprintln!("{line}");
            }
        }
    });

    let result = {
        let tx = tx;
        match command {
            Commands::Import { paths } => commands::import_mods(&state, paths, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Enable { name, yes } => commands::enable_mod(&state, name, yes, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Disable { name } => commands::disable_mod(&state, name, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Reorder { name, position } => commands::reorder_mod(&state, name, position, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Order { names } => commands::set_load_order(&state, names, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Reapply => commands::reapply(&state, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::Rollback { id } => commands::rollback(&state, id, tx)
                .await
                .and_then(|r| print_json(&r)),
            Commands::RestorePoints => commands::list_restore_points(&state).and_then(|r| print_json(&r)),
            Commands::Remove { names } => commands::remove_mods(&state, names, tx).await,
            Commands::Conflicts { name } => {
                commands::preview_conflicts(&state, name.as_deref()).and_then(|r| print_json(&r))
            }
            Commands::List => commands::list_mods(&state).and_then(|r| print_json(&r)),
            Commands::Settings { .. } => Ok(()),
        }
    };

    let _ = printer.await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.portable {
        Some(root) => AppSettings::portable(root),
        None => match AppSettings::load() {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("failed to load settings: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let _guard = match logging::init(&WorkspacePaths::new(&settings.workspace).logs) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("file logging disabled: {e}");
            None
        }
    };

    match run(cli.command, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            if let Ok(json) = serde_json::to_string_pretty(&e) {
                eprintln!("{json}");
            }
            ExitCode::FAILURE
        }
    }
}
