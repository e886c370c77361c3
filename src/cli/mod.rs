pub mod process;
pub mod report;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use tracing::level_filters::LevelFilter;

use crate::{
    ledger::store::{JsonLedgerStore, LedgerStore},
    monitor::{start_monitor, LEDGER_FILE_NAME},
    sink::SessionIds,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Timekeep", version, long_about = None)]
#[command(about = "Agent for tracking time spent in foreground applications", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(clap::Args, Debug)]
struct SessionArgs {
    #[arg(long, help = "Opaque employee identifier attached to every sink row")]
    employee: String,
    #[arg(
        long,
        help = "Opaque organization identifier attached to every sink row"
    )]
    organization: String,
}

impl From<SessionArgs> for SessionIds {
    fn from(value: SessionArgs) -> Self {
        Self {
            employee_id: value.employee,
            organization_id: value.organization,
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start monitoring in a detached daemon")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(
        about = "Run the monitor directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Summarize recorded activity and replay the totals into the sink")]
    Report {
        #[arg(long, help = "Application directory")]
        dir: Option<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Reset the ledger to a blank state. Sink history is kept")]
    Erase {
        #[arg(long, help = "Application directory")]
        dir: Option<PathBuf>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { session, .. } => {
            restart_server(&session.into())?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe().expect("Can't operate without an executable");
            kill_previous_servers(&process_name);
            Ok(())
        }
        Commands::Serve { dir, session } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_monitor(dir, session.into()).await?;
            Ok(())
        }
        Commands::Report { dir, session } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            report::process_report_command(&dir, &session.into()).await
        }
        Commands::Erase { dir } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            let store = JsonLedgerStore::new(dir.join(LEDGER_FILE_NAME))?;
            store.erase().await?;
            println!("Ledger erased");
            Ok(())
        }
    }
}
