mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use dlc_core::{CaseRepository, CaseState, SqliteCaseStore};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Disk remediation case tracker.
#[derive(Parser)]
#[command(name = "dlc", version, about = "Disk remediation case tracker")]
struct Cli {
    /// Path to the case database (default: ~/.dlc/dlc.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file (default: ~/.dlc/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a case for a failed disk
    New {
        /// Host the disk is attached to
        #[arg(long)]
        hostname: Option<String>,
        /// Device path, with or without /dev/
        #[arg(long)]
        device: Option<String>,
        /// Cluster resource id backed by the disk
        #[arg(long)]
        resource_id: Option<i64>,
        /// Cluster the resource belongs to
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Show a case
    Show {
        case_id: i64,
        /// Show this version instead of the active one
        #[arg(long)]
        version: Option<i64>,
    },

    /// List active cases
    List {
        /// Include every archived version
        #[arg(long)]
        all: bool,
        /// Only cases in this state
        #[arg(long)]
        state: Option<CaseState>,
    },

    /// Show every archived version of a case, oldest first
    History { case_id: i64 },

    /// Hand a case to an operator (OPERATOR_NEEDED)
    Escalate { case_id: i64 },

    /// Manually move a case to another state
    Transition { case_id: i64, state: CaseState },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_logging(&config.logging.filter);

    let db_path = match config.database_path(cli.db.as_deref()) {
        Ok(p) => p,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    let store = match SqliteCaseStore::open(&db_path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error opening '{}': {}", db_path.display(), e);
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    tracing::debug!(path = %db_path.display(), "opened case database");
    let repo = CaseRepository::new(store);

    match cli.command {
        Commands::New {
            hostname,
            device,
            resource_id,
            cluster,
        } => {
            let identity = commands::new::NewCase {
                hostname,
                device,
                resource_id,
                cluster,
            };
            commands::new::cmd_new(&repo, identity, cli.output, cli.quiet);
        }
        Commands::Show { case_id, version } => {
            commands::show::cmd_show(&repo, case_id, version, cli.output, cli.quiet);
        }
        Commands::List { all, state } => {
            commands::list::cmd_list(&repo, all, state, cli.output, cli.quiet);
        }
        Commands::History { case_id } => {
            commands::show::cmd_history(&repo, case_id, cli.output, cli.quiet);
        }
        Commands::Escalate { case_id } => {
            commands::operator::cmd_escalate(&repo, case_id, cli.output, cli.quiet);
        }
        Commands::Transition { case_id, state } => {
            commands::operator::cmd_transition(&repo, case_id, state, cli.output, cli.quiet);
        }
    }
}

/// Structured logs go to stderr so stdout stays parseable.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
