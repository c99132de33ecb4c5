//! CLI application for auditing NF-e invoices against SEFAZ portal reports.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{audit, batch, config, inspect};

/// NF-e auditor - Reconcile invoice XML with the SEFAZ calculation report
#[derive(Parser)]
#[command(name = "auditax")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one invoice against its portal report
    Audit(audit::AuditArgs),

    /// Audit every invoice in a directory
    Batch(batch::BatchArgs),

    /// Extract the declared invoice from NF-e XML
    Document(inspect::DocumentArgs),

    /// Extract item records from a portal report
    Portal(inspect::PortalArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Audit(args) => audit::run(args, cli.config.as_deref()),
        Commands::Batch(args) => batch::run(args, cli.config.as_deref()),
        Commands::Document(args) => inspect::run_document(args),
        Commands::Portal(args) => inspect::run_portal(args),
        Commands::Config(args) => config::run(args, cli.config.as_deref()),
    }
}
