//! Audit command - reconcile one invoice with its portal report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use auditax_core::{AuditConfig, AuditReport, AuditaxError, Auditor};

use super::input::{InputEncoding, load_config, read_text, write_diagnostic};
use super::render::{OutputFormat, format_report};

/// Arguments for the audit command.
#[derive(Args)]
pub struct AuditArgs {
    /// NF-e XML file
    #[arg(short, long)]
    document: PathBuf,

    /// SEFAZ portal report (HTML)
    #[arg(short, long)]
    portal: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Encoding of the portal report
    #[arg(long, value_enum, default_value = "auto")]
    encoding: InputEncoding,

    /// Directory for the diagnostic copy of a report without items
    #[arg(long, default_value = ".")]
    dump_dir: PathBuf,

    /// Exit with status 2 when any divergence is found
    #[arg(long)]
    strict: bool,
}

pub fn run(args: AuditArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    info!("Auditing {} against {}", args.document.display(), args.portal.display());
    let report = audit_files(&args.document, &args.portal, args.encoding, &args.dump_dir, &config)?;

    let output = format_report(&report, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total audit time: {:?}", start.elapsed());

    if args.strict && (report.summary.divergent > 0 || report.summary.consistency_issues > 0) {
        std::process::exit(2);
    }
    Ok(())
}

/// Read both inputs and run the audit, keeping a diagnostic copy of a
/// report that yields no items.
pub fn audit_files(
    document: &Path,
    portal: &Path,
    encoding: InputEncoding,
    dump_dir: &Path,
    config: &AuditConfig,
) -> anyhow::Result<AuditReport> {
    let xml = read_text(document, InputEncoding::Auto)?;
    let html = read_text(portal, encoding)?;

    match Auditor::new(config.clone()).run(&xml, &html) {
        Ok(report) => Ok(report),
        Err(AuditaxError::Portal(e)) => {
            let path = write_diagnostic(dump_dir, &html)?;
            eprintln!(
                "{} Report copy kept at {}",
                style("ℹ").blue(),
                path.display()
            );
            Err(AuditaxError::Portal(e).into())
        }
        Err(e) => Err(e.into()),
    }
}
