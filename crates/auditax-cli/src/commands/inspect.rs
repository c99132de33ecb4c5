//! Document and portal commands - run one extractor and print its records.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use auditax_core::{DocumentExtractor, PortalReportExtractor};

use super::input::{InputEncoding, read_text, write_diagnostic};

/// Arguments for the document command.
#[derive(Args)]
pub struct DocumentArgs {
    /// NF-e XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Print only the warnings collected while parsing
    #[arg(long)]
    warnings: bool,
}

/// Arguments for the portal command.
#[derive(Args)]
pub struct PortalArgs {
    /// SEFAZ portal report (HTML)
    #[arg(required = true)]
    input: PathBuf,

    /// Encoding of the report
    #[arg(long, value_enum, default_value = "auto")]
    encoding: InputEncoding,

    /// Directory for the diagnostic copy of a report without items
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn run_document(args: DocumentArgs) -> anyhow::Result<()> {
    let xml = read_text(&args.input, InputEncoding::Auto)?;
    let header = DocumentExtractor::new().parse(&xml)?;
    info!("{} items declared", header.item_count());

    if args.warnings {
        for warning in &header.warnings {
            println!("{}", warning);
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&header)?);
    Ok(())
}

pub fn run_portal(args: PortalArgs) -> anyhow::Result<()> {
    let html = read_text(&args.input, args.encoding)?;

    let records = match PortalReportExtractor::new().parse(&html) {
        Ok(records) => records,
        Err(e) => {
            if let Some(dir) = &args.dump_dir {
                let path = write_diagnostic(dir, &html)?;
                eprintln!("{} Report copy kept at {}", style("ℹ").blue(), path.display());
            }
            return Err(e.into());
        }
    };

    let json = serde_json::to_string_pretty(&records)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!(
                "{} {} items written to {}",
                style("✓").green(),
                records.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
