//! Batch command - audit many invoices, pairing each XML with its report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use auditax_core::AuditReport;

use super::audit::audit_files;
use super::input::{InputEncoding, load_config};
use super::render::{OutputFormat, format_report};

/// Report extensions tried, in order, next to each invoice.
const REPORT_EXTENSIONS: [&str; 2] = ["html", "htm"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for NF-e XML files
    #[arg(required = true)]
    input: String,

    /// Directory holding the reports, named after each XML file (default: next to the XML)
    #[arg(short, long)]
    reports_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each invoice
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Encoding of the reports
    #[arg(long, value_enum, default_value = "auto")]
    encoding: InputEncoding,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of auditing a single invoice.
struct BatchResult {
    path: PathBuf,
    report: Option<AuditReport>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            ext.eq_ignore_ascii_case("xml")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!(
        "{} Found {} invoices to audit",
        style("ℹ").blue(),
        files.len()
    );

    let dump_root = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} invoices")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file_start = Instant::now();
        let outcome = find_report(&path, args.reports_dir.as_deref()).and_then(|report_path| {
            let dump_dir = dump_root.join(stem(&path));
            audit_files(&path, &report_path, args.encoding, &dump_dir, &config)
        });
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => results.push(BatchResult {
                path: path.clone(),
                report: Some(report),
                error: None,
                processing_time_ms,
            }),
            Err(e) => {
                let error_msg = format!("{:#}", e);
                if !args.continue_on_error {
                    error!("Failed to audit {}: {}", path.display(), error_msg);
                    pb.abandon();
                    anyhow::bail!("Audit failed: {}", error_msg);
                }
                warn!("Failed to audit {}: {}", path.display(), error_msg);
                results.push(BatchResult {
                    path: path.clone(),
                    report: None,
                    error: Some(error_msg),
                    processing_time_ms,
                });
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(report) = &result.report {
                let output_path = output_dir.join(format!("{}.{}", stem(&result.path), args.format.extension()));
                fs::write(&output_path, format_report(report, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        eprintln!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let divergent = results
        .iter()
        .filter_map(|r| r.report.as_ref())
        .filter(|r| r.summary.divergent > 0 || r.summary.consistency_issues > 0)
        .count();

    eprintln!();
    eprintln!(
        "{} Audited {} invoices in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    eprintln!(
        "   {} with findings, {} failed",
        style(divergent).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        eprintln!();
        eprintln!("{}", style("Failed invoices:").red());
        for result in &failed {
            eprintln!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice")
        .to_string()
}

/// Locate the report for `document`: same stem, `.html` or `.htm`.
fn find_report(document: &Path, reports_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = reports_dir
        .or_else(|| document.parent())
        .unwrap_or_else(|| Path::new("."));
    let name = stem(document);

    REPORT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| anyhow::anyhow!("No portal report found for {} in {}", name, dir.display()))
}

fn write_summary(path: &Path, results: &[BatchResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "access_key",
        "total",
        "compliant",
        "divergent",
        "consistency_issues",
        "unmatched",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result.path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        if let Some(report) = &result.report {
            let summary = &report.summary;
            wtr.write_record([
                filename,
                "success",
                &report.header.access_key,
                &summary.total.to_string(),
                &summary.compliant.to_string(),
                &summary.divergent.to_string(),
                &summary.consistency_issues.to_string(),
                &report.unmatched.len().to_string(),
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
