//! Report rendering: JSON, CSV rows and a plain-text summary.

use auditax_core::{AuditDifference, AuditField, AuditReport};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per finding
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn format_report(report: &AuditReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => format_csv(report),
        OutputFormat::Text => Ok(format_text(report)),
    }
}

const CSV_HEADER: [&str; 7] = ["kind", "item", "product", "field", "declared", "portal", "message"];

fn format_csv(report: &AuditReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;

    for difference in &report.consistency {
        let item = match difference.field() {
            AuditField::FullyTaxedItem(index) | AuditField::ExemptItem(index) => index.to_string(),
            _ => String::new(),
        };
        write_difference(&mut wtr, "consistency", &item, "", difference)?;
    }

    for result in &report.items {
        let item = result.item_index().to_string();
        if result.is_compliant() {
            wtr.write_record(["audit", &item, result.product_code(), "", "", "", "compliant"])?;
        }
        for difference in result.differences() {
            write_difference(&mut wtr, "audit", &item, result.product_code(), difference)?;
        }
    }

    for unmatched in &report.unmatched {
        wtr.write_record([
            "audit",
            &unmatched.item_index.to_string(),
            &unmatched.product_code,
            "",
            "",
            "",
            "not found in portal report",
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn write_difference<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    kind: &str,
    item: &str,
    product: &str,
    difference: &AuditDifference,
) -> csv::Result<()> {
    wtr.write_record([
        kind,
        item,
        product,
        &difference.field().to_string(),
        difference.declared_value(),
        difference.portal_value(),
        difference.message(),
    ])
}

pub fn format_text(report: &AuditReport) -> String {
    let header = &report.header;
    let summary = &report.summary;
    let mut output = String::new();

    output.push_str(&format!("Invoice: {} (series {})\n", header.number, header.series));
    output.push_str(&format!("Access key: {}\n", header.access_key));
    if header.has_issue_date() {
        output.push_str(&format!("Issued: {}\n", header.issue_date));
    }
    output.push_str(&format!("Issuer: {} {}\n", header.issuer.name, header.issuer.tax_id));
    output.push_str(&format!("Recipient: {} {}\n", header.recipient.name, header.recipient.tax_id));
    output.push('\n');

    output.push_str("Summary:\n");
    output.push_str(&format!("  Items audited:      {}\n", summary.total));
    output.push_str(&format!("  Compliant:          {}\n", summary.compliant));
    output.push_str(&format!("  Divergent:          {}\n", summary.divergent));
    output.push_str(&format!("  Consistency issues: {}\n", summary.consistency_issues));
    if !report.unmatched.is_empty() {
        output.push_str(&format!("  Not in report:      {}\n", report.unmatched.len()));
    }

    if !report.consistency.is_empty() {
        output.push_str("\nConsistency:\n");
        for difference in &report.consistency {
            output.push_str(&format!("  - {}\n", difference.message()));
        }
    }

    let divergent: Vec<_> = report.items.iter().filter(|r| !r.is_compliant()).collect();
    if !divergent.is_empty() {
        output.push_str("\nDivergences:\n");
        for result in divergent {
            output.push_str(&format!("  Item {} ({}):\n", result.item_index(), result.product_code()));
            for difference in result.differences() {
                output.push_str(&format!("    - {}\n", difference.message()));
            }
        }
    }

    if !header.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &header.warnings {
            output.push_str(&format!("  - {}\n", warning));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditax_core::{AuditSummary, InvoiceHeader, ItemAuditResult, UnmatchedItem};

    fn report() -> AuditReport {
        let items = vec![
            ItemAuditResult::new(1, "A", vec![]),
            ItemAuditResult::new(
                2,
                "B",
                vec![AuditDifference::new(
                    AuditField::TaxValue,
                    "18.00",
                    "18.10",
                    "tax value differs by 0.10 (tolerance 0.05)",
                )],
            ),
        ];
        let consistency = vec![AuditDifference::new(AuditField::ExemptItem(3), "CST 40", "5.00", "exempt")];
        AuditReport {
            header: InvoiceHeader::new(),
            summary: AuditSummary::from_results(&items, consistency.len()),
            consistency,
            items,
            unmatched: vec![UnmatchedItem {
                item_index: 4,
                product_code: "D".into(),
            }],
            portal_only: vec![],
        }
    }

    #[test]
    fn test_csv_rows_are_tagged() {
        let csv = format_report(&report(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "kind,item,product,field,declared,portal,message");
        assert_eq!(lines[1], "consistency,3,,REGIME_EXEMPT_ITEM_3,CST 40,5.00,exempt");
        assert_eq!(lines[2], "audit,1,A,,,,compliant");
        assert_eq!(
            lines[3],
            "audit,2,B,TAX_VALUE,18.00,18.10,tax value differs by 0.10 (tolerance 0.05)"
        );
        assert_eq!(lines[4], "audit,4,D,,,,not found in portal report");
    }

    #[test]
    fn test_text_summary() {
        let text = format_text(&report());
        assert!(text.contains("Compliant:          1"));
        assert!(text.contains("Item 2 (B):"));
        assert!(text.contains("Not in report:      1"));
    }

    #[test]
    fn test_json_contains_summary() {
        let json = format_report(&report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["divergent"], 1);
    }
}
