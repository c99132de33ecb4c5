//! SEFAZ portal report ("memorial de cálculo") extraction.

pub mod blocks;
pub mod summary;

use rust_decimal::Decimal;
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::error::PortalExtractionError;
use crate::extract::money::{comma_decimal, parse_money, parse_percent, parse_period_decimal};
use crate::extract::patterns::{
    CFOP_PREFIX, INTERNAL_RATE, LEADING_DIGITS, MONEY_PATTERN, MVA_ADJUSTED, MVA_ORIGINAL, SUFRAMA_BENEFIT,
    TAX_BASE_LINE,
};
use crate::models::item::{CanonicalItemRecord, ItemDraft, Origin};

use blocks::{ItemBlock, item_headings, read_block};
use summary::SummaryTable;

/// A field reader; strategies for one field are tried in order.
type Strategy<T> = fn(&ItemBlock) -> Option<T>;

fn first_match<T>(block: &ItemBlock, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(block))
}

/// Extracts portal-side item records from the report HTML.
pub struct PortalReportExtractor;

impl PortalReportExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse the report into one record per item block.
    ///
    /// Malformed blocks are logged and skipped. Fails only when no block
    /// yields a record.
    pub fn parse(&self, html: &str) -> Result<Vec<CanonicalItemRecord>, PortalExtractionError> {
        let document = Html::parse_document(html);
        let summary = SummaryTable::extract(&document);

        let headings = item_headings(&document);
        info!("Found {} item blocks", headings.len());

        let mut records = Vec::with_capacity(headings.len());
        let mut seen = HashSet::new();
        for heading in &headings {
            let block = match read_block(*heading) {
                Ok(block) => block,
                Err(e) => {
                    error!("Skipping item block: {}", e);
                    continue;
                }
            };

            if !seen.insert(block.index) {
                warn!("Duplicate item block {}, keeping the first", block.index);
                continue;
            }

            match self.build_record(&block, &summary) {
                Ok(record) => {
                    debug!(
                        "Item {}: product {} tax value {}",
                        record.item_index(),
                        record.product_code(),
                        record.tax_value()
                    );
                    records.push(record);
                }
                Err(e) => error!("Skipping item block {}: {}", block.index, e),
            }
        }

        if records.is_empty() {
            return Err(PortalExtractionError::NoItems {
                blocks_found: headings.len(),
            });
        }

        info!("Extracted {} portal items", records.len());
        Ok(records)
    }

    fn build_record(
        &self,
        block: &ItemBlock,
        summary: &SummaryTable,
    ) -> Result<CanonicalItemRecord, crate::error::RecordError> {
        let mut draft = ItemDraft::new(block.index);

        let product = block.labels.get("PRODUTO").unwrap_or("");
        let (code, rest) = product.split_once(' ').unwrap_or((product, ""));
        draft.product_code = code.to_string();
        draft.product_description = first_match(block, &[read_description])
            .unwrap_or_else(|| rest.trim().to_string());

        draft.ncm = first_token(block.labels.get("NCM"))
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        draft.cest = first_token(block.labels.get("CEST")).to_string();
        draft.cst = block
            .labels
            .get("CST")
            .and_then(|v| LEADING_DIGITS.captures(v))
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();

        draft.cfop = match summary.code_for(block.index) {
            Some(code) => code.to_string(),
            None => first_match(block, &[read_operation_code]).unwrap_or_default(),
        };

        draft.tax_value = first_match(
            block,
            &[collected_from_value, collected_from_label, collected_from_loose_amount],
        )
        .unwrap_or(Decimal::ZERO);
        draft.mva_percent = first_match(block, &[adjusted_mva, original_mva]).unwrap_or(Decimal::ZERO);
        draft.tax_base = first_match(block, &[calculation_base]).unwrap_or(Decimal::ZERO);
        draft.tax_rate = first_match(block, &[internal_rate]).unwrap_or(Decimal::ZERO);

        let benefit = first_match(block, &[suframa_benefit]).unwrap_or(Decimal::ZERO);
        draft.benefit_value = benefit;
        draft.is_suframa_benefit = benefit > Decimal::ZERO;

        draft.build(Origin::Portal)
    }
}

impl Default for PortalReportExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn first_token(value: Option<&str>) -> &str {
    value.and_then(|v| v.split_whitespace().next()).unwrap_or("")
}

fn read_description(block: &ItemBlock) -> Option<String> {
    block
        .labels
        .starting_with("DESCRI")
        .map(|e| e.value.clone())
        .filter(|v| !v.is_empty())
}

fn read_operation_code(block: &ItemBlock) -> Option<String> {
    ["OPERACAO", "NATUREZA", "CFOP"].iter().find_map(|prefix| {
        block
            .labels
            .starting_with(prefix)
            .and_then(|e| CFOP_PREFIX.captures(&e.value))
            .map(|caps| caps[1].to_string())
    })
}

fn money_in(text: &str) -> Option<Decimal> {
    MONEY_PATTERN.is_match(text).then(|| parse_money(text))
}

fn collected_from_value(block: &ItemBlock) -> Option<Decimal> {
    block
        .labels
        .starting_with("CALCULO VALOR")
        .and_then(|e| money_in(&e.value))
}

fn collected_from_label(block: &ItemBlock) -> Option<Decimal> {
    block
        .labels
        .starting_with("CALCULO VALOR")
        .and_then(|e| money_in(&e.raw_label))
}

fn collected_from_loose_amount(block: &ItemBlock) -> Option<Decimal> {
    block.labels.unlabeled_amount().and_then(money_in)
}

/// First capture of `pattern` across the calculation lines.
fn scan_lines<'a>(block: &'a ItemBlock, pattern: &regex::Regex) -> Option<&'a str> {
    block
        .calculation_lines
        .iter()
        .find_map(|line| pattern.captures(line).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}

// The adjusted margin is printed period-decimal, unlike every other figure
fn adjusted_mva(block: &ItemBlock) -> Option<Decimal> {
    scan_lines(block, &MVA_ADJUSTED).map(parse_period_decimal)
}

fn original_mva(block: &ItemBlock) -> Option<Decimal> {
    scan_lines(block, &MVA_ORIGINAL).and_then(comma_decimal)
}

fn calculation_base(block: &ItemBlock) -> Option<Decimal> {
    scan_lines(block, &TAX_BASE_LINE).map(parse_money)
}

fn internal_rate(block: &ItemBlock) -> Option<Decimal> {
    scan_lines(block, &INTERNAL_RATE).map(|rate| parse_percent(&format!("{}%", rate)))
}

fn suframa_benefit(block: &ItemBlock) -> Option<Decimal> {
    scan_lines(block, &SUFRAMA_BENEFIT).map(parse_money)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"<html><body>
<table>
  <tr><td colspan="4"><b>INFORMAÇÕES DETALHADAS DA COBRANÇA</b></td></tr>
  <tr><td>ITEM</td><td>OPERAÇÃO</td><td>CFOP</td><td>VALOR</td></tr>
  <tr><td>1</td><td>ST</td><td>6110-VENDA DE MERCADORIA</td><td>455,25</td></tr>
</table>
<table>
  <tr>
    <td><h2>ITEM:1</h2></td>
    <td><h5>PRODUTO</h5>QJ-01 QUEIJO PRATO FATIADO</td>
    <td><h5>NCM</h5>0406.90.20 <h5>CEST</h5>17.024.00</td>
    <td><h5>CST</h5>040 ST DESTACADO</td>
    <td><h5>CÁLCULO VALOR(SEFAZ)</h5>R$ 455,25</td>
  </tr>
  <tr><td>A) VALOR DOS PRODUTOS = R$ 1.000,00</td></tr>
  <tr><td>MVA ORIGINAL 30,00% MVA AJUSTADA = 39.51%</td></tr>
  <tr><td>F) BASE DE CALCULO ST = R$ 2.457,05 ALIQUOTA INTERNA = 20,50% DESONERAÇÃO DA SUFRAMA R$ 540,98</td></tr>
  <tr>
    <td><h2>ITEM:2 - SEGUNDO</h2></td>
    <td><h5>PRODUTO</h5>QJ-02</td>
    <td><h5>CST</h5>00</td>
    <td>R$ 12,30</td>
  </tr>
  <tr><td>MVA ORIGINAL 30,00%</td></tr>
  <tr><td><h2>ITEM:</h2></td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_parse_full_block() {
        let records = PortalReportExtractor::new().parse(REPORT).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.origin(), Origin::Portal);
        assert_eq!(first.item_index(), 1);
        assert_eq!(first.product_code(), "QJ-01");
        assert_eq!(first.product_description(), "QUEIJO PRATO FATIADO");
        assert_eq!(first.ncm(), "04069020");
        assert_eq!(first.cest(), "17.024.00");
        assert_eq!(first.cfop(), "6110");
        assert_eq!(first.cst(), "040");
        assert_eq!(first.tax_value(), Decimal::new(45525, 2));
        assert_eq!(first.mva_percent(), Decimal::new(3951, 2));
        assert_eq!(first.tax_base(), Decimal::new(245705, 2));
        assert_eq!(first.tax_rate(), Decimal::new(2050, 2));
        assert_eq!(first.benefit_value(), Decimal::new(54098, 2));
        assert!(first.is_suframa_benefit());
        assert_eq!(first.amount_total(), Decimal::ZERO);
    }

    #[test]
    fn test_fallbacks_for_sparse_block() {
        let records = PortalReportExtractor::new().parse(REPORT).unwrap();
        let second = &records[1];

        assert_eq!(second.item_index(), 2);
        assert_eq!(second.cfop(), "6110");
        assert_eq!(second.cst(), "00");
        assert_eq!(second.tax_value(), Decimal::new(1230, 2));
        assert_eq!(second.mva_percent(), Decimal::new(30, 0));
        assert!(!second.is_suframa_benefit());
    }

    #[test]
    fn test_operation_label_when_summary_missing() {
        let html = r#"<table><tr><td><h2>ITEM:3</h2></td>
            <td><h5>NATUREZA DA OPERAÇÃO</h5>5405 - VENDA</td></tr></table>"#;
        let records = PortalReportExtractor::new().parse(html).unwrap();
        assert_eq!(records[0].cfop(), "5405");
    }

    #[test]
    fn test_summary_grid_nested_in_titled_table() {
        let html = r#"<html><body>
<table>
  <tr><th>INFORMAÇÕES DETALHADAS DA COBRANÇA</th></tr>
  <tr><td><table>
    <tr><td>ITEM</td><td>OPERAÇÃO</td><td>CFOP</td></tr>
    <tr><td>1</td><td>ST</td><td>6110-VENDA</td></tr>
  </table></td></tr>
</table>
<table><tr><td><h2>ITEM:1</h2></td><td><h5>PRODUTO</h5>QJ-01</td></tr></table>
</body></html>"#;
        let records = PortalReportExtractor::new().parse(html).unwrap();
        assert_eq!(records[0].cfop(), "6110");
    }

    #[test]
    fn test_duplicate_blocks_keep_first() {
        let html = r#"<table>
            <tr><td><h2>ITEM:1</h2></td><td><h5>PRODUTO</h5>A</td></tr>
            <tr><td><h2>ITEM:1</h2></td><td><h5>PRODUTO</h5>B</td></tr></table>"#;
        let records = PortalReportExtractor::new().parse(html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_code(), "A");
    }

    #[test]
    fn test_no_blocks_is_an_error() {
        let err = PortalReportExtractor::new()
            .parse("<html><body><h2>ITEM:x</h2><div><h2>ITEM:1</h2></div></body></html>")
            .unwrap_err();
        assert_eq!(err, PortalExtractionError::NoItems { blocks_found: 1 });
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = PortalReportExtractor::new();
        assert_eq!(extractor.parse(REPORT).unwrap(), extractor.parse(REPORT).unwrap());
    }
}
