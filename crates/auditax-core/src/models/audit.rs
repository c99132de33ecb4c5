//! Audit outputs: divergences, per-item verdicts and run summaries.

use std::fmt;

use serde::{Serialize, Serializer};

use super::invoice::InvoiceHeader;

/// Symbolic name of the field a divergence refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditField {
    Ncm,
    Cest,
    Cfop,
    /// CST / CSOSN.
    RegimeCode,
    TaxBase,
    TaxValue,
    MvaPercent,
    SuframaBenefit,
    /// Declared vProd against the item sum.
    TotalProducts,
    /// Declared vICMS against the item sum.
    TotalTax,
    /// Fully taxed item without base or value.
    FullyTaxedItem(u32),
    /// Exempt item carrying tax.
    ExemptItem(u32),
}

impl AuditField {
    /// Human readable label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            AuditField::Ncm => "NCM",
            AuditField::Cest => "CEST",
            AuditField::Cfop => "CFOP",
            AuditField::RegimeCode => "CST",
            AuditField::TaxBase => "tax base",
            AuditField::TaxValue => "tax value",
            AuditField::MvaPercent => "MVA %",
            AuditField::SuframaBenefit => "SUFRAMA benefit",
            AuditField::TotalProducts => "total products",
            AuditField::TotalTax => "total tax",
            AuditField::FullyTaxedItem(_) => "fully taxed item",
            AuditField::ExemptItem(_) => "exempt item",
        }
    }

    /// Whether the field comes from the consistency validator.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            AuditField::TotalProducts
                | AuditField::TotalTax
                | AuditField::FullyTaxedItem(_)
                | AuditField::ExemptItem(_)
        )
    }
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditField::Ncm => f.write_str("NCM"),
            AuditField::Cest => f.write_str("CEST"),
            AuditField::Cfop => f.write_str("CFOP"),
            AuditField::RegimeCode => f.write_str("CST"),
            AuditField::TaxBase => f.write_str("TAX_BASE"),
            AuditField::TaxValue => f.write_str("TAX_VALUE"),
            AuditField::MvaPercent => f.write_str("MVA_PERCENT"),
            AuditField::SuframaBenefit => f.write_str("SUFRAMA_BENEFIT"),
            AuditField::TotalProducts => f.write_str("TOTAL_PRODUCTS"),
            AuditField::TotalTax => f.write_str("TOTAL_TAX"),
            AuditField::FullyTaxedItem(index) => write!(f, "REGIME_TAXED_ITEM_{}", index),
            AuditField::ExemptItem(index) => write!(f, "REGIME_EXEMPT_ITEM_{}", index),
        }
    }
}

impl Serialize for AuditField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One divergence between declared and portal data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditDifference {
    field: AuditField,
    declared_value: String,
    portal_value: String,
    message: String,
}

impl AuditDifference {
    pub fn new(
        field: AuditField,
        declared_value: impl Into<String>,
        portal_value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field,
            declared_value: declared_value.into(),
            portal_value: portal_value.into(),
            message: message.into(),
        }
    }

    pub fn field(&self) -> AuditField {
        self.field
    }

    pub fn declared_value(&self) -> &str {
        &self.declared_value
    }

    pub fn portal_value(&self) -> &str {
        &self.portal_value
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Verdict for one matched item index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAuditResult {
    item_index: u32,
    product_code: String,
    is_compliant: bool,
    differences: Vec<AuditDifference>,
}

impl ItemAuditResult {
    /// Build a verdict; the item is compliant iff `differences` is empty.
    pub fn new(item_index: u32, product_code: impl Into<String>, differences: Vec<AuditDifference>) -> Self {
        Self {
            item_index,
            product_code: product_code.into(),
            is_compliant: differences.is_empty(),
            differences,
        }
    }

    pub fn item_index(&self) -> u32 {
        self.item_index
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn is_compliant(&self) -> bool {
        self.is_compliant
    }

    /// Divergences in rule order.
    pub fn differences(&self) -> &[AuditDifference] {
        &self.differences
    }
}

/// A declared item with no portal counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedItem {
    pub item_index: u32,
    pub product_code: String,
}

/// Counts persisted for an audit run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub compliant: usize,
    pub divergent: usize,
    pub consistency_issues: usize,
}

impl AuditSummary {
    pub fn from_results(results: &[ItemAuditResult], consistency_issues: usize) -> Self {
        let compliant = results.iter().filter(|r| r.is_compliant()).count();
        Self {
            total: results.len(),
            compliant,
            divergent: results.len() - compliant,
            consistency_issues,
        }
    }
}

/// Full output of one audit run.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Declared invoice, including its items.
    pub header: InvoiceHeader,

    /// Consistency divergences on the declared invoice.
    pub consistency: Vec<AuditDifference>,

    /// Per-item reconciliation verdicts, in declared order.
    pub items: Vec<ItemAuditResult>,

    /// Declared items missing from the portal report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<UnmatchedItem>,

    /// Portal item indexes with no declared counterpart.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portal_only: Vec<u32>,

    pub summary: AuditSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_display() {
        assert_eq!(AuditField::TaxValue.to_string(), "TAX_VALUE");
        assert_eq!(AuditField::FullyTaxedItem(4).to_string(), "REGIME_TAXED_ITEM_4");
        assert!(AuditField::ExemptItem(1).is_consistency());
        assert!(!AuditField::Ncm.is_consistency());
    }

    #[test]
    fn test_field_serializes_as_string() {
        let diff = AuditDifference::new(AuditField::Cfop, "6110", "5102", "CFOP mismatch");
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(json["field"], "CFOP");
        assert_eq!(json["declared_value"], "6110");
    }

    #[test]
    fn test_compliance_follows_differences() {
        let ok = ItemAuditResult::new(1, "A", Vec::new());
        let bad = ItemAuditResult::new(
            2,
            "B",
            vec![AuditDifference::new(AuditField::Ncm, "1", "2", "NCM mismatch")],
        );
        assert!(ok.is_compliant());
        assert!(!bad.is_compliant());

        let summary = AuditSummary::from_results(&[ok, bad], 3);
        assert_eq!(
            summary,
            AuditSummary {
                total: 2,
                compliant: 1,
                divergent: 1,
                consistency_issues: 3
            }
        );
    }
}
