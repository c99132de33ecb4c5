//! Configuration structures for the audit pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main configuration for an audit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Item reconciliation configuration.
    pub reconcile: ReconcileConfig,

    /// Invoice consistency configuration.
    pub consistency: ConsistencyConfig,
}

/// Tolerances and execution settings for item reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Maximum accepted tax base difference.
    pub tax_base_tolerance: Decimal,

    /// Maximum accepted tax value difference.
    pub tax_value_tolerance: Decimal,

    /// Maximum accepted MVA percentage difference.
    pub mva_tolerance: Decimal,

    /// Tax value above which a SUFRAMA item is considered taxed.
    pub suframa_tax_threshold: Decimal,

    /// Width CST codes are zero-padded to before comparison.
    pub regime_code_width: usize,

    /// Declared item count from which items are reconciled in parallel.
    pub parallel_min_items: usize,

    /// Size of a dedicated worker pool (global rayon pool when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tax_base_tolerance: Decimal::new(5, 2),
            tax_value_tolerance: Decimal::new(5, 2),
            mva_tolerance: Decimal::new(5, 2),
            suframa_tax_threshold: Decimal::new(10, 2),
            regime_code_width: 3,
            parallel_min_items: 64,
            worker_threads: None,
        }
    }
}

/// Tolerances and code sets for invoice consistency checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Maximum difference between vProd and the item sum.
    pub total_products_tolerance: Decimal,

    /// Maximum difference between vICMS and the item sum.
    pub total_tax_tolerance: Decimal,

    /// Tax value still considered zero for exempt items.
    pub exempt_tax_epsilon: Decimal,

    /// CST codes that require a positive base and value.
    pub fully_taxed_codes: Vec<String>,

    /// CST codes that must not carry tax (exempt, not taxed, suspended).
    pub exempt_codes: Vec<String>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            total_products_tolerance: Decimal::new(5, 2),
            total_tax_tolerance: Decimal::new(10, 2),
            exempt_tax_epsilon: Decimal::new(1, 2),
            fully_taxed_codes: vec!["00".to_string()],
            exempt_codes: vec!["40".to_string(), "41".to_string(), "50".to_string()],
        }
    }
}

impl AuditConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
