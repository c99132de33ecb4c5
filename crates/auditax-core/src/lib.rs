//! Core library for NF-e tax auditing.
//!
//! This crate provides:
//! - Locale-aware money and percentage parsing
//! - NF-e invoice XML extraction into canonical item records
//! - SEFAZ memorial (HTML report) extraction into canonical item records
//! - Invoice consistency validation (totals and tax-regime constraints)
//! - Item reconciliation with an ordered, configurable rule set

pub mod error;
pub mod models;
pub mod extract;
pub mod audit;
pub mod calculator;

pub use error::{AuditError, AuditaxError, CalculationError, DocumentParseError, PortalExtractionError, Result};
pub use models::audit::{AuditDifference, AuditField, AuditReport, AuditSummary, ItemAuditResult, UnmatchedItem};
pub use models::config::{AuditConfig, ConsistencyConfig, ReconcileConfig};
pub use models::invoice::{InvoiceHeader, Party, Protocol, Totals};
pub use models::item::{CanonicalItemRecord, ItemDraft, Origin};
pub use extract::{DocumentExtractor, PortalReportExtractor};
pub use audit::{Auditor, ConsistencyValidator, Reconciler, Reconciliation, RuleSet};
pub use calculator::TaxCalculator;
