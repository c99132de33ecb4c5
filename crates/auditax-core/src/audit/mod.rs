//! Audit pipeline: consistency validation and item reconciliation.

pub mod consistency;
pub mod engine;
pub mod rules;

pub use consistency::ConsistencyValidator;
pub use engine::{Reconciler, Reconciliation};
pub use rules::{AuditRule, RuleSet, normalize_regime_code};

use tracing::info;

use crate::error::Result;
use crate::extract::{DocumentExtractor, PortalReportExtractor};
use crate::models::audit::{AuditReport, AuditSummary};
use crate::models::config::AuditConfig;

/// Runs extraction, consistency validation and reconciliation for one invoice.
pub struct Auditor {
    documents: DocumentExtractor,
    portal: PortalReportExtractor,
    validator: ConsistencyValidator,
    reconciler: Reconciler,
}

impl Auditor {
    pub fn new(config: AuditConfig) -> Self {
        let width = config.reconcile.regime_code_width;
        Self {
            documents: DocumentExtractor::new(),
            portal: PortalReportExtractor::new(),
            validator: ConsistencyValidator::new(config.consistency, width),
            reconciler: Reconciler::new(config.reconcile),
        }
    }

    /// Audit `document_text` (NF-e XML) against `portal_html` (SEFAZ report).
    pub fn run(&self, document_text: &str, portal_html: &str) -> Result<AuditReport> {
        let header = self.documents.parse(document_text)?;
        let portal_items = self.portal.parse(portal_html)?;

        let consistency = self.validator.validate(&header);
        let reconciliation = self.reconciler.reconcile(&header.items, &portal_items)?;
        let summary = AuditSummary::from_results(&reconciliation.results, consistency.len());

        info!(
            "Audit of {}: {} compliant, {} divergent, {} consistency issues",
            header.access_key, summary.compliant, summary.divergent, summary.consistency_issues
        );

        Ok(AuditReport {
            header,
            consistency,
            items: reconciliation.results,
            unmatched: reconciliation.unmatched,
            portal_only: reconciliation.portal_only,
            summary,
        })
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}
