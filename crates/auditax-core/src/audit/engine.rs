//! Item reconciliation: join declared and portal items by index and run the
//! rule pipeline on every matched pair.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::AuditError;
use crate::models::audit::{ItemAuditResult, UnmatchedItem};
use crate::models::config::ReconcileConfig;
use crate::models::item::{CanonicalItemRecord, Origin};

use super::rules::RuleSet;

/// Outcome of reconciling two item lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// One verdict per matched item, in declared order.
    pub results: Vec<ItemAuditResult>,

    /// Declared items the portal does not list.
    pub unmatched: Vec<UnmatchedItem>,

    /// Portal item indexes with no declared counterpart.
    pub portal_only: Vec<u32>,
}

pub struct Reconciler {
    rules: RuleSet,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            rules: RuleSet::standard(&config),
            config,
        }
    }

    /// Use a custom rule pipeline.
    pub fn with_rules(config: ReconcileConfig, rules: RuleSet) -> Self {
        Self { rules, config }
    }

    pub fn reconcile(
        &self,
        declared: &[CanonicalItemRecord],
        portal: &[CanonicalItemRecord],
    ) -> Result<Reconciliation, AuditError> {
        ensure_unique(declared, Origin::Declared)?;
        let portal_by_index = index_items(portal)?;

        let mut pairs = Vec::with_capacity(declared.len());
        let mut unmatched = Vec::new();
        for item in declared {
            match portal_by_index.get(&item.item_index()) {
                Some(counterpart) => pairs.push((item, *counterpart)),
                None => {
                    warn!("Item {} not found in portal report", item.item_index());
                    unmatched.push(UnmatchedItem {
                        item_index: item.item_index(),
                        product_code: item.product_code().to_string(),
                    });
                }
            }
        }

        let declared_indexes: HashSet<u32> = declared.iter().map(|i| i.item_index()).collect();
        let portal_only: Vec<u32> = portal
            .iter()
            .map(|i| i.item_index())
            .filter(|index| !declared_indexes.contains(index))
            .collect();
        if !portal_only.is_empty() {
            debug!("Portal items without declared counterpart: {:?}", portal_only);
        }

        let results = self.evaluate_pairs(&pairs)?;
        info!(
            "Reconciled {} items ({} unmatched, {} portal only)",
            results.len(),
            unmatched.len(),
            portal_only.len()
        );

        Ok(Reconciliation {
            results,
            unmatched,
            portal_only,
        })
    }

    fn evaluate_pairs(
        &self,
        pairs: &[(&CanonicalItemRecord, &CanonicalItemRecord)],
    ) -> Result<Vec<ItemAuditResult>, AuditError> {
        if pairs.len() < self.config.parallel_min_items {
            return Ok(pairs.iter().map(|(d, p)| self.evaluate(d, p)).collect());
        }

        let run = || -> Vec<ItemAuditResult> { pairs.par_iter().map(|(d, p)| self.evaluate(d, p)).collect() };
        match self.config.worker_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| AuditError::unexpected("building reconciliation worker pool", e))?;
                Ok(pool.install(run))
            }
            None => Ok(run()),
        }
    }

    fn evaluate(&self, declared: &CanonicalItemRecord, portal: &CanonicalItemRecord) -> ItemAuditResult {
        let differences = self.rules.evaluate(declared, portal);
        debug!("Item {}: {} differences", declared.item_index(), differences.len());
        ItemAuditResult::new(declared.item_index(), declared.product_code(), differences)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

fn ensure_unique(items: &[CanonicalItemRecord], origin: Origin) -> Result<(), AuditError> {
    let mut seen = HashSet::with_capacity(items.len());
    match items.iter().find(|i| !seen.insert(i.item_index())) {
        Some(duplicate) => Err(AuditError::DuplicateItemIndex {
            origin,
            index: duplicate.item_index(),
        }),
        None => Ok(()),
    }
}

fn index_items(items: &[CanonicalItemRecord]) -> Result<HashMap<u32, &CanonicalItemRecord>, AuditError> {
    ensure_unique(items, Origin::Portal)?;
    Ok(items.iter().map(|i| (i.item_index(), i)).collect())
}
