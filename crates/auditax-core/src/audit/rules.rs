//! Reconciliation rules comparing a declared item with its portal counterpart.

use rust_decimal::Decimal;
use tracing::warn;

use crate::error::RuleError;
use crate::models::audit::{AuditDifference, AuditField};
use crate::models::config::ReconcileConfig;
use crate::models::item::CanonicalItemRecord;

/// Trait for reconciliation rules.
pub trait AuditRule: Send + Sync {
    /// Short rule name, used in logs.
    fn name(&self) -> &'static str;

    /// Compare one item pair. `Ok(None)` means the pair agrees.
    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError>;
}

/// Normalize a tax-regime code: drop leading zeros, then left-pad to `width`.
///
/// `"40"`, `"040"` and `"0040"` all become `"040"` at width 3. An empty code
/// stays empty.
pub fn normalize_regime_code(code: &str, width: usize) -> Result<String, RuleError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(String::new());
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(RuleError::MalformedCode {
            field: "CST",
            value: code.to_string(),
        });
    }
    let significant = code.trim_start_matches('0');
    Ok(format!("{:0>width$}", significant, width = width))
}

fn code_difference(field: AuditField, declared: &str, portal: &str) -> Option<AuditDifference> {
    (declared != portal).then(|| {
        AuditDifference::new(
            field,
            declared,
            portal,
            format!("{} mismatch: declared {:?}, portal {:?}", field.label(), declared, portal),
        )
    })
}

pub struct NcmRule;

impl AuditRule for NcmRule {
    fn name(&self) -> &'static str {
        "ncm"
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        Ok(code_difference(AuditField::Ncm, declared.ncm(), portal.ncm()))
    }
}

/// CEST codes compare equal once separators are removed (17.024.00 = 1702400).
pub struct CestRule;

impl CestRule {
    fn strip(code: &str) -> String {
        code.chars().filter(|c| !matches!(c, '.' | '-' | ' ')).collect()
    }
}

impl AuditRule for CestRule {
    fn name(&self) -> &'static str {
        "cest"
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        let (d, p) = (Self::strip(declared.cest()), Self::strip(portal.cest()));
        Ok((d != p).then(|| {
            AuditDifference::new(
                AuditField::Cest,
                declared.cest(),
                portal.cest(),
                format!("CEST mismatch: declared {:?}, portal {:?}", d, p),
            )
        }))
    }
}

pub struct CfopRule;

impl AuditRule for CfopRule {
    fn name(&self) -> &'static str {
        "cfop"
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        Ok(code_difference(AuditField::Cfop, declared.cfop(), portal.cfop()))
    }
}

pub struct RegimeCodeRule {
    width: usize,
}

impl RegimeCodeRule {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl AuditRule for RegimeCodeRule {
    fn name(&self) -> &'static str {
        "regime_code"
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        let d = normalize_regime_code(declared.cst(), self.width)?;
        let p = normalize_regime_code(portal.cst(), self.width)?;
        Ok(code_difference(AuditField::RegimeCode, &d, &p))
    }
}

/// Numeric comparison with an absolute tolerance.
pub struct ToleranceRule {
    field: AuditField,
    tolerance: Decimal,
    value: fn(&CanonicalItemRecord) -> Decimal,
}

impl ToleranceRule {
    pub fn new(field: AuditField, tolerance: Decimal, value: fn(&CanonicalItemRecord) -> Decimal) -> Self {
        Self { field, tolerance, value }
    }

    pub fn tax_base(tolerance: Decimal) -> Self {
        Self::new(AuditField::TaxBase, tolerance, CanonicalItemRecord::tax_base)
    }

    pub fn tax_value(tolerance: Decimal) -> Self {
        Self::new(AuditField::TaxValue, tolerance, CanonicalItemRecord::tax_value)
    }

    pub fn mva_percent(tolerance: Decimal) -> Self {
        Self::new(AuditField::MvaPercent, tolerance, CanonicalItemRecord::mva_percent)
    }
}

impl AuditRule for ToleranceRule {
    fn name(&self) -> &'static str {
        self.field.label()
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        let (d, p) = ((self.value)(declared), (self.value)(portal));
        let delta = d.checked_sub(p).ok_or(RuleError::Overflow(self.field.label()))?.abs();
        if delta <= self.tolerance {
            return Ok(None);
        }
        Ok(Some(AuditDifference::new(
            self.field,
            d.to_string(),
            p.to_string(),
            format!(
                "{} differs by {} (tolerance {})",
                self.field.label(),
                delta,
                self.tolerance
            ),
        )))
    }
}

/// Free-trade-zone benefit: both sides must agree on the claim, and a claimed
/// benefit leaves (almost) no tax to collect.
pub struct SuframaBenefitRule {
    threshold: Decimal,
}

impl SuframaBenefitRule {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }
}

impl AuditRule for SuframaBenefitRule {
    fn name(&self) -> &'static str {
        "suframa"
    }

    fn check(
        &self,
        declared: &CanonicalItemRecord,
        portal: &CanonicalItemRecord,
    ) -> Result<Option<AuditDifference>, RuleError> {
        let field = AuditField::SuframaBenefit;
        let difference = match (declared.is_suframa_benefit(), portal.is_suframa_benefit()) {
            (false, false) => None,
            (true, true) => {
                let (d, p) = (declared.tax_value(), portal.tax_value());
                (d > self.threshold || p > self.threshold).then(|| {
                    AuditDifference::new(
                        field,
                        d.to_string(),
                        p.to_string(),
                        format!("benefit claimed on both sides but tax value exceeds {}", self.threshold),
                    )
                })
            }
            (d, p) => Some(AuditDifference::new(
                field,
                d.to_string(),
                p.to_string(),
                format!(
                    "benefit claimed only by the {} side",
                    if d { "declared" } else { "portal" }
                ),
            )),
        };
        Ok(difference)
    }
}

/// Ordered rule pipeline. Every rule runs for every pair.
pub struct RuleSet {
    rules: Vec<Box<dyn AuditRule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn AuditRule>>) -> Self {
        Self { rules }
    }

    /// The standard pipeline: NCM, CEST, CFOP, CST, tax base, tax value, MVA, SUFRAMA.
    pub fn standard(config: &ReconcileConfig) -> Self {
        Self::new(vec![
            Box::new(NcmRule),
            Box::new(CestRule),
            Box::new(CfopRule),
            Box::new(RegimeCodeRule::new(config.regime_code_width)),
            Box::new(ToleranceRule::tax_base(config.tax_base_tolerance)),
            Box::new(ToleranceRule::tax_value(config.tax_value_tolerance)),
            Box::new(ToleranceRule::mva_percent(config.mva_tolerance)),
            Box::new(SuframaBenefitRule::new(config.suframa_tax_threshold)),
        ])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule in order, collecting differences. A rule that fails is
    /// logged and skipped.
    pub fn evaluate(&self, declared: &CanonicalItemRecord, portal: &CanonicalItemRecord) -> Vec<AuditDifference> {
        self.rules
            .iter()
            .filter_map(|rule| match rule.check(declared, portal) {
                Ok(difference) => difference,
                Err(e) => {
                    warn!("Rule {} skipped for item {}: {}", rule.name(), declared.item_index(), e);
                    None
                }
            })
            .collect()
    }
}
