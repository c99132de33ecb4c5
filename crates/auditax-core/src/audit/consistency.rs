//! Internal consistency of the declared invoice.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::models::audit::{AuditDifference, AuditField};
use crate::models::config::ConsistencyConfig;
use crate::models::invoice::InvoiceHeader;
use crate::models::item::CanonicalItemRecord;

use super::rules::normalize_regime_code;

/// Checks declared totals against item sums and each item's tax regime
/// against its amounts. Every check always runs.
pub struct ConsistencyValidator {
    config: ConsistencyConfig,
    fully_taxed: Vec<String>,
    exempt: Vec<String>,
    width: usize,
}

impl ConsistencyValidator {
    /// `width` is the regime-code width used to compare configured codes with item codes.
    pub fn new(config: ConsistencyConfig, width: usize) -> Self {
        let normalize = |codes: &[String]| -> Vec<String> {
            codes
                .iter()
                .filter_map(|c| normalize_regime_code(c, width).ok())
                .filter(|c| !c.is_empty())
                .collect()
        };
        Self {
            fully_taxed: normalize(&config.fully_taxed_codes),
            exempt: normalize(&config.exempt_codes),
            config,
            width,
        }
    }

    pub fn validate(&self, header: &InvoiceHeader) -> Vec<AuditDifference> {
        let mut differences = Vec::new();

        differences.extend(total_check(
            AuditField::TotalProducts,
            header.totals.products,
            header.items_amount_total(),
            self.config.total_products_tolerance,
        ));
        differences.extend(total_check(
            AuditField::TotalTax,
            header.totals.tax,
            header.items_tax_total(),
            self.config.total_tax_tolerance,
        ));

        for item in &header.items {
            let Ok(code) = normalize_regime_code(item.cst(), self.width) else {
                debug!("Item {} has a non-numeric regime code {:?}", item.item_index(), item.cst());
                continue;
            };
            if self.fully_taxed.contains(&code) {
                differences.extend(self.fully_taxed_check(item));
            }
            if self.exempt.contains(&code) {
                differences.extend(self.exempt_check(item));
            }
        }

        info!("Consistency validation found {} issues", differences.len());
        differences
    }

    fn fully_taxed_check(&self, item: &CanonicalItemRecord) -> Option<AuditDifference> {
        let ok = item.tax_base() > Decimal::ZERO && item.tax_value() > Decimal::ZERO;
        (!ok).then(|| {
            AuditDifference::new(
                AuditField::FullyTaxedItem(item.item_index()),
                format!("CST {}", item.cst()),
                format!("base {} / tax {}", item.tax_base(), item.tax_value()),
                format!(
                    "item {} is fully taxed but has no tax base or tax value",
                    item.item_index()
                ),
            )
        })
    }

    fn exempt_check(&self, item: &CanonicalItemRecord) -> Option<AuditDifference> {
        (item.tax_value().abs() > self.config.exempt_tax_epsilon).then(|| {
            AuditDifference::new(
                AuditField::ExemptItem(item.item_index()),
                format!("CST {}", item.cst()),
                item.tax_value().to_string(),
                format!(
                    "item {} is exempt but declares tax value {}",
                    item.item_index(),
                    item.tax_value()
                ),
            )
        })
    }
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self::new(ConsistencyConfig::default(), 3)
    }
}

fn total_check(
    field: AuditField,
    declared: Decimal,
    computed: Option<Decimal>,
    tolerance: Decimal,
) -> Option<AuditDifference> {
    let Some(computed) = computed else {
        warn!("Item sum for {} overflowed", field.label());
        return Some(AuditDifference::new(
            field,
            declared.to_string(),
            "overflow".to_string(),
            format!("item sum for {} overflowed", field.label()),
        ));
    };
    let Some(delta) = declared.checked_sub(computed).map(|d| d.abs()) else {
        warn!("Declared {} minus item sum overflowed", field.label());
        return Some(AuditDifference::new(
            field,
            declared.to_string(),
            computed.to_string(),
            format!("declared {} differs from item sum {} beyond the decimal range", field.label(), computed),
        ));
    };
    (delta > tolerance).then(|| {
        AuditDifference::new(
            field,
            declared.to_string(),
            computed.to_string(),
            format!(
                "declared {} {} differs from item sum {} by {} (tolerance {})",
                field.label(),
                declared,
                computed,
                delta,
                tolerance
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::{ItemDraft, Origin};
    use pretty_assertions::assert_eq;

    fn item(index: u32, cst: &str, amount: Decimal, base: Decimal, tax: Decimal) -> CanonicalItemRecord {
        let mut draft = ItemDraft::new(index);
        draft.cst = cst.into();
        draft.amount_total = amount;
        draft.tax_base = base;
        draft.tax_value = tax;
        draft.build(Origin::Declared).unwrap()
    }

    fn header(products: Decimal, tax: Decimal, items: Vec<CanonicalItemRecord>) -> InvoiceHeader {
        let mut header = InvoiceHeader::new();
        header.totals.products = products;
        header.totals.tax = tax;
        header.items = items;
        header
    }

    fn fields(differences: &[AuditDifference]) -> Vec<AuditField> {
        differences.iter().map(|d| d.field()).collect()
    }

    #[test]
    fn test_product_total_tolerance() {
        let validator = ConsistencyValidator::default();
        let hundred = Decimal::new(10000, 2);
        let within = header(
            hundred,
            Decimal::ZERO,
            vec![item(1, "", Decimal::new(10003, 2), Decimal::ZERO, Decimal::ZERO)],
        );
        assert!(validator.validate(&within).is_empty());

        let beyond = header(
            hundred,
            Decimal::ZERO,
            vec![item(1, "", Decimal::new(10010, 2), Decimal::ZERO, Decimal::ZERO)],
        );
        assert_eq!(fields(&validator.validate(&beyond)), vec![AuditField::TotalProducts]);
    }

    #[test]
    fn test_tax_total_has_wider_tolerance() {
        let validator = ConsistencyValidator::default();
        let items = vec![item(1, "00", Decimal::ONE, Decimal::ONE, Decimal::new(1810, 2))];
        assert!(validator.validate(&header(Decimal::ONE, Decimal::new(1800, 2), items.clone())).is_empty());
        assert_eq!(
            fields(&validator.validate(&header(Decimal::ONE, Decimal::new(1799, 2), items))),
            vec![AuditField::TotalTax]
        );
    }

    #[test]
    fn test_regime_checks_run_without_short_circuit() {
        let validator = ConsistencyValidator::default();
        let items = vec![
            item(1, "00", Decimal::new(50, 0), Decimal::ZERO, Decimal::ZERO),
            item(2, "040", Decimal::new(50, 0), Decimal::ZERO, Decimal::new(5, 0)),
            item(3, "41", Decimal::new(50, 0), Decimal::ZERO, Decimal::new(1, 3)),
            item(4, "60", Decimal::new(50, 0), Decimal::ZERO, Decimal::ZERO),
        ];
        let differences = validator.validate(&header(Decimal::new(100, 0), Decimal::ZERO, items));

        assert_eq!(
            fields(&differences),
            vec![
                AuditField::TotalProducts,
                AuditField::TotalTax,
                AuditField::FullyTaxedItem(1),
                AuditField::ExemptItem(2)
            ]
        );
    }

    #[test]
    fn test_overflowing_item_sum_is_reported() {
        let validator = ConsistencyValidator::default();
        let huge = Decimal::from_i128_with_scale(5 * 10_i128.pow(28), 0);
        let items = vec![
            item(1, "", huge, Decimal::ZERO, Decimal::ZERO),
            item(2, "", huge, Decimal::ZERO, Decimal::ZERO),
        ];
        let differences = validator.validate(&header(Decimal::ZERO, Decimal::ZERO, items));

        assert_eq!(fields(&differences), vec![AuditField::TotalProducts]);
        assert_eq!(differences[0].portal_value(), "overflow");
        assert!(differences[0].message().contains("overflowed"));
    }

    #[test]
    fn test_declared_total_far_from_item_sum() {
        let validator = ConsistencyValidator::default();
        let items = vec![item(1, "", Decimal::MAX, Decimal::ZERO, Decimal::ZERO)];
        let differences = validator.validate(&header(Decimal::MIN, Decimal::ZERO, items));

        assert_eq!(fields(&differences), vec![AuditField::TotalProducts]);
        assert!(differences[0].message().contains("beyond the decimal range"));
    }
}
