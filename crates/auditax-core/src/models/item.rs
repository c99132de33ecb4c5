//! Canonical per-line-item record populated by both extractors.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Which source an item record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The issuer's NF-e document.
    Declared,
    /// The SEFAZ memorial report.
    Portal,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Declared => f.write_str("declared"),
            Origin::Portal => f.write_str("portal"),
        }
    }
}

/// One fiscal line item after normalization.
///
/// Built only through [`ItemDraft::build`], which enforces a positive item
/// index and non-negative amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalItemRecord {
    origin: Origin,
    item_index: u32,
    product_code: String,
    product_description: String,
    ncm: String,
    cest: String,
    cfop: String,
    cst: String,
    quantity: Decimal,
    unit_price: Decimal,
    amount_total: Decimal,
    tax_base: Decimal,
    tax_rate: Decimal,
    tax_value: Decimal,
    mva_percent: Decimal,
    benefit_value: Decimal,
    is_suframa_benefit: bool,
}

impl CanonicalItemRecord {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Join key between the two sources.
    pub fn item_index(&self) -> u32 {
        self.item_index
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn product_description(&self) -> &str {
        &self.product_description
    }

    pub fn ncm(&self) -> &str {
        &self.ncm
    }

    pub fn cest(&self) -> &str {
        &self.cest
    }

    pub fn cfop(&self) -> &str {
        &self.cfop
    }

    /// Tax-regime code (CST or CSOSN).
    pub fn cst(&self) -> &str {
        &self.cst
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn amount_total(&self) -> Decimal {
        self.amount_total
    }

    pub fn tax_base(&self) -> Decimal {
        self.tax_base
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn tax_value(&self) -> Decimal {
        self.tax_value
    }

    pub fn mva_percent(&self) -> Decimal {
        self.mva_percent
    }

    /// Exempted amount (vICMSDeson on the document, SUFRAMA amount on the portal).
    pub fn benefit_value(&self) -> Decimal {
        self.benefit_value
    }

    pub fn is_suframa_benefit(&self) -> bool {
        self.is_suframa_benefit
    }
}

/// Mutable field set an extractor fills before building a record.
#[derive(Debug, Clone, Default)]
pub struct ItemDraft {
    pub item_index: u32,
    pub product_code: String,
    pub product_description: String,
    pub ncm: String,
    pub cest: String,
    pub cfop: String,
    pub cst: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount_total: Decimal,
    pub tax_base: Decimal,
    pub tax_rate: Decimal,
    pub tax_value: Decimal,
    pub mva_percent: Decimal,
    pub benefit_value: Decimal,
    pub is_suframa_benefit: bool,
}

impl ItemDraft {
    /// Create an empty draft for the given item index.
    pub fn new(item_index: u32) -> Self {
        Self {
            item_index,
            ..Self::default()
        }
    }

    /// Validate the draft and freeze it into a record.
    pub fn build(self, origin: Origin) -> Result<CanonicalItemRecord, RecordError> {
        if self.item_index == 0 {
            return Err(RecordError::InvalidItemIndex(self.item_index));
        }

        let amounts = [
            ("quantity", self.quantity),
            ("unit_price", self.unit_price),
            ("amount_total", self.amount_total),
            ("tax_base", self.tax_base),
            ("tax_rate", self.tax_rate),
            ("tax_value", self.tax_value),
            ("mva_percent", self.mva_percent),
            ("benefit_value", self.benefit_value),
        ];
        if let Some((field, value)) = amounts.iter().find(|(_, v)| *v < Decimal::ZERO) {
            return Err(RecordError::NegativeValue {
                field: *field,
                value: value.to_string(),
            });
        }

        Ok(CanonicalItemRecord {
            origin,
            item_index: self.item_index,
            product_code: self.product_code,
            product_description: self.product_description,
            ncm: self.ncm,
            cest: self.cest,
            cfop: self.cfop,
            cst: self.cst,
            quantity: self.quantity,
            unit_price: self.unit_price,
            amount_total: self.amount_total,
            tax_base: self.tax_base,
            tax_rate: self.tax_rate,
            tax_value: self.tax_value,
            mva_percent: self.mva_percent,
            benefit_value: self.benefit_value,
            is_suframa_benefit: self.is_suframa_benefit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_valid_record() {
        let mut draft = ItemDraft::new(3);
        draft.ncm = "22021000".to_string();
        draft.tax_value = Decimal::new(1800, 2);

        let record = draft.build(Origin::Declared).unwrap();
        assert_eq!(record.item_index(), 3);
        assert_eq!(record.origin(), Origin::Declared);
        assert_eq!(record.tax_value(), Decimal::new(1800, 2));
    }

    #[test]
    fn test_zero_index_rejected() {
        let err = ItemDraft::new(0).build(Origin::Portal).unwrap_err();
        assert_eq!(err, RecordError::InvalidItemIndex(0));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut draft = ItemDraft::new(1);
        draft.tax_base = Decimal::new(-1, 2);

        let err = draft.build(Origin::Declared).unwrap_err();
        assert_eq!(
            err,
            RecordError::NegativeValue {
                field: "tax_base",
                value: "-0.01".to_string()
            }
        );
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::Declared.to_string(), "declared");
        assert_eq!(Origin::Portal.to_string(), "portal");
    }
}
