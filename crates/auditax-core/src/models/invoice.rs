//! Invoice header extracted from an NF-e document.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use super::item::CanonicalItemRecord;

/// Placeholder for dates that were absent or unparsable.
pub const DATE_SENTINEL: NaiveDateTime = NaiveDateTime::MIN;

/// One declared invoice with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceHeader {
    /// 44-digit access key (chave de acesso).
    pub access_key: String,

    /// Invoice number (nNF).
    pub number: u32,

    /// Invoice series.
    pub series: u32,

    /// Issue timestamp, or [`DATE_SENTINEL`] when unparsable.
    pub issue_date: NaiveDateTime,

    /// Issuer (emitente).
    pub issuer: Party,

    /// Recipient (destinatário).
    pub recipient: Party,

    /// Declared totals.
    pub totals: Totals,

    /// Freight mode code (modFrete).
    pub freight_mode: String,

    /// Authorization protocol.
    pub protocol: Protocol,

    /// Declared line items.
    pub items: Vec<CanonicalItemRecord>,

    /// Degraded fields noted while parsing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Issuer or recipient identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Party {
    /// Legal name.
    pub name: String,

    /// CNPJ, or CPF for individual recipients.
    pub tax_id: String,

    /// Municipality name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub city: String,
}

/// Totals declared in ICMSTot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Sum of product values (vProd).
    pub products: Decimal,

    /// Invoice total (vNF).
    pub invoice: Decimal,

    /// ICMS total (vICMS).
    pub tax: Decimal,
}

/// Authority authorization protocol (protNFe/infProt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Protocol {
    pub number: String,
    pub received_at: NaiveDateTime,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            number: String::new(),
            received_at: DATE_SENTINEL,
        }
    }
}

impl InvoiceHeader {
    /// Create an empty header with sentinel dates.
    pub fn new() -> Self {
        Self {
            access_key: String::new(),
            number: 0,
            series: 0,
            issue_date: DATE_SENTINEL,
            issuer: Party::default(),
            recipient: Party::default(),
            totals: Totals::default(),
            freight_mode: String::new(),
            protocol: Protocol::default(),
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of item product values.
    pub fn items_amount_total(&self) -> Option<Decimal> {
        checked_sum(self.items.iter().map(|i| i.amount_total()))
    }

    /// Sum of item tax values.
    pub fn items_tax_total(&self) -> Option<Decimal> {
        checked_sum(self.items.iter().map(|i| i.tax_value()))
    }

    /// Whether the issue date could be read.
    pub fn has_issue_date(&self) -> bool {
        self.issue_date != DATE_SENTINEL
    }
}

impl Default for InvoiceHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` when the running total leaves the decimal range.
fn checked_sum(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    values.fold(Some(Decimal::ZERO), |acc, v| acc?.checked_add(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::{ItemDraft, Origin};

    fn item(index: u32, amount: i64, tax: i64) -> CanonicalItemRecord {
        let mut draft = ItemDraft::new(index);
        draft.amount_total = Decimal::new(amount, 2);
        draft.tax_value = Decimal::new(tax, 2);
        draft.build(Origin::Declared).unwrap()
    }

    #[test]
    fn test_item_sums() {
        let mut header = InvoiceHeader::new();
        header.items = vec![item(1, 1000, 180), item(2, 2050, 369)];

        assert_eq!(header.item_count(), 2);
        assert_eq!(header.items_amount_total(), Some(Decimal::new(3050, 2)));
        assert_eq!(header.items_tax_total(), Some(Decimal::new(549, 2)));
    }

    #[test]
    fn test_sentinel_date() {
        let header = InvoiceHeader::default();
        assert!(!header.has_issue_date());
        assert_eq!(header.protocol.received_at, DATE_SENTINEL);
    }
}
