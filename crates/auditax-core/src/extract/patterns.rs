//! Common regex patterns for NF-e and SEFAZ memorial extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Money (period-grouped, comma-decimal: 1.234,56 or R$ 540,98)
    pub static ref MONEY_PATTERN: Regex = Regex::new(
        r"(?:R\$\s*)?(\d[\d.]*,\d{2})"
    ).unwrap();

    // Percentage with comma decimal (18,00%)
    pub static ref PERCENT_COMMA: Regex = Regex::new(
        r"(\d[\d.]*(?:,\d+)?)\s*%"
    ).unwrap();

    // Plain period-decimal number (39.51)
    pub static ref PERIOD_DECIMAL: Regex = Regex::new(
        r"(\d+(?:\.\d+)?)"
    ).unwrap();

    // Item block heading (ITEM:1, ITEM: 12 - extra text)
    pub static ref ITEM_HEADING: Regex = Regex::new(
        r"(?i)^\s*ITEM\s*:\s*(\d+)"
    ).unwrap();

    // Leading digit run (CST "040 ST DESTACADO" -> 040)
    pub static ref LEADING_DIGITS: Regex = Regex::new(
        r"^\s*(\d+)"
    ).unwrap();

    // Leading CFOP (6110-VENDA DE MERCADORIA)
    pub static ref CFOP_PREFIX: Regex = Regex::new(
        r"^\s*(\d{4})"
    ).unwrap();

    pub static ref PURE_INTEGER: Regex = Regex::new(
        r"^\d+$"
    ).unwrap();

    // Calculation lines of the memorial
    pub static ref MVA_ADJUSTED: Regex = Regex::new(
        r"(?i)MVA\s+AJUSTADA[^\d]*?(\d+(?:\.\d+)?)\s*%"
    ).unwrap();

    pub static ref MVA_ORIGINAL: Regex = Regex::new(
        r"(?i)MVA\s+ORIGINAL[^\d]*?(\d+(?:,\d+)?)\s*%"
    ).unwrap();

    pub static ref SUFRAMA_BENEFIT: Regex = Regex::new(
        r"(?i)SUFRAMA[^\d]*?(?:R\$\s*)?(\d[\d.]*,\d{2})"
    ).unwrap();

    pub static ref TAX_BASE_LINE: Regex = Regex::new(
        r"(?i)F\)\s*BASE.*?=\s*(?:R\$\s*)?(\d[\d.]*,\d{2})"
    ).unwrap();

    pub static ref INTERNAL_RATE: Regex = Regex::new(
        r"(?i)ALIQUOTA\s+INTERNA\s*=\s*(\d+(?:,\d+)?)\s*%"
    ).unwrap();
}

/// Uppercase and strip Portuguese diacritics, collapsing whitespace.
pub fn normalize_label(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'A',
            'é' | 'ê' | 'É' | 'Ê' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'O',
            'ú' | 'ü' | 'Ú' | 'Ü' => 'U',
            'ç' | 'Ç' => 'C',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    collapse_whitespace(&folded)
}

/// Join whitespace runs (including non-breaking spaces) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{00a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
