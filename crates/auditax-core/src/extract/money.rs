//! Money and percentage parsing for Brazilian fiscal documents.
//!
//! Parsing never fails: a fragment without a recognizable number yields
//! zero, which is a normal outcome when scraping loosely structured pages.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::patterns::{MONEY_PATTERN, PERCENT_COMMA, PERIOD_DECIMAL};

/// Round a monetary amount to cents, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse the first comma-decimal amount in `text` ("R$ 1.234,56" -> 1234.56).
pub fn parse_money(text: &str) -> Decimal {
    MONEY_PATTERN
        .captures(text)
        .and_then(|caps| comma_decimal(&caps[1]))
        .map(round_money)
        .unwrap_or(Decimal::ZERO)
}

/// Parse the first comma-decimal percentage in `text` ("18,00%" -> 18.00).
///
/// Keeps the source precision.
pub fn parse_percent(text: &str) -> Decimal {
    PERCENT_COMMA
        .captures(text)
        .and_then(|caps| comma_decimal(&caps[1]))
        .unwrap_or(Decimal::ZERO)
}

/// Parse the first period-decimal number in `text` ("39.51%" -> 39.51).
///
/// Keeps the source precision.
pub fn parse_period_decimal(text: &str) -> Decimal {
    PERIOD_DECIMAL
        .captures(text)
        .and_then(|caps| Decimal::from_str(&caps[1]).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Convert "1.234,56" to a decimal.
pub fn comma_decimal(s: &str) -> Option<Decimal> {
    let normalized = s.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&normalized).ok()
}

/// Format amount in Brazilian style (1.234,56).
pub fn format_brl(amount: Decimal) -> String {
    let s = format!("{:.2}", round_money(amount).abs());
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    if amount < Decimal::ZERO {
        formatted.push('-');
    }
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    format!("{},{}", formatted, decimal_part)
}
