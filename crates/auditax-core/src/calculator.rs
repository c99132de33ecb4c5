//! ICMS-ST helpers: adjusted margin and substitution tax.

use rust_decimal::Decimal;

use crate::error::CalculationError;
use crate::extract::money::round_money;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub struct TaxCalculator;

impl TaxCalculator {
    /// Adjusted MVA for an inter-state operation, in percent, rounded to cents.
    ///
    /// `((1 + mva) * (1 - inter) / (1 - intra) - 1) * 100`, with every rate in percent.
    pub fn adjusted_mva(
        original_mva: Decimal,
        inter_rate: Decimal,
        intra_rate: Decimal,
    ) -> Result<Decimal, CalculationError> {
        let overflow = || CalculationError::Overflow("adjusted MVA");
        let divisor = Decimal::ONE - intra_rate / HUNDRED;
        if divisor.is_zero() {
            return Err(CalculationError::FullInternalRate);
        }
        let factor = (Decimal::ONE + original_mva / HUNDRED)
            .checked_mul(Decimal::ONE - inter_rate / HUNDRED)
            .and_then(|v| v.checked_div(divisor))
            .ok_or_else(overflow)?;
        let adjusted = (factor - Decimal::ONE).checked_mul(HUNDRED).ok_or_else(overflow)?;
        Ok(round_money(adjusted))
    }

    /// Substitution tax due: the internal rate over the MVA-inflated base,
    /// minus the operation's own ICMS, never below zero.
    pub fn icms_st(
        base: Decimal,
        mva: Decimal,
        intra_rate: Decimal,
        own_icms: Decimal,
    ) -> Result<Decimal, CalculationError> {
        let overflow = || CalculationError::Overflow("ICMS-ST");
        let st_base = base
            .checked_mul(Decimal::ONE + mva / HUNDRED)
            .map(round_money)
            .ok_or_else(overflow)?;
        let st_tax = st_base
            .checked_mul(intra_rate / HUNDRED)
            .map(round_money)
            .ok_or_else(overflow)?;
        let due = st_tax.checked_sub(own_icms).ok_or_else(overflow)?;
        Ok(due.max(Decimal::ZERO))
    }
}
