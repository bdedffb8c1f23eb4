use rust_decimal::{Decimal, RoundingStrategy};

const BASIS_POINTS_DIVISOR: u32 = 10_000;

/// Percentage fee on top of an amount, in basis points.
pub struct FeeCalculator;

impl FeeCalculator {
    /// Returns `(total, fee)`. Any fractional remainder pushes the fee up by
    /// one minor unit of the amount's precision.
    pub fn calculate(amount: Decimal, fee_basis_points: u32) -> (Decimal, Decimal) {
        let raw = amount * Decimal::from(fee_basis_points) / Decimal::from(BASIS_POINTS_DIVISOR);
        let fee = raw.round_dp_with_strategy(amount.scale(), RoundingStrategy::ToPositiveInfinity);
        (amount + fee, fee)
    }
}
