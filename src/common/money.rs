//! Money arithmetic helpers
//!
//! All trade arithmetic uses `Decimal` with one rounding rule, defined here:
//! half-up to two decimal places. Floating point is never used for prices
//! because compounding rounding error changes profit outcomes at the cent
//! level.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Marketplace fee taken from every sale, as a fraction of the sale price
pub const FEE_RATE: Decimal = dec!(0.15);

/// One currency cent, the undercut step when competing on price
pub const CENT: Decimal = dec!(0.01);

/// Round to cents, half-up
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentage discount of `price` relative to `reference`
///
/// Returns `(reference - price) / reference * 100`. Caller must ensure
/// `reference` is non-zero.
pub fn discount_pct(reference: Decimal, price: Decimal) -> Decimal {
    (reference - price) / reference * dec!(100)
}

/// Percentage gap between `price` and the next-cheapest listing
///
/// Returns `(next - price) / price * 100`. Caller must ensure `price` is
/// non-zero.
pub fn spread_pct(next: Decimal, price: Decimal) -> Decimal {
    (next - price) / price * dec!(100)
}

/// Sell price needed to realize `profit_pct` over `purchase_price` after the
/// marketplace fee, rounded to cents
pub fn target_sell_price(purchase_price: Decimal, profit_pct: Decimal) -> Decimal {
    let gross = purchase_price * (Decimal::ONE + profit_pct / dec!(100));
    round_cents(gross / (Decimal::ONE - FEE_RATE))
}

/// Sell price at which the net proceeds equal the purchase price
pub fn break_even_price(purchase_price: Decimal) -> Decimal {
    round_cents(purchase_price / (Decimal::ONE - FEE_RATE))
}

/// What the seller actually receives for a sale at `price`
pub fn net_proceeds(price: Decimal) -> Decimal {
    round_cents(price * (Decimal::ONE - FEE_RATE))
}

/// Fee charged by the marketplace for a sale at `price`
pub fn sale_fee(price: Decimal) -> Decimal {
    round_cents(price * FEE_RATE)
}
