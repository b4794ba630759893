//! Monetary types for price and quantity representation.
//!
//! All balance, price, fee, and reserved computations use `Decimal`; binary
//! floats never touch the ledger.

use rust_decimal::Decimal;

/// Price in KRW represented as a Decimal for precision.
pub type Price = Decimal;

/// Coin quantity represented as a Decimal for precision.
pub type Quantity = Decimal;

/// Positions at or below this quantity are treated as drained and deleted.
pub const POSITION_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 4); // 0.0001

/// Maximum allowed deviation between an order price and the market price.
pub const MAX_PRICE_DEVIATION: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.10

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn constants_have_expected_values() {
        assert_eq!(POSITION_EPSILON, dec!(0.0001));
        assert_eq!(MAX_PRICE_DEVIATION, dec!(0.10));
    }
}
