//! Ledger primitives - fixed-point arithmetic shared by every
//! money-moving operation. All values entering storage pass through
//! `quantize` first, so the storage layer's decimal encoding never sees
//! more than 8 fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept on every monetary and quantity value.
pub const SCALE: u32 = 8;

/// Trading fee rate, 0.1% of notional.
pub fn fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

/// Flat fee debited from the sender on a transfer.
pub fn transfer_fee() -> Decimal {
    Decimal::ONE
}

/// Truncate (round toward zero) to 8 fractional digits.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
}

/// Trading fee on a notional amount, quantized like everything else.
pub fn fee(total: Decimal) -> Decimal {
    quantize(total * fee_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_quantize_truncates() {
        // truncation, not rounding: the 9th digit is dropped
        assert_eq!(quantize(d("1.123456789")), d("1.12345678"));
        assert_eq!(quantize(d("1.999999999")), d("1.99999999"));
    }

    #[test]
    fn test_quantize_truncates_toward_zero_for_negatives() {
        assert_eq!(quantize(d("-1.123456789")), d("-1.12345678"));
    }

    #[test]
    fn test_quantize_leaves_short_scales_alone() {
        assert_eq!(quantize(d("100")), d("100"));
        assert_eq!(quantize(d("0.5")), d("0.5"));
    }

    #[test]
    fn test_fee_is_ten_bps() {
        assert_eq!(fee(d("100")), d("0.1"));
        assert_eq!(fee(d("1234.5")), d("1.2345"));
    }

    #[test]
    fn test_fee_quantized() {
        // 0.000000015 truncates to 8 dp
        assert_eq!(fee(d("0.000015")), d("0.00000001"));
    }
}
