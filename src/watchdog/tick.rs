//! Tick rounding for prices and sizes

use rust_decimal::{Decimal, RoundingStrategy};

/// Round `size` to the nearest multiple of `tick`, halves away from zero.
///
/// A non-positive tick means "no rounding" and returns `size` unchanged, as
/// does a quotient too large for `Decimal`.
pub fn round_to_tick(size: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return size;
    }
    size.checked_div(tick)
        .map(|ticks| ticks.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|ticks| ticks.checked_mul(tick))
        .unwrap_or(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(dec!(1880.04), dec!(0.1)), dec!(1880.0));
        assert_eq!(round_to_tick(dec!(1880.06), dec!(0.1)), dec!(1880.1));
        assert_eq!(round_to_tick(dec!(0.001), dec!(0.001)), dec!(0.001));
        assert_eq!(round_to_tick(dec!(7), dec!(5)), dec!(5));
    }

    #[test]
    fn test_midpoint_rounds_away_from_zero() {
        assert_eq!(round_to_tick(dec!(0.25), dec!(0.1)), dec!(0.3));
        assert_eq!(round_to_tick(dec!(0.35), dec!(0.1)), dec!(0.4));
        assert_eq!(round_to_tick(dec!(-0.25), dec!(0.1)), dec!(-0.3));
    }

    #[test]
    fn test_non_positive_tick_is_identity() {
        assert_eq!(round_to_tick(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
        assert_eq!(round_to_tick(dec!(1.2345), dec!(-0.1)), dec!(1.2345));
    }

    proptest! {
        #[test]
        fn prop_rounding_is_idempotent(
            mantissa in -1_000_000_000_000i64..1_000_000_000_000i64,
            scale in 0u32..8,
            tick_mantissa in 1i64..10_000,
            tick_scale in 0u32..5,
        ) {
            let x = Decimal::new(mantissa, scale);
            let tick = Decimal::new(tick_mantissa, tick_scale);
            let once = round_to_tick(x, tick);
            prop_assert_eq!(round_to_tick(once, tick), once);
        }
    }
}
