//! # Arbin Timestamp Codec
//!
//! The Arbin result databases store every timestamp as a fixed-point integer:
//! seconds since the Unix epoch scaled by `10^7`, so the least significant
//! digit is one 100 ns tick. This module converts between
//! that integer ("tick") representation and floating-point epoch seconds.
//!
//! Both directions are pure functions with no error conditions. They are an
//! exact inverse pair up to floating-point rounding at the tick grain.

/// Ticks per second in the Arbin fixed-point timestamp encoding.
pub const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Convert epoch seconds to the store's fixed-point tick representation.
///
/// Rounds to the nearest tick.
#[must_use]
pub fn to_tick(epoch_seconds: f64) -> i64 {
    (epoch_seconds * TICKS_PER_SECOND).round() as i64
}

/// Convert a fixed-point tick back to epoch seconds.
#[must_use]
pub fn to_epoch(tick: i64) -> f64 {
    tick as f64 / TICKS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // At 2018-era epoch values an f64 ulp is a few hundred nanoseconds, so
    // roundtrips are checked against a microsecond rather than a single tick.
    const ROUNDTRIP_TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_known_conversion() {
        // 2018-01-01T00:00:00Z
        assert_eq!(to_tick(1_514_764_800.0), 15_147_648_000_000_000);
        assert!((to_epoch(15_147_648_000_000_000) - 1_514_764_800.0).abs() < 1e-9);
    }

    #[test]
    fn test_subsecond_resolution() {
        let tick = to_tick(1000.000_15);
        assert_eq!(tick, 10_000_001_500);
        assert!((to_epoch(tick) - 1000.000_15).abs() < 1e-7);
    }

    #[test]
    fn test_zero_is_fixed_point() {
        assert_eq!(to_tick(0.0), 0);
        assert_eq!(to_epoch(0), 0.0);
    }

    #[test]
    fn test_small_tick_roundtrip_is_exact() {
        // Below 2^53 / 10^7 seconds both directions are lossless.
        for tick in [1_i64, 7, 10_000_000, 123_456_789_012] {
            assert_eq!(to_tick(to_epoch(tick)), tick);
        }
    }

    proptest! {
        #[test]
        fn prop_epoch_roundtrip_stays_within_tolerance(t in 0.0_f64..4_000_000_000.0) {
            let back = to_epoch(to_tick(t));
            prop_assert!((back - t).abs() <= ROUNDTRIP_TOLERANCE);
        }

        #[test]
        fn prop_tick_order_is_preserved(a in 0.0_f64..4_000_000_000.0, delta in 0.001_f64..1000.0) {
            prop_assert!(to_tick(a) < to_tick(a + delta));
        }
    }
}
