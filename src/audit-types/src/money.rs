use rust_decimal::Decimal;

/// Rounds a monetary value to `precision` decimal places, the same way every
/// cumulative counter in the ledger is rounded after each update.
pub fn round_to(value: Decimal, precision: u32) -> Decimal {
    value.round_dp(precision)
}

/// Snaps a value to exact zero when its magnitude falls below `epsilon`.
///
/// Distinct from the ε used for balance-equation comparisons: this one
/// absorbs floating-point-style residue after a chain of decimal divisions
/// (e.g. ratio * amount * ratio round trips), not ledger drift.
pub fn snap_to_zero(value: Decimal, epsilon: Decimal) -> Decimal {
    if value.abs() < epsilon {
        Decimal::ZERO
    } else {
        value
    }
}

/// True when `a` and `b` agree within `tolerance`.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_up_to_two_places() {
        assert_eq!(round_to(d("1.005"), 2), d("1.01"));
    }

    #[test]
    fn snaps_small_residue_to_zero() {
        assert_eq!(snap_to_zero(d("0.000000001"), d("0.00000001")), Decimal::ZERO);
        assert_eq!(snap_to_zero(d("0.5"), d("0.00000001")), d("0.5"));
    }

    #[test]
    fn tolerance_check_is_symmetric() {
        assert!(within_tolerance(d("100.00"), d("100.004"), d("0.01")));
        assert!(!within_tolerance(d("100.00"), d("100.02"), d("0.01")));
    }
}
