//! Exact integer arithmetic for monetary and on-chain quantities.
//!
//! Every value here is either integer cents (`i64`) or big-integer micro-units
//! (`u128`). Floating point never appears on the accounting path.

pub const MICRO: u128 = 1_000_000;

/// Ceiling division for non-negative big integers.
pub fn ceil_div(numerator: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return 0;
    }
    (numerator + denominator - 1) / denominator
}

/// Floor division for non-negative big integers.
pub fn floor_div(numerator: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return 0;
    }
    numerator / denominator
}

/// Renders a micro-unit quantity as a fixed 6-decimal string, e.g. `2_500_000 -> "2.500000"`.
pub fn micro_to_decimal_string(micro: u128) -> String {
    let whole = micro / MICRO;
    let frac = micro % MICRO;
    format!("{whole}.{frac:06}")
}

/// Parses a 6-decimal quantity string back into whole micro-units.
///
/// Accepts both `"2.5"` and `"2.500000"`; rejects more than 6 fractional digits.
pub fn decimal_string_to_micro(value: &str) -> Option<u128> {
    let value = value.trim();
    let (whole_part, frac_part) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if frac_part.len() > 6 || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: u128 = if whole_part.is_empty() {
        0
    } else {
        whole_part.parse().ok()?
    };
    let mut frac_padded = frac_part.to_string();
    while frac_padded.len() < 6 {
        frac_padded.push('0');
    }
    let frac: u128 = if frac_padded.is_empty() {
        0
    } else {
        frac_padded.parse().ok()?
    };
    Some(whole * MICRO + frac)
}

/// Converts on-chain micro-units of a USDC-equivalent denom into USD cents, rounding up.
pub fn micro_to_cents_ceil(micro: u128) -> i64 {
    ceil_div(micro, 10_000) as i64
}

/// Converts USD cents into on-chain micro-units of a USDC-equivalent denom.
pub fn cents_to_micro(cents: i64) -> u128 {
    (cents.max(0) as u128) * 10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up_only_on_remainder() {
        assert_eq!(ceil_div(10, 5), 2);
        assert_eq!(ceil_div(11, 5), 3);
        assert_eq!(ceil_div(0, 5), 0);
    }

    #[test]
    fn micro_decimal_round_trip() {
        let s = micro_to_decimal_string(2_500_000);
        assert_eq!(s, "2.500000");
        assert_eq!(decimal_string_to_micro(&s), Some(2_500_000));
        assert_eq!(decimal_string_to_micro("1"), Some(1_000_000));
        assert_eq!(decimal_string_to_micro("1.5"), Some(1_500_000));
        assert_eq!(decimal_string_to_micro("1.1234567"), None);
    }

    #[test]
    fn cents_micro_conversion() {
        assert_eq!(micro_to_cents_ceil(10_000), 1);
        assert_eq!(micro_to_cents_ceil(10_001), 2);
        assert_eq!(cents_to_micro(1), 10_000);
    }
}
