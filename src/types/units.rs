//! Unit Conversion Utilities
//!
//! Helpers for wei/ether conversions, share-rate fixed-point arithmetic and
//! formatting. Share rates carry 27 decimal places; products of a shares
//! amount and a rate are widened to 256 bits before the division back down.

use alloy_primitives::U256;

use super::{SharesAmount, Wei};

/// Wei per ether
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Fixed-point base for share rates (27 decimal places)
pub const SHARE_RATE_PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Whole ether to wei
pub const fn ether(n: u64) -> Wei {
    n as u128 * WEI_PER_ETH
}

/// Value of `shares` at `rate`, floored. Saturates at `u128::MAX`; callers
/// cap the result at the requested value, which always fits.
pub fn share_value(shares: SharesAmount, rate: u128) -> Wei {
    let wide = U256::from(shares) * U256::from(rate) / U256::from(SHARE_RATE_PRECISION);
    u128::try_from(wide).unwrap_or(u128::MAX)
}

/// Implied rate of a (value, shares) pair, floored, kept wide.
/// The zero-shares case is the caller's to exclude.
pub fn implied_rate(value: Wei, shares: SharesAmount) -> U256 {
    U256::from(value) * U256::from(SHARE_RATE_PRECISION) / U256::from(shares)
}

/// Convert wei to an ether string with trailing zeros trimmed (e.g., "1.5")
pub fn wei_to_eth_string(wei: Wei) -> String {
    let whole = wei / WEI_PER_ETH;
    let frac = wei % WEI_PER_ETH;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{:018}", frac);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// Render an E27 share rate with 9 visible decimals (e.g., "1.050000000")
pub fn format_share_rate(rate: u128) -> String {
    let whole = rate / SHARE_RATE_PRECISION;
    let frac = (rate % SHARE_RATE_PRECISION) / (SHARE_RATE_PRECISION / 1_000_000_000);
    format!("{}.{:09}", whole, frac)
}

/// Format number with thousands separators
pub fn format_with_commas(n: u128) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Parse an ether amount ("1.5", "0.000000000000000100") into wei.
/// Exact decimal parsing; more than 18 fractional digits is rejected.
pub fn parse_eth(s: &str) -> Option<Wei> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (whole_str, frac_str) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac_str.len() > 18 || (!frac_str.is_empty() && !frac_str.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let whole: u128 = if whole_str.is_empty() {
        0
    } else {
        whole_str.parse().ok()?
    };
    let frac: u128 = if frac_str.is_empty() {
        0
    } else {
        let padded = format!("{:0<18}", frac_str);
        padded.parse().ok()?
    };
    whole
        .checked_mul(WEI_PER_ETH)
        .and_then(|w| w.checked_add(frac))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_value_floors() {
        // 3 shares at a floored one-third rate -> 0.999... floors to 0
        assert_eq!(share_value(3, SHARE_RATE_PRECISION / 3), 0);
        assert_eq!(share_value(1, SHARE_RATE_PRECISION), 1);
        assert_eq!(share_value(ether(2), SHARE_RATE_PRECISION / 2), ether(1));
        assert_eq!(share_value(0, SHARE_RATE_PRECISION), 0);
    }

    #[test]
    fn test_share_value_wide_product() {
        // shares * rate overflows u128 but the quotient fits
        let shares = ether(1_000_000_000); // 1e27
        let rate = 2 * SHARE_RATE_PRECISION;
        assert_eq!(share_value(shares, rate), 2 * ether(1_000_000_000));
    }

    #[test]
    fn test_implied_rate() {
        assert_eq!(
            implied_rate(ether(1), ether(1)),
            U256::from(SHARE_RATE_PRECISION)
        );
        assert_eq!(
            implied_rate(ether(3), ether(2)),
            U256::from(SHARE_RATE_PRECISION / 2 * 3)
        );
    }

    #[test]
    fn test_wei_to_eth_string() {
        assert_eq!(wei_to_eth_string(0), "0");
        assert_eq!(wei_to_eth_string(ether(1)), "1");
        assert_eq!(wei_to_eth_string(ether(3) / 2), "1.5");
        assert_eq!(wei_to_eth_string(1), "0.000000000000000001");
    }

    #[test]
    fn test_format_share_rate() {
        assert_eq!(format_share_rate(SHARE_RATE_PRECISION), "1.000000000");
        assert_eq!(
            format_share_rate(SHARE_RATE_PRECISION + SHARE_RATE_PRECISION / 20),
            "1.050000000"
        );
        assert_eq!(format_share_rate(SHARE_RATE_PRECISION / 2), "0.500000000");
    }

    #[test]
    fn test_parse_eth() {
        assert_eq!(parse_eth("1"), Some(ether(1)));
        assert_eq!(parse_eth("1.5"), Some(ether(3) / 2));
        assert_eq!(parse_eth("0.000000000000000100"), Some(100));
        assert_eq!(parse_eth(".25"), Some(ether(1) / 4));
        assert_eq!(parse_eth("1.0000000000000000001"), None); // 19 decimals
        assert_eq!(parse_eth("abc"), None);
    }

    #[test]
    fn test_format_with_commas() {
        assert_eq!(format_with_commas(0), "0");
        assert_eq!(format_with_commas(999), "999");
        assert_eq!(format_with_commas(1_000_000), "1,000,000");
    }
}
