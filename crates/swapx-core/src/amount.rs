//! Exact decimal ⇄ base-unit conversion.
//!
//! Amounts cross the human boundary (API, config) as decimal strings and are
//! held internally as `U256` base units with chain-appropriate precision.
//! Conversion is pure string/integer arithmetic; floats never appear in
//! settlement math.

use alloy_primitives::U256;

use crate::error::SwapxError;

/// 10^decimals as a U256.
pub fn unit_scale(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals as u64))
}

/// Parse an exact decimal string (e.g. `"0.05"`, `"100"`, `"12.345"`) into
/// base units at `decimals` precision. Rejects empty input, stray characters,
/// and fractional digits beyond the chain's precision.
pub fn parse_units(s: &str, decimals: u8) -> Result<U256, SwapxError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SwapxError::MalformedAmount("empty amount".into()));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(SwapxError::MalformedAmount(s.to_string()));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(SwapxError::MalformedAmount(s.to_string()));
    }
    if frac_part.len() > decimals as usize {
        return Err(SwapxError::MalformedAmount(format!(
            "{s}: more than {decimals} fractional digits"
        )));
    }

    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10)
            .map_err(|_| SwapxError::MalformedAmount(s.to_string()))?
    };

    // Pad the fraction out to `decimals` digits: "05" at 4 decimals → "0500".
    let mut frac = frac_part.to_string();
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let frac_value = if frac.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac, 10)
            .map_err(|_| SwapxError::MalformedAmount(s.to_string()))?
    };

    int_value
        .checked_mul(unit_scale(decimals))
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| SwapxError::MalformedAmount(format!("{s}: overflows U256")))
}

/// Format base units back into an exact decimal string, trimming trailing
/// fractional zeros. The inverse of [`parse_units`] up to trailing zeros.
pub fn format_units(v: U256, decimals: u8) -> String {
    let scale = unit_scale(decimals);
    let int_part = v / scale;
    let frac_part = v % scale;

    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let mut frac = frac_part.to_string();
    while frac.len() < decimals as usize {
        frac.insert(0, '0');
    }
    let frac = frac.trim_end_matches('0');
    format!("{int_part}.{frac}")
}

/// `value × bps / 10_000`, the commission on a known-asset principal.
pub fn bps_of(value: U256, bps: u32) -> U256 {
    value * U256::from(bps) / U256::from(10_000u64)
}
