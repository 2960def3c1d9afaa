// utils/currency.rs
//
// Monetary amounts travel as integer minor-units (wei) end to end: NUMERIC(78,0)
// in Postgres, BigDecimal in the models, U256 at the contract boundary.
use bigdecimal::BigDecimal;
use num_traits::Zero;
use std::str::FromStr;
use web3::types::U256;

const WEI_DECIMALS: usize = 18;

/// Parse a wei amount from its decimal string form. Rejects signs, decimal
/// points, and zero: escrow amounts must be positive integers.
pub fn parse_wei(s: &str) -> Result<BigDecimal, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Amount is required".to_string());
    }
    if !s.chars().all(|c| c.is_ascii_digit()) {
        return Err("Amount must be an integer wei value".to_string());
    }
    let value = BigDecimal::from_str(s).map_err(|_| "Invalid amount format".to_string())?;
    if value.is_zero() {
        return Err("Amount must be greater than zero".to_string());
    }
    Ok(value)
}

/// Render a wei amount as an ETH decimal string ("90000000000000000" -> "0.09").
pub fn wei_to_eth_string(wei: &BigDecimal) -> String {
    let digits = wei.with_scale(0).to_string();
    let padded = if digits.len() <= WEI_DECIMALS {
        format!("{}{}", "0".repeat(WEI_DECIMALS - digits.len() + 1), digits)
    } else {
        digits
    };
    let split = padded.len() - WEI_DECIMALS;
    let (whole, frac) = padded.split_at(split);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

pub fn wei_to_u256(wei: &BigDecimal) -> Result<U256, String> {
    U256::from_dec_str(&wei.with_scale(0).to_string())
        .map_err(|e| format!("Amount does not fit in uint256: {}", e))
}

pub fn u256_to_wei(value: U256) -> BigDecimal {
    // U256 display is plain decimal, always parseable.
    BigDecimal::from_str(&value.to_string()).unwrap_or_else(|_| BigDecimal::zero())
}
