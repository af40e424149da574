//! Checked U256 fixed-point arithmetic.
//!
//! USD values and oracle prices are WAD (1e18). Valuation only has to scale
//! by the collateral token's own decimals. Anything that could overflow or
//! divide by zero yields `None`.

use alloy::primitives::U256;

/// 1e18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// 10000 bps = 100%
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Decimals every oracle price is normalized to.
pub const PRICE_DECIMALS: u8 = 18;

/// `10^exp`. Token decimals fit in a `u128` up to 38, larger exponents
/// fall back to `U256::pow`.
pub fn pow10(exp: u8) -> U256 {
    match 10u128.checked_pow(u32::from(exp)) {
        Some(scale) => U256::from(scale),
        None => U256::from(10u64).pow(U256::from(exp)),
    }
}

/// `a * b / denominator`, rounding down.
#[inline]
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    Some(a.checked_mul(b)? / denominator)
}

/// `value * bps / 10000`, e.g. the threshold share of collateral or the
/// liquidation bonus on a seizure.
#[inline]
pub fn bps_of(value: U256, bps: u16) -> Option<U256> {
    mul_div(value, U256::from(bps), BPS_DENOMINATOR)
}

/// WAD USD value of `amount` base units priced at `price_wad`.
pub fn calculate_usd_wad(amount: U256, price_wad: U256, decimals: u8) -> Option<U256> {
    if amount.is_zero() || price_wad.is_zero() {
        return Some(U256::ZERO);
    }
    mul_div(amount, price_wad, pow10(decimals))
}

/// Base units worth `usd_wad` at `price_wad`, rounding down. `None` for a
/// zero price.
pub fn token_amount_from_usd(usd_wad: U256, price_wad: U256, decimals: u8) -> Option<U256> {
    mul_div(usd_wad, pow10(decimals), price_wad)
}

/// `floor(collateral * threshold / 10000) * WAD / debt`, or `U256::MAX`
/// when there is no debt.
pub fn calculate_hf_wad(collateral_usd: U256, debt: U256, threshold_bps: u16) -> Option<U256> {
    if debt.is_zero() {
        return Some(U256::MAX);
    }
    mul_div(bps_of(collateral_usd, threshold_bps)?, WAD, debt)
}

/// Lossy WAD -> f64 for log fields. `U256::MAX` maps to infinity.
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad == U256::MAX {
        return f64::INFINITY;
    }
    let whole: f64 = (wad / WAD).to_string().parse().unwrap_or(f64::MAX);
    let frac = (wad % WAD).to::<u64>() as f64 / 1e18;
    whole + frac
}
