//! Conversions between human prices, ticks, sqrtPriceX96 and the venue's hex
//! wire encodings.
//!
//! The formulas mirror the venue's float semantics exactly (floor, not round),
//! so ticks produced here match the ticks the venue reports.

use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Num;
use serde_json::Value;

use crate::asset::Asset;
use crate::errors::{AppError, Result};

pub use uniswap_v3_math::tick_math::{MAX_TICK, MIN_TICK};

/// Base of the logarithmic price grid: `price(tick) = 1.0001^tick`.
pub const TICK_BASE: f64 = 1.0001;

const Q96: f64 = 79228162514264337593543950336.0; // 2^96
const Q128: f64 = 340282366920938463463374607431768211456.0; // 2^128

fn decimal_shift(base: Asset, quote: Asset) -> f64 {
    10_f64.powf(base.decimals() as f64 - quote.decimals() as f64)
}

fn unit_ratio(base: Asset, quote: Asset) -> f64 {
    base.unit_f64() / quote.unit_f64()
}

/// sqrtPriceX96 as an integral f64 (truncated like the venue's integer cast).
fn sqrt_price_x96_f64(price: f64, base: Asset, quote: Asset) -> Result<f64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::InvalidPrice(price));
    }
    let ratio = price / decimal_shift(base, quote);
    Ok((ratio.sqrt() * Q96).trunc())
}

fn check_tick(tick: i64) -> Result<i32> {
    if tick < MIN_TICK as i64 || tick > MAX_TICK as i64 {
        return Err(AppError::TickOutOfRange(
            tick.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        ));
    }
    Ok(tick as i32)
}

/// Human price of `base` in `quote` to the venue tick at or below it.
pub fn price_to_tick(price: f64, base: Asset, quote: Asset) -> Result<i32> {
    let sqrt_price = sqrt_price_x96_f64(price, base, quote)? / Q96;
    let tick = ((sqrt_price * sqrt_price).ln() / TICK_BASE.ln()).floor();
    if !tick.is_finite() {
        return Err(AppError::InvalidPrice(price));
    }
    check_tick(tick as i64)
}

/// Human price at a tick: `1.0001^tick * unit(base) / unit(quote)`.
pub fn tick_to_price(tick: i32, base: Asset, quote: Asset) -> f64 {
    TICK_BASE.powf(tick as f64) * unit_ratio(base, quote)
}

pub fn price_to_sqrt_price_x96(price: f64, base: Asset, quote: Asset) -> Result<U256> {
    f64_to_u256(sqrt_price_x96_f64(price, base, quote)?)
}

pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, base: Asset, quote: Asset) -> f64 {
    let sqrt_price = u256_to_f64(&sqrt_price_x96) / Q96;
    sqrt_price * sqrt_price * unit_ratio(base, quote)
}

/// Approximate sqrtPriceX96 at a tick using f64 math.
pub fn tick_to_sqrt_price_x96(tick: i32) -> Result<U256> {
    let tick = check_tick(tick as i64)?;
    f64_to_u256(TICK_BASE.powf(tick as f64 / 2.0) * Q96)
}

/// Ticks of a range order must satisfy `lower < upper`. Inverted ranges are
/// logged and let through unless `strict` is set.
pub fn validate_tick_range(lower: i32, upper: i32, strict: bool) -> Result<()> {
    if lower < upper {
        return Ok(());
    }
    tracing::error!(lower, upper, "[TICK] lower tick should be below upper tick");
    if strict {
        return Err(AppError::InvalidTickRange { lower, upper });
    }
    Ok(())
}

/// Decode a 256-bit hex price: top 128 bits integer, bottom 128 bits fraction,
/// scaled by `unit(base) / unit(quote)`.
pub fn decode_fixed_point_hex(hex: &str, base: Asset, quote: Asset) -> Result<f64> {
    let value = parse_hex_u256(hex)?;
    let limbs = value.as_limbs();
    let fractional = limbs[0] as u128 | (limbs[1] as u128) << 64;
    let integer = limbs[2] as u128 | (limbs[3] as u128) << 64;
    Ok((integer as f64 + fractional as f64 / Q128) * unit_ratio(base, quote))
}

/// Decode a hex smallest-unit amount into human units of `asset`.
pub fn decode_amount_hex(hex: &str, asset: Asset) -> Result<f64> {
    let digits = strip_hex_prefix(hex)?;
    let units = BigInt::from_str_radix(digits, 16)
        .map_err(|e| AppError::HexDecode(format!("{hex}: {e}")))?;
    scaled_to_f64(units, asset)
}

/// Decode an amount the venue sent either as a hex string, a decimal string
/// or a JSON number, all in smallest units of `asset`.
pub fn decode_amount_json(value: &Value, asset: Asset) -> Result<f64> {
    match value {
        Value::String(s) if is_hex(s) => decode_amount_hex(s, asset),
        Value::String(s) => {
            let units = BigInt::from_str_radix(s.trim(), 10)
                .map_err(|e| AppError::HexDecode(format!("{s}: {e}")))?;
            scaled_to_f64(units, asset)
        }
        Value::Number(n) => match n.as_u64() {
            Some(units) => scaled_to_f64(BigInt::from(units), asset),
            None => n
                .as_f64()
                .map(|units| units / asset.unit_f64())
                .ok_or_else(|| AppError::HexDecode(format!("not an amount: {n}"))),
        },
        other => Err(AppError::HexDecode(format!("not an amount: {other}"))),
    }
}

/// Decode an unsigned integer sent as a hex string, decimal string or number.
pub fn decode_u128_json(value: &Value) -> Result<u128> {
    match value {
        Value::String(s) if is_hex(s) => {
            let digits = strip_hex_prefix(s)?;
            u128::from_str_radix(digits, 16).map_err(|e| AppError::HexDecode(format!("{s}: {e}")))
        }
        Value::String(s) => Ok(s.trim().parse::<u128>()?),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| AppError::HexDecode(format!("not an unsigned integer: {n}"))),
        other => Err(AppError::HexDecode(format!("not an unsigned integer: {other}"))),
    }
}

/// Render a smallest-unit amount the way the venue expects it on the wire.
pub fn encode_amount_hex(units: u128) -> String {
    format!("{units:#x}")
}

fn scaled_to_f64(units: BigInt, asset: Asset) -> Result<f64> {
    let amount = BigDecimal::new(units, asset.decimals() as i64);
    Ok(amount.to_string().parse::<f64>()?)
}

fn is_hex(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

fn strip_hex_prefix(hex: &str) -> Result<&str> {
    let digits = hex
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    if digits.is_empty() {
        return Err(AppError::HexDecode(format!("empty hex string '{hex}'")));
    }
    Ok(digits)
}

fn parse_hex_u256(hex: &str) -> Result<U256> {
    let digits = strip_hex_prefix(hex)?;
    U256::from_str_radix(digits, 16).map_err(|e| AppError::HexDecode(format!("{hex}: {e}")))
}

fn u256_to_f64(value: &U256) -> f64 {
    // decimal string parse rounds correctly for the full 256-bit range
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

fn f64_to_u256(value: f64) -> Result<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidPrice(value));
    }
    let s = format!("{:.0}", value.trunc());
    U256::from_str_radix(&s, 10).map_err(|e| AppError::HexDecode(format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset::{Btc, Dot, Eth, Flip, Usdc};

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn price_to_tick_eth() {
        assert_eq!(price_to_tick(1000.00, Eth, Usdc).unwrap(), -207244);
        assert_eq!(price_to_tick(2000.00, Eth, Usdc).unwrap(), -200312);
        assert_eq!(price_to_tick(1800.32, Eth, Usdc).unwrap(), -201364);
        assert_eq!(price_to_tick(4780.73, Eth, Usdc).unwrap(), -191597);
        assert_eq!(price_to_tick(4993.77, Eth, Usdc).unwrap(), -191161);
    }

    #[test]
    fn price_to_tick_btc() {
        assert_eq!(price_to_tick(30000.0, Btc, Usdc).unwrap(), 57040);
        assert_eq!(price_to_tick(10000.0, Btc, Usdc).unwrap(), 46054);
        assert_eq!(price_to_tick(25603.86, Btc, Usdc).unwrap(), 55456);
        assert_eq!(price_to_tick(65125.35, Btc, Usdc).unwrap(), 64792);
    }

    #[test]
    fn price_to_tick_dot() {
        assert_eq!(price_to_tick(10.0, Dot, Usdc).unwrap(), -69082);
        assert_eq!(price_to_tick(5.0, Dot, Usdc).unwrap(), -76013);
        assert_eq!(price_to_tick(8.256, Dot, Usdc).unwrap(), -70998);
        assert_eq!(price_to_tick(4.48, Dot, Usdc).unwrap(), -77112);
    }

    #[test]
    fn tick_to_price_vectors() {
        assert!(close(tick_to_price(-207244, Eth, Usdc), 999.90199267, 1e-6));
        assert!(close(tick_to_price(-200312, Eth, Usdc), 1999.8403056, 1e-6));
        assert!(close(tick_to_price(-191597, Eth, Usdc), 4780.3977679, 1e-6));
        assert!(close(tick_to_price(57040, Btc, Usdc), 29997.9703993, 1e-6));
        assert!(close(tick_to_price(64792, Btc, Usdc), 65123.85827285656, 1e-9));
        assert!(close(tick_to_price(-76013, Dot, Usdc), 4.999912496, 1e-8));
    }

    #[test]
    fn round_trip_stays_within_one_tick() {
        let cases = [
            (Eth, [150.0, 1000.0, 1888.97, 4993.77, 12000.0]),
            (Btc, [3500.0, 10000.0, 30513.21, 65125.35, 120000.0]),
            (Dot, [1.5, 4.48, 5.63, 8.256, 40.0]),
            (Flip, [0.35, 1.0, 2.71, 6.45, 30.0]),
        ];
        for (asset, prices) in cases {
            for p in prices {
                let tick = price_to_tick(p, asset, Usdc).unwrap();
                let back = tick_to_price(tick, asset, Usdc);
                assert!(back <= p * (1.0 + 1e-12), "{asset} {p}: {back}");
                assert!((p - back).abs() / p < 1.01e-4, "{asset} {p}: {back}");
            }
        }
    }

    #[test]
    fn sqrt_price_vectors() {
        assert_eq!(
            price_to_sqrt_price_x96(10000.0, Btc, Usdc).unwrap(),
            U256::from_str_radix("792281625142643375935439503360", 10).unwrap()
        );
        assert_eq!(
            price_to_sqrt_price_x96(1888.9727296834467, Eth, Usdc).unwrap(),
            U256::from_str_radix("3443439269043971020554240", 10).unwrap()
        );
        let sqrt = U256::from_str_radix("1383959982959110770043383709696", 10).unwrap();
        assert!(close(sqrt_price_x96_to_price(sqrt, Btc, Usdc), 30513.21, 1e-6));
        let sqrt = U256::from_str_radix("1879895815470288748702334976", 10).unwrap();
        assert!(close(sqrt_price_x96_to_price(sqrt, Dot, Usdc), 5.63, 1e-6));
    }

    #[test]
    fn tick_zero_is_q96() {
        let sqrt = tick_to_sqrt_price_x96(0).unwrap();
        assert_eq!(
            sqrt,
            U256::from_str_radix("79228162514264337593543950336", 10).unwrap()
        );
        assert!(tick_to_sqrt_price_x96(MAX_TICK + 1).is_err());
    }

    #[test]
    fn decodes_fixed_point_prices() {
        let eth = decode_fixed_point_hex("0x44b82fa09b5a53ffffffd38ad", Eth, Usdc).unwrap();
        assert!(close(eth, 1000.0, 1e-6));
        let btc = decode_fixed_point_hex("0x6400000000000000000000000000000000", Btc, Usdc).unwrap();
        assert_eq!(btc, 10000.0);
        let eth = decode_fixed_point_hex("0x813103d1b24adfffffffaa5d8", Eth, Usdc).unwrap();
        assert!(close(eth, 1879.98324, 1e-6));
        let btc = decode_fixed_point_hex("0x12c0a85bd43c2cffffffffffff2d74584bc", Btc, Usdc).unwrap();
        assert!(close(btc, 30004.11032, 1e-9));
    }

    #[test]
    fn decodes_amounts() {
        assert_eq!(decode_amount_hex("0x5f5e100", Btc).unwrap(), 1.0);
        assert_eq!(decode_amount_hex("0xde0b6b3a7640000", Eth).unwrap(), 1.0);
        assert_eq!(decode_amount_hex("0x0", Usdc).unwrap(), 0.0);
        assert_eq!(decode_amount_hex("0x2540be400", Usdc).unwrap(), 10000.0);
        assert_eq!(decode_amount_json(&Value::from(1_500_000u64), Usdc).unwrap(), 1.5);
        assert_eq!(decode_amount_json(&Value::from("250000000"), Btc).unwrap(), 2.5);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(price_to_tick(0.0, Eth, Usdc), Err(AppError::InvalidPrice(_))));
        assert!(matches!(price_to_tick(-5.0, Eth, Usdc), Err(AppError::InvalidPrice(_))));
        assert!(matches!(decode_amount_hex("0x", Eth), Err(AppError::HexDecode(_))));
        assert!(matches!(decode_amount_hex("0xzz", Eth), Err(AppError::HexDecode(_))));
        assert!(decode_fixed_point_hex("nothex", Eth, Usdc).is_err());
    }

    #[test]
    fn inverted_range_is_only_fatal_in_strict_mode() {
        assert!(validate_tick_range(-10, 10, true).is_ok());
        assert!(validate_tick_range(10, -10, false).is_ok());
        assert!(matches!(
            validate_tick_range(10, 10, true),
            Err(AppError::InvalidTickRange { lower: 10, upper: 10 })
        ));
    }

    #[test]
    fn wire_helpers() {
        assert_eq!(encode_amount_hex(0), "0x0");
        assert_eq!(encode_amount_hex(1_000_000), "0xf4240");
        assert_eq!(decode_u128_json(&Value::from("0xf4240")).unwrap(), 1_000_000);
        assert_eq!(decode_u128_json(&Value::from(42u64)).unwrap(), 42);
    }
}
