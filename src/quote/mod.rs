//! Quote-Token Resolver: a pure function choosing which side of a pool all
//! monetary figures are denominated in. Shaped like `db/models/pool.rs`'s
//! quote-token priority logic (a pure function over token symbols/addresses,
//! no I/O), applying a fixed stablecoin/wrapped-native/address-order rule
//! instead of a priority-enum ranking.

const STABLECOINS: &[&str] = &["USDC", "USDT", "DAI", "FRAX", "BUSD", "LUSD"];

/// Minimal view of a token this resolver needs; callers project their own
/// `Token` model down to this.
#[derive(Debug, Clone, Copy)]
pub struct TokenRef<'a> {
    pub symbol: &'a str,
    pub address: &'a str,
}

/// Applies the ordered quote-side rule and returns `true` if `token0` is the
/// quote token, `false` if `token1` is.
///
/// `wrapped_native_address` is compared case-insensitively, since EVM
/// addresses arrive in mixed case from different providers.
pub fn token0_is_quote(token0: TokenRef<'_>, token1: TokenRef<'_>, wrapped_native_address: &str) -> bool {
    let is_stable = |symbol: &str| STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol));
    let is_wrapped_native =
        |address: &str| address.eq_ignore_ascii_case(wrapped_native_address);

    if is_stable(token0.symbol) {
        return true;
    }
    if is_stable(token1.symbol) {
        return false;
    }
    if is_wrapped_native(token0.address) {
        return true;
    }
    if is_wrapped_native(token1.address) {
        return false;
    }
    // Fallback convention: token0 is quote.
    true
}
