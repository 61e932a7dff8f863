/// Quote assets stripped when a pair symbol has to be reduced to its base asset.
/// Longest first, so `FDUSD` wins over `USD`.
const QUOTE_ASSETS: [&str; 6] = ["FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD"];

/// Normalize a free-form symbol into the `BTCUSDT` form used upstream.
///
/// Separators and any other non-alphanumeric characters are dropped and the
/// result is uppercased, so `btc-usdt`, `BTC/USDT` and `BTCUSDT` are identical.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Base asset of a normalized pair symbol (`BTCUSDT` -> `BTC`).
///
/// Symbols without a known quote suffix are returned unchanged, so a bare
/// asset like `ETH` stays `ETH`. A symbol that is itself a quote asset
/// (`BUSD`, `TUSD`) is an asset in its own right and is never reduced.
pub fn base_asset(normalized: &str) -> &str {
    if QUOTE_ASSETS.contains(&normalized) {
        return normalized;
    }
    QUOTE_ASSETS
        .iter()
        .find_map(|quote| {
            normalized
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
        })
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_separators_and_case_are_normalized() {
        assert_eq!(normalize_symbol("btc-usdt"), "BTCUSDT");
        assert_eq!(normalize_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol(" eth_usdt "), "ETHUSDT");
        assert_eq!(normalize_symbol("eth"), "ETH");
    }

    #[test]
    fn test_base_asset() {
        assert_eq!(base_asset("BTCUSDT"), "BTC");
        assert_eq!(base_asset("ETHBUSD"), "ETH");
        assert_eq!(base_asset("SOLUSD"), "SOL");
        assert_eq!(base_asset("ETH"), "ETH");
        // a bare quote asset is not reduced to nothing
        assert_eq!(base_asset("USDT"), "USDT");
    }

    #[test]
    fn test_bare_stablecoins_keep_their_ticker() {
        for stable in ["BUSD", "TUSD", "FDUSD", "USDC", "USD"] {
            assert_eq!(base_asset(stable), stable);
        }
        assert_eq!(base_asset("BTCFDUSD"), "BTC");
        assert_eq!(base_asset("USDCUSDT"), "USDC");
        assert_eq!(base_asset("BUSDUSDT"), "BUSD");
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(raw in "\\PC{0,24}") {
            let once = normalize_symbol(&raw);
            prop_assert_eq!(normalize_symbol(&once), once.clone());
        }

        #[test]
        fn prop_output_is_uppercase_alphanumeric(raw in "\\PC{0,24}") {
            let normalized = normalize_symbol(&raw);
            prop_assert!(normalized
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }

        #[test]
        fn prop_separators_do_not_change_the_query(
            base in "[a-zA-Z]{2,6}",
            quote in "(usdt|USDT|busd|Usd)",
            sep in "[-/_ .:]{0,2}",
        ) {
            let joined = format!("{}{}", base, quote);
            let separated = format!("{}{}{}", base, sep, quote);
            prop_assert_eq!(normalize_symbol(&separated), normalize_symbol(&joined));
        }
    }
}
