//! Static per-currency metadata and money arithmetic.
//!
//! Every supported chain has one [`CoinInfo`] entry compiled into the
//! registry. Amounts are carried everywhere as integer fractional units
//! (`Amount`), sized by the coin's `rational_part_size`.

/// Monetary amount in a coin's fractional units (e.g. satoshi for BTC).
pub type Amount = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinInfo {
    /// Short ticker used in config, the database and log lines.
    pub name: &'static str,
    pub fullname: &'static str,
    /// Fractional units per whole coin.
    pub rational_part_size: i64,
    /// Conventional confirmation depth for this chain; config may override.
    pub default_confirmations: u32,
    address: AddressFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressFormat {
    /// Base58 payment addresses with known leading characters, optionally
    /// also accepting bech32 strings with the given prefix.
    Base58 {
        leading: &'static [char],
        bech32_prefix: Option<&'static str>,
    },
    /// No format restriction; used by the regtest pseudo-coin.
    Any,
}

const COINS: &[CoinInfo] = &[
    CoinInfo {
        name: "BTC",
        fullname: "Bitcoin",
        rational_part_size: 100_000_000,
        default_confirmations: 100,
        address: AddressFormat::Base58 {
            leading: &['1', '3'],
            bech32_prefix: Some("bc1"),
        },
    },
    CoinInfo {
        name: "LTC",
        fullname: "Litecoin",
        rational_part_size: 100_000_000,
        default_confirmations: 100,
        address: AddressFormat::Base58 {
            leading: &['L', 'M'],
            bech32_prefix: Some("ltc1"),
        },
    },
    CoinInfo {
        name: "DOGE",
        fullname: "Dogecoin",
        rational_part_size: 100_000_000,
        default_confirmations: 60,
        address: AddressFormat::Base58 {
            leading: &['D'],
            bech32_prefix: None,
        },
    },
    CoinInfo {
        name: "RGT",
        fullname: "Regtest",
        rational_part_size: 100_000_000,
        default_confirmations: 6,
        address: AddressFormat::Any,
    },
];

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_ALPHABET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

impl CoinInfo {
    /// Looks up a coin by ticker, case-insensitive.
    pub fn for_name(name: &str) -> Option<&'static CoinInfo> {
        COINS.iter().find(|coin| coin.name.eq_ignore_ascii_case(name))
    }

    /// Shallow syntactic address check: leading character, length and
    /// charset. Full checksum verification is the node's job; this only
    /// rejects configuration typos early.
    pub fn check_address(&self, address: &str) -> bool {
        match self.address {
            AddressFormat::Any => !address.is_empty() && address.len() <= 128,
            AddressFormat::Base58 {
                leading,
                bech32_prefix,
            } => {
                if let Some(prefix) = bech32_prefix {
                    if let Some(rest) = address.strip_prefix(prefix) {
                        return (14..=74).contains(&address.len())
                            && rest.chars().all(|c| BECH32_ALPHABET.contains(c));
                    }
                }

                let Some(first) = address.chars().next() else {
                    return false;
                };

                leading.contains(&first)
                    && (26..=35).contains(&address.len())
                    && address.chars().all(|c| BASE58_ALPHABET.contains(c))
            }
        }
    }

    /// Parses a decimal money string ("12", "0.125") into fractional units.
    /// Rejects negative values and more fractional digits than the coin has.
    pub fn parse_money(&self, value: &str) -> Option<Amount> {
        let value = value.trim();
        if value.is_empty() || value.starts_with('-') || value.starts_with('+') {
            return None;
        }

        let (integral, fractional) = match value.split_once('.') {
            Some((i, f)) => (i, f),
            None => (value, ""),
        };

        if integral.is_empty() && fractional.is_empty() {
            return None;
        }
        if !integral.chars().all(|c| c.is_ascii_digit())
            || !fractional.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let mut scale = self.rational_part_size;
        let whole: i64 = if integral.is_empty() {
            0
        } else {
            integral.parse().ok()?
        };
        let mut amount = whole.checked_mul(scale)?;

        for digit in fractional.chars() {
            scale /= 10;
            if scale == 0 {
                return None;
            }
            let digit = digit.to_digit(10)? as i64;
            amount = amount.checked_add(digit.checked_mul(scale)?)?;
        }

        Some(amount)
    }

    /// Renders fractional units back into a decimal string, trailing zeros
    /// trimmed ("1.5", "0.00000001", "42").
    pub fn format_money(&self, amount: Amount) -> String {
        let sign = if amount < 0 { "-" } else { "" };
        let amount = amount.unsigned_abs();
        let rational = self.rational_part_size.unsigned_abs();
        let whole = amount / rational;
        let frac = amount % rational;

        if frac == 0 {
            return format!("{sign}{whole}");
        }

        let width = (self.rational_part_size as f64).log10().round() as usize;
        let frac = format!("{frac:0width$}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> &'static CoinInfo {
        CoinInfo::for_name("btc").expect("BTC is registered")
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        assert_eq!(CoinInfo::for_name("BTC").unwrap().name, "BTC");
        assert_eq!(CoinInfo::for_name("doge").unwrap().name, "DOGE");
        assert!(CoinInfo::for_name("XYZ").is_none());
    }

    #[test]
    fn parse_money_roundtrip() {
        let coin = btc();
        assert_eq!(coin.parse_money("1"), Some(100_000_000));
        assert_eq!(coin.parse_money("0.5"), Some(50_000_000));
        assert_eq!(coin.parse_money("0.00000001"), Some(1));
        assert_eq!(coin.parse_money("21.00000000"), Some(2_100_000_000));
        assert_eq!(coin.format_money(150_000_000), "1.5");
        assert_eq!(coin.format_money(1), "0.00000001");
        assert_eq!(coin.format_money(4_200_000_000), "42");
    }

    #[test]
    fn parse_money_rejects_garbage() {
        let coin = btc();
        assert_eq!(coin.parse_money(""), None);
        assert_eq!(coin.parse_money("-1"), None);
        assert_eq!(coin.parse_money("1.000000001"), None); // 9 frac digits
        assert_eq!(coin.parse_money("1,5"), None);
        assert_eq!(coin.parse_money("."), None);
    }

    #[test]
    fn address_checks() {
        let coin = btc();
        assert!(coin.check_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(coin.check_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        assert!(coin.check_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
        assert!(!coin.check_address("0invalid"));
        assert!(!coin.check_address(""));
        assert!(!coin.check_address("1l0O")); // ambiguous base58 chars

        let doge = CoinInfo::for_name("DOGE").unwrap();
        assert!(doge.check_address("DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L"));
        assert!(!doge.check_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
    }
}
