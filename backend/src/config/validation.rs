use std::collections::HashSet;

use crate::config::types::Config;
use crate::error::ConfigError;

/// Known node RPC dialects.
const NODE_KINDS: &[&str] = &["bitcoinrpc"];

impl Config {
    /// Full startup validation; any failure here is fatal before anything
    /// touches the network or the ledger.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.database_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "server.database_url".to_owned(),
            });
        }

        if self.server.node_poll_seconds == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "server.node_poll_seconds".to_owned(),
            });
        }

        if self.server.rpc_timeout_seconds == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "server.rpc_timeout_seconds".to_owned(),
            });
        }

        let mut seen = HashSet::new();
        for coin_config in &self.coins {
            let coin = coin_config.coin_info()?;

            if !seen.insert(coin.name) {
                return Err(ConfigError::DuplicateCoin {
                    name: coin.name.to_owned(),
                });
            }

            if coin_config.nodes.is_empty() {
                return Err(ConfigError::NoNodes {
                    coin: coin.name.to_owned(),
                });
            }

            for node in &coin_config.nodes {
                if !NODE_KINDS.contains(&node.kind.as_str()) {
                    return Err(ConfigError::UnknownNodeKind {
                        kind: node.kind.clone(),
                    });
                }
                if node.url.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        field: format!("coins.{}.nodes.url", coin.name),
                    });
                }
            }

            let mut fee_total = 0.0f32;
            for fee in &coin_config.fees {
                if !coin.check_address(&fee.address) {
                    return Err(ConfigError::InvalidFeeAddress {
                        coin: coin.name.to_owned(),
                        address: fee.address.clone(),
                    });
                }
                fee_total += fee.percentage;
            }
            if fee_total > 100.0 {
                return Err(ConfigError::FeeOverflow {
                    coin: coin.name.to_owned(),
                    total: fee_total,
                });
            }

            for (field, value) in [
                ("keep_round_days", coin_config.keep_round_days),
                ("keep_stats_minutes", coin_config.keep_stats_minutes),
                (
                    "confirmations_check_minutes",
                    coin_config.confirmations_check_minutes,
                ),
                ("payout_interval_minutes", coin_config.payout_interval_minutes),
                ("balance_check_minutes", coin_config.balance_check_minutes),
                (
                    "statistic_check_minutes",
                    coin_config.statistic_check_minutes,
                ),
            ] {
                if value == 0 {
                    return Err(ConfigError::ZeroInterval {
                        field: format!("coins.{}.{}", coin.name, field),
                    });
                }
            }

            // Parses the money fields as a side effect.
            coin_config.to_backend_config()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::ConfigError;

    fn sample() -> Config {
        Config::example()
    }

    #[test]
    fn example_config_is_valid() {
        sample().validate().expect("example config must validate");
    }

    #[test]
    fn unknown_coin_is_fatal() {
        let mut config = sample();
        config.coins[0].name = "NOPE".to_owned();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownCoin { .. })
        ));
    }

    #[test]
    fn empty_node_list_is_fatal() {
        let mut config = sample();
        config.coins[0].nodes.clear();

        assert!(matches!(config.validate(), Err(ConfigError::NoNodes { .. })));
    }

    #[test]
    fn fee_overflow_is_fatal() {
        let mut config = sample();
        config.coins[0].fees[0].percentage = 101.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::FeeOverflow { .. })
        ));
    }

    #[test]
    fn bad_fee_address_is_fatal() {
        let mut config = sample();
        config.coins[0].fees[0].address = "not-an-address!".to_owned();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFeeAddress { .. })
        ));
    }

    #[test]
    fn malformed_money_is_fatal() {
        let mut config = sample();
        config.coins[0].default_payout_threshold = "ten".to_owned();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMoney { .. })
        ));
    }

    #[test]
    fn zero_interval_is_fatal() {
        let mut config = sample();
        config.coins[0].payout_interval_minutes = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let rendered = toml::to_string_pretty(&sample()).expect("serialize");
        let parsed: Config = toml::from_str(&rendered).expect("parse");
        parsed.validate().expect("roundtripped config validates");
    }
}
