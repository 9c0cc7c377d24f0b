//! Bitcoin-core-style JSON-RPC node client, the reference [`NodeClient`]
//! implementation. Covers bitcoin-family daemons (BTC/LTC/DOGE and friends)
//! speaking the classic `getblocktemplate`/wallet RPC dialect.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::coin::{Amount, CoinInfo};
use crate::node::{
    BlockTemplate, ConfirmationQuery, NodeClient, NodeError, NodeResult, NodeStatus, Payment,
    SendResult, WalletBalance,
};

/// RPC error code bitcoin-core uses for an unknown block hash.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub struct BitcoinRpcClient {
    coin: &'static CoinInfo,
    url: String,
    login: String,
    password: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl BitcoinRpcClient {
    pub fn new(coin: &'static CoinInfo, url: &str, login: &str, password: &str) -> Self {
        Self::with_timeout(coin, url, login, password, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        coin: &'static CoinInfo,
        url: &str,
        login: &str,
        password: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            coin,
            url: url.to_owned(),
            login: login.to_owned(),
            password: password.to_owned(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> NodeResult<Value> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "orepool",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.login, Some(&self.password))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    NodeError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    NodeError::Unreachable {
                        message: err.to_string(),
                    }
                }
            })?;

        // bitcoind answers RPC-level failures with a 500 and a JSON error
        // body, so the body has to be parsed before the status is judged.
        let status = response.status();
        let payload: Value = response.json().await.map_err(|err| {
            if status.is_success() {
                NodeError::Malformed {
                    message: err.to_string(),
                }
            } else {
                NodeError::Unreachable {
                    message: format!("http {status}"),
                }
            }
        })?;

        if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
            return Err(NodeError::Rejected {
                code: error.get("code").and_then(Value::as_i64),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified rpc error")
                    .to_owned(),
            });
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| NodeError::Malformed {
                message: format!("{method}: response carries neither result nor error"),
            })
    }

    /// Wallet RPC reports money as coin-denominated floats.
    fn amount_from_coins(&self, value: f64) -> Amount {
        (value * self.coin.rational_part_size as f64).round() as Amount
    }

    fn coins_from_amount(&self, amount: Amount) -> f64 {
        amount as f64 / self.coin.rational_part_size as f64
    }

    fn require_str(value: &Value, field: &str) -> NodeResult<String> {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| NodeError::Malformed {
                message: format!("missing field {field}"),
            })
    }

    fn require_i64(value: &Value, field: &str) -> NodeResult<i64> {
        value
            .get(field)
            .and_then(Value::as_i64)
            .ok_or_else(|| NodeError::Malformed {
                message: format!("missing field {field}"),
            })
    }
}

#[async_trait]
impl NodeClient for BitcoinRpcClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn status(&self) -> NodeResult<NodeStatus> {
        let info = self.call("getblockchaininfo", json!([])).await?;

        Ok(NodeStatus {
            height: Self::require_i64(&info, "blocks")?,
            best_hash: Self::require_str(&info, "bestblockhash")?,
        })
    }

    async fn get_block_template(&self) -> NodeResult<BlockTemplate> {
        let template = self
            .call("getblocktemplate", json!([{"rules": ["segwit"]}]))
            .await?;

        Ok(BlockTemplate {
            height: Self::require_i64(&template, "height")?,
            previous_hash: Self::require_str(&template, "previousblockhash")?,
            // getblocktemplate reports the coinbase value in fractional
            // units already, unlike the wallet calls.
            coinbase_value: Self::require_i64(&template, "coinbasevalue")?,
            target: Self::require_str(&template, "target")?,
            raw: template,
        })
    }

    async fn submit_block(&self, data: &str) -> NodeResult<()> {
        match self.call("submitblock", json!([data])).await? {
            Value::Null => Ok(()),
            Value::String(reason) => Err(NodeError::Rejected {
                code: None,
                message: reason,
            }),
            other => Err(NodeError::Malformed {
                message: format!("unexpected submitblock result: {other}"),
            }),
        }
    }

    async fn get_wallet_balance(&self) -> NodeResult<WalletBalance> {
        let balances = self.call("getbalances", json!([])).await?;
        let mine = balances.get("mine").ok_or_else(|| NodeError::Malformed {
            message: "getbalances: missing mine".to_owned(),
        })?;

        let spendable = mine.get("trusted").and_then(Value::as_f64).unwrap_or(0.0);
        let immature = mine.get("immature").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(WalletBalance {
            spendable: self.amount_from_coins(spendable),
            immature: self.amount_from_coins(immature),
        })
    }

    async fn get_block_confirmations(&self, queries: &mut [ConfirmationQuery]) -> NodeResult<()> {
        for query in queries {
            match self.call("getblockheader", json!([query.hash])).await {
                Ok(header) => {
                    query.confirmations = Some(Self::require_i64(&header, "confirmations")?);
                }
                // Unknown hash: the chain dropped the block entirely.
                Err(NodeError::Rejected {
                    code: Some(RPC_INVALID_ADDRESS_OR_KEY),
                    ..
                }) => {
                    query.confirmations = Some(-1);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    async fn send_transaction(&self, payment: &Payment) -> NodeResult<SendResult> {
        let label = payment.id.to_string();

        let result = match payment.outputs.as_slice() {
            [single] => {
                self.call(
                    "sendtoaddress",
                    json!([
                        single.address,
                        self.coins_from_amount(single.amount),
                        label,
                    ]),
                )
                .await?
            }
            outputs => {
                let mut destinations = serde_json::Map::new();
                for output in outputs {
                    destinations.insert(
                        output.address.clone(),
                        json!(self.coins_from_amount(output.amount)),
                    );
                }
                self.call("sendmany", json!(["", destinations, 1, label]))
                    .await?
            }
        };

        let txid = result.as_str().ok_or_else(|| NodeError::Malformed {
            message: format!("unexpected send result: {result}"),
        })?;

        // Fee lookup is best effort; the broadcast already succeeded.
        let fee = match self.call("gettransaction", json!([txid])).await {
            Ok(tx) => tx
                .get("fee")
                .and_then(Value::as_f64)
                .map(|fee| self.amount_from_coins(fee).abs())
                .unwrap_or(0),
            Err(_) => 0,
        };

        Ok(SendResult {
            txid: txid.to_owned(),
            fee,
            confirmations: 0,
        })
    }

    async fn query_payout(&self, id: Uuid) -> NodeResult<Option<SendResult>> {
        let label = id.to_string();
        let transactions = self.call("listtransactions", json!(["*", 500])).await?;

        let entries = transactions
            .as_array()
            .ok_or_else(|| NodeError::Malformed {
                message: "listtransactions: expected array".to_owned(),
            })?;

        for entry in entries.iter().rev() {
            let is_send = entry.get("category").and_then(Value::as_str) == Some("send");
            let labeled = entry.get("comment").and_then(Value::as_str) == Some(label.as_str())
                || entry.get("label").and_then(Value::as_str) == Some(label.as_str());

            if is_send && labeled {
                let txid = Self::require_str(entry, "txid")?;
                let fee = entry
                    .get("fee")
                    .and_then(Value::as_f64)
                    .map(|fee| self.amount_from_coins(fee).abs())
                    .unwrap_or(0);
                let confirmations = entry
                    .get("confirmations")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);

                return Ok(Some(SendResult {
                    txid,
                    fee,
                    confirmations,
                }));
            }
        }

        Ok(None)
    }
}
