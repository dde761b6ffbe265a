// Price oracle collaborators
// This file defines the USD price contract used for gas costs and reserve
// valuation, a cached CoinGecko client and a fixed-price oracle
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::errors::ExecError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::transport::http_client;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

const PRICE_TTL: Duration = Duration::from_secs(60);
const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3/";

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one whole unit of `symbol`.
    async fn price_of(&self, symbol: &str) -> Result<f64, ExecError>;

    async fn native_token_price(&self, chain: &str) -> Result<f64, ExecError> {
        let info = chains::chain_info(chain)
            .ok_or_else(|| ExecError::provider("pricing", format!("unknown chain {chain}")))?;
        self.price_of(info.native_symbol).await
    }
}

/// Fixed prices, for tests and air-gapped deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceOracle {
    prices: HashMap<String, f64>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, usd: f64) -> Self {
        self.prices.insert(symbol.to_ascii_uppercase(), usd);
        self
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn price_of(&self, symbol: &str) -> Result<f64, ExecError> {
        self.prices
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| ExecError::provider("pricing", format!("no price for {symbol}")))
    }
}

pub struct CoinGeckoOracle {
    http: reqwest::Client,
    base: Url,
    api_key: Option<String>,
    cache: RwLock<HashMap<String, (f64, Instant)>>,
}

impl CoinGeckoOracle {
    pub fn new(base: Option<Url>, api_key: Option<String>) -> Result<Self, ExecError> {
        let base = match base {
            Some(url) => url,
            None => Url::parse(COINGECKO_BASE)
                .map_err(|e| ExecError::Transport(format!("coingecko base url: {e}")))?,
        };
        Ok(Self {
            http: http_client()?,
            base,
            api_key,
            cache: RwLock::new(HashMap::new()),
        })
    }

    async fn fetch(&self, coin_id: &str) -> Result<f64, ExecError> {
        let _timer = REQ_LATENCY
            .with_label_values(&["coingecko", "simple_price"])
            .start_timer();
        let url = self
            .base
            .join("simple/price")
            .map_err(|e| ExecError::Transport(format!("coingecko url: {e}")))?;
        let mut req = self
            .http
            .get(url)
            .query(&[("ids", coin_id), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-pro-api-key", key);
        }
        let resp = req.send().await.map_err(|e| {
            REQ_ERRORS
                .with_label_values(&["coingecko", "simple_price"])
                .inc();
            ExecError::from_http("coingecko", e)
        })?;
        let status = resp.status();
        if !status.is_success() {
            REQ_ERRORS
                .with_label_values(&["coingecko", "simple_price"])
                .inc();
            return Err(ExecError::provider("coingecko", format!("http {status}")));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExecError::provider("coingecko", format!("json parse: {e}")))?;
        parse_simple_price(&body, coin_id)
            .ok_or_else(|| ExecError::provider("coingecko", format!("no usd price for {coin_id}")))
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn price_of(&self, symbol: &str) -> Result<f64, ExecError> {
        let symbol = symbol.to_ascii_uppercase();
        if let Some((price, at)) = self.cache.read().await.get(&symbol) {
            if at.elapsed() < PRICE_TTL {
                return Ok(*price);
            }
        }
        let coin_id = coingecko_id(&symbol)
            .ok_or_else(|| ExecError::provider("coingecko", format!("unmapped symbol {symbol}")))?;
        let price = self.fetch(coin_id).await?;
        debug!(symbol = %symbol, price = price, "price refreshed");
        self.cache
            .write()
            .await
            .insert(symbol, (price, Instant::now()));
        Ok(price)
    }
}

fn coingecko_id(symbol: &str) -> Option<&'static str> {
    let id = match symbol {
        "ETH" | "WETH" => "ethereum",
        "BNB" => "binancecoin",
        "AVAX" => "avalanche-2",
        "POL" | "MATIC" => "polygon-ecosystem-token",
        "XDAI" => "xdai",
        "USDC" | "USDC.E" => "usd-coin",
        "USDT" => "tether",
        "DAI" => "dai",
        _ => return None,
    };
    Some(id)
}

fn parse_simple_price(body: &serde_json::Value, coin_id: &str) -> Option<f64> {
    body.get(coin_id)?.get("usd")?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_price_shape() {
        let body = json!({"ethereum": {"usd": 3120.55}});
        assert_eq!(parse_simple_price(&body, "ethereum"), Some(3120.55));
        assert_eq!(parse_simple_price(&body, "tether"), None);
        assert_eq!(coingecko_id("MATIC"), Some("polygon-ecosystem-token"));
        assert_eq!(coingecko_id("DOGE"), None);
    }

    #[tokio::test]
    async fn static_oracle_resolves_native_symbol() {
        let oracle = StaticPriceOracle::new()
            .with_price("eth", 3_000.0)
            .with_price("POL", 0.5);
        assert_eq!(oracle.native_token_price("arbitrum").await.unwrap(), 3_000.0);
        assert_eq!(oracle.native_token_price("polygon").await.unwrap(), 0.5);
        assert!(oracle.native_token_price("bsc").await.is_err());
        assert!(oracle.native_token_price("narnia").await.is_err());
    }
}
