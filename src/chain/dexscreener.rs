// DexScreener API client for liquidity lookups
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Thin DexScreener client; only the liquidity surface is used
pub struct DexScreenerClient {
    http: reqwest::Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::LiquidityLookup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: DEXSCREENER_BASE.to_string(),
        })
    }

    /// Deepest pooled liquidity for the token across its Solana pairs, in SOL
    /// (the quote side of SOL-quoted pairs).
    ///
    /// A freshly created token may not be indexed yet; that surfaces as a
    /// transient `ChainData` error so the candidate stays pending.
    pub async fn token_liquidity_sol(&self, mint: &str) -> Result<f64> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let response: TokenPairsResponse = get_json(&self.http, &url).await?;

        let pairs = match response.pairs {
            Some(pairs) if !pairs.is_empty() => pairs,
            _ => {
                return Err(Error::ChainData(format!(
                    "no pairs indexed for {} yet",
                    mint
                )))
            }
        };

        let best = pairs
            .iter()
            .filter(|p| p.chain_id == "solana")
            .filter_map(|p| p.liquidity.as_ref().and_then(|l| l.quote))
            .fold(f64::NEG_INFINITY, f64::max);

        if best.is_finite() {
            debug!("{}: deepest pair liquidity {:.2} SOL", mint, best);
            Ok(best)
        } else {
            Err(Error::ChainData(format!(
                "no solana pair with liquidity for {}",
                mint
            )))
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(http: &reqwest::Client, url: &str) -> Result<T> {
    let response = http.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::LiquidityLookup(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    Ok(response.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_pairs_response() {
        let json = r#"{
            "pairs": [
                {
                    "chainId": "solana",
                    "dexId": "raydium",
                    "pairAddress": "pair1",
                    "baseToken": {"address": "mint1", "name": "Test", "symbol": "TST"},
                    "liquidity": {"usd": 1700.0, "base": 1000000.0, "quote": 5.2}
                },
                {
                    "chainId": "solana",
                    "dexId": "pumpfun",
                    "pairAddress": "pair2",
                    "baseToken": {"address": "mint1", "name": "Test", "symbol": "TST"},
                    "liquidity": {"usd": 800.0, "base": 500000.0, "quote": 2.4}
                }
            ]
        }"#;

        let parsed: TokenPairsResponse = serde_json::from_str(json).unwrap();
        let pairs = parsed.pairs.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].liquidity.as_ref().unwrap().quote, Some(5.2));
    }

    #[test]
    fn test_parse_empty_response() {
        let parsed: TokenPairsResponse = serde_json::from_str(r#"{"pairs": null}"#).unwrap();
        assert!(parsed.pairs.is_none());
    }
}
