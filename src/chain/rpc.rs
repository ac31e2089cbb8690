//! RPC-backed chain data provider
//!
//! Authorities come from the mint account itself; liquidity comes from the
//! DexScreener pairs API. Transient failures are retried with exponential
//! backoff up to the configured budget, then surface as transient errors for
//! the rescorer to pick up.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Mint;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::dexscreener::DexScreenerClient;
use super::{ChainDataProvider, TokenAuthorities};
use crate::config::RpcConfig;
use crate::error::{Error, Result};

pub struct RpcChainDataProvider {
    rpc: Arc<RpcClient>,
    dex: DexScreenerClient,
    retry_budget: Duration,
}

impl RpcChainDataProvider {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let rpc = RpcClient::new_with_timeout(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        );

        Ok(Self {
            rpc: Arc::new(rpc),
            dex: DexScreenerClient::new(config.timeout_ms)?,
            retry_budget: Duration::from_millis(config.timeout_ms * config.max_retries.max(1) as u64),
        })
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(self.retry_budget),
            ..ExponentialBackoff::default()
        }
    }
}

#[async_trait]
impl ChainDataProvider for RpcChainDataProvider {
    async fn get_liquidity(&self, mint: &str) -> Result<f64> {
        let result = backoff::future::retry(self.retry_policy(), || async {
            self.dex.token_liquidity_sol(mint).await.map_err(|e| {
                if e.is_transient() {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await?;

        debug!("{}: liquidity {:.2} SOL", mint, result);
        Ok(result)
    }

    async fn get_authorities(&self, mint: &str) -> Result<TokenAuthorities> {
        let pubkey =
            Pubkey::from_str(mint).map_err(|_| Error::InvalidMint(mint.to_string()))?;

        let account = backoff::future::retry(self.retry_policy(), || async {
            self.rpc
                .get_account(&pubkey)
                .await
                .map_err(|e| backoff::Error::transient(Error::from(e)))
        })
        .await?;

        if account.data.len() < Mint::LEN {
            return Err(Error::ChainData(format!(
                "mint account for {} too small ({} bytes)",
                mint,
                account.data.len()
            )));
        }

        let state = Mint::unpack_from_slice(&account.data[..Mint::LEN])
            .map_err(|e| Error::ChainData(format!("mint decode failed for {}: {}", mint, e)))?;

        Ok(TokenAuthorities {
            mint_renounced: state.mint_authority.is_none(),
            freeze_renounced: state.freeze_authority.is_none(),
        })
    }
}
