//! Chain data access for admission filtering
//!
//! The admission pipeline only ever talks to the chain through the
//! [`ChainDataProvider`] capability. The real implementation combines RPC
//! mint-account decoding with the DexScreener pairs API; paper mode and tests
//! use the deterministic [`FixedChainData`] double.

pub mod dexscreener;
pub mod rpc;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};

pub use rpc::RpcChainDataProvider;

/// Mint and freeze authority status for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAuthorities {
    pub mint_renounced: bool,
    pub freeze_renounced: bool,
}

impl TokenAuthorities {
    /// Both authorities renounced - the token cannot be inflated or frozen
    pub fn fully_renounced(&self) -> bool {
        self.mint_renounced && self.freeze_renounced
    }

    pub fn renounced() -> Self {
        Self {
            mint_renounced: true,
            freeze_renounced: true,
        }
    }
}

/// Read-only chain data needed by Stage 1 filtering
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Pooled liquidity for the token, in SOL
    async fn get_liquidity(&self, mint: &str) -> Result<f64>;

    /// Mint/freeze authority renouncement status
    async fn get_authorities(&self, mint: &str) -> Result<TokenAuthorities>;
}

/// Deterministic chain data for paper mode and tests
pub struct FixedChainData {
    default_liquidity_sol: f64,
    default_authorities: TokenAuthorities,
    liquidity: DashMap<String, f64>,
    authorities: DashMap<String, TokenAuthorities>,
    /// Remaining forced transient failures, per mint
    transient_failures: DashMap<String, AtomicU32>,
}

impl FixedChainData {
    pub fn new(default_liquidity_sol: f64, default_authorities: TokenAuthorities) -> Self {
        Self {
            default_liquidity_sol,
            default_authorities,
            liquidity: DashMap::new(),
            authorities: DashMap::new(),
            transient_failures: DashMap::new(),
        }
    }

    /// Override liquidity for one mint
    pub fn set_liquidity(&self, mint: &str, liquidity_sol: f64) {
        self.liquidity.insert(mint.to_string(), liquidity_sol);
    }

    /// Override authorities for one mint
    pub fn set_authorities(&self, mint: &str, authorities: TokenAuthorities) {
        self.authorities.insert(mint.to_string(), authorities);
    }

    /// Make the next `count` lookups for `mint` fail transiently
    pub fn fail_next(&self, mint: &str, count: u32) {
        self.transient_failures
            .insert(mint.to_string(), AtomicU32::new(count));
    }

    fn check_transient(&self, mint: &str) -> Result<()> {
        if let Some(remaining) = self.transient_failures.get(mint) {
            // fetch_update errors once the counter hits zero - budget spent
            let prev = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            });
            if prev.is_ok() {
                return Err(Error::ChainData("data not yet available".to_string()));
            }
        }
        Ok(())
    }
}

impl Default for FixedChainData {
    fn default() -> Self {
        Self::new(5.0, TokenAuthorities::renounced())
    }
}

#[async_trait]
impl ChainDataProvider for FixedChainData {
    async fn get_liquidity(&self, mint: &str) -> Result<f64> {
        self.check_transient(mint)?;
        Ok(self
            .liquidity
            .get(mint)
            .map(|v| *v)
            .unwrap_or(self.default_liquidity_sol))
    }

    async fn get_authorities(&self, mint: &str) -> Result<TokenAuthorities> {
        self.check_transient(mint)?;
        Ok(self
            .authorities
            .get(mint)
            .map(|v| *v)
            .unwrap_or(self.default_authorities))
    }
}
