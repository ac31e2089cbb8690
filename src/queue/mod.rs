//! Admission queue
//!
//! Sole entry point for detected candidates. Every admission runs the same
//! pipeline: dedup gate, pool pre-check, Stage 1 filtering against the chain
//! data provider, pool re-check, allocation, buy handoff. Each step resolves
//! to a status value - nothing in this path raises across the boundary except
//! a fatal ledger failure.

pub mod candidate;
pub mod rescorer;

use chrono::Utc;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::ChainDataProvider;
use crate::config::AdmissionConfig;
use crate::error::{Error, Result};
use crate::gateway::ExecutionGateway;
use crate::pool::CapacityPool;
use crate::position::PositionBook;

pub use candidate::{Candidate, CandidateStatus, DetectionMeta, QueueStatusCounts};

struct QueueState {
    /// Mints that ever entered the pipeline this session
    processed: HashSet<String>,
    /// All candidate records, terminal ones included (archived in place)
    candidates: HashMap<String, Candidate>,
}

/// The admission queue
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    pool: Arc<CapacityPool>,
    chain: Arc<dyn ChainDataProvider>,
    gateway: Arc<dyn ExecutionGateway>,
    book: Arc<PositionBook>,
    blocked_patterns: Vec<Regex>,
    min_liquidity_sol: f64,
    processing_budget: Duration,
    default_hold_minutes: u64,
}

impl AdmissionQueue {
    pub fn new(
        config: &AdmissionConfig,
        default_hold_minutes: u64,
        pool: Arc<CapacityPool>,
        chain: Arc<dyn ChainDataProvider>,
        gateway: Arc<dyn ExecutionGateway>,
        book: Arc<PositionBook>,
    ) -> Result<Self> {
        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::InvalidRegex(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            state: Mutex::new(QueueState {
                processed: HashSet::new(),
                candidates: HashMap::new(),
            }),
            pool,
            chain,
            gateway,
            book,
            blocked_patterns,
            min_liquidity_sol: config.min_liquidity_sol,
            processing_budget: Duration::from_millis(config.max_processing_time_ms),
            default_hold_minutes,
        })
    }

    /// Admit a detected candidate. Always resolves to a status; `Err` is
    /// reserved for fatal conditions (ledger persistence).
    pub async fn admit(&self, mint: &str, meta: DetectionMeta) -> Result<CandidateStatus> {
        // Dedup check-and-mark is a single atomic step under the state lock:
        // concurrent admits for the same mint cannot both pass.
        {
            let mut state = self.state.lock().await;
            if state.processed.contains(mint) || state.candidates.contains_key(mint) {
                debug!("{}: duplicate admission ignored", mint);
                return Ok(CandidateStatus::Rejected);
            }
            state.processed.insert(mint.to_string());
            state
                .candidates
                .insert(mint.to_string(), Candidate::new(mint, meta));
        }

        // Cheap short-circuit: no filtering when one trade cannot be funded
        if !self.pool.can_fund().await {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::PoolDepleted,
                    "pool cannot fund a trade",
                )
                .await);
        }

        self.run_stage1(mint).await
    }

    /// Stage 1 filtering plus allocation and buy handoff. Shared between the
    /// live admission path and the background rescorer.
    pub(crate) async fn run_stage1(&self, mint: &str) -> Result<CandidateStatus> {
        let started = Instant::now();

        // Mark analyzing, bump the attempt counter, snapshot detection meta
        let (name, symbol) = {
            let mut state = self.state.lock().await;
            let candidate = match state.candidates.get_mut(mint) {
                Some(c) if !c.status.is_terminal() => c,
                Some(c) => return Ok(c.status),
                None => return Ok(CandidateStatus::Rejected),
            };
            candidate.status = CandidateStatus::Analyzing;
            candidate.attempts += 1;
            candidate.last_scored_at = Some(Utc::now());
            (candidate.name.clone(), candidate.symbol.clone())
        };

        // Blocked patterns use only detection metadata - no provider call
        if let Some(pattern) = self.blocked_match(name.as_deref(), symbol.as_deref()) {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::Rejected,
                    format!("blocked pattern: {}", pattern),
                )
                .await);
        }

        let liquidity = match self.chain.get_liquidity(mint).await {
            Ok(liquidity) => liquidity,
            Err(e) if e.is_transient() => return Ok(self.park(mint, &e).await),
            Err(e) => {
                return Ok(self
                    .finish(
                        mint,
                        CandidateStatus::Rejected,
                        format!("liquidity check failed: {}", e),
                    )
                    .await)
            }
        };

        {
            let mut state = self.state.lock().await;
            if let Some(candidate) = state.candidates.get_mut(mint) {
                candidate.liquidity_sol = Some(liquidity);
            }
        }

        if liquidity < self.min_liquidity_sol {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::Rejected,
                    format!(
                        "liquidity {:.2} SOL below minimum {:.2}",
                        liquidity, self.min_liquidity_sol
                    ),
                )
                .await);
        }

        let authorities = match self.chain.get_authorities(mint).await {
            Ok(authorities) => authorities,
            Err(e) if e.is_transient() => return Ok(self.park(mint, &e).await),
            Err(e) => {
                return Ok(self
                    .finish(
                        mint,
                        CandidateStatus::Rejected,
                        format!("authority check failed: {}", e),
                    )
                    .await)
            }
        };

        if !authorities.fully_renounced() {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::Rejected,
                    "mint/freeze authority not renounced",
                )
                .await);
        }

        // The wall-clock budget covers the whole pass; exceeding it is a
        // terminal rejection, not a retryable timeout
        let elapsed = started.elapsed();
        if elapsed > self.processing_budget {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::Rejected,
                    format!(
                        "processing took {}ms, budget {}ms",
                        elapsed.as_millis(),
                        self.processing_budget.as_millis()
                    ),
                )
                .await);
        }

        // Re-check: concurrent admissions may have drained the pool while
        // filtering was in flight
        if !self.pool.can_fund().await {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::PoolDepleted,
                    "pool depleted during analysis",
                )
                .await);
        }

        if !self.pool.allocate().await? {
            return Ok(self
                .finish(
                    mint,
                    CandidateStatus::PoolDepleted,
                    "allocation race lost",
                )
                .await);
        }

        self.set_status(mint, CandidateStatus::ReadyToBuy).await;

        match self
            .gateway
            .request_buy(mint, self.pool.position_size())
            .await
        {
            Ok(entry_price) => {
                self.book.open(mint, entry_price, self.default_hold_minutes);
                self.set_status(mint, CandidateStatus::Bought).await;
                info!(
                    "{}: bought @ {:.6} (liquidity {:.2} SOL, stage 1 in {}ms)",
                    mint,
                    entry_price,
                    liquidity,
                    elapsed.as_millis()
                );
                Ok(CandidateStatus::Bought)
            }
            Err(e) => {
                // Reverse the reservation so a failed buy cannot leak balance
                self.pool.settle(0.0, 0.0).await?;
                warn!("{}: buy failed after allocation, reservation reversed: {}", mint, e);
                Ok(self
                    .finish(
                        mint,
                        CandidateStatus::Rejected,
                        format!("buy execution failed: {}", e),
                    )
                    .await)
            }
        }
    }

    /// Record the realized outcome reported by the gateway
    pub async fn mark_closed(&self, mint: &str, pnl_pct: f64) -> CandidateStatus {
        let status = if pnl_pct > 0.0 {
            CandidateStatus::Profit
        } else {
            CandidateStatus::Loss
        };

        let mut state = self.state.lock().await;
        if let Some(candidate) = state.candidates.get_mut(mint) {
            if candidate.status == CandidateStatus::Bought {
                candidate.status = status;
            }
        }
        status
    }

    /// Reject candidates whose attempt budget is spent and return the mints
    /// due for another Stage 1 pass.
    pub(crate) async fn rescore_due(&self, max_attempts: u32, cooldown: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut due = Vec::new();

        for candidate in state.candidates.values_mut() {
            if candidate.status != CandidateStatus::Pending {
                continue;
            }
            if candidate.attempts >= max_attempts {
                candidate.status = CandidateStatus::Rejected;
                candidate.record_error("max attempts exceeded");
                info!(
                    "{}: rejected after {} attempts",
                    candidate.mint, candidate.attempts
                );
            } else if candidate.age_secs(now) >= cooldown.as_secs() {
                due.push(candidate.mint.clone());
            }
        }

        due
    }

    /// Per-status counts for the periodic report
    pub async fn status_counts(&self) -> QueueStatusCounts {
        let state = self.state.lock().await;
        let mut counts = QueueStatusCounts::default();
        for candidate in state.candidates.values() {
            counts.tally(candidate.status);
        }
        counts
    }

    /// Clone of one candidate record
    pub async fn candidate(&self, mint: &str) -> Option<Candidate> {
        self.state.lock().await.candidates.get(mint).cloned()
    }

    pub async fn candidate_count(&self) -> usize {
        self.state.lock().await.candidates.len()
    }

    fn blocked_match(&self, name: Option<&str>, symbol: Option<&str>) -> Option<String> {
        for pattern in &self.blocked_patterns {
            for field in [name, symbol].into_iter().flatten() {
                if pattern.is_match(field) {
                    return Some(pattern.as_str().to_string());
                }
            }
        }
        None
    }

    /// Terminal transition with the reason recorded. A no-op when the
    /// candidate already reached a terminal state.
    async fn finish(
        &self,
        mint: &str,
        status: CandidateStatus,
        note: impl Into<String>,
    ) -> CandidateStatus {
        let note = note.into();
        let mut state = self.state.lock().await;
        if let Some(candidate) = state.candidates.get_mut(mint) {
            if !candidate.status.is_terminal() {
                candidate.status = status;
                candidate.record_error(note.clone());
                debug!("{}: {:?} ({})", mint, status, note);
            }
        }
        status
    }

    /// Transient failure: back to pending for the rescorer
    async fn park(&self, mint: &str, error: &Error) -> CandidateStatus {
        let mut state = self.state.lock().await;
        if let Some(candidate) = state.candidates.get_mut(mint) {
            candidate.status = CandidateStatus::Pending;
            candidate.record_error(error.to_string());
            debug!("{}: parked for rescoring ({})", mint, error);
        }
        CandidateStatus::Pending
    }

    async fn set_status(&self, mint: &str, status: CandidateStatus) {
        let mut state = self.state.lock().await;
        if let Some(candidate) = state.candidates.get_mut(mint) {
            candidate.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainDataProvider, FixedChainData, TokenAuthorities};
    use crate::config::{AdmissionConfig, PoolConfig};
    use crate::gateway::testing::StaticGateway;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        pool: Arc<CapacityPool>,
        chain: Arc<FixedChainData>,
        gateway: Arc<StaticGateway>,
        book: Arc<PositionBook>,
        queue: Arc<AdmissionQueue>,
    }

    async fn fixture_with(
        pool_config: PoolConfig,
        admission: AdmissionConfig,
    ) -> Fixture {
        let pool = Arc::new(CapacityPool::new(&pool_config).await.unwrap());
        let chain = Arc::new(FixedChainData::new(5.0, TokenAuthorities::renounced()));
        let gateway = Arc::new(StaticGateway::new(0.0005));
        let book = Arc::new(PositionBook::new(Duration::from_secs(60)));
        let queue = Arc::new(
            AdmissionQueue::new(
                &admission,
                30,
                pool.clone(),
                chain.clone(),
                gateway.clone(),
                book.clone(),
            )
            .unwrap(),
        );
        Fixture {
            pool,
            chain,
            gateway,
            book,
            queue,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(
            PoolConfig {
                initial_balance_sol: 600.0,
                position_size_sol: 15.0,
                target_balance_sol: 7000.0,
                ledger_path: None,
            },
            AdmissionConfig {
                min_liquidity_sol: 3.0,
                max_processing_time_ms: 3000,
                blocked_patterns: vec![],
            },
        )
        .await
    }

    fn meta() -> DetectionMeta {
        DetectionMeta {
            signature: "sig".to_string(),
            name: Some("Test Token".to_string()),
            symbol: Some("TEST".to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_admission_opens_position() {
        let f = fixture().await;

        let status = f.queue.admit("mintA", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::Bought);
        assert!(f.book.contains("mintA"));
        assert_eq!(f.gateway.buy_count(), 1);
        assert_eq!(f.pool.summary().await.balance, 585.0);
    }

    #[tokio::test]
    async fn test_duplicate_admit_is_rejected() {
        let f = fixture().await;

        let first = f.queue.admit("mintX", meta()).await.unwrap();
        let second = f.queue.admit("mintX", meta()).await.unwrap();

        assert_eq!(first, CandidateStatus::Bought);
        assert_eq!(second, CandidateStatus::Rejected);
        // Only one candidate record exists and only one buy happened
        assert_eq!(f.queue.candidate_count().await, 1);
        assert_eq!(f.gateway.buy_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_admits_race_once() {
        let f = fixture().await;

        let q1 = f.queue.clone();
        let q2 = f.queue.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { q1.admit("mintX", meta()).await.unwrap() }),
            tokio::spawn(async move { q2.admit("mintX", meta()).await.unwrap() }),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // Exactly one proceeds past the dedup gate
        assert!(matches!(
            (a, b),
            (CandidateStatus::Bought, CandidateStatus::Rejected)
                | (CandidateStatus::Rejected, CandidateStatus::Bought)
        ));
        assert_eq!(f.queue.candidate_count().await, 1);
        assert_eq!(f.gateway.buy_count(), 1);
    }

    #[tokio::test]
    async fn test_low_liquidity_rejected_with_reason() {
        let f = fixture().await;
        f.chain.set_liquidity("thin", 2.0);

        let status = f.queue.admit("thin", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::Rejected);
        let candidate = f.queue.candidate("thin").await.unwrap();
        assert!(candidate.errors.iter().any(|e| e.contains("liquidity")));
        assert_eq!(candidate.liquidity_sol, Some(2.0));
        // No funds were touched
        assert_eq!(f.pool.summary().await.balance, 600.0);
    }

    #[tokio::test]
    async fn test_live_authorities_rejected() {
        let f = fixture().await;
        f.chain.set_authorities(
            "risky",
            TokenAuthorities {
                mint_renounced: false,
                freeze_renounced: true,
            },
        );

        let status = f.queue.admit("risky", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::Rejected);
        let candidate = f.queue.candidate("risky").await.unwrap();
        assert!(candidate.errors.iter().any(|e| e.contains("authority")));
    }

    #[tokio::test]
    async fn test_depleted_pool_short_circuits_filtering() {
        struct CountingChain {
            inner: FixedChainData,
            liquidity_calls: AtomicU32,
        }

        #[async_trait]
        impl ChainDataProvider for CountingChain {
            async fn get_liquidity(&self, mint: &str) -> crate::error::Result<f64> {
                self.liquidity_calls.fetch_add(1, Ordering::SeqCst);
                self.inner.get_liquidity(mint).await
            }
            async fn get_authorities(
                &self,
                mint: &str,
            ) -> crate::error::Result<TokenAuthorities> {
                self.inner.get_authorities(mint).await
            }
        }

        let pool = Arc::new(
            CapacityPool::new(&PoolConfig {
                initial_balance_sol: 10.0,
                position_size_sol: 15.0,
                target_balance_sol: 7000.0,
                ledger_path: None,
            })
            .await
            .unwrap(),
        );
        let chain = Arc::new(CountingChain {
            inner: FixedChainData::default(),
            liquidity_calls: AtomicU32::new(0),
        });
        let gateway = Arc::new(StaticGateway::new(0.0005));
        let book = Arc::new(PositionBook::new(Duration::from_secs(60)));
        let queue = AdmissionQueue::new(
            &AdmissionConfig {
                min_liquidity_sol: 3.0,
                max_processing_time_ms: 3000,
                blocked_patterns: vec![],
            },
            30,
            pool,
            chain.clone(),
            gateway,
            book,
        )
        .unwrap();

        let status = queue.admit("mintA", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::PoolDepleted);
        assert_eq!(chain.liquidity_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_drained_during_filter_downgrades() {
        // The pre-check passes, then the pool is drained while Stage 1 runs:
        // the re-check must downgrade to pool_depleted even though filtering
        // passed.
        struct DrainingChain {
            inner: FixedChainData,
            pool: Arc<CapacityPool>,
        }

        #[async_trait]
        impl ChainDataProvider for DrainingChain {
            async fn get_liquidity(&self, mint: &str) -> crate::error::Result<f64> {
                self.inner.get_liquidity(mint).await
            }
            async fn get_authorities(
                &self,
                mint: &str,
            ) -> crate::error::Result<TokenAuthorities> {
                // A concurrent admission wins the pool while we are filtering
                while self.pool.allocate().await.unwrap() {}
                self.inner.get_authorities(mint).await
            }
        }

        let pool = Arc::new(
            CapacityPool::new(&PoolConfig {
                initial_balance_sol: 30.0,
                position_size_sol: 15.0,
                target_balance_sol: 7000.0,
                ledger_path: None,
            })
            .await
            .unwrap(),
        );
        let chain = Arc::new(DrainingChain {
            inner: FixedChainData::default(),
            pool: pool.clone(),
        });
        let gateway = Arc::new(StaticGateway::new(0.0005));
        let book = Arc::new(PositionBook::new(Duration::from_secs(60)));
        let queue = AdmissionQueue::new(
            &AdmissionConfig {
                min_liquidity_sol: 3.0,
                max_processing_time_ms: 3000,
                blocked_patterns: vec![],
            },
            30,
            pool.clone(),
            chain,
            gateway.clone(),
            book,
        )
        .unwrap();

        let status = queue.admit("raced", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::PoolDepleted);
        assert_eq!(gateway.buy_count(), 0);
        let candidate = queue.candidate("raced").await.unwrap();
        assert!(candidate
            .errors
            .iter()
            .any(|e| e.contains("pool depleted during analysis")));
    }

    #[tokio::test]
    async fn test_transient_failure_parks_candidate() {
        let f = fixture().await;
        f.chain.fail_next("flaky", 1);

        let status = f.queue.admit("flaky", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::Pending);
        let candidate = f.queue.candidate("flaky").await.unwrap();
        assert_eq!(candidate.attempts, 1);
        assert!(!candidate.errors.is_empty());
        // Transient failures never touch the pool
        assert_eq!(f.pool.summary().await.balance, 600.0);
    }

    #[tokio::test]
    async fn test_buy_failure_reverses_reservation() {
        let f = fixture().await;
        f.gateway.fail_buy.store(true, Ordering::SeqCst);

        let status = f.queue.admit("mintA", meta()).await.unwrap();

        assert_eq!(status, CandidateStatus::Rejected);
        assert!(!f.book.contains("mintA"));
        // The allocation was compensated: balance back to the initial level
        assert_eq!(f.pool.summary().await.balance, 600.0);
        let candidate = f.queue.candidate("mintA").await.unwrap();
        assert!(candidate
            .errors
            .iter()
            .any(|e| e.contains("buy execution failed")));
    }

    #[tokio::test]
    async fn test_blocked_pattern_rejects_before_provider() {
        let f = fixture_with(
            PoolConfig {
                initial_balance_sol: 600.0,
                position_size_sol: 15.0,
                target_balance_sol: 7000.0,
                ledger_path: None,
            },
            AdmissionConfig {
                min_liquidity_sol: 3.0,
                max_processing_time_ms: 3000,
                blocked_patterns: vec!["(?i)inu".to_string()],
            },
        )
        .await;

        let status = f
            .queue
            .admit(
                "scam",
                DetectionMeta {
                    signature: "sig".to_string(),
                    name: Some("Shiba Inu Clone".to_string()),
                    symbol: Some("SHINU".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(status, CandidateStatus::Rejected);
        let candidate = f.queue.candidate("scam").await.unwrap();
        assert!(candidate
            .errors
            .iter()
            .any(|e| e.contains("blocked pattern")));
    }

    #[tokio::test]
    async fn test_mark_closed_archives_candidate() {
        let f = fixture().await;
        f.queue.admit("mintA", meta()).await.unwrap();

        assert_eq!(
            f.queue.mark_closed("mintA", 42.0).await,
            CandidateStatus::Profit
        );
        let candidate = f.queue.candidate("mintA").await.unwrap();
        assert_eq!(candidate.status, CandidateStatus::Profit);

        // Terminal states are immutable
        f.queue.mark_closed("mintA", -10.0).await;
        let candidate = f.queue.candidate("mintA").await.unwrap();
        assert_eq!(candidate.status, CandidateStatus::Profit);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let f = fixture().await;
        f.chain.set_liquidity("thin", 1.0);
        f.chain.fail_next("flaky", 1);

        f.queue.admit("mintA", meta()).await.unwrap();
        f.queue.admit("thin", meta()).await.unwrap();
        f.queue.admit("flaky", meta()).await.unwrap();

        let counts = f.queue.status_counts().await;
        assert_eq!(counts.bought, 1);
        assert_eq!(counts.rejected, 1);
        assert_eq!(counts.pending, 1);
    }
}
