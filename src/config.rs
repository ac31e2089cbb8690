//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub stream: StreamConfig,
    pub pool: PoolConfig,
    pub admission: AdmissionConfig,
    pub rescorer: RescorerConfig,
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Maximum reconnect attempts (0 = infinite)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// Capacity pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Starting balance for the session, in SOL
    #[serde(default = "default_initial_balance")]
    pub initial_balance_sol: f64,
    /// Amount reserved per trade, in SOL
    #[serde(default = "default_position_size")]
    pub position_size_sol: f64,
    /// Session target; the first crossing is reported once
    #[serde(default = "default_target_balance")]
    pub target_balance_sol: f64,
    /// Append-only ledger path (JSONL). In-memory only when unset.
    #[serde(default)]
    pub ledger_path: Option<String>,
}

/// Stage 1 admission filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum pooled liquidity, in SOL
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity_sol: f64,
    /// Wall-clock budget for the whole Stage 1 pass
    #[serde(default = "default_max_processing_time_ms")]
    pub max_processing_time_ms: u64,
    /// Name/symbol patterns rejected before any provider call
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

/// Background rescorer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RescorerConfig {
    #[serde(default = "default_rescore_interval_secs")]
    pub interval_secs: u64,
    /// A candidate exhausting this budget is terminally rejected
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum age since detection before a retry
    #[serde(default = "default_retry_cooldown_secs")]
    pub retry_cooldown_secs: u64,
    /// Pause between sequential retries within one sweep
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
}

/// Signal analyzer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Short momentum window (seconds)
    #[serde(default = "default_short_window_secs")]
    pub short_window_secs: u64,
    /// Medium momentum window (seconds)
    #[serde(default = "default_medium_window_secs")]
    pub medium_window_secs: u64,
    /// Volume rate-of-change that counts as acceleration (0.5 = +50%)
    #[serde(default = "default_volume_acceleration")]
    pub volume_acceleration_rate: f64,
    /// Short-window price change that counts as early momentum (0.15 = 15%)
    #[serde(default = "default_short_term_gain")]
    pub short_term_gain: f64,
    /// Gain above which momentum switches to the is-accelerating check
    #[serde(default = "default_momentum_breakpoint")]
    pub momentum_gain_breakpoint_pct: f64,
    /// Share of window volume from whale-sized trades that fires the signal
    #[serde(default = "default_whale_share")]
    pub whale_volume_share: f64,
    /// Single-trade size that counts as a whale, in SOL (attributed at the
    /// feed boundary)
    #[serde(default = "default_whale_trade_min")]
    pub whale_trade_min_sol: f64,
    /// Confidence above which the aggressive exit preset is chosen
    #[serde(default = "default_aggressive_confidence")]
    pub aggressive_confidence: f64,
    /// Confidence above which the balanced exit preset is chosen
    #[serde(default = "default_balanced_confidence")]
    pub balanced_confidence: f64,
    /// Default hold budget for a fresh position, in minutes
    #[serde(default = "default_max_hold_minutes")]
    pub default_max_hold_minutes: u64,
}

/// Periodic status report configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval_secs(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    3
}
fn default_ws_url() -> String {
    "wss://pumpportal.fun/api/data".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    5000
}
fn default_max_reconnect_attempts() -> u32 {
    0
}
fn default_initial_balance() -> f64 {
    600.0
}
fn default_position_size() -> f64 {
    15.0
}
fn default_target_balance() -> f64 {
    7000.0
}
fn default_min_liquidity() -> f64 {
    3.0
}
fn default_max_processing_time_ms() -> u64 {
    3000
}
fn default_rescore_interval_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}
fn default_retry_cooldown_secs() -> u64 {
    30
}
fn default_retry_pause_ms() -> u64 {
    1000
}
fn default_short_window_secs() -> u64 {
    30
}
fn default_medium_window_secs() -> u64 {
    60
}
fn default_volume_acceleration() -> f64 {
    0.5
}
fn default_short_term_gain() -> f64 {
    0.15
}
fn default_momentum_breakpoint() -> f64 {
    30.0
}
fn default_whale_share() -> f64 {
    0.3
}
fn default_whale_trade_min() -> f64 {
    1.0
}
fn default_aggressive_confidence() -> f64 {
    70.0
}
fn default_balanced_confidence() -> f64 {
    50.0
}
fn default_max_hold_minutes() -> u64 {
    30
}
fn default_report_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("stream.ws_url", default_ws_url())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix POOLSNIPER_)
            .add_source(
                config::Environment::with_prefix("POOLSNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.pool.position_size_sol <= 0.0 {
            anyhow::bail!("position_size_sol must be positive");
        }

        if self.pool.initial_balance_sol < 0.0 {
            anyhow::bail!("initial_balance_sol cannot be negative");
        }

        if self.pool.target_balance_sol <= self.pool.initial_balance_sol {
            tracing::warn!(
                "target_balance_sol ({}) is not above the initial balance ({}) - \
                 the target report will fire immediately",
                self.pool.target_balance_sol,
                self.pool.initial_balance_sol
            );
        }

        if self.admission.min_liquidity_sol < 0.0 {
            anyhow::bail!("min_liquidity_sol cannot be negative");
        }

        if self.admission.max_processing_time_ms == 0 {
            anyhow::bail!("max_processing_time_ms must be positive");
        }

        if self.rescorer.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if self.analyzer.short_window_secs >= self.analyzer.medium_window_secs {
            anyhow::bail!(
                "short_window_secs ({}) must be below medium_window_secs ({})",
                self.analyzer.short_window_secs,
                self.analyzer.medium_window_secs
            );
        }

        if self.analyzer.whale_volume_share <= 0.0 || self.analyzer.whale_volume_share > 1.0 {
            anyhow::bail!("whale_volume_share must be in (0, 1]");
        }

        if self.analyzer.balanced_confidence >= self.analyzer.aggressive_confidence {
            anyhow::bail!("balanced_confidence must be below aggressive_confidence");
        }

        // Validate blocked patterns (compile regex to check)
        for pattern in &self.admission.blocked_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blocked_pattern regex: {}", pattern))?;
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Stream:
    ws_url: {}
  Pool:
    initial_balance: {} SOL
    position_size: {} SOL
    target: {} SOL
    ledger: {}
  Admission:
    min_liquidity: {} SOL
    processing_budget: {}ms
    blocked_patterns: {}
  Rescorer:
    interval: {}s
    max_attempts: {}
    cooldown: {}s
  Analyzer:
    windows: {}s / {}s
    momentum_breakpoint: {}%
    whale_share: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.stream.ws_url,
            self.pool.initial_balance_sol,
            self.pool.position_size_sol,
            self.pool.target_balance_sol,
            self.pool.ledger_path.as_deref().unwrap_or("(in-memory)"),
            self.admission.min_liquidity_sol,
            self.admission.max_processing_time_ms,
            self.admission.blocked_patterns.len(),
            self.rescorer.interval_secs,
            self.rescorer.max_attempts,
            self.rescorer.retry_cooldown_secs,
            self.analyzer.short_window_secs,
            self.analyzer.medium_window_secs,
            self.analyzer.momentum_gain_breakpoint_pct,
            self.analyzer.whale_volume_share,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: default_rpc_endpoint(),
                timeout_ms: default_timeout_ms(),
                max_retries: default_max_retries(),
            },
            stream: StreamConfig {
                ws_url: default_ws_url(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                max_reconnect_attempts: default_max_reconnect_attempts(),
            },
            pool: PoolConfig {
                initial_balance_sol: default_initial_balance(),
                position_size_sol: default_position_size(),
                target_balance_sol: default_target_balance(),
                ledger_path: None,
            },
            admission: AdmissionConfig {
                min_liquidity_sol: default_min_liquidity(),
                max_processing_time_ms: default_max_processing_time_ms(),
                blocked_patterns: vec![],
            },
            rescorer: RescorerConfig {
                interval_secs: default_rescore_interval_secs(),
                max_attempts: default_max_attempts(),
                retry_cooldown_secs: default_retry_cooldown_secs(),
                retry_pause_ms: default_retry_pause_ms(),
            },
            analyzer: AnalyzerConfig {
                short_window_secs: default_short_window_secs(),
                medium_window_secs: default_medium_window_secs(),
                volume_acceleration_rate: default_volume_acceleration(),
                short_term_gain: default_short_term_gain(),
                momentum_gain_breakpoint_pct: default_momentum_breakpoint(),
                whale_volume_share: default_whale_share(),
                whale_trade_min_sol: default_whale_trade_min(),
                aggressive_confidence: default_aggressive_confidence(),
                balanced_confidence: default_balanced_confidence(),
                default_max_hold_minutes: default_max_hold_minutes(),
            },
            report: ReportConfig::default(),
        }
    }
}
