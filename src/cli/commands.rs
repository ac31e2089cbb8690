//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analyzer::SignalAnalyzer;
use crate::chain::{ChainDataProvider, FixedChainData, RpcChainDataProvider};
use crate::config::Config;
use crate::gateway::{ExecutionGateway, PaperGateway};
use crate::pool::{ledger, CapacityPool};
use crate::position::monitor::{PositionMonitor, SettlementListener};
use crate::position::PositionBook;
use crate::queue::rescorer::BackgroundRescorer;
use crate::queue::AdmissionQueue;
use crate::report::StatusReporter;
use crate::stream::{DetectionEvent, DetectionStream};

/// Start the pipeline
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    let session_id = Uuid::new_v4();
    if dry_run {
        warn!("Running in DRY-RUN mode - simulated chain data and fills");
    }
    info!(
        "Starting pool sniper (session {}): pool {} SOL, {} SOL per position, target {} SOL",
        session_id,
        config.pool.initial_balance_sol,
        config.pool.position_size_sol,
        config.pool.target_balance_sol
    );

    // Shared services
    let pool = Arc::new(CapacityPool::new(&config.pool).await?);
    let book = Arc::new(PositionBook::new(Duration::from_secs(
        config.analyzer.medium_window_secs,
    )));
    let analyzer = Arc::new(SignalAnalyzer::new(config.analyzer.clone()));

    let chain: Arc<dyn ChainDataProvider> = if dry_run {
        Arc::new(FixedChainData::default())
    } else {
        Arc::new(RpcChainDataProvider::new(&config.rpc)?)
    };

    // Settlement callbacks flow back over this channel
    let (closed_tx, closed_rx) = mpsc::channel(256);
    let gateway: Arc<dyn ExecutionGateway> = Arc::new(PaperGateway::new(closed_tx));

    let queue = Arc::new(AdmissionQueue::new(
        &config.admission,
        config.analyzer.default_max_hold_minutes,
        pool.clone(),
        chain,
        gateway.clone(),
        book.clone(),
    )?);

    let shutdown = CancellationToken::new();
    let (detection_tx, mut detection_rx) = mpsc::channel(512);
    let (tick_tx, tick_rx) = mpsc::channel(1024);

    // Background tasks
    let rescorer = BackgroundRescorer::new(queue.clone(), pool.clone(), config.rescorer.clone())
        .spawn(shutdown.clone());
    let monitor = PositionMonitor::new(book.clone(), analyzer, gateway.clone())
        .spawn(tick_rx, shutdown.clone());
    let settlements = SettlementListener::new(pool.clone(), book.clone(), queue.clone())
        .spawn(closed_rx, shutdown.clone());
    let reporter = StatusReporter::new(
        pool.clone(),
        queue.clone(),
        book.clone(),
        config.report.clone(),
    )
    .spawn(shutdown.clone());
    let stream = DetectionStream::new(
        config.stream.clone(),
        config.analyzer.whale_trade_min_sol,
        detection_tx,
        tick_tx,
        book.clone(),
    )
    .spawn(shutdown.clone());

    // Admission driver: one concurrent pipeline invocation per detection
    let admissions = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = detection_rx.recv() => match event {
                        Some(event) => {
                            let queue = queue.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                let DetectionEvent { mint, meta } = event;
                                match queue.admit(&mint, meta).await {
                                    Ok(status) => {
                                        info!("{}: admission resolved {:?}", mint, status);
                                    }
                                    Err(e) => {
                                        error!("{}: fatal admission error: {}", mint, e);
                                        shutdown.cancel();
                                    }
                                }
                            });
                        }
                        None => break,
                    },
                }
            }
        })
    };

    info!("pipeline running - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();

    // Drain background tasks; log anything that ended badly
    let _ = admissions.await;
    let _ = monitor.await;
    let _ = reporter.await;
    if let Ok(Err(e)) = rescorer.await {
        error!("rescorer ended with error: {}", e);
    }
    if let Ok(Err(e)) = settlements.await {
        error!("settlement listener ended with error: {}", e);
    }
    if let Ok(Err(e)) = stream.await {
        error!("detection stream ended with error: {}", e);
    }

    // Final session summary
    let counts = queue.status_counts().await;
    let summary = pool.summary().await;
    info!(
        "session {} complete: {} trades, {:.1}% win rate, {:+.2} SOL P&L, final pool {:.2} SOL",
        session_id, summary.total_trades, summary.win_rate_pct, summary.total_pnl, summary.balance
    );
    info!(
        "candidates: {} bought, {} rejected, {} pool-depleted, {} still pending",
        counts.profit + counts.loss + counts.bought,
        counts.rejected,
        counts.pool_depleted,
        counts.pending
    );
    if !book.is_empty() {
        warn!("{} positions still open at shutdown", book.len());
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) {
    println!("{}", config.masked_display());
}

/// Show the most recent ledger rows
pub async fn show_ledger(config: &Config, limit: usize) -> Result<()> {
    let path = match &config.pool.ledger_path {
        Some(path) => path,
        None => {
            println!("No ledger path configured (pool.ledger_path)");
            return Ok(());
        }
    };

    let entries = ledger::read_entries(std::path::Path::new(path)).await?;
    let skip = entries.len().saturating_sub(limit);

    println!("Last {} of {} ledger rows:", entries.len() - skip, entries.len());
    for entry in &entries[skip..] {
        println!(
            "{} {:>15} {:>+10.2} {:>10.2} -> {:<10.2} #{:<4} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.kind),
            entry.amount,
            entry.balance_before,
            entry.balance_after,
            entry.trade_number,
            entry.note
        );
    }

    Ok(())
}
