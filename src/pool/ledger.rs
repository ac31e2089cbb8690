//! Append-only pool ledger
//!
//! One immutable row per pool mutation, persisted as JSONL when a path is
//! configured. External reporting consumes this file; nothing in the core
//! ever rewrites it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Kind of pool mutation recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    TradeExecution,
    ProfitReturn,
    LossReturn,
    PoolStatus,
}

/// One ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LedgerKind,
    /// Signed balance delta in SOL (0 for status rows)
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub trade_number: u64,
    pub note: String,
}

/// In-memory ledger with optional JSONL persistence
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    file: Option<tokio::fs::File>,
}

impl Ledger {
    /// Open the ledger, appending to `path` when set
    pub async fn open(path: Option<PathBuf>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| Error::LedgerWrite(e.to_string()))?;
                    }
                }
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(|e| Error::LedgerWrite(format!("{}: {}", path.display(), e)))?;
                Some(file)
            }
            None => None,
        };

        Ok(Self {
            entries: Vec::new(),
            file,
        })
    }

    /// Append one row. A persistence failure is fatal to the caller.
    pub async fn append(&mut self, entry: LedgerEntry) -> Result<()> {
        if let Some(file) = &mut self.file {
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| Error::LedgerWrite(e.to_string()))?;
            file.flush()
                .await
                .map_err(|e| Error::LedgerWrite(e.to_string()))?;
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read a persisted ledger back (used by the `ledger` CLI command)
pub async fn read_entries(path: &std::path::Path) -> Result<Vec<LedgerEntry>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;

    data.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: LedgerKind, amount: f64) -> LedgerEntry {
        LedgerEntry {
            timestamp: Utc::now(),
            kind,
            amount,
            balance_before: 600.0,
            balance_after: 600.0 + amount,
            trade_number: 1,
            note: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_append() {
        let mut ledger = Ledger::open(None).await.unwrap();
        ledger
            .append(entry(LedgerKind::TradeExecution, -15.0))
            .await
            .unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].kind, LedgerKind::TradeExecution);
    }

    #[tokio::test]
    async fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let mut ledger = Ledger::open(Some(path.clone())).await.unwrap();
        ledger
            .append(entry(LedgerKind::TradeExecution, -15.0))
            .await
            .unwrap();
        ledger
            .append(entry(LedgerKind::ProfitReturn, 30.0))
            .await
            .unwrap();

        let read_back = read_entries(&path).await.unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[1].kind, LedgerKind::ProfitReturn);
        assert_eq!(read_back[1].amount, 30.0);
    }
}
