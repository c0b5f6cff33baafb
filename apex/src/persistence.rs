//! Per-strategy position checkpointing: one line per
//! `(strategy_id, exchange, native_symbol, qty)`, rewritten atomically.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    error::Result,
    types::{ExchangeId, Instrument},
};

#[derive(Clone, Debug, PartialEq)]
pub struct RestoredPosition {
    pub strategy_id: String,
    pub exchange: ExchangeId,
    pub native_symbol: String,
    pub qty: f64,
}

/// Reads and rewrites position snapshots for a single strategy at a fixed
/// path. Snapshot lines are tab-separated: `strategy_id\texchange\tsymbol\tqty`.
pub struct PersistenceService {
    path: PathBuf,
}

impl PersistenceService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Rewrites the snapshot file atomically (write-to-tmp + rename),
    /// replacing any prior snapshot for `strategy_id` and the given
    /// instrument's position while preserving snapshots for other
    /// `(strategy_id, instrument)` pairs already on disk.
    pub fn persist_instrument_position(
        &self,
        strategy_id: &str,
        instrument: &Instrument,
        qty: f64,
    ) -> Result<()> {
        let mut entries = self.read_all().unwrap_or_default();
        entries.retain(|e| {
            !(e.strategy_id == strategy_id
                && e.exchange == instrument.exchange
                && e.native_symbol == instrument.native_symbol)
        });
        entries.push(RestoredPosition {
            strategy_id: strategy_id.to_string(),
            exchange: instrument.exchange,
            native_symbol: instrument.native_symbol.clone(),
            qty,
        });
        entries.sort_by(|a, b| {
            (a.strategy_id.as_str(), a.exchange, a.native_symbol.as_str())
                .cmp(&(b.strategy_id.as_str(), b.exchange, b.native_symbol.as_str()))
        });
        self.write_all(&entries)
    }

    pub fn restore_instrument_positions(&self, strategy_id: &str) -> Result<Vec<RestoredPosition>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.strategy_id == strategy_id)
            .collect())
    }

    fn read_all(&self) -> Result<Vec<RestoredPosition>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() != 4 {
                tracing::warn!(line, "skipping malformed position snapshot line");
                continue;
            }
            let exchange = match ExchangeId::from_str_checked(parts[1]) {
                Ok(e) => e,
                Err(_) => {
                    tracing::warn!(line, "skipping position snapshot line with bad exchange id");
                    continue;
                }
            };
            let qty: f64 = match parts[3].parse() {
                Ok(q) => q,
                Err(_) => {
                    tracing::warn!(line, "skipping position snapshot line with unparseable qty");
                    continue;
                }
            };
            entries.push(RestoredPosition {
                strategy_id: parts[0].to_string(),
                exchange,
                native_symbol: parts[2].to_string(),
                qty,
            });
        }
        Ok(entries)
    }

    fn write_all(&self, entries: &[RestoredPosition]) -> Result<()> {
        let mut body = String::new();
        for e in entries {
            body.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                e.strategy_id,
                e.exchange.as_str(),
                e.native_symbol,
                e.qty
            ));
        }
        write_atomically(&self.path, &body)
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    fn instrument(symbol: &str) -> Instrument {
        Instrument::new(
            ExchangeId::Binance,
            symbol,
            0.1,
            0.001,
            Asset::new("BTC"),
            Asset::new("USDT"),
        )
    }

    #[test]
    fn persists_and_restores_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PersistenceService::new(dir.path().join("positions.tsv"));
        svc.persist_instrument_position("strat-1", &instrument("BTCUSDT"), 5.0)
            .unwrap();
        svc.persist_instrument_position("strat-1", &instrument("ETHUSDT"), -2.0)
            .unwrap();
        svc.persist_instrument_position("strat-2", &instrument("BTCUSDT"), 1.0)
            .unwrap();

        let restored = svc.restore_instrument_positions("strat-1").unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].native_symbol, "BTCUSDT");
        assert_eq!(restored[0].qty, 5.0);
        assert_eq!(restored[1].native_symbol, "ETHUSDT");
    }

    #[test]
    fn persisting_again_for_same_key_replaces_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PersistenceService::new(dir.path().join("positions.tsv"));
        svc.persist_instrument_position("strat-1", &instrument("BTCUSDT"), 5.0)
            .unwrap();
        svc.persist_instrument_position("strat-1", &instrument("BTCUSDT"), 8.0)
            .unwrap();

        let restored = svc.restore_instrument_positions("strat-1").unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].qty, 8.0);
    }

    #[test]
    fn restoring_unknown_strategy_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PersistenceService::new(dir.path().join("positions.tsv"));
        assert!(svc.restore_instrument_positions("nope").unwrap().is_empty());
    }
}
