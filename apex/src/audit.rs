//! Append-only transaction journal. Captures order activity, fills, and
//! position context as line-oriented JSON for post-hoc reporting; this is
//! distinct from operational logging, which goes through `tracing`.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    account::Position,
    error::{ApexError, Result},
    hostinfo::HostInfo,
    marketdata::TopOfBook,
    sim::{OrderEvent, OrderEventKind},
    types::Time,
};

#[derive(Copy, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditEventType {
    Ack,
    Fill,
    Cancel,
    Reject,
}

#[derive(Serialize)]
pub struct TransactionRecord<'a> {
    pub event_time: Time,
    pub host: &'a str,
    pub strategy_id: &'a str,
    pub client_id: u64,
    pub ext_order_id: Option<u64>,
    pub event_type: AuditEventType,
    pub reason_code: Option<&'static str>,
    pub position_net: f64,
    pub market_data: Option<TopOfBook>,
    pub fx_to_usd: f64,
    pub is_fill: bool,
    pub fill_qty: f64,
    pub fill_price: f64,
}

/// Line-oriented JSON journal, one record per `add_transaction` call,
/// fsync'd on close. Ordering of calls on the event thread is preserved as a
/// total order of the strategy's observable events.
pub struct Auditor {
    path: PathBuf,
    writer: BufWriter<File>,
    host: String,
}

impl Auditor {
    pub fn create(path: impl AsRef<Path>, host_info: &HostInfo) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            host: host_info.to_string(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_transaction(
        &mut self,
        event_time: Time,
        strategy_id: &str,
        order_event: &OrderEvent,
        position: &Position,
        market_data: Option<TopOfBook>,
        fx_to_usd: f64,
    ) -> Result<()> {
        let (event_type, reason_code, is_fill, fill_qty, fill_price) = match order_event.kind {
            OrderEventKind::Accepted => (AuditEventType::Ack, None, false, 0.0, 0.0),
            OrderEventKind::Fill { qty, price } => (AuditEventType::Fill, None, true, qty, price),
            OrderEventKind::Cancelled => (AuditEventType::Cancel, None, false, 0.0, 0.0),
            OrderEventKind::CancelReject { reason } => {
                (AuditEventType::Cancel, Some(reason), false, 0.0, 0.0)
            }
            OrderEventKind::Reject { reason } => {
                (AuditEventType::Reject, Some(reason), false, 0.0, 0.0)
            }
        };

        let record = TransactionRecord {
            event_time,
            host: &self.host,
            strategy_id,
            client_id: order_event.client_id,
            ext_order_id: order_event.ext_order_id,
            event_type,
            reason_code,
            position_net: position.net(),
            market_data,
            fx_to_usd,
            is_fill,
            fill_qty,
            fill_price,
        };

        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes buffered writes and fsyncs the underlying file.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all().map_err(ApexError::Audit)
    }
}

impl Drop for Auditor {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush audit journal on drop");
        }
    }
}
