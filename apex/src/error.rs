use thiserror::Error;

/// Errors surfaced by the core backtest pipeline.
///
/// Logical order rejects (unknown order id, unmarketable market order, cancel
/// on a terminal order) are not represented here; they are first-class
/// [`crate::sim::OrderEventKind::Reject`] events emitted on the normal event
/// path, per the error taxonomy the engine follows.
#[derive(Error, Debug)]
pub enum ApexError {
    #[error("not a valid exchange id: '{0}'")]
    InvalidExchangeId(String),

    #[error("corrupt tick record in {path}: {reason}")]
    CorruptRecord { path: String, reason: String },

    #[error("bad tick file header in {path}: {reason}")]
    BadHeader { path: String, reason: String },

    #[error("unsupported tick file version {found} (expected {expected}) in {path}")]
    UnsupportedVersion {
        path: String,
        found: u16,
        expected: u16,
    },

    #[error("instrument {0} is not listed on the simulated exchange")]
    InstrumentNotListed(String),

    #[error("audit journal error: {0}")]
    Audit(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApexError>;
