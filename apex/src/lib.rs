//! # Apex
//!
//! A deterministic tick-replay backtesting core for crypto market-making and
//! execution strategies. Replays bucketed top-of-book and trade tick files
//! through a single virtual clock, matches orders against the replayed book
//! in a simulated exchange, and records every order event to an append-only
//! audit journal alongside the strategy's running position.
//!
//! ## Key properties
//! - Single-threaded, cooperative event loop: the virtual clock only ever
//!   advances inside [`replay::ReplayScheduler::run`], so a run is
//!   reproducible bit-for-bit given the same tick files and strategy logic.
//! - The same [`sim::OrderRouter`] trait a strategy calls into during a
//!   backtest is the contract a live gateway session would implement,
//!   so strategy code does not change between replay and production.
//! - Order rejects and cancel rejects are first-class events on the normal
//!   event path, not `Result::Err`. See [`error::ApexError`]'s doc comment
//!   for the split between format/resource errors and logical order outcomes.

/// Binary tick file framing and the streaming reader/writer for bucketed day files.
pub mod tick;

/// Replays bucketed tick files and merges them into one virtual clock.
pub mod replay;

/// Per-instrument market data cache with subscriber callbacks.
pub mod marketdata;

/// Simulated matching venue: order book, matching, and the `OrderRouter` contract.
pub mod sim;

/// The virtual-clock event loop backing deterministic replay.
pub mod eventloop;

/// Append-only transaction journal for order activity and position context.
pub mod audit;

/// Strategy-private position and wallet-balance bookkeeping.
pub mod account;

/// Per-strategy position checkpointing to disk.
pub mod persistence;

/// Platform identity (hostname, pid) threaded into logs and audit records.
pub mod hostinfo;

/// Shared domain types: instruments, orders, sides, and the tick-size bit key.
pub mod types;

/// The crate's error type and result alias.
pub mod error;

/// Top-level composition of replayers, market data, exchange, and auditor.
pub mod backtest_service;

/// Re-exports of the types most callers need, gathered in one place.
pub mod prelude;
