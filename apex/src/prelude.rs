//! Common imports for strategy code built on top of this crate.

pub use crate::{
    account::{Account, AccountUpdate, AlertBoard, Position},
    audit::Auditor,
    backtest_service::{BacktestContext, BacktestService, ReplaySource},
    error::{ApexError, Result},
    marketdata::{LastTrade, MarketData, MarketDataService, TopOfBook},
    sim::{OrderEvent, OrderEventKind, OrderRouter, SimExchange},
    tick::MdStream,
    types::{Asset, ExchangeId, Instrument, OrdType, Order, OrderState, Side, TimeInForce},
};
