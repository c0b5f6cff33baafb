//! Core domain types shared by every component of the backtest core: instrument
//! identity, sides, order lifecycle, and the virtual clock unit.

use std::fmt;

use crate::error::{ApexError, Result};

/// Microseconds since the Unix epoch, UTC. Produced exclusively by the
/// [`crate::replay::ReplayScheduler`] virtual clock inside the core path.
pub type Time = i64;

/// Closed enumeration of venues this core can simulate against.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ExchangeId {
    None,
    Binance,
    BinanceUsdFut,
    BinanceCoinFut,
}

impl ExchangeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::None => "none",
            ExchangeId::Binance => "binance",
            ExchangeId::BinanceUsdFut => "binance_usdfut",
            ExchangeId::BinanceCoinFut => "binance_coinfut",
        }
    }

    pub fn from_str_checked(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ExchangeId::None),
            "binance" => Ok(ExchangeId::Binance),
            "binance_usdfut" => Ok(ExchangeId::BinanceUsdFut),
            "binance_coinfut" => Ok(ExchangeId::BinanceCoinFut),
            other => Err(ApexError::InvalidExchangeId(other.to_string())),
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque currency/token identifier. Orderable and hashable so it can key
/// wallet balances in [`crate::account::Account`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Asset(pub String);

impl Asset {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instrument identity is `(exchange, native symbol)`; immutable after
/// construction.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Instrument {
    pub exchange: ExchangeId,
    pub native_symbol: String,
    pub tick_size: TickSizeBits,
    pub lot_size: TickSizeBits,
    pub base: Asset,
    pub quote: Asset,
}

/// `f64` does not implement `Eq`/`Hash`/`Ord`; tick and lot sizes are stored as
/// their bit pattern so `Instrument` can be used as a map key, the way the
/// teacher keys its books by `(Instrument)` in an ordered `std::map`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TickSizeBits(u64);

impl From<f64> for TickSizeBits {
    fn from(v: f64) -> Self {
        Self(v.to_bits())
    }
}

impl From<TickSizeBits> for f64 {
    fn from(v: TickSizeBits) -> Self {
        f64::from_bits(v.0)
    }
}

impl Instrument {
    pub fn new(
        exchange: ExchangeId,
        native_symbol: impl Into<String>,
        tick_size: f64,
        lot_size: f64,
        base: Asset,
        quote: Asset,
    ) -> Self {
        Self {
            exchange,
            native_symbol: native_symbol.into(),
            tick_size: tick_size.into(),
            lot_size: lot_size.into(),
            base,
            quote,
        }
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size.into()
    }

    pub fn lot_size(&self) -> f64 {
        self.lot_size.into()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.native_symbol)
    }
}

/// Side of an order, or of a trade's aggressor.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OrdType {
    Limit,
    Market,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// Order lifecycle state: `PendingNew -> Live -> (Partial*) -> {Filled |
/// Cancelled | Rejected}`. No transition is possible from a terminal state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OrderState {
    PendingNew,
    Live,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

/// Client-side order record. `client_id` is unique per process run; the
/// router assigns a separate `ext_order_id` once accepted by the simulated
/// exchange.
#[derive(Clone, Debug)]
pub struct Order {
    pub client_id: u64,
    pub ext_order_id: Option<u64>,
    pub instrument: Instrument,
    pub side: Side,
    pub order_type: OrdType,
    pub price: Option<f64>,
    pub size: f64,
    pub tif: TimeInForce,
    pub state: OrderState,
    pub leaves_qty: f64,
    pub filled_qty: f64,
}

impl Order {
    pub fn new_limit(
        client_id: u64,
        instrument: Instrument,
        side: Side,
        price: f64,
        size: f64,
        tif: TimeInForce,
    ) -> Self {
        Self {
            client_id,
            ext_order_id: None,
            instrument,
            side,
            order_type: OrdType::Limit,
            price: Some(price),
            size,
            tif,
            state: OrderState::PendingNew,
            leaves_qty: size,
            filled_qty: 0.0,
        }
    }

    pub fn new_market(
        client_id: u64,
        instrument: Instrument,
        side: Side,
        size: f64,
        tif: TimeInForce,
    ) -> Self {
        Self {
            client_id,
            ext_order_id: None,
            instrument,
            side,
            order_type: OrdType::Market,
            price: None,
            size,
            tif,
            state: OrderState::PendingNew,
            leaves_qty: size,
            filled_qty: 0.0,
        }
    }

    pub fn cancellable(&self) -> bool {
        matches!(self.state, OrderState::Live | OrderState::PartiallyFilled)
    }
}
