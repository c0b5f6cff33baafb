//! Per-instrument market data cache: latest top-of-book and last trade, plus
//! subscriber callbacks fired as new ticks land.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use serde::Serialize;

use crate::{
    tick::{AggressorSide, MdStream, TickEvent, TickEventKind},
    types::{Instrument, Time},
};

/// Snapshot of the best bid/ask for one instrument.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TopOfBook {
    pub bid_px: f64,
    pub bid_qty: f64,
    pub ask_px: f64,
    pub ask_qty: f64,
}

/// Snapshot of the most recent trade print.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LastTrade {
    pub price: f64,
    pub qty: f64,
    pub aggressor_side: AggressorSide,
    pub exch_ts_us: Time,
}

type BookFn = Box<dyn FnMut(&Instrument, TopOfBook, Time)>;
type TradeFn = Box<dyn FnMut(&Instrument, LastTrade, Time)>;

/// One instrument's cached state. Lives behind an `Rc<RefCell<_>>` inside
/// [`MarketDataService`] so callers can hold a stable handle across updates.
pub struct MarketData {
    instrument: Instrument,
    top_of_book: Option<TopOfBook>,
    last_trade: Option<LastTrade>,
    book_subscribers: Vec<BookFn>,
    trade_subscribers: Vec<TradeFn>,
}

impl MarketData {
    fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            top_of_book: None,
            last_trade: None,
            book_subscribers: Vec::new(),
            trade_subscribers: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn top_of_book(&self) -> Option<TopOfBook> {
        self.top_of_book
    }

    pub fn last_trade(&self) -> Option<LastTrade> {
        self.last_trade
    }

    /// Registers a callback fired, in registration order, whenever a new
    /// top-of-book update lands for this instrument.
    pub fn on_tick_book(&mut self, f: impl FnMut(&Instrument, TopOfBook, Time) + 'static) {
        self.book_subscribers.push(Box::new(f));
    }

    /// Registers a callback fired, in registration order, whenever a new
    /// trade print lands for this instrument.
    pub fn on_tick_trade(&mut self, f: impl FnMut(&Instrument, LastTrade, Time) + 'static) {
        self.trade_subscribers.push(Box::new(f));
    }

    fn apply(&mut self, event: TickEvent) {
        match event.kind {
            TickEventKind::TopOfBook {
                bid_px,
                bid_qty,
                ask_px,
                ask_qty,
            } => {
                let tob = TopOfBook {
                    bid_px,
                    bid_qty,
                    ask_px,
                    ask_qty,
                };
                self.top_of_book = Some(tob);
                for sub in &mut self.book_subscribers {
                    sub(&self.instrument, tob, event.exch_ts_us);
                }
            }
            TickEventKind::Trade {
                price,
                qty,
                aggressor_side,
            } => {
                let trade = LastTrade {
                    price,
                    qty,
                    aggressor_side,
                    exch_ts_us: event.exch_ts_us,
                };
                self.last_trade = Some(trade);
                for sub in &mut self.trade_subscribers {
                    sub(&self.instrument, trade, event.exch_ts_us);
                }
            }
        }
    }
}

/// Owns every instrument's [`MarketData`] behind a stable handle, so
/// subscribers registered once remain valid for the life of the run.
#[derive(Default)]
pub struct MarketDataService {
    by_instrument: HashMap<Instrument, Rc<RefCell<MarketData>>>,
}

impl MarketDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instrument so it can receive ticks. Idempotent: a second
    /// call for the same instrument returns the existing handle unchanged.
    pub fn add_instrument(&mut self, instrument: Instrument) -> Rc<RefCell<MarketData>> {
        self.by_instrument
            .entry(instrument.clone())
            .or_insert_with(|| Rc::new(RefCell::new(MarketData::new(instrument))))
            .clone()
    }

    pub fn find_market_data(&self, instrument: &Instrument) -> Option<Rc<RefCell<MarketData>>> {
        self.by_instrument.get(instrument).cloned()
    }

    /// Routes a decoded event to the matching instrument's cache, ignoring
    /// `stream` beyond having already been used to select the instrument's
    /// replayer upstream.
    pub fn dispatch(&mut self, instrument: &Instrument, _stream: MdStream, event: TickEvent) {
        if let Some(md) = self.by_instrument.get(instrument) {
            md.borrow_mut().apply(event);
        } else {
            tracing::warn!(%instrument, "tick for unregistered instrument dropped");
        }
    }
}
