//! Per-instrument resting-order book and top-of-book-driven matching.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::types::{Instrument, Side, TickSizeBits};

/// The exchange-side twin of a client [`crate::types::Order`]. Owned by
/// exactly one [`SimOrderBook`] while `leaves_qty > 0`.
#[derive(Clone, Debug)]
pub struct SimLimitOrder {
    pub ext_order_id: u64,
    pub client_id: u64,
    pub side: Side,
    pub price: f64,
    pub original_qty: f64,
    pub leaves_qty: f64,
}

/// One fill produced by matching, in the order it should be emitted.
pub struct BookFill {
    pub ext_order_id: u64,
    pub client_id: u64,
    pub side: Side,
    pub fill_qty: f64,
    pub fill_price: f64,
    pub resting_leaves_qty: f64,
}

/// Resting orders for one instrument, plus the last replayed top-of-book.
/// Bids are keyed so the best (highest) price iterates first; asks so the
/// best (lowest) price iterates first. FIFO within a price level.
pub struct SimOrderBook {
    instrument: Instrument,
    bids: BTreeMap<TickSizeBits, VecDeque<SimLimitOrder>>,
    asks: BTreeMap<TickSizeBits, VecDeque<SimLimitOrder>>,
    by_ext_id: HashMap<u64, (Side, TickSizeBits)>,
    last_bid: Option<f64>,
    last_ask: Option<f64>,
    last_bid_qty: f64,
    last_ask_qty: f64,
}

impl SimOrderBook {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            by_ext_id: HashMap::new(),
            last_bid: None,
            last_ask: None,
            last_bid_qty: 0.0,
            last_ask_qty: 0.0,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn last_bid(&self) -> Option<f64> {
        self.last_bid
    }

    pub fn last_ask(&self) -> Option<f64> {
        self.last_ask
    }

    pub fn update_top_of_book(&mut self, bid_px: f64, bid_qty: f64, ask_px: f64, ask_qty: f64) {
        self.last_bid = Some(bid_px);
        self.last_ask = Some(ask_px);
        self.last_bid_qty = bid_qty;
        self.last_ask_qty = ask_qty;
    }

    /// A buy is marketable on arrival when its price crosses the last replayed ask.
    pub fn buy_is_marketable(&self, price: f64) -> bool {
        self.last_ask.map(|ask| price >= ask).unwrap_or(false)
    }

    /// A sell is marketable on arrival when its price crosses the last replayed bid.
    pub fn sell_is_marketable(&self, price: f64) -> bool {
        self.last_bid.map(|bid| price <= bid).unwrap_or(false)
    }

    pub fn displayed_ask_qty(&self) -> f64 {
        self.last_ask_qty
    }

    pub fn displayed_bid_qty(&self) -> f64 {
        self.last_bid_qty
    }

    /// Rests `order` at its price level, FIFO (appended to the back).
    pub fn rest(&mut self, order: SimLimitOrder) {
        let key = TickSizeBits::from(order.price);
        let side = order.side;
        self.by_ext_id.insert(order.ext_order_id, (side, key));
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        levels.entry(key).or_default().push_back(order);
    }

    /// Removes and returns `ext_order_id` if it is still resting.
    pub fn remove(&mut self, ext_order_id: u64) -> Option<SimLimitOrder> {
        let (side, key) = self.by_ext_id.remove(&ext_order_id)?;
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let queue = levels.get_mut(&key)?;
        let pos = queue.iter().position(|o| o.ext_order_id == ext_order_id)?;
        let order = queue.remove(pos);
        if queue.is_empty() {
            levels.remove(&key);
        }
        order
    }

    pub fn contains(&self, ext_order_id: u64) -> bool {
        self.by_ext_id.contains_key(&ext_order_id)
    }

    /// Fills resting buys whose price is marketable against the new ask, in
    /// price-priority (highest first) then arrival order, capped by the
    /// displayed ask quantity. Call after [`Self::update_top_of_book`].
    pub fn match_buys_against_new_ask(&mut self) -> Vec<BookFill> {
        let Some(ask) = self.last_ask else {
            return Vec::new();
        };
        let mut budget = self.last_ask_qty;
        let mut fills = Vec::new();
        let price_keys: Vec<TickSizeBits> = self.bids.keys().rev().copied().collect();

        for key in price_keys {
            if budget <= 0.0 {
                break;
            }
            let price: f64 = key.into();
            if price < ask {
                break;
            }
            self.drain_level_fifo(Side::Buy, key, &mut budget, price, &mut fills);
        }
        fills
    }

    /// Fills resting sells whose price is marketable against the new bid,
    /// symmetric to [`Self::match_buys_against_new_ask`].
    pub fn match_sells_against_new_bid(&mut self) -> Vec<BookFill> {
        let Some(bid) = self.last_bid else {
            return Vec::new();
        };
        let mut budget = self.last_bid_qty;
        let mut fills = Vec::new();
        let price_keys: Vec<TickSizeBits> = self.asks.keys().copied().collect();

        for key in price_keys {
            if budget <= 0.0 {
                break;
            }
            let price: f64 = key.into();
            if price > bid {
                break;
            }
            self.drain_level_fifo(Side::Sell, key, &mut budget, price, &mut fills);
        }
        fills
    }

    fn drain_level_fifo(
        &mut self,
        side: Side,
        key: TickSizeBits,
        budget: &mut f64,
        price: f64,
        fills: &mut Vec<BookFill>,
    ) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let Some(queue) = levels.get_mut(&key) else {
            return;
        };
        while *budget > 0.0 {
            let Some(front) = queue.front_mut() else {
                break;
            };
            let fill_qty = front.leaves_qty.min(*budget);
            front.leaves_qty -= fill_qty;
            *budget -= fill_qty;
            fills.push(BookFill {
                ext_order_id: front.ext_order_id,
                client_id: front.client_id,
                side: front.side,
                fill_qty,
                fill_price: price,
                resting_leaves_qty: front.leaves_qty,
            });
            if front.leaves_qty <= 0.0 {
                let filled = queue.pop_front().unwrap();
                self.by_ext_id.remove(&filled.ext_order_id);
            } else {
                break;
            }
        }
        if queue.is_empty() {
            levels.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Asset, ExchangeId};

    fn instrument() -> Instrument {
        Instrument::new(
            ExchangeId::Binance,
            "BTCUSDT",
            0.1,
            0.001,
            Asset::new("BTC"),
            Asset::new("USDT"),
        )
    }

    #[test]
    fn resting_buy_fills_when_ask_falls_to_its_price() {
        let mut book = SimOrderBook::new(instrument());
        book.update_top_of_book(100.0, 1.0, 102.0, 1.0);
        book.rest(SimLimitOrder {
            ext_order_id: 1,
            client_id: 1,
            side: Side::Buy,
            price: 101.0,
            original_qty: 5.0,
            leaves_qty: 5.0,
        });

        book.update_top_of_book(101.0, 1.0, 101.0, 5.0);
        let fills = book.match_buys_against_new_ask();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].fill_qty, 5.0);
        assert_eq!(fills[0].fill_price, 101.0);
        assert!(!book.contains(1));
    }

    #[test]
    fn displayed_qty_budget_is_shared_across_price_levels_by_priority() {
        let mut book = SimOrderBook::new(instrument());
        book.update_top_of_book(100.0, 1.0, 105.0, 1.0);
        book.rest(SimLimitOrder {
            ext_order_id: 1,
            client_id: 1,
            side: Side::Buy,
            price: 101.0,
            original_qty: 3.0,
            leaves_qty: 3.0,
        });
        book.rest(SimLimitOrder {
            ext_order_id: 2,
            client_id: 2,
            side: Side::Buy,
            price: 102.0,
            original_qty: 3.0,
            leaves_qty: 3.0,
        });

        book.update_top_of_book(100.0, 1.0, 100.0, 4.0);
        let fills = book.match_buys_against_new_ask();
        // Higher price (102) has priority and is fully filled first.
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].ext_order_id, 2);
        assert_eq!(fills[0].fill_qty, 3.0);
        assert_eq!(fills[1].ext_order_id, 1);
        assert_eq!(fills[1].fill_qty, 1.0);
        assert!(!book.contains(2));
        assert!(book.contains(1));
    }

    #[test]
    fn cancel_removes_from_book() {
        let mut book = SimOrderBook::new(instrument());
        book.rest(SimLimitOrder {
            ext_order_id: 1,
            client_id: 1,
            side: Side::Sell,
            price: 100.0,
            original_qty: 1.0,
            leaves_qty: 1.0,
        });
        assert!(book.remove(1).is_some());
        assert!(book.remove(1).is_none());
    }
}
