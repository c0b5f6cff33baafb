//! Implements [`OrderRouter`] against a set of [`SimOrderBook`]s, deterministically
//! matching client orders against the replayed top-of-book.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    eventloop::BacktestEventLoop,
    sim::book::{SimLimitOrder, SimOrderBook},
    sim::router::{OrderEvent, OrderEventKind, OrderRouter},
    types::{Instrument, Order, OrdType, Side},
};

type Listener = Rc<RefCell<dyn FnMut(OrderEvent)>>;

/// Simulated venue: one [`SimOrderBook`] per listed instrument, an
/// `ext_order_id -> instrument` index for O(1) cancel routing, and a single
/// event listener the owning strategy registers at construction.
pub struct SimExchange {
    event_loop: BacktestEventLoop,
    books: HashMap<Instrument, SimOrderBook>,
    order_instrument: HashMap<u64, Instrument>,
    next_ext_id: u64,
    listener: Listener,
}

impl SimExchange {
    pub fn new(event_loop: BacktestEventLoop, listener: impl FnMut(OrderEvent) + 'static) -> Self {
        Self {
            event_loop,
            books: HashMap::new(),
            order_instrument: HashMap::new(),
            next_ext_id: 1,
            listener: Rc::new(RefCell::new(listener)),
        }
    }

    pub fn event_loop(&self) -> &BacktestEventLoop {
        &self.event_loop
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.books
            .entry(instrument.clone())
            .or_insert_with(|| SimOrderBook::new(instrument));
    }

    fn alloc_ext_id(&mut self) -> u64 {
        let id = self.next_ext_id;
        self.next_ext_id += 1;
        id
    }

    fn emit(&mut self, event: OrderEvent) {
        (self.listener.borrow_mut())(event);
    }

    /// Defers `event` to fire on the next scheduler iteration, mirroring the
    /// latency a live gateway round trip would add.
    fn emit_next_tick(&self, event: OrderEvent) {
        let listener = self.listener.clone();
        self.event_loop
            .dispatch(Box::new(move || (listener.borrow_mut())(event)));
    }

    /// Called once per scheduler dispatch for the instrument whose top-of-book
    /// just changed; refreshes the book's cached top and matches any resting
    /// order that has become marketable against it.
    pub fn notify_top_of_book(
        &mut self,
        instrument: &Instrument,
        bid_px: f64,
        bid_qty: f64,
        ask_px: f64,
        ask_qty: f64,
    ) {
        let Some(book) = self.books.get_mut(instrument) else {
            return;
        };
        book.update_top_of_book(bid_px, bid_qty, ask_px, ask_qty);
        let mut fills = book.match_buys_against_new_ask();
        fills.extend(book.match_sells_against_new_bid());

        for fill in fills {
            if fill.resting_leaves_qty <= 0.0 {
                self.order_instrument.remove(&fill.ext_order_id);
            }
            self.emit(OrderEvent {
                client_id: fill.client_id,
                ext_order_id: Some(fill.ext_order_id),
                side: Some(fill.side),
                kind: OrderEventKind::Fill {
                    qty: fill.fill_qty,
                    price: fill.fill_price,
                },
                leaves_qty: fill.resting_leaves_qty,
                filled_qty: fill.fill_qty,
            });
        }
    }
}

impl OrderRouter for SimExchange {
    fn send_order(&mut self, order: Order) {
        if !self.books.contains_key(&order.instrument) {
            self.emit(OrderEvent {
                client_id: order.client_id,
                ext_order_id: None,
                side: Some(order.side),
                kind: OrderEventKind::Reject { reason: "e0001" },
                leaves_qty: 0.0,
                filled_qty: 0.0,
            });
            return;
        }

        let ext_order_id = self.alloc_ext_id();
        let client_id = order.client_id;
        let side = order.side;

        // Queued behind this call on the same next-tick queue so every
        // subsequent event for this order is observed after its ack.
        self.emit_next_tick(OrderEvent {
            client_id,
            ext_order_id: Some(ext_order_id),
            side: Some(side),
            kind: OrderEventKind::Accepted,
            leaves_qty: order.size,
            filled_qty: 0.0,
        });

        match order.order_type {
            OrdType::Market => {
                let book = self
                    .books
                    .get_mut(&order.instrument)
                    .expect("checked above");
                let (marketable, px, displayed) = match side {
                    Side::Buy => (
                        book.last_ask().is_some(),
                        book.last_ask(),
                        book.displayed_ask_qty(),
                    ),
                    Side::Sell => (
                        book.last_bid().is_some(),
                        book.last_bid(),
                        book.displayed_bid_qty(),
                    ),
                };
                if !marketable || displayed <= 0.0 {
                    self.emit_next_tick(OrderEvent {
                        client_id,
                        ext_order_id: Some(ext_order_id),
                        side: Some(side),
                        kind: OrderEventKind::Reject { reason: "e0102" },
                        leaves_qty: 0.0,
                        filled_qty: 0.0,
                    });
                    return;
                }
                let price = px.unwrap();
                let fill_qty = order.size.min(displayed);
                self.emit_next_tick(OrderEvent {
                    client_id,
                    ext_order_id: Some(ext_order_id),
                    side: Some(side),
                    kind: OrderEventKind::Fill {
                        qty: fill_qty,
                        price,
                    },
                    leaves_qty: order.size - fill_qty,
                    filled_qty: fill_qty,
                });
            }
            OrdType::Limit => {
                let price = order.price.expect("limit order without a price");
                let book = self
                    .books
                    .get_mut(&order.instrument)
                    .expect("checked above");
                let marketable = match side {
                    Side::Buy => book.buy_is_marketable(price),
                    Side::Sell => book.sell_is_marketable(price),
                };
                let displayed = match side {
                    Side::Buy => book.displayed_ask_qty(),
                    Side::Sell => book.displayed_bid_qty(),
                };
                let fill_qty = if marketable { order.size.min(displayed.max(0.0)) } else { 0.0 };
                let leaves = order.size - fill_qty;

                if fill_qty > 0.0 {
                    self.emit_next_tick(OrderEvent {
                        client_id,
                        ext_order_id: Some(ext_order_id),
                        side: Some(side),
                        kind: OrderEventKind::Fill {
                            qty: fill_qty,
                            price,
                        },
                        leaves_qty: leaves,
                        filled_qty: fill_qty,
                    });
                }
                if leaves > 0.0 {
                    let book = self
                        .books
                        .get_mut(&order.instrument)
                        .expect("checked above");
                    book.rest(SimLimitOrder {
                        ext_order_id,
                        client_id,
                        side,
                        price,
                        original_qty: order.size,
                        leaves_qty: leaves,
                    });
                    self.order_instrument
                        .insert(ext_order_id, order.instrument.clone());
                }
            }
        }
    }

    fn cancel_order(&mut self, ext_order_id: u64) {
        let reject = |this: &mut Self| {
            this.emit(OrderEvent {
                client_id: 0,
                ext_order_id: Some(ext_order_id),
                side: None,
                kind: OrderEventKind::CancelReject { reason: "e0103" },
                leaves_qty: 0.0,
                filled_qty: 0.0,
            });
        };

        let Some(instrument) = self.order_instrument.get(&ext_order_id).cloned() else {
            reject(self);
            return;
        };
        let Some(book) = self.books.get_mut(&instrument) else {
            reject(self);
            return;
        };
        match book.remove(ext_order_id) {
            Some(removed) => {
                self.order_instrument.remove(&ext_order_id);
                self.emit(OrderEvent {
                    client_id: removed.client_id,
                    ext_order_id: Some(ext_order_id),
                    side: Some(removed.side),
                    kind: OrderEventKind::Cancelled,
                    leaves_qty: 0.0,
                    filled_qty: removed.original_qty - removed.leaves_qty,
                });
            }
            None => reject(self),
        }
    }

    fn is_up(&self) -> bool {
        true
    }
}
