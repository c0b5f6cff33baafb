//! Shared contract between the live gateway router and [`super::exchange::SimExchange`].
//! Three operations, no deep hierarchy: a capability set, not a base class.

use crate::types::{Order, Side};

/// Terminal/interim outcomes a router emits for a routed order. One event per
/// call into the strategy's listener; an order reaches exactly one of
/// `Fill`/`Cancelled`/`CancelReject`/`Reject` as its last event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrderEventKind {
    Accepted,
    Fill { qty: f64, price: f64 },
    Cancelled,
    CancelReject { reason: &'static str },
    Reject { reason: &'static str },
}

#[derive(Clone, Copy, Debug)]
pub struct OrderEvent {
    pub client_id: u64,
    pub ext_order_id: Option<u64>,
    /// `None` only when the side cannot be recovered, e.g. a cancel reject
    /// for an `ext_order_id` the exchange never assigned.
    pub side: Option<Side>,
    pub kind: OrderEventKind,
    pub leaves_qty: f64,
    pub filled_qty: f64,
}

/// Implemented by both the live gateway session and [`super::exchange::SimExchange`].
/// Strategies depend only on this trait, never on which implementation backs it.
pub trait OrderRouter {
    /// Takes ownership of routing `order`; emits at least one terminal event for it.
    fn send_order(&mut self, order: Order);

    /// Idempotent on an unknown or already-terminal `ext_order_id`: emits a
    /// `CancelReject` rather than erroring.
    fn cancel_order(&mut self, ext_order_id: u64);

    fn is_up(&self) -> bool;
}
