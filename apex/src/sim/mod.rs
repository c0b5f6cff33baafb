//! Simulated matching venue: order book, matching, and the `OrderRouter` contract.

pub mod book;
pub mod exchange;
pub mod router;

pub use book::{BookFill, SimLimitOrder, SimOrderBook};
pub use exchange::SimExchange;
pub use router::{OrderEvent, OrderEventKind, OrderRouter};
