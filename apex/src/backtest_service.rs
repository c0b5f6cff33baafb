//! Composes the replayers, market data cache, simulated exchange, and
//! auditor into the single top-level `run()` loop. Owns the whole graph; no
//! back-pointers from children to parents, child constructors receive only
//! the small context values they need.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use chrono::NaiveDate;

use crate::{
    account::Position,
    audit::Auditor,
    error::Result,
    hostinfo::HostInfo,
    marketdata::MarketDataService,
    replay::{EventSink, ReplayScheduler, TickReplayer},
    sim::{OrderEvent, OrderEventKind, SimExchange},
    tick::{MdStream, TickEvent, TickEventKind},
    types::{Instrument, Time},
};

/// One `(instrument, stream)` source to replay, over `[from, upto]`.
pub struct ReplaySource {
    pub instrument: Instrument,
    pub stream: MdStream,
    pub from: NaiveDate,
    pub upto: NaiveDate,
}

/// Shared, process-wide context passed to constructors instead of letting
/// components hold back-pointers into the service that owns them.
#[derive(Clone)]
pub struct BacktestContext {
    pub host_info: HostInfo,
}

impl Default for BacktestContext {
    fn default() -> Self {
        Self {
            host_info: HostInfo::capture(),
        }
    }
}

/// Routes merged tick events to the market data cache and, for top-of-book
/// updates only, to the simulated exchange for matching. Trade ticks update
/// the cache but never drive fills.
struct Bridge {
    market_data: Rc<RefCell<MarketDataService>>,
    exchange: Rc<RefCell<SimExchange>>,
}

impl EventSink for Bridge {
    fn dispatch(&mut self, instrument: &Instrument, stream: MdStream, event: TickEvent, _now: Time) {
        self.market_data.borrow_mut().dispatch(instrument, stream, event);
        if let TickEventKind::TopOfBook {
            bid_px,
            bid_qty,
            ask_px,
            ask_qty,
        } = event.kind
        {
            self.exchange
                .borrow_mut()
                .notify_top_of_book(instrument, bid_px, bid_qty, ask_px, ask_qty);
        }
    }
}

/// Top-level composition: wires replayers to `MarketData` and `SimExchange`,
/// and writes every order event to the audit journal alongside a position
/// snapshot.
pub struct BacktestService {
    market_data: Rc<RefCell<MarketDataService>>,
    exchange: Rc<RefCell<SimExchange>>,
    scheduler: ReplayScheduler,
    position: Rc<RefCell<Position>>,
    auditor: Rc<RefCell<Option<Auditor>>>,
}

impl BacktestService {
    /// Every order event the simulated exchange emits is applied to
    /// `position` (on fills) and appended to the audit journal at `audit_path`
    /// (if given), stamped with the scheduler's virtual clock and tagged with
    /// `strategy_id`.
    pub fn new(
        sources: Vec<ReplaySource>,
        root: impl Into<std::path::PathBuf>,
        strategy_id: impl Into<String>,
        position: Position,
        audit_path: Option<impl AsRef<std::path::Path>>,
    ) -> Result<Self> {
        Self::new_with_context(
            sources,
            root,
            strategy_id,
            position,
            audit_path,
            BacktestContext::default(),
        )
    }

    /// Same as [`Self::new`], but takes an explicit [`BacktestContext`]
    /// instead of capturing one via [`BacktestContext::default`]; useful for
    /// tests that want a deterministic `host_info`.
    pub fn new_with_context(
        sources: Vec<ReplaySource>,
        root: impl Into<std::path::PathBuf>,
        strategy_id: impl Into<String>,
        position: Position,
        audit_path: Option<impl AsRef<std::path::Path>>,
        ctx: BacktestContext,
    ) -> Result<Self> {
        let root = root.into();
        let replayers: Vec<TickReplayer> = sources
            .into_iter()
            .map(|s| TickReplayer::new(&root, s.instrument, s.stream, s.from, s.upto))
            .collect();

        let scheduler = ReplayScheduler::new(replayers);
        let clock = scheduler.clock_handle();
        let market_data = Rc::new(RefCell::new(MarketDataService::new()));
        let position = Rc::new(RefCell::new(position));
        let auditor = match audit_path {
            Some(p) => Some(Auditor::create(p, &ctx.host_info)?),
            None => None,
        };
        let auditor = Rc::new(RefCell::new(auditor));
        let strategy_id = strategy_id.into();

        let listener_position = position.clone();
        let listener_auditor = auditor.clone();
        let listener_clock = clock.clone();

        let exchange = SimExchange::new(scheduler.event_loop().clone(), move |event: OrderEvent| {
            handle_order_event(&event, &strategy_id, &listener_clock, &listener_position, &listener_auditor);
        });
        let exchange = Rc::new(RefCell::new(exchange));

        Ok(Self {
            market_data,
            exchange,
            scheduler,
            position,
            auditor,
        })
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.market_data.borrow_mut().add_instrument(instrument.clone());
        self.exchange.borrow_mut().add_instrument(instrument);
    }

    pub fn market_data(&self) -> Rc<RefCell<MarketDataService>> {
        self.market_data.clone()
    }

    pub fn exchange(&self) -> Rc<RefCell<SimExchange>> {
        self.exchange.clone()
    }

    pub fn position(&self) -> Rc<RefCell<Position>> {
        self.position.clone()
    }

    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Drives the replay to completion, or until [`ReplayScheduler::stop`] is
    /// called from within a subscriber or order event callback.
    pub fn run(&mut self) -> Result<()> {
        let mut bridge = Bridge {
            market_data: self.market_data.clone(),
            exchange: self.exchange.clone(),
        };
        self.scheduler.run(&mut bridge);
        Ok(())
    }

    pub fn close_auditor(&mut self) -> Result<()> {
        if let Some(auditor) = self.auditor.borrow_mut().take() {
            auditor.close()?;
        }
        Ok(())
    }
}

/// Applies a fill to `position` and appends one transaction record for every
/// order event, with a fixed 1.0 fx rate (multi-currency translation is out
/// of scope here). `OrderEvent` carries no instrument, so the audit record's
/// market-data snapshot is left empty; integrations that need it can record
/// their own alongside a subscription registered via [`BacktestService::market_data`].
fn handle_order_event(
    event: &OrderEvent,
    strategy_id: &str,
    clock: &Rc<Cell<Time>>,
    position: &Rc<RefCell<Position>>,
    auditor: &Rc<RefCell<Option<Auditor>>>,
) {
    if let OrderEventKind::Fill { qty, .. } = event.kind {
        if let Some(side) = event.side {
            position.borrow_mut().apply_fill(side, qty);
        }
    }

    if let Some(auditor) = auditor.borrow_mut().as_mut() {
        if let Err(e) = auditor.add_transaction(clock.get(), strategy_id, event, &position.borrow(), None, 1.0) {
            tracing::warn!(error = %e, "failed to append audit transaction");
        }
    }
}
