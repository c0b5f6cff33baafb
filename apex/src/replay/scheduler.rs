//! Merges every [`TickReplayer`] into one virtual clock via a k-way merge
//! over their head timestamps.

use std::{cell::Cell, cmp::Reverse, collections::BinaryHeap, rc::Rc};

use crate::{
    eventloop::BacktestEventLoop,
    tick::MdStream,
    types::{Instrument, Time},
};

use super::replayer::TickReplayer;

/// Receives merged events in timestamp order. A single implementation
/// typically fans this out to a market data cache and then to the simulated
/// exchange, in that order, as the outer loop requires.
pub trait EventSink {
    fn dispatch(&mut self, instrument: &Instrument, stream: MdStream, event: crate::tick::TickEvent, now: Time);
}

struct HeapEntry {
    ts: Time,
    instrument: Instrument,
    stream: MdStream,
    index: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl HeapEntry {
    /// Timestamp first, then `(instrument, stream)` lexicographic tie-break.
    fn key(&self) -> (Time, &Instrument, MdStream) {
        (self.ts, &self.instrument, self.stream)
    }
}

/// Owns every [`TickReplayer`] plus the virtual clock and timer queue driving
/// them. Each iteration pops the globally-earliest event, advances the clock,
/// fires any due timers, and dispatches the event to the sink.
pub struct ReplayScheduler {
    replayers: Vec<TickReplayer>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    clock: Rc<Cell<Time>>,
    event_loop: BacktestEventLoop,
    stopped: bool,
}

impl ReplayScheduler {
    pub fn new(replayers: Vec<TickReplayer>) -> Self {
        let clock = Rc::new(Cell::new(0));
        let event_loop = BacktestEventLoop::new(clock.clone());
        let mut me = Self {
            replayers,
            heap: BinaryHeap::new(),
            clock,
            event_loop,
            stopped: false,
        };
        me.seed_heap();
        me
    }

    pub fn event_loop(&self) -> &BacktestEventLoop {
        &self.event_loop
    }

    pub fn now(&self) -> Time {
        self.clock.get()
    }

    /// Shared handle onto the virtual clock, for components that need to read
    /// "now" without holding a back-reference to the scheduler itself.
    pub fn clock_handle(&self) -> Rc<Cell<Time>> {
        self.clock.clone()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    fn seed_heap(&mut self) {
        for idx in 0..self.replayers.len() {
            self.push_if_live(idx);
        }
    }

    fn push_if_live(&mut self, index: usize) {
        let replayer = &mut self.replayers[index];
        if let Some(ts) = replayer.peek() {
            self.heap.push(Reverse(HeapEntry {
                ts,
                instrument: replayer.instrument().clone(),
                stream: replayer.stream(),
                index,
            }));
        }
    }

    /// Drives the merge to completion, calling `sink.dispatch` once per event
    /// in timestamp order (ties broken by instrument then stream), firing due
    /// timers and draining immediate dispatches between events. Stops early if
    /// [`Self::stop`] is called from within the sink.
    pub fn run(&mut self, sink: &mut dyn EventSink) {
        while !self.stopped {
            let Reverse(top) = match self.heap.pop() {
                Some(e) => e,
                None => break,
            };

            self.clock.set(top.ts);
            self.event_loop.fire_due(top.ts);
            self.event_loop.drain_immediate();

            let event = self.replayers[top.index].pop();
            sink.dispatch(&top.instrument, top.stream, event, top.ts);

            self.push_if_live(top.index);
        }

        // The loop above only drains between events; anything enqueued while
        // dispatching the final event (e.g. an order placed in response to
        // the last tick) would otherwise never be delivered.
        self.event_loop.fire_due(self.clock.get());
        self.event_loop.drain_immediate();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        tick::{
            codec::{write_header, write_record, AggressorSide, StreamInfo, TickEventKind},
            MdStream, TickEvent, TickFileBucketId,
        },
        types::{Asset, ExchangeId},
    };

    fn instrument(symbol: &str) -> Instrument {
        Instrument::new(
            ExchangeId::Binance,
            symbol,
            0.1,
            0.001,
            Asset::new("BTC"),
            Asset::new("USDT"),
        )
    }

    fn write_bucket(root: &std::path::Path, inst: &Instrument, stream: MdStream, ts: &[i64]) {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bucket = TickFileBucketId {
            instrument: inst.clone(),
            stream,
            date,
        };
        let path = root.join(bucket.relative_path(false));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = std::fs::File::create(&path).unwrap();
        write_header(
            &mut f,
            &StreamInfo {
                native_symbol: inst.native_symbol.clone(),
                exchange: inst.exchange,
                stream,
            },
            &serde_json::json!({}),
        )
        .unwrap();
        for &t in ts {
            write_record(
                &mut f,
                &TickEvent {
                    exch_ts_us: t,
                    recv_ts_us: t,
                    kind: TickEventKind::Trade {
                        price: 1.0,
                        qty: 1.0,
                        aggressor_side: AggressorSide::Buy,
                    },
                },
            )
            .unwrap();
        }
    }

    struct RecordingSink {
        order: Vec<(Time, String, MdStream)>,
    }

    impl EventSink for RecordingSink {
        fn dispatch(&mut self, instrument: &Instrument, stream: MdStream, _event: TickEvent, now: Time) {
            self.order.push((now, instrument.native_symbol.clone(), stream));
        }
    }

    #[test]
    fn merges_streams_in_timestamp_order() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let btc = instrument("BTCUSDT");
        let eth = instrument("ETHUSDT");
        write_bucket(dir.path(), &btc, MdStream::BookTicker, &[1000, 3000]);
        write_bucket(dir.path(), &eth, MdStream::BookTicker, &[2000, 4000]);

        let replayers = vec![
            TickReplayer::new(dir.path(), btc.clone(), MdStream::BookTicker, date, date),
            TickReplayer::new(dir.path(), eth.clone(), MdStream::BookTicker, date, date),
        ];
        let mut scheduler = ReplayScheduler::new(replayers);
        let mut sink = RecordingSink { order: Vec::new() };
        scheduler.run(&mut sink);

        assert_eq!(
            sink.order,
            vec![
                (1000, "BTCUSDT".to_string(), MdStream::BookTicker),
                (2000, "ETHUSDT".to_string(), MdStream::BookTicker),
                (3000, "BTCUSDT".to_string(), MdStream::BookTicker),
                (4000, "ETHUSDT".to_string(), MdStream::BookTicker),
            ]
        );
    }

    #[test]
    fn equal_timestamps_break_ties_by_instrument_then_stream() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let btc = instrument("BTCUSDT");
        let eth = instrument("ETHUSDT");
        write_bucket(dir.path(), &btc, MdStream::AggTrades, &[5000]);
        write_bucket(dir.path(), &btc, MdStream::BookTicker, &[5000]);
        write_bucket(dir.path(), &eth, MdStream::BookTicker, &[5000]);

        let replayers = vec![
            TickReplayer::new(dir.path(), eth.clone(), MdStream::BookTicker, date, date),
            TickReplayer::new(dir.path(), btc.clone(), MdStream::BookTicker, date, date),
            TickReplayer::new(dir.path(), btc.clone(), MdStream::AggTrades, date, date),
        ];
        let mut scheduler = ReplayScheduler::new(replayers);
        let mut sink = RecordingSink { order: Vec::new() };
        scheduler.run(&mut sink);

        // BTCUSDT < ETHUSDT lexicographically, and within BTCUSDT, AggTrades <
        // BookTicker per the enum's declaration order.
        assert_eq!(
            sink.order,
            vec![
                (5000, "BTCUSDT".to_string(), MdStream::AggTrades),
                (5000, "BTCUSDT".to_string(), MdStream::BookTicker),
                (5000, "ETHUSDT".to_string(), MdStream::BookTicker),
            ]
        );
    }

    #[test]
    fn timers_fire_before_the_event_at_their_deadline() {
        let dir = tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let btc = instrument("BTCUSDT");
        write_bucket(dir.path(), &btc, MdStream::BookTicker, &[1000]);

        let replayers = vec![TickReplayer::new(
            dir.path(),
            btc.clone(),
            MdStream::BookTicker,
            date,
            date,
        )];
        let mut scheduler = ReplayScheduler::new(replayers);
        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        scheduler
            .event_loop()
            .dispatch_after(1000, Box::new(move |_now| {
                fired2.set(true);
                0
            }));

        let mut sink = RecordingSink { order: Vec::new() };
        scheduler.run(&mut sink);
        assert!(fired.get());
        assert_eq!(sink.order.len(), 1);
    }
}
