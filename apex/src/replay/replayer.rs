//! One replayer per `(Instrument, MdStream)` pair. Lazily concatenates the
//! bucket files covering `[from, upto]` in ascending date order.

use std::{collections::VecDeque, path::PathBuf};

use chrono::{Duration, NaiveDate};

use crate::{
    error::Result,
    tick::{reader::TickFileReader, MdStream, TickEvent, TickFileBucketId},
    types::{Instrument, Time},
};

/// Lazily opens bucket files for one `(Instrument, MdStream)` pair across a
/// date range and yields their concatenated event stream in order. Missing
/// dates are skipped with a single log line, not an error; a corrupt
/// trailing record ends the stream cleanly at the last valid record.
pub struct TickReplayer {
    instrument: Instrument,
    stream: MdStream,
    root: PathBuf,
    remaining_dates: VecDeque<NaiveDate>,
    current: Option<TickFileReader>,
    head: Option<TickEvent>,
    exhausted: bool,
}

impl TickReplayer {
    pub fn new(
        root: impl Into<PathBuf>,
        instrument: Instrument,
        stream: MdStream,
        from: NaiveDate,
        upto: NaiveDate,
    ) -> Self {
        let mut remaining_dates = VecDeque::new();
        let mut d = from;
        while d <= upto {
            remaining_dates.push_back(d);
            d += Duration::days(1);
        }
        Self {
            instrument,
            stream,
            root: root.into(),
            remaining_dates,
            current: None,
            head: None,
            exhausted: false,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn stream(&self) -> MdStream {
        self.stream
    }

    /// Timestamp of the head event, or `None` when exhausted.
    pub fn peek(&mut self) -> Option<Time> {
        self.fill_head();
        self.head.map(|ev| ev.exch_ts_us)
    }

    /// Consumes and returns the head event. Panics if called when
    /// [`Self::peek`] would have returned `None`; callers in the scheduler
    /// always peek before popping.
    pub fn pop(&mut self) -> TickEvent {
        self.fill_head();
        self.head.take().expect("pop() called on exhausted replayer")
    }

    fn fill_head(&mut self) {
        if self.head.is_some() || self.exhausted {
            return;
        }
        loop {
            if self.current.is_none() {
                match self.open_next_file() {
                    Some(reader) => self.current = Some(reader),
                    None => {
                        self.exhausted = true;
                        return;
                    }
                }
            }

            let reader = self.current.as_mut().unwrap();
            match reader.next() {
                Ok(Some(ev)) => {
                    self.head = Some(ev);
                    return;
                }
                Ok(None) => {
                    // Clean end of this bucket file; move to the next date.
                    self.current = None;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        instrument = %self.instrument,
                        stream = self.stream.as_str(),
                        error = %e,
                        "stopping stream cleanly at last valid record"
                    );
                    self.current = None;
                    self.remaining_dates.clear();
                    self.exhausted = true;
                    return;
                }
            }
        }
    }

    fn open_next_file(&mut self) -> Option<TickFileReader> {
        while let Some(date) = self.remaining_dates.pop_front() {
            let bucket = TickFileBucketId {
                instrument: self.instrument.clone(),
                stream: self.stream,
                date,
            };
            let plain = self.root.join(bucket.relative_path(false));
            let gz = self.root.join(bucket.relative_path(true));

            if plain.exists() {
                match TickFileReader::open(&plain) {
                    Ok(r) => return Some(r),
                    Err(e) => {
                        tracing::warn!(path = %plain.display(), error = %e, "failed to open bucket file");
                        continue;
                    }
                }
            } else if gz.exists() {
                match TickFileReader::open(&gz) {
                    Ok(r) => return Some(r),
                    Err(e) => {
                        tracing::warn!(path = %gz.display(), error = %e, "failed to open bucket file");
                        continue;
                    }
                }
            } else {
                tracing::debug!(
                    instrument = %self.instrument,
                    stream = self.stream.as_str(),
                    date = %date,
                    "no data for date, skipping"
                );
                continue;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        tick::{
            codec::{write_header, write_record, AggressorSide, StreamInfo, TickEventKind},
            MdStream,
        },
        types::{Asset, ExchangeId},
    };

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

    fn write_bucket(root: &std::path::Path, date: NaiveDate, ts_offset: i64) {
        let bucket = TickFileBucketId {
            instrument: instrument(),
            stream: MdStream::BookTicker,
            date,
        };
        let path = root.join(bucket.relative_path(false));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(&path).unwrap();
        write_header(
            &mut f,
            &StreamInfo {
                native_symbol: "BTCUSDT".to_string(),
                exchange: ExchangeId::Binance,
                stream: MdStream::BookTicker,
            },
            &serde_json::json!({}),
        )
        .unwrap();
        for i in 0..3 {
            write_record(
                &mut f,
                &TickEvent {
                    exch_ts_us: ts_offset + i,
                    recv_ts_us: ts_offset + i,
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

    #[test]
    fn concatenates_multiple_dates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        write_bucket(dir.path(), d1, 1000);
        write_bucket(dir.path(), d2, 2000);

        let mut replayer =
            TickReplayer::new(dir.path(), instrument(), MdStream::BookTicker, d1, d2);
        let mut timestamps = Vec::new();
        while let Some(ts) = replayer.peek() {
            timestamps.push(ts);
            replayer.pop();
        }
        assert_eq!(timestamps, vec![1000, 1001, 1002, 2000, 2001, 2002]);
    }

    #[test]
    fn missing_middle_date_is_skipped_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        write_bucket(dir.path(), d1, 1000);
        write_bucket(dir.path(), d3, 3000);

        let mut replayer =
            TickReplayer::new(dir.path(), instrument(), MdStream::BookTicker, d1, d3);
        let mut count = 0;
        while replayer.peek().is_some() {
            replayer.pop();
            count += 1;
        }
        assert_eq!(count, 6);
    }

    #[test]
    fn empty_date_range_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let upto = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut replayer =
            TickReplayer::new(dir.path(), instrument(), MdStream::BookTicker, from, upto);
        assert!(replayer.peek().is_none());
    }
}
