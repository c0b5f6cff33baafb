//! Tick file format: binary framing and the streaming reader/writer for
//! bucketed day files.

pub mod codec;
pub mod reader;
pub mod writer;

pub use codec::{AggressorSide, MdStream, StreamInfo, TickEvent, TickEventKind};
pub use reader::TickFileReader;
pub use writer::TickFileWriter;

use chrono::NaiveDate;

use crate::types::{ExchangeId, Instrument};

/// `(Instrument, MdStream, date)`. One file per bucket; files within a stream
/// are strictly ordered by date, events within a file non-decreasing by
/// timestamp.
#[derive(Clone, Debug)]
pub struct TickFileBucketId {
    pub instrument: Instrument,
    pub stream: MdStream,
    pub date: NaiveDate,
}

impl TickFileBucketId {
    /// Relative path under the tick file root, per the layout convention
    /// `EXCHANGE/SYMBOL/STREAM/YYYY-MM-DD.tkbn[.gz]`.
    pub fn relative_path(&self, gzip: bool) -> std::path::PathBuf {
        let mut path = std::path::PathBuf::new();
        path.push(exchange_dir(self.instrument.exchange));
        path.push(&self.instrument.native_symbol);
        path.push(self.stream.as_str());
        let ext = if gzip { "tkbn.gz" } else { "tkbn" };
        path.push(format!("{}.{ext}", self.date.format("%Y-%m-%d")));
        path
    }
}

fn exchange_dir(exchange: ExchangeId) -> &'static str {
    exchange.as_str()
}
