//! Sequential streaming of a single bucket file. Lazy, single-pass,
//! non-restartable.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;

use crate::{
    error::Result,
    tick::codec::{self, StreamInfo, TickEvent},
};

/// Opens one bucket file and yields its decoded records in order.
///
/// Writes are not atomic across crash boundaries; recovery is by discarding
/// trailing truncated records on read: a [`crate::error::ApexError::CorruptRecord`]
/// surfaced from [`Self::next`] should be treated as "stop reading this file",
/// not as a fatal error.
pub struct TickFileReader {
    path: PathBuf,
    inner: Box<dyn Read>,
    pub stream_info: StreamInfo,
    pub metadata: serde_json::Value,
}

impl TickFileReader {
    /// Opens `path`, transparently gzip-decoding if it ends in `.gz`, and
    /// validates the magic/version header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();
        let file = File::open(&path)?;
        let buffered = BufReader::new(file);

        let mut inner: Box<dyn Read> = if path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false)
        {
            Box::new(GzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };

        let (stream_info, metadata) = codec::read_header(&mut inner, &path_str)?;

        Ok(Self {
            path,
            inner,
            stream_info,
            metadata,
        })
    }

    /// Returns the next decoded event, or `Ok(None)` on clean EOF.
    pub fn next(&mut self) -> Result<Option<TickEvent>> {
        let path_str = self.path.display().to_string();
        codec::read_record(&mut self.inner, &path_str)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;
    use crate::{
        tick::codec::{write_header, write_record, AggressorSide, MdStream, TickEventKind},
        types::ExchangeId,
    };

    fn sample_events() -> Vec<TickEvent> {
        vec![
            TickEvent {
                exch_ts_us: 1000,
                recv_ts_us: 1001,
                kind: TickEventKind::TopOfBook {
                    bid_px: 100.0,
                    bid_qty: 1.0,
                    ask_px: 101.0,
                    ask_qty: 1.0,
                },
            },
            TickEvent {
                exch_ts_us: 2000,
                recv_ts_us: 2001,
                kind: TickEventKind::Trade {
                    price: 100.5,
                    qty: 0.5,
                    aggressor_side: AggressorSide::Buy,
                },
            },
        ]
    }

    #[test]
    fn reads_back_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-01.tkbn");
        {
            let mut f = File::create(&path).unwrap();
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
            for ev in sample_events() {
                write_record(&mut f, &ev).unwrap();
            }
        }

        let mut reader = TickFileReader::open(&path).unwrap();
        assert_eq!(reader.stream_info.native_symbol, "BTCUSDT");
        let mut got = Vec::new();
        while let Some(ev) = reader.next().unwrap() {
            got.push(ev);
        }
        assert_eq!(got, sample_events());
    }

    #[test]
    fn reads_back_gzip_wrapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-01.tkbn.gz");
        {
            let f = File::create(&path).unwrap();
            let mut enc = GzEncoder::new(f, Compression::default());
            write_header(
                &mut enc,
                &StreamInfo {
                    native_symbol: "ETHUSDT".to_string(),
                    exchange: ExchangeId::Binance,
                    stream: MdStream::AggTrades,
                },
                &serde_json::json!({"collector": "test"}),
            )
            .unwrap();
            for ev in sample_events() {
                write_record(&mut enc, &ev).unwrap();
            }
            enc.finish().unwrap();
        }

        let mut reader = TickFileReader::open(&path).unwrap();
        assert_eq!(reader.stream_info.native_symbol, "ETHUSDT");
        let mut got = Vec::new();
        while let Some(ev) = reader.next().unwrap() {
            got.push(ev);
        }
        assert_eq!(got, sample_events());
    }
}
