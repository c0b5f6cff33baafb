//! Binary framing for tick records: the wire format written by
//! [`crate::tick::writer::TickFileWriter`] and read by
//! [`crate::tick::reader::TickFileReader`].
//!
//! Header (once at file start): magic `TKBN`, `u16` version, a [`StreamInfo`],
//! then a `u32`-length-prefixed JSON metadata blob (opaque to the reader).
//! Each record thereafter is:
//!
//! ```text
//!   u16  record_len    (bytes following this field)
//!   u8   record_type   (1 = TopOfBook, 2 = Trade)
//!   u64  exch_ts_us
//!   u64  recv_ts_us
//!   payload            (type-specific, little-endian)
//! ```
//!
//! All integers are little-endian; strings are `u16`-length-prefixed UTF-8.

use std::io::{self, Read, Write};

use serde_json::Value as JsonValue;

use crate::{
    error::{ApexError, Result},
    types::{ExchangeId, Time},
};

pub const MAGIC: &[u8; 4] = b"TKBN";
pub const VERSION: u16 = 1;

const RECORD_TYPE_TOP_OF_BOOK: u8 = 1;
const RECORD_TYPE_TRADE: u8 = 2;

/// `(Instrument, MdStream)` stream kind. Closed enumeration per the tick file
/// layout convention `EXCHANGE/SYMBOL/STREAM/YYYY-MM-DD.tkbn[.gz]`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum MdStream {
    AggTrades,
    BookTicker,
}

impl MdStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            MdStream::AggTrades => "aggTrades",
            MdStream::BookTicker => "bookTicker",
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            MdStream::AggTrades => 1,
            MdStream::BookTicker => 2,
        }
    }

    fn from_byte(b: u8, path: &str) -> Result<Self> {
        match b {
            1 => Ok(MdStream::AggTrades),
            2 => Ok(MdStream::BookTicker),
            other => Err(ApexError::BadHeader {
                path: path.to_string(),
                reason: format!("unknown stream kind byte {other}"),
            }),
        }
    }
}

/// File-header metadata identifying the `(Instrument, MdStream)` pair this
/// bucket file belongs to.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub native_symbol: String,
    pub exchange: ExchangeId,
    pub stream: MdStream,
}

/// Side of the trade initiator, matching [`crate::types::Side`] but decoded
/// from the wire byte so the codec module has no dependency cycle back onto
/// order types.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AggressorSide {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickEventKind {
    TopOfBook {
        bid_px: f64,
        bid_qty: f64,
        ask_px: f64,
        ask_qty: f64,
    },
    Trade {
        price: f64,
        qty: f64,
        aggressor_side: AggressorSide,
    },
}

/// A single decoded tick record. Exchange timestamp is authoritative for
/// ordering; receive timestamp is surfaced but never used for ordering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickEvent {
    pub exch_ts_us: Time,
    pub recv_ts_us: Time,
    pub kind: TickEventKind,
}

fn write_u16_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize);
    w.write_all(&(bytes.len() as u16).to_le_bytes())?;
    w.write_all(bytes)
}

fn read_u16_str<R: Read>(r: &mut R, path: &str) -> Result<String> {
    let mut len_buf = [0u8; 2];
    read_exact_or_corrupt(r, &mut len_buf, path)?;
    let len = u16::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    read_exact_or_corrupt(r, &mut buf, path)?;
    String::from_utf8(buf).map_err(|e| ApexError::BadHeader {
        path: path.to_string(),
        reason: format!("invalid utf8 in length-prefixed string: {e}"),
    })
}

fn read_exact_or_corrupt<R: Read>(r: &mut R, buf: &mut [u8], path: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ApexError::CorruptRecord {
                path: path.to_string(),
                reason: "short read: truncated record".to_string(),
            }
        } else {
            ApexError::Io(e)
        }
    })
}

/// Writes the fixed file header: magic, version, [`StreamInfo`], and a
/// `u32`-length-prefixed JSON metadata blob.
pub fn write_header<W: Write>(
    w: &mut W,
    info: &StreamInfo,
    meta: &JsonValue,
) -> Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    write_u16_str(w, &info.native_symbol)?;
    w.write_all(&[exchange_to_byte(info.exchange)])?;
    w.write_all(&[info.stream.to_byte()])?;
    let meta_bytes = serde_json::to_vec(meta)?;
    w.write_all(&(meta_bytes.len() as u32).to_le_bytes())?;
    w.write_all(&meta_bytes)?;
    Ok(())
}

/// Reads and validates the fixed file header, returning the stream info and
/// the opaque metadata blob.
pub fn read_header<R: Read>(r: &mut R, path: &str) -> Result<(StreamInfo, JsonValue)> {
    let mut magic = [0u8; 4];
    read_exact_or_corrupt(r, &mut magic, path)?;
    if &magic != MAGIC {
        return Err(ApexError::BadHeader {
            path: path.to_string(),
            reason: "bad magic".to_string(),
        });
    }
    let mut version_buf = [0u8; 2];
    read_exact_or_corrupt(r, &mut version_buf, path)?;
    let version = u16::from_le_bytes(version_buf);
    if version != VERSION {
        return Err(ApexError::UnsupportedVersion {
            path: path.to_string(),
            found: version,
            expected: VERSION,
        });
    }
    let native_symbol = read_u16_str(r, path)?;
    let mut exch_byte = [0u8; 1];
    read_exact_or_corrupt(r, &mut exch_byte, path)?;
    let exchange = byte_to_exchange(exch_byte[0], path)?;
    let mut stream_byte = [0u8; 1];
    read_exact_or_corrupt(r, &mut stream_byte, path)?;
    let stream = MdStream::from_byte(stream_byte[0], path)?;

    let mut meta_len_buf = [0u8; 4];
    read_exact_or_corrupt(r, &mut meta_len_buf, path)?;
    let meta_len = u32::from_le_bytes(meta_len_buf) as usize;
    let mut meta_buf = vec![0u8; meta_len];
    read_exact_or_corrupt(r, &mut meta_buf, path)?;
    let meta = serde_json::from_slice(&meta_buf)?;

    Ok((
        StreamInfo {
            native_symbol,
            exchange,
            stream,
        },
        meta,
    ))
}

fn exchange_to_byte(e: ExchangeId) -> u8 {
    match e {
        ExchangeId::None => 0,
        ExchangeId::Binance => 1,
        ExchangeId::BinanceUsdFut => 2,
        ExchangeId::BinanceCoinFut => 3,
    }
}

fn byte_to_exchange(b: u8, path: &str) -> Result<ExchangeId> {
    match b {
        0 => Ok(ExchangeId::None),
        1 => Ok(ExchangeId::Binance),
        2 => Ok(ExchangeId::BinanceUsdFut),
        3 => Ok(ExchangeId::BinanceCoinFut),
        other => Err(ApexError::BadHeader {
            path: path.to_string(),
            reason: format!("unknown exchange id byte {other}"),
        }),
    }
}

/// Encodes one record (length prefix + type + timestamps + payload).
pub fn write_record<W: Write>(w: &mut W, ev: &TickEvent) -> io::Result<()> {
    let mut payload = Vec::with_capacity(32);
    let record_type = match ev.kind {
        TickEventKind::TopOfBook {
            bid_px,
            bid_qty,
            ask_px,
            ask_qty,
        } => {
            payload.extend_from_slice(&bid_px.to_le_bytes());
            payload.extend_from_slice(&bid_qty.to_le_bytes());
            payload.extend_from_slice(&ask_px.to_le_bytes());
            payload.extend_from_slice(&ask_qty.to_le_bytes());
            RECORD_TYPE_TOP_OF_BOOK
        }
        TickEventKind::Trade {
            price,
            qty,
            aggressor_side,
        } => {
            payload.extend_from_slice(&price.to_le_bytes());
            payload.extend_from_slice(&qty.to_le_bytes());
            payload.push(match aggressor_side {
                AggressorSide::Buy => 1,
                AggressorSide::Sell => 2,
            });
            RECORD_TYPE_TRADE
        }
    };

    // record_len covers everything after the length prefix itself.
    let record_len = 1 + 8 + 8 + payload.len();
    w.write_all(&(record_len as u16).to_le_bytes())?;
    w.write_all(&[record_type])?;
    w.write_all(&ev.exch_ts_us.to_le_bytes())?;
    w.write_all(&ev.recv_ts_us.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

/// Reads the next record, or `Ok(None)` on clean EOF (zero bytes read before
/// the length prefix). A short read mid-record is a [`ApexError::CorruptRecord`].
pub fn read_record<R: Read>(r: &mut R, path: &str) -> Result<Option<TickEvent>> {
    let mut first_byte = [0u8; 1];
    let n = r.read(&mut first_byte).map_err(ApexError::Io)?;
    if n == 0 {
        // Clean EOF exactly at a record boundary.
        return Ok(None);
    }
    let mut rest_of_len = [0u8; 1];
    read_exact_or_corrupt(r, &mut rest_of_len, path)?;
    let len_buf = [first_byte[0], rest_of_len[0]];
    let record_len = u16::from_le_bytes(len_buf) as usize;
    let mut rest = vec![0u8; record_len];
    read_exact_or_corrupt(r, &mut rest, path)?;

    if rest.len() < 17 {
        return Err(ApexError::CorruptRecord {
            path: path.to_string(),
            reason: "record shorter than fixed header fields".to_string(),
        });
    }
    let record_type = rest[0];
    let exch_ts_us = i64::from_le_bytes(rest[1..9].try_into().unwrap());
    let recv_ts_us = i64::from_le_bytes(rest[9..17].try_into().unwrap());
    let payload = &rest[17..];

    let kind = match record_type {
        RECORD_TYPE_TOP_OF_BOOK => {
            if payload.len() != 32 {
                return Err(ApexError::CorruptRecord {
                    path: path.to_string(),
                    reason: "bad TopOfBook payload length".to_string(),
                });
            }
            TickEventKind::TopOfBook {
                bid_px: f64::from_le_bytes(payload[0..8].try_into().unwrap()),
                bid_qty: f64::from_le_bytes(payload[8..16].try_into().unwrap()),
                ask_px: f64::from_le_bytes(payload[16..24].try_into().unwrap()),
                ask_qty: f64::from_le_bytes(payload[24..32].try_into().unwrap()),
            }
        }
        RECORD_TYPE_TRADE => {
            if payload.len() != 17 {
                return Err(ApexError::CorruptRecord {
                    path: path.to_string(),
                    reason: "bad Trade payload length".to_string(),
                });
            }
            let aggressor_side = match payload[16] {
                1 => AggressorSide::Buy,
                2 => AggressorSide::Sell,
                other => {
                    return Err(ApexError::CorruptRecord {
                        path: path.to_string(),
                        reason: format!("unknown aggressor side byte {other}"),
                    });
                }
            };
            TickEventKind::Trade {
                price: f64::from_le_bytes(payload[0..8].try_into().unwrap()),
                qty: f64::from_le_bytes(payload[8..16].try_into().unwrap()),
                aggressor_side,
            }
        }
        other => {
            return Err(ApexError::CorruptRecord {
                path: path.to_string(),
                reason: format!("unknown record type {other}"),
            });
        }
    };

    Ok(Some(TickEvent {
        exch_ts_us,
        recv_ts_us,
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let info = StreamInfo {
            native_symbol: "BTCUSDT".to_string(),
            exchange: ExchangeId::Binance,
            stream: MdStream::BookTicker,
        };
        let meta = serde_json::json!({"source": "test"});
        let mut buf = Vec::new();
        write_header(&mut buf, &info, &meta).unwrap();

        let mut cursor = &buf[..];
        let (read_info, read_meta) = read_header(&mut cursor, "test.tkbn").unwrap();
        assert_eq!(read_info.native_symbol, "BTCUSDT");
        assert_eq!(read_info.exchange, ExchangeId::Binance);
        assert_eq!(read_info.stream, MdStream::BookTicker);
        assert_eq!(read_meta, meta);
    }

    #[test]
    fn record_round_trips_both_variants() {
        let events = vec![
            TickEvent {
                exch_ts_us: 1000,
                recv_ts_us: 1005,
                kind: TickEventKind::TopOfBook {
                    bid_px: 100.0,
                    bid_qty: 1.5,
                    ask_px: 100.1,
                    ask_qty: 2.5,
                },
            },
            TickEvent {
                exch_ts_us: 2000,
                recv_ts_us: 2003,
                kind: TickEventKind::Trade {
                    price: 100.05,
                    qty: 0.25,
                    aggressor_side: AggressorSide::Sell,
                },
            },
        ];

        let mut buf = Vec::new();
        for ev in &events {
            write_record(&mut buf, ev).unwrap();
        }

        let mut cursor = &buf[..];
        let mut decoded = Vec::new();
        while let Some(ev) = read_record(&mut cursor, "test.tkbn").unwrap() {
            decoded.push(ev);
        }
        assert_eq!(decoded, events);
    }

    #[test]
    fn truncated_trailing_record_is_corrupt() {
        let ev = TickEvent {
            exch_ts_us: 1,
            recv_ts_us: 1,
            kind: TickEventKind::Trade {
                price: 1.0,
                qty: 1.0,
                aggressor_side: AggressorSide::Buy,
            },
        };
        let mut buf = Vec::new();
        write_record(&mut buf, &ev).unwrap();
        buf.truncate(buf.len() - 5);

        let mut cursor = &buf[..];
        let err = read_record(&mut cursor, "test.tkbn").unwrap_err();
        assert!(matches!(err, ApexError::CorruptRecord { .. }));
    }

    #[test]
    fn clean_eof_yields_none() {
        let buf: Vec<u8> = Vec::new();
        let mut cursor = &buf[..];
        assert!(read_record(&mut cursor, "test.tkbn").unwrap().is_none());
    }
}
