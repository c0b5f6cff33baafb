//! Exclusive, append-only writer for a single bucket file.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};

use crate::{
    error::Result,
    tick::codec::{self, StreamInfo, TickEvent},
    types::Time,
};

enum Sink {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gz(w) => w.flush(),
        }
    }
}

/// Appends records to a newly created bucket file. Records must be appended
/// in non-decreasing exchange-timestamp order; violating this is an
/// invariant failure, not a recoverable error, because it would silently
/// corrupt the monotonic-clock guarantee every downstream reader relies on.
pub struct TickFileWriter {
    path: PathBuf,
    sink: Sink,
    last_exch_ts_us: Option<Time>,
}

impl TickFileWriter {
    /// Creates `path` exclusively (fails if it already exists) and writes the
    /// header immediately.
    pub fn create(
        path: impl AsRef<Path>,
        stream_info: &StreamInfo,
        metadata: &serde_json::Value,
        gzip: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let buffered = BufWriter::new(file);

        let mut sink = if gzip {
            Sink::Gz(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        };
        codec::write_header(&mut sink, stream_info, metadata)?;

        Ok(Self {
            path,
            sink,
            last_exch_ts_us: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. Panics if `ev.exch_ts_us` regresses relative to the
    /// last appended record: a monotonic-clock invariant violation.
    pub fn append(&mut self, ev: &TickEvent) -> Result<()> {
        if let Some(last) = self.last_exch_ts_us {
            assert!(
                ev.exch_ts_us >= last,
                "tick file writer invariant violated: exch_ts_us went backwards ({} -> {}) in {}",
                last,
                ev.exch_ts_us,
                self.path.display()
            );
        }
        self.last_exch_ts_us = Some(ev.exch_ts_us);
        codec::write_record(&mut self.sink, ev)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

impl Drop for TickFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush tick file writer on drop");
        }
    }
}
