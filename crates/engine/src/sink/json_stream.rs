//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Each row is serialized directly to the buffered writer without an
//! intermediate `String`.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_statistics(&summary)?;
//! sink.write_locks(&locks)?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::AuditEvent;
use interlock_provider::AuditSink;
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

use super::{AuditRow, LockRow, StatisticsRow};

/// Buffered NDJSON writer over any `Write`.
pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Create a sink wrapping any writer (file, Vec<u8>, etc.).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    pub fn write_statistics(&mut self, row: &StatisticsRow) -> io::Result<()> {
        self.write_row(row)
    }

    pub fn write_locks(&mut self, rows: &[LockRow]) -> io::Result<()> {
        rows.iter().try_for_each(|row| self.write_row(row))
    }

    pub fn write_audit(&mut self, row: &AuditRow) -> io::Result<()> {
        self.write_row(row)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn write_row<T: Serialize>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audit sink adapter
// ---------------------------------------------------------------------------

/// [`AuditSink`] that appends one [`AuditRow`] per event and flushes it.
pub struct NdjsonAuditSink<W: Write + Send> {
    inner: Mutex<JsonStreamSink<W>>,
}

impl<W: Write + Send> NdjsonAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(JsonStreamSink::new(writer)),
        }
    }

    pub fn rows_written(&self) -> usize {
        self.inner.lock().map(|s| s.rows_written()).unwrap_or(0)
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.inner
            .into_inner()
            .map_err(|_| io::Error::other("audit stream lock poisoned"))?
            .into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> AuditSink for NdjsonAuditSink<W> {
    async fn record(&self, event: &AuditEvent) -> InterlockResult<()> {
        let row = AuditRow::from_event(event, Utc::now());
        let mut sink = self
            .inner
            .lock()
            .map_err(|_| InterlockError::Audit("audit stream lock poisoned".into()))?;
        sink.write_audit(&row)
            .and_then(|_| sink.flush())
            .map_err(|e| InterlockError::Audit(format!("failed to write audit row: {e}")))
    }
}
