//! Per-statement result streams
//!
//! A [`ResultStream`] is lazy and single-pass: rows are read from the socket
//! only when asked for. It mutably borrows its [`Connection`], so the next
//! request cannot be issued until the stream has been consumed or dropped.
//!
//! Dropping a stream before it terminates abandons the statement mid-flight.
//! The protocol has no way to skip the remaining rows without reading them,
//! so the session is closed. Use [`ResultStream::discard`] to drain instead.

use crate::codec::Format;
use crate::connection::conn::{malformed, ResultHeader};
use crate::connection::Connection;
use crate::protocol::constants::{headers, status};
use crate::protocol::{
    decode_binary_row, decode_eof, decode_err, decode_ok, decode_text_row, is_end_of_rows,
};
use crate::row::{Column, Row};
use crate::Result;
use bytes::Bytes;
use futures::stream::Stream;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Another result header follows
    Header,
    /// Reading rows of the current result set
    Rows,
    /// Terminated (completed or failed)
    Done,
}

/// Results of one statement
pub struct ResultStream<'a> {
    conn: &'a mut Connection,
    format: Format,
    phase: Phase,
    columns: Arc<[Column]>,
    column_types: Vec<u8>,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    result_sets: usize,
    rows: u64,
    retire: Option<u32>,
    started: Instant,
}

impl std::fmt::Debug for ResultStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("format", &self.format)
            .field("phase", &self.phase)
            .field("columns", &self.columns.len())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl<'a> ResultStream<'a> {
    /// Wrap the first response of a command
    ///
    /// `retire` is a prepared statement to deallocate once the stream ends.
    pub(crate) async fn open(
        conn: &'a mut Connection,
        header: ResultHeader,
        format: Format,
        retire: Option<u32>,
        started: Instant,
    ) -> Result<ResultStream<'a>> {
        let mut stream = ResultStream {
            conn,
            format,
            phase: Phase::Header,
            columns: Arc::from(Vec::new()),
            column_types: Vec::new(),
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            result_sets: 0,
            rows: 0,
            retire,
            started,
        };
        stream.apply_header(header).await?;
        Ok(stream)
    }

    /// Columns of the current result set (empty for statements without rows)
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Sum of affected rows over all OK packets seen so far
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Last insert id reported by the server
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Warning count of the last OK/EOF packet
    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Rows returned so far
    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    /// Whether the stream has terminated
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Next row, or `None` once every result set has been read
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        let result = self.advance().await;
        if let Err(e) = &result {
            self.phase = Phase::Done;
            crate::metrics::counters::statement_failed(e.metric_label());
        }
        self.conn.settle(result)
    }

    async fn advance(&mut self) -> Result<Option<Row>> {
        loop {
            match self.phase {
                Phase::Done => return Ok(None),
                Phase::Header => {
                    let header = self.conn.read_result_header().await?;
                    self.apply_header(header).await?;
                }
                Phase::Rows => {
                    let packet = self.conn.receive_packet().await?;
                    let payload = packet.payload;
                    if payload.first() == Some(&headers::ERR) {
                        return Err(decode_err(&payload).map_err(malformed)?.into());
                    }
                    if is_end_of_rows(&payload, self.conn.capabilities()) {
                        let more = if self.conn.deprecate_eof() {
                            let ok = decode_ok(&payload, self.conn.capabilities())
                                .map_err(malformed)?;
                            self.warnings = ok.warnings;
                            ok.status_flags & status::SERVER_MORE_RESULTS_EXISTS != 0
                        } else {
                            let (warnings, flags) = decode_eof(&payload).map_err(malformed)?;
                            self.warnings = warnings;
                            flags & status::SERVER_MORE_RESULTS_EXISTS != 0
                        };
                        if more {
                            self.phase = Phase::Header;
                        } else {
                            self.finish().await?;
                        }
                        continue;
                    }
                    let row = self.decode_row(&payload)?;
                    self.rows += 1;
                    return Ok(Some(row));
                }
            }
        }
    }

    async fn apply_header(&mut self, header: ResultHeader) -> Result<()> {
        self.result_sets += 1;
        match header {
            ResultHeader::Rows(columns) => {
                self.column_types = columns.iter().map(|c| c.column_type()).collect();
                self.columns = columns;
                self.phase = Phase::Rows;
            }
            ResultHeader::Done(ok) => {
                self.affected_rows += ok.affected_rows;
                if ok.last_insert_id != 0 {
                    self.last_insert_id = ok.last_insert_id;
                }
                self.warnings = ok.warnings;
                if ok.status_flags & status::SERVER_MORE_RESULTS_EXISTS != 0 {
                    self.phase = Phase::Header;
                } else {
                    self.finish().await?;
                }
            }
        }
        Ok(())
    }

    fn decode_row(&self, payload: &Bytes) -> Result<Row> {
        let raw = match self.format {
            Format::Text => decode_text_row(payload, self.columns.len()),
            Format::Binary => decode_binary_row(payload, &self.column_types),
        }
        .map_err(malformed)?;
        let decoder = self.conn.decoder();
        let values = self
            .columns
            .iter()
            .zip(raw.iter())
            .map(|(column, value)| decoder.decode(column, value.as_deref(), self.format))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(self.columns.clone(), values))
    }

    async fn finish(&mut self) -> Result<()> {
        self.phase = Phase::Done;
        self.conn.finish_command()?;
        if let Some(statement_id) = self.retire.take() {
            self.conn.retire_statement(statement_id);
        }
        if let Err(e) = self.conn.flush_deallocations().await {
            tracing::debug!(error = %e, "session failed after statement completion");
        }
        self.conn.record_statement(self.format, self.rows, self.started);
        tracing::debug!(
            rows = self.rows,
            affected_rows = self.affected_rows,
            result_sets = self.result_sets,
            "statement complete"
        );
        Ok(())
    }

    /// Read and drop the remaining rows, keeping the session usable
    pub async fn discard(mut self) -> Result<u64> {
        let mut dropped = 0;
        while self.next_row().await?.is_some() {
            dropped += 1;
        }
        Ok(dropped)
    }

    /// Collect every remaining row
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Adapt into a [`futures::Stream`] of rows
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + 'a {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next_row().await {
                Ok(Some(row)) => Some((Ok(row), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

impl Drop for ResultStream<'_> {
    fn drop(&mut self) {
        if self.phase != Phase::Done {
            tracing::warn!(
                rows = self.rows,
                "result stream dropped before completion, closing session"
            );
            self.conn.abandon();
        }
    }
}
