//! Ordered statement batches
//!
//! A batch collects SQL texts, freezes them on [`Batch::execute`], then runs
//! them one at a time. Statement *i+1* is sent only after the stream of
//! statement *i* has been consumed (or dropped); the first failure stops the
//! batch.

use crate::connection::{Connection, ConnectionState};
use crate::stream::ResultStream;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::Instrument;

/// Two-operation batch capability
pub trait Batch {
    /// Execution handle produced by [`execute`](Batch::execute)
    type Execution<'e>
    where
        Self: 'e;

    /// Append a statement; fails with [`Error::State`] once execution started
    fn add(&mut self, sql: impl Into<String>) -> Result<&mut Self>;

    /// Freeze the statements and start executing them in order
    fn execute(&mut self) -> Result<Self::Execution<'_>>;
}

/// Batch of plain SQL texts bound to one session
#[derive(Debug)]
pub struct TextBatch<'c> {
    conn: &'c mut Connection,
    pending: Vec<String>,
    frozen: Option<Arc<[String]>>,
}

impl<'c> TextBatch<'c> {
    pub(crate) fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            pending: Vec::new(),
            frozen: None,
        }
    }

    /// Number of statements added
    pub fn len(&self) -> usize {
        self.frozen
            .as_ref()
            .map_or(self.pending.len(), |frozen| frozen.len())
    }

    /// Whether no statement was added
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether execution has started
    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }
}

impl<'c> Batch for TextBatch<'c> {
    type Execution<'e> = BatchExecution<'e> where Self: 'e;

    fn add(&mut self, sql: impl Into<String>) -> Result<&mut Self> {
        if self.frozen.is_some() {
            return Err(Error::State(
                "cannot add statements after batch execution has started".into(),
            ));
        }
        self.pending.push(sql.into());
        Ok(self)
    }

    fn execute(&mut self) -> Result<BatchExecution<'_>> {
        if self.frozen.is_some() {
            return Err(Error::State("batch has already been executed".into()));
        }
        let statements: Arc<[String]> = std::mem::take(&mut self.pending).into();
        self.frozen = Some(Arc::clone(&statements));
        tracing::debug!(statements = statements.len(), "batch frozen");
        Ok(BatchExecution {
            conn: &mut *self.conn,
            statements,
            next: 0,
            finished: false,
        })
    }
}

/// In-flight batch: yields one [`ResultStream`] per statement, in order
#[derive(Debug)]
pub struct BatchExecution<'c> {
    conn: &'c mut Connection,
    statements: Arc<[String]>,
    next: usize,
    finished: bool,
}

impl<'c> BatchExecution<'c> {
    /// Frozen statements
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Statements sent so far
    pub fn sent(&self) -> usize {
        self.next
    }

    /// Send the next statement and return its stream
    ///
    /// Returns `None` when every statement has run, or after a failure has
    /// been reported. A session closed by an abandoned stream yields
    /// `Error::ConnectionClosed` once.
    pub async fn next_result(&mut self) -> Option<Result<ResultStream<'_>>> {
        if self.finished {
            return None;
        }
        match self.conn.state() {
            ConnectionState::Ready => {}
            ConnectionState::Closed => {
                self.finished = true;
                return Some(Err(Error::ConnectionClosed));
            }
            state => {
                // the failing stream already surfaced its error
                tracing::debug!(%state, remaining = self.statements.len() - self.next, "batch aborted");
                self.finished = true;
                return None;
            }
        }
        let index = self.next;
        let sql = match self.statements.get(index) {
            Some(sql) => sql.clone(),
            None => {
                self.finished = true;
                return None;
            }
        };
        self.next += 1;

        let result = self
            .conn
            .execute(&sql)
            .instrument(tracing::debug_span!(
                "batch",
                statements = self.statements.len(),
                index
            ))
            .await;
        if let Err(e) = &result {
            tracing::debug!(index, error = %e, "batch statement failed, skipping the rest");
            self.finished = true;
        }
        Some(result)
    }

    /// Run every statement, draining each stream, and return affected row counts
    pub async fn run_to_end(mut self) -> Result<Vec<u64>> {
        let mut affected = Vec::with_capacity(self.statements.len());
        while let Some(result) = self.next_result().await {
            let mut stream = result?;
            while stream.next_row().await?.is_some() {}
            affected.push(stream.affected_rows());
        }
        Ok(affected)
    }
}
