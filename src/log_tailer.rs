//! Log tailer for following a batch's remote log stream page by page.

use crate::client::JobClient;
use crate::error::ClientError;
use crate::sink::OutputSink;

/// Rows requested per log page.
pub const LOG_PAGE_SIZE: usize = 100;

/// Bookmark into the remote, append-only log stream.
///
/// Only moves forward, and only by the number of rows a successful fetch
/// returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    offset: u64,
}

impl LogCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn advance(&mut self, rows: usize) {
        self.offset += rows as u64;
    }
}

/// Result of draining the log backlog.
#[derive(Debug)]
pub struct DrainResult {
    /// Rows emitted during this drain.
    pub rows: usize,
    /// Number of page requests made.
    pub pages: usize,
    /// Set when a fetch failed; rows fetched before it were still emitted.
    pub error: Option<ClientError>,
}

/// Follows the log of one batch and writes new rows to a sink.
pub struct LogTailer {
    batch_id: String,
    cursor: LogCursor,
    page_size: usize,
}

impl LogTailer {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self::with_page_size(batch_id, LOG_PAGE_SIZE)
    }

    pub fn with_page_size(batch_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            cursor: LogCursor::default(),
            page_size: page_size.max(1),
        }
    }

    pub fn cursor(&self) -> LogCursor {
        self.cursor
    }

    /// Fetch exactly one page at the cursor, emit it and advance.
    ///
    /// Returns the number of rows emitted.
    pub fn fetch_once<C, S>(&mut self, client: &C, sink: &mut S) -> Result<usize, ClientError>
    where
        C: JobClient + ?Sized,
        S: OutputSink + ?Sized,
    {
        let rows = client.get_log_page(&self.batch_id, self.cursor.offset(), self.page_size)?;
        for row in &rows {
            sink.log_row(row);
        }
        self.cursor.advance(rows.len());
        tracing::trace!(
            batch_id = %self.batch_id,
            rows = rows.len(),
            offset = self.cursor.offset(),
            "fetched log page"
        );
        Ok(rows.len())
    }

    /// Fetch pages back to back while they come back full.
    ///
    /// Stops at the first short page or at the first error.
    pub fn drain<C, S>(&mut self, client: &C, sink: &mut S) -> DrainResult
    where
        C: JobClient + ?Sized,
        S: OutputSink + ?Sized,
    {
        let mut result = DrainResult {
            rows: 0,
            pages: 0,
            error: None,
        };
        loop {
            result.pages += 1;
            match self.fetch_once(client, sink) {
                Ok(n) => {
                    result.rows += n;
                    if n < self.page_size {
                        return result;
                    }
                }
                Err(e) => {
                    result.error = Some(e);
                    return result;
                }
            }
        }
    }
}
