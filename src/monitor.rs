//! Monitoring session: follows one submitted batch until it reaches a
//! terminal state.
//!
//! Each iteration sleeps, fetches the batch status, reports a state change,
//! drains new log rows and checks for a terminal state. Status failures are
//! tolerated up to [`MAX_CONSECUTIVE_ERRORS`] in a row; log failures never
//! stop the session.

use crate::batch::{BatchHandle, BatchState};
use crate::client::JobClient;
use crate::error::{ClientError, MonitorError};
use crate::log_tailer::{LogCursor, LogTailer};
use crate::sink::OutputSink;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Time between two status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive status failures after which the session gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Command sent to a running session.
#[derive(Debug)]
pub enum MonitorCommand {
    /// Stop immediately (operator interrupt).
    Stop,
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum Poll {
    Pending,
    Terminal(BatchHandle),
}

/// State of one monitoring session. Owns the log cursor and the counters.
pub struct MonitorSession<'a, C: JobClient + ?Sized, S: OutputSink + ?Sized> {
    client: &'a C,
    sink: &'a mut S,
    batch_id: String,
    last_state: Option<BatchState>,
    tailer: LogTailer,
    consecutive_errors: u32,
    log_failure_streak: bool,
    poll_interval: Duration,
    command_rx: Receiver<MonitorCommand>,
}

impl<'a, C: JobClient + ?Sized, S: OutputSink + ?Sized> MonitorSession<'a, C, S> {
    /// Start following `submitted`, the handle returned by the submission.
    pub fn new(
        client: &'a C,
        sink: &'a mut S,
        submitted: &BatchHandle,
        command_rx: Receiver<MonitorCommand>,
    ) -> Self {
        Self {
            client,
            sink,
            batch_id: submitted.id.clone(),
            last_state: submitted.state(),
            tailer: LogTailer::new(submitted.id.clone()),
            consecutive_errors: 0,
            log_failure_streak: false,
            poll_interval: POLL_INTERVAL,
            command_rx,
        }
    }

    #[allow(dead_code)]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[allow(dead_code)]
    pub fn with_log_page_size(mut self, page_size: usize) -> Self {
        self.tailer = LogTailer::with_page_size(self.batch_id.clone(), page_size);
        self
    }

    #[allow(dead_code)]
    pub fn cursor(&self) -> LogCursor {
        self.tailer.cursor()
    }

    #[allow(dead_code)]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Poll until the batch reaches a terminal state.
    ///
    /// Returns the final snapshot, or why the session was abandoned.
    pub fn run(&mut self) -> Result<BatchHandle, MonitorError> {
        loop {
            self.wait()?;
            if let Poll::Terminal(handle) = self.poll_once()? {
                return Ok(handle);
            }
        }
    }

    /// Sleep one poll interval. The only place an interrupt is observed.
    fn wait(&self) -> Result<(), MonitorError> {
        match self.command_rx.recv_timeout(self.poll_interval) {
            Ok(MonitorCommand::Stop) => Err(MonitorError::Interrupted),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(self.poll_interval);
                Ok(())
            }
        }
    }

    /// One iteration without the sleep: status, logs, terminal check.
    pub fn poll_once(&mut self) -> Result<Poll, MonitorError> {
        let handle = match self.client.get_status(&self.batch_id) {
            Ok(handle) => handle,
            Err(e) => {
                self.record_status_failure(e)?;
                return Ok(Poll::Pending);
            }
        };
        self.consecutive_errors = 0;

        self.observe_state(&handle);
        self.drain_logs();

        if handle.is_finished() {
            // Rows written between the drain and the terminal state.
            if let Err(e) = self.tailer.fetch_once(self.client, &mut *self.sink) {
                tracing::debug!(batch_id = %self.batch_id, error = %e, "final log fetch failed");
            }
            tracing::debug!(batch_id = %self.batch_id, state = ?handle.state, "batch finished");
            return Ok(Poll::Terminal(handle));
        }
        Ok(Poll::Pending)
    }

    fn observe_state(&mut self, handle: &BatchHandle) {
        let Some(state) = handle.state() else {
            return;
        };
        if self.last_state.as_ref() == Some(&state) {
            return;
        }
        let from = self
            .last_state
            .as_ref()
            .map(BatchState::as_str)
            .unwrap_or("UNKNOWN");
        self.sink.transition(from, state.as_str());
        self.last_state = Some(state);
    }

    fn drain_logs(&mut self) {
        let result = self.tailer.drain(self.client, &mut *self.sink);
        match result.error {
            Some(e) => {
                if !self.log_failure_streak {
                    self.sink
                        .warn(&format!("Could not fetch logs: {}", e));
                }
                tracing::debug!(
                    batch_id = %self.batch_id,
                    offset = self.tailer.cursor().offset(),
                    error = %e,
                    "log fetch failed"
                );
                self.log_failure_streak = true;
            }
            None => {
                self.log_failure_streak = false;
            }
        }
    }

    fn record_status_failure(&mut self, error: ClientError) -> Result<(), MonitorError> {
        self.consecutive_errors += 1;
        tracing::debug!(
            batch_id = %self.batch_id,
            consecutive_errors = self.consecutive_errors,
            error = %error,
            "status fetch failed"
        );
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            return Err(MonitorError::TooManyErrors {
                attempts: self.consecutive_errors,
                last: error,
            });
        }
        if self.consecutive_errors == 1 {
            self.sink.warn(&format!(
                "Error fetching status: {}\nRetrying... (will exit after {} consecutive errors)",
                error, MAX_CONSECUTIVE_ERRORS
            ));
        }
        Ok(())
    }
}
