//! Final report and exit status of a session.

use crate::batch::{history_server_url, BatchHandle, BatchState};
use crate::error::MonitorError;
use crate::sink::OutputSink;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Batch reached `FINISHED`.
    Success,
    /// Batch reached `ERROR` or `CANCELED`.
    JobFailed,
    /// Bad usage, rejected submission, failed `--status` / `--kill`.
    ClientFailure,
    /// Gave up after too many consecutive status failures.
    MonitorAborted,
    /// Operator interrupt.
    Interrupted,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::JobFailed => 1,
            ExitStatus::ClientFailure => 2,
            ExitStatus::MonitorAborted => 3,
            ExitStatus::Interrupted => 130,
        }
    }

    pub fn from_monitor_error(error: &MonitorError) -> Self {
        match error {
            MonitorError::TooManyErrors { .. } => ExitStatus::MonitorAborted,
            MonitorError::Interrupted => ExitStatus::Interrupted,
        }
    }
}

/// Summary of a batch that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalReport {
    pub state: BatchState,
    pub app_id: Option<String>,
    pub app_url: Option<String>,
    pub diagnostic: Option<String>,
}

impl TerminalReport {
    pub fn from_handle(handle: &BatchHandle, history_base: Option<&str>) -> Self {
        let state = handle
            .state()
            .unwrap_or_else(|| BatchState::InProgress("UNKNOWN".to_string()));
        Self {
            state,
            app_id: handle.app_id().map(str::to_string),
            app_url: history_server_url(history_base, handle.app_id()),
            diagnostic: handle.diagnostic().map(str::to_string),
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.state {
            BatchState::Finished => ExitStatus::Success,
            BatchState::Error | BatchState::Canceled => ExitStatus::JobFailed,
            // Only reachable if the session ended without a terminal state.
            BatchState::InProgress(_) => ExitStatus::ClientFailure,
        }
    }

    pub fn print<S: OutputSink + ?Sized>(&self, sink: &mut S) {
        sink.info("\n------------------------------------------");
        sink.info("Job finished!");
        sink.info(&format!("Final State: {}", self.state));
        if let Some(app_id) = &self.app_id {
            sink.info(&format!("Application ID: {}", app_id));
        }
        if let Some(app_url) = &self.app_url {
            sink.info(&format!("Application URL: {}", app_url));
        }
        if let Some(diagnostic) = &self.diagnostic {
            sink.info("\nDiagnostic Information:");
            sink.info(diagnostic);
        }
        match self.exit_status() {
            ExitStatus::Success => sink.info("\n✅ Job completed successfully!"),
            _ => sink.info("\n❌ Job failed or was canceled."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{handle, handle_with_app};
    use crate::sink::testing::{Event, RecordingSink};

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ExitStatus::Success,
            ExitStatus::JobFailed,
            ExitStatus::ClientFailure,
            ExitStatus::MonitorAborted,
            ExitStatus::Interrupted,
        ]
        .map(|s| s.code());
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(ExitStatus::Success.code(), 0);
    }

    #[test]
    fn test_terminal_state_exit_mapping() {
        assert_eq!(
            TerminalReport::from_handle(&handle("FINISHED"), None).exit_status(),
            ExitStatus::Success
        );
        assert_eq!(
            TerminalReport::from_handle(&handle("ERROR"), None).exit_status(),
            ExitStatus::JobFailed
        );
        assert_eq!(
            TerminalReport::from_handle(&handle("CANCELED"), None).exit_status(),
            ExitStatus::JobFailed
        );
    }

    #[test]
    fn test_monitor_error_exit_mapping() {
        assert_eq!(
            ExitStatus::from_monitor_error(&MonitorError::Interrupted),
            ExitStatus::Interrupted
        );
        let aborted = MonitorError::TooManyErrors {
            attempts: 5,
            last: crate::error::ClientError::StatusFetch(
                crate::error::RequestFailure::Transport("timed out".into()),
            ),
        };
        assert_eq!(ExitStatus::from_monitor_error(&aborted), ExitStatus::MonitorAborted);
    }

    #[test]
    fn test_app_url_comes_from_history_server_only() {
        let mut finished = handle_with_app("FINISHED", "app-42");
        finished.app_url = Some("http://driver-pod:4040".to_string());

        let report = TerminalReport::from_handle(&finished, Some("http://history:18080"));
        assert_eq!(
            report.app_url.as_deref(),
            Some("http://history:18080/history/app-42/1/")
        );

        let report = TerminalReport::from_handle(&finished, None);
        assert!(report.app_url.is_none());
    }

    #[test]
    fn test_print_includes_diagnostic() {
        let mut failed = handle_with_app("ERROR", "app-7");
        failed.app_diagnostic = Some("Driver OOMKilled".to_string());
        let report = TerminalReport::from_handle(&failed, None);

        let mut sink = RecordingSink::default();
        report.print(&mut sink);

        assert!(sink.events.contains(&Event::Info("Final State: ERROR".into())));
        assert!(sink.events.contains(&Event::Info("Application ID: app-7".into())));
        assert!(sink.events.contains(&Event::Info("Driver OOMKilled".into())));
        assert!(!sink
            .events
            .iter()
            .any(|e| matches!(e, Event::Info(line) if line.starts_with("Application URL"))));
    }
}
