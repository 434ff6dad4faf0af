//! Presentation sink: where operator-facing progress lines go.
//!
//! Each call writes and flushes complete lines, so a state change is always
//! visible before the log rows that follow it.

use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use std::io::{self, Write};

/// Receiver of everything the operator sees.
pub trait OutputSink {
    /// Plain progress line on stdout.
    fn info(&mut self, line: &str);

    /// A state change observed by the monitor.
    fn transition(&mut self, from: &str, to: &str);

    /// One row of the remote job's log.
    fn log_row(&mut self, row: &str);

    fn warn(&mut self, message: &str);

    fn error(&mut self, message: &str);
}

/// Writes to the process's stdout and stderr.
pub struct TerminalSink {
    color_out: bool,
    color_err: bool,
    logs_started: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            color_out: io::stdout().is_tty(),
            color_err: io::stderr().is_tty(),
            logs_started: false,
        }
    }

    fn out(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }

    fn err(&self, line: &str) {
        // Keep stdout ahead of stderr when both go to the same terminal.
        let _ = io::stdout().flush();
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.flush();
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for TerminalSink {
    fn info(&mut self, line: &str) {
        self.out(line);
    }

    fn transition(&mut self, from: &str, to: &str) {
        let line = format!("[Status] {} -> {}", from, to);
        if self.color_out {
            self.out(&format!("\n{}", line.cyan().bold()));
        } else {
            self.out(&format!("\n{}", line));
        }
    }

    fn log_row(&mut self, row: &str) {
        if !self.logs_started {
            self.logs_started = true;
            self.out("\n=== Job Logs ===");
        }
        self.out(row);
    }

    fn warn(&mut self, message: &str) {
        let line = format!("⚠️  Warning: {}", message);
        if self.color_err {
            self.err(&format!("\n{}", line.yellow()));
        } else {
            self.err(&format!("\n{}", line));
        }
    }

    fn error(&mut self, message: &str) {
        let line = format!("❌ Error: {}", message);
        if self.color_err {
            self.err(&format!("\n{}", line.red()));
        } else {
            self.err(&format!("\n{}", line));
        }
    }
}
