//! Human-readable progress lines for the calling system

use std::fmt::Display;
use std::io::Write;
use std::sync::Mutex;

/// Destination of progress lines
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes one line per message to any writer (stdout in production)
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ProgressSink for WriterSink<W> {
    fn emit(&self, line: &str) {
        // Write errors are ignored
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

/// Keeps lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Tags every line with the run's correlation id
pub struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    correlation_id: &'a str,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a dyn ProgressSink, correlation_id: &'a str) -> Self {
        Self {
            sink,
            correlation_id,
        }
    }

    pub fn say(&self, message: impl Display) {
        self.sink
            .emit(&format!("[correlationId: {}] {}", self.correlation_id, message));
    }
}
