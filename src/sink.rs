//! Log sink: the process-wide destination for diagnostic text.
//!
//! The probes only ever need `record(message, destination)`. Two sinks ship
//! with the binary:
//! - TracingSink: forwards every line as a `tracing` event
//! - FileSink: appends PHP error_log formatted lines to a file

use anyhow::Context;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Prefix carried by every line the probes write themselves.
pub const TAG: &str = "[Error Log Test]";

/// Delivery channel hint (error_log message types 0 and 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    System,
    Sapi,
}

pub trait LogSink: Send + Sync {
    fn record(&self, message: &str, destination: Destination);
}

/// Write a tagged line to the default destination.
pub fn tagged(sink: &dyn LogSink, message: impl AsRef<str>) {
    sink.record(&format!("{} {}", TAG, message.as_ref()), Destination::System);
}

#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, message: &str, destination: Destination) {
        match destination {
            Destination::System => tracing::warn!(target: "error_log", "{}", message),
            Destination::Sapi => tracing::info!(target: "sapi", "{}", message),
        }
    }
}

/// Appends `[19-Oct-2026 06:34:00 UTC] message` lines to a file.
///
/// SAPI-bound lines never reach the file; they are handed to tracing, the
/// same way a server SAPI logger bypasses the configured error_log.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn record(&self, message: &str, destination: Destination) {
        if destination == Destination::Sapi {
            TracingSink.record(message, destination);
            return;
        }

        let stamp = Utc::now().format("%d-%b-%Y %H:%M:%S UTC");
        let line = format!("[{}] {}\n", stamp, message);

        // A poisoned lock only means another writer panicked mid-line.
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = file.write_all(line.as_bytes()) {
            tracing::error!(path = %self.path.display(), "error_log write failed: {}", err);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::{Destination, LogSink, TAG};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Entry {
        pub message: String,
        pub destination: Destination,
    }

    /// Sink that keeps every line in memory.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        entries: Mutex<Vec<Entry>>,
    }

    impl MemorySink {
        pub fn entries(&self) -> Vec<Entry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn messages(&self) -> Vec<String> {
            self.entries().into_iter().map(|e| e.message).collect()
        }

        /// Only the lines written by the probes themselves.
        pub fn tagged(&self) -> Vec<String> {
            self.messages()
                .into_iter()
                .filter(|m| m.starts_with(TAG))
                .collect()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.lock().unwrap().is_empty()
        }
    }

    impl LogSink for MemorySink {
        fn record(&self, message: &str, destination: Destination) {
            self.entries.lock().unwrap().push(Entry {
                message: message.to_string(),
                destination,
            });
        }
    }
}
