//! Append-only diagnostic log of encoded messages.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::wire::WireMessage;

/// Appends one line per message to a file.
///
/// The file is opened for each record and closed again, so external log
/// rotation needs no coordination. Write failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    /// Log to the given file, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message followed by a newline.
    pub fn record(&self, message: &WireMessage) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                let mut line = message.as_bytes().to_vec();
                line.push(b'\n');
                file.write_all(&line)
            });

        if let Err(err) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "can't write diagnostic log"
            );
        }
    }
}
