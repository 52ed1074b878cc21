//! Append-only CSV log of chat turns.
//!
//! The log is a plain record for later reading, not a store: rows are only
//! ever appended, and the file is opened and closed for every append.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::observability::{LOG_ERRORS, LOG_WRITES};

/// Column names, in file order.
pub const HEADER: [&str; 4] = ["timestamp", "user_message", "model_response", "feedback"];

/// Default log file name.
pub const DEFAULT_LOG_PATH: &str = "chat_log.csv";

/// One user/model exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// When the exchange completed.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
    /// What the user asked.
    pub user_message: String,
    /// What the model answered.
    pub model_response: String,
    /// Optional free-form feedback on the answer.
    pub feedback: Option<String>,
}

impl ChatTurn {
    /// Creates a turn stamped at `timestamp` without feedback.
    pub fn new(
        timestamp: OffsetDateTime,
        user_message: impl Into<String>,
        model_response: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            user_message: user_message.into(),
            model_response: model_response.into(),
            feedback: None,
        }
    }

    /// Returns a copy of this turn carrying `feedback`.
    pub fn with_feedback(&self, feedback: impl Into<String>) -> Self {
        Self {
            feedback: Some(feedback.into()),
            ..self.clone()
        }
    }
}

/// Appends [`ChatTurn`]s to a CSV file.
#[derive(Clone, Debug)]
pub struct SessionLogger {
    path: PathBuf,
}

impl SessionLogger {
    /// Creates a logger writing to `path`. Nothing is touched until the
    /// first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `turn` as one row, writing the header first if the file is
    /// new or empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogWrite`] if the file cannot be opened or written.
    pub fn append(&self, turn: &ChatTurn) -> Result<()> {
        LOG_WRITES.click();
        let result = self.write_row(turn);
        match &result {
            Ok(()) => debug!(path = %self.path.display(), "appended chat turn"),
            Err(_) => LOG_ERRORS.click(),
        }
        result
    }

    fn write_row(&self, turn: &ChatTurn) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.error("cannot open log file", e))?;
        let needs_header = file
            .metadata()
            .map_err(|e| self.error("cannot inspect log file", e))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        let written = write_records(&mut writer, needs_header, turn);
        // Flush even when the write failed; the first error is reported.
        let flushed = writer.flush().map_err(csv::Error::from);
        written
            .and(flushed)
            .map_err(|e| self.error("cannot append to log file", e))
    }

    /// Read every row of the log.
    ///
    /// A missing file reads as an empty log.
    pub fn read_turns(&self) -> Result<Vec<ChatTurn>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| self.error("cannot open log file", e))?;
        reader
            .deserialize()
            .collect::<std::result::Result<Vec<ChatTurn>, _>>()
            .map_err(|e| {
                Error::serialization(
                    format!("malformed row in {}: {e}", self.path.display()),
                    Some(Box::new(e)),
                )
            })
    }

    fn error(
        &self,
        message: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        Error::log_write(
            format!("{message}: {source}"),
            Some(&self.path),
            Some(Box::new(source)),
        )
    }
}

fn write_records<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    needs_header: bool,
    turn: &ChatTurn,
) -> std::result::Result<(), csv::Error> {
    if needs_header {
        writer.write_record(HEADER)?;
    }
    writer.serialize(turn)
}
