// canconsole/src/diag.rs
//
// Implements fault reporting and the persistent diagnostic log.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Faults and the diagnostic log.
//!
//! Every failure the operator must hear about becomes a [`Fault`]. The
//! ingress bridge runs on its own thread and can't touch the display, so
//! it reports through an [`ErrorSink`]; the dispatch loop owns the other
//! end and renders, persists, and acts on each fault in one place.

use crate::Error;
use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender};
use std::{
    error::Error as StdError,
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// The time format used for fault lines.
pub const FAULT_TIME_FORMAT: &str = "%H:%M:%S";

/// How a fault affects the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Reported to the operator; the session keeps running.
    Warning,
    /// Reported to the operator, then the session shuts down.
    Fatal,
}

/// A timestamped failure.
#[derive(Debug)]
pub struct Fault {
    timestamp: DateTime<Local>,
    severity: Severity,
    error: Error,
}

impl Fault {
    /// Creates a fault stamped with the current local time.
    pub fn new(severity: Severity, error: impl Into<Error>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            error: error.into(),
        }
    }

    /// Creates a fault that ends the session.
    pub fn fatal(error: impl Into<Error>) -> Self {
        Self::new(Severity::Fatal, error)
    }

    /// Creates a fault that the session survives.
    pub fn warning(error: impl Into<Error>) -> Self {
        Self::new(Severity::Warning, error)
    }

    /// When the fault happened
    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    /// The severity
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether the session must shut down
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// The underlying error
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Consumes the fault, returning the error
    pub fn into_error(self) -> Error {
        self.error
    }

    /// The line shown to the operator and written to the diagnostic log.
    ///
    /// The error's source chain follows on the same line. A source whose
    /// text is already part of the message is left out.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} \tERROR: {}",
            self.timestamp.format(FAULT_TIME_FORMAT),
            self.error
        );
        let mut source = self.error.source();
        while let Some(err) = source {
            let msg = err.to_string();
            if !line.contains(&msg) {
                line.push_str(" \tcaused by: ");
                line.push_str(&msg);
            }
            source = err.source();
        }
        line
    }
}

// ===== ErrorSink =====

/// The sending half of the fault channel.
///
/// Cloneable, so any execution context can report into the one consumer.
#[derive(Debug, Clone)]
pub struct ErrorSink(Sender<Fault>);

impl ErrorSink {
    /// Hands a fault to the consumer.
    ///
    /// Returns `false` if the consumer is gone, in which case nobody is
    /// left to show the fault and the caller should just log it.
    pub fn report(&self, fault: Fault) -> bool {
        self.0.send(fault).is_ok()
    }
}

/// Creates a connected error sink and its receiving end.
pub fn fault_channel() -> (ErrorSink, Receiver<Fault>) {
    let (tx, rx) = channel::unbounded();
    (ErrorSink(tx), rx)
}

// ===== DiagnosticLog =====

/// An append-only log file for faults.
///
/// The file is opened for each entry, so it is created on the first fault
/// and nothing is held open while the console runs.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    /// Creates a log that appends to the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry.
    pub fn append(&self, text: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", text)
    }

    /// Appends a rendered fault.
    pub fn record(&self, fault: &Fault) -> io::Result<()> {
        self.append(&fault.render())
    }
}

/////////////////////////////////////////////////////////////////////////////
