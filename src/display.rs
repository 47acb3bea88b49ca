// canconsole/src/display.rs
//
// Implements the bounded display log and the rendering of traffic lines.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The display log.
//!
//! Traffic is rendered to one text line per frame:
//!
//! ```text
//! 14:03:07.412 	Empfangen <-- 	ID: 123 	Daten: 50 49 4E 47
//! ```
//!
//! The [`DisplayLog`] keeps the most recent lines up to a ceiling and
//! evicts the oldest first. Whatever presents the log to the operator
//! implements [`DisplaySink`] and is told about every appended line and
//! every heartbeat status update.

use crate::{
    frame::{Direction, FrameRecord},
    heartbeat::MonitorState,
    id::id_to_raw,
};
use std::{collections::VecDeque, fmt, str::FromStr};

/// The time format of traffic lines, local time with milliseconds.
pub const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// The line appended when the heartbeat is (still) missing.
pub const HEARTBEAT_LOST_LINE: &str = "Heartbeat unterbrochen!";

/// How received payloads are shown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadView {
    /// Space separated upper case hex bytes
    #[default]
    Hex,
    /// The payload decoded by the codec
    Text,
}

impl FromStr for PayloadView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(PayloadView::Hex),
            "text" => Ok(PayloadView::Text),
            _ => Err(format!("unknown payload view '{}'", s)),
        }
    }
}

impl fmt::Display for PayloadView {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PayloadView::Hex => f.write_str("hex"),
            PayloadView::Text => f.write_str("text"),
        }
    }
}

/// Renders one traffic line.
///
/// The payload is passed in already rendered, since that depends on the
/// direction and the configured view.
pub fn render_line(record: &FrameRecord, payload: &str) -> String {
    format!(
        "{} \t{} \tID: {:03} \tDaten: {}",
        record.timestamp().format(TIME_FORMAT),
        record.direction().label(),
        id_to_raw(&record.id()),
        payload
    )
}

/// Whether a direction renders its payload as text no matter the view.
pub(crate) fn always_text(direction: Direction) -> bool {
    direction == Direction::Sent
}

// ===== DisplaySink =====

/// A presenter for the display log.
///
/// Every method has an empty default, so a sink only implements what it
/// shows.
pub trait DisplaySink {
    /// A line was appended to the display log.
    fn line(&mut self, _line: &str) {}

    /// The heartbeat monitor ticked.
    fn status(&mut self, _state: MonitorState) {}

    /// A message for the operator that isn't part of the log, such as
    /// rejected input.
    fn notice(&mut self, _text: &str) {}
}

impl DisplaySink for () {}

impl<S: DisplaySink + ?Sized> DisplaySink for &mut S {
    fn line(&mut self, line: &str) {
        (**self).line(line)
    }

    fn status(&mut self, state: MonitorState) {
        (**self).status(state)
    }

    fn notice(&mut self, text: &str) {
        (**self).notice(text)
    }
}

// ===== DisplayLog =====

/// The most recent display lines, oldest first.
#[derive(Debug, Clone)]
pub struct DisplayLog {
    lines: VecDeque<String>,
    ceiling: usize,
}

impl DisplayLog {
    /// Creates an empty log holding at most `ceiling` lines (at least one).
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            lines: VecDeque::with_capacity(ceiling),
            ceiling,
        }
    }

    /// Appends a line, returning the oldest line if it had to be evicted.
    pub fn push(&mut self, line: impl Into<String>) -> Option<String> {
        let evicted = if self.lines.len() >= self.ceiling {
            self.lines.pop_front()
        } else {
            None
        };
        self.lines.push_back(line.into());
        evicted
    }

    /// The lines, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The newest line
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    /// The number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The maximum number of lines
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/////////////////////////////////////////////////////////////////////////////
