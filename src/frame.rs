// canconsole/src/frame.rs
//
// Implements the CAN 2.0 data frame and the timestamped frame record.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! At the lowest level, [libc](https://crates.io/crates/libc) defines the
//! classic CAN frame as a struct that is binary compatible with the C
//! `can_frame` sent to and from the kernel. [`CanFrame`] wraps it and only
//! ever holds a data or remote frame with up to 8 bytes of payload.
//!
//! Once a frame is sent or received it is wrapped in a [`FrameRecord`]
//! which adds the direction and the capture time. Records are immutable.

use crate::{
    as_bytes,
    id::{id_from_canid_t, id_to_canid_t, id_to_raw, IdFlags},
    ConstructionError,
};
use chrono::{DateTime, Local};
use embedded_can::{Frame as EmbeddedFrame, Id};
use itertools::Itertools;
use libc::{can_frame, canid_t};
use std::{fmt, mem};

pub use libc::{CAN_MAX_DLEN, CAN_MTU};

/// Creates a default C `can_frame`.
/// This initializes the entire structure to zeros.
#[inline(always)]
pub fn can_frame_default() -> can_frame {
    unsafe { mem::zeroed() }
}

// ===== CanFrame =====

/// The classic CAN 2.0 frame with up to 8-bytes of data.
///
/// This is highly compatible with the `can_frame` from libc.
/// ([ref](https://docs.rs/libc/latest/libc/struct.can_frame.html))
#[derive(Clone, Copy)]
pub struct CanFrame(can_frame);

impl CanFrame {
    /// Initializes a CAN frame from raw parts.
    pub(crate) fn init(can_id: canid_t, data: &[u8]) -> Result<Self, ConstructionError> {
        match data.len() {
            n if n <= CAN_MAX_DLEN => {
                let mut frame = can_frame_default();
                frame.can_id = can_id;
                frame.can_dlc = n as u8;
                frame.data[..n].copy_from_slice(data);
                Ok(Self(frame))
            }
            _ => Err(ConstructionError::TooMuchData),
        }
    }

    /// Creates a data frame, reporting why it could not be built.
    pub fn try_new(id: impl Into<Id>, data: &[u8]) -> Result<Self, ConstructionError> {
        Self::init(id_to_canid_t(id), data)
    }

    /// Get the composite SocketCAN ID word, with EFF/RTR/ERR flags
    pub fn id_word(&self) -> canid_t {
        self.0.can_id
    }

    /// Returns the EFF/RTR/ERR flags from the ID word
    pub fn id_flags(&self) -> IdFlags {
        IdFlags::from_bits_truncate(self.id_word())
    }

    /// Return the actual raw CAN ID (without EFF/RTR/ERR flags)
    pub fn raw_id(&self) -> u32 {
        id_to_raw(&self.id())
    }

    /// The frame as the raw bytes of the C struct, for writing to a socket.
    pub fn as_bytes(&self) -> &[u8] {
        as_bytes(&self.0)
    }
}

impl EmbeddedFrame for CanFrame {
    /// Create a new CAN 2.0 data frame
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::try_new(id, data).ok()
    }

    /// Create a new remote transmission request frame.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        let mut frame = can_frame_default();
        frame.can_id = id_to_canid_t(id) | IdFlags::RTR.bits();
        frame.can_dlc = dlc as u8;
        Some(Self(frame))
    }

    /// Check if frame uses 29-bit extended ID format.
    fn is_extended(&self) -> bool {
        self.id_flags().contains(IdFlags::EFF)
    }

    /// Check if frame is a remote transmission request.
    fn is_remote_frame(&self) -> bool {
        self.id_flags().contains(IdFlags::RTR)
    }

    /// Return the frame identifier.
    fn id(&self) -> Id {
        id_from_canid_t(self.id_word()).0
    }

    /// Data length
    fn dlc(&self) -> usize {
        self.0.can_dlc as usize
    }

    /// A slice into the actual data. Empty for a remote frame.
    fn data(&self) -> &[u8] {
        if self.is_remote_frame() {
            &[]
        } else {
            &self.0.data[..self.dlc().min(CAN_MAX_DLEN)]
        }
    }
}

impl Default for CanFrame {
    /// The default frame has all fields and data set to zero, and all flags off.
    fn default() -> Self {
        Self(can_frame_default())
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id_word() == other.id_word() && self.dlc() == other.dlc() && self.data() == other.data()
    }
}

impl Eq for CanFrame {}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanFrame {{ ")?;
        fmt::UpperHex::fmt(self, f)?;
        write!(f, " }}")
    }
}

impl fmt::UpperHex for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:X}#", self.raw_id())?;
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(" "))
    }
}

impl TryFrom<can_frame> for CanFrame {
    type Error = ConstructionError;

    /// Try to create a `CanFrame` from a C `can_frame`
    ///
    /// This will succeed as long as the C frame is not marked as an error
    /// frame and reports a sane data length.
    fn try_from(frame: can_frame) -> Result<Self, Self::Error> {
        if frame.can_id & IdFlags::ERR.bits() != 0 {
            Err(ConstructionError::WrongFrameType)
        } else if frame.can_dlc as usize > CAN_MAX_DLEN {
            Err(ConstructionError::TooMuchData)
        } else {
            Ok(Self(frame))
        }
    }
}

impl AsRef<can_frame> for CanFrame {
    fn as_ref(&self) -> &can_frame {
        &self.0
    }
}

// ===== Direction =====

/// Which way a frame crossed the bus, as seen from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Written to the bus by the console
    Sent,
    /// Read from the bus
    Received,
}

impl Direction {
    /// The label shown in the display log.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Sent => "Gesendet  -->",
            Direction::Received => "Empfangen <--",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ===== FrameRecord =====

/// A frame together with its direction and the time it was captured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRecord {
    timestamp: DateTime<Local>,
    direction: Direction,
    frame: CanFrame,
}

impl FrameRecord {
    /// Creates a record stamped with the current local time.
    pub fn now(direction: Direction, frame: CanFrame) -> Self {
        Self::with_timestamp(Local::now(), direction, frame)
    }

    /// Creates a record with an explicit capture time.
    pub fn with_timestamp(timestamp: DateTime<Local>, direction: Direction, frame: CanFrame) -> Self {
        Self {
            timestamp,
            direction,
            frame,
        }
    }

    /// Creates a record for a frame just read from the bus.
    pub fn received(frame: CanFrame) -> Self {
        Self::now(Direction::Received, frame)
    }

    /// Creates a record for a frame just written to the bus.
    pub fn sent(frame: CanFrame) -> Self {
        Self::now(Direction::Sent, frame)
    }

    /// The capture time
    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    /// The direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The frame
    pub fn frame(&self) -> &CanFrame {
        &self.frame
    }

    /// The frame identifier
    pub fn id(&self) -> Id {
        self.frame.id()
    }

    /// The frame payload
    pub fn data(&self) -> &[u8] {
        self.frame.data()
    }
}

/////////////////////////////////////////////////////////////////////////////
