// canconsole/src/heartbeat.rs
//
// Implements the device heartbeat monitor.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Heartbeat monitoring.
//!
//! The field device periodically sends one fixed frame, described by a
//! [`HeartbeatSpec`]. The monitor doesn't react to that frame directly.
//! The dispatch loop only marks it as *observed*, and the monitor samples
//! the mark on its own fixed tick:
//!
//! ```text
//! observed since last tick -> Alive (mark cleared)
//! nothing observed         -> Lost  (interrupted, on every such tick)
//! ```
//!
//! So bursts or jitter in the arrival of the heartbeat don't flap the
//! state, there is at most one transition per tick, and loss is detected
//! within one tick period.

use crate::{
    frame::{CanFrame, CAN_MAX_DLEN},
    id::id_from_raw,
    ConfigError, ConstructionError,
};
use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id};
use std::fmt;

/// The raw identifier of the device heartbeat (0x10102000, extended).
pub const HEARTBEAT_ID: u32 = 269_492_224;

/// The payload of the device heartbeat.
pub const HEARTBEAT_DATA: [u8; CAN_MAX_DLEN] = [0x04, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00];

const HEARTBEAT_EXT_ID: ExtendedId = match ExtendedId::new(HEARTBEAT_ID) {
    Some(id) => id,
    None => panic!("heartbeat ID out of range"),
};

// ===== HeartbeatSpec =====

/// The exact frame that signals the device is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatSpec {
    id: Id,
    data: [u8; CAN_MAX_DLEN],
}

impl HeartbeatSpec {
    /// Creates a heartbeat spec.
    pub fn new(id: impl Into<Id>, data: [u8; CAN_MAX_DLEN]) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Creates a heartbeat spec from a raw ID and a hex payload, like
    /// "04 02 00 00 00 00 01 00" or "0402000000000100".
    ///
    /// IDs above 0x7FF are taken as extended IDs.
    pub fn from_hex(id: u32, payload: &str) -> Result<Self, ConfigError> {
        let id = id_from_raw(id).ok_or(ConfigError::HeartbeatId {
            id,
            source: ConstructionError::IdTooLarge,
        })?;

        let digits: String = payload.split_whitespace().collect();
        let bytes = hex::decode(digits).map_err(|e| ConfigError::HeartbeatPayload(e.to_string()))?;
        let data = <[u8; CAN_MAX_DLEN]>::try_from(bytes.as_slice()).map_err(|_| {
            ConfigError::HeartbeatPayload(format!(
                "expected {} bytes, got {}",
                CAN_MAX_DLEN,
                bytes.len()
            ))
        })?;

        Ok(Self::new(id, data))
    }

    /// The heartbeat identifier
    pub fn id(&self) -> Id {
        self.id
    }

    /// The heartbeat payload
    pub fn data(&self) -> &[u8; CAN_MAX_DLEN] {
        &self.data
    }

    /// Whether the frame is the heartbeat: same identifier, same 8 bytes.
    pub fn matches(&self, frame: &CanFrame) -> bool {
        !frame.is_remote_frame() && frame.id() == self.id && frame.data() == self.data
    }
}

impl Default for HeartbeatSpec {
    fn default() -> Self {
        Self::new(HEARTBEAT_EXT_ID, HEARTBEAT_DATA)
    }
}

// ===== MonitorState =====

/// The liveness of the device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// A heartbeat was seen in the last monitor period.
    Alive,
    /// No heartbeat in the last monitor period, or none yet.
    #[default]
    Lost,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MonitorState::Alive => f.write_str("alive"),
            MonitorState::Lost => f.write_str("lost"),
        }
    }
}

/// The outcome of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The state after the tick
    pub state: MonitorState,
    /// Whether the tick changed the state
    pub changed: bool,
}

impl Tick {
    /// Whether this tick (re-)confirmed the heartbeat as lost.
    ///
    /// This is true on *every* tick without a heartbeat, not just the one
    /// where it went missing.
    pub fn interrupted(&self) -> bool {
        self.state == MonitorState::Lost
    }
}

// ===== HeartbeatMonitor =====

/// Two-state heartbeat monitor, sampled on a fixed tick.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    spec: HeartbeatSpec,
    state: MonitorState,
    observed: bool,
}

impl HeartbeatMonitor {
    /// Creates a monitor in the `Lost` state.
    pub fn new(spec: HeartbeatSpec) -> Self {
        Self {
            spec,
            state: MonitorState::Lost,
            observed: false,
        }
    }

    /// The heartbeat the monitor looks for
    pub fn spec(&self) -> &HeartbeatSpec {
        &self.spec
    }

    /// The current state
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Whether a heartbeat was seen since the last tick
    pub fn is_observed(&self) -> bool {
        self.observed
    }

    /// Checks a frame, marking the heartbeat as observed if it matches.
    ///
    /// Returns whether the frame was the heartbeat.
    pub fn observe(&mut self, frame: &CanFrame) -> bool {
        let hit = self.spec.matches(frame);
        self.observed |= hit;
        hit
    }

    /// Samples and clears the observed mark.
    pub fn tick(&mut self) -> Tick {
        let next = if self.observed {
            MonitorState::Alive
        } else {
            MonitorState::Lost
        };
        self.observed = false;

        let changed = next != self.state;
        self.state = next;
        Tick {
            state: next,
            changed,
        }
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(HeartbeatSpec::default())
    }
}

/////////////////////////////////////////////////////////////////////////////
