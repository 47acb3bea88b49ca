// canconsole/src/errors.rs
//
// Implements the error types for the CAN operator console.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Console errors.
//!
//! The errors fall into a few groups:
//!
//! ```text
//! ChannelError      - transport failure on open/send/receive/close
//! CodecError        - operator input rejected before reaching the bus
//! ConstructionError - a frame could not be built from its parts
//! ConfigError       - an inconsistent set of configuration values
//! ```
//!
//! Malformed payload bytes coming *from* the device are never an error.
//! They are rendered with a placeholder by the codec.

use std::{io, time::Duration};
use thiserror::Error;

// ===== ChannelError =====

/// A transport-level failure on the bus channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The named interface could not be found.
    #[error("CAN interface '{iface}' not found: {source}")]
    Lookup {
        /// The interface name, like "can0"
        iface: String,
        /// The lookup failure
        #[source]
        source: io::Error,
    },
    /// The socket could not be created or bound to the interface.
    #[error("Error opening CAN interface '{iface}': {source}")]
    Open {
        /// The interface name, like "can0"
        iface: String,
        /// The system error
        #[source]
        source: io::Error,
    },
    /// Writing a frame to the bus failed (bus off, no ACK, queue full...)
    #[error("Error sending CAN frame: {0}")]
    Send(#[source] io::Error),
    /// Reading from the bus failed.
    #[error("Error receiving CAN frame: {0}")]
    Receive(#[source] io::Error),
    /// The channel was already closed.
    #[error("CAN channel is closed")]
    Closed,
}

// ===== CodecError =====

/// Operator input that can not be turned into a frame payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The encoded text is longer than a frame payload.
    #[error("Input is {len} bytes, the maximum is {max}")]
    InvalidInput {
        /// Encoded length of the input
        len: usize,
        /// Maximum payload length
        max: usize,
    },
    /// A character has no representation in the configured charset.
    #[error("Character {0:?} can not be encoded")]
    Unrepresentable(char),
}

// ===== ConstructionError =====

/// Error that occurs when creating CAN frames
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionError {
    /// Trying to create a data frame from an error frame
    #[error("Incompatible frame type")]
    WrongFrameType,
    /// CAN ID was outside the range of valid IDs
    #[error("CAN ID too large")]
    IdTooLarge,
    /// Larger payload reported than can be held in the frame.
    #[error("Payload is larger than CAN maximum of 8 bytes")]
    TooMuchData,
}

// ===== ConfigError =====

/// A configuration that the console can not run with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A period or timeout was zero.
    #[error("'{0}' must be greater than zero")]
    ZeroDuration(&'static str),
    /// A capacity was zero.
    #[error("'{0}' must be at least 1")]
    ZeroCapacity(&'static str),
    /// The dispatch loop would not keep up with the heartbeat monitor.
    #[error("dispatch period {dispatch:?} must be shorter than the heartbeat period {heartbeat:?}")]
    DispatchTooSlow {
        /// The dispatch tick
        dispatch: Duration,
        /// The monitor tick
        heartbeat: Duration,
    },
    /// The bridge could never see the stop flag within the grace period.
    #[error("receive timeout {timeout:?} exceeds the shutdown grace period {grace:?}")]
    GraceTooShort {
        /// The receive timeout
        timeout: Duration,
        /// The shutdown grace period
        grace: Duration,
    },
    /// The heartbeat ID does not fit in an extended CAN ID.
    #[error("invalid heartbeat ID {id:#X}")]
    HeartbeatId {
        /// The raw ID that was given
        id: u32,
        /// Why the ID was rejected
        #[source]
        source: ConstructionError,
    },
    /// The heartbeat payload was not valid hex or not 8 bytes.
    #[error("invalid heartbeat payload: {0}")]
    HeartbeatPayload(String),
}

// ===== Error =====

/// Any error produced by the console.
#[derive(Error, Debug)]
pub enum Error {
    /// Bus channel failure
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Rejected operator input
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Frame construction failure
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Local I/O, such as the diagnostic log or spawning a thread
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The result type for the console.
pub type Result<T> = std::result::Result<T, Error>;

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_channel_error_source() {
        let err = ChannelError::Open {
            iface: "can0".into(),
            source: io::Error::from_raw_os_error(libc::EPERM),
        };
        assert!(err.to_string().contains("can0"));
        assert!(err.source().is_some());

        let err = Error::from(err);
        assert!(matches!(err, Error::Channel(ChannelError::Open { .. })));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::InvalidInput { len: 9, max: 8 };
        assert_eq!("Input is 9 bytes, the maximum is 8", err.to_string());
    }
}
