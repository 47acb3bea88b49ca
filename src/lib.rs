// canconsole/src/lib.rs
//
// The main library file for the 'canconsole' application.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! An operator console for a CAN field device.
//!
//! The console exchanges short text commands and status frames with a
//! device over a Linux SocketCAN interface, shows the traffic with
//! timestamps, and watches the device's periodic heartbeat.
//!
//! # Structure
//!
//! Reading the bus and everything else happen in two separate contexts:
//!
//! - The [`bridge`] thread is the only one that blocks on the bus. It
//!   loops on [`BusChannel::receive`] with a short timeout and pushes each
//!   frame into a bounded [`queue::IngressQueue`].
//!
//! - The consumer context, a [`Session`], wakes on a fixed tick, drains
//!   the queue and renders the frames into a bounded display log
//!   ([`dispatch`], [`display`]). On a second, slower tick it samples the
//!   [`heartbeat`] monitor. Operator commands are encoded by the
//!   [`codec`] and sent synchronously from this same context.
//!
//! Failures in either context become [`diag::Fault`]s. They are rendered
//! in-line for the operator and appended to a diagnostic log file. A
//! receive failure ends the session; a send failure doesn't.
//!
//! # Example
//!
//! ```no_run
//! use canconsole::{Config, Input, Session};
//! use crossbeam::channel;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = Config { iface: "vcan0".into(), ..Config::default() };
//! let mut session = Session::open(config, ())?;
//!
//! let (tx, rx) = channel::unbounded();
//! tx.send(Input::Command("PING".into())).unwrap();
//! tx.send(Input::Quit).unwrap();
//!
//! session.run(&rx, &AtomicBool::new(false))?;
//! session.shutdown()?;
//! # Ok::<(), canconsole::Error>(())
//! ```

#![deny(
    missing_docs,
    missing_copy_implementations,
    unstable_features,
    unused_import_braces
)]

pub mod errors;
pub use errors::{ChannelError, CodecError, ConfigError, ConstructionError, Error, Result};

pub mod addr;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod diag;
pub mod dispatch;
pub mod display;
pub mod frame;
pub mod heartbeat;
pub mod id;
pub mod queue;
pub mod session;
pub mod socket;

pub use addr::CanAddr;
pub use bridge::IngressBridge;
pub use codec::{Charset, Codec};
pub use config::Config;
pub use diag::{DiagnosticLog, ErrorSink, Fault, Severity};
pub use dispatch::Dispatcher;
pub use display::{DisplayLog, DisplaySink, PayloadView};
pub use embedded_can::{self, ExtendedId, Frame as EmbeddedFrame, Id, StandardId};
pub use frame::{CanFrame, Direction, FrameRecord};
pub use heartbeat::{HeartbeatMonitor, HeartbeatSpec, MonitorState};
pub use queue::{IngressQueue, OverflowPolicy};
pub use session::{Exit, Input, Session};
pub use socket::{BusChannel, CanSocket, ShouldRetry};

// ===== Helper functions =====

/// Gets a byte slice for any sized variable.
///
/// Note that this should normally be unsafe, but since we're only
/// using it internally for types that are always safe to view as bytes
/// (plain-old-data kernel structs), we mark it safe.
pub(crate) fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

/// Gets a mutable byte slice for any sized variable.
pub(crate) fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}
