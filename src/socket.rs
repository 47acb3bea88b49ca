// canconsole/src/socket.rs
//
// Implements the bus channel over a SocketCAN raw socket on Linux.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The bus channel.
//!
//! [`BusChannel`] is the boundary between the console and the bus. It is
//! shared by two execution contexts: the ingress bridge blocks in
//! [`BusChannel::receive`] while the dispatch loop calls
//! [`BusChannel::send`], so every operation takes `&self`.
//!
//! [`CanSocket`] implements the channel for a classic CAN 2.0 raw socket.
//! The socket sits behind a reader/writer lock. Sends and receives share
//! it; [`BusChannel::close`] takes it exclusively and drops it. A receive
//! that is still polling when close is requested holds off the close for
//! at most one receive timeout, and any call after the close fails with
//! [`ChannelError::Closed`]. The descriptor is never closed while another
//! thread is using it.

use crate::{
    addr::CanAddr,
    as_bytes_mut,
    frame::{can_frame_default, CanFrame, CAN_MTU},
    ChannelError, ConstructionError,
};
use libc::{AF_CAN, CAN_RAW, EINPROGRESS};
use log::{debug, info};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use socket2::SockAddr;
use std::{
    fmt,
    io::{self, Read, Write},
    os::unix::io::AsFd,
    sync::{PoisonError, RwLock},
    time::Duration,
};

/// Check an error return value for timeouts.
///
/// Due to the fact that timeouts are reported as errors, reading a frame
/// on a socket that does not receive one in time will result in an error
/// being returned. This trait adds a `should_retry` method to `Error` and
/// `Result` to check for this condition.
pub trait ShouldRetry {
    /// Check for timeout
    ///
    /// If `true`, the error is probably due to a timeout.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for io::Error {
    fn should_retry(&self) -> bool {
        match self.kind() {
            // EAGAIN, EINPROGRESS and EWOULDBLOCK are the three possible codes
            // returned when a timeout occurs. the stdlib already maps EAGAIN
            // and EWOULDBLOCK os WouldBlock
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => true,
            // however, EINPROGRESS is also valid
            _ => matches!(self.raw_os_error(), Some(errno) if errno == EINPROGRESS),
        }
    }
}

impl<E: fmt::Debug> ShouldRetry for io::Result<E> {
    fn should_retry(&self) -> bool {
        match *self {
            Err(ref e) => e.should_retry(),
            _ => false,
        }
    }
}

// ===== BusChannel =====

/// A connection to a single CAN bus.
pub trait BusChannel: Send + Sync {
    /// Writes a frame to the bus, blocking until the kernel accepts it.
    ///
    /// A failure is final. The caller must not assume the frame will be
    /// retried.
    fn send(&self, frame: &CanFrame) -> Result<(), ChannelError>;

    /// Waits up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` if nothing arrived in time; this is not an error.
    fn receive(&self, timeout: Duration) -> Result<Option<CanFrame>, ChannelError>;

    /// Releases the connection.
    ///
    /// This is idempotent. Closing an already-closed channel succeeds.
    fn close(&self) -> Result<(), ChannelError>;

    /// Whether [`BusChannel::close`] has been called.
    fn is_closed(&self) -> bool;
}

// ===== Private local helper functions =====

/// Tries to open the CAN socket on the interface address.
fn raw_open_socket(addr: &CanAddr) -> io::Result<socket2::Socket> {
    let af_can = socket2::Domain::from(AF_CAN);
    let can_raw = socket2::Protocol::from(CAN_RAW);

    let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;
    sock.bind(&SockAddr::from(*addr))?;
    Ok(sock)
}

/// Waits for the socket to become readable.
/// Returns `false` on timeout or if the wait was interrupted.
fn wait_readable(sock: &socket2::Socket, timeout: Duration) -> io::Result<bool> {
    let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(sock.as_fd(), PollFlags::POLLIN)];

    match poll(&mut fds, PollTimeout::from(ms)) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

// ===== CanSocket =====

/// A bus channel over a raw SocketCAN socket for classic CAN 2.0 frames.
///
/// Frames are written with whatever ID format they were built with, and
/// both standard and extended frames are read. Error frames are not
/// requested from the kernel; should one arrive anyway it is skipped.
pub struct CanSocket {
    iface: String,
    bitrate: u32,
    sock: RwLock<Option<socket2::Socket>>,
}

impl CanSocket {
    /// Opens a named CAN interface, such as "can0" or "vcan0".
    ///
    /// The bit rate is the rate the interface is expected to run at. It is
    /// configured on the interface by the system, not by this call.
    pub fn open(iface: &str, bitrate: u32) -> Result<Self, ChannelError> {
        let addr = CanAddr::from_iface(iface).map_err(|source| ChannelError::Lookup {
            iface: iface.to_string(),
            source,
        })?;

        let sock = raw_open_socket(&addr).map_err(|source| ChannelError::Open {
            iface: iface.to_string(),
            source,
        })?;

        info!(
            "Opened CAN channel '{}' (index {}) at {} bit/s",
            iface,
            addr.ifindex(),
            bitrate
        );

        Ok(Self {
            iface: iface.to_string(),
            bitrate,
            sock: RwLock::new(Some(sock)),
        })
    }

    /// The interface name
    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// The configured bit rate
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Reads one frame from a socket that is known to be readable.
    fn read_frame(sock: &socket2::Socket) -> Result<Option<CanFrame>, ChannelError> {
        let mut raw = can_frame_default();
        let mut rdr = sock;

        match rdr.read(as_bytes_mut(&mut raw)) {
            Ok(CAN_MTU) => match CanFrame::try_from(raw) {
                Ok(frame) => Ok(Some(frame)),
                Err(ConstructionError::WrongFrameType) => {
                    debug!("Skipping CAN error frame {:08X}", raw.can_id);
                    Ok(None)
                }
                Err(err) => Err(ChannelError::Receive(io::Error::new(
                    io::ErrorKind::InvalidData,
                    err,
                ))),
            },
            Ok(n) => Err(ChannelError::Receive(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("short CAN frame read: {} bytes", n),
            ))),
            Err(err) if err.should_retry() => Ok(None),
            Err(err) => Err(ChannelError::Receive(err)),
        }
    }
}

impl BusChannel for CanSocket {
    fn send(&self, frame: &CanFrame) -> Result<(), ChannelError> {
        let guard = self.sock.read().unwrap_or_else(PoisonError::into_inner);
        let mut sock = guard.as_ref().ok_or(ChannelError::Closed)?;

        sock.write_all(frame.as_bytes()).map_err(ChannelError::Send)?;
        debug!("{}: sent {:X}", self.iface, frame);
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<CanFrame>, ChannelError> {
        let guard = self.sock.read().unwrap_or_else(PoisonError::into_inner);
        let sock = guard.as_ref().ok_or(ChannelError::Closed)?;

        if !wait_readable(sock, timeout).map_err(ChannelError::Receive)? {
            return Ok(None);
        }

        let frame = Self::read_frame(sock)?;
        if let Some(ref frame) = frame {
            debug!("{}: received {:X}", self.iface, frame);
        }
        Ok(frame)
    }

    fn close(&self) -> Result<(), ChannelError> {
        let mut guard = self.sock.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            info!("Closed CAN channel '{}'", self.iface);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.sock
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for CanSocket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CanSocket")
            .field("iface", &self.iface)
            .field("bitrate", &self.bitrate)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/////////////////////////////////////////////////////////////////////////////
