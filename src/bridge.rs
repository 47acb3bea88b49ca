// canconsole/src/bridge.rs
//
// Implements the ingress bridge: a thread that moves frames from the bus
// into the ingress queue.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The ingress bridge.
//!
//! The bridge owns the only blocking read path. It loops on
//! [`BusChannel::receive`] with a short timeout, stamps each frame as it
//! arrives and pushes it into the [`IngressQueue`]. The consumer never
//! waits on the bus.
//!
//! Stopping is cooperative. [`IngressBridge::stop`] clears the shared
//! running flag, which the loop checks after every receive, then waits a
//! bounded grace period for the thread to finish. If it doesn't, the thread
//! is left detached and shutdown carries on.
//!
//! A receive failure ends the loop. While running it is reported to the
//! [`ErrorSink`] as fatal; once a stop has been requested it is expected
//! (the channel is being closed underneath) and only logged.

use crate::{
    diag::{ErrorSink, Fault},
    frame::FrameRecord,
    queue::{IngressQueue, Pushed},
    socket::BusChannel,
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// The name given to the bridge thread.
pub const THREAD_NAME: &str = "can-ingress";

/// Handle to a running ingress bridge thread.
#[derive(Debug)]
pub struct IngressBridge {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    // Disconnects when the thread exits
    done: Receiver<()>,
}

impl IngressBridge {
    /// Starts the bridge thread.
    ///
    /// The thread calls `receive(timeout)` on the channel until it is
    /// stopped or the channel fails.
    pub fn spawn<C>(
        channel: Arc<C>,
        queue: Arc<IngressQueue<FrameRecord>>,
        errors: ErrorSink,
        timeout: Duration,
    ) -> io::Result<Self>
    where
        C: BusChannel + ?Sized + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done) = channel::bounded::<()>(0);

        let handle = thread::Builder::new().name(THREAD_NAME.into()).spawn({
            let running = Arc::clone(&running);
            move || {
                let _done = done_tx;
                ingress_loop(&*channel, &queue, &errors, &running, timeout);
            }
        })?;

        Ok(Self {
            running,
            handle: Some(handle),
            done,
        })
    }

    /// Whether the thread has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Clears the running flag without waiting for the thread.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Asks the thread to stop and waits up to `grace` for it to exit.
    ///
    /// Returns `true` if the thread exited and was joined, `false` if it
    /// was still running when the grace period ran out. Calling this again
    /// after it returned returns `true`.
    pub fn stop(&mut self, grace: Duration) -> bool {
        self.request_stop();

        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return true,
        };

        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("The ingress thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Ingress thread did not stop within {:?}; detaching", grace);
                false
            }
        }
    }
}

impl Drop for IngressBridge {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// The body of the bridge thread.
fn ingress_loop<C>(
    channel: &C,
    queue: &IngressQueue<FrameRecord>,
    errors: &ErrorSink,
    running: &AtomicBool,
    timeout: Duration,
) where
    C: BusChannel + ?Sized,
{
    info!("Ingress bridge started");

    while running.load(Ordering::Acquire) {
        match channel.receive(timeout) {
            Ok(Some(frame)) => match queue.push(FrameRecord::received(frame)) {
                Pushed::Queued => (),
                Pushed::Evicted(old) => debug!("Ingress queue full; evicted {:X}", old.frame()),
                Pushed::Rejected(new) => debug!("Ingress queue full; rejected {:X}", new.frame()),
            },
            Ok(None) => (),
            Err(err) if running.load(Ordering::Acquire) => {
                error!("Ingress bridge failed: {}", err);
                if !errors.report(Fault::fatal(err)) {
                    warn!("No consumer left for the ingress failure");
                }
                break;
            }
            Err(err) => {
                debug!("Receive ended during shutdown: {}", err);
                break;
            }
        }
    }

    info!("Ingress bridge stopped");
}

/////////////////////////////////////////////////////////////////////////////
