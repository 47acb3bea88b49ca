// canconsole/src/session.rs
//
// Implements a console session: wiring, the consumer loop and shutdown.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! A console session.
//!
//! A [`Session`] connects a bus channel to the ingress bridge and the
//! dispatcher, then runs the consumer loop on the calling thread:
//!
//! ```text
//! channel --receive--> bridge thread --push--> queue
//!                                                |
//!         operator input --> Session::run --drain+tick--> Dispatcher --> DisplaySink
//! ```
//!
//! The loop sleeps until the dispatch or monitor ticker fires, the
//! operator sends input, or the bridge reports a fault. Ticks missed while
//! a send was in progress are not replayed. Shutdown is orderly: stop the
//! bridge, wait a bounded grace period for its thread, then close the
//! channel.

use crate::{
    bridge::IngressBridge,
    config::Config,
    diag::{fault_channel, DiagnosticLog, Fault},
    dispatch::Dispatcher,
    display::DisplaySink,
    frame::FrameRecord,
    queue::IngressQueue,
    socket::{BusChannel, CanSocket},
    Error, Result,
};
use crossbeam::channel::{self, Receiver};
use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Operator input to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text to send to the device
    Command(String),
    /// End the session
    Quit,
}

/// Why a session stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The operator asked to quit, closed the input, or hit Ctrl-C.
    Requested,
    /// A fatal fault ended the session.
    Fault,
}

/// A running console: the bridge thread plus the dispatcher.
pub struct Session<C, S>
where
    C: BusChannel + ?Sized + 'static,
    S: DisplaySink,
{
    config: Config,
    channel: Arc<C>,
    bridge: IngressBridge,
    dispatcher: Dispatcher<C, S>,
}

impl<S: DisplaySink> Session<CanSocket, S> {
    /// Opens the configured SocketCAN interface and starts a session on it.
    ///
    /// A failure to open the interface is also written to the diagnostic
    /// log, since there is no display to show it on yet.
    pub fn open(config: Config, sink: S) -> Result<Self> {
        config.validate()?;

        let channel = match CanSocket::open(&config.iface, config.bitrate) {
            Ok(channel) => channel,
            Err(err) => {
                let fault = Fault::fatal(err);
                let diag = DiagnosticLog::new(config.diag_log.clone());
                if let Err(err) = diag.record(&fault) {
                    warn!(
                        "Unable to write to the diagnostic log '{}': {}",
                        diag.path().display(),
                        err
                    );
                }
                return Err(fault.into_error());
            }
        };

        Self::with_channel(config, Arc::new(channel), sink)
    }
}

impl<C, S> Session<C, S>
where
    C: BusChannel + ?Sized + 'static,
    S: DisplaySink,
{
    /// Starts a session on an already open channel.
    pub fn with_channel(config: Config, channel: Arc<C>, sink: S) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(IngressQueue::<FrameRecord>::new(
            config.queue_capacity,
            config.overflow,
        ));
        let (errors, faults) = fault_channel();

        let bridge = IngressBridge::spawn(
            Arc::clone(&channel),
            Arc::clone(&queue),
            errors,
            config.receive_timeout,
        )?;
        let dispatcher = Dispatcher::new(&config, Arc::clone(&channel), queue, faults, sink);

        Ok(Self {
            config,
            channel,
            bridge,
            dispatcher,
        })
    }

    /// The configuration the session runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The bus channel
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// The dispatcher
    pub fn dispatcher(&self) -> &Dispatcher<C, S> {
        &self.dispatcher
    }

    /// Mutable access to the dispatcher
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<C, S> {
        &mut self.dispatcher
    }

    /// Handles one line of operator text.
    ///
    /// Rejected input is shown as a notice and doesn't reach the bus. Send
    /// failures have already been reported as faults by the dispatcher.
    pub fn submit(&mut self, text: &str) {
        match self.dispatcher.send_command(text) {
            Ok(_) => (),
            Err(err @ (Error::Codec(_) | Error::Construction(_))) => {
                info!("Input rejected: {}", err);
                self.dispatcher.notice(&format!("Input rejected: {}", err));
            }
            Err(err) => debug!("Command not sent: {}", err),
        }
    }

    /// Runs the consumer loop until the operator quits or a fault ends the
    /// session.
    ///
    /// `stop` is polled on every wake-up, so setting it from another thread
    /// (like a signal handler) ends the loop within one dispatch period.
    /// The input channel closing is treated like [`Input::Quit`].
    pub fn run(&mut self, input: &Receiver<Input>, stop: &AtomicBool) -> Result<Exit> {
        let dispatch_period = self.config.dispatch_period;
        let heartbeat_period = self.config.heartbeat_period;

        // A ticker holds at most one pending tick, so a slow send never
        // causes a burst of ticks afterwards.
        let dispatch = channel::tick(dispatch_period);
        let heartbeat = channel::tick(heartbeat_period);
        let mut faults = self.dispatcher.faults().clone();

        info!(
            "Session running: dispatch every {:?}, heartbeat every {:?}",
            dispatch_period, heartbeat_period
        );

        loop {
            if stop.load(Ordering::Acquire) {
                info!("Stop requested");
                return Ok(Exit::Requested);
            }

            let mut bridge_gone = false;
            crossbeam::select! {
                recv(dispatch) -> _ => {
                    self.dispatcher.dispatch_tick();
                }
                recv(heartbeat) -> _ => {
                    self.dispatcher.heartbeat_tick();
                }
                recv(faults) -> fault => match fault {
                    Ok(fault) => self.dispatcher.handle_fault(&fault),
                    Err(_) => bridge_gone = true,
                },
                recv(input) -> msg => match msg {
                    Ok(Input::Command(text)) => self.submit(&text),
                    Ok(Input::Quit) => {
                        info!("Quit requested");
                        return Ok(Exit::Requested);
                    }
                    Err(_) => {
                        info!("Operator input closed");
                        return Ok(Exit::Requested);
                    }
                },
            }

            // The bridge is gone and can't report anything else
            if bridge_gone {
                faults = channel::never();
            }
            if self.dispatcher.shutdown_requested() {
                return Ok(Exit::Fault);
            }
        }
    }

    /// Stops the bridge and closes the channel.
    ///
    /// The bridge thread gets the configured grace period to exit. If it
    /// doesn't make it, it's left detached; the channel is closed anyway.
    /// Returns whether the bridge thread was joined.
    pub fn shutdown(mut self) -> Result<bool> {
        info!("Shutting down");

        self.bridge.request_stop();
        let joined = self.bridge.stop(self.config.shutdown_grace);
        self.channel.close()?;

        // Anything the bridge reported on its way out
        self.dispatcher.drain_faults();
        Ok(joined)
    }
}
