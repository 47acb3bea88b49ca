// canconsole/src/dispatch.rs
//
// Implements the dispatch loop: the single consumer of the ingress queue.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The dispatch loop.
//!
//! The [`Dispatcher`] is the one place that owns the console state: the
//! display log, the heartbeat monitor and the diagnostic log. Everything
//! it does runs in the consumer context, driven by the session:
//!
//! - [`Dispatcher::dispatch_tick`] drains the whole ingress queue, feeds
//!   heartbeats to the monitor and renders every other frame.
//! - [`Dispatcher::heartbeat_tick`] samples the monitor.
//! - [`Dispatcher::send_command`] encodes operator text and writes it to
//!   the bus synchronously.
//! - [`Dispatcher::drain_faults`] renders and persists faults reported by
//!   the ingress bridge.

use crate::{
    codec::{self, Codec},
    config::Config,
    diag::{DiagnosticLog, Fault},
    display::{always_text, render_line, DisplayLog, DisplaySink, PayloadView, HEARTBEAT_LOST_LINE},
    frame::{CanFrame, FrameRecord},
    heartbeat::{HeartbeatMonitor, MonitorState, Tick},
    queue::IngressQueue,
    socket::BusChannel,
    Result,
};
use crossbeam::channel::Receiver;
use embedded_can::StandardId;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// The consumer side of the console.
pub struct Dispatcher<C: BusChannel + ?Sized, S: DisplaySink> {
    channel: Arc<C>,
    queue: Arc<IngressQueue<FrameRecord>>,
    faults: Receiver<Fault>,
    codec: Codec,
    view: PayloadView,
    tx_id: StandardId,
    monitor: HeartbeatMonitor,
    log: DisplayLog,
    diag: DiagnosticLog,
    sink: S,
    dropped_seen: u64,
    shutdown: bool,
}

impl<C: BusChannel + ?Sized, S: DisplaySink> Dispatcher<C, S> {
    /// Creates a dispatcher over the channel, the ingress queue and the
    /// receiving end of the fault channel.
    pub fn new(
        config: &Config,
        channel: Arc<C>,
        queue: Arc<IngressQueue<FrameRecord>>,
        faults: Receiver<Fault>,
        sink: S,
    ) -> Self {
        Self {
            channel,
            queue,
            faults,
            codec: Codec::new(config.charset),
            view: config.payload_view,
            tx_id: config.tx_id,
            monitor: HeartbeatMonitor::new(config.heartbeat),
            log: DisplayLog::new(config.display_ceiling),
            diag: DiagnosticLog::new(config.diag_log.clone()),
            sink,
            dropped_seen: 0,
            shutdown: false,
        }
    }

    /// Drains every queued frame, then any pending faults.
    ///
    /// Returns the number of frames drained.
    pub fn dispatch_tick(&mut self) -> usize {
        let records = self.queue.drain();
        let n = records.len();

        for rec in records {
            if self.monitor.observe(rec.frame()) {
                debug!("Heartbeat observed");
                continue;
            }
            let line = self.render(&rec);
            self.append(line);
        }

        let dropped = self.queue.dropped();
        if dropped > self.dropped_seen {
            warn!(
                "Ingress queue overflow: {} frame(s) lost, {} in total",
                dropped - self.dropped_seen,
                dropped
            );
            self.dropped_seen = dropped;
        }

        self.drain_faults();
        n
    }

    /// Samples the heartbeat monitor.
    ///
    /// The sink is told the state on every tick, and every tick without a
    /// heartbeat appends the interruption line.
    pub fn heartbeat_tick(&mut self) -> Tick {
        let tick = self.monitor.tick();
        if tick.changed {
            info!("Heartbeat {}", tick.state);
        }

        self.sink.status(tick.state);
        if tick.interrupted() {
            self.append(HEARTBEAT_LOST_LINE.to_string());
        }
        tick
    }

    /// Sends operator text to the device.
    ///
    /// Empty text is ignored and returns `Ok(None)`. Text the codec
    /// rejects returns the codec error and changes nothing. A send failure
    /// is reported like any other fault, then returned. On success, the
    /// sent line is appended and the record returned.
    pub fn send_command(&mut self, text: &str) -> Result<Option<FrameRecord>> {
        if text.is_empty() {
            return Ok(None);
        }

        let payload = self.codec.encode(text)?;
        let frame = CanFrame::try_new(self.tx_id, &payload)?;

        if let Err(err) = self.channel.send(&frame) {
            let fault = Fault::warning(err);
            self.handle_fault(&fault);
            return Err(fault.into_error());
        }

        let rec = FrameRecord::sent(frame);
        let line = self.render(&rec);
        self.append(line);
        Ok(Some(rec))
    }

    /// The receiving end of the fault channel, for waiting on faults.
    pub fn faults(&self) -> &Receiver<Fault> {
        &self.faults
    }

    /// Handles every fault reported since the last call.
    pub fn drain_faults(&mut self) {
        while let Ok(fault) = self.faults.try_recv() {
            self.handle_fault(&fault);
        }
    }

    /// Shows a fault, appends it to the diagnostic log, and requests
    /// shutdown if it is fatal.
    pub fn handle_fault(&mut self, fault: &Fault) {
        if fault.is_fatal() {
            error!("{}", fault.error());
            self.shutdown = true;
        } else {
            warn!("{}", fault.error());
        }

        let line = fault.render();
        if let Err(err) = self.diag.append(&line) {
            warn!(
                "Unable to write to the diagnostic log '{}': {}",
                self.diag.path().display(),
                err
            );
        }
        self.append(line);
    }

    /// Tells the operator something without touching the display log.
    pub fn notice(&mut self, text: &str) {
        self.sink.notice(text);
    }

    /// Whether a fatal fault was handled
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// The display log
    pub fn display_log(&self) -> &DisplayLog {
        &self.log
    }

    /// The heartbeat state as of the last monitor tick
    pub fn state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// The heartbeat monitor
    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    /// The display sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the display sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The bus channel
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// The ingress queue
    pub fn queue(&self) -> &Arc<IngressQueue<FrameRecord>> {
        &self.queue
    }

    fn render(&self, rec: &FrameRecord) -> String {
        let payload = if always_text(rec.direction()) || self.view == PayloadView::Text {
            self.codec.decode(rec.data())
        } else {
            codec::hex(rec.data())
        };
        render_line(rec, &payload)
    }

    fn append(&mut self, line: String) {
        self.sink.line(&line);
        self.log.push(line);
    }
}

/////////////////////////////////////////////////////////////////////////////
