// canconsole/tests/console.rs
//
// End to end tests of a console session over an in-memory bus.
//

use canconsole::{
    display::HEARTBEAT_LOST_LINE, BusChannel, CanFrame, ChannelError, Config, DisplaySink,
    EmbeddedFrame, Exit, Input, MonitorState, Session, StandardId,
};
use crossbeam::channel::{self, Receiver};
use std::{
    collections::VecDeque,
    fs, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

// --------------------------------------------------------------------------

/// A bus that hands out injected frames and records sent ones.
#[derive(Default)]
struct MockBus {
    incoming: Mutex<VecDeque<Result<CanFrame, ChannelError>>>,
    sent: Mutex<Vec<CanFrame>>,
    closed: AtomicBool,
    fail_send: AtomicBool,
    // Block this long in send
    slow_send: Mutex<Option<Duration>>,
    // Sleep this long in receive, ignoring the timeout and close
    stall: Mutex<Option<Duration>>,
}

impl MockBus {
    fn inject(&self, frame: CanFrame) {
        self.incoming.lock().unwrap().push_back(Ok(frame));
    }

    fn inject_err(&self, err: ChannelError) {
        self.incoming.lock().unwrap().push_back(Err(err));
    }

    fn sent(&self) -> Vec<CanFrame> {
        self.sent.lock().unwrap().clone()
    }
}

impl BusChannel for MockBus {
    fn send(&self, frame: &CanFrame) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChannelError::Send(io::Error::from_raw_os_error(
                libc::ENOBUFS,
            )));
        }
        let slow = *self.slow_send.lock().unwrap();
        if let Some(slow) = slow {
            thread::sleep(slow);
        }
        self.sent.lock().unwrap().push(*frame);
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<CanFrame>, ChannelError> {
        let stall = *self.stall.lock().unwrap();
        if let Some(stall) = stall {
            thread::sleep(stall);
            return Ok(None);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            if let Some(next) = self.incoming.lock().unwrap().pop_front() {
                return next.map(Some);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Records everything shown to the operator.
#[derive(Default)]
struct Screen {
    lines: Vec<String>,
    states: Vec<MonitorState>,
    notices: Vec<String>,
}

impl DisplaySink for Screen {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn status(&mut self, state: MonitorState) {
        self.states.push(state);
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }
}

// --------------------------------------------------------------------------

/// A config with short periods, logging faults into a temp dir.
fn fast_config(dir: &TempDir) -> Config {
    Config {
        receive_timeout: Duration::from_millis(5),
        dispatch_period: Duration::from_millis(5),
        heartbeat_period: Duration::from_millis(500),
        shutdown_grace: Duration::from_millis(500),
        diag_log: dir.path().join("diag.log"),
        ..Config::default()
    }
}

fn start(config: Config) -> (Session<MockBus, Screen>, Arc<MockBus>) {
    let bus = Arc::new(MockBus::default());
    let session = Session::with_channel(config, Arc::clone(&bus), Screen::default()).unwrap();
    (session, bus)
}

/// Sends the inputs, then quits after `after`.
fn script(inputs: Vec<Input>, after: Duration) -> Receiver<Input> {
    let (tx, rx) = channel::unbounded();
    thread::spawn(move || {
        for input in inputs {
            tx.send(input).unwrap();
        }
        thread::sleep(after);
        let _ = tx.send(Input::Quit);
    });
    rx
}

fn heartbeat(config: &Config) -> CanFrame {
    CanFrame::new(config.heartbeat.id(), config.heartbeat.data()).unwrap()
}

fn std_frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::new(StandardId::new(id).unwrap(), data).unwrap()
}

// --------------------------------------------------------------------------

#[test]
fn ping_is_sent_and_shown() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, bus) = start(fast_config(&dir));

    let rx = script(vec![Input::Command("PING".into())], Duration::from_millis(20));
    let exit = session.run(&rx, &AtomicBool::new(false)).unwrap();
    assert_eq!(Exit::Requested, exit);

    let sent = bus.sent();
    assert_eq!(1, sent.len());
    assert_eq!(0x07B, sent[0].raw_id());
    assert!(!sent[0].is_extended());
    assert_eq!(b"PING", sent[0].data());

    let lines: Vec<_> = session.dispatcher().display_log().lines().collect();
    assert_eq!(1, lines.len());
    assert!(lines[0].contains("Gesendet  -->"));
    assert!(lines[0].contains("PING"));

    assert!(session.shutdown().unwrap());
    assert!(bus.is_closed());
}

#[test]
fn heartbeat_is_observed_not_shown() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    let hb = heartbeat(&config);
    let (mut session, bus) = start(config);

    bus.inject(hb);
    let rx = script(vec![], Duration::from_millis(100));
    session.run(&rx, &AtomicBool::new(false)).unwrap();

    assert!(session.dispatcher().display_log().is_empty());
    assert!(session.dispatcher().monitor().is_observed());
    session.shutdown().unwrap();
}

#[test]
fn traffic_is_shown_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    let hb = heartbeat(&config);
    let (mut session, bus) = start(config);

    for i in 0..50u8 {
        bus.inject(std_frame(0x200, &[i]));
        if i % 10 == 0 {
            bus.inject(hb);
        }
    }

    let rx = script(vec![], Duration::from_millis(200));
    session.run(&rx, &AtomicBool::new(false)).unwrap();

    let lines: Vec<_> = session.dispatcher().display_log().lines().collect();
    assert_eq!(50, lines.len());
    for (i, line) in lines.iter().enumerate() {
        assert!(line.contains("Empfangen <--"));
        assert!(line.contains("\tID: 512 \t"));
        assert!(line.ends_with(&format!("Daten: {:02X}", i)));
    }
    session.shutdown().unwrap();
}

#[test]
fn missing_heartbeat_is_reported_every_tick() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        heartbeat_period: Duration::from_millis(20),
        ..fast_config(&dir)
    };
    let (mut session, _bus) = start(config);

    let rx = script(vec![], Duration::from_millis(150));
    session.run(&rx, &AtomicBool::new(false)).unwrap();

    let disp = session.dispatcher();
    let lost = disp.display_log().lines().filter(|l| *l == HEARTBEAT_LOST_LINE).count();
    assert!(lost >= 3, "only {} lost lines", lost);
    assert_eq!(lost, disp.display_log().len());
    assert_eq!(MonitorState::Lost, disp.state());
    assert_eq!(lost, disp.sink().states.len());
    session.shutdown().unwrap();
}

#[test]
fn steady_heartbeat_stays_alive() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        heartbeat_period: Duration::from_millis(50),
        ..fast_config(&dir)
    };
    let hb = heartbeat(&config);
    let (mut session, bus) = start(config);

    let device = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            let end = Instant::now() + Duration::from_millis(400);
            while Instant::now() < end {
                bus.inject(hb);
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let rx = script(vec![], Duration::from_millis(300));
    session.run(&rx, &AtomicBool::new(false)).unwrap();
    device.join().unwrap();

    let disp = session.dispatcher();
    assert!(disp.display_log().is_empty());
    assert!(!disp.sink().states.is_empty());
    assert!(disp.sink().states.iter().all(|s| *s == MonitorState::Alive));
    session.shutdown().unwrap();
}

#[test]
fn receive_failure_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    let diag = config.diag_log.clone();
    let (mut session, bus) = start(config);

    bus.inject(std_frame(0x100, b"last"));
    bus.inject_err(ChannelError::Receive(io::Error::from_raw_os_error(
        libc::ENETDOWN,
    )));

    // Never quits on its own
    let (_tx, rx) = channel::unbounded();
    let exit = session.run(&rx, &AtomicBool::new(false)).unwrap();
    assert_eq!(Exit::Fault, exit);

    let last = session.dispatcher().display_log().last().unwrap().to_string();
    assert!(last.contains("\tERROR: Error receiving CAN frame"));

    let text = fs::read_to_string(diag).unwrap();
    assert_eq!(last, text.trim_end());
    assert!(session.shutdown().unwrap());
}

#[test]
fn send_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    let diag = config.diag_log.clone();
    let (mut session, bus) = start(config);

    bus.fail_send.store(true, Ordering::SeqCst);
    let rx = script(vec![Input::Command("PING".into())], Duration::from_millis(50));
    let exit = session.run(&rx, &AtomicBool::new(false)).unwrap();
    assert_eq!(Exit::Requested, exit);

    assert!(bus.sent().is_empty());
    let lines: Vec<_> = session.dispatcher().display_log().lines().collect();
    assert_eq!(1, lines.len());
    assert!(lines[0].contains("\tERROR: Error sending CAN frame"));
    assert!(fs::read_to_string(diag).unwrap().contains("ERROR"));
    session.shutdown().unwrap();
}

#[test]
fn slow_send_does_not_replay_missed_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        heartbeat_period: Duration::from_millis(50),
        ..fast_config(&dir)
    };
    let (mut session, bus) = start(config);

    // The send blocks the loop for eight heartbeat periods
    *bus.slow_send.lock().unwrap() = Some(Duration::from_millis(400));
    let rx = script(vec![Input::Command("PING".into())], Duration::from_millis(430));
    session.run(&rx, &AtomicBool::new(false)).unwrap();

    assert_eq!(1, bus.sent().len());
    let ticks = session.dispatcher().sink().states.len();
    assert!(ticks >= 1 && ticks <= 3, "{} monitor ticks", ticks);
    session.shutdown().unwrap();
}

#[test]
fn bad_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, bus) = start(fast_config(&dir));

    let inputs = vec![
        Input::Command("".into()),
        Input::Command("TOO LONG!".into()),
    ];
    let rx = script(inputs, Duration::from_millis(20));
    session.run(&rx, &AtomicBool::new(false)).unwrap();

    assert!(bus.sent().is_empty());
    assert!(session.dispatcher().display_log().is_empty());

    let notices = &session.dispatcher().sink().notices;
    assert_eq!(1, notices.len());
    assert!(notices[0].contains("9 bytes"));
    session.shutdown().unwrap();
}

#[test]
fn stop_flag_and_closed_input_end_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _bus) = start(fast_config(&dir));

    let (_tx, rx) = channel::unbounded::<Input>();
    let exit = session.run(&rx, &AtomicBool::new(true)).unwrap();
    assert_eq!(Exit::Requested, exit);

    let (tx, rx) = channel::unbounded::<Input>();
    drop(tx);
    let exit = session.run(&rx, &AtomicBool::new(false)).unwrap();
    assert_eq!(Exit::Requested, exit);

    session.shutdown().unwrap();
}

#[test]
fn shutdown_is_bounded_by_grace() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        shutdown_grace: Duration::from_millis(50),
        ..fast_config(&dir)
    };
    let (session, bus) = start(config);
    *bus.stall.lock().unwrap() = Some(Duration::from_secs(3));

    // Let the bridge get stuck in receive
    thread::sleep(Duration::from_millis(20));

    let t = Instant::now();
    let joined = session.shutdown().unwrap();
    assert!(!joined);
    assert!(t.elapsed() < Duration::from_secs(2));
    assert!(bus.is_closed());
}
