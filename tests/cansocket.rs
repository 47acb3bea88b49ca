// canconsole/tests/cansocket.rs
//
// Tests of the SocketCAN bus channel.
//
// Most of these need a virtual CAN interface, 'vcan0', and only run with
// the "vcan_tests" feature:
//
//   $ sudo ip link add dev vcan0 type vcan
//   $ sudo ip link set up vcan0
//   $ cargo test --features vcan_tests
//

use canconsole::{CanSocket, ChannelError};

#[cfg(feature = "vcan_tests")]
use canconsole::{
    BusChannel, CanFrame, Config, EmbeddedFrame, ExtendedId, Input, MonitorState, Session,
    StandardId,
};
#[cfg(feature = "vcan_tests")]
use crossbeam::channel;
#[cfg(feature = "vcan_tests")]
use serial_test::serial;
#[cfg(feature = "vcan_tests")]
use std::{sync::atomic::AtomicBool, time::Duration};

// The virtual CAN interface to use for tests.
#[cfg(feature = "vcan_tests")]
const VCAN: &str = "vcan0";

#[test]
fn test_nonexistant_device() {
    let res = CanSocket::open("invalid", 500_000);
    assert!(matches!(res, Err(ChannelError::Lookup { .. })));
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_timeout() {
    let sock = CanSocket::open(VCAN, 500_000).unwrap();
    let res = sock.receive(Duration::from_millis(50)).unwrap();
    assert!(res.is_none());
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_send_receive() {
    let tx = CanSocket::open(VCAN, 500_000).unwrap();
    let rx = CanSocket::open(VCAN, 500_000).unwrap();

    let frame = CanFrame::new(StandardId::new(0x7B).unwrap(), b"PING").unwrap();
    tx.send(&frame).unwrap();

    let got = rx.receive(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(frame, got);

    let frame = CanFrame::new(ExtendedId::new(269_492_224).unwrap(), &[4, 2, 0, 0, 0, 0, 1, 0])
        .unwrap();
    tx.send(&frame).unwrap();
    let got = rx.receive(Duration::from_secs(1)).unwrap().unwrap();
    assert!(got.is_extended());
    assert_eq!(frame, got);
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_close() {
    let sock = CanSocket::open(VCAN, 500_000).unwrap();
    assert!(!sock.is_closed());

    sock.close().unwrap();
    sock.close().unwrap();
    assert!(sock.is_closed());

    let frame = CanFrame::new(StandardId::new(0x7B).unwrap(), b"X").unwrap();
    assert!(matches!(sock.send(&frame), Err(ChannelError::Closed)));
    assert!(matches!(
        sock.receive(Duration::from_millis(10)),
        Err(ChannelError::Closed)
    ));
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_session_sees_heartbeat() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        iface: VCAN.into(),
        diag_log: dir.path().join("diag.log"),
        ..Config::default()
    };
    let heartbeat = config.heartbeat;
    let mut session = Session::open(config, ()).unwrap();

    let dev = CanSocket::open(VCAN, 500_000).unwrap();
    let frame = CanFrame::new(heartbeat.id(), heartbeat.data()).unwrap();

    let (tx, rx) = channel::unbounded();
    let device = std::thread::spawn(move || {
        for _ in 0..8 {
            dev.send(&frame).unwrap();
            std::thread::sleep(Duration::from_millis(150));
        }
        tx.send(Input::Quit).unwrap();
    });

    session.run(&rx, &AtomicBool::new(false)).unwrap();
    device.join().unwrap();

    assert_eq!(MonitorState::Alive, session.dispatcher().state());
    assert!(session.shutdown().unwrap());
}
