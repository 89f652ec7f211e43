use super::*;
use crate::{backend::Mock, error::SerialDeviceInUseOrDisconnectedError, frame::Value};
use static_assertions::assert_impl_all;
use std::{io, sync::mpsc};

assert_impl_all!(Link: Send, Sync);
assert_impl_all!(Link<Mock>: Send, Sync);

/// Wait up to 5 seconds for `condition` to hold.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn connected_link(mock: &Mock) -> Link<Mock> {
    let mut link = OpenSerialOptions::new()
        .join_timeout(Duration::from_secs(5))
        .build_with(mock.clone());
    link.connect().unwrap();
    link
}

#[test]
fn starts_disconnected() {
    let link = Link::from_connector(Mock::new());
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(link.get_latest_frame().is_empty());
    assert_eq!(link.stats(), Stats::default());
}

#[test]
fn frames_are_cached() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    assert!(link.is_connected());

    mock.append_data(b"\x00boot noise{\"a\": 1}{\"a\": 2,}{\"a\"");
    assert!(wait_for(|| link.stats().frames_received() == 2));
    assert_eq!(link.get_latest_frame().get("a"), Some(&Value::from(2)));

    mock.append_data(b": 3}");
    assert!(wait_for(|| link.stats().frames_received() == 3));
    assert_eq!(link.get_latest_frame().get("a"), Some(&Value::from(3)));
    assert_eq!(link.stats().frames_dropped(), 0);
}

#[test]
fn malformed_frames_and_overflows_are_counted() {
    let mock = Mock::new();
    let mut link = OpenSerialOptions::new()
        .max_buffer_len(16)
        .build_with(mock.clone());
    link.connect().unwrap();

    mock.append_data(br#"{"a":}{"b":1}"#);
    assert!(wait_for(|| link.stats().frames_received() == 1));
    assert_eq!(link.stats().frames_dropped(), 1);
    assert_eq!(link.get_latest_frame()["b"], 1);

    mock.append_data(b"this is far too much noise");
    assert!(wait_for(|| link.stats().buffer_overflows() == 1));
    assert_eq!(link.stats().bytes_received(), 39);
}

#[test]
fn commands_are_written() {
    let mock = Mock::new();
    let link = connected_link(&mock);

    link.send_command(3, 1.5, Endianness::Little).unwrap();
    assert_eq!(mock.take_written(), [3, 0x00, 0x00, 0xC0, 0x3F, b'\r', b'\n']);

    link.send_command(4, -2, Endianness::Big).unwrap();
    assert_eq!(mock.take_written(), [4, 0xFF, 0xFF, 0xFF, 0xFE, b'\r', b'\n']);

    link.send_text_command("VER").unwrap();
    assert_eq!(mock.take_written(), b"VER\r\n");

    link.send_device_info_command().unwrap();
    assert_eq!(mock.take_written(), b"GET_INFO\r\n");

    link.send_raw(&[0xAA, 0x55]).unwrap();
    assert_eq!(mock.take_written(), [0xAA, 0x55]);

    link.send(crate::command::BinaryCommand::int(1, 2)).unwrap();
    assert_eq!(mock.take_written(), [1, 0, 0, 0, 2, b'\r', b'\n']);
}

#[test]
fn invalid_values_are_not_written() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let err = link.send_command(3, 0.5, Endianness::Big).unwrap_err();
    assert!(matches!(err, LinkError::InvalidCommandValue(_)));
    assert!(mock.take_written().is_empty());
}

#[test]
fn sending_requires_a_connection() {
    let mock = Mock::new();
    let mut link = Link::from_connector(mock.clone());
    assert!(matches!(
        link.send_text_command("VER"),
        Err(LinkError::NotConnected(_))
    ));

    link.connect().unwrap();
    link.send_text_command("VER").unwrap();
    link.disconnect();
    assert!(matches!(
        link.send_raw(b"x"),
        Err(LinkError::NotConnected(_))
    ));
    assert_eq!(mock.take_written(), b"VER\r\n");
}

#[test]
fn write_failures_are_reported() {
    let mock = Mock::new();
    let link = connected_link(&mock);

    mock.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
    let err = link.send_text_command("VER").unwrap_err();
    assert!(matches!(&err, LinkError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));

    mock.flush_error(Some(io::Error::new(io::ErrorKind::TimedOut, "slow")));
    let err = link.send_text_command("VER").unwrap_err();
    assert!(err.is_timeout());

    // Failed writes do not disconnect the link.
    assert!(link.is_connected());
    link.send_text_command("VER").unwrap();
}

#[test]
fn open_failures_are_reported() {
    let mock = Mock::new();
    let mut link = Link::from_connector(mock.clone());
    let busy: LinkError =
        serialport::Error::new(serialport::ErrorKind::NoDevice, "/dev/ttyUSB0 is busy").into();
    mock.connect_error(Some(busy));

    let err = link.connect().unwrap_err();
    assert!(SerialDeviceInUseOrDisconnectedError::try_from(err).is_ok());
    assert!(!link.is_connected());

    // The caller may retry.
    link.connect().unwrap();
    assert!(link.is_connected());
    assert_eq!(mock.connections(), 1);
}

#[test]
fn read_timeout_is_applied_on_connect() {
    let mock = Mock::new();
    let mut link = OpenSerialOptions::new()
        .timeout(Some(Duration::from_millis(50)))
        .build_with(mock.clone());
    assert_eq!(mock.read_timeout().unwrap(), None);

    link.connect().unwrap();
    assert_eq!(mock.read_timeout().unwrap(), Some(Duration::from_millis(50)));
}

#[test]
fn connecting_twice_is_a_noop() {
    let mock = Mock::new();
    let mut link = connected_link(&mock);
    link.connect().unwrap();
    assert_eq!(mock.connections(), 1);
}

#[test]
fn read_faults_disconnect() {
    let mock = Mock::new();
    let mut link = connected_link(&mock);
    mock.read_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
    assert!(wait_for(|| !link.is_connected()));
    assert!(matches!(
        link.send_raw(b"x"),
        Err(LinkError::NotConnected(_))
    ));

    link.connect().unwrap();
    assert_eq!(mock.connections(), 2);
    mock.append_data(br#"{"after": true}"#);
    assert!(wait_for(|| link.get_latest_frame().contains_key("after")));
}

#[test]
fn read_timeouts_do_not_disconnect() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    mock.read_error(Some(io::Error::new(io::ErrorKind::TimedOut, "quiet")));
    mock.append_data(br#"{"still": "here"}"#);
    assert!(wait_for(|| link.get_latest_frame().contains_key("still")));
    assert!(link.is_connected());
}

#[test]
fn subscriber_receives_frames_in_order() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let (tx, rx) = mpsc::channel();
    link.subscribe(move |frame| {
        tx.send(frame["n"].clone()).unwrap();
    });

    mock.append_data(br#"{"n": 1}{"n": 2}"#);
    mock.append_data(br#"{"n": 3}"#);
    let received: Vec<_> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, vec![Value::from(1), Value::from(2), Value::from(3)]);
}

#[test]
fn last_subscriber_wins() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let (first_tx, first_rx) = mpsc::channel();
    let (second_tx, second_rx) = mpsc::channel();
    link.subscribe(move |frame| first_tx.send(frame.clone()).unwrap());
    link.subscribe(move |frame| second_tx.send(frame.clone()).unwrap());

    mock.append_data(br#"{"n": 1}"#);
    let frame = second_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frame["n"], 1);
    // The first handler was dropped when it was replaced.
    assert!(matches!(
        first_rx.try_recv(),
        Err(mpsc::TryRecvError::Disconnected)
    ));

    assert!(link.unsubscribe().is_some());
    assert!(link.unsubscribe().is_none());
}

#[test]
fn subscriber_can_unsubscribe_itself() {
    let mock = Mock::new();
    let link = Arc::new(connected_link(&mock));
    let (tx, rx) = mpsc::channel();
    let weak = Arc::downgrade(&link);
    link.subscribe(move |frame| {
        tx.send(frame["n"].clone()).unwrap();
        if let Some(link) = weak.upgrade() {
            link.unsubscribe();
        }
    });

    mock.append_data(br#"{"n": 1}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    // The reader loop keeps going without a subscriber.
    mock.append_data(br#"{"n": 2}"#);
    assert!(wait_for(|| link.stats().frames_received() == 2));
    assert_eq!(link.get_latest_frame()["n"], 2);
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(5)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
    assert!(link.unsubscribe().is_none());
}

#[test]
fn subscriber_can_replace_itself() {
    let mock = Mock::new();
    let link = Arc::new(connected_link(&mock));
    let (tx, rx) = mpsc::channel();
    let weak = Arc::downgrade(&link);
    link.subscribe(move |_| {
        tx.send("first").unwrap();
        let tx = tx.clone();
        if let Some(link) = weak.upgrade() {
            link.subscribe(move |_| tx.send("second").unwrap());
        }
    });

    mock.append_data(br#"{"n": 1}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
    mock.append_data(br#"{"n": 2}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
    mock.append_data(br#"{"n": 3}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
}

#[test]
fn subscriber_panics_are_survived() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let (tx, rx) = mpsc::channel();
    link.subscribe(move |frame| {
        tx.send(frame["n"].clone()).unwrap();
        if frame["n"] == 1 {
            panic!("subscriber failure");
        }
    });

    mock.append_data(br#"{"n": 1}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    mock.append_data(br#"{"n": 2}"#);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    assert!(wait_for(|| link.get_latest_frame()["n"] == 2));
}

#[test]
fn concurrent_readers_never_see_torn_frames() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let total: u32 = 500;

    thread::scope(|scope| {
        let feeder = mock.clone();
        scope.spawn(move || {
            for n in 1..=total {
                feeder.append_data(format!(r#"{{"seq": {n}, "pad": "xxxxxxxx", "check": {n}}}"#));
                if n % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });

        for _ in 0..4 {
            scope.spawn(|| {
                let deadline = Instant::now() + Duration::from_secs(10);
                while Instant::now() < deadline {
                    let frame = link.get_latest_frame();
                    if frame.is_empty() {
                        thread::yield_now();
                        continue;
                    }
                    assert_eq!(frame.len(), 3);
                    assert_eq!(frame["seq"], frame["check"]);
                    if frame["seq"] == total {
                        break;
                    }
                }
            });
        }
    });

    assert!(wait_for(|| link.stats().frames_received() == u64::from(total)));
    assert_eq!(link.get_latest_frame()["seq"], total);
}

#[test]
fn cache_is_frozen_after_disconnect() {
    let mock = Mock::new();
    let mut link = connected_link(&mock);

    let source = mock.clone();
    let feeding = Arc::new(AtomicBool::new(true));
    let keep_feeding = Arc::clone(&feeding);
    let feeder = thread::spawn(move || {
        let mut n = 0u64;
        while keep_feeding.load(Ordering::SeqCst) {
            n += 1;
            source.append_data(format!(r#"{{"n": {n}}}"#));
            thread::sleep(Duration::from_micros(100));
        }
    });

    assert!(wait_for(|| link.stats().frames_received() > 10));
    link.disconnect();
    let frozen = link.get_latest_frame();
    let received = link.stats().frames_received();
    thread::sleep(Duration::from_millis(50));
    feeding.store(false, Ordering::SeqCst);
    feeder.join().unwrap();

    assert!(Arc::ptr_eq(&frozen, &link.get_latest_frame()));
    assert_eq!(link.stats().frames_received(), received);
    assert!(!link.is_connected());
}

#[test]
fn disconnect_is_idempotent() {
    let mock = Mock::new();
    let mut link = connected_link(&mock);
    link.disconnect();
    link.disconnect();
    assert_eq!(link.state(), ConnectionState::Disconnected);

    link.connect().unwrap();
    assert!(link.is_connected());
    assert_eq!(mock.connections(), 2);
}

#[test]
fn slow_reader_loop_is_abandoned() {
    let mock = Mock::new();
    let mut link = OpenSerialOptions::new()
        .join_timeout(Duration::from_millis(10))
        .build_with(mock.clone());
    link.connect().unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    link.subscribe(move |_| {
        entered_tx.send(()).unwrap();
        let _ = release_rx.recv();
    });
    mock.append_data(br#"{"n": 1}{"n": 2}"#);
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    link.disconnect();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!link.is_connected());

    // The abandoned loop finishes its current frame but stores no more.
    let frozen = link.get_latest_frame();
    release_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(Arc::ptr_eq(&frozen, &link.get_latest_frame()));
    assert_eq!(frozen["n"], 1);
}

#[test]
fn dropping_disconnects() {
    let mock = Mock::new();
    let link = connected_link(&mock);
    let (tx, rx) = mpsc::channel();
    link.subscribe(move |frame| tx.send(frame.clone()).unwrap());
    mock.append_data(br#"{"n": 1}"#);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    drop(link);
    // The reader loop has stopped and released the subscriber.
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(5)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
}
