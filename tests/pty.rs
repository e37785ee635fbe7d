//! Exercises the system backend against pseudo-terminals.

#![cfg(unix)]

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use mini_com_port::{
  enumerate_on, ByteSize, ComPort, ComPortConfig, ConfigError, DeviceNamespace, FlowControl,
  OpenError, Parity, Protocol, StopBits, SystemBackend, Transfer,
};
use serialport::{SerialPort, TTYPort};
use test_case::test_case;

/// Opens a pty pair and hands back the master plus the path of the slave,
/// with the slave side released so a `ComPort` can open it.
fn pty() -> (TTYPort, String) {
  let (master, slave) = TTYPort::pair().expect("unable to create pty pair");
  let path = slave.name().expect("pty slave has no name");
  drop(slave);
  (master, path)
}

fn read_until(mut read: impl FnMut() -> Vec<u8>, len: usize) -> Vec<u8> {
  let deadline = Instant::now() + Duration::from_secs(2);
  let mut received = Vec::new();
  while received.len() < len && Instant::now() < deadline {
    let chunk = read();
    if chunk.is_empty() {
      thread::sleep(Duration::from_millis(10));
    }
    received.extend(chunk);
  }
  received
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn open_missing_device_fails() {
  let mut port = ComPort::new();
  assert!(port.open("/dev/this-serial-port-does-not-exist").is_err());
  assert!(!port.is_open());
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn open_close_reopen() {
  let (_master, path) = pty();

  let mut first = ComPort::new();
  first.open(&path).unwrap();
  first.close().unwrap();

  let mut second = ComPort::new();
  second.open(&path).unwrap();
  assert!(matches!(second.open(&path), Err(OpenError::AlreadyOpen(_))));
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn protocol_round_trips_through_driver() {
  let (_master, path) = pty();
  let mut port = ComPort::new();
  port.open(&path).unwrap();

  // Linux ptys pin 8 data bits and no parity
  let protocol = Protocol::new(19200, ByteSize::Eight, StopBits::Two, Parity::None);
  port.set_protocol(&protocol).unwrap();
  assert_eq!(port.control_block().unwrap().protocol(), protocol);
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn empty_receive_does_not_block() {
  let (_master, path) = pty();
  let mut port = ComPort::new();
  port.open(&path).unwrap();

  let start = Instant::now();
  assert!(port.receive(32).unwrap().is_empty());
  assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn transfers_through_pty() {
  let (mut master, path) = pty();
  let mut port = ComPort::new();
  port.open(&path).unwrap();

  master.write_all(b"from master").unwrap();
  master.flush().unwrap();
  let received = read_until(|| port.receive(64).unwrap(), 11);
  assert_eq!(received, b"from master");

  assert_eq!(port.transmit(b"to master").unwrap(), Transfer::Complete(9));
  let received = read_until(
    || {
      let mut buf = [0u8; 64];
      match master.read(&mut buf) {
        Ok(n) => buf[..n].to_vec(),
        Err(_) => Vec::new(),
      }
    },
    9,
  );
  assert_eq!(received, b"to master");
}

#[test]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn open_keeps_driver_line_settings() {
  let (_master, path) = pty();
  let setup = serialport::new(&path, 57600)
    .flow_control(serialport::FlowControl::Hardware)
    .open_native()
    .unwrap();
  drop(setup);

  let mut port = ComPort::new();
  port.open(&path).unwrap();
  let block = port.control_block().unwrap();
  assert_eq!(block.baud_rate, 57600);
  assert_eq!(block.flow_control, FlowControl::Hardware);

  let protocol = Protocol::new(19200, ByteSize::Eight, StopBits::Two, Parity::None);
  port.set_protocol(&protocol).unwrap();
  let block = port.control_block().unwrap();
  assert_eq!(block.protocol(), protocol);
  assert_eq!(block.flow_control, FlowControl::Hardware);
}

#[test_case(Protocol::new(9600, ByteSize::Four, StopBits::One, Parity::None) ; "four data bits")]
#[test_case(Protocol::new(9600, ByteSize::Eight, StopBits::OneAndHalf, Parity::None) ; "one and a half stop bits")]
#[test_case(Protocol::new(9600, ByteSize::Eight, StopBits::One, Parity::Mark) ; "mark parity")]
#[test_case(Protocol::new(9600, ByteSize::Eight, StopBits::One, Parity::Space) ; "space parity")]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn unsupported_settings_leave_driver_untouched(protocol: Protocol) {
  let (_master, path) = pty();
  let mut port = ComPort::new();
  port.open(&path).unwrap();
  let before = port.control_block().unwrap();

  assert!(matches!(
    port.set_protocol(&protocol),
    Err(ConfigError::Unsupported(_))
  ));
  assert_eq!(port.control_block().unwrap(), before);
}

fn pts_config(id: u16) -> ComPortConfig {
  ComPortConfig {
    namespace: DeviceNamespace {
      root: "/dev/pts/".to_string(),
      port_prefix: String::new(),
      first_index: 0,
    },
    probe_first: id,
    probe_last: id,
    ..Default::default()
  }
}

// single-identifier ranges keep ptys made by tests running alongside out
// of the result
#[test]
#[cfg(target_os = "linux")]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn enumeration_finds_pty_by_identifier() {
  use std::path::Path;

  let (_master, path) = pty();
  let index: u16 = path
    .strip_prefix("/dev/pts/")
    .and_then(|n| n.parse().ok())
    .expect("pty slave outside /dev/pts");
  let id = index + 1;
  if id > 256 {
    eprintln!("{path} is past the last identifier, skipping");
    return;
  }

  let found = enumerate_on(&SystemBackend, &pts_config(id));
  assert!(found.contains(id));
  assert_eq!(found.len(), 1);

  let unused = (200..=256u16)
    .find(|&id| !Path::new(&format!("/dev/pts/{}", id - 1)).exists())
    .expect("no unused pty index");
  assert!(enumerate_on(&SystemBackend, &pts_config(unused)).is_empty());

  // enumeration released the device
  let mut port = ComPort::new();
  port.open(&path).unwrap();
  assert!(port.is_open());
}
