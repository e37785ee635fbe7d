//! In-memory serial devices for running port code without hardware.
//!
//! Devices are registered by full device path. A device is either
//! standalone (writes are collected for the test to inspect), a loopback
//! (writes come back on its own receive side) or one end of a pair wired
//! like a null-modem cable.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::backend::{Backend, Device};
use crate::error::ConfigError;
use crate::types::{ControlBlock, Timeouts};

/// Failures a virtual device can be told to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
  pub open: bool,
  pub timeouts: bool,
  pub read_control_block: bool,
  pub apply_control_block: bool,
  /// the next apply stops after the baud rate and reports failure
  pub partial_apply: bool,
  pub read: bool,
  pub write: bool,
  /// writes time out without transferring anything
  pub stall_writes: bool,
  /// most bytes accepted by a single write
  pub write_limit: Option<usize>,
  /// most bytes delivered by a single read
  pub read_chunk: Option<usize>,
}

#[derive(Debug, Default)]
struct LineState {
  control_block: ControlBlock,
  faults: Faults,
  timeouts: Option<Timeouts>,
}

struct Line {
  in_use: AtomicBool,
  opens: AtomicUsize,
  // device side
  rx: Receiver<u8>,
  tx: Sender<u8>,
  // test side
  feed: Sender<u8>,
  sent: Option<Receiver<u8>>,
  state: Mutex<LineState>,
}

impl Line {
  fn new(rx: Receiver<u8>, tx: Sender<u8>, feed: Sender<u8>, sent: Option<Receiver<u8>>) -> Self {
    Self {
      in_use: AtomicBool::new(false),
      opens: AtomicUsize::new(0),
      rx,
      tx,
      feed,
      sent,
      state: Mutex::new(LineState::default()),
    }
  }

  fn state(&self) -> MutexGuard<'_, LineState> {
    lock(&self.state)
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of virtual devices. Clones share the same registry.
#[derive(Clone, Default)]
pub struct VirtualBackend {
  lines: Arc<Mutex<HashMap<String, Arc<Line>>>>,
}

impl VirtualBackend {
  pub fn new() -> Self {
    Self::default()
  }

  fn register(&self, path: &str, line: Line) -> VirtualLine {
    let line = Arc::new(line);
    lock(&self.lines).insert(path.to_string(), line.clone());
    VirtualLine { line }
  }

  /// Device whose transmitted bytes are only visible through `VirtualLine::take_sent`.
  pub fn add_port(&self, path: &str) -> VirtualLine {
    let (feed, rx) = unbounded();
    let (tx, sent) = unbounded();
    self.register(path, Line::new(rx, tx, feed, Some(sent)))
  }

  /// Device wired TX to RX.
  pub fn add_loopback(&self, path: &str) -> VirtualLine {
    let (feed, rx) = unbounded();
    self.register(path, Line::new(rx, feed.clone(), feed, None))
  }

  /// Two devices wired to each other.
  pub fn add_pair(&self, a: &str, b: &str) -> (VirtualLine, VirtualLine) {
    let (a_feed, a_rx) = unbounded();
    let (b_feed, b_rx) = unbounded();
    let a_line = self.register(a, Line::new(a_rx, b_feed.clone(), a_feed.clone(), None));
    let b_line = self.register(b, Line::new(b_rx, a_feed, b_feed, None));
    (a_line, b_line)
  }

  /// Unplugs a device. Handles that already own it keep working.
  pub fn remove(&self, path: &str) -> bool {
    lock(&self.lines).remove(path).is_some()
  }

  pub fn line(&self, path: &str) -> Option<VirtualLine> {
    lock(&self.lines)
      .get(path)
      .map(|line| VirtualLine { line: line.clone() })
  }
}

impl Backend for VirtualBackend {
  fn open(&self, path: &str) -> io::Result<Box<dyn Device>> {
    let line = lock(&self.lines)
      .get(path)
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no device at {path}")))?;

    if line.state().faults.open {
      return Err(io::Error::new(
        io::ErrorKind::PermissionDenied,
        "injected open failure",
      ));
    }
    if line
      .in_use
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{path} is in use"),
      ));
    }
    line.opens.fetch_add(1, Ordering::Relaxed);

    Ok(Box::new(VirtualDevice { line }))
  }
}

struct VirtualDevice {
  line: Arc<Line>,
}

impl Drop for VirtualDevice {
  fn drop(&mut self) {
    self.line.in_use.store(false, Ordering::Release);
  }
}

impl Device for VirtualDevice {
  fn set_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()> {
    let mut state = self.line.state();
    if state.faults.timeouts {
      return Err(io::Error::new(
        io::ErrorKind::Other,
        "injected timeout configuration failure",
      ));
    }
    state.timeouts = Some(*timeouts);
    Ok(())
  }

  fn control_block(&mut self) -> Result<ControlBlock, ConfigError> {
    let state = self.line.state();
    if state.faults.read_control_block {
      return Err(ConfigError::ReadControlBlock(io::Error::new(
        io::ErrorKind::Other,
        "injected control block read failure",
      )));
    }
    Ok(state.control_block)
  }

  fn apply_control_block(&mut self, block: &ControlBlock) -> Result<(), ConfigError> {
    let mut state = self.line.state();
    if state.faults.apply_control_block {
      return Err(ConfigError::ApplyControlBlock(io::Error::new(
        io::ErrorKind::Other,
        "injected control block apply failure",
      )));
    }
    if state.faults.partial_apply {
      state.faults.partial_apply = false;
      state.control_block.baud_rate = block.baud_rate;
      return Err(ConfigError::ApplyControlBlock(io::Error::new(
        io::ErrorKind::Other,
        "injected failure after baud rate",
      )));
    }
    state.control_block = *block;
    Ok(())
  }

  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let faults = self.line.state().faults.clone();
    if faults.read {
      return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
    }

    let limit = faults.read_chunk.map_or(buf.len(), |chunk| chunk.min(buf.len()));
    let mut n = 0;
    while n < limit {
      match self.line.rx.try_recv() {
        Ok(byte) => {
          buf[n] = byte;
          n += 1;
        }
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          return Err(io::Error::new(io::ErrorKind::BrokenPipe, "line disconnected"));
        }
      }
    }

    // same as a real port whose read timeout expires with nothing buffered
    if n == 0 && !buf.is_empty() {
      return Err(io::Error::new(io::ErrorKind::TimedOut, "no data available"));
    }
    Ok(n)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let faults = self.line.state().faults.clone();
    if faults.write {
      return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
    }
    if faults.stall_writes && !buf.is_empty() {
      return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
    }

    let limit = faults.write_limit.map_or(buf.len(), |max| max.min(buf.len()));
    for &byte in &buf[..limit] {
      self
        .line
        .tx
        .send(byte)
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "line disconnected"))?;
    }
    Ok(limit)
  }
}

/// Test-side view of a virtual device.
#[derive(Clone)]
pub struct VirtualLine {
  line: Arc<Line>,
}

impl VirtualLine {
  /// Queues bytes for the device to receive.
  pub fn inject(&self, bytes: &[u8]) {
    for &byte in bytes {
      // the line owns its receiver, so the channel cannot be disconnected
      let _ = self.line.feed.send(byte);
    }
  }

  /// Bytes transmitted by a standalone device since the last call.
  pub fn take_sent(&self) -> Vec<u8> {
    self
      .line
      .sent
      .as_ref()
      .map(|sent| sent.try_iter().collect())
      .unwrap_or_default()
  }

  /// Bytes waiting on the device's receive side.
  pub fn pending(&self) -> usize {
    self.line.rx.len()
  }

  pub fn set_faults(&self, faults: Faults) {
    self.line.state().faults = faults;
  }

  pub fn control_block(&self) -> ControlBlock {
    self.line.state().control_block
  }

  pub fn set_control_block(&self, block: ControlBlock) {
    self.line.state().control_block = block;
  }

  /// Timeouts most recently applied by an opener.
  pub fn timeouts(&self) -> Option<Timeouts> {
    self.line.state().timeouts
  }

  pub fn is_in_use(&self) -> bool {
    self.line.in_use.load(Ordering::Acquire)
  }

  /// Number of successful opens, probes included.
  pub fn open_count(&self) -> usize {
    self.line.opens.load(Ordering::Relaxed)
  }
}
