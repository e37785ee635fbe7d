use std::fmt;
use std::io;
use std::sync::Arc;

use crate::backend::{Backend, Device, SystemBackend};
use crate::config::ComPortConfig;
use crate::error::{ConfigError, OpenError, PortError, TransferError};
use crate::types::{ByteSize, ControlBlock, Parity, Protocol, StopBits, Transfer};

/// Lifecycle of a `ComPort`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
  Unopened,
  Opened,
  Closed,
}

enum Slot {
  Unopened,
  Opened { name: String, device: Box<dyn Device> },
  Closed,
}

/// Handle owning at most one open serial device.
///
/// The device is released by `close()` or when the handle is dropped,
/// whichever comes first.
pub struct ComPort {
  backend: Arc<dyn Backend>,
  config: ComPortConfig,
  slot: Slot,
}

impl ComPort {
  /// Handle on the real serial ports of this host.
  pub fn new() -> Self {
    Self::with_backend(Arc::new(SystemBackend), ComPortConfig::default())
  }

  pub fn with_backend(backend: Arc<dyn Backend>, config: ComPortConfig) -> Self {
    Self {
      backend,
      config,
      slot: Slot::Unopened,
    }
  }

  pub fn config(&self) -> &ComPortConfig {
    &self.config
  }

  pub fn state(&self) -> PortState {
    match self.slot {
      Slot::Unopened => PortState::Unopened,
      Slot::Opened { .. } => PortState::Opened,
      Slot::Closed => PortState::Closed,
    }
  }

  pub fn is_open(&self) -> bool {
    self.state() == PortState::Opened
  }

  /// Name the port was opened with, while it is open.
  pub fn name(&self) -> Option<&str> {
    match &self.slot {
      Slot::Opened { name, .. } => Some(name),
      _ => None,
    }
  }

  /// Opens `name` (e.g. `COM12` or `ttyUSB0`) for exclusive access and
  /// configures the timeouts. If the timeouts cannot be set the device is
  /// released again before the error is returned.
  pub fn open(&mut self, name: &str) -> Result<(), OpenError> {
    match &self.slot {
      Slot::Unopened => {}
      Slot::Opened { name, .. } => return Err(OpenError::AlreadyOpen(name.clone())),
      Slot::Closed => return Err(OpenError::Closed),
    }

    let path = self.config.namespace.device_path(name);
    let mut device = self
      .backend
      .open(&path)
      .map_err(|e| OpenError::from_io(&path, e))?;

    if let Err(source) = device.set_timeouts(&self.config.timeouts) {
      log::warn!("releasing {path}: timeout configuration failed: {source}");
      return Err(OpenError::Timeouts { path, source });
    }

    log::info!("opened serial port {path}");
    self.slot = Slot::Opened {
      name: name.to_string(),
      device,
    };
    Ok(())
  }

  fn device(&mut self) -> Result<&mut dyn Device, PortState> {
    match &mut self.slot {
      Slot::Opened { device, .. } => Ok(device.as_mut()),
      Slot::Unopened => Err(PortState::Unopened),
      Slot::Closed => Err(PortState::Closed),
    }
  }

  fn config_device(&mut self) -> Result<&mut dyn Device, ConfigError> {
    self.device().map_err(|state| match state {
      PortState::Closed => ConfigError::Closed,
      _ => ConfigError::NotOpen,
    })
  }

  fn transfer_device(&mut self) -> Result<&mut dyn Device, TransferError> {
    self.device().map_err(|state| match state {
      PortState::Closed => TransferError::Closed,
      _ => TransferError::NotOpen,
    })
  }

  /// Current line configuration as reported by the driver.
  pub fn control_block(&mut self) -> Result<ControlBlock, ConfigError> {
    self.config_device()?.control_block()
  }

  /// Reads the control block, overwrites baud rate, byte size, stop bits and
  /// parity, and applies it. Other fields keep the driver's values.
  ///
  /// If applying fails part way, the block read at the start is written back
  /// so the device is not left half configured.
  pub fn set_protocol(&mut self, protocol: &Protocol) -> Result<(), ConfigError> {
    let device = self.config_device()?;
    protocol.validate()?;

    let previous = device.control_block()?;
    let mut block = previous;
    block.apply(protocol);

    match device.apply_control_block(&block) {
      Ok(()) => {
        log::debug!("line protocol set to {protocol}");
        Ok(())
      }
      Err(e @ ConfigError::ApplyControlBlock(_)) => {
        if let Err(restore) = device.apply_control_block(&previous) {
          log::warn!("could not restore line settings after failed update: {restore}");
        }
        Err(e)
      }
      Err(e) => Err(e),
    }
  }

  pub fn set_protocol_parts(
    &mut self,
    baud_rate: u32,
    byte_size: u8,
    stop_bits: StopBits,
    parity: Parity,
  ) -> Result<(), ConfigError> {
    let byte_size = ByteSize::try_from(byte_size)?;
    self.set_protocol(&Protocol::new(baud_rate, byte_size, stop_bits, parity))
  }

  /// Single write of `bytes`. A write that times out is a partial transfer,
  /// possibly of zero bytes; only a failing OS call is an error.
  pub fn transmit(&mut self, bytes: &[u8]) -> Result<Transfer, TransferError> {
    let device = self.transfer_device()?;
    let written = match device.write(bytes) {
      Ok(n) => n,
      Err(e) if is_timeout(&e) => 0,
      Err(e) => return Err(e.into()),
    };
    log::trace!("transmitted {written}/{} bytes", bytes.len());
    Ok(Transfer::new(written, bytes.len()))
  }

  /// Single read into `buf`, returning immediately with whatever was already
  /// buffered.
  pub fn receive_into(&mut self, buf: &mut [u8]) -> Result<Transfer, TransferError> {
    let device = self.transfer_device()?;
    let read = match device.read(buf) {
      Ok(n) => n,
      Err(e) if is_timeout(&e) => 0,
      Err(e) => return Err(e.into()),
    };
    log::trace!("received {read}/{} bytes", buf.len());
    Ok(Transfer::new(read, buf.len()))
  }

  /// Reads up to `capacity` bytes; the result may be empty.
  pub fn receive(&mut self, capacity: usize) -> Result<Vec<u8>, TransferError> {
    let mut buf = vec![0u8; capacity];
    let n = self.receive_into(&mut buf)?.count();
    buf.truncate(n);
    Ok(buf)
  }

  /// Releases the device. A second call, or a call on a never-opened
  /// handle, is rejected.
  pub fn close(&mut self) -> Result<(), PortError> {
    match std::mem::replace(&mut self.slot, Slot::Closed) {
      Slot::Opened { name, device } => {
        drop(device);
        log::info!("closed serial port {name}");
        Ok(())
      }
      Slot::Unopened => {
        self.slot = Slot::Unopened;
        Err(PortError::NotOpen)
      }
      Slot::Closed => Err(PortError::Closed),
    }
  }
}

impl Default for ComPort {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ComPort {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComPort")
      .field("state", &self.state())
      .field("name", &self.name())
      .finish()
  }
}

fn is_timeout(e: &io::Error) -> bool {
  matches!(
    e.kind(),
    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
  )
}
