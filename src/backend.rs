//! The seam between port handles and the operating system.
//!
//! `SystemBackend` talks to real hardware through `serialport`; tests and
//! embedders without hardware use `VirtualBackend` instead.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::{to_io, ConfigError};
use crate::types::{ByteSize, ControlBlock, FlowControl, Parity, Protocol, StopBits, Timeouts};

/// An open device exclusively owned by one handle. Dropping it releases the
/// device.
pub trait Device: Send {
  fn set_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()>;

  fn control_block(&mut self) -> Result<ControlBlock, ConfigError>;

  fn apply_control_block(&mut self, block: &ControlBlock) -> Result<(), ConfigError>;

  /// Single read attempt bounded by the configured read timeout.
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

  /// Single write attempt bounded by the configured write timeout for
  /// `buf.len()` bytes.
  fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Opens devices by path.
pub trait Backend: Send + Sync {
  /// Opens an existing device for exclusive read/write access.
  fn open(&self, path: &str) -> io::Result<Box<dyn Device>>;

  /// Presence test: open and immediately release. A busy device reports
  /// `false` just like a missing one.
  fn probe(&self, path: &str) -> bool {
    self.open(path).is_ok()
  }
}

#[cfg(unix)]
type NativePort = serialport::TTYPort;
#[cfg(windows)]
type NativePort = serialport::COMPort;

/// Real serial ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
  /// Opens and configures the port. `serialport` always writes the builder's
  /// line settings, so the driver's control block is captured beforehand and
  /// written back afterwards.
  fn open_native(path: &str) -> io::Result<NativePort> {
    let saved = driver_control_block(path);

    let protocol = Protocol::default();
    let mut port = serialport::new(path, protocol.baud_rate)
      .timeout(Duration::ZERO)
      .open_native()
      .map_err(to_io)?;

    if let Some(block) = saved {
      if let Err(e) = write_control_block(&mut port, &block) {
        log::warn!("{path}: could not restore driver line settings: {e}");
      }
    }
    Ok(port)
  }
}

// Probing must not lock the port away from other processes. On Unix the
// TTY port is exclusive after opening; on Windows exclusivity is not exposed.
#[cfg(unix)]
fn make_port_nonexclusive(port: &mut NativePort) -> io::Result<()> {
  port.set_exclusive(false).map_err(to_io)
}

#[cfg(windows)]
fn make_port_nonexclusive(_: &mut NativePort) -> io::Result<()> {
  Ok(())
}

/// Opens the device without touching its line settings.
#[cfg(unix)]
fn open_unconfigured(path: &str) -> io::Result<NativePort> {
  use std::fs::OpenOptions;
  use std::os::unix::fs::OpenOptionsExt;
  use std::os::unix::io::{FromRawFd, IntoRawFd};

  use nix::fcntl::OFlag;

  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
    .open(path)?;

  // SAFETY: `into_raw_fd` gives up the only owner of the descriptor, so the
  // port is free to close it on drop.
  let mut port = unsafe { NativePort::from_raw_fd(file.into_raw_fd()) };
  make_port_nonexclusive(&mut port)?;
  Ok(port)
}

// `serialport` writes the DCB on every COM port open.
#[cfg(windows)]
fn open_unconfigured(path: &str) -> io::Result<NativePort> {
  let mut port = serialport::new(path, Protocol::default().baud_rate)
    .open_native()
    .map_err(to_io)?;
  make_port_nonexclusive(&mut port)?;
  Ok(port)
}

#[cfg(unix)]
fn driver_control_block(path: &str) -> Option<ControlBlock> {
  let port = open_unconfigured(path).ok()?;
  read_control_block(&port).ok()
}

// TODO: capture the DCB with GetCommState before `serialport` rewrites it
#[cfg(windows)]
fn driver_control_block(_: &str) -> Option<ControlBlock> {
  None
}

impl Backend for SystemBackend {
  fn open(&self, path: &str) -> io::Result<Box<dyn Device>> {
    let port = Self::open_native(path)?;
    Ok(Box::new(SystemDevice {
      port,
      timeouts: Timeouts::default(),
    }))
  }

  /// Present means the path opens and answers as a serial line. Nothing is
  /// reconfigured and exclusivity is dropped again before release.
  fn probe(&self, path: &str) -> bool {
    match open_unconfigured(path) {
      Ok(port) => match read_control_block(&port) {
        Ok(_) => true,
        Err(e) => {
          log::trace!("probe of {path}: {e}");
          false
        }
      },
      Err(_) => false,
    }
  }
}

fn read_control_block<P: serialport::SerialPort>(port: &P) -> Result<ControlBlock, ConfigError> {
  let read = |e: serialport::Error| ConfigError::ReadControlBlock(to_io(e));

  let byte_size = match port.data_bits().map_err(read)? {
    serialport::DataBits::Five => ByteSize::Five,
    serialport::DataBits::Six => ByteSize::Six,
    serialport::DataBits::Seven => ByteSize::Seven,
    serialport::DataBits::Eight => ByteSize::Eight,
  };
  let stop_bits = match port.stop_bits().map_err(read)? {
    serialport::StopBits::One => StopBits::One,
    serialport::StopBits::Two => StopBits::Two,
  };
  let parity = match port.parity().map_err(read)? {
    serialport::Parity::None => Parity::None,
    serialport::Parity::Odd => Parity::Odd,
    serialport::Parity::Even => Parity::Even,
  };
  let flow_control = match port.flow_control().map_err(read)? {
    serialport::FlowControl::None => FlowControl::None,
    serialport::FlowControl::Software => FlowControl::Software,
    serialport::FlowControl::Hardware => FlowControl::Hardware,
  };

  Ok(ControlBlock {
    baud_rate: port.baud_rate().map_err(read)?,
    byte_size,
    stop_bits,
    parity,
    flow_control,
  })
}

fn write_control_block<P: serialport::SerialPort>(
  port: &mut P,
  block: &ControlBlock,
) -> Result<(), ConfigError> {
  let unsupported = |what: &str| ConfigError::Unsupported(what.to_string());

  // everything is mapped before the first setter runs so an unsupported
  // field leaves the device untouched
  let data_bits = match block.byte_size {
    ByteSize::Four => return Err(unsupported("4 data bits")),
    ByteSize::Five => serialport::DataBits::Five,
    ByteSize::Six => serialport::DataBits::Six,
    ByteSize::Seven => serialport::DataBits::Seven,
    ByteSize::Eight => serialport::DataBits::Eight,
  };
  let stop_bits = match block.stop_bits {
    StopBits::One => serialport::StopBits::One,
    StopBits::OneAndHalf => return Err(unsupported("1.5 stop bits")),
    StopBits::Two => serialport::StopBits::Two,
  };
  let parity = match block.parity {
    Parity::None => serialport::Parity::None,
    Parity::Odd => serialport::Parity::Odd,
    Parity::Even => serialport::Parity::Even,
    Parity::Mark => return Err(unsupported("mark parity")),
    Parity::Space => return Err(unsupported("space parity")),
  };
  let flow_control = match block.flow_control {
    FlowControl::None => serialport::FlowControl::None,
    FlowControl::Software => serialport::FlowControl::Software,
    FlowControl::Hardware => serialport::FlowControl::Hardware,
  };

  let apply = |e: serialport::Error| ConfigError::ApplyControlBlock(to_io(e));
  port.set_baud_rate(block.baud_rate).map_err(apply)?;
  port.set_data_bits(data_bits).map_err(apply)?;
  port.set_stop_bits(stop_bits).map_err(apply)?;
  port.set_parity(parity).map_err(apply)?;
  port.set_flow_control(flow_control).map_err(apply)?;
  Ok(())
}

struct SystemDevice {
  port: NativePort,
  timeouts: Timeouts,
}

impl Device for SystemDevice {
  fn set_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()> {
    serialport::SerialPort::set_timeout(&mut self.port, timeouts.read).map_err(to_io)?;
    self.timeouts = *timeouts;
    Ok(())
  }

  fn control_block(&mut self) -> Result<ControlBlock, ConfigError> {
    read_control_block(&self.port)
  }

  /// Settings are written one at a time; a failure part way leaves the
  /// earlier ones applied. `ComPort::set_protocol` rolls those back.
  fn apply_control_block(&mut self, block: &ControlBlock) -> Result<(), ConfigError> {
    write_control_block(&mut self.port, block)
  }

  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    serialport::SerialPort::set_timeout(&mut self.port, self.timeouts.read).map_err(to_io)?;
    self.port.read(buf)
  }

  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let timeout = self.timeouts.write_timeout(buf.len());
    serialport::SerialPort::set_timeout(&mut self.port, timeout).map_err(to_io)?;
    self.port.write(buf)
  }
}
