use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteSize {
  Four,
  Five,
  Six,
  Seven,
  Eight,
}

impl ByteSize {
  pub fn bits(self) -> u8 {
    match self {
      ByteSize::Four => 4,
      ByteSize::Five => 5,
      ByteSize::Six => 6,
      ByteSize::Seven => 7,
      ByteSize::Eight => 8,
    }
  }
}

impl TryFrom<u8> for ByteSize {
  type Error = ConfigError;

  fn try_from(bits: u8) -> Result<Self, Self::Error> {
    match bits {
      4 => Ok(ByteSize::Four),
      5 => Ok(ByteSize::Five),
      6 => Ok(ByteSize::Six),
      7 => Ok(ByteSize::Seven),
      8 => Ok(ByteSize::Eight),
      other => Err(ConfigError::InvalidByteSize(other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
  One,
  OneAndHalf,
  Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
  None,
  Odd,
  Even,
  Mark,
  Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowControl {
  None,
  Software,
  Hardware,
}

/// Line protocol requested by the caller. Consumed by `ComPort::set_protocol`,
/// never stored by the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
  pub baud_rate: u32,
  pub byte_size: ByteSize,
  pub stop_bits: StopBits,
  pub parity: Parity,
}

impl Protocol {
  pub fn new(baud_rate: u32, byte_size: ByteSize, stop_bits: StopBits, parity: Parity) -> Self {
    Self {
      baud_rate,
      byte_size,
      stop_bits,
      parity,
    }
  }

  /// Rejects values no driver accepts.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.baud_rate == 0 {
      return Err(ConfigError::InvalidBaudRate(self.baud_rate));
    }
    Ok(())
  }
}

impl Default for Protocol {
  fn default() -> Self {
    Self::new(9600, ByteSize::Eight, StopBits::One, Parity::None)
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parity = match self.parity {
      Parity::None => 'N',
      Parity::Odd => 'O',
      Parity::Even => 'E',
      Parity::Mark => 'M',
      Parity::Space => 'S',
    };
    let stop_bits = match self.stop_bits {
      StopBits::One => "1",
      StopBits::OneAndHalf => "1.5",
      StopBits::Two => "2",
    };
    write!(
      f,
      "{},{},{},{}",
      self.baud_rate,
      self.byte_size.bits(),
      parity,
      stop_bits
    )
  }
}

/// Parses the compact `baud,bits,parity,stop` notation, e.g. `9600,8,N,1`.
impl FromStr for Protocol {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ConfigError::InvalidProtocol(s.to_string());

    let fields: Vec<&str> = s.split(',').map(str::trim).collect();
    let [baud, bits, parity, stop] = fields.as_slice() else {
      return Err(invalid());
    };

    let baud_rate = baud.parse::<u32>().map_err(|_| invalid())?;
    let byte_size = ByteSize::try_from(bits.parse::<u8>().map_err(|_| invalid())?)?;
    let parity = match parity.to_ascii_uppercase().as_str() {
      "N" => Parity::None,
      "O" => Parity::Odd,
      "E" => Parity::Even,
      "M" => Parity::Mark,
      "S" => Parity::Space,
      _ => return Err(invalid()),
    };
    let stop_bits = match *stop {
      "1" => StopBits::One,
      "1.5" => StopBits::OneAndHalf,
      "2" => StopBits::Two,
      _ => return Err(invalid()),
    };

    let protocol = Protocol::new(baud_rate, byte_size, stop_bits, parity);
    protocol.validate()?;
    Ok(protocol)
  }
}

/// Snapshot of the device's line configuration as the driver reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlBlock {
  pub baud_rate: u32,
  pub byte_size: ByteSize,
  pub stop_bits: StopBits,
  pub parity: Parity,
  pub flow_control: FlowControl,
}

impl ControlBlock {
  /// Overwrites the protocol fields; everything else keeps the driver's value.
  pub fn apply(&mut self, protocol: &Protocol) {
    self.baud_rate = protocol.baud_rate;
    self.byte_size = protocol.byte_size;
    self.stop_bits = protocol.stop_bits;
    self.parity = protocol.parity;
  }

  pub fn protocol(&self) -> Protocol {
    Protocol::new(self.baud_rate, self.byte_size, self.stop_bits, self.parity)
  }
}

impl Default for ControlBlock {
  fn default() -> Self {
    let protocol = Protocol::default();
    Self {
      baud_rate: protocol.baud_rate,
      byte_size: protocol.byte_size,
      stop_bits: protocol.stop_bits,
      parity: protocol.parity,
      flow_control: FlowControl::None,
    }
  }
}

/// Read and write timeouts applied when a port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
  /// zero means a read returns whatever is already buffered
  #[serde(with = "duration_ms")]
  pub read: Duration,
  #[serde(with = "duration_ms")]
  pub write_base: Duration,
  #[serde(with = "duration_ms")]
  pub write_per_byte: Duration,
}

impl Timeouts {
  /// Upper bound for a single write of `len` bytes.
  pub fn write_timeout(&self, len: usize) -> Duration {
    let per_byte = u32::try_from(len)
      .ok()
      .and_then(|n| self.write_per_byte.checked_mul(n));
    match per_byte {
      Some(per_byte) => self.write_base.saturating_add(per_byte),
      None => Duration::MAX,
    }
  }
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      read: Duration::ZERO,
      write_base: Duration::from_millis(50),
      write_per_byte: Duration::from_millis(10),
    }
  }
}

/// Result of a single read or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
  Complete(usize),
  Partial { transferred: usize, requested: usize },
}

impl Transfer {
  pub(crate) fn new(transferred: usize, requested: usize) -> Self {
    if transferred >= requested {
      Transfer::Complete(transferred)
    } else {
      Transfer::Partial {
        transferred,
        requested,
      }
    }
  }

  pub fn count(&self) -> usize {
    match *self {
      Transfer::Complete(n) => n,
      Transfer::Partial { transferred, .. } => transferred,
    }
  }

  pub fn is_complete(&self) -> bool {
    matches!(self, Transfer::Complete(_))
  }
}

pub(crate) mod duration_ms {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
