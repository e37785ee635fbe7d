//! Error types for port operations.
//!
//! Each operation family has its own enum so callers can match on exactly
//! what can go wrong there; `PortError` wraps them all.

use std::io;

use thiserror::Error;

/// Failure to acquire a device.
#[derive(Debug, Error)]
pub enum OpenError {
  #[error("port not found: {0}")]
  NotFound(String),

  #[error("access denied or port busy: {0}")]
  AccessDenied(String),

  #[error("failed to configure timeouts on {path}: {source}")]
  Timeouts {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("port is already open: {0}")]
  AlreadyOpen(String),

  #[error("port handle is closed")]
  Closed,

  #[error("failed to open {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },
}

impl OpenError {
  /// Classifies an OS open failure for `path`.
  pub fn from_io(path: &str, source: io::Error) -> Self {
    match source.kind() {
      io::ErrorKind::NotFound => OpenError::NotFound(path.to_string()),
      io::ErrorKind::PermissionDenied => OpenError::AccessDenied(path.to_string()),
      _ => OpenError::Io {
        path: path.to_string(),
        source,
      },
    }
  }
}

/// Failure to read or apply the line configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("port is not open")]
  NotOpen,

  #[error("port handle is closed")]
  Closed,

  #[error("failed to read control block: {0}")]
  ReadControlBlock(#[source] io::Error),

  #[error("failed to apply control block: {0}")]
  ApplyControlBlock(#[source] io::Error),

  #[error("unsupported by this driver: {0}")]
  Unsupported(String),

  #[error("invalid baud rate: {0}")]
  InvalidBaudRate(u32),

  #[error("invalid byte size: {0} (expected 4 to 8)")]
  InvalidByteSize(u8),

  #[error("invalid protocol: {0:?}")]
  InvalidProtocol(String),
}

/// Failure of a read or write call itself. A short or empty transfer is not
/// an error; see `Transfer`.
#[derive(Debug, Error)]
pub enum TransferError {
  #[error("port is not open")]
  NotOpen,

  #[error("port handle is closed")]
  Closed,

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum PortError {
  #[error(transparent)]
  Open(#[from] OpenError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Transfer(#[from] TransferError),

  #[error("port is not open")]
  NotOpen,

  #[error("port handle is already closed")]
  Closed,

  #[error("Serialport error: {0}")]
  Serialport(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, PortError>;

/// Converts a `serialport` error into an `io::Error`, keeping the kind.
pub(crate) fn to_io(error: serialport::Error) -> io::Error {
  io::Error::from(error)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_open_failures() {
    let not_found = OpenError::from_io("/dev/ttyS9", io::ErrorKind::NotFound.into());
    assert!(matches!(not_found, OpenError::NotFound(p) if p == "/dev/ttyS9"));

    let denied = OpenError::from_io("COM3", io::ErrorKind::PermissionDenied.into());
    assert!(matches!(denied, OpenError::AccessDenied(_)));

    let other = OpenError::from_io("COM3", io::ErrorKind::Other.into());
    assert!(matches!(other, OpenError::Io { .. }));
  }

  #[test]
  fn umbrella_keeps_message() {
    let err: PortError = TransferError::NotOpen.into();
    assert_eq!(err.to_string(), "port is not open");
  }
}
