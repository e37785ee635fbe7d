use serde::{Deserialize, Serialize};

use crate::types::Timeouts;

/// Lowest and highest identifiers probed by enumeration.
pub const FIRST_PORT_ID: u16 = 1;
pub const LAST_PORT_ID: u16 = 256;

/// How port names and numeric identifiers map to device paths.
///
/// On Windows, `COM10` and above are only reachable through the `\\.\`
/// device namespace, so every name gets that root. On Unix the identifier
/// `n` is `ttyS<n-1>` under `/dev/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNamespace {
  pub root: String,
  pub port_prefix: String,
  /// suffix used for identifier 1
  pub first_index: u16,
}

impl DeviceNamespace {
  pub fn windows() -> Self {
    Self {
      root: r"\\.\".to_string(),
      port_prefix: "COM".to_string(),
      first_index: 1,
    }
  }

  pub fn unix() -> Self {
    Self {
      root: "/dev/".to_string(),
      port_prefix: "ttyS".to_string(),
      first_index: 0,
    }
  }

  /// Namespace of the platform this crate was built for.
  pub fn native() -> Self {
    if cfg!(windows) {
      Self::windows()
    } else {
      Self::unix()
    }
  }

  /// Full device path for a port name. Names already rooted are kept as is.
  pub fn device_path(&self, name: &str) -> String {
    if name.starts_with(&self.root) || (cfg!(unix) && name.starts_with('/')) {
      name.to_string()
    } else {
      format!("{}{}", self.root, name)
    }
  }

  /// Port name for a numeric identifier, e.g. `COM12` or `ttyS11`.
  pub fn port_name(&self, id: u16) -> String {
    let suffix = u32::from(id.saturating_sub(1)) + u32::from(self.first_index);
    format!("{}{}", self.port_prefix, suffix)
  }
}

impl Default for DeviceNamespace {
  fn default() -> Self {
    Self::native()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComPortConfig {
  pub namespace: DeviceNamespace,
  pub timeouts: Timeouts,
  pub probe_first: u16,
  pub probe_last: u16,
}

impl ComPortConfig {
  /// Identifiers to probe, clamped to what a `PortSet` can hold.
  pub fn probe_range(&self) -> std::ops::RangeInclusive<u16> {
    self.probe_first.max(FIRST_PORT_ID)..=self.probe_last.min(LAST_PORT_ID)
  }
}

impl Default for ComPortConfig {
  fn default() -> Self {
    Self {
      namespace: DeviceNamespace::default(),
      timeouts: Timeouts::default(),
      probe_first: FIRST_PORT_ID,
      probe_last: LAST_PORT_ID,
    }
  }
}
