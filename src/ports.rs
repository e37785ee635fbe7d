use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};

use crate::backend::{Backend, SystemBackend};
use crate::config::{ComPortConfig, DeviceNamespace};
use crate::error::{OpenError, PortError};
use crate::open_port::ComPort;
use crate::port_set::PortSet;

/// Presence test for a single port identifier.
pub trait Prober {
  fn probe(&self, id: u16) -> bool;
}

impl<F> Prober for F
where
  F: Fn(u16) -> bool,
{
  fn probe(&self, id: u16) -> bool {
    self(id)
  }
}

/// Probes identifiers by opening the matching device path on a backend.
pub struct BackendProber<'a> {
  backend: &'a dyn Backend,
  namespace: &'a DeviceNamespace,
}

impl<'a> BackendProber<'a> {
  pub fn new(backend: &'a dyn Backend, namespace: &'a DeviceNamespace) -> Self {
    Self { backend, namespace }
  }
}

impl Prober for BackendProber<'_> {
  fn probe(&self, id: u16) -> bool {
    let path = self.namespace.device_path(&self.namespace.port_name(id));
    let present = self.backend.probe(&path);
    log::trace!("probe {path}: {}", if present { "present" } else { "absent" });
    present
  }
}

/// Probes every identifier from 1 to 256 on the host's serial ports.
///
/// Each probe is a real open/close round trip and nothing is cached, so
/// this is slow and must be re-run to notice hot-plugged devices. A busy
/// port reads as absent.
pub fn enumerate() -> PortSet {
  let config = ComPortConfig::default();
  enumerate_on(&SystemBackend, &config)
}

pub fn enumerate_on(backend: &dyn Backend, config: &ComPortConfig) -> PortSet {
  let prober = BackendProber::new(backend, &config.namespace);
  let found = enumerate_range(&prober, config.probe_range());
  log::debug!("enumerated {} serial port(s): {found:?}", found.len());
  found
}

pub fn enumerate_with(prober: &impl Prober) -> PortSet {
  enumerate_range(prober, ComPortConfig::default().probe_range())
}

fn enumerate_range(prober: &impl Prober, range: std::ops::RangeInclusive<u16>) -> PortSet {
  range.filter(|&id| prober.probe(id)).collect()
}

/// How the operating system says a port is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
  Usb,
  Bluetooth,
  Pci,
  Unknown,
}

impl fmt::Display for PortKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      PortKind::Usb => "Usb",
      PortKind::Bluetooth => "Bluetooth",
      PortKind::Pci => "Pci",
      PortKind::Unknown => "Unknown",
    })
  }
}

/// A port reported by the operating system's own discovery mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailablePort {
  pub path: String,
  pub kind: PortKind,
  /// only set for `PortKind::Usb`
  pub usb_info: Option<UsbInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbInfo {
  pub vid: u16,
  pub pid: u16,
  pub serial: Option<String>,
  pub manufacturer: Option<String>,
  pub product: Option<String>,
}

impl From<UsbPortInfo> for UsbInfo {
  fn from(info: UsbPortInfo) -> Self {
    Self {
      vid: info.vid,
      pid: info.pid,
      serial: info.serial_number,
      manufacturer: info.manufacturer,
      product: info.product,
    }
  }
}

impl From<SerialPortInfo> for AvailablePort {
  fn from(info: SerialPortInfo) -> Self {
    let (kind, usb_info) = match info.port_type {
      SerialPortType::UsbPort(usb) => (PortKind::Usb, Some(usb.into())),
      SerialPortType::BluetoothPort => (PortKind::Bluetooth, None),
      SerialPortType::PciPort => (PortKind::Pci, None),
      SerialPortType::Unknown => (PortKind::Unknown, None),
    };
    Self {
      path: info.port_name,
      kind,
      usb_info,
    }
  }
}

impl AvailablePort {
  /// Opens this port on the host with the default configuration.
  pub fn open(&self) -> Result<ComPort, OpenError> {
    let mut port = ComPort::with_backend(Arc::new(SystemBackend), ComPortConfig::default());
    port.open(&self.path)?;
    Ok(port)
  }
}

/// Lists ports without probing, using the platform's enumeration API.
pub fn list_ports() -> Result<Vec<AvailablePort>, PortError> {
  let ports = serialport::available_ports()?;
  Ok(ports.into_iter().map(AvailablePort::from).collect())
}
