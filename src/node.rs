// Node.js bindings, built with the `node` feature

use napi::bindgen_prelude::Buffer;
use napi_derive::napi;

use crate::open_port::ComPort;
use crate::types::{ByteSize, Parity, Protocol, StopBits};

#[napi(js_name = "StopBits")]
pub enum JsStopBits {
  One,
  OneAndHalf,
  Two,
}

#[napi(js_name = "Parity")]
pub enum JsParity {
  None,
  Odd,
  Even,
  Mark,
  Space,
}

#[napi(object)]
pub struct ProtocolSettings {
  pub baud_rate: u32,
  /// 4 to 8
  pub byte_size: u32,
  pub stop_bits: JsStopBits,
  pub parity: JsParity,
}

#[napi(object)]
pub struct UsbInfo {
  pub vid: u16,
  pub pid: u16,
  pub serial: Option<String>,
  pub manufacturer: Option<String>,
  pub product: Option<String>,
}

#[napi(object)]
pub struct AvailablePort {
  pub path: String,
  #[napi(js_name = "type")]
  pub port_type: String,
  pub usb: Option<UsbInfo>,
}

fn to_napi(e: impl std::fmt::Display) -> napi::Error {
  napi::Error::from_reason(e.to_string())
}

fn protocol_from_settings(settings: &ProtocolSettings) -> napi::Result<Protocol> {
  let byte_size = u8::try_from(settings.byte_size)
    .map_err(|_| to_napi(format!("invalid byte size: {}", settings.byte_size)))
    .and_then(|bits| ByteSize::try_from(bits).map_err(to_napi))?;
  let stop_bits = match settings.stop_bits {
    JsStopBits::One => StopBits::One,
    JsStopBits::OneAndHalf => StopBits::OneAndHalf,
    JsStopBits::Two => StopBits::Two,
  };
  let parity = match settings.parity {
    JsParity::None => Parity::None,
    JsParity::Odd => Parity::Odd,
    JsParity::Even => Parity::Even,
    JsParity::Mark => Parity::Mark,
    JsParity::Space => Parity::Space,
  };
  Ok(Protocol::new(settings.baud_rate, byte_size, stop_bits, parity))
}

#[napi]
pub struct MiniComPort {
  port: ComPort,
}

impl Default for MiniComPort {
  fn default() -> Self {
    Self::new()
  }
}

#[napi]
impl MiniComPort {
  #[napi(constructor)]
  pub fn new() -> Self {
    Self {
      port: ComPort::new(),
    }
  }

  #[napi]
  pub fn open(&mut self, name: String) -> napi::Result<()> {
    self.port.open(&name).map_err(to_napi)
  }

  #[napi]
  pub fn set_protocol(&mut self, settings: ProtocolSettings) -> napi::Result<()> {
    let protocol = protocol_from_settings(&settings)?;
    self.port.set_protocol(&protocol).map_err(to_napi)
  }

  /// Number of bytes actually written, possibly fewer than `data.len()`.
  #[napi]
  pub fn transmit(&mut self, data: Buffer) -> napi::Result<u32> {
    let transfer = self.port.transmit(&data).map_err(to_napi)?;
    u32::try_from(transfer.count()).map_err(to_napi)
  }

  /// Whatever is already buffered, up to `capacity` bytes.
  #[napi]
  pub fn receive(&mut self, capacity: u32) -> napi::Result<Buffer> {
    let capacity = usize::try_from(capacity).map_err(to_napi)?;
    let bytes = self.port.receive(capacity).map_err(to_napi)?;
    Ok(Buffer::from(bytes))
  }

  #[napi]
  pub fn close(&mut self) -> napi::Result<()> {
    self.port.close().map_err(to_napi)
  }

  #[napi(getter)]
  pub fn is_open(&self) -> bool {
    self.port.is_open()
  }
}

/// Identifiers (1 to 256) of the ports that could be opened.
#[napi]
pub fn enumerate_com_ports() -> Vec<u32> {
  crate::ports::enumerate().iter().map(u32::from).collect()
}

#[napi]
pub fn list_ports() -> napi::Result<Vec<AvailablePort>> {
  let ports = crate::ports::list_ports().map_err(to_napi)?;

  Ok(
    ports
      .into_iter()
      .map(|p| AvailablePort {
        path: p.path,
        port_type: p.kind.to_string(),
        usb: p.usb_info.map(|usb| UsbInfo {
          vid: usb.vid,
          pid: usb.pid,
          serial: usb.serial,
          manufacturer: usb.manufacturer,
          product: usb.product,
        }),
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_handle_starts_closed() {
    let mut port = MiniComPort::default();
    assert!(!port.is_open());
    assert!(port.close().is_err());
  }

  #[test]
  fn settings_map_onto_protocol() {
    let settings = ProtocolSettings {
      baud_rate: 19200,
      byte_size: 7,
      stop_bits: JsStopBits::Two,
      parity: JsParity::Even,
    };
    assert_eq!(
      protocol_from_settings(&settings).unwrap(),
      Protocol::new(19200, ByteSize::Seven, StopBits::Two, Parity::Even)
    );
  }
}
