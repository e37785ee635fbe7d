// Library entry: re-export modules and public items

pub mod backend;
pub mod config;
pub mod error;
pub mod open_port;
pub mod port_set;
pub mod ports;
pub mod types;
pub mod virtual_port;

#[cfg(feature = "node")]
pub mod node;

pub use backend::{Backend, Device, SystemBackend};
pub use config::{ComPortConfig, DeviceNamespace};
pub use error::{ConfigError, OpenError, PortError, Result, TransferError};
pub use open_port::{ComPort, PortState};
pub use port_set::{contains, PortSet};
pub use ports::{
  enumerate, enumerate_on, enumerate_with, list_ports, AvailablePort, PortKind, Prober, UsbInfo,
};
pub use types::{ByteSize, ControlBlock, FlowControl, Parity, Protocol, StopBits, Timeouts, Transfer};
pub use virtual_port::VirtualBackend;
