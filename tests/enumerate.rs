use std::sync::Arc;

use mini_com_port::{
  contains, enumerate_on, enumerate_with, ComPort, ComPortConfig, DeviceNamespace, PortSet,
  VirtualBackend,
};

fn windows_config() -> ComPortConfig {
  ComPortConfig {
    namespace: DeviceNamespace::windows(),
    ..Default::default()
  }
}

#[test]
fn reports_exactly_the_backed_identifiers() {
  let backend = VirtualBackend::new();
  let ns = DeviceNamespace::windows();
  let present = [1u16, 3, 9, 10, 128, 256];
  let lines: Vec<_> = present
    .iter()
    .map(|&id| backend.add_loopback(&ns.device_path(&ns.port_name(id))))
    .collect();

  let found = enumerate_on(&backend, &windows_config());

  for id in 1..=256u16 {
    assert_eq!(contains(&found, id), present.contains(&id), "port {id}");
  }
  assert_eq!(found.len(), present.len());
  // each probe released its device
  assert!(lines.iter().all(|line| !line.is_in_use()));
  assert!(lines.iter().all(|line| line.open_count() == 1));
}

#[test]
fn busy_port_reads_as_absent() {
  let backend = VirtualBackend::new();
  backend.add_loopback(r"\\.\COM2");
  backend.add_loopback(r"\\.\COM7");

  let mut owner = ComPort::with_backend(Arc::new(backend.clone()), windows_config());
  owner.open("COM2").unwrap();

  let found = enumerate_on(&backend, &windows_config());
  assert_eq!(found.iter().collect::<Vec<_>>(), vec![7]);

  owner.close().unwrap();
  let found = enumerate_on(&backend, &windows_config());
  assert_eq!(found.iter().collect::<Vec<_>>(), vec![2, 7]);
}

#[test]
fn rerun_sees_hot_plug_changes() {
  let backend = VirtualBackend::new();
  backend.add_loopback(r"\\.\COM4");
  assert!(enumerate_on(&backend, &windows_config()).contains(4));

  backend.remove(r"\\.\COM4");
  backend.add_loopback(r"\\.\COM5");
  let found = enumerate_on(&backend, &windows_config());
  assert!(!found.contains(4));
  assert!(found.contains(5));
}

#[test]
fn unix_namespace_maps_identifier_one_to_tty_s0() {
  let backend = VirtualBackend::new();
  backend.add_port("/dev/ttyS0");
  backend.add_port("/dev/ttyS15");

  let config = ComPortConfig {
    namespace: DeviceNamespace::unix(),
    ..Default::default()
  };
  let found = enumerate_on(&backend, &config);
  assert_eq!(found.iter().collect::<Vec<_>>(), vec![1, 16]);
}

#[test]
fn probe_range_limits_work() {
  let backend = VirtualBackend::new();
  let ns = DeviceNamespace::windows();
  let low = backend.add_loopback(&ns.device_path("COM1"));
  let high = backend.add_loopback(&ns.device_path("COM200"));

  let config = ComPortConfig {
    probe_first: 100,
    probe_last: 256,
    ..windows_config()
  };
  let found = enumerate_on(&backend, &config);
  assert_eq!(found.iter().collect::<Vec<_>>(), vec![200]);
  assert_eq!(low.open_count(), 0);
  assert_eq!(high.open_count(), 1);
}

#[test]
fn closure_prober() {
  let found: PortSet = enumerate_with(&|id: u16| id <= 2);
  assert_eq!(found.as_bytes()[0], 0b0000_0011);
  assert!(found.as_bytes()[1..].iter().all(|&b| b == 0));
}
