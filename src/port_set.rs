use std::fmt;

use bitvec::prelude::*;

use crate::config::{FIRST_PORT_ID, LAST_PORT_ID};

/// Set of port identifiers in `1..=256`, one bit each.
///
/// Identifier `id` lives at bit `id - 1`, least significant bit first within
/// each byte, so `as_bytes()[0] & 1` is port 1.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PortSet {
  bits: BitArray<[u8; 32], Lsb0>,
}

impl PortSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self {
      bits: BitArray::new(bytes),
    }
  }

  pub fn as_bytes(&self) -> [u8; 32] {
    self.bits.into_inner()
  }

  fn index(id: u16) -> Option<usize> {
    (FIRST_PORT_ID..=LAST_PORT_ID)
      .contains(&id)
      .then(|| usize::from(id - FIRST_PORT_ID))
  }

  /// Returns `false` when `id` is outside the representable range.
  pub fn insert(&mut self, id: u16) -> bool {
    match Self::index(id) {
      Some(i) => {
        self.bits.set(i, true);
        true
      }
      None => false,
    }
  }

  pub fn remove(&mut self, id: u16) {
    if let Some(i) = Self::index(id) {
      self.bits.set(i, false);
    }
  }

  pub fn contains(&self, id: u16) -> bool {
    Self::index(id).is_some_and(|i| self.bits[i])
  }

  pub fn len(&self) -> usize {
    self.bits.count_ones()
  }

  pub fn is_empty(&self) -> bool {
    self.bits.not_any()
  }

  /// Member identifiers in ascending order.
  pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
    self
      .bits
      .iter_ones()
      .filter_map(|i| u16::try_from(i).ok())
      .map(|i| i + FIRST_PORT_ID)
  }
}

/// Membership test, equivalent to `set.contains(id)`.
pub fn contains(set: &PortSet, id: u16) -> bool {
  set.contains(id)
}

impl FromIterator<u16> for PortSet {
  fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
    let mut set = PortSet::new();
    for id in iter {
      set.insert(id);
    }
    set
  }
}

impl fmt::Debug for PortSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test]
  fn empty_by_default() {
    let set = PortSet::new();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    assert!((0..=300).all(|id| !set.contains(id)));
  }

  #[test_case(1, 0, 0x01 ; "first")]
  #[test_case(8, 0, 0x80 ; "end of first byte")]
  #[test_case(9, 1, 0x01 ; "second byte")]
  #[test_case(256, 31, 0x80 ; "last")]
  fn bit_layout(id: u16, byte: usize, mask: u8) {
    let set: PortSet = [id].into_iter().collect();
    let bytes = set.as_bytes();
    assert_eq!(bytes[byte], mask);
    assert_eq!(bytes.iter().map(|b| b.count_ones()).sum::<u32>(), 1);
    assert!(contains(&set, id));
  }

  #[test]
  fn out_of_range_ids_are_never_members() {
    let mut set = PortSet::new();
    assert!(!set.insert(0));
    assert!(!set.insert(257));
    assert!(set.is_empty());
    assert!(!set.contains(0));
    assert!(!set.contains(u16::MAX));
  }

  #[test]
  fn iterates_ascending() {
    let set: PortSet = [200, 3, 17, 3, 1].into_iter().collect();
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 17, 200]);
    assert_eq!(set.len(), 4);
    assert_eq!(format!("{set:?}"), "{1, 3, 17, 200}");
  }

  #[test]
  fn remove_and_bytes() {
    let mut set: PortSet = [5, 6].into_iter().collect();
    set.remove(5);
    set.remove(400);
    assert!(!set.contains(5));
    assert!(set.contains(6));

    let copy = PortSet::from_bytes(set.as_bytes());
    assert_eq!(copy, set);
  }
}
