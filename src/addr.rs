// SPDX-License-Identifier: Apache-2.0

//! Some basic address operations

use crate::{ENTRIES_PER_TABLE, PAGE_SIZE};

use core::fmt;
use core::mem::size_of;

use x86_64::{align_up, PhysAddr, VirtAddr};

/// The default offset of the kernel's direct map
///
/// physical address + `DIRECT_MAP_OFFSET` = direct map virtual address
pub const DIRECT_MAP_OFFSET: u64 = 0xFFFF_FE00_0000_0000;

/// Translation between physical addresses and their direct map alias
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DirectMap {
    offset: u64,
}

impl DirectMap {
    /// Create a direct map starting at `offset`
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// The direct map alias of `pa`
    #[inline]
    pub fn to_virt(&self, pa: PhysAddr) -> VirtAddr {
        VirtAddr::new_truncate(self.offset.wrapping_add(pa.as_u64()))
    }
}

impl Default for DirectMap {
    fn default() -> Self {
        Self::new(DIRECT_MAP_OFFSET)
    }
}

/// The physical address of one page-table entry
///
/// This is the identity of a slot the host asks the monitor to write. The page frame
/// containing the slot is the page-table page whose descriptor governs the write.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntrySlot(PhysAddr);

impl EntrySlot {
    /// Create a slot from its physical address
    ///
    /// Returns `None` if the address is not aligned to an entry.
    pub fn new(pa: PhysAddr) -> Option<Self> {
        pa.is_aligned(size_of::<u64>() as u64).then(|| Self(pa))
    }

    /// Create a slot from the frame of its page-table page and the index within
    #[allow(clippy::integer_arithmetic)]
    pub fn in_table(table: PhysAddr, index: usize) -> Self {
        debug_assert!(index < ENTRIES_PER_TABLE);
        let table = table.align_down(PAGE_SIZE);
        Self(table + (index * size_of::<u64>()) as u64)
    }

    /// The physical address of the slot
    #[inline]
    pub fn addr(&self) -> PhysAddr {
        self.0
    }

    /// The page-table page containing the slot
    #[inline]
    pub fn table(&self) -> PhysAddr {
        self.0.align_down(PAGE_SIZE)
    }

    /// The index of the slot within its page-table page
    #[inline]
    #[allow(clippy::integer_arithmetic)]
    pub fn index(&self) -> usize {
        ((self.0.as_u64() - self.table().as_u64()) as usize) / size_of::<u64>()
    }
}

impl fmt::Debug for EntrySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntrySlot({:#x})", self.0.as_u64())
    }
}

/// Round `addr` up to the next page boundary
#[inline]
pub fn page_round_up(addr: u64) -> u64 {
    align_up(addr, PAGE_SIZE)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_direct_map() {
        let direct_map = DirectMap::default();
        let va = direct_map.to_virt(PhysAddr::new(0x1234_5000));
        assert_eq!(va.as_u64(), 0xFFFF_FE00_1234_5000);
    }

    #[test]
    fn test_entry_slot() {
        let slot = EntrySlot::in_table(PhysAddr::new(0x5000), 3);
        assert_eq!(slot.addr(), PhysAddr::new(0x5018));
        assert_eq!(slot.table(), PhysAddr::new(0x5000));
        assert_eq!(slot.index(), 3);

        assert!(EntrySlot::new(PhysAddr::new(0x5004)).is_none());
        assert_eq!(EntrySlot::new(PhysAddr::new(0x5ff8)).map(|s| s.index()), Some(511));
    }

    #[test]
    fn test_page_rounding() {
        assert_eq!(page_round_up(0x1001), 0x2000);
        assert_eq!(page_round_up(0x2000), 0x2000);
    }
}
