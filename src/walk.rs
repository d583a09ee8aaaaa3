// SPDX-License-Identifier: Apache-2.0

//! Software page walk

use crate::addr::EntrySlot;
use crate::entry::{Entry, PageTableLevel};
use crate::platform::Platform;

use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, VirtAddr};

/// The entry translating a virtual address
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Leaf {
    /// where the entry is stored
    pub slot: EntrySlot,
    /// the level of the table containing the entry
    pub level: PageTableLevel,
    /// the entry
    pub entry: Entry,
}

impl Leaf {
    /// The physical address `va` translates to
    #[allow(clippy::integer_arithmetic)]
    pub fn phys(&self, va: VirtAddr) -> PhysAddr {
        let offset = va.as_u64() & (self.level.entry_span() - 1);
        self.entry.target(self.level) + offset
    }
}

/// Find the leaf translating `va` in the hierarchy rooted at `root` of level `top`
///
/// Returns `None` if some entry on the way is not present.
pub fn find_leaf<P: Platform + ?Sized>(
    platform: &P,
    root: PhysAddr,
    top: PageTableLevel,
    va: VirtAddr,
) -> Option<Leaf> {
    let mut table = root;
    let mut level = top;

    loop {
        let slot = EntrySlot::in_table(table, level.index_of(va));
        let entry = platform.read_entry(slot);
        if !entry.is_present() {
            return None;
        }
        if entry.is_leaf(level) {
            return Some(Leaf { slot, level, entry });
        }
        table = entry.target(level);
        level = level.child()?;
    }
}

/// Translate `va` to its physical address and leaf flags
pub fn translate<P: Platform + ?Sized>(
    platform: &P,
    root: PhysAddr,
    top: PageTableLevel,
    va: VirtAddr,
) -> Option<(PhysAddr, PageTableFlags)> {
    find_leaf(platform, root, top, va).map(|leaf| (leaf.phys(va), leaf.entry.flags()))
}
