// SPDX-License-Identifier: Apache-2.0

//! The protection enforcer
//!
//! Applies or removes the monitor's write denial on the leaf translating one virtual
//! address. A huge leaf covering the address is split first, with page-table frames taken
//! from a pool reserved at initialization.

use crate::addr::EntrySlot;
use crate::entry::{Entry, PageTableLevel, ProtectionMode};
use crate::error::{Error, Failure};
use crate::frame::{FrameKind, FrameTable};
use crate::platform::Platform;
use crate::walk::{find_leaf, Leaf};
use crate::ENTRIES_PER_TABLE;

use alloc::vec::Vec;

use log::debug;
use x86_64::{PhysAddr, VirtAddr};

/// Page-table frames reserved for splitting huge pages
///
/// Frames are handed out in order and never returned.
#[derive(Debug, Default)]
pub struct SplitPool {
    frames: Vec<PhysAddr>,
    next: usize,
}

impl SplitPool {
    /// Create a pool from the reserved frames
    pub fn new(frames: Vec<PhysAddr>) -> Self {
        Self { frames, next: 0 }
    }

    /// The number of frames not handed out yet
    #[allow(clippy::integer_arithmetic)]
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.next
    }

    /// Take the next frame
    pub fn take(&mut self) -> Result<PhysAddr, Error> {
        let frame = *self
            .frames
            .get(self.next)
            .ok_or(Error::SplitPoolExhausted)?;
        self.next = self.next.saturating_add(1);
        Ok(frame)
    }
}

/// The state the enforcer works on
pub struct Enforcer<'a, P: Platform + ?Sized> {
    /// the platform
    pub platform: &'a P,
    /// the frame descriptors
    pub frames: &'a mut FrameTable,
    /// the reserved split frames
    pub pool: &'a mut SplitPool,
    /// the protection mechanism
    pub mode: ProtectionMode,
    /// the root table to walk
    pub root: PhysAddr,
    /// the level of `root`
    pub top: PageTableLevel,
}

impl<'a, P: Platform + ?Sized> Enforcer<'a, P> {
    /// Bring the leaf translating `va` into the requested protection state
    ///
    /// Does nothing, and in particular splits nothing, if the leaf already is in that state.
    pub fn set_protection(&mut self, va: VirtAddr, protect: bool) -> Result<(), Failure> {
        let mut leaf =
            find_leaf(self.platform, self.root, self.top, va).ok_or(Error::NotMapped(va))?;
        if leaf.entry.is_protected(self.mode) == protect {
            return Ok(());
        }

        while leaf.level != PageTableLevel::L1 {
            leaf = self.split(leaf, va)?;
        }

        self.platform
            .write_entry(leaf.slot, leaf.entry.with_protection(self.mode, protect));
        self.platform.flush_tlb(Some(va));
        Ok(())
    }

    /// Replace the huge leaf `leaf` by a table of smaller leaves
    ///
    /// Returns the new leaf translating `va`.
    fn split(&mut self, leaf: Leaf, va: VirtAddr) -> Result<Leaf, Failure> {
        let child = leaf.level.child().ok_or(Error::NotMapped(va))?;
        let table = self.pool.take()?;
        debug!(
            "splitting {} leaf {:#x} at {:?} into {:#x}",
            leaf.level,
            leaf.entry,
            leaf.slot,
            table.as_u64()
        );

        let mut found = None;
        for index in 0..ENTRIES_PER_TABLE {
            let entry = leaf.entry.split(leaf.level, index).unwrap_or(Entry::ZERO);
            let slot = EntrySlot::in_table(table, index);
            self.platform.write_entry(slot, entry);
            self.frames.increment_use(entry.target(child))?;
            if index == child.index_of(va) {
                found = Some(Leaf {
                    slot,
                    level: child,
                    entry,
                });
            }
        }
        self.frames.decrement_use(leaf.entry.target(leaf.level))?;

        self.frames.retype(table, FrameKind::PageTable(child))?;
        self.frames.increment_use(table)?;

        let container = leaf.slot.table();
        if self.frames.kind(container) != Some(FrameKind::PageTable(leaf.level)) {
            self.frames
                .retype(container, FrameKind::PageTable(leaf.level))?;
        }
        self.platform
            .write_entry(leaf.slot, Entry::table_link(table, leaf.entry));
        self.platform.flush_tlb(Some(va));

        found.ok_or_else(|| Error::NotMapped(va).into())
    }
}
