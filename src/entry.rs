// SPDX-License-Identifier: Apache-2.0

//! Page-table entry encoding
//!
//! Every raw bit mask of an x86_64 page-table entry the monitor cares about is decoded
//! here. The rest of the crate works with [`Entry`], [`PageTableLevel`] and
//! [`ProtectionMode`].

use crate::{ENTRIES_PER_TABLE, PAGE_SIZE};

use core::fmt;

use cfg_if::cfg_if;
use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, VirtAddr};

/// Physical address bits of a 4 KiB leaf or of a table link
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Physical address bits of a 2 MiB leaf
const HUGE_2MIB_ADDR_MASK: u64 = 0x000F_FFFF_FFE0_0000;

/// Physical address bits of a 1 GiB leaf
const HUGE_1GIB_ADDR_MASK: u64 = 0x000F_FFFF_C000_0000;

/// The PAT bit of a huge leaf
const HUGE_PAT: u64 = 1 << 12;

/// The PAT bit of a 4 KiB leaf
const SMALL_PAT: u64 = 1 << 7;

/// The protection key field of a leaf
const PKEY_SHIFT: u64 = 59;
const PKEY_MASK: u64 = 0xF << PKEY_SHIFT;

/// The protection key the monitor tags its protected pages with
pub const MONITOR_PKEY: u8 = 1;

cfg_if! {
    if #[cfg(feature = "write-protect")] {
        const CONFIGURED_MODE: ProtectionMode = ProtectionMode::WriteDeny;
    } else {
        const CONFIGURED_MODE: ProtectionMode = ProtectionMode::Key(MONITOR_PKEY);
    }
}

/// The level of a page-table page
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum PageTableLevel {
    /// Holds 4 KiB leaves
    L1 = 1,
    /// Holds links to L1 tables or 2 MiB leaves
    L2 = 2,
    /// Holds links to L2 tables or 1 GiB leaves
    L3 = 3,
    /// Holds links to L3 tables
    L4 = 4,
    /// Holds links to L4 tables
    L5 = 5,
}

impl PageTableLevel {
    /// The numeric level
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The level of the tables this level links to
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::L1 => None,
            Self::L2 => Some(Self::L1),
            Self::L3 => Some(Self::L2),
            Self::L4 => Some(Self::L3),
            Self::L5 => Some(Self::L4),
        }
    }

    /// Whether an entry at this level may map a huge leaf
    pub const fn allows_huge(self) -> bool {
        matches!(self, Self::L2 | Self::L3)
    }

    /// The number of bytes one entry at this level spans
    #[allow(clippy::integer_arithmetic)]
    pub const fn entry_span(self) -> u64 {
        PAGE_SIZE << (9 * (self as u64 - 1))
    }

    /// The index of the entry translating `va` in a table of this level
    #[allow(clippy::integer_arithmetic)]
    pub fn index_of(self, va: VirtAddr) -> usize {
        let shift = 12 + 9 * (self as u64 - 1);
        ((va.as_u64() >> shift) as usize) % ENTRIES_PER_TABLE
    }
}

impl fmt::Display for PageTableLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

/// The hardware mechanism used to deny the kernel write access to protected pages
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProtectionMode {
    /// Tag the leaf with a supervisor protection key
    Key(u8),
    /// Clear the read/write bit of the leaf
    WriteDeny,
}

impl ProtectionMode {
    /// The mechanism this build was configured with
    pub const fn configured() -> Self {
        CONFIGURED_MODE
    }
}

impl Default for ProtectionMode {
    fn default() -> Self {
        Self::configured()
    }
}

/// A raw page-table entry
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Entry(u64);

impl Entry {
    /// The empty entry
    pub const ZERO: Entry = Entry(0);

    /// Wrap a raw entry value
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Create an entry pointing at `addr` with `flags`
    #[inline]
    pub fn from_parts(addr: PhysAddr, flags: PageTableFlags) -> Self {
        Self((addr.as_u64() & ADDR_MASK) | flags.bits())
    }

    /// Create the link of a freshly split table, inheriting user access from `leaf`
    pub fn table_link(table: PhysAddr, leaf: Entry) -> Self {
        let mut flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::ACCESSED
            | PageTableFlags::DIRTY;
        if leaf.is_user() {
            flags |= PageTableFlags::USER_ACCESSIBLE;
        }
        Self::from_parts(table, flags)
    }

    /// The raw entry value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The flag bits
    #[inline]
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    /// Whether the entry is valid
    #[inline]
    pub fn is_present(self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }

    /// Whether the entry permits writes
    #[inline]
    pub fn is_writable(self) -> bool {
        self.flags().contains(PageTableFlags::WRITABLE)
    }

    /// Whether the entry permits user-mode access
    #[inline]
    pub fn is_user(self) -> bool {
        self.flags().contains(PageTableFlags::USER_ACCESSIBLE)
    }

    /// Whether the huge page bit is set
    ///
    /// Only meaningful for entries of tables that allow huge leaves.
    #[inline]
    pub fn is_huge(self) -> bool {
        self.flags().contains(PageTableFlags::HUGE_PAGE)
    }

    /// Whether instruction fetches are denied
    #[inline]
    pub fn is_no_execute(self) -> bool {
        self.flags().contains(PageTableFlags::NO_EXECUTE)
    }

    /// Whether this entry, stored in a table of `level`, maps a leaf
    #[inline]
    pub fn is_leaf(self, level: PageTableLevel) -> bool {
        level == PageTableLevel::L1 || (level.allows_huge() && self.is_huge())
    }

    /// The physical address this entry, stored in a table of `level`, points at
    ///
    /// For a huge leaf this is the first frame of the large page.
    pub fn target(self, level: PageTableLevel) -> PhysAddr {
        let mask = match level {
            PageTableLevel::L2 if self.is_huge() => HUGE_2MIB_ADDR_MASK,
            PageTableLevel::L3 if self.is_huge() => HUGE_1GIB_ADDR_MASK,
            _ => ADDR_MASK,
        };
        PhysAddr::new(self.0 & mask)
    }

    /// The protection key of the leaf
    #[inline]
    pub fn pkey(self) -> u8 {
        ((self.0 & PKEY_MASK) >> PKEY_SHIFT) as u8
    }

    /// Whether the leaf carries the protection of `mode`
    pub fn is_protected(self, mode: ProtectionMode) -> bool {
        match mode {
            ProtectionMode::Key(key) => self.pkey() == key,
            ProtectionMode::WriteDeny => !self.is_writable(),
        }
    }

    /// The leaf with the protection of `mode` applied or removed
    pub fn with_protection(self, mode: ProtectionMode, protect: bool) -> Self {
        match (mode, protect) {
            (ProtectionMode::Key(key), true) => {
                Self((self.0 & !PKEY_MASK) | ((u64::from(key) << PKEY_SHIFT) & PKEY_MASK))
            }
            (ProtectionMode::Key(_), false) => Self(self.0 & !PKEY_MASK),
            (ProtectionMode::WriteDeny, true) => self.read_only(),
            (ProtectionMode::WriteDeny, false) => {
                Self(self.0 | PageTableFlags::WRITABLE.bits())
            }
        }
    }

    /// The entry with write access removed
    #[inline]
    pub fn read_only(self) -> Self {
        Self(self.0 & !PageTableFlags::WRITABLE.bits())
    }

    /// The `index`th entry of the table replacing this huge leaf of `level`
    ///
    /// Splitting a 1 GiB leaf yields 2 MiB leaves, splitting a 2 MiB leaf yields 4 KiB
    /// leaves. All flags are kept; the PAT bit moves to its 4 KiB position when needed.
    #[allow(clippy::integer_arithmetic)]
    pub fn split(self, level: PageTableLevel, index: usize) -> Option<Self> {
        if !level.allows_huge() || !self.is_huge() || index >= ENTRIES_PER_TABLE {
            return None;
        }
        let child = level.child()?;
        let base = self.target(level).as_u64() + child.entry_span() * index as u64;
        let flags = self.0 & !ADDR_MASK;

        let raw = if child == PageTableLevel::L1 {
            let pat = if self.0 & HUGE_PAT != 0 { SMALL_PAT } else { 0 };
            (flags & !PageTableFlags::HUGE_PAGE.bits()) | pat | base
        } else {
            flags | (self.0 & HUGE_PAT) | base
        };
        Some(Self(raw))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("raw", &format_args!("{:#018x}", self.0))
            .field("flags", &self.flags())
            .finish()
    }
}

impl fmt::LowerHex for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
