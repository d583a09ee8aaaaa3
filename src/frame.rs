// SPDX-License-Identifier: Apache-2.0

//! The frame descriptor table
//!
//! One [`FrameDescriptor`] per physical frame of the managed memory. It is the ground
//! truth the validator checks every page-table edit against.

use crate::enclave::EnclaveId;
use crate::entry::PageTableLevel;
use crate::error::Violation;
use crate::PAGE_SIZE;

use alloc::vec;
use alloc::vec::Vec;

use const_default::ConstDefault;
use x86_64::{PhysAddr, VirtAddr};

/// The maximum number of translations counted for one frame
pub const MAX_MAPPED_COUNT: u16 = (1 << 13) - 1;

/// What a physical frame is used for
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameKind {
    /// Not in use by anything the monitor knows of
    Unused,
    /// A page-table page of the given level
    PageTable(PageTableLevel),
    /// Kernel text
    KernelCode,
    /// Ordinary kernel or user data
    KernelData,
    /// Monitor code, data, stacks or the split pool
    MonitorPage,
    /// Private memory of an enclave
    EnclavePage,
}

impl ConstDefault for FrameKind {
    const DEFAULT: Self = Self::Unused;
}

impl Default for FrameKind {
    fn default() -> Self {
        <Self as ConstDefault>::DEFAULT
    }
}

impl FrameKind {
    /// The level, if this is a page-table page
    #[inline]
    pub fn level(self) -> Option<PageTableLevel> {
        match self {
            Self::PageTable(level) => Some(level),
            _ => None,
        }
    }

    /// Whether this is a page-table page
    #[inline]
    pub fn is_page_table(self) -> bool {
        self.level().is_some()
    }

    /// Whether this is a frame an ordinary leaf may map
    #[inline]
    pub fn is_frame(self) -> bool {
        matches!(
            self,
            Self::Unused | Self::KernelData | Self::KernelCode | Self::EnclavePage
        )
    }
}

/// The metadata of one physical frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameDescriptor {
    kind: FrameKind,
    mapped_count: u16,
    owner: Option<EnclaveId>,
    mapping_hint: Option<VirtAddr>,
}

impl ConstDefault for FrameDescriptor {
    const DEFAULT: Self = Self {
        kind: FrameKind::Unused,
        mapped_count: 0,
        owner: None,
        mapping_hint: None,
    };
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        <Self as ConstDefault>::DEFAULT
    }
}

impl FrameDescriptor {
    /// What the frame is used for
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// The number of valid translations referencing the frame
    #[inline]
    pub fn mapped_count(&self) -> u16 {
        self.mapped_count
    }

    /// The enclave the frame belongs to
    #[inline]
    pub fn owner(&self) -> Option<EnclaveId> {
        self.owner
    }

    /// The one virtual address a page-table page is mapped at
    #[inline]
    pub fn mapping_hint(&self) -> Option<VirtAddr> {
        self.mapping_hint
    }
}

/// The descriptors of all managed frames, indexed by frame number
pub struct FrameTable {
    descriptors: Vec<FrameDescriptor>,
}

impl FrameTable {
    /// Create a table of unused descriptors covering `managed_memory` bytes
    pub fn new(managed_memory: u64) -> Self {
        let frames = (managed_memory / PAGE_SIZE) as usize;
        Self {
            descriptors: vec![FrameDescriptor::DEFAULT; frames],
        }
    }

    /// The number of managed frames
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no frame is managed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Whether `pa` has a descriptor
    #[inline]
    pub fn is_managed(&self, pa: PhysAddr) -> bool {
        self.index(pa).is_some()
    }

    #[inline]
    fn index(&self, pa: PhysAddr) -> Option<usize> {
        let index = (pa.as_u64() / PAGE_SIZE) as usize;
        (index < self.descriptors.len()).then(|| index)
    }

    /// The descriptor of the frame containing `pa`
    ///
    /// Returns `None` for addresses outside the managed memory.
    #[inline]
    pub fn lookup(&self, pa: PhysAddr) -> Option<&FrameDescriptor> {
        self.index(pa).map(|index| &self.descriptors[index])
    }

    #[inline]
    fn lookup_mut(&mut self, pa: PhysAddr) -> Option<&mut FrameDescriptor> {
        self.index(pa).map(move |index| &mut self.descriptors[index])
    }

    /// The kind of the frame containing `pa`
    #[inline]
    pub fn kind(&self, pa: PhysAddr) -> Option<FrameKind> {
        self.lookup(pa).map(FrameDescriptor::kind)
    }

    /// The owner of the frame containing `pa`
    #[inline]
    pub fn owner(&self, pa: PhysAddr) -> Option<EnclaveId> {
        self.lookup(pa).and_then(FrameDescriptor::owner)
    }

    /// Count one more valid translation of `pa`
    ///
    /// An unused frame becomes kernel data. Frames outside the managed memory are not
    /// counted.
    pub fn increment_use(&mut self, pa: PhysAddr) -> Result<(), Violation> {
        let frame = pa.align_down(PAGE_SIZE);
        if let Some(desc) = self.lookup_mut(pa) {
            if desc.mapped_count >= MAX_MAPPED_COUNT {
                return Err(Violation::CountOverflow { frame });
            }
            desc.mapped_count += 1;
            if desc.kind == FrameKind::Unused {
                desc.kind = FrameKind::KernelData;
            }
        }
        Ok(())
    }

    /// Count one valid translation of `pa` less
    ///
    /// A kernel data frame losing its last translation becomes unused again.
    pub fn decrement_use(&mut self, pa: PhysAddr) -> Result<(), Violation> {
        let frame = pa.align_down(PAGE_SIZE);
        if let Some(desc) = self.lookup_mut(pa) {
            desc.mapped_count = desc
                .mapped_count
                .checked_sub(1)
                .ok_or(Violation::CountUnderflow { frame })?;
            if desc.mapped_count == 0 && desc.kind == FrameKind::KernelData {
                *desc = FrameDescriptor::DEFAULT;
            }
        }
        Ok(())
    }

    /// Change what the frame containing `pa` is used for
    ///
    /// Monitor pages and enclave pages never turn into each other directly.
    pub fn retype(&mut self, pa: PhysAddr, kind: FrameKind) -> Result<(), Violation> {
        let frame = pa.align_down(PAGE_SIZE);
        if let Some(desc) = self.lookup_mut(pa) {
            match (desc.kind, kind) {
                (FrameKind::MonitorPage, FrameKind::EnclavePage)
                | (FrameKind::EnclavePage, FrameKind::MonitorPage) => {
                    return Err(Violation::BadRetype {
                        frame,
                        from: desc.kind,
                        to: kind,
                    })
                }
                (_, FrameKind::MonitorPage) => desc.owner = None,
                _ => (),
            }
            desc.kind = kind;
            if kind.is_page_table() {
                desc.mapping_hint = None;
            }
        }
        Ok(())
    }

    /// Drop everything known about the frame except its live translations
    ///
    /// A frame that is still mapped (e.g. by the direct map) stays kernel data.
    pub fn release(&mut self, pa: PhysAddr) {
        if let Some(desc) = self.lookup_mut(pa) {
            let mapped_count = desc.mapped_count;
            *desc = FrameDescriptor {
                kind: if mapped_count > 0 {
                    FrameKind::KernelData
                } else {
                    FrameKind::Unused
                },
                mapped_count,
                ..FrameDescriptor::DEFAULT
            };
        }
    }

    /// Attach the frame containing `pa` to an enclave
    pub fn set_owner(&mut self, pa: PhysAddr, owner: EnclaveId) -> Result<(), Violation> {
        let frame = pa.align_down(PAGE_SIZE);
        if let Some(desc) = self.lookup_mut(pa) {
            if desc.kind == FrameKind::MonitorPage {
                return Err(Violation::MonitorOwnership { frame });
            }
            desc.owner = Some(owner);
        }
        Ok(())
    }

    /// Record the virtual address a page-table page is mapped at
    pub fn set_mapping_hint(&mut self, pa: PhysAddr, va: VirtAddr) {
        if let Some(desc) = self.lookup_mut(pa) {
            desc.mapping_hint = Some(va);
        }
    }

    /// All managed frames with their descriptors
    pub fn iter(&self) -> impl Iterator<Item = (PhysAddr, &FrameDescriptor)> + '_ {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, desc)| (PhysAddr::new(index as u64 * PAGE_SIZE), desc))
    }

    /// The sum of all reference counts
    pub fn total_mapped(&self) -> u64 {
        self.descriptors
            .iter()
            .map(|desc| u64::from(desc.mapped_count))
            .sum()
    }
}
