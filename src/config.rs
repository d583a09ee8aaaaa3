// SPDX-License-Identifier: Apache-2.0

//! Monitor configuration

use crate::addr::{DirectMap, DIRECT_MAP_OFFSET};
use crate::entry::{PageTableLevel, ProtectionMode};
use crate::{
    DEFAULT_MANAGED_MEMORY, GATE_STACK_SIZE, MAX_NUM_CPUS, MAX_PROCESSES, PAGE_SIZE,
    SYSCALL_STACK_SIZE,
};

use const_default::ConstDefault;
use lset::Line;
use x86_64::VirtAddr;

/// The start of the monitor's secure memory region
pub const SECURE_MEMORY_START: u64 = 0xFFFF_FF00_0000_0000;

/// The default base of the per-CPU call gate stacks
pub const GATE_STACK_BASE: u64 = SECURE_MEMORY_START;

/// The default top of the syscall secure stack of CPU 0
pub const SYSCALL_STACK_BASE: u64 = SECURE_MEMORY_START + 0x10_0000;

/// The depth of the page-table hierarchy
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PagingMode {
    /// 4-level paging, the root is an L4 table
    FourLevel,
    /// 5-level paging, the root is an L5 table
    FiveLevel,
}

impl PagingMode {
    /// The level of the root table
    pub fn top_level(self) -> PageTableLevel {
        match self {
            Self::FourLevel => PageTableLevel::L4,
            Self::FiveLevel => PageTableLevel::L5,
        }
    }
}

/// The syscall entry points the monitor switches between
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyscallEntries {
    /// entry for ordinary processes
    pub native: VirtAddr,
    /// entry for active enclaves
    pub enclave: VirtAddr,
}

/// Run-time parameters of the monitor
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MonitorConfig {
    /// bytes of physical memory covered by frame descriptors, starting at 0
    pub managed_memory: u64,
    /// number of process slots in the enclave registry
    pub max_processes: usize,
    /// number of CPUs with secure stacks
    pub max_cpus: usize,
    /// depth of the page-table hierarchy
    pub paging: PagingMode,
    /// the protection mechanism
    pub protection: ProtectionMode,
    /// where the kernel maps all physical memory
    pub direct_map: DirectMap,
    /// lowest address of the call gate stacks
    pub gate_stack_base: VirtAddr,
    /// top of the syscall secure stack of CPU 0
    pub syscall_stack_base: VirtAddr,
    /// syscall entry points, if the monitor switches them
    pub syscall_entries: Option<SyscallEntries>,
}

impl ConstDefault for MonitorConfig {
    const DEFAULT: Self = Self {
        managed_memory: DEFAULT_MANAGED_MEMORY,
        max_processes: MAX_PROCESSES,
        max_cpus: MAX_NUM_CPUS,
        paging: PagingMode::FiveLevel,
        protection: ProtectionMode::configured(),
        direct_map: DirectMap::new(DIRECT_MAP_OFFSET),
        gate_stack_base: VirtAddr::new_truncate(GATE_STACK_BASE),
        syscall_stack_base: VirtAddr::new_truncate(SYSCALL_STACK_BASE),
        syscall_entries: None,
    };
}

impl Default for MonitorConfig {
    fn default() -> Self {
        <Self as ConstDefault>::DEFAULT
    }
}

impl MonitorConfig {
    /// The level of the root table
    #[inline]
    pub fn top_level(&self) -> PageTableLevel {
        self.paging.top_level()
    }

    /// The initial stack pointer of the call gate on `cpu`
    #[allow(clippy::integer_arithmetic)]
    pub fn gate_stack_top(&self, cpu: usize) -> VirtAddr {
        self.gate_stack_base + (cpu as u64 + 1) * GATE_STACK_SIZE
    }

    /// The top of the syscall secure stack of `cpu`
    #[allow(clippy::integer_arithmetic)]
    pub fn syscall_stack_top(&self, cpu: usize) -> VirtAddr {
        self.syscall_stack_base + cpu as u64 * SYSCALL_STACK_SIZE
    }
}

/// The virtual ranges the monitor protects at initialization
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    /// kernel text
    pub kernel_text: Line<u64>,
    /// monitor code and data
    pub monitor: Line<u64>,
    /// frames reserved for splitting large pages
    pub split_pool: Line<u64>,
}

impl MemoryLayout {
    /// The start address of every page in `range`
    pub fn pages(range: &Line<u64>) -> impl Iterator<Item = VirtAddr> {
        let start = range.start;
        let end = range.end;
        (start..end)
            .step_by(PAGE_SIZE as usize)
            .map(VirtAddr::new_truncate)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stacks() {
        let config = MonitorConfig::DEFAULT;
        assert_eq!(config.top_level(), PageTableLevel::L5);
        assert_eq!(
            config.gate_stack_top(0).as_u64(),
            GATE_STACK_BASE + GATE_STACK_SIZE
        );
        assert_eq!(
            config.gate_stack_top(2).as_u64() - config.gate_stack_top(1).as_u64(),
            GATE_STACK_SIZE
        );
        assert_eq!(config.syscall_stack_top(3).as_u64(), SYSCALL_STACK_BASE + 0x3000);
    }

    #[test]
    fn test_layout_pages() {
        let range = Line::new(0x40_0000, 0x40_3000);
        let pages: Vec<_> = MemoryLayout::pages(&range).map(|va| va.as_u64()).collect();
        assert_eq!(pages, [0x40_0000, 0x40_1000, 0x40_2000]);
    }
}
