// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use lset::Line;
use mmu_monitor::addr::{EntrySlot, DIRECT_MAP_OFFSET};
use mmu_monitor::control::ControlRegister;
use mmu_monitor::entry::{Entry, PageTableLevel};
use mmu_monitor::walk::find_leaf;
use mmu_monitor::{MemoryLayout, Monitor, MonitorConfig, Platform, Violation};
use x86_64::{PhysAddr, VirtAddr};

pub const MANAGED_MEMORY: u64 = 64 << 20;

/// Root of the boot page tables, further boot tables follow it
pub const KERNEL_ROOT: u64 = 0x60_0000;

pub const TEXT_VA: u64 = 0xFFFF_FFFF_8000_0000;
pub const TEXT_PA: u64 = 0x20_0000;
pub const TEXT_PAGES: u64 = 4;

pub const MONITOR_VA: u64 = 0xFFFF_FFFF_8010_0000;
pub const MONITOR_PA: u64 = 0x30_0000;
pub const MONITOR_PAGES: u64 = 4;

pub const POOL_VA: u64 = 0xFFFF_FFFF_8020_0000;
pub const POOL_PA: u64 = 0x40_0000;
pub const POOL_PAGES: u64 = 16;

pub const PRESENT: u64 = 1 << 0;
pub const WRITABLE: u64 = 1 << 1;
pub const USER: u64 = 1 << 2;
pub const ACCESSED: u64 = 1 << 5;
pub const DIRTY: u64 = 1 << 6;
pub const HUGE: u64 = 1 << 7;
pub const NO_EXECUTE: u64 = 1 << 63;

pub const KERNEL_RW: u64 = PRESENT | WRITABLE | ACCESSED | DIRTY | NO_EXECUTE;
pub const KERNEL_RX: u64 = PRESENT | ACCESSED;
pub const USER_RW: u64 = PRESENT | WRITABLE | USER | ACCESSED | DIRTY;
pub const TABLE_LINK: u64 = PRESENT | WRITABLE | USER | ACCESSED | DIRTY;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pa(addr: u64) -> PhysAddr {
    PhysAddr::new(addr)
}

pub fn va(addr: u64) -> VirtAddr {
    VirtAddr::new(addr)
}

pub fn slot(table: u64, index: usize) -> EntrySlot {
    EntrySlot::in_table(pa(table), index)
}

pub fn alias(frame: u64) -> VirtAddr {
    VirtAddr::new_truncate(DIRECT_MAP_OFFSET + frame)
}

/// An in-memory machine
///
/// Physical memory only holds the page-table entries ever written, keyed by their address.
pub struct TestPlatform {
    pub memory: RefCell<BTreeMap<u64, u64>>,
    pub root: Cell<PhysAddr>,
    pub next_table: Cell<u64>,
    pub pid: Cell<usize>,
    pub cpu: Cell<usize>,
    pub interrupts: Cell<bool>,
    pub cr0: Cell<u64>,
    pub cr4: Cell<u64>,
    pub msrs: RefCell<BTreeMap<u32, u64>>,
    pub flushes: RefCell<Vec<Option<VirtAddr>>>,
    pub zeroed: RefCell<Vec<PhysAddr>>,
    pub stacks: RefCell<Vec<VirtAddr>>,
    /// interrupt flag, PKRS and CR0 seen by every monitor body
    pub inside: RefCell<Vec<(bool, u64, u64)>>,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            memory: RefCell::new(BTreeMap::new()),
            root: Cell::new(pa(KERNEL_ROOT)),
            next_table: Cell::new(KERNEL_ROOT + 0x1000),
            pid: Cell::new(1),
            cpu: Cell::new(0),
            interrupts: Cell::new(true),
            cr0: Cell::new(0x8005_0033),
            cr4: Cell::new(0x0030_06f0),
            msrs: RefCell::new(BTreeMap::new()),
            flushes: RefCell::new(Vec::new()),
            zeroed: RefCell::new(Vec::new()),
            stacks: RefCell::new(Vec::new()),
            inside: RefCell::new(Vec::new()),
        }
    }

    pub fn entry(&self, table: u64, index: usize) -> Entry {
        self.read_entry(slot(table, index))
    }

    pub fn set_entry(&self, table: u64, index: usize, raw: u64) {
        self.write_entry(slot(table, index), Entry::new(raw));
    }

    fn alloc_table(&self) -> u64 {
        let table = self.next_table.get();
        self.next_table.set(table + 0x1000);
        table
    }

    /// Map `va` with the raw `leaf` stored in a table of `level`, creating tables on the way
    pub fn map(&self, va: VirtAddr, leaf: u64, level: PageTableLevel) {
        let mut table = self.root.get().as_u64();
        let mut current = PageTableLevel::L5;
        while current != level {
            let index = current.index_of(va);
            let mut link = self.entry(table, index);
            if !link.is_present() {
                link = Entry::new(self.alloc_table() | TABLE_LINK);
                self.set_entry(table, index, link.raw());
            }
            table = link.target(current).as_u64();
            current = current.child().unwrap();
        }
        self.set_entry(table, level.index_of(va), leaf);
    }

    /// The boot address space: a 2 MiB direct map and the monitor ranges mapped with 4 KiB pages
    pub fn boot() -> Self {
        let platform = Self::new();

        for base in (0..MANAGED_MEMORY).step_by(2 << 20) {
            platform.map(alias(base), base | KERNEL_RW | HUGE, PageTableLevel::L2);
        }
        for page in 0..TEXT_PAGES {
            let offset = page * 0x1000;
            platform.map(
                va(TEXT_VA + offset),
                (TEXT_PA + offset) | KERNEL_RX,
                PageTableLevel::L1,
            );
        }
        for page in 0..MONITOR_PAGES {
            let offset = page * 0x1000;
            platform.map(
                va(MONITOR_VA + offset),
                (MONITOR_PA + offset) | KERNEL_RW,
                PageTableLevel::L1,
            );
        }
        for page in 0..POOL_PAGES {
            let offset = page * 0x1000;
            platform.map(
                va(POOL_VA + offset),
                (POOL_PA + offset) | KERNEL_RW,
                PageTableLevel::L1,
            );
        }

        platform
    }
}

impl Platform for TestPlatform {
    fn read_entry(&self, slot: EntrySlot) -> Entry {
        let raw = self.memory.borrow().get(&slot.addr().as_u64()).copied();
        Entry::new(raw.unwrap_or(0))
    }

    fn write_entry(&self, slot: EntrySlot, entry: Entry) {
        self.memory
            .borrow_mut()
            .insert(slot.addr().as_u64(), entry.raw());
    }

    fn zero_frame(&self, frame: PhysAddr) {
        let start = frame.as_u64();
        self.memory
            .borrow_mut()
            .retain(|addr, _| !(start..start + 0x1000).contains(addr));
        self.zeroed.borrow_mut().push(frame);
    }

    fn flush_tlb(&self, va: Option<VirtAddr>) {
        self.flushes.borrow_mut().push(va);
    }

    fn root_table(&self) -> PhysAddr {
        self.root.get()
    }

    fn load_root_table(&self, root: PhysAddr) {
        self.root.set(root);
    }

    fn cpu_id(&self) -> usize {
        self.cpu.get()
    }

    fn current_pid(&self) -> usize {
        self.pid.get()
    }

    fn interrupts_disable(&self) -> bool {
        self.interrupts.replace(false)
    }

    fn interrupts_restore(&self, enabled: bool) {
        self.interrupts.set(enabled);
    }

    fn read_control_register(&self, reg: ControlRegister) -> u64 {
        match reg {
            ControlRegister::Cr0 => self.cr0.get(),
            ControlRegister::Cr3 => self.root.get().as_u64(),
            ControlRegister::Cr4 => self.cr4.get(),
        }
    }

    fn write_control_register(&self, reg: ControlRegister, value: u64) {
        match reg {
            ControlRegister::Cr0 => self.cr0.set(value),
            ControlRegister::Cr3 => self.root.set(pa(value & !0xfff)),
            ControlRegister::Cr4 => self.cr4.set(value),
        }
    }

    fn read_msr(&self, msr: u32) -> u64 {
        self.msrs.borrow().get(&msr).copied().unwrap_or(0)
    }

    fn write_msr(&self, msr: u32, value: u64) {
        self.msrs.borrow_mut().insert(msr, value);
    }

    fn run_on_stack(&self, stack_top: VirtAddr, f: &mut dyn FnMut()) {
        self.stacks.borrow_mut().push(stack_top);
        self.inside.borrow_mut().push((
            self.interrupts.get(),
            self.read_msr(0x6e1),
            self.cr0.get(),
        ));
        f();
    }

    fn halt(&self, violation: &Violation) -> ! {
        std::panic::panic_any(violation.clone())
    }
}

pub fn config() -> MonitorConfig {
    MonitorConfig {
        managed_memory: MANAGED_MEMORY,
        max_processes: 64,
        max_cpus: 2,
        ..MonitorConfig::default()
    }
}

pub fn layout() -> MemoryLayout {
    MemoryLayout {
        kernel_text: Line::new(TEXT_VA, TEXT_VA + TEXT_PAGES * 0x1000),
        monitor: Line::new(MONITOR_VA, MONITOR_VA + MONITOR_PAGES * 0x1000),
        split_pool: Line::new(POOL_VA, POOL_VA + POOL_PAGES * 0x1000),
    }
}

/// A monitor that has taken over the boot address space
pub fn monitor() -> Monitor<TestPlatform> {
    monitor_with(config())
}

pub fn monitor_with(config: MonitorConfig) -> Monitor<TestPlatform> {
    init();
    let monitor = Monitor::new(TestPlatform::boot(), config);
    monitor.mmu_init(&layout()).unwrap();
    monitor
}

/// Run `f` and return the violation it halted the system with
pub fn halts<R>(f: impl FnOnce() -> R) -> Violation {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => panic!("no violation"),
        Err(payload) => match payload.downcast::<Violation>() {
            Ok(violation) => *violation,
            Err(_) => panic!("panicked without a violation"),
        },
    }
}

/// Whether the leaf translating `va` carries the monitor's protection
pub fn is_protected(monitor: &Monitor<TestPlatform>, va: VirtAddr) -> bool {
    let platform = monitor.platform();
    let leaf = find_leaf(platform, platform.root_table(), PageTableLevel::L5, va).unwrap();
    leaf.entry.is_protected(monitor.config().protection)
}

/// Create the address space of `pid`, sharing the kernel half, and switch to it
pub fn spawn(monitor: &Monitor<TestPlatform>, pid: usize) -> u64 {
    let root = 0x10_0000 + pid as u64 * 0x1000;
    monitor.declare_l5_page(pa(root)).unwrap();
    let kernel = monitor.platform().entry(KERNEL_ROOT, 511);
    monitor.update_l5_mapping(slot(root, 511), kernel).unwrap();
    monitor.platform().pid.set(pid);
    monitor.load_root_table(pa(root)).unwrap();
    root
}
