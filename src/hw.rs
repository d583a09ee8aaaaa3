// SPDX-License-Identifier: Apache-2.0

//! The bare metal platform
//!
//! Page-table pages are accessed through the direct map of physical memory.

use crate::addr::{DirectMap, EntrySlot};
use crate::control::{ControlRegister, CR3_ADDR_MASK};
use crate::entry::Entry;
use crate::error::Violation;
use crate::platform::Platform;
use crate::PAGE_SIZE;

use core::arch::asm;
use core::arch::x86_64::__rdtscp;

use x86_64::instructions::{hlt, interrupts, tlb};
use x86_64::registers::control::{Cr0, Cr3, Cr3Flags, Cr4};
use x86_64::registers::model_specific::Msr;
use x86_64::structures::paging::PhysFrame;
use x86_64::{PhysAddr, VirtAddr};

/// The CPU number the kernel stores in `IA32_TSC_AUX`
const TSC_AUX_CPU_MASK: u32 = 0xFFF;

/// The platform of a kernel running on x86_64 hardware
#[derive(Copy, Clone, Debug)]
pub struct X86 {
    direct_map: DirectMap,
    current_pid: fn() -> usize,
}

impl X86 {
    /// Create the platform
    ///
    /// `current_pid` is provided by the kernel and returns the process running on the
    /// calling CPU.
    pub const fn new(direct_map: DirectMap, current_pid: fn() -> usize) -> Self {
        Self {
            direct_map,
            current_pid,
        }
    }

    fn entry_ptr(&self, slot: EntrySlot) -> *mut u64 {
        self.direct_map.to_virt(slot.addr()).as_mut_ptr()
    }
}

/// Call the closure `body` points to
///
/// # Safety
///
/// `body` must point to a live `&mut dyn FnMut()`.
unsafe extern "sysv64" fn trampoline(body: *mut &mut dyn FnMut()) {
    (*body)()
}

impl Platform for X86 {
    fn read_entry(&self, slot: EntrySlot) -> Entry {
        // Safety: the direct map covers every managed frame
        Entry::new(unsafe { self.entry_ptr(slot).read_volatile() })
    }

    fn write_entry(&self, slot: EntrySlot, entry: Entry) {
        // Safety: the direct map covers every managed frame
        unsafe { self.entry_ptr(slot).write_volatile(entry.raw()) }
    }

    fn zero_frame(&self, frame: PhysAddr) {
        let ptr: *mut u8 = self.direct_map.to_virt(frame).as_mut_ptr();
        // Safety: the frame is a whole page in the direct map
        unsafe { ptr.write_bytes(0, PAGE_SIZE as usize) }
    }

    fn flush_tlb(&self, va: Option<VirtAddr>) {
        match va {
            Some(va) => tlb::flush(va),
            None => tlb::flush_all(),
        }
    }

    fn root_table(&self) -> PhysAddr {
        Cr3::read().0.start_address()
    }

    fn load_root_table(&self, root: PhysAddr) {
        let (_, flags) = Cr3::read();
        // Safety: the monitor checked `root` is a top-level table
        unsafe { Cr3::write(PhysFrame::containing_address(root), flags) }
    }

    fn cpu_id(&self) -> usize {
        let mut aux = 0;
        // Safety: rdtscp has no side effects
        unsafe { __rdtscp(&mut aux) };
        (aux & TSC_AUX_CPU_MASK) as usize
    }

    fn current_pid(&self) -> usize {
        (self.current_pid)()
    }

    fn interrupts_disable(&self) -> bool {
        let enabled = interrupts::are_enabled();
        interrupts::disable();
        enabled
    }

    fn interrupts_restore(&self, enabled: bool) {
        if enabled {
            interrupts::enable();
        }
    }

    fn read_control_register(&self, reg: ControlRegister) -> u64 {
        match reg {
            ControlRegister::Cr0 => Cr0::read_raw(),
            ControlRegister::Cr3 => {
                let (frame, flags) = Cr3::read();
                frame.start_address().as_u64() | flags.bits()
            }
            ControlRegister::Cr4 => Cr4::read_raw(),
        }
    }

    fn write_control_register(&self, reg: ControlRegister, value: u64) {
        // Safety: all values are sanitized by the monitor
        unsafe {
            match reg {
                ControlRegister::Cr0 => Cr0::write_raw(value),
                ControlRegister::Cr3 => Cr3::write(
                    PhysFrame::containing_address(PhysAddr::new(value & CR3_ADDR_MASK)),
                    Cr3Flags::from_bits_truncate(value),
                ),
                ControlRegister::Cr4 => Cr4::write_raw(value),
            }
        }
    }

    fn read_msr(&self, msr: u32) -> u64 {
        // Safety: reading an MSR has no side effects
        unsafe { Msr::new(msr).read() }
    }

    fn write_msr(&self, msr: u32, value: u64) {
        // Safety: all values are sanitized by the monitor
        unsafe { Msr::new(msr).write(value) }
    }

    fn run_on_stack(&self, top: VirtAddr, body: &mut dyn FnMut()) {
        debug_assert_eq!(top.as_u64() % 16, 0);

        let mut body = body;
        let body: *mut &mut dyn FnMut() = &mut body;

        // Safety: the secure stack of this CPU is mapped and unused while the gate is active
        unsafe {
            asm!(
            "mov    r12,    rsp",
            "mov    rsp,    {SP}",
            "call   {TRAMPOLINE}",
            "mov    rsp,    r12",

            SP = in(reg) top.as_u64(),
            TRAMPOLINE = sym trampoline,
            in("rdi") body,
            out("r12") _,
            clobber_abi("sysv64"),
            )
        }
    }

    fn halt(&self, _: &Violation) -> ! {
        interrupts::disable();
        loop {
            hlt();
        }
    }
}
