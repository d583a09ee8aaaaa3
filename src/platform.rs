// SPDX-License-Identifier: Apache-2.0

//! Platform abstraction
//!
//! Everything the monitor does to the machine goes through [`Platform`]. The bare-metal
//! implementation lives in [`hw`](crate::hw), tests provide an in-memory one.

use crate::addr::EntrySlot;
use crate::control::ControlRegister;
use crate::entry::Entry;
use crate::error::Violation;

use x86_64::{PhysAddr, VirtAddr};

/// Platform-specific functionality
pub trait Platform {
    /// Read the page-table entry stored at `slot`
    fn read_entry(&self, slot: EntrySlot) -> Entry;

    /// Store `entry` at `slot`
    ///
    /// This is the raw store. The monitor only calls it after validation.
    fn write_entry(&self, slot: EntrySlot, entry: Entry);

    /// Fill the frame at `frame` with zeroes
    fn zero_frame(&self, frame: PhysAddr);

    /// Invalidate the cached translation of `va`, or all translations for `None`
    fn flush_tlb(&self, va: Option<VirtAddr>);

    /// The root page-table frame the calling CPU translates with
    fn root_table(&self) -> PhysAddr;

    /// Switch the calling CPU to the root page-table frame `root`
    fn load_root_table(&self, root: PhysAddr);

    /// The identity of the calling CPU
    fn cpu_id(&self) -> usize;

    /// The identity of the calling process
    fn current_pid(&self) -> usize;

    /// Disable interrupts, returning whether they were enabled
    fn interrupts_disable(&self) -> bool;

    /// Re-enable interrupts if `enabled`
    fn interrupts_restore(&self, enabled: bool);

    /// Read a control register
    fn read_control_register(&self, reg: ControlRegister) -> u64;

    /// Write a control register
    fn write_control_register(&self, reg: ControlRegister, value: u64);

    /// Read a model specific register
    fn read_msr(&self, msr: u32) -> u64;

    /// Write a model specific register
    fn write_msr(&self, msr: u32, value: u64);

    /// Run `f` with the stack pointer set to `stack_top`
    ///
    /// The stack pointer of the caller is restored before returning.
    fn run_on_stack(&self, stack_top: VirtAddr, f: &mut dyn FnMut());

    /// Stop the whole system after an invariant violation
    fn halt(&self, violation: &Violation) -> !;
}
