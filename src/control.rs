// SPDX-License-Identifier: Apache-2.0

//! Control register and MSR policy
//!
//! The kernel may not turn off the hardware features the monitor relies on. Every write
//! it requests is adjusted (or refused) here before it reaches the CPU.

use crate::entry::ProtectionMode;
use crate::error::Violation;

use x86_64::registers::control::{Cr0Flags, Cr4Flags};
use x86_64::registers::model_specific::EferFlags;

/// The extended feature enable register
pub const MSR_EFER: u32 = 0xC000_0080;

/// The 64-bit syscall entry point
pub const MSR_LSTAR: u32 = 0xC000_0082;

/// The supervisor protection key rights register
pub const MSR_PKRS: u32 = 0x6E1;

/// The root table address bits of CR3
pub const CR3_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// CR4 bit enabling supervisor protection keys
pub const CR4_PKS: u64 = 1 << 24;

/// A control register the kernel may ask the monitor to write
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlRegister {
    /// CR0
    Cr0,
    /// CR3, the root table
    Cr3,
    /// CR4
    Cr4,
}

/// The CR0 value the kernel may load
///
/// Write protection for supervisor accesses always stays on.
#[inline]
pub fn sanitize_cr0(value: u64) -> u64 {
    value | Cr0Flags::WRITE_PROTECT.bits()
}

/// The CR4 value the kernel may load
///
/// SMEP always stays on. Once the monitor is initialized in protection key mode,
/// supervisor protection keys stay on too.
#[inline]
pub fn sanitize_cr4(value: u64, mode: ProtectionMode, initialized: bool) -> u64 {
    let mut value = value | Cr4Flags::SUPERVISOR_MODE_EXECUTION_PROTECTION.bits();
    if initialized && matches!(mode, ProtectionMode::Key(_)) {
        value |= CR4_PKS;
    }
    value
}

/// The value the kernel may write to `msr`
///
/// No-execute support in EFER cannot be turned off. The protection key rights register
/// belongs to the monitor alone.
pub fn sanitize_msr(msr: u32, value: u64) -> Result<u64, Violation> {
    match msr {
        MSR_EFER => Ok(value | EferFlags::NO_EXECUTE_ENABLE.bits()),
        MSR_PKRS => Err(Violation::PkrsWrite { value }),
        _ => Ok(value),
    }
}
