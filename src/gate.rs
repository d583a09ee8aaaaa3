// SPDX-License-Identifier: Apache-2.0

//! The call gate
//!
//! Every monitor entry point runs inside [`CallGate::enter`]: interrupts off, the monitor's
//! own protection lifted, and the stack switched to the secure stack of the calling CPU.
//! Code that needs monitor privileges asks for a [`GateToken`], which only the gate can
//! create.

use crate::config::MonitorConfig;
use crate::control::{ControlRegister, MSR_PKRS};
use crate::entry::ProtectionMode;
use crate::error::Violation;
use crate::platform::Platform;
use crate::GATE_STACK_SIZE;

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use x86_64::registers::control::Cr0Flags;
use x86_64::VirtAddr;

bitflags! {
    /// The rights bits of one protection key in PKRS
    pub struct PkeyRights: u64 {
        /// deny all data accesses
        const ACCESS_DISABLE = 1 << 0;
        /// deny writes
        const WRITE_DISABLE = 1 << 1;
    }
}

impl PkeyRights {
    /// The PKRS bits of these rights for `key`
    #[inline]
    #[allow(clippy::integer_arithmetic)]
    pub fn for_key(self, key: u8) -> u64 {
        self.bits() << (2 * u32::from(key))
    }
}

/// Proof of running inside the call gate
///
/// Operations that touch monitor state take a reference to this token.
#[derive(Debug)]
pub struct GateToken(());

/// The per-CPU state of the gate
pub struct CallGate {
    mode: ProtectionMode,
    stack_base: VirtAddr,
    active: Vec<AtomicBool>,
}

impl CallGate {
    /// Create the gate for the CPUs and protection mechanism of `config`
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            mode: config.protection,
            stack_base: config.gate_stack_base,
            active: (0..config.max_cpus).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// The initial stack pointer of the gate on `cpu`
    #[allow(clippy::integer_arithmetic)]
    pub fn stack_top(&self, cpu: usize) -> Option<VirtAddr> {
        (cpu < self.active.len()).then(|| self.stack_base + (cpu as u64 + 1) * GATE_STACK_SIZE)
    }

    /// Whether some entry point is running on `cpu`
    pub fn is_active(&self, cpu: usize) -> bool {
        self.active
            .get(cpu)
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    /// Run `body` in monitor context
    ///
    /// The interrupt flag of the caller is restored on return.
    pub fn enter<P, R>(
        &self,
        platform: &P,
        body: impl FnOnce(&GateToken) -> R,
    ) -> Result<R, Violation>
    where
        P: Platform + ?Sized,
    {
        let enabled = platform.interrupts_disable();
        self.lift_protection(platform);
        platform.interrupts_disable();

        let result = self.run(platform, body);

        self.apply_protection(platform);
        platform.interrupts_restore(enabled);
        result
    }

    fn run<P, R>(&self, platform: &P, body: impl FnOnce(&GateToken) -> R) -> Result<R, Violation>
    where
        P: Platform + ?Sized,
    {
        let cpu = platform.cpu_id();
        let top = self
            .stack_top(cpu)
            .ok_or(Violation::CpuOutOfRange { cpu })?;
        let flag = self
            .active
            .get(cpu)
            .ok_or(Violation::CpuOutOfRange { cpu })?;
        if flag.swap(true, Ordering::AcqRel) {
            return Err(Violation::GateReentered { cpu });
        }

        let token = GateToken(());
        let mut body = Some(body);
        let mut result = None;
        platform.run_on_stack(top, &mut || {
            if let Some(body) = body.take() {
                result = Some(body(&token));
            }
        });

        flag.store(false, Ordering::Release);
        result.ok_or(Violation::StackSwitchFailed { cpu })
    }

    fn lift_protection<P: Platform + ?Sized>(&self, platform: &P) {
        match self.mode {
            ProtectionMode::Key(key) => {
                let pkrs = platform.read_msr(MSR_PKRS);
                platform.write_msr(MSR_PKRS, pkrs & !PkeyRights::WRITE_DISABLE.for_key(key));
            }
            ProtectionMode::WriteDeny => {
                let cr0 = platform.read_control_register(ControlRegister::Cr0);
                platform.write_control_register(
                    ControlRegister::Cr0,
                    cr0 & !Cr0Flags::WRITE_PROTECT.bits(),
                );
            }
        }
    }

    fn apply_protection<P: Platform + ?Sized>(&self, platform: &P) {
        match self.mode {
            ProtectionMode::Key(key) => {
                let pkrs = platform.read_msr(MSR_PKRS);
                platform.write_msr(MSR_PKRS, pkrs | PkeyRights::WRITE_DISABLE.for_key(key));
            }
            ProtectionMode::WriteDeny => {
                let cr0 = platform.read_control_register(ControlRegister::Cr0);
                platform.write_control_register(
                    ControlRegister::Cr0,
                    cr0 | Cr0Flags::WRITE_PROTECT.bits(),
                );
            }
        }
    }
}
