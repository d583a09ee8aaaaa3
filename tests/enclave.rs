// SPDX-License-Identifier: Apache-2.0

mod common;

use common::*;
use mmu_monitor::config::SyscallEntries;
use mmu_monitor::control::MSR_LSTAR;
use mmu_monitor::enclave::{ActivationState, Claim, EnclaveEntry, SavedRegisters};
use mmu_monitor::entry::Entry;
use mmu_monitor::monitor::SYS_MMAP;
use mmu_monitor::{Error, FrameKind, Monitor, MonitorConfig, Platform, Violation};

const CLAIM_VA: u64 = 0x7000_0000;
const CLAIM_PA: u64 = 0xA0_1000;
const CLAIM_FRAMES: u64 = 4;

/// An active enclave for `pid` holding a claim of private memory
fn enclave(monitor: &Monitor<TestPlatform>, pid: usize) {
    spawn(monitor, pid);
    monitor.enclave_assign().unwrap();
    monitor
        .enclave_claim_memory(va(CLAIM_VA), pa(CLAIM_PA), CLAIM_FRAMES, true)
        .unwrap();
    monitor.enclave_activate(pid).unwrap();
}

#[test]
fn lifecycle() {
    let monitor = monitor();
    let root = spawn(&monitor, 3);

    let id = monitor.enclave_assign().unwrap();
    let entry = monitor.enclave(3).unwrap();
    assert_eq!(entry.enclave_id, Some(id));
    assert_eq!(entry.state, ActivationState::Assigned);
    assert_eq!(entry.root_table, Some(pa(root)));
    assert_eq!(monitor.frame_descriptor(pa(root)).unwrap().owner(), Some(id));
    assert_eq!(monitor.current_enclave_id(), Some(id));

    assert_eq!(monitor.enclave_activate(3), Ok(id));
    assert_eq!(monitor.enclave(3).unwrap().state, ActivationState::Active);
    assert_eq!(monitor.enclave_assign(), Err(Error::AlreadyActive(3)));
    assert_eq!(
        halts(|| monitor.enclave_activate(3)),
        Violation::DoubleActivation { pid: 3, id }
    );

    assert_eq!(monitor.enclave_exit(3), Ok(id));
    assert_eq!(monitor.enclave(3).unwrap(), EnclaveEntry::default());
    assert_eq!(monitor.current_enclave_id(), None);
    assert_eq!(monitor.enclave_exit(3), Err(Error::NotAnEnclave(3)));

    // identities are never reused
    let again = monitor.enclave_assign().unwrap();
    assert!(again > id);
}

#[test]
fn activate_unassigned_halts() {
    let monitor = monitor();
    assert_eq!(
        halts(|| monitor.enclave_activate(4)),
        Violation::NotAssigned { pid: 4 }
    );
}

#[test]
fn slot_out_of_range() {
    let monitor = monitor();
    assert_eq!(monitor.enclave_activate(64), Err(Error::SlotOutOfRange(64)));
    assert_eq!(monitor.enclave_exit(100), Err(Error::SlotOutOfRange(100)));
    assert_eq!(monitor.enclave(64), Err(Error::SlotOutOfRange(64)));
}

#[test]
fn claim_memory() {
    let monitor = monitor();
    spawn(&monitor, 2);
    let id = monitor.enclave_assign().unwrap();

    monitor
        .enclave_claim_memory(va(CLAIM_VA), pa(CLAIM_PA), CLAIM_FRAMES, true)
        .unwrap();
    for frame in 0..CLAIM_FRAMES {
        let frame = CLAIM_PA + frame * 0x1000;
        let desc = monitor.frame_descriptor(pa(frame)).unwrap();
        assert_eq!(desc.kind(), FrameKind::EnclavePage);
        assert_eq!(desc.owner(), Some(id));
        assert!(is_protected(&monitor, alias(frame)));
    }
    assert_eq!(
        monitor.enclave(2).unwrap().last_claim,
        Some(Claim {
            user_va: va(CLAIM_VA),
            phys: pa(CLAIM_PA),
            frames: CLAIM_FRAMES,
        })
    );

    // shared memory is not tracked
    monitor
        .enclave_claim_memory(va(0x8000_0000), pa(0xC0_1000), 1, false)
        .unwrap();
    assert_eq!(monitor.frame_kind(pa(0xC0_1000)), Some(FrameKind::Unused));
    assert_eq!(
        monitor.enclave(2).unwrap().last_claim.unwrap().user_va,
        va(CLAIM_VA)
    );
}

#[test]
fn claim_rules() {
    let monitor = monitor();

    assert_eq!(
        halts(|| monitor.enclave_claim_memory(va(CLAIM_VA), pa(CLAIM_PA), 1, true)),
        Violation::ClaimByNonEnclave { pid: 1 }
    );

    spawn(&monitor, 2);
    monitor.enclave_assign().unwrap();
    assert_eq!(
        halts(|| monitor.enclave_claim_memory(va(CLAIM_VA), pa(KERNEL_ROOT), 1, true)),
        Violation::ClaimedFrameInUse {
            frame: pa(KERNEL_ROOT),
            kind: FrameKind::PageTable(mmu_monitor::PageTableLevel::L5),
        }
    );
    assert_eq!(
        monitor.enclave_claim_memory(va(CLAIM_VA), pa(MANAGED_MEMORY), 1, true),
        Err(Error::NotManaged(pa(MANAGED_MEMORY)))
    );
}

#[test]
fn claim_mapped_frame_halts() {
    let monitor = monitor();
    let shared = 0xC0_2000;
    monitor
        .update_l1_mapping(slot(0x3000, 0), Entry::new(shared | USER_RW))
        .unwrap();

    spawn(&monitor, 2);
    monitor.enclave_assign().unwrap();
    assert_eq!(
        halts(|| monitor.enclave_claim_memory(va(CLAIM_VA), pa(shared), 1, true)),
        Violation::ClaimedFrameInUse {
            frame: pa(shared),
            kind: FrameKind::KernelData,
        }
    );
    assert_eq!(monitor.frame_descriptor(pa(shared)).unwrap().owner(), None);
    assert!(monitor.platform().entry(0x3000, 0).is_writable());

    // a frame only reached through a split direct map page is free
    let split = KERNEL_ROOT + 0x10_0000;
    assert_eq!(monitor.frame_kind(pa(split)), Some(FrameKind::KernelData));
    monitor
        .enclave_claim_memory(va(CLAIM_VA), pa(split), 1, true)
        .unwrap();
    assert_eq!(monitor.frame_kind(pa(split)), Some(FrameKind::EnclavePage));
}

#[test]
fn failed_claim_changes_nothing() {
    let monitor = monitor();
    spawn(&monitor, 2);
    monitor.enclave_assign().unwrap();

    let last = MANAGED_MEMORY - 0x1000;
    assert_eq!(
        monitor.enclave_claim_memory(va(CLAIM_VA), pa(last), 2, true),
        Err(Error::NotManaged(pa(MANAGED_MEMORY)))
    );
    assert_eq!(monitor.frame_kind(pa(last)), Some(FrameKind::Unused));
    assert!(!is_protected(&monitor, alias(last)));
    assert_eq!(monitor.enclave(2).unwrap().last_claim, None);

    // an unusable frame in the middle leaves the ones before it alone
    assert_eq!(
        halts(|| monitor.enclave_claim_memory(va(CLAIM_VA), pa(MONITOR_PA - 0x1000), 2, true)),
        Violation::ClaimedFrameInUse {
            frame: pa(MONITOR_PA),
            kind: FrameKind::MonitorPage,
        }
    );
    assert_eq!(
        monitor.frame_kind(pa(MONITOR_PA - 0x1000)),
        Some(FrameKind::Unused)
    );
}

#[test]
fn map_enclave_page() {
    let monitor = monitor();
    enclave(&monitor, 2);
    monitor.declare_l1_page(pa(0x1000)).unwrap();

    // the owner may map its memory
    monitor
        .update_l1_mapping(slot(0x1000, 0), Entry::new(CLAIM_PA | USER_RW))
        .unwrap();

    // nobody else may
    monitor.platform().pid.set(1);
    monitor.declare_l1_page(pa(0x3000)).unwrap();
    let violation =
        halts(|| monitor.update_l1_mapping(slot(0x3000, 0), Entry::new(CLAIM_PA | KERNEL_RW)));
    assert!(matches!(violation, Violation::ForeignEnclavePage { .. }));
}

#[test]
fn fork() {
    let monitor = monitor();
    spawn(&monitor, 2);
    let id = monitor.enclave_assign().unwrap();

    // the child runs on its parent's root
    monitor.platform().pid.set(5);
    assert_eq!(monitor.enclave_fork_child(2, 5), Ok(Some(id)));
    let child = monitor.enclave(5).unwrap();
    assert_eq!(child.enclave_id, Some(id));
    assert_eq!(child.state, ActivationState::Assigned);

    assert_eq!(
        halts(|| monitor.enclave_fork_child(2, 5)),
        Violation::ForkIntoEnclave { child: 5, id }
    );
    assert_eq!(monitor.enclave_fork_child(1, 6), Ok(None));

    monitor.load_root_table(pa(KERNEL_ROOT)).unwrap();
    let violation = halts(|| monitor.enclave_fork_child(2, 6));
    assert!(matches!(violation, Violation::ForkRootMismatch { .. }));
    assert_eq!(monitor.enclave(6).unwrap().enclave_id, None);
}

fn mmap_registers(len: u64, fd: i64) -> SavedRegisters {
    SavedRegisters {
        rax: SYS_MMAP,
        orig_rax: SYS_MMAP,
        rsi: len,
        rdx: 0x3,
        r10: 0x22,
        r8: fd as u64,
        rip: 0x40_1000,
        rsp: 0x7fff_f000,
        ..SavedRegisters::default()
    }
}

#[test]
fn syscall_restores_registers() {
    let monitor = monitor();
    enclave(&monitor, 2);

    let saved = mmap_registers(CLAIM_FRAMES * 0x1000, -1);
    monitor.syscall_enter(&saved, SYS_MMAP).unwrap();

    let mut regs = SavedRegisters {
        rax: CLAIM_VA,
        rsi: 0xdead,
        rip: 0xbad,
        ..SavedRegisters::default()
    };
    monitor.syscall_return(&mut regs, SYS_MMAP).unwrap();
    assert_eq!(regs.rax, CLAIM_VA);
    assert_eq!(regs.rsi, saved.rsi);
    assert_eq!(regs.rip, saved.rip);
    assert_eq!(regs.rsp, saved.rsp);
}

#[test]
fn anonymous_mapping_halts() {
    let monitor = monitor();
    enclave(&monitor, 2);

    // a file mapping anywhere is fine
    monitor.syscall_enter(&mmap_registers(0x1000, 3), SYS_MMAP).unwrap();
    let mut regs = SavedRegisters {
        rax: 0x9000_0000,
        ..SavedRegisters::default()
    };
    monitor.syscall_return(&mut regs, SYS_MMAP).unwrap();

    // an anonymous mapping larger than the claim is not
    let len = (CLAIM_FRAMES + 1) * 0x1000;
    monitor.syscall_enter(&mmap_registers(len, -1), SYS_MMAP).unwrap();
    let mut regs = SavedRegisters {
        rax: CLAIM_VA,
        ..SavedRegisters::default()
    };
    assert_eq!(
        halts(|| monitor.syscall_return(&mut regs, SYS_MMAP)),
        Violation::AnonymousEnclaveMapping {
            pid: 2,
            addr: CLAIM_VA,
            len,
        }
    );
}

#[test]
fn syscalls_of_ordinary_processes() {
    let monitor = monitor();

    monitor
        .syscall_enter(&mmap_registers(0x1000, -1), SYS_MMAP)
        .unwrap();
    assert_eq!(
        monitor.enclave(1).unwrap().saved_registers,
        SavedRegisters::default()
    );

    let mut regs = SavedRegisters {
        rax: 0x9000_0000,
        rip: 0x1234,
        ..SavedRegisters::default()
    };
    let before = regs;
    monitor.syscall_return(&mut regs, SYS_MMAP).unwrap();
    assert_eq!(regs, before);
}

#[test]
fn syscall_entry_point() {
    let entries = SyscallEntries {
        native: va(0xFFFF_FFFF_8100_0000),
        enclave: va(0xFFFF_FFFF_8100_1000),
    };
    let monitor = monitor_with(MonitorConfig {
        syscall_entries: Some(entries),
        ..config()
    });
    let lstar = || monitor.platform().read_msr(MSR_LSTAR);

    monitor.prepare_user_return().unwrap();
    assert_eq!(lstar(), entries.native.as_u64());

    enclave(&monitor, 2);
    monitor.prepare_user_return().unwrap();
    assert_eq!(lstar(), entries.enclave.as_u64());
}

#[test]
fn syscall_entry_point_unconfigured() {
    let monitor = monitor();
    monitor.prepare_user_return().unwrap();
    assert_eq!(monitor.platform().read_msr(MSR_LSTAR), 0);
}

#[test]
fn syscall_stack() {
    let monitor = monitor();
    monitor.platform().cpu.set(1);
    let top = monitor.syscall_stack_top(1).as_u64();
    assert_eq!(top, monitor.config().syscall_stack_base.as_u64() + 0x1000);

    monitor.validate_syscall_stack(top - 0x100);
    monitor.validate_syscall_stack(top);
    assert_eq!(
        halts(|| monitor.validate_syscall_stack(top + 0x10)),
        Violation::SyscallStackMismatch {
            rsp: top + 0x10,
            expected: top,
        }
    );
}
