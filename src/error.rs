// SPDX-License-Identifier: Apache-2.0

//! Errors of the monitor
//!
//! A [`Violation`] means the isolation guarantee is already threatened. It never reaches the
//! caller: the monitor logs it and halts the system through
//! [`Platform::halt`](crate::platform::Platform::halt).
//!
//! An [`Error`] is a parameter mismatch the front end turns into an error code.

use crate::addr::EntrySlot;
use crate::enclave::EnclaveId;
use crate::entry::{Entry, PageTableLevel};
use crate::frame::FrameKind;

use core::fmt;

use x86_64::{PhysAddr, VirtAddr};

/// A fatal invariant violation
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Violation {
    /// A level-1 entry mapping a monitor page was pointed somewhere else
    MonitorLeafRepointed {
        /// the slot written
        slot: EntrySlot,
        /// the monitor frame
        old: PhysAddr,
        /// the proposed entry
        value: Entry,
    },
    /// A kernel code frame was mapped writable for the kernel
    KernelCodeWritable {
        /// the slot written
        slot: EntrySlot,
        /// the proposed entry
        value: Entry,
    },
    /// A kernel code mapping was repointed by a privileged overwrite
    KernelCodeRepointed {
        /// the slot written
        slot: EntrySlot,
        /// the kernel code frame
        old: PhysAddr,
        /// the proposed entry
        value: Entry,
    },
    /// A table links to a frame of the wrong kind
    LevelMismatch {
        /// the slot written
        slot: EntrySlot,
        /// the level of the table containing the slot
        container: PageTableLevel,
        /// the frame linked
        target: PhysAddr,
        /// the kind of the frame linked
        kind: FrameKind,
    },
    /// The slot does not live in a page-table page of the expected level
    ContainerMismatch {
        /// the slot written
        slot: EntrySlot,
        /// the level the entry point was called for
        expected: PageTableLevel,
        /// the kind of the frame containing the slot
        kind: Option<FrameKind>,
    },
    /// An entry was removed from a frame that is not a page-table page
    NotATable {
        /// the slot written
        slot: EntrySlot,
        /// the kind of the frame containing the slot
        kind: Option<FrameKind>,
    },
    /// A table and the frame it links belong to different enclaves
    OwnerMismatch {
        /// the slot written
        slot: EntrySlot,
        /// the owner of the table containing the slot
        container: EnclaveId,
        /// the frame linked
        target: PhysAddr,
        /// the owner of the frame linked
        owner: EnclaveId,
    },
    /// An enclave page was mapped outside its enclave
    ForeignEnclavePage {
        /// the slot written
        slot: EntrySlot,
        /// the enclave frame
        target: PhysAddr,
        /// the owning enclave
        owner: Option<EnclaveId>,
        /// the enclave of the calling process
        current: Option<EnclaveId>,
    },
    /// A frame was declared as a page-table page from a kind that forbids it
    BadDeclare {
        /// the frame declared
        frame: PhysAddr,
        /// the level requested
        level: PageTableLevel,
        /// the current kind of the frame
        kind: FrameKind,
    },
    /// A page-table page was removed while still linked
    RemoveInUse {
        /// the frame removed
        frame: PhysAddr,
        /// the kind of the frame
        kind: FrameKind,
        /// the remaining references
        count: u16,
    },
    /// A frame was retyped across the monitor/enclave boundary
    BadRetype {
        /// the frame retyped
        frame: PhysAddr,
        /// the current kind
        from: FrameKind,
        /// the requested kind
        to: FrameKind,
    },
    /// An enclave identity was attached to a monitor page
    MonitorOwnership {
        /// the monitor frame
        frame: PhysAddr,
    },
    /// A reference count would exceed its maximum
    CountOverflow {
        /// the frame counted
        frame: PhysAddr,
    },
    /// A reference count would drop below zero
    CountUnderflow {
        /// the frame counted
        frame: PhysAddr,
    },
    /// A frame that is not a top-level table was loaded as the root table
    RootNotTopLevel {
        /// the frame loaded
        frame: PhysAddr,
        /// the kind of the frame
        kind: Option<FrameKind>,
    },
    /// The kernel tried to write the protection key rights register
    PkrsWrite {
        /// the value written
        value: u64,
    },
    /// A process that is not an enclave claimed enclave memory
    ClaimByNonEnclave {
        /// the calling process
        pid: usize,
    },
    /// Enclave memory was claimed from a frame in use
    ClaimedFrameInUse {
        /// the frame claimed
        frame: PhysAddr,
        /// its current kind
        kind: FrameKind,
    },
    /// A process without an enclave identity was activated
    NotAssigned {
        /// the process
        pid: usize,
    },
    /// An enclave was activated twice
    DoubleActivation {
        /// the process
        pid: usize,
        /// its enclave
        id: EnclaveId,
    },
    /// A forked child already had an enclave identity
    ForkIntoEnclave {
        /// the child process
        child: usize,
        /// its enclave
        id: EnclaveId,
    },
    /// A forked child does not share its parent's root table
    ForkRootMismatch {
        /// the parent's root table
        parent: Option<PhysAddr>,
        /// the root table of the calling process
        current: PhysAddr,
    },
    /// An active enclave received an anonymous mapping it did not claim
    AnonymousEnclaveMapping {
        /// the process
        pid: usize,
        /// the mapped address
        addr: u64,
        /// the mapped length
        len: u64,
    },
    /// The secure syscall stack pointer is not on this CPU's stack
    SyscallStackMismatch {
        /// the stack pointer
        rsp: u64,
        /// the expected stack top
        expected: u64,
    },
    /// The call gate was entered while already active on this CPU
    GateReentered {
        /// the CPU
        cpu: usize,
    },
    /// The CPU has no secure stack
    CpuOutOfRange {
        /// the CPU
        cpu: usize,
    },
    /// The platform returned from the secure stack without running the monitor
    StackSwitchFailed {
        /// the CPU
        cpu: usize,
    },
    /// A slot outside the managed memory was written
    UnmanagedTable {
        /// the slot written
        slot: EntrySlot,
    },
    /// The monitor was initialized twice
    AlreadyInitialized,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonitorLeafRepointed { slot, old, value } => write!(
                f,
                "repointing monitor page {:#x} at {slot:?} to {value:#x}",
                old.as_u64()
            ),
            Self::KernelCodeWritable { slot, value } => {
                write!(f, "making kernel code writable at {slot:?}: {value:#x}")
            }
            Self::KernelCodeRepointed { slot, old, value } => write!(
                f,
                "repointing kernel code {:#x} at {slot:?} to {value:#x}",
                old.as_u64()
            ),
            Self::LevelMismatch {
                slot,
                container,
                target,
                kind,
            } => write!(
                f,
                "mapping {kind:?} frame {:#x} into {container} table at {slot:?}",
                target.as_u64()
            ),
            Self::ContainerMismatch {
                slot,
                expected,
                kind,
            } => write!(f, "{slot:?} is not in an {expected} table: {kind:?}"),
            Self::NotATable { slot, kind } => {
                write!(f, "{slot:?} is not in a page-table page: {kind:?}")
            }
            Self::OwnerMismatch {
                slot,
                container,
                target,
                owner,
            } => write!(
                f,
                "table of {container} at {slot:?} links frame {:#x} of {owner}",
                target.as_u64()
            ),
            Self::ForeignEnclavePage {
                slot,
                target,
                owner,
                current,
            } => write!(
                f,
                "mapping enclave frame {:#x} of {owner:?} at {slot:?} from {current:?}",
                target.as_u64()
            ),
            Self::BadDeclare { frame, level, kind } => write!(
                f,
                "declaring {kind:?} frame {:#x} as {level} table",
                frame.as_u64()
            ),
            Self::RemoveInUse { frame, kind, count } => write!(
                f,
                "removing {kind:?} frame {:#x} with {count} references",
                frame.as_u64()
            ),
            Self::BadRetype { frame, from, to } => write!(
                f,
                "retyping frame {:#x} from {from:?} to {to:?}",
                frame.as_u64()
            ),
            Self::MonitorOwnership { frame } => write!(
                f,
                "attaching an enclave to monitor frame {:#x}",
                frame.as_u64()
            ),
            Self::CountOverflow { frame } => {
                write!(f, "reference count overflow for {:#x}", frame.as_u64())
            }
            Self::CountUnderflow { frame } => {
                write!(f, "reference count underflow for {:#x}", frame.as_u64())
            }
            Self::RootNotTopLevel { frame, kind } => write!(
                f,
                "loading {kind:?} frame {:#x} as root table",
                frame.as_u64()
            ),
            Self::PkrsWrite { value } => write!(f, "writing PKRS: {value:#x}"),
            Self::ClaimByNonEnclave { pid } => {
                write!(f, "claiming enclave memory for non-enclave pid {pid}")
            }
            Self::ClaimedFrameInUse { frame, kind } => write!(
                f,
                "claiming {kind:?} frame {:#x} for an enclave",
                frame.as_u64()
            ),
            Self::NotAssigned { pid } => write!(f, "activating pid {pid} without enclave"),
            Self::DoubleActivation { pid, id } => {
                write!(f, "activating {id} of pid {pid} twice")
            }
            Self::ForkIntoEnclave { child, id } => {
                write!(f, "forking into pid {child} which is already {id}")
            }
            Self::ForkRootMismatch { parent, current } => write!(
                f,
                "forked root table {:#x} differs from parent {parent:?}",
                current.as_u64()
            ),
            Self::AnonymousEnclaveMapping { pid, addr, len } => write!(
                f,
                "anonymous mapping {addr:#x}+{len:#x} in enclave pid {pid}"
            ),
            Self::SyscallStackMismatch { rsp, expected } => write!(
                f,
                "syscall stack {rsp:#x} does not end at {expected:#x}"
            ),
            Self::GateReentered { cpu } => write!(f, "call gate reentered on cpu {cpu}"),
            Self::CpuOutOfRange { cpu } => write!(f, "no secure stack for cpu {cpu}"),
            Self::StackSwitchFailed { cpu } => {
                write!(f, "secure stack switch failed on cpu {cpu}")
            }
            Self::UnmanagedTable { slot } => write!(f, "{slot:?} is outside managed memory"),
            Self::AlreadyInitialized => write!(f, "monitor already initialized"),
        }
    }
}

/// An error returned to the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No frame left in the reserved split pool
    SplitPoolExhausted,
    /// The physical address has no frame descriptor
    NotManaged(PhysAddr),
    /// The virtual address has no translation
    NotMapped(VirtAddr),
    /// The process identity exceeds the registry capacity
    SlotOutOfRange(usize),
    /// All enclave identities have been handed out
    IdsExhausted,
    /// The process is already an active enclave
    AlreadyActive(usize),
    /// The process is not an enclave
    NotAnEnclave(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitPoolExhausted => write!(f, "split pool exhausted"),
            Self::NotManaged(pa) => write!(f, "{:#x} is outside managed memory", pa.as_u64()),
            Self::NotMapped(va) => write!(f, "{:#x} is not mapped", va.as_u64()),
            Self::SlotOutOfRange(pid) => write!(f, "pid {pid} exceeds the process table"),
            Self::IdsExhausted => write!(f, "enclave identities exhausted"),
            Self::AlreadyActive(pid) => write!(f, "pid {pid} is already an active enclave"),
            Self::NotAnEnclave(pid) => write!(f, "pid {pid} is not an enclave"),
        }
    }
}

/// Either outcome of a failed monitor operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// halt the system
    Fatal(Violation),
    /// report to the front end
    Soft(Error),
}

impl From<Violation> for Failure {
    fn from(violation: Violation) -> Self {
        Self::Fatal(violation)
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::Soft(error)
    }
}
