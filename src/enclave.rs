// SPDX-License-Identifier: Apache-2.0

//! The enclave registry
//!
//! A fixed-capacity table indexed by process identity. Slots are never freed; a recycled
//! process identity reuses its slot.

use crate::error::{Error, Failure, Violation};
use crate::PAGE_SIZE;

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::num::NonZeroU32;

use const_default::ConstDefault;
use x86_64::{PhysAddr, VirtAddr};

/// The identity of an enclave
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EnclaveId(NonZeroU32);

impl EnclaveId {
    /// Create an identity, `0` meaning "not an enclave"
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// The numeric identity
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for EnclaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enclave {}", self.0)
    }
}

/// Where a process is in the enclave lifecycle
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActivationState {
    /// Not an enclave
    Unassigned,
    /// Has an identity but does not run protected yet
    Assigned,
    /// Runs protected
    Active,
}

impl ConstDefault for ActivationState {
    const DEFAULT: Self = Self::Unassigned;
}

/// The most recent claim of enclave-private memory
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Claim {
    /// the user virtual address the memory is going to be mapped at
    pub user_va: VirtAddr,
    /// the first physical frame
    pub phys: PhysAddr,
    /// the number of frames
    pub frames: u64,
}

impl Claim {
    /// Whether a mapping of `len` bytes at `addr` is this claim
    pub fn covers(&self, addr: u64, len: u64) -> bool {
        addr == self.user_va.as_u64()
            && self
                .frames
                .checked_mul(PAGE_SIZE)
                .map_or(false, |size| len <= size)
    }
}

/// The register frame trapped on syscall entry
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ConstDefault)]
#[repr(C)]
#[allow(missing_docs)]
pub struct SavedRegisters {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl SavedRegisters {
    /// The six syscall arguments
    #[inline]
    pub fn syscall_args(&self) -> [u64; 6] {
        [self.rdi, self.rsi, self.rdx, self.r10, self.r8, self.r9]
    }
}

/// One process slot
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EnclaveEntry {
    /// the enclave identity, `None` for an ordinary process
    pub enclave_id: Option<EnclaveId>,
    /// the lifecycle state
    pub state: ActivationState,
    /// the root page-table frame bound at assignment
    pub root_table: Option<PhysAddr>,
    /// the most recent private memory claim
    pub last_claim: Option<Claim>,
    /// the registers trapped on the last monitored syscall
    pub saved_registers: SavedRegisters,
}

impl ConstDefault for EnclaveEntry {
    const DEFAULT: Self = Self {
        enclave_id: None,
        state: ActivationState::DEFAULT,
        root_table: None,
        last_claim: None,
        saved_registers: SavedRegisters::DEFAULT,
    };
}

impl Default for EnclaveEntry {
    fn default() -> Self {
        <Self as ConstDefault>::DEFAULT
    }
}

/// The process slots and the identity allocator
pub struct EnclaveRegistry {
    entries: Vec<EnclaveEntry>,
    next_id: u32,
}

impl EnclaveRegistry {
    /// Create a registry with `capacity` process slots
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![EnclaveEntry::DEFAULT; capacity],
            next_id: 1,
        }
    }

    /// The number of process slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// The slot of `pid`
    pub fn entry(&self, pid: usize) -> Result<&EnclaveEntry, Error> {
        self.entries.get(pid).ok_or(Error::SlotOutOfRange(pid))
    }

    fn entry_mut(&mut self, pid: usize) -> Result<&mut EnclaveEntry, Error> {
        self.entries.get_mut(pid).ok_or(Error::SlotOutOfRange(pid))
    }

    /// The enclave of `pid`, if any
    #[inline]
    pub fn enclave_id(&self, pid: usize) -> Option<EnclaveId> {
        self.entries.get(pid).and_then(|entry| entry.enclave_id)
    }

    /// The enclave of `pid`, if it is active
    #[inline]
    pub fn active_id(&self, pid: usize) -> Option<EnclaveId> {
        self.entries
            .get(pid)
            .filter(|entry| entry.state == ActivationState::Active)
            .and_then(|entry| entry.enclave_id)
    }

    fn allocate_id(&mut self) -> Result<EnclaveId, Error> {
        let id = EnclaveId::new(self.next_id).ok_or(Error::IdsExhausted)?;
        self.next_id = self.next_id.checked_add(1).unwrap_or(0);
        Ok(id)
    }

    /// Give `pid` a fresh enclave identity bound to `root_table`
    pub fn assign(&mut self, pid: usize, root_table: PhysAddr) -> Result<EnclaveId, Error> {
        if self.entry(pid)?.state == ActivationState::Active {
            return Err(Error::AlreadyActive(pid));
        }
        let id = self.allocate_id()?;
        let entry = self.entry_mut(pid)?;
        *entry = EnclaveEntry {
            enclave_id: Some(id),
            state: ActivationState::Assigned,
            root_table: Some(root_table),
            ..EnclaveEntry::DEFAULT
        };
        Ok(id)
    }

    /// Let the enclave of `pid` run protected
    pub fn activate(&mut self, pid: usize) -> Result<EnclaveId, Failure> {
        let entry = self.entry_mut(pid)?;
        let id = entry.enclave_id.ok_or(Violation::NotAssigned { pid })?;
        if entry.state == ActivationState::Active {
            return Err(Violation::DoubleActivation { pid, id }.into());
        }
        entry.state = ActivationState::Active;
        Ok(id)
    }

    /// Return `pid` to an ordinary process
    pub fn exit(&mut self, pid: usize) -> Result<EnclaveId, Error> {
        let entry = self.entry_mut(pid)?;
        let id = entry.enclave_id.ok_or(Error::NotAnEnclave(pid))?;
        *entry = EnclaveEntry::DEFAULT;
        Ok(id)
    }

    /// Let `child` inherit the enclave of `parent`
    ///
    /// The calling child must run on the root table of its parent. Returns `None` if the
    /// parent is an ordinary process.
    pub fn fork_child(
        &mut self,
        parent: usize,
        child: usize,
        current_root: PhysAddr,
    ) -> Result<Option<EnclaveId>, Failure> {
        let parent_entry = *self.entry(parent)?;
        let id = match parent_entry.enclave_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let child_entry = self.entry_mut(child)?;
        if let Some(id) = child_entry.enclave_id {
            return Err(Violation::ForkIntoEnclave { child, id }.into());
        }
        if parent_entry.root_table != Some(current_root) {
            return Err(Violation::ForkRootMismatch {
                parent: parent_entry.root_table,
                current: current_root,
            }
            .into());
        }

        *child_entry = EnclaveEntry {
            enclave_id: Some(id),
            state: ActivationState::Assigned,
            root_table: parent_entry.root_table,
            ..EnclaveEntry::DEFAULT
        };
        Ok(Some(id))
    }

    /// Remember the latest private memory claim of `pid`
    pub fn record_claim(&mut self, pid: usize, claim: Claim) -> Result<(), Error> {
        self.entry_mut(pid)?.last_claim = Some(claim);
        Ok(())
    }

    /// Store the trapped registers of `pid`
    pub fn save_registers(&mut self, pid: usize, regs: &SavedRegisters) -> Result<(), Error> {
        self.entry_mut(pid)?.saved_registers = *regs;
        Ok(())
    }
}
