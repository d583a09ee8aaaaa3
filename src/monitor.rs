// SPDX-License-Identifier: Apache-2.0

//! The monitor entry points
//!
//! Every public method runs inside the [`CallGate`]. Page-table state is serialized by the
//! MMU lock; the enclave registry has its own lock and is never held together with it.
//!
//! A [`Violation`] detected by any entry point is logged and handed to
//! [`Platform::halt`]. Only an [`Error`] is returned to the caller.

use crate::addr::{page_round_up, EntrySlot};
use crate::config::{MemoryLayout, MonitorConfig};
use crate::control::{
    sanitize_cr0, sanitize_cr4, sanitize_msr, ControlRegister, CR3_ADDR_MASK, MSR_LSTAR,
};
use crate::enclave::{
    ActivationState, Claim, EnclaveEntry, EnclaveId, EnclaveRegistry, SavedRegisters,
};
use crate::entry::{Entry, PageTableLevel};
use crate::error::{Error, Failure, Violation};
use crate::frame::{FrameDescriptor, FrameKind, FrameTable};
use crate::gate::{CallGate, GateToken};
use crate::platform::Platform;
use crate::protect::{Enforcer, SplitPool};
use crate::spin::{Locked, RwLocked};
use crate::validate::{validate, Caller, PendingEdit, Verdict};
use crate::walk::{find_leaf, translate};
use crate::{ENTRIES_PER_TABLE, PAGE_SIZE};

use alloc::vec::Vec;

use lset::Line;
#[cfg(feature = "dbg")]
use log::debug;
use log::{error, info, trace, warn};
use paste::paste;
use x86_64::{PhysAddr, VirtAddr};

/// The syscall number of `mmap`
pub const SYS_MMAP: u64 = 9;

/// Everything guarded by the MMU lock
struct MmuState {
    frames: FrameTable,
    pool: SplitPool,
    initialized: bool,
}

/// The reference monitor
pub struct Monitor<P: Platform> {
    platform: P,
    config: MonitorConfig,
    gate: CallGate,
    mmu: Locked<MmuState>,
    enclaves: RwLocked<EnclaveRegistry>,
}

impl<P: Platform> Monitor<P> {
    /// Create a monitor for `platform`
    ///
    /// Nothing is checked until [`mmu_init`](Self::mmu_init) has run.
    pub fn new(platform: P, config: MonitorConfig) -> Self {
        Self {
            gate: CallGate::new(&config),
            mmu: Locked::new(MmuState {
                frames: FrameTable::new(config.managed_memory),
                pool: SplitPool::default(),
                initialized: false,
            }),
            enclaves: RwLocked::new(EnclaveRegistry::new(config.max_processes)),
            platform,
            config,
        }
    }

    /// The platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The call gate
    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    fn enter<R>(&self, body: impl FnOnce(&GateToken) -> Result<R, Failure>) -> Result<R, Error> {
        match self.gate.enter(&self.platform, body) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(Failure::Soft(error))) => Err(error),
            Ok(Err(Failure::Fatal(violation))) | Err(violation) => self.fatal(violation),
        }
    }

    fn fatal(&self, violation: Violation) -> ! {
        error!("isolation violation: {violation}");
        self.platform.halt(&violation)
    }

    /// The enclave context of the calling process
    fn caller(&self) -> Caller {
        let pid = self.platform.current_pid();
        match self.enclaves.read().entry(pid) {
            Ok(entry) => Caller {
                enclave: entry.enclave_id,
                active: entry.state == ActivationState::Active,
            },
            Err(_) => Caller::default(),
        }
    }

    fn enforcer<'a>(&'a self, state: &'a mut MmuState) -> Enforcer<'a, P> {
        Enforcer {
            platform: &self.platform,
            frames: &mut state.frames,
            pool: &mut state.pool,
            mode: self.config.protection,
            root: self.platform.root_table(),
            top: self.config.top_level(),
        }
    }

    fn protect_va(
        &self,
        _: &GateToken,
        state: &mut MmuState,
        va: VirtAddr,
        protect: bool,
    ) -> Result<(), Failure> {
        match self.enforcer(state).set_protection(va, protect) {
            Err(Failure::Soft(Error::NotMapped(va))) => {
                warn!("{:#x} is not mapped, protection unchanged", va.as_u64());
                Ok(())
            }
            result => result,
        }
    }

    fn protect_frame(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        frame: PhysAddr,
        protect: bool,
    ) -> Result<(), Failure> {
        let va = self.config.direct_map.to_virt(frame);
        self.protect_va(token, state, va, protect)
    }

    /// Protect a page-table page and record its direct map alias
    fn protect_table(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        frame: PhysAddr,
    ) -> Result<(), Failure> {
        self.protect_frame(token, state, frame, true)?;
        state
            .frames
            .set_mapping_hint(frame, self.config.direct_map.to_virt(frame));
        Ok(())
    }

    /// Take over the page tables of the running kernel
    ///
    /// Walks the tables reachable from the current root, types every frame found, marks
    /// the ranges of `layout` and protects them together with all page-table pages.
    pub fn mmu_init(&self, layout: &MemoryLayout) -> Result<(), Error> {
        self.enter(|token| self.mmu.with(|state| self.init(token, state, layout)))
    }

    fn init(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        layout: &MemoryLayout,
    ) -> Result<(), Failure> {
        if state.initialized {
            return Err(Violation::AlreadyInitialized.into());
        }

        let root = self.platform.root_table();
        let top = self.config.top_level();
        state.frames.retype(root, FrameKind::PageTable(top))?;
        state.frames.increment_use(root)?;
        self.walk_table(state, root, top)?;

        let text = self.translate_range(&layout.kernel_text)?;
        let monitor = self.translate_range(&layout.monitor)?;
        let pool = self.translate_range(&layout.split_pool)?;

        for (_, frame) in &text {
            state.frames.retype(*frame, FrameKind::KernelCode)?;
        }
        for (_, frame) in monitor.iter().chain(&pool) {
            state.frames.retype(*frame, FrameKind::MonitorPage)?;
        }
        state.pool = SplitPool::new(pool.iter().map(|(_, frame)| *frame).collect());

        for (va, _) in text.iter().chain(&monitor).chain(&pool) {
            self.protect_va(token, state, *va, true)?;
        }

        let tables: Vec<PhysAddr> = state
            .frames
            .iter()
            .filter(|(_, desc)| desc.kind().is_page_table())
            .map(|(frame, _)| frame)
            .collect();
        for table in tables {
            self.protect_table(token, state, table)?;
        }

        state.initialized = true;
        info!(
            "mmu initialized: root {:#x}, {} kernel text pages, {} monitor pages, {} split frames",
            root.as_u64(),
            text.len(),
            monitor.len(),
            state.pool.remaining()
        );
        Ok(())
    }

    /// Count and type everything reachable from `table`
    fn walk_table(
        &self,
        state: &mut MmuState,
        table: PhysAddr,
        level: PageTableLevel,
    ) -> Result<(), Violation> {
        for index in 0..ENTRIES_PER_TABLE {
            let slot = EntrySlot::in_table(table, index);
            let entry = self.platform.read_entry(slot);
            if !entry.is_present() {
                continue;
            }

            let target = entry.target(level);
            let child = match level.child() {
                Some(child) if !entry.is_leaf(level) => child,
                _ => {
                    state.frames.increment_use(target)?;
                    continue;
                }
            };

            match state.frames.kind(target) {
                None => warn!(
                    "{level} table {:#x} links unmanaged table {:#x}",
                    table.as_u64(),
                    target.as_u64()
                ),
                Some(FrameKind::PageTable(found)) if found == child => {
                    state.frames.increment_use(target)?;
                }
                Some(FrameKind::Unused) | Some(FrameKind::KernelData) => {
                    state.frames.retype(target, FrameKind::PageTable(child))?;
                    state.frames.increment_use(target)?;
                    self.walk_table(state, target, child)?;
                }
                Some(kind) => {
                    return Err(Violation::LevelMismatch {
                        slot,
                        container: level,
                        target,
                        kind,
                    })
                }
            }
        }
        Ok(())
    }

    /// The frame behind every page of `range`
    fn translate_range(&self, range: &Line<u64>) -> Result<Vec<(VirtAddr, PhysAddr)>, Error> {
        let root = self.platform.root_table();
        let top = self.config.top_level();
        MemoryLayout::pages(range)
            .map(|va| {
                translate(&self.platform, root, top, va)
                    .map(|(pa, _)| (va, pa.align_down(PAGE_SIZE)))
                    .ok_or(Error::NotMapped(va))
            })
            .collect()
    }

    /// Declare `frame` as a page-table page of `level`
    ///
    /// The frame is protected and zeroed. Declaring a frame again at its current level
    /// does nothing.
    pub fn declare_page(&self, frame: PhysAddr, level: PageTableLevel) -> Result<(), Error> {
        self.enter(|token| self.mmu.with(|state| self.declare(token, state, frame, level)))
    }

    fn declare(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        frame: PhysAddr,
        level: PageTableLevel,
    ) -> Result<(), Failure> {
        let frame = frame.align_down(PAGE_SIZE);
        match state.frames.kind(frame).ok_or(Error::NotManaged(frame))? {
            FrameKind::PageTable(current) if current == level => return Ok(()),
            FrameKind::Unused | FrameKind::KernelData => (),
            kind => return Err(Violation::BadDeclare { frame, level, kind }.into()),
        }

        self.retype_table(token, state, frame, level)?;
        self.platform.zero_frame(frame);
        Ok(())
    }

    fn retype_table(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        frame: PhysAddr,
        level: PageTableLevel,
    ) -> Result<(), Failure> {
        state.frames.retype(frame, FrameKind::PageTable(level))?;
        self.protect_table(token, state, frame)
    }

    /// Store `value` in `slot` of a table of `level`
    ///
    /// An undeclared data frame containing the slot is declared at `level` first. The returned
    /// verdict tells whether write access was removed from `value`.
    pub fn update_mapping(
        &self,
        slot: EntrySlot,
        level: PageTableLevel,
        value: Entry,
    ) -> Result<Verdict, Error> {
        self.enter(|token| {
            let caller = self.caller();
            self.mmu
                .with(|state| self.update(token, state, caller, slot, level, value))
        })
    }

    /// Clear `slot`
    pub fn remove_mapping(&self, slot: EntrySlot) -> Result<(), Error> {
        self.enter(|token| {
            let caller = self.caller();
            self.mmu.with(|state| {
                let level = match state.frames.kind(slot.table()) {
                    _ if !state.initialized => PageTableLevel::L1,
                    Some(FrameKind::PageTable(level)) => level,
                    None => return Err(Violation::UnmanagedTable { slot }.into()),
                    kind => return Err(Violation::NotATable { slot, kind }.into()),
                };
                self.update(token, state, caller, slot, level, Entry::ZERO)
                    .map(|_| ())
            })
        })
    }

    fn update(
        &self,
        token: &GateToken,
        state: &mut MmuState,
        caller: Caller,
        slot: EntrySlot,
        level: PageTableLevel,
        value: Entry,
    ) -> Result<Verdict, Failure> {
        if !state.initialized {
            self.platform.write_entry(slot, value);
            return Ok(Verdict::Allow);
        }

        let container = slot.table();
        match state.frames.kind(container) {
            None => return Err(Violation::UnmanagedTable { slot }.into()),
            Some(FrameKind::PageTable(current)) if current == level => (),
            Some(FrameKind::Unused) | Some(FrameKind::KernelData) => {
                self.retype_table(token, state, container, level)?
            }
            kind => {
                return Err(Violation::ContainerMismatch {
                    slot,
                    expected: level,
                    kind,
                }
                .into())
            }
        }

        let edit = PendingEdit {
            slot,
            container: level,
            old: self.platform.read_entry(slot),
            new: value,
        };
        let decision = validate(&state.frames, self.config.protection, caller, &edit)?;
        if let Some(change) = decision.ownership {
            state.frames.set_owner(change.frame, change.owner)?;
        }
        self.commit(state, &edit, decision.value)?;

        #[cfg(feature = "dbg")]
        debug!(
            "{level} {slot:?}: {:#x} -> {:#x} {:?}",
            edit.old, decision.value, decision.verdict
        );
        Ok(decision.verdict)
    }

    /// Count the references of the edit and store `value`
    fn commit(
        &self,
        state: &mut MmuState,
        edit: &PendingEdit,
        value: Entry,
    ) -> Result<(), Violation> {
        let old_pa = edit.old.target(edit.container);
        let new_pa = value.target(edit.container);
        let (was, is) = (edit.old.is_present(), value.is_present());

        let (release, acquire) = if old_pa != new_pa {
            (was, is)
        } else {
            (was && !is, !was && is)
        };
        if release {
            state.frames.decrement_use(old_pa)?;
        }
        if acquire {
            state.frames.increment_use(new_pa)?;
        }

        self.platform.write_entry(edit.slot, value);
        Ok(())
    }

    /// Stop using `frame` as a page-table page or as enclave memory
    ///
    /// The frame may only be referenced by its direct map alias. Other kinds of frames
    /// are left alone.
    pub fn remove_page(&self, frame: PhysAddr) -> Result<(), Error> {
        self.enter(|token| {
            self.mmu.with(|state| {
                let frame = frame.align_down(PAGE_SIZE);
                let desc = match state.frames.lookup(frame) {
                    Some(desc) => *desc,
                    None => return Ok(()),
                };
                let kind = desc.kind();
                if !kind.is_page_table() && kind != FrameKind::EnclavePage {
                    return Ok(());
                }
                if desc.mapped_count() > 1 {
                    return Err(Violation::RemoveInUse {
                        frame,
                        kind,
                        count: desc.mapped_count(),
                    }
                    .into());
                }

                state.frames.release(frame);
                self.protect_frame(token, state, frame, false)
            })
        })
    }

    /// Switch to the root table `root`
    ///
    /// Once initialized, only top-level page-table pages are accepted.
    pub fn load_root_table(&self, root: PhysAddr) -> Result<(), Error> {
        self.enter(|_| {
            self.mmu.with(|state| {
                let kind = state.frames.kind(root);
                let top = FrameKind::PageTable(self.config.top_level());
                if state.initialized && kind != Some(top) {
                    return Err(Violation::RootNotTopLevel { frame: root, kind });
                }
                Ok(())
            })?;
            self.platform.load_root_table(root);
            Ok(())
        })
    }

    /// Write a control register on behalf of the kernel
    pub fn write_control_register(&self, reg: ControlRegister, value: u64) -> Result<(), Error> {
        match reg {
            ControlRegister::Cr3 => self.load_root_table(PhysAddr::new(value & CR3_ADDR_MASK)),
            ControlRegister::Cr0 => self.enter(|_| {
                self.platform.write_control_register(reg, sanitize_cr0(value));
                Ok(())
            }),
            ControlRegister::Cr4 => self.enter(|_| {
                let initialized = self.mmu.lock().initialized;
                let value = sanitize_cr4(value, self.config.protection, initialized);
                self.platform.write_control_register(reg, value);
                Ok(())
            }),
        }
    }

    /// Write a model specific register on behalf of the kernel
    pub fn write_model_register(&self, msr: u32, value: u64) -> Result<(), Error> {
        self.enter(|_| {
            let value = sanitize_msr(msr, value)?;
            self.platform.write_msr(msr, value);
            Ok(())
        })
    }

    /// Give the calling process a fresh enclave identity
    ///
    /// The identity is bound to the current root table.
    pub fn enclave_assign(&self) -> Result<EnclaveId, Error> {
        self.enter(|_| {
            let pid = self.platform.current_pid();
            let root = self.platform.root_table();
            let id = self.enclaves.write().assign(pid, root)?;
            self.mmu.with(|state| state.frames.set_owner(root, id))?;
            info!("pid {pid} assigned {id} with root {:#x}", root.as_u64());
            Ok(id)
        })
    }

    /// Hand `frames` frames at `phys` to the calling enclave
    ///
    /// Internal memory becomes private to the enclave and is protected. Every frame must be
    /// unused or mapped by the direct map alone, otherwise none is claimed. Nothing is
    /// tracked for memory shared with the kernel.
    pub fn enclave_claim_memory(
        &self,
        user_va: VirtAddr,
        phys: PhysAddr,
        frames: u64,
        internal: bool,
    ) -> Result<(), Error> {
        self.enter(|token| {
            if !internal {
                return Ok(());
            }

            let pid = self.platform.current_pid();
            let id = self
                .enclaves
                .read()
                .enclave_id(pid)
                .ok_or(Violation::ClaimByNonEnclave { pid })?;
            let phys = phys.align_down(PAGE_SIZE);

            self.mmu.with(|state| -> Result<(), Failure> {
                for frame in frame_range(phys, frames) {
                    let desc = *state
                        .frames
                        .lookup(frame)
                        .ok_or(Error::NotManaged(frame))?;
                    let free = match desc.kind() {
                        FrameKind::Unused => true,
                        FrameKind::KernelData => {
                            desc.owner().is_none()
                                && desc.mapped_count() <= self.direct_map_refs(frame)
                        }
                        _ => false,
                    };
                    if !free {
                        return Err(Violation::ClaimedFrameInUse {
                            frame,
                            kind: desc.kind(),
                        }
                        .into());
                    }
                }

                for frame in frame_range(phys, frames) {
                    state.frames.retype(frame, FrameKind::EnclavePage)?;
                    state.frames.set_owner(frame, id)?;
                    self.protect_frame(token, state, frame, true)?;
                }
                Ok(())
            })?;

            let claim = Claim {
                user_va,
                phys,
                frames,
            };
            self.enclaves.write().record_claim(pid, claim)?;
            info!(
                "{id} claimed {frames} frames at {:#x} for {:#x}",
                phys.as_u64(),
                user_va.as_u64()
            );
            Ok(())
        })
    }

    /// The number of translations of `frame` the direct map accounts for
    ///
    /// A huge direct map leaf only counts its first frame.
    fn direct_map_refs(&self, frame: PhysAddr) -> u16 {
        let alias = self.config.direct_map.to_virt(frame);
        let root = self.platform.root_table();
        match find_leaf(&self.platform, root, self.config.top_level(), alias) {
            Some(leaf) if leaf.entry.target(leaf.level) == frame => 1,
            _ => 0,
        }
    }

    /// Protect the direct map alias of `frames` frames at `phys`
    pub fn enclave_protect_memory(&self, phys: PhysAddr, frames: u64) -> Result<(), Error> {
        self.enter(|token| {
            self.mmu.with(|state| {
                for frame in frame_range(phys.align_down(PAGE_SIZE), frames) {
                    self.protect_frame(token, state, frame, true)?;
                }
                Ok(())
            })
        })
    }

    /// Let the enclave of `pid` run protected
    pub fn enclave_activate(&self, pid: usize) -> Result<EnclaveId, Error> {
        self.enter(|_| {
            let id = self.enclaves.write().activate(pid)?;
            info!("pid {pid} activated {id}");
            Ok(id)
        })
    }

    /// Turn `pid` back into an ordinary process
    pub fn enclave_exit(&self, pid: usize) -> Result<EnclaveId, Error> {
        self.enter(|_| {
            let id = self.enclaves.write().exit(pid)?;
            info!("pid {pid} left {id}");
            Ok(id)
        })
    }

    /// Let `child` inherit the enclave of `parent`
    ///
    /// Must be called by the child, which has to run on its parent's root table.
    pub fn enclave_fork_child(
        &self,
        parent: usize,
        child: usize,
    ) -> Result<Option<EnclaveId>, Error> {
        self.enter(|_| {
            let root = self.platform.root_table();
            let id = self.enclaves.write().fork_child(parent, child, root)?;
            if let Some(id) = id {
                info!("pid {child} inherited {id} from pid {parent}");
            }
            Ok(id)
        })
    }

    /// Record the registers of an active enclave entering a syscall
    pub fn syscall_enter(&self, regs: &SavedRegisters, nr: u64) -> Result<(), Error> {
        self.enter(|_| {
            let pid = self.platform.current_pid();
            let mut enclaves = self.enclaves.write();
            if enclaves.active_id(pid).is_some() {
                trace!("pid {pid} entering syscall {nr}");
                enclaves.save_registers(pid, regs)?;
            }
            Ok(())
        })
    }

    /// Check the result of a syscall of an active enclave
    ///
    /// All registers but the return value are restored from the frame recorded by
    /// [`syscall_enter`](Self::syscall_enter). An anonymous mapping returned by `mmap`
    /// must be the memory the enclave claimed last.
    pub fn syscall_return(&self, regs: &mut SavedRegisters, nr: u64) -> Result<(), Error> {
        self.enter(|_| {
            let pid = self.platform.current_pid();
            let entry = *self.enclaves.read().entry(pid)?;
            if entry.state != ActivationState::Active {
                return Ok(());
            }

            let ret = regs.rax;
            *regs = entry.saved_registers;
            regs.rax = ret;

            if nr == SYS_MMAP {
                let [_, len, _, _, fd, _] = regs.syscall_args();
                let claimed = entry
                    .last_claim
                    .map_or(false, |claim| claim.covers(ret, len));
                if !claimed && fd as i32 == -1 {
                    return Err(Violation::AnonymousEnclaveMapping {
                        pid,
                        addr: ret,
                        len,
                    }
                    .into());
                }
            }
            Ok(())
        })
    }

    /// Select the syscall entry point for the process about to return to user space
    pub fn prepare_user_return(&self) -> Result<(), Error> {
        self.enter(|_| {
            if let Some(entries) = self.config.syscall_entries {
                let pid = self.platform.current_pid();
                let entry = match self.enclaves.read().active_id(pid) {
                    Some(_) => entries.enclave,
                    None => entries.native,
                };
                self.platform.write_msr(MSR_LSTAR, entry.as_u64());
            }
            Ok(())
        })
    }

    /// The top of the syscall secure stack of `cpu`
    pub fn syscall_stack_top(&self, cpu: usize) -> VirtAddr {
        self.config.syscall_stack_top(cpu)
    }

    /// Check that `rsp` lies on the syscall secure stack of the calling CPU
    pub fn validate_syscall_stack(&self, rsp: u64) {
        let expected = self.syscall_stack_top(self.platform.cpu_id()).as_u64();
        if page_round_up(rsp) != expected {
            self.fatal(Violation::SyscallStackMismatch { rsp, expected });
        }
    }

    /// Whether [`mmu_init`](Self::mmu_init) has run
    pub fn is_initialized(&self) -> bool {
        self.mmu.lock().initialized
    }

    /// The kind of the frame containing `pa`
    pub fn frame_kind(&self, pa: PhysAddr) -> Option<FrameKind> {
        self.mmu.lock().frames.kind(pa)
    }

    /// A copy of the descriptor of the frame containing `pa`
    pub fn frame_descriptor(&self, pa: PhysAddr) -> Option<FrameDescriptor> {
        self.mmu.lock().frames.lookup(pa).copied()
    }

    /// The sum of the reference counts of all frames
    pub fn total_mapped(&self) -> u64 {
        self.mmu.lock().frames.total_mapped()
    }

    /// The number of frames left for splitting huge pages
    pub fn split_frames_remaining(&self) -> usize {
        self.mmu.lock().pool.remaining()
    }

    /// A copy of the registry slot of `pid`
    pub fn enclave(&self, pid: usize) -> Result<EnclaveEntry, Error> {
        self.enclaves.read().entry(pid).copied()
    }

    /// The enclave of the calling process
    pub fn current_enclave_id(&self) -> Option<EnclaveId> {
        self.enclaves.read().enclave_id(self.platform.current_pid())
    }
}

macro_rules! level_entry_points {
    ($($n:literal => $level:ident),* $(,)?) => {
        paste! {
            impl<P: Platform> Monitor<P> {
                $(
                    #[doc = concat!("Declare `frame` as a level ", stringify!($n), " page-table page")]
                    pub fn [<declare_l $n _page>](&self, frame: PhysAddr) -> Result<(), Error> {
                        self.declare_page(frame, PageTableLevel::$level)
                    }

                    #[doc = concat!("Store `value` in `slot` of a level ", stringify!($n), " table")]
                    pub fn [<update_l $n _mapping>](
                        &self,
                        slot: EntrySlot,
                        value: Entry,
                    ) -> Result<Verdict, Error> {
                        self.update_mapping(slot, PageTableLevel::$level, value)
                    }
                )*
            }
        }
    };
}

level_entry_points! {
    1 => L1,
    2 => L2,
    3 => L3,
    4 => L4,
    5 => L5,
}

/// The `count` frames starting at `first`
#[allow(clippy::integer_arithmetic)]
fn frame_range(first: PhysAddr, count: u64) -> impl Iterator<Item = PhysAddr> {
    (0..count).map(move |index| first + index * PAGE_SIZE)
}
