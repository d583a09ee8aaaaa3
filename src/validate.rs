// SPDX-License-Identifier: Apache-2.0

//! The update validator
//!
//! [`validate`] classifies one proposed page-table entry write. It only reads the frame
//! table; the ownership change it decides on is returned in the [`Decision`] and applied
//! by the caller together with the write.

use crate::addr::EntrySlot;
use crate::enclave::EnclaveId;
use crate::entry::{Entry, PageTableLevel, ProtectionMode};
use crate::error::Violation;
use crate::frame::{FrameKind, FrameTable};

use x86_64::structures::paging::PageTableFlags;
use x86_64::PhysAddr;

/// A proposed entry write
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PendingEdit {
    /// where the entry is stored
    pub slot: EntrySlot,
    /// the level of the table containing the slot
    pub container: PageTableLevel,
    /// the current value of the slot
    pub old: Entry,
    /// the proposed value
    pub new: Entry,
}

/// The enclave context of the calling process
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Caller {
    /// the enclave of the calling process, assigned or active
    pub enclave: Option<EnclaveId>,
    /// whether that enclave runs protected
    pub active: bool,
}

impl Caller {
    fn active_enclave(&self) -> Option<EnclaveId> {
        self.enclave.filter(|_| self.active)
    }
}

/// How an accepted write is committed
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// store the value as proposed
    Allow,
    /// store the value without write access
    AllowReadOnly,
}

/// A frame pulled into an enclave by the write
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwnershipChange {
    /// the frame
    pub frame: PhysAddr,
    /// its new owner
    pub owner: EnclaveId,
}

/// The outcome of a successful validation
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Decision {
    /// the verdict
    pub verdict: Verdict,
    /// the value to store, with all forced attributes applied
    pub value: Entry,
    /// the ownership to record along with the write
    pub ownership: Option<OwnershipChange>,
}

impl Decision {
    fn allow(value: Entry) -> Self {
        Self {
            verdict: Verdict::Allow,
            value,
            ownership: None,
        }
    }
}

/// Decide whether `edit` may be stored
pub fn validate(
    frames: &FrameTable,
    mode: ProtectionMode,
    caller: Caller,
    edit: &PendingEdit,
) -> Result<Decision, Violation> {
    let PendingEdit {
        slot,
        container,
        old,
        new,
    } = *edit;

    let old_pa = old.target(container);
    let new_pa = new.target(container);

    if old.is_present() && (!new.is_present() || old_pa != new_pa) {
        check_repoint(frames, edit, old_pa)?;
    }

    if !new.is_present() {
        return Ok(Decision::allow(new));
    }

    let desc = match frames.lookup(new_pa) {
        Some(desc) => *desc,
        None => return Ok(Decision::allow(new)),
    };
    let kind = desc.kind();
    let leaf = new.is_leaf(container);

    let mut value = new;
    let mut read_only = false;

    if leaf && kind == FrameKind::MonitorPage {
        value = value.with_protection(mode, true);
        read_only = true;
    }

    if leaf && kind == FrameKind::KernelCode {
        let access = new.flags() & (PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE);
        if access == PageTableFlags::WRITABLE {
            return Err(Violation::KernelCodeWritable { slot, value: new });
        }
    }

    check_level(edit, new_pa, kind, leaf)?;
    if leaf && kind.is_page_table() {
        value = value.with_protection(mode, true);
    }

    let container_frame = slot.table();
    let container_owner = frames.owner(container_frame);
    let mut ownership = None;

    match (container_owner, desc.owner()) {
        (Some(owner), None) => {
            if kind != FrameKind::MonitorPage {
                ownership = Some(OwnershipChange {
                    frame: new_pa,
                    owner,
                });
            }
            if leaf {
                read_only = true;
            }
        }
        (None, Some(owner)) => {
            ownership = Some(OwnershipChange {
                frame: container_frame,
                owner,
            });
        }
        (Some(container), Some(owner)) if container != owner => {
            return Err(Violation::OwnerMismatch {
                slot,
                container,
                target: new_pa,
                owner,
            });
        }
        (Some(_), Some(_)) => (),
        (None, None) => {
            if let Some(owner) = caller.active_enclave() {
                if container == PageTableLevel::L1 && new.is_user() {
                    ownership = Some(OwnershipChange {
                        frame: container_frame,
                        owner,
                    });
                    read_only = true;
                }
            }
        }
    }

    if kind == FrameKind::EnclavePage && caller.enclave != desc.owner() {
        return Err(Violation::ForeignEnclavePage {
            slot,
            target: new_pa,
            owner: desc.owner(),
            current: caller.enclave,
        });
    }

    Ok(if read_only {
        Decision {
            verdict: Verdict::AllowReadOnly,
            value: value.read_only(),
            ownership,
        }
    } else {
        Decision {
            verdict: Verdict::Allow,
            value,
            ownership,
        }
    })
}

/// The checks on the frame an existing mapping stops pointing at
fn check_repoint(
    frames: &FrameTable,
    edit: &PendingEdit,
    old_pa: PhysAddr,
) -> Result<(), Violation> {
    match frames.kind(old_pa) {
        Some(FrameKind::MonitorPage) if edit.container == PageTableLevel::L1 => {
            Err(Violation::MonitorLeafRepointed {
                slot: edit.slot,
                old: old_pa,
                value: edit.new,
            })
        }
        Some(FrameKind::KernelCode) if !edit.old.is_user() => {
            Err(Violation::KernelCodeRepointed {
                slot: edit.slot,
                old: old_pa,
                value: edit.new,
            })
        }
        _ => Ok(()),
    }
}

/// The kinds of frames a table of each level may link
///
/// A leaf may also map a page-table page: the kernel maintains the direct map, which covers
/// page tables too. Such a leaf is stored protected.
fn check_level(
    edit: &PendingEdit,
    target: PhysAddr,
    kind: FrameKind,
    leaf: bool,
) -> Result<(), Violation> {
    let allowed = if leaf {
        kind.is_frame() || kind.is_page_table() || kind == FrameKind::MonitorPage
    } else {
        edit.container.child().map(FrameKind::PageTable) == Some(kind)
    };

    if allowed {
        Ok(())
    } else {
        Err(Violation::LevelMismatch {
            slot: edit.slot,
            container: edit.container,
            target,
            kind,
        })
    }
}
