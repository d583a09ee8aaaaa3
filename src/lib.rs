// SPDX-License-Identifier: Apache-2.0

//! The MMU monitor
//!
//! This crate contains the reference monitor that mediates every page-table edit of an
//! untrusted kernel. It keeps a descriptor for every managed physical frame, validates each
//! proposed entry against those descriptors, protects its own pages, the page-table pages
//! and enclave pages with a protection key (or the write-protect bit), and tracks the
//! enclave identity of every process.
//!
//! All entry points live on [`Monitor`](monitor::Monitor) and run inside the
//! [`CallGate`](gate::CallGate).

#![cfg_attr(not(test), no_std)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

use nbytes::bytes;
use primordial::Page as Page4KiB;

pub mod addr;
pub mod config;
pub mod control;
pub mod enclave;
pub mod entry;
pub mod error;
pub mod frame;
pub mod gate;
#[cfg(target_os = "none")]
pub mod hw;
pub mod monitor;
pub mod platform;
pub mod protect;
pub mod spin;
pub mod validate;
pub mod walk;

pub use config::{MemoryLayout, MonitorConfig};
pub use entry::{PageTableLevel, ProtectionMode};
pub use error::{Error, Violation};
pub use frame::{FrameDescriptor, FrameKind};
pub use monitor::Monitor;
pub use platform::Platform;

/// The size of a page frame
pub const PAGE_SIZE: u64 = Page4KiB::SIZE as u64;

/// The number of entries in a page-table page
pub const ENTRIES_PER_TABLE: usize = 512;

/// The maximum number of CPUs the monitor keeps secure stacks for
pub const MAX_NUM_CPUS: usize = 24;

/// The size of the per-CPU secure stack used by the call gate
#[allow(clippy::integer_arithmetic)]
pub const GATE_STACK_SIZE: u64 = bytes![4; KiB];

/// The size of the per-CPU secure syscall stack
#[allow(clippy::integer_arithmetic)]
pub const SYSCALL_STACK_SIZE: u64 = bytes![4; KiB];

/// The default amount of physical memory covered by frame descriptors
#[allow(clippy::integer_arithmetic)]
pub const DEFAULT_MANAGED_MEMORY: u64 = bytes![32; GiB];

/// The default number of process slots in the enclave registry
pub const MAX_PROCESSES: usize = 65536;
