// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Capdata wire format and the tagged variants exchanged between the scheduler,
//! the kernel store and vat supervisors.
//!
//! Grounded on `fendermint_vm_message`: plain serde-derived message enums with a
//! thin codec layer, rather than a bespoke binary format.

mod capdata;
mod delivery;
mod queue;
mod syscall;

pub use capdata::{CapData, CapDataBuilder, CapDataError, Value};
pub use delivery::{Delivery, DeliveryKind, DeliveryResult, Resolution};
pub use queue::{GcAction, GcActionKind, RunqueueEntry};
pub use syscall::{Syscall, SyscallResult};
