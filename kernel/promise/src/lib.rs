// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Promise lifecycle: resolution, pipelining and resolution forwarding on
//! top of the kernel store's promise table, plus an in-memory broadcaster
//! for callers awaiting settlement.
//!
//! Grounded on `fendermint_vm_resolver::pool::ResolvePool`'s `TVar`/`TChan`
//! pattern for the in-memory half; the persisted half is plain kernel store
//! calls since every promise transition must land in the same crank
//! transaction as everything else.

mod resolution;
mod watch;

pub use resolution::{resolve_and_forward, resolve_to_promise};
pub use watch::{PromiseWatch, Settlement};
