// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The vat supervisor boundary: the trait the scheduler drives each crank
//! through, and a WASM-sandboxed implementation of it.
//!
//! Grounded on `fendermint_vm_interpreter`'s `Interpreter` trait: an
//! asynchronous, single-method seam between the crank loop and whatever
//! actually executes a vat's code, with errors reserved for conditions that
//! should abort the crank rather than be reported as ordinary vat output.

mod sink;
mod wasm;

pub use sink::{SyscallSink, VecSyscallSink};
pub use wasm::{WasmSupervisor, WasmSupervisorError};

use async_trait::async_trait;
use kernel_core::VatId;
use kernel_message::{Delivery, DeliveryResult};

/// Drives one vat's sandboxed execution.
///
/// A supervisor owns everything needed to resume a vat's object graph across
/// deliveries: its bundle, its linear memory or process handle, whatever
/// local (non-durable) state the sandbox itself needs. The kernel treats it
/// as opaque and only ever calls `deliver`.
///
/// Syscalls the vat issues while processing the delivery are pushed to
/// `syscalls` as they happen, in order, rather than collected up front --
/// a vat can make a `send` syscall, get back a result promise, and issue
/// further syscalls that refer to it within the same delivery.
#[async_trait]
pub trait VatSupervisor: Send {
    /// Hand one delivery to the vat and run it to completion.
    ///
    /// Only return `Err` for failures in the sandbox machinery itself
    /// (a WASM trap the host could not route to the vat is the boundary
    /// case); anything the vat itself does wrong belongs in
    /// `DeliveryResult::Fatal`.
    async fn deliver(
        &mut self,
        vat: VatId,
        delivery: Delivery,
        syscalls: &mut dyn SyscallSink,
    ) -> anyhow::Result<DeliveryResult>;
}
