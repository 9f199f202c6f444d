// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Out-of-process vat workers.
//!
//! Grounded on `kernel_core::ProtocolError`'s label-mismatch modeling of the
//! kernel<->supervisor duplex stream, and on the general shape of
//! `fendermint_vm_interpreter`'s stacked interpreters: this crate supplies
//! one more implementation of `kernel_supervisor::VatSupervisor`, this time
//! backed by a child process instead of an in-process WASM instance.

mod protocol;
mod service;
mod worker;

pub use protocol::{FromChild, ToChild};
pub use service::{ProcessWorkerService, VatWorkerService};
pub use worker::ProcessSupervisor;
