// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The crank loop.
//!
//! Grounded on `fendermint_vm_interpreter`'s `Interpreter` trait for the
//! single-method, state-in-state-out shape of one crank, and on
//! `fendermint_app`'s service loop for how a long-running process drains a
//! work queue between commits. Every crank here is exactly one sqlite
//! transaction: dequeue, translate kref<->vref at the boundary, hand the
//! delivery to a supervisor, fold its syscalls back into the same
//! transaction, commit.

mod crank;
mod dispatcher;

pub use crank::Scheduler;
pub use dispatcher::KernelSyscallDispatcher;
