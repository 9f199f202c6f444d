// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Syscalls sent from supervisor to kernel, interleaved within a delivery window.
use kernel_core::Vref;
use serde::{Deserialize, Serialize};

use crate::capdata::CapData;

/// A syscall issued by a vat while processing a delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Syscall {
    Send {
        target: Vref,
        method: String,
        args: CapData,
        result: Option<Vref>,
    },
    Resolve {
        promise: Vref,
        rejected: bool,
        value: CapData,
    },
    Subscribe {
        promise: Vref,
    },
    /// The vat is voluntarily shutting down.
    Exit {
        failure: Option<CapData>,
    },
    VatstoreGet {
        key: String,
    },
    VatstoreSet {
        key: String,
        value: String,
    },
    VatstoreDelete {
        key: String,
    },
    DropImports(Vec<Vref>),
    RetireImports(Vec<Vref>),
    RetireExports(Vec<Vref>),
}

/// The kernel's answer to a syscall, delivered back to the supervisor before it
/// continues running the current delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyscallResult {
    Ok,
    /// Result promise allocated for a `send` syscall with no explicit result vref.
    ResultPromise(Vref),
    VatstoreValue(Option<String>),
    Error(String),
}
