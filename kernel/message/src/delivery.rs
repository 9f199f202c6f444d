// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Deliveries sent from kernel to supervisor over the duplex message stream.
use kernel_core::Vref;
use serde::{Deserialize, Serialize};

use crate::capdata::CapData;

/// One `send` or `notify` handed to a vat's `buildRootObject`/`start`-produced
/// object graph, translated from krefs to vrefs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeliveryKind {
    Send {
        target: Vref,
        method: String,
        args: CapData,
        result: Option<Vref>,
    },
    Notify {
        promise: Vref,
        resolution: Resolution,
    },
}

/// How a promise resolved, translated into the receiving vat's vref space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Fulfilled(CapData),
    Rejected(CapData),
}

/// A delivery from kernel to supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Delivery {
    /// First delivery to a newly launched vat: run its entry point.
    StartVat {
        params: CapData,
    },
    Deliver(DeliveryKind),
    DropExports(Vec<Vref>),
    RetireExports(Vec<Vref>),
    RetireImports(Vec<Vref>),
    BringOutYourDead,
    StopVat,
}

/// What the supervisor's local object registry returned from a `Send` delivery.
/// Every delivery gets exactly one reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeliveryResult {
    /// The delivery completed normally; `resolved` carries the result of a `Send`
    /// that could be resolved synchronously from the vat's point of view (it may
    /// still be a promise).
    Ok,
    /// The vat reported a fatal error (bundle exception, unhandled rejection,
    /// protocol violation); the kernel treats this as vat termination.
    Fatal(String),
}
