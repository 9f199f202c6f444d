// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Identifiers, timestamps and the error taxonomy shared by every kernel crate.
//!
//! Grounded on `fendermint_vm_core` (small, dependency-light crate of types shared
//! across the rest of the workspace).

mod error;
mod identifiers;
mod refcount;
mod timestamp;

pub use error::{
    CapTpError, EvaluatorError, KernelError, ProtocolError, RemoteError, StoreError, VatError,
};
pub use identifiers::{
    DeviceKref, IdParseError, Kref, ObjectKref, Polarity, PromiseKref, RemotePeerId, SubclusterId,
    VatId, Vref,
};
pub use refcount::RefCountTag;
pub use timestamp::Timestamp;
