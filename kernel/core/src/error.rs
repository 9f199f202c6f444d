// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

use crate::identifiers::{Kref, VatId};

/// Errors related to vat lifecycle.
#[derive(Debug, Error)]
pub enum VatError {
    #[error("vat {0} not found")]
    VatNotFound(VatId),
    #[error("vat {0} already exists")]
    VatAlreadyExists(VatId),
    #[error("vat {0} has been deleted")]
    VatDeleted(VatId),
    #[error("failed to read vat record: {0}")]
    VatReadError(String),
    #[error("supervisor stream for vat {0} could not be read: {1}")]
    SupervisorReadError(VatId, String),
}

/// Errors related to the CapTP session layer between kernel and remote peers.
#[derive(Debug, Error)]
pub enum CapTpError {
    #[error("a CapTP connection to {0} already exists")]
    ConnectionExists(String),
    #[error("no CapTP connection to {0} was found")]
    ConnectionNotFound(String),
}

/// Violations of the kernel<->supervisor duplex stream protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid envelope on the supervisor stream: {0}")]
    InvalidEnvelope(String),
    #[error("reply label {got} does not match outstanding delivery label {expected}")]
    LabelMismatch { expected: u64, got: u64 },
}

/// Errors surfaced by the persistent or kernel store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("schema violation: {0}")]
    Schema(String),
    #[error("inconsistent refcount for {kref}: {detail}")]
    InconsistentRefCount { kref: Kref, detail: String },
}

/// Errors from the remote comms subsystem.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("peer {0} is unreachable")]
    PeerUnreachable(String),
    #[error("incarnation mismatch: expected {expected}, got {got}")]
    IncarnationMismatch { expected: u64, got: u64 },
    #[error("ocap URL has been revoked")]
    UrlRevoked,
    #[error("unknown peer {0}")]
    UnknownPeer(String),
}

/// Bundle evaluation / compartment-level failures.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("bundle evaluation failed: {0}")]
    BundleError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// The union of every error kind a crank can fail with. Any occurrence here rolls
/// back the crank's transaction.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Vat(#[from] VatError),
    #[error(transparent)]
    CapTp(#[from] CapTpError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
    #[error("fatal kernel error: {0}")]
    Fatal(String),
}

impl KernelError {
    /// Whether this error should mark the whole kernel unhealthy rather than just
    /// abort the current crank.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::Fatal(_) | KernelError::Store(_))
    }
}
