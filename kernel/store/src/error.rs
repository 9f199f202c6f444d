// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Errors raised by the persistent store and the kernel store facade. Any
/// variant here rolls back the in-flight crank transaction: a consistency
/// failure here always raises a fatal kernel error.
#[derive(Debug, Error)]
pub enum KVError {
    #[error("store transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),
    #[error("failed to serialize value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to deserialize value: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("consistency failure: {0}")]
    Inconsistent(String),
}

pub type KVResult<T> = Result<T, KVError>;
