// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The persistent store: a key/value mapping from text keys to text or
// byte values, with get/set/delete/has, prefix iteration, and transactional
// batching. Grounded on `fendermint_storage`'s `KVRead`/`KVWrite`/`KVTransaction`
// trait family, adapted to a single flat namespace since our persisted layout
// already encodes hierarchy into the key text itself.
use crate::error::KVResult;

/// Read-only operations available both inside and outside a transaction.
pub trait StoreRead {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;
    fn has(&self, key: &str) -> KVResult<bool> {
        Ok(self.get(key)?.is_some())
    }
    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;
}

/// Mutating operations, only available on a write transaction.
pub trait StoreWrite: StoreRead {
    fn set(&mut self, key: &str, value: &[u8]) -> KVResult<()>;
    fn delete(&mut self, key: &str) -> KVResult<()>;
}

/// A transaction that must be explicitly committed or rolled back: the kernel
/// store opens one before each crank and commits at the end; on any thrown
/// error the transaction rolls back instead.
pub trait StoreTransaction: StoreWrite {
    fn commit(self) -> KVResult<()>;
    fn rollback(self) -> KVResult<()>;
}

/// Tabular results from the `executeQuery(sql)` inspection hook.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}
