// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The persistent store and the typed kernel store facade built on top of it.
//!
//! Grounded on `fendermint_storage` (the `KVStore` trait family) and
//! `fendermint_rocksdb` (the transaction-guard idiom), backed by `rusqlite`
//! instead of RocksDB so the store can expose a real SQL inspection hook.

mod error;
mod kernel_store;
mod keys;
mod kv;
mod sqlite;
pub mod tables;

pub use error::{KVError, KVResult};
pub use kernel_store::{KernelReadTx, KernelStore, KernelTx};
pub use kv::{QueryResult, StoreRead, StoreTransaction, StoreWrite};
pub use sqlite::{SqliteReadTx, SqliteStore, SqliteWriteTx};
