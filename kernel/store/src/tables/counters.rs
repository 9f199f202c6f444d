// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Monotonic counters backing kref/vref/runqueue-sequence allocation and the
// remote-peer incarnation number.
use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

pub const OBJECT: &str = "object";
pub const PROMISE: &str = "promise";
pub const DEVICE: &str = "device";
pub const VAT: &str = "vat";
pub const SUBCLUSTER: &str = "subcluster";
pub const REMOTE_PEER: &str = "remote_peer";
pub const RUNQUEUE_SEQ: &str = "runqueue_seq";
pub const ACCEPTANCE_SEQ: &str = "acceptance_seq";

fn read_u64(tx: &impl StoreRead, key: &str) -> KVResult<u64> {
    match tx.get(key)? {
        Some(bytes) => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| KVError::Inconsistent(format!("counter {key} is not utf8: {e}")))?;
            text.parse()
                .map_err(|e| KVError::Inconsistent(format!("counter {key} is not a number: {e}")))
        }
        None => Ok(0),
    }
}

/// Allocate and return the next value for `name`, starting at 1.
pub fn next(tx: &mut impl StoreWrite, name: &str) -> KVResult<u64> {
    let key = keys::counter(name);
    let current = read_u64(tx, &key)?;
    let next = current + 1;
    tx.set(&key, next.to_string().as_bytes())?;
    Ok(next)
}

pub fn peek(tx: &impl StoreRead, name: &str) -> KVResult<u64> {
    read_u64(tx, &keys::counter(name))
}

pub fn incarnation(tx: &impl StoreRead) -> KVResult<u64> {
    read_u64(tx, keys::INCARNATION)
}

pub fn bump_incarnation(tx: &mut impl StoreWrite) -> KVResult<u64> {
    let current = incarnation(tx)?;
    let next = current + 1;
    tx.set(keys::INCARNATION, next.to_string().as_bytes())?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn next_is_monotonic_and_independent_per_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        assert_eq!(next(&mut tx, OBJECT).unwrap(), 1);
        assert_eq!(next(&mut tx, OBJECT).unwrap(), 2);
        assert_eq!(next(&mut tx, PROMISE).unwrap(), 1);
        tx.commit().unwrap();
    }
}
