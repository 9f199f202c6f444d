// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Acceptance queue: remote deliveries that arrived over the transport but
// haven't yet been routed into the main runqueue. Stored the same way as the
// runqueue (zero-padded sequence keys under their own prefix) so the two
// queues can be drained independently by the crank runner's tie-break.
use kernel_message::RunqueueEntry;

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};
use crate::tables::counters;

pub fn push(tx: &mut impl StoreWrite, entry: &RunqueueEntry) -> KVResult<u64> {
    let seq = counters::next(tx, counters::ACCEPTANCE_SEQ)?;
    let bytes = serde_json::to_vec(entry).map_err(KVError::Encode)?;
    tx.set(&keys::acceptance_entry(seq), &bytes)?;
    Ok(seq)
}

pub fn pop_front(tx: &mut impl StoreWrite) -> KVResult<Option<RunqueueEntry>> {
    let mut items = tx.iter_prefix(keys::acceptance_prefix())?;
    if items.is_empty() {
        return Ok(None);
    }
    let (key, bytes) = items.remove(0);
    tx.delete(&key)?;
    Ok(Some(serde_json::from_slice(&bytes).map_err(KVError::Decode)?))
}

pub fn len(tx: &impl StoreRead) -> KVResult<usize> {
    Ok(tx.iter_prefix(keys::acceptance_prefix())?.len())
}

pub fn is_empty(tx: &impl StoreRead) -> KVResult<bool> {
    Ok(len(tx)? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_core::{Kref, ObjectKref};
    use kernel_message::{CapData, Value};

    fn send(target: Kref) -> RunqueueEntry {
        RunqueueEntry::Send {
            target,
            method: "foo".to_string(),
            args: CapData::encode(&Value::Undefined).unwrap(),
            result: None,
        }
    }

    #[test]
    fn push_and_pop_is_fifo_and_independent_of_the_runqueue() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let a = Kref::Object(ObjectKref::new(1));
        let b = Kref::Object(ObjectKref::new(2));
        push(&mut tx, &send(a)).unwrap();
        push(&mut tx, &send(b)).unwrap();
        crate::tables::runqueue::push(&mut tx, &send(a)).unwrap();

        assert_eq!(len(&tx).unwrap(), 2);
        assert_eq!(crate::tables::runqueue::len(&tx).unwrap(), 1);

        let first = pop_front(&mut tx).unwrap().unwrap();
        match first {
            RunqueueEntry::Send { target, .. } => assert_eq!(target, a),
            _ => panic!("expected send"),
        }
        assert_eq!(len(&tx).unwrap(), 1);
        tx.commit().unwrap();
    }
}
