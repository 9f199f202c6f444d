// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Runqueue and GC action queue. Runqueue entries are stored under
// zero-padded sequence keys so `iter_prefix` yields FIFO order; GC actions
// are coalesced per (vat, kind) by using that pair as the key, so repeated
// drops of the same vat before the next crank collapse into one action.
use kernel_core::{Kref, VatId};
use kernel_message::{GcAction, GcActionKind, RunqueueEntry};

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};
use crate::tables::counters;

fn gc_kind_str(kind: GcActionKind) -> &'static str {
    match kind {
        GcActionKind::Drop => "drop",
        GcActionKind::Retire => "retire",
    }
}

pub fn push(tx: &mut impl StoreWrite, entry: &RunqueueEntry) -> KVResult<u64> {
    let seq = counters::next(tx, counters::RUNQUEUE_SEQ)?;
    let bytes = serde_json::to_vec(entry).map_err(KVError::Encode)?;
    tx.set(&keys::runqueue_entry(seq), &bytes)?;
    Ok(seq)
}

/// Pop the oldest runqueue entry, if any. The scheduler runs exactly one
/// entry per crank (spec's crank-commit model is enforced by the caller).
pub fn pop_front(tx: &mut impl StoreWrite) -> KVResult<Option<RunqueueEntry>> {
    let mut items = tx.iter_prefix(keys::runqueue_prefix())?;
    if items.is_empty() {
        return Ok(None);
    }
    let (key, bytes) = items.remove(0);
    tx.delete(&key)?;
    Ok(Some(serde_json::from_slice(&bytes).map_err(KVError::Decode)?))
}

pub fn len(tx: &impl StoreRead) -> KVResult<usize> {
    Ok(tx.iter_prefix(keys::runqueue_prefix())?.len())
}

pub fn is_empty(tx: &impl StoreRead) -> KVResult<bool> {
    Ok(len(tx)? == 0)
}

/// Coalesce `krefs` into the pending GC action for (vat, kind). Retire
/// implies drop: if a retire action already exists for a kref, a later drop
/// is a no-op for that kref.
pub fn push_gc_action(tx: &mut impl StoreWrite, vat: VatId, kind: GcActionKind, krefs: Vec<Kref>) -> KVResult<()> {
    if krefs.is_empty() {
        return Ok(());
    }
    // Coalescing is per-kref: each kref gets its own slot so a retire for one
    // kref can't be clobbered by a drop for another sharing the same vat/kind.
    for kref in &krefs {
        let action_key = keys::gc_action(vat, gc_kind_str(kind), kref);
        if kind == GcActionKind::Drop {
            let retire_key = keys::gc_action(vat, gc_kind_str(GcActionKind::Retire), kref);
            if tx.has(&retire_key)? {
                continue;
            }
        }
        tx.set(&action_key, b"1")?;
    }
    Ok(())
}

/// Drain every pending GC action as `gc-action` runqueue entries, one per
/// (vat, kind) with all its coalesced krefs batched together.
pub fn flush_gc_actions_to_runqueue(tx: &mut impl StoreWrite) -> KVResult<usize> {
    use std::collections::BTreeMap;

    let raw = tx.iter_prefix(keys::gc_prefix())?;
    let mut grouped: BTreeMap<(VatId, GcActionKind), Vec<Kref>> = BTreeMap::new();
    let mut keys_to_delete = Vec::new();
    for (key, _) in raw {
        keys_to_delete.push(key.clone());
        let mut parts = key.splitn(4, '.');
        let _ = parts.next();
        let vat_str = parts.next().ok_or_else(|| KVError::Inconsistent(format!("malformed gc key {key}")))?;
        let kind_str = parts.next().ok_or_else(|| KVError::Inconsistent(format!("malformed gc key {key}")))?;
        let kref_str = parts.next().ok_or_else(|| KVError::Inconsistent(format!("malformed gc key {key}")))?;
        let vat: VatId = vat_str
            .parse()
            .map_err(|_| KVError::Inconsistent(format!("malformed gc key {key}")))?;
        let kind = match kind_str {
            "drop" => GcActionKind::Drop,
            "retire" => GcActionKind::Retire,
            other => return Err(KVError::Inconsistent(format!("unknown gc action kind {other}"))),
        };
        let kref: Kref = kref_str
            .parse()
            .map_err(|_| KVError::Inconsistent(format!("malformed gc key {key}")))?;
        grouped.entry((vat, kind)).or_default().push(kref);
    }

    let count = grouped.len();
    for ((vat, kind), krefs) in grouped {
        let entry = RunqueueEntry::GcAction(GcAction { kind, vat, krefs });
        push(tx, &entry)?;
    }
    for key in keys_to_delete {
        tx.delete(&key)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_core::{ObjectKref, PromiseKref};
    use kernel_message::CapData;
    use kernel_message::Value;

    fn send(target: Kref) -> RunqueueEntry {
        RunqueueEntry::Send {
            target,
            method: "foo".to_string(),
            args: CapData::encode(&Value::Undefined).unwrap(),
            result: None::<PromiseKref>,
        }
    }

    #[test]
    fn push_and_pop_is_fifo() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let a = Kref::Object(ObjectKref::new(1));
        let b = Kref::Object(ObjectKref::new(2));
        push(&mut tx, &send(a)).unwrap();
        push(&mut tx, &send(b)).unwrap();

        let first = pop_front(&mut tx).unwrap().unwrap();
        match first {
            RunqueueEntry::Send { target, .. } => assert_eq!(target, a),
            _ => panic!("expected send"),
        }
        assert_eq!(len(&tx).unwrap(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn gc_actions_coalesce_and_retire_wins_over_drop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let kref = Kref::Object(ObjectKref::new(5));
        let mut tx = store.begin_write().unwrap();
        push_gc_action(&mut tx, vat, GcActionKind::Retire, vec![kref]).unwrap();
        push_gc_action(&mut tx, vat, GcActionKind::Drop, vec![kref]).unwrap();

        let flushed = flush_gc_actions_to_runqueue(&mut tx).unwrap();
        assert_eq!(flushed, 1);

        let entry = pop_front(&mut tx).unwrap().unwrap();
        match entry {
            RunqueueEntry::GcAction(action) => {
                assert_eq!(action.kind, GcActionKind::Retire);
                assert_eq!(action.krefs, vec![kref]);
            }
            _ => panic!("expected gc action"),
        }
        tx.commit().unwrap();
    }
}

#[cfg(test)]
mod fifo_property_tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_message::{CapData, Value};
    use kernel_testing::arb::ArbKref;
    use quickcheck_macros::quickcheck;

    /// Krefs come out of the runqueue in exactly the order they went in,
    /// no matter how many entries are pushed before the first pop.
    #[quickcheck]
    fn pop_order_matches_push_order(krefs: Vec<ArbKref>) -> bool {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let targets: Vec<Kref> = krefs.into_iter().map(|ArbKref(k)| k).collect();
        for target in &targets {
            push(
                &mut tx,
                &RunqueueEntry::Send {
                    target: *target,
                    method: "foo".to_string(),
                    args: CapData::encode(&Value::Undefined).unwrap(),
                    result: None,
                },
            )
            .unwrap();
        }

        for expected in &targets {
            let entry = pop_front(&mut tx).unwrap().unwrap();
            let RunqueueEntry::Send { target, .. } = entry else {
                return false;
            };
            if target != *expected {
                return false;
            }
        }
        pop_front(&mut tx).unwrap().is_none()
    }
}
