// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Object table (data model: "Object record {owner vat, export vref, reachable
// refcount, recognizable refcount}. reachable <= recognizable. An object with
// recognizable = 0 is eligible for retire.").
use kernel_core::{Kref, RefCountTag, VatId};
use serde::{Deserialize, Serialize};

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub owner: VatId,
    pub export_vref: String,
    pub reachable: u64,
    pub recognizable: u64,
}

impl ObjectRecord {
    pub fn new(owner: VatId, export_vref: String) -> Self {
        Self {
            owner,
            export_vref,
            reachable: 1,
            recognizable: 1,
        }
    }

    /// The invariant that must hold after every committed crank.
    pub fn is_consistent(&self) -> bool {
        self.reachable <= self.recognizable
    }

    pub fn eligible_for_retire(&self) -> bool {
        self.recognizable == 0
    }
}

/// Whether a decrement emptied out the count it touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecrementOutcome {
    pub was_last_reachable: bool,
    pub was_last_recognizable: bool,
}

fn row_key(kref: &Kref) -> String {
    keys::kref(kref)
}

pub fn get(tx: &impl StoreRead, kref: &Kref) -> KVResult<Option<ObjectRecord>> {
    match tx.get(&row_key(kref))? {
        Some(bytes) => {
            let record = serde_json::from_slice(&bytes).map_err(KVError::Decode)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Every object record in the table. Object krefs all share the `ko` prefix,
/// disjoint from promise (`kp`) and device (`kd`) krefs, so a prefix scan
/// over that letter enumerates exactly this table.
pub fn list_all(tx: &impl StoreRead) -> KVResult<Vec<(Kref, ObjectRecord)>> {
    let mut out = Vec::new();
    for (key, bytes) in tx.iter_prefix(kernel_core::ObjectKref::PREFIX)? {
        let kref: Kref = key
            .parse()
            .map_err(|e| KVError::Inconsistent(format!("object table key {key} is not a kref: {e}")))?;
        let record = serde_json::from_slice(&bytes).map_err(KVError::Decode)?;
        out.push((kref, record));
    }
    Ok(out)
}

fn put(tx: &mut impl StoreWrite, kref: &Kref, record: &ObjectRecord) -> KVResult<()> {
    let bytes = serde_json::to_vec(record).map_err(KVError::Encode)?;
    tx.set(&row_key(kref), &bytes)
}

/// `initObject(vat, vref) -> kref`: the caller has already allocated `kref`
/// via the counters table.
pub fn init_object(
    tx: &mut impl StoreWrite,
    kref: Kref,
    owner: VatId,
    export_vref: String,
) -> KVResult<()> {
    let record = ObjectRecord::new(owner, export_vref);
    put(tx, &kref, &record)
}

pub fn increment_ref_count(tx: &mut impl StoreWrite, kref: &Kref, tag: RefCountTag) -> KVResult<()> {
    let mut record = get(tx, kref)?.ok_or_else(|| KVError::Inconsistent(format!("unknown object {kref}")))?;
    match tag {
        RefCountTag::Reachable => record.reachable += 1,
        RefCountTag::Recognizable => {
            record.reachable += 1;
            record.recognizable += 1;
        }
    }
    put(tx, kref, &record)
}

/// `decrementRefCount(kref, tag) -> {wasLast}`. Recognizable decrements
/// imply a reachable decrement (recognizable is never below reachable).
pub fn decrement_ref_count(
    tx: &mut impl StoreWrite,
    kref: &Kref,
    tag: RefCountTag,
) -> KVResult<DecrementOutcome> {
    let mut record = get(tx, kref)?.ok_or_else(|| KVError::Inconsistent(format!("unknown object {kref}")))?;
    let was_last_reachable;
    let mut was_last_recognizable = false;
    match tag {
        RefCountTag::Reachable => {
            record.reachable = record.reachable.saturating_sub(1);
            was_last_reachable = record.reachable == 0;
        }
        RefCountTag::Recognizable => {
            record.reachable = record.reachable.saturating_sub(1);
            record.recognizable = record.recognizable.saturating_sub(1);
            was_last_reachable = record.reachable == 0;
            was_last_recognizable = record.recognizable == 0;
        }
    }
    if !record.is_consistent() {
        return Err(KVError::Inconsistent(format!(
            "object {kref} violated reachable <= recognizable after decrement"
        )));
    }
    put(tx, kref, &record)?;
    Ok(DecrementOutcome {
        was_last_reachable,
        was_last_recognizable,
    })
}

pub fn delete(tx: &mut impl StoreWrite, kref: &Kref) -> KVResult<()> {
    tx.delete(&row_key(kref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_core::ObjectKref;

    #[test]
    fn decrement_tracks_last_flags_and_invariant() {
        let store = SqliteStore::open_in_memory().unwrap();
        let kref = Kref::Object(ObjectKref::new(1));
        let mut tx = store.begin_write().unwrap();
        init_object(&mut tx, kref.clone(), VatId::new(1), "o+1".to_string()).unwrap();
        increment_ref_count(&mut tx, &kref, RefCountTag::Reachable).unwrap();

        let record = get(&tx, &kref).unwrap().unwrap();
        assert_eq!(record.reachable, 2);
        assert_eq!(record.recognizable, 1);

        let outcome = decrement_ref_count(&mut tx, &kref, RefCountTag::Reachable).unwrap();
        assert!(!outcome.was_last_reachable);

        let outcome = decrement_ref_count(&mut tx, &kref, RefCountTag::Recognizable).unwrap();
        assert!(outcome.was_last_reachable);
        assert!(outcome.was_last_recognizable);

        let record = get(&tx, &kref).unwrap().unwrap();
        assert!(record.eligible_for_retire());
        tx.commit().unwrap();
    }
}

#[cfg(test)]
mod invariant_tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_core::ObjectKref;
    use kernel_testing::arb::ArbRefCountTag;
    use quickcheck_macros::quickcheck;

    /// Every increment this object sees is matched one-for-one by a decrement
    /// of the same tag before the next op, so `reachable <= recognizable`
    /// must hold after each step regardless of which tags the sequence picks.
    #[quickcheck]
    fn reachable_never_exceeds_recognizable(ops: Vec<ArbRefCountTag>) -> bool {
        let store = SqliteStore::open_in_memory().unwrap();
        let kref = Kref::Object(ObjectKref::new(1));
        let mut tx = store.begin_write().unwrap();
        init_object(&mut tx, kref, VatId::new(1), "o+1".to_string()).unwrap();

        for ArbRefCountTag(tag) in ops {
            increment_ref_count(&mut tx, &kref, tag).unwrap();
            if decrement_ref_count(&mut tx, &kref, tag).is_err() {
                return false;
            }
        }
        get(&tx, &kref).unwrap().unwrap().is_consistent()
    }
}
