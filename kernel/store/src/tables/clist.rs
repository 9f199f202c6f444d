// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Per-vat clist: a bijection between krefs (kernel-space) and vrefs
// (vat-space). Exactly one kref maps to at most one vref per vat, and vice
// versa. Each entry carries a reachable-flag and a recognizable-flag, used by
// garbage collection to know whether this vat still holds a strong or a
// merely-recognizing reference.
use kernel_core::{Kref, VatId};
use serde::{Deserialize, Serialize};

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClistEntry {
    pub kref: Kref,
    pub vref: String,
    pub reachable: bool,
    pub recognizable: bool,
}

fn get_entry(tx: &impl StoreRead, vat: VatId, kref: &Kref) -> KVResult<Option<ClistEntry>> {
    match tx.get(&keys::clist_c2v(vat, kref))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(KVError::Decode)?)),
        None => Ok(None),
    }
}

fn put_entry(tx: &mut impl StoreWrite, vat: VatId, entry: &ClistEntry) -> KVResult<()> {
    let bytes = serde_json::to_vec(entry).map_err(KVError::Encode)?;
    tx.set(&keys::clist_c2v(vat, &entry.kref), &bytes)?;
    tx.set(&keys::clist_v2c(vat, &entry.vref), entry.kref.to_string().as_bytes())
}

/// Add a fresh (kref, vref) pair to `vat`'s clist. Errors if either half is
/// already bound — callers must check first via `by_kref`/`by_vref`.
pub fn add(tx: &mut impl StoreWrite, vat: VatId, kref: Kref, vref: String) -> KVResult<()> {
    if get_entry(tx, vat, &kref)?.is_some() {
        return Err(KVError::Inconsistent(format!(
            "kref {kref} is already in vat {vat}'s clist"
        )));
    }
    put_entry(
        tx,
        vat,
        &ClistEntry {
            kref,
            vref,
            reachable: true,
            recognizable: true,
        },
    )
}

pub fn by_kref(tx: &impl StoreRead, vat: VatId, kref: &Kref) -> KVResult<Option<ClistEntry>> {
    get_entry(tx, vat, kref)
}

pub fn by_vref(tx: &impl StoreRead, vat: VatId, vref: &str) -> KVResult<Option<Kref>> {
    match tx.get(&keys::clist_v2c(vat, vref))? {
        Some(bytes) => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| KVError::Inconsistent(format!("clist v2c value is not utf8: {e}")))?;
            let kref: Kref = text
                .parse()
                .map_err(|e| KVError::Inconsistent(format!("clist v2c value {text} is not a kref: {e}")))?;
            Ok(Some(kref))
        }
        None => Ok(None),
    }
}

/// Every (kref, vref) pair currently held by `vat`.
pub fn list_for_vat(tx: &impl StoreRead, vat: VatId) -> KVResult<Vec<ClistEntry>> {
    let mut out = Vec::new();
    for (_, bytes) in tx.iter_prefix(&keys::clist_c2v_prefix(vat))? {
        out.push(serde_json::from_slice(&bytes).map_err(KVError::Decode)?);
    }
    Ok(out)
}

/// `dropImports`: the vat no longer holds a strong reference, but may still
/// recognize it for equality.
pub fn drop_reachable(tx: &mut impl StoreWrite, vat: VatId, kref: &Kref) -> KVResult<()> {
    let mut entry =
        get_entry(tx, vat, kref)?.ok_or_else(|| KVError::Inconsistent(format!("kref {kref} not in vat {vat}'s clist")))?;
    entry.reachable = false;
    put_entry(tx, vat, &entry)
}

/// `retireImports`: the vat can no longer even recognize the kref; this also
/// removes the clist entry entirely.
pub fn retire(tx: &mut impl StoreWrite, vat: VatId, kref: &Kref) -> KVResult<()> {
    let entry =
        get_entry(tx, vat, kref)?.ok_or_else(|| KVError::Inconsistent(format!("kref {kref} not in vat {vat}'s clist")))?;
    tx.delete(&keys::clist_c2v(vat, kref))?;
    tx.delete(&keys::clist_v2c(vat, &entry.vref))
}

/// Re-import after a drop: reachable flips back on, counts bump separately
/// in the object table.
pub fn reimport(tx: &mut impl StoreWrite, vat: VatId, kref: &Kref) -> KVResult<()> {
    let mut entry =
        get_entry(tx, vat, kref)?.ok_or_else(|| KVError::Inconsistent(format!("kref {kref} not in vat {vat}'s clist")))?;
    entry.reachable = true;
    put_entry(tx, vat, &entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_core::ObjectKref;

    #[test]
    fn add_lookup_and_retire_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let kref = Kref::Object(ObjectKref::new(7));
        let mut tx = store.begin_write().unwrap();
        add(&mut tx, vat, kref.clone(), "o+1".to_string()).unwrap();

        assert_eq!(by_vref(&tx, vat, "o+1").unwrap(), Some(kref.clone()));
        assert_eq!(by_kref(&tx, vat, &kref).unwrap().unwrap().vref, "o+1");

        drop_reachable(&mut tx, vat, &kref).unwrap();
        assert!(!by_kref(&tx, vat, &kref).unwrap().unwrap().reachable);

        retire(&mut tx, vat, &kref).unwrap();
        assert!(by_kref(&tx, vat, &kref).unwrap().is_none());
        assert!(by_vref(&tx, vat, "o+1").unwrap().is_none());
        tx.commit().unwrap();
    }

    #[test]
    fn double_add_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let kref = Kref::Object(ObjectKref::new(1));
        let mut tx = store.begin_write().unwrap();
        add(&mut tx, vat, kref.clone(), "o+1".to_string()).unwrap();
        assert!(add(&mut tx, vat, kref, "o+2".to_string()).is_err());
    }
}
