// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Directory tables: vat records, subcluster records and remote-peer records.
// Each is a small struct keyed by its id; nothing here needs prefix scans
// beyond "list everything of this kind".
use kernel_core::VatId;
use serde::{Deserialize, Serialize};

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatLifecycle {
    Running,
    Terminated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VatRecord {
    pub id: VatId,
    pub subcluster: String,
    pub bundle_name: String,
    pub lifecycle: VatLifecycle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubclusterRecord {
    pub id: String,
    pub vats: Vec<VatId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemotePeerRecord {
    pub id: String,
    pub address: String,
    pub incarnation: u64,
}

fn get<T: serde::de::DeserializeOwned>(tx: &impl StoreRead, key: &str) -> KVResult<Option<T>> {
    match tx.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(KVError::Decode)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize>(tx: &mut impl StoreWrite, key: &str, value: &T) -> KVResult<()> {
    let bytes = serde_json::to_vec(value).map_err(KVError::Encode)?;
    tx.set(key, &bytes)
}

pub fn put_vat(tx: &mut impl StoreWrite, record: &VatRecord) -> KVResult<()> {
    put(tx, &keys::vat_record(record.id), record)
}

pub fn get_vat(tx: &impl StoreRead, id: VatId) -> KVResult<Option<VatRecord>> {
    get(tx, &keys::vat_record(id))
}

pub fn delete_vat(tx: &mut impl StoreWrite, id: VatId) -> KVResult<()> {
    tx.delete(&keys::vat_record(id))
}

pub fn list_vats(tx: &impl StoreRead) -> KVResult<Vec<VatRecord>> {
    let mut out = Vec::new();
    for (_, bytes) in tx.iter_prefix(keys::vat_prefix())? {
        out.push(serde_json::from_slice(&bytes).map_err(KVError::Decode)?);
    }
    Ok(out)
}

pub fn put_subcluster(tx: &mut impl StoreWrite, record: &SubclusterRecord) -> KVResult<()> {
    put(tx, &keys::subcluster_record(&record.id), record)
}

pub fn get_subcluster(tx: &impl StoreRead, id: &str) -> KVResult<Option<SubclusterRecord>> {
    get(tx, &keys::subcluster_record(id))
}

pub fn delete_subcluster(tx: &mut impl StoreWrite, id: &str) -> KVResult<()> {
    tx.delete(&keys::subcluster_record(id))
}

pub fn list_subclusters(tx: &impl StoreRead) -> KVResult<Vec<SubclusterRecord>> {
    let mut out = Vec::new();
    for (_, bytes) in tx.iter_prefix(keys::subcluster_prefix())? {
        out.push(serde_json::from_slice(&bytes).map_err(KVError::Decode)?);
    }
    Ok(out)
}

pub fn put_remote(tx: &mut impl StoreWrite, record: &RemotePeerRecord) -> KVResult<()> {
    put(tx, &keys::remote_record(&record.id), record)
}

pub fn get_remote(tx: &impl StoreRead, id: &str) -> KVResult<Option<RemotePeerRecord>> {
    get(tx, &keys::remote_record(id))
}

pub fn list_remotes(tx: &impl StoreRead) -> KVResult<Vec<RemotePeerRecord>> {
    let mut out = Vec::new();
    for (_, bytes) in tx.iter_prefix(keys::remote_prefix())? {
        out.push(serde_json::from_slice(&bytes).map_err(KVError::Decode)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn vat_records_roundtrip_and_list() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let record = VatRecord {
            id: VatId::new(1),
            subcluster: "s1".to_string(),
            bundle_name: "demo".to_string(),
            lifecycle: VatLifecycle::Running,
        };
        put_vat(&mut tx, &record).unwrap();
        assert_eq!(get_vat(&tx, VatId::new(1)).unwrap(), Some(record));
        assert_eq!(list_vats(&tx).unwrap().len(), 1);
        tx.commit().unwrap();
    }
}
