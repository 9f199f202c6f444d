// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Promise table (data model: "Promise record {state, decider vat?,
// subscribers: set<vat>, queue: ordered list of pending messages, resolution:
// capdata?}. An unresolved promise has exactly one decider... A resolved
// promise stores capdata and has no queue.").
use std::collections::BTreeSet;

use kernel_core::{KernelError, PromiseKref, StoreError, VatId};
use kernel_message::CapData;
use serde::{Deserialize, Serialize};

use crate::error::{KVError, KVResult};
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromiseState {
    Unresolved,
    Fulfilled,
    Rejected,
}

/// A message queued against a still-unresolved promise, pending pipelining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub method: String,
    pub args: CapData,
    pub result: Option<PromiseKref>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub state: PromiseState,
    pub decider: Option<VatId>,
    pub subscribers: BTreeSet<VatId>,
    pub queue: Vec<PendingMessage>,
    pub resolution: Option<CapData>,
}

impl PromiseRecord {
    pub fn new(decider: Option<VatId>) -> Self {
        Self {
            state: PromiseState::Unresolved,
            decider,
            subscribers: BTreeSet::new(),
            queue: Vec::new(),
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state != PromiseState::Unresolved
    }
}

fn row_key(kpref: PromiseKref) -> String {
    keys::kref(&kernel_core::Kref::Promise(kpref))
}

pub fn get(tx: &impl StoreRead, kpref: PromiseKref) -> KVResult<Option<PromiseRecord>> {
    match tx.get(&row_key(kpref))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(KVError::Decode)?)),
        None => Ok(None),
    }
}

fn put(tx: &mut impl StoreWrite, kpref: PromiseKref, record: &PromiseRecord) -> KVResult<()> {
    let bytes = serde_json::to_vec(record).map_err(KVError::Encode)?;
    tx.set(&row_key(kpref), &bytes)
}

/// `initPromise(decider?) -> kpref`: caller allocates `kpref` via counters.
pub fn init_promise(tx: &mut impl StoreWrite, kpref: PromiseKref, decider: Option<VatId>) -> KVResult<()> {
    put(tx, kpref, &PromiseRecord::new(decider))
}

fn require(tx: &impl StoreRead, kpref: PromiseKref) -> KVResult<PromiseRecord> {
    get(tx, kpref)?.ok_or_else(|| KVError::Inconsistent(format!("unknown promise {kpref}")))
}

pub fn enqueue_message(tx: &mut impl StoreWrite, kpref: PromiseKref, message: PendingMessage) -> KVResult<()> {
    let mut record = require(tx, kpref)?;
    record.queue.push(message);
    put(tx, kpref, &record)
}

pub fn subscribe(tx: &mut impl StoreWrite, vat: VatId, kpref: PromiseKref) -> KVResult<()> {
    let mut record = require(tx, kpref)?;
    record.subscribers.insert(vat);
    put(tx, kpref, &record)
}

/// `resolvePromise(kpref, capdata, isRejection)`: moves state to
/// fulfilled/rejected, records the resolution and drains the queue (the
/// caller is responsible for turning the drained messages into runqueue
/// sends — pipelining forward — and notifies for each subscriber).
pub fn resolve_promise(
    tx: &mut impl StoreWrite,
    kpref: PromiseKref,
    resolution: CapData,
    is_rejection: bool,
) -> KVResult<(Vec<PendingMessage>, BTreeSet<VatId>)> {
    let mut record = require(tx, kpref)?;
    if record.is_resolved() {
        return Err(KVError::Inconsistent(format!("promise {kpref} already resolved")));
    }
    record.state = if is_rejection {
        PromiseState::Rejected
    } else {
        PromiseState::Fulfilled
    };
    record.decider = None;
    record.resolution = Some(resolution);
    let queue = std::mem::take(&mut record.queue);
    let subscribers = record.subscribers.clone();
    put(tx, kpref, &record)?;
    Ok((queue, subscribers))
}

/// Decider transfer on resolve-to-promise (only legal while the receiving
/// promise is unresolved).
pub fn reassign_decider(tx: &mut impl StoreWrite, kpref: PromiseKref, decider: Option<VatId>) -> KVResult<()> {
    let mut record = require(tx, kpref)?;
    if record.is_resolved() {
        return Err(KVError::Inconsistent(format!(
            "cannot reassign decider of already-resolved promise {kpref}"
        )));
    }
    record.decider = decider;
    put(tx, kpref, &record)
}

pub fn remove_promise(tx: &mut impl StoreWrite, kpref: PromiseKref) -> KVResult<()> {
    tx.delete(&row_key(kpref))
}

pub fn list_all(tx: &impl StoreRead) -> KVResult<Vec<(PromiseKref, PromiseRecord)>> {
    use std::str::FromStr;
    tx.iter_prefix(PromiseKref::PREFIX)?
        .into_iter()
        .map(|(key, bytes)| {
            let kpref = PromiseKref::from_str(&key)
                .map_err(|e| KVError::Decode(format!("bad promise key {key}: {e}")))?;
            let record = serde_json::from_slice(&bytes).map_err(KVError::Decode)?;
            Ok((kpref, record))
        })
        .collect()
}

/// Reject every promise for which `vat` is decider, used when a vat is
/// terminated (cancellation cancels "every promise for which it is decider").
pub fn reject_all_for_decider(
    tx: &mut impl StoreWrite,
    all: &[PromiseKref],
    vat: VatId,
    terminated_error: CapData,
) -> KVResult<Vec<PromiseKref>> {
    let mut rejected = Vec::new();
    for &kpref in all {
        if let Some(record) = get(tx, kpref)? {
            if record.decider == Some(vat) && !record.is_resolved() {
                resolve_promise(tx, kpref, terminated_error.clone(), true)?;
                rejected.push(kpref);
            }
        }
    }
    Ok(rejected)
}

/// Reject every still-unresolved promise, used when the kernel's own
/// incarnation bumps on restart: every promise already in the store was
/// necessarily issued under the old incarnation, and nothing vouches that
/// its decider vat picks back up where it left off.
pub fn reject_all_unresolved(
    tx: &mut impl StoreWrite,
    all: &[PromiseKref],
    terminated_error: CapData,
) -> KVResult<Vec<PromiseKref>> {
    let mut rejected = Vec::new();
    for &kpref in all {
        if let Some(record) = get(tx, kpref)? {
            if !record.is_resolved() {
                resolve_promise(tx, kpref, terminated_error.clone(), true)?;
                rejected.push(kpref);
            }
        }
    }
    Ok(rejected)
}

pub fn to_kernel_error(e: KVError) -> KernelError {
    KernelError::Store(StoreError::Transaction(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use kernel_message::Value;

    #[test]
    fn resolve_drains_queue_and_subscribers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let kpref = PromiseKref::new(1);
        init_promise(&mut tx, kpref, Some(VatId::new(1))).unwrap();
        subscribe(&mut tx, VatId::new(2), kpref).unwrap();
        enqueue_message(
            &mut tx,
            kpref,
            PendingMessage {
                method: "foo".to_string(),
                args: CapData::encode(&Value::Undefined).unwrap(),
                result: None,
            },
        )
        .unwrap();

        let (queue, subscribers) =
            resolve_promise(&mut tx, kpref, CapData::encode(&Value::Bool(true)).unwrap(), false).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(subscribers.contains(&VatId::new(2)));

        let record = get(&tx, kpref).unwrap().unwrap();
        assert!(record.is_resolved());
        assert!(record.queue.is_empty());
        assert!(record.decider.is_none());
        tx.commit().unwrap();
    }

    #[test]
    fn double_resolve_is_inconsistent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        let kpref = PromiseKref::new(1);
        init_promise(&mut tx, kpref, None).unwrap();
        resolve_promise(&mut tx, kpref, CapData::encode(&Value::Null).unwrap(), false).unwrap();
        let err = resolve_promise(&mut tx, kpref, CapData::encode(&Value::Null).unwrap(), false);
        assert!(err.is_err());
    }
}
