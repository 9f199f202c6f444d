// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Promise resolution and pipelining: moving a promise from unresolved to
// settled, forwarding its queued messages and notifying its subscribers.
use kernel_core::{Kref, PromiseKref};
use kernel_message::{CapData, RunqueueEntry, Value};
use kernel_store::{KVResult, KernelTx};

/// The runqueue work produced by resolving one promise: a `notify` per
/// subscriber plus, if the resolution is itself an object reference, a
/// forwarded `send` for every message that was queued against the promise
/// while it was unresolved (pipelining).
///
/// A promise resolved to anything other than a bare object reference (a
/// plain value, or a rejection) cannot receive further sends, so any queued
/// messages are instead failed back to their own result promise with a
/// "not callable" error -- there is nothing left to forward them to.
pub fn resolve_and_forward(
    tx: &mut KernelTx<'_>,
    kpref: PromiseKref,
    resolution: CapData,
    is_rejection: bool,
) -> KVResult<Vec<RunqueueEntry>> {
    let forward_target = if is_rejection {
        None
    } else {
        resolution_target_object(&resolution)
    };

    let (queue, subscribers) = tx.resolve_promise(kpref, resolution.clone(), is_rejection)?;

    let mut produced = Vec::new();
    for message in queue {
        match forward_target {
            Some(target) => produced.push(RunqueueEntry::Send {
                target,
                method: message.method,
                args: message.args,
                result: message.result,
            }),
            None => {
                if let Some(result) = message.result {
                    let error = CapData::encode(&Value::Error {
                        name: "NotCallableError".to_string(),
                        message: "promise did not resolve to an object".to_string(),
                    })
                    .expect("encoding a fixed error value never fails");
                    produced.extend(resolve_and_forward(tx, result, error, true)?);
                }
            }
        }
    }
    for subscriber in subscribers {
        produced.push(RunqueueEntry::Notify {
            subscriber,
            promise: kpref,
        });
    }
    Ok(produced)
}

/// If the resolution's body is a single slot reference to an object kref,
/// that's the kref future sends should be forwarded to.
fn resolution_target_object(resolution: &CapData) -> Option<Kref> {
    let value = resolution.decode_value().ok()?;
    match value {
        Value::Slot(index) => match resolution.resolve_slot(index).ok()? {
            kref @ Kref::Object(_) => Some(kref),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve-to-promise: `source`'s decider resolved it to another promise,
/// `target`. If `target` has already settled, `source` settles immediately
/// with the same resolution. Otherwise `source` merges into `target`: its
/// queued messages and subscribers move over and `source` itself is
/// retired, since every future reference to it behaves exactly like a
/// reference to `target` from this point on.
pub fn resolve_to_promise(tx: &mut KernelTx<'_>, source: PromiseKref, target: PromiseKref) -> KVResult<Vec<RunqueueEntry>> {
    use kernel_store::tables::promises::PromiseState;

    let target_record = tx
        .promise(target)?
        .unwrap_or_else(|| panic!("resolve-to-promise target {target} does not exist"));

    if target_record.is_resolved() {
        let resolution = target_record
            .resolution
            .clone()
            .expect("a resolved promise always carries its resolution");
        let is_rejection = target_record.state == PromiseState::Rejected;
        return resolve_and_forward(tx, source, resolution, is_rejection);
    }

    let source_record = tx
        .promise(source)?
        .unwrap_or_else(|| panic!("resolve-to-promise source {source} does not exist"));
    for message in source_record.queue {
        tx.enqueue_message(target, message)?;
    }
    for subscriber in source_record.subscribers {
        tx.subscribe(subscriber, target)?;
    }
    tx.remove_promise(source)?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{ObjectKref, VatId};
    use kernel_message::CapDataBuilder;
    use kernel_store::KernelStore;

    #[test]
    fn resolve_to_object_forwards_queued_sends() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let target_kref = Kref::Object(ObjectKref::new(9));
        let mut tx = store.begin().unwrap();
        tx.init_object(target_kref, vat, "o+1".to_string()).unwrap();

        let kpref = PromiseKref::new(1);
        tx.init_promise(kpref, Some(vat)).unwrap();
        tx.subscribe(VatId::new(2), kpref).unwrap();
        tx.enqueue_message(
            kpref,
            kernel_store::tables::promises::PendingMessage {
                method: "ping".to_string(),
                args: CapData::encode(&Value::Undefined).unwrap(),
                result: None,
            },
        )
        .unwrap();

        let mut builder = CapDataBuilder::default();
        let slot_value = builder.slot(target_kref);
        let resolution = builder.finish(slot_value).unwrap();

        let entries = resolve_and_forward(&mut tx, kpref, resolution, false).unwrap();
        let sends: Vec<_> = entries
            .iter()
            .filter(|e| matches!(e, RunqueueEntry::Send { .. }))
            .collect();
        let notifies: Vec<_> = entries
            .iter()
            .filter(|e| matches!(e, RunqueueEntry::Notify { .. }))
            .collect();
        assert_eq!(sends.len(), 1);
        assert_eq!(notifies.len(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn resolve_to_plain_value_fails_queued_sends() {
        let store = KernelStore::open_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        let kpref = PromiseKref::new(1);
        let result_kpref = PromiseKref::new(2);
        tx.init_promise(kpref, None).unwrap();
        tx.init_promise(result_kpref, None).unwrap();
        tx.enqueue_message(
            kpref,
            kernel_store::tables::promises::PendingMessage {
                method: "ping".to_string(),
                args: CapData::encode(&Value::Undefined).unwrap(),
                result: Some(result_kpref),
            },
        )
        .unwrap();

        resolve_and_forward(&mut tx, kpref, CapData::encode(&Value::Bool(true)).unwrap(), false).unwrap();

        let result = tx.promise(result_kpref).unwrap().unwrap();
        assert!(result.is_resolved());
        tx.commit().unwrap();
    }
}
