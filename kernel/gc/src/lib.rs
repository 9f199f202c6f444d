// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Refcount bookkeeping for krefs and the drop/retire action scheduling that
//! keeps `reachable <= recognizable` true after every committed crank.
//!
//! A clist entry's `reachable` flag distinguishes two strengths of
//! reference: a vat with `reachable = true` may still send to the kref; one
//! with `reachable = false` (after `dropImports`) may only compare it for
//! equality. The object record's `reachable`/`recognizable` counters are the
//! kernel-wide totals across every vat's clist entry plus runqueue and
//! stored-capdata occurrences.
use kernel_core::{Kref, RefCountTag, VatId};
use kernel_message::GcActionKind;
use kernel_store::{KVResult, KernelTx};
use tracing::debug;

/// A vat issued `dropImports([vref,...])`: it keeps recognizing each kref
/// but no longer holds a strong reference.
pub fn process_drop_imports(tx: &mut KernelTx<'_>, vat: VatId, krefs: &[Kref]) -> KVResult<()> {
    for kref in krefs {
        tx.clist_drop_reachable(vat, kref)?;
        let outcome = tx.decrement_ref_count(kref, RefCountTag::Reachable)?;
        if outcome.was_last_reachable {
            debug!(%kref, %vat, "kref has no remaining reachable references");
        }
    }
    Ok(())
}

/// A vat re-imported a kref it had previously dropped (received it again in
/// a delivery argument): flip its clist entry back to reachable.
pub fn process_reimport(tx: &mut KernelTx<'_>, vat: VatId, kref: &Kref) -> KVResult<()> {
    tx.clist_reimport(vat, kref)?;
    tx.increment_ref_count(kref, RefCountTag::Reachable)
}

/// A vat is seeing a kref for the first time (a fresh clist entry was just
/// allocated for it): the object record gains both a reachable and a
/// recognizable reference. Only [`Kref::Object`] carries a refcounted
/// object record; promise and device krefs have no counters to bump.
pub fn process_new_import(tx: &mut KernelTx<'_>, kref: &Kref) -> KVResult<()> {
    if let Kref::Object(_) = kref {
        tx.increment_ref_count(kref, RefCountTag::Recognizable)?;
    }
    Ok(())
}

/// A vat acknowledged a `retireImports` delivery: it has dropped the kref
/// from its own clist entirely and can no longer even recognize it. Once
/// every vat has acked, the object record itself is deleted.
pub fn process_retire_ack(tx: &mut KernelTx<'_>, vat: VatId, krefs: &[Kref]) -> KVResult<()> {
    for kref in krefs {
        tx.clist_retire(vat, kref)?;
        let outcome = tx.decrement_ref_count(kref, RefCountTag::Recognizable)?;
        if outcome.was_last_recognizable {
            tx.delete_object(kref)?;
            debug!(%kref, "object fully retired");
        }
    }
    Ok(())
}

/// Scan every object for one whose kernel-wide `reachable` count has hit
/// zero while vats still recognize it, and schedule a coalesced `retire`
/// action for each such vat. Intended to run once per `bringOutYourDead`
/// sweep rather than after every crank, since it walks every vat's clist.
pub fn sweep_for_retire(tx: &mut KernelTx<'_>) -> KVResult<usize> {
    let mut scheduled = 0;
    let vats: Vec<VatId> = tx.list_vats()?.into_iter().map(|v| v.id).collect();
    for (kref, record) in tx.list_objects()? {
        if record.reachable != 0 || record.recognizable == 0 {
            continue;
        }
        for &vat in &vats {
            if vat == record.owner {
                continue;
            }
            if tx.clist_by_kref(vat, &kref)?.is_some() {
                tx.push_gc_action(vat, GcActionKind::Retire, vec![kref])?;
                scheduled += 1;
            }
        }
    }
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::ObjectKref;
    use kernel_store::KernelStore;

    #[test]
    fn drop_then_retire_ack_deletes_object_at_zero_recognizable() {
        let store = KernelStore::open_in_memory().unwrap();
        let owner = VatId::new(1);
        let importer = VatId::new(2);
        let kref = Kref::Object(ObjectKref::new(1));

        let mut tx = store.begin().unwrap();
        tx.init_object(kref, owner, "o+1".to_string()).unwrap();
        tx.clist_add(owner, kref, "o+1".to_string()).unwrap();
        tx.increment_ref_count(&kref, RefCountTag::Recognizable).unwrap();
        tx.clist_add(importer, kref, "o-1".to_string()).unwrap();

        process_drop_imports(&mut tx, importer, &[kref]).unwrap();
        let record = tx.object(&kref).unwrap().unwrap();
        assert_eq!(record.reachable, 1); // owner still holds a reachable ref
        assert_eq!(record.recognizable, 2);

        process_drop_imports(&mut tx, owner, &[kref]).unwrap();
        let record = tx.object(&kref).unwrap().unwrap();
        assert_eq!(record.reachable, 0);

        let scheduled = sweep_for_retire(&mut tx).unwrap();
        assert_eq!(scheduled, 0); // no vats registered via put_vat in this test
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        process_retire_ack(&mut tx, importer, &[kref]).unwrap();
        let record = tx.object(&kref).unwrap().unwrap();
        assert_eq!(record.recognizable, 1);

        process_retire_ack(&mut tx, owner, &[kref]).unwrap();
        assert!(tx.object(&kref).unwrap().is_none());
        tx.commit().unwrap();
    }
}
