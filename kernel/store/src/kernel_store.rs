// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The Kernel Store: a typed facade over the persistent store. One sqlite
// transaction backs every table touched during a crank, so the whole
// transition commits or rolls back atomically.
use std::path::Path;

use kernel_core::{Kref, ObjectKref, PromiseKref, RefCountTag, VatId};
use kernel_message::{GcActionKind, RunqueueEntry};

use crate::error::KVResult;
use crate::kv::{QueryResult, StoreTransaction};
use crate::sqlite::{SqliteReadTx, SqliteStore, SqliteWriteTx};
use crate::tables::clist::ClistEntry;
use crate::tables::counters;
use crate::tables::directory::{RemotePeerRecord, SubclusterRecord, VatRecord};
use crate::tables::objects::{DecrementOutcome, ObjectRecord};
use crate::tables::promises::{PendingMessage, PromiseRecord};
use crate::tables::{acceptance, clist, directory, objects, promises, runqueue, vatstore};

pub struct KernelStore {
    inner: SqliteStore,
}

impl KernelStore {
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        Ok(Self {
            inner: SqliteStore::open(path)?,
        })
    }

    pub fn open_in_memory() -> KVResult<Self> {
        Ok(Self {
            inner: SqliteStore::open_in_memory()?,
        })
    }

    pub fn read(&self) -> KernelReadTx<'_> {
        KernelReadTx {
            inner: self.inner.read(),
        }
    }

    pub fn begin(&self) -> KVResult<KernelTx<'_>> {
        Ok(KernelTx {
            inner: self.inner.begin_write()?,
        })
    }

    /// Facade `executeDBQuery`.
    pub fn execute_query(&self, sql: &str) -> KVResult<QueryResult> {
        self.inner.execute_query(sql)
    }

    /// Facade `clearState`.
    pub fn clear(&self) -> KVResult<()> {
        self.inner.clear()
    }
}

macro_rules! read_only_facade {
    ($ty:ident, $field:ident, $tx_ty:ty) => {
        pub struct $ty<'a> {
            $field: $tx_ty,
        }

        impl<'a> $ty<'a> {
            pub fn object(&self, kref: &Kref) -> KVResult<Option<ObjectRecord>> {
                objects::get(&self.$field, kref)
            }

            pub fn list_objects(&self) -> KVResult<Vec<(Kref, ObjectRecord)>> {
                objects::list_all(&self.$field)
            }

            pub fn promise(&self, kpref: PromiseKref) -> KVResult<Option<PromiseRecord>> {
                promises::get(&self.$field, kpref)
            }

            pub fn list_promises(&self) -> KVResult<Vec<(PromiseKref, PromiseRecord)>> {
                promises::list_all(&self.$field)
            }

            pub fn clist_by_kref(&self, vat: VatId, kref: &Kref) -> KVResult<Option<ClistEntry>> {
                clist::by_kref(&self.$field, vat, kref)
            }

            pub fn clist_by_vref(&self, vat: VatId, vref: &str) -> KVResult<Option<Kref>> {
                clist::by_vref(&self.$field, vat, vref)
            }

            pub fn clist_for_vat(&self, vat: VatId) -> KVResult<Vec<ClistEntry>> {
                clist::list_for_vat(&self.$field, vat)
            }

            pub fn vat(&self, id: VatId) -> KVResult<Option<VatRecord>> {
                directory::get_vat(&self.$field, id)
            }

            pub fn list_vats(&self) -> KVResult<Vec<VatRecord>> {
                directory::list_vats(&self.$field)
            }

            pub fn subcluster(&self, id: &str) -> KVResult<Option<SubclusterRecord>> {
                directory::get_subcluster(&self.$field, id)
            }

            pub fn list_subclusters(&self) -> KVResult<Vec<SubclusterRecord>> {
                directory::list_subclusters(&self.$field)
            }

            pub fn remote(&self, id: &str) -> KVResult<Option<RemotePeerRecord>> {
                directory::get_remote(&self.$field, id)
            }

            pub fn list_remotes(&self) -> KVResult<Vec<RemotePeerRecord>> {
                directory::list_remotes(&self.$field)
            }

            pub fn vatstore_get(&self, vat: VatId, key: &str) -> KVResult<Option<String>> {
                vatstore::get(&self.$field, vat, key)
            }

            pub fn runqueue_len(&self) -> KVResult<usize> {
                runqueue::len(&self.$field)
            }

            pub fn acceptance_len(&self) -> KVResult<usize> {
                acceptance::len(&self.$field)
            }

            pub fn incarnation(&self) -> KVResult<u64> {
                counters::incarnation(&self.$field)
            }
        }
    };
}

read_only_facade!(KernelReadTx, inner, SqliteReadTx<'a>);

pub struct KernelTx<'a> {
    inner: SqliteWriteTx<'a>,
}

impl<'a> KernelTx<'a> {
    pub fn commit(self) -> KVResult<()> {
        StoreTransaction::commit(self.inner)
    }

    pub fn rollback(self) -> KVResult<()> {
        StoreTransaction::rollback(self.inner)
    }

    // -- identifiers --

    pub fn next_object_kref(&mut self) -> KVResult<ObjectKref> {
        Ok(ObjectKref::new(counters::next(&mut self.inner, counters::OBJECT)?))
    }

    pub fn next_promise_kref(&mut self) -> KVResult<PromiseKref> {
        Ok(PromiseKref::new(counters::next(&mut self.inner, counters::PROMISE)?))
    }

    pub fn next_vat_id(&mut self) -> KVResult<VatId> {
        Ok(VatId::new(counters::next(&mut self.inner, counters::VAT)?))
    }

    pub fn bump_incarnation(&mut self) -> KVResult<u64> {
        counters::bump_incarnation(&mut self.inner)
    }

    /// Next vref number for the given vat and vref kind letter (`o`/`p`/`d`).
    /// Export and import vrefs of the same kind share one counter per vat, so
    /// numbers never collide across polarities.
    pub fn next_vref_number(&mut self, vat: VatId, kind: char) -> KVResult<u64> {
        counters::next(&mut self.inner, &format!("vref.{vat}.{kind}"))
    }

    pub fn incarnation(&self) -> KVResult<u64> {
        counters::incarnation(&self.inner)
    }

    // -- objects --

    pub fn object(&self, kref: &Kref) -> KVResult<Option<ObjectRecord>> {
        objects::get(&self.inner, kref)
    }

    pub fn list_objects(&self) -> KVResult<Vec<(Kref, ObjectRecord)>> {
        objects::list_all(&self.inner)
    }

    pub fn init_object(&mut self, kref: Kref, owner: VatId, export_vref: String) -> KVResult<()> {
        objects::init_object(&mut self.inner, kref, owner, export_vref)
    }

    pub fn increment_ref_count(&mut self, kref: &Kref, tag: RefCountTag) -> KVResult<()> {
        objects::increment_ref_count(&mut self.inner, kref, tag)
    }

    pub fn decrement_ref_count(&mut self, kref: &Kref, tag: RefCountTag) -> KVResult<DecrementOutcome> {
        objects::decrement_ref_count(&mut self.inner, kref, tag)
    }

    pub fn delete_object(&mut self, kref: &Kref) -> KVResult<()> {
        objects::delete(&mut self.inner, kref)
    }

    // -- promises --

    pub fn promise(&self, kpref: PromiseKref) -> KVResult<Option<PromiseRecord>> {
        promises::get(&self.inner, kpref)
    }

    pub fn list_promises(&self) -> KVResult<Vec<(PromiseKref, PromiseRecord)>> {
        promises::list_all(&self.inner)
    }

    /// Reject every unresolved promise for which `vat` is decider, as part of
    /// terminating that vat.
    pub fn reject_all_for_decider(
        &mut self,
        vat: VatId,
        terminated_error: kernel_message::CapData,
    ) -> KVResult<Vec<PromiseKref>> {
        let all: Vec<PromiseKref> = self.list_promises()?.into_iter().map(|(k, _)| k).collect();
        promises::reject_all_for_decider(&mut self.inner, &all, vat, terminated_error)
    }

    /// Reject every unresolved promise in the store, used once on startup
    /// right after [`KernelTx::bump_incarnation`] fires.
    pub fn reject_all_unresolved_promises(
        &mut self,
        terminated_error: kernel_message::CapData,
    ) -> KVResult<Vec<PromiseKref>> {
        let all: Vec<PromiseKref> = self.list_promises()?.into_iter().map(|(k, _)| k).collect();
        promises::reject_all_unresolved(&mut self.inner, &all, terminated_error)
    }

    pub fn init_promise(&mut self, kpref: PromiseKref, decider: Option<VatId>) -> KVResult<()> {
        promises::init_promise(&mut self.inner, kpref, decider)
    }

    pub fn enqueue_message(&mut self, kpref: PromiseKref, message: PendingMessage) -> KVResult<()> {
        promises::enqueue_message(&mut self.inner, kpref, message)
    }

    pub fn subscribe(&mut self, vat: VatId, kpref: PromiseKref) -> KVResult<()> {
        promises::subscribe(&mut self.inner, vat, kpref)
    }

    pub fn resolve_promise(
        &mut self,
        kpref: PromiseKref,
        resolution: kernel_message::CapData,
        is_rejection: bool,
    ) -> KVResult<(Vec<PendingMessage>, std::collections::BTreeSet<VatId>)> {
        promises::resolve_promise(&mut self.inner, kpref, resolution, is_rejection)
    }

    pub fn reassign_decider(&mut self, kpref: PromiseKref, decider: Option<VatId>) -> KVResult<()> {
        promises::reassign_decider(&mut self.inner, kpref, decider)
    }

    pub fn remove_promise(&mut self, kpref: PromiseKref) -> KVResult<()> {
        promises::remove_promise(&mut self.inner, kpref)
    }

    // -- clist --

    pub fn clist_add(&mut self, vat: VatId, kref: Kref, vref: String) -> KVResult<()> {
        clist::add(&mut self.inner, vat, kref, vref)
    }

    pub fn clist_by_kref(&self, vat: VatId, kref: &Kref) -> KVResult<Option<ClistEntry>> {
        clist::by_kref(&self.inner, vat, kref)
    }

    pub fn clist_by_vref(&self, vat: VatId, vref: &str) -> KVResult<Option<Kref>> {
        clist::by_vref(&self.inner, vat, vref)
    }

    pub fn clist_for_vat(&self, vat: VatId) -> KVResult<Vec<ClistEntry>> {
        clist::list_for_vat(&self.inner, vat)
    }

    pub fn clist_drop_reachable(&mut self, vat: VatId, kref: &Kref) -> KVResult<()> {
        clist::drop_reachable(&mut self.inner, vat, kref)
    }

    pub fn clist_retire(&mut self, vat: VatId, kref: &Kref) -> KVResult<()> {
        clist::retire(&mut self.inner, vat, kref)
    }

    pub fn clist_reimport(&mut self, vat: VatId, kref: &Kref) -> KVResult<()> {
        clist::reimport(&mut self.inner, vat, kref)
    }

    // -- runqueue / GC --

    pub fn push_runqueue(&mut self, entry: &RunqueueEntry) -> KVResult<u64> {
        runqueue::push(&mut self.inner, entry)
    }

    pub fn pop_runqueue(&mut self) -> KVResult<Option<RunqueueEntry>> {
        runqueue::pop_front(&mut self.inner)
    }

    pub fn runqueue_is_empty(&self) -> KVResult<bool> {
        runqueue::is_empty(&self.inner)
    }

    /// Enqueue a remote delivery onto the acceptance queue, awaiting routing
    /// into the main runqueue by the crank runner's tie-break.
    pub fn push_acceptance(&mut self, entry: &RunqueueEntry) -> KVResult<u64> {
        acceptance::push(&mut self.inner, entry)
    }

    pub fn pop_acceptance(&mut self) -> KVResult<Option<RunqueueEntry>> {
        acceptance::pop_front(&mut self.inner)
    }

    pub fn acceptance_is_empty(&self) -> KVResult<bool> {
        acceptance::is_empty(&self.inner)
    }

    pub fn push_gc_action(&mut self, vat: VatId, kind: GcActionKind, krefs: Vec<Kref>) -> KVResult<()> {
        runqueue::push_gc_action(&mut self.inner, vat, kind, krefs)
    }

    pub fn flush_gc_actions(&mut self) -> KVResult<usize> {
        runqueue::flush_gc_actions_to_runqueue(&mut self.inner)
    }

    // -- directory --

    pub fn put_vat(&mut self, record: &VatRecord) -> KVResult<()> {
        directory::put_vat(&mut self.inner, record)
    }

    pub fn vat(&self, id: VatId) -> KVResult<Option<VatRecord>> {
        directory::get_vat(&self.inner, id)
    }

    pub fn delete_vat(&mut self, id: VatId) -> KVResult<()> {
        directory::delete_vat(&mut self.inner, id)
    }

    pub fn list_vats(&self) -> KVResult<Vec<VatRecord>> {
        directory::list_vats(&self.inner)
    }

    pub fn put_subcluster(&mut self, record: &SubclusterRecord) -> KVResult<()> {
        directory::put_subcluster(&mut self.inner, record)
    }

    pub fn subcluster(&self, id: &str) -> KVResult<Option<SubclusterRecord>> {
        directory::get_subcluster(&self.inner, id)
    }

    pub fn delete_subcluster(&mut self, id: &str) -> KVResult<()> {
        directory::delete_subcluster(&mut self.inner, id)
    }

    pub fn list_subclusters(&self) -> KVResult<Vec<SubclusterRecord>> {
        directory::list_subclusters(&self.inner)
    }

    pub fn put_remote(&mut self, record: &RemotePeerRecord) -> KVResult<()> {
        directory::put_remote(&mut self.inner, record)
    }

    pub fn remote(&self, id: &str) -> KVResult<Option<RemotePeerRecord>> {
        directory::get_remote(&self.inner, id)
    }

    pub fn list_remotes(&self) -> KVResult<Vec<RemotePeerRecord>> {
        directory::list_remotes(&self.inner)
    }

    // -- vatstore --

    pub fn vatstore_get(&self, vat: VatId, key: &str) -> KVResult<Option<String>> {
        vatstore::get(&self.inner, vat, key)
    }

    pub fn vatstore_set(&mut self, vat: VatId, key: &str, value: &str) -> KVResult<()> {
        vatstore::set(&mut self.inner, vat, key, value)
    }

    pub fn vatstore_delete(&mut self, vat: VatId, key: &str) -> KVResult<()> {
        vatstore::delete(&mut self.inner, vat, key)
    }

    pub fn vatstore_clear_vat(&mut self, vat: VatId) -> KVResult<()> {
        vatstore::clear_vat(&mut self.inner, vat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::RefCountTag;

    #[test]
    fn crank_style_transaction_commits_atomically() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        {
            let mut tx = store.begin().unwrap();
            let kref = Kref::Object(tx.next_object_kref().unwrap());
            tx.init_object(kref, vat, "o+1".to_string()).unwrap();
            tx.clist_add(vat, kref, "o+1".to_string()).unwrap();
            tx.commit().unwrap();
        }
        let tx = store.read();
        let kref = Kref::Object(ObjectKref::new(1));
        assert!(tx.object(&kref).unwrap().is_some());
        assert!(tx.clist_by_kref(vat, &kref).unwrap().is_some());
    }

    #[test]
    fn rollback_on_error_undoes_partial_work() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let mut tx = store.begin().unwrap();
        let kref = Kref::Object(tx.next_object_kref().unwrap());
        tx.init_object(kref, vat, "o+1".to_string()).unwrap();
        // A consistency failure rolls back instead of committing.
        let result = tx.decrement_ref_count(&Kref::Object(ObjectKref::new(999)), RefCountTag::Reachable);
        assert!(result.is_err());
        tx.rollback().unwrap();

        let tx = store.read();
        assert!(tx.object(&kref).unwrap().is_none());
    }
}
