// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The crank loop: one runqueue entry per crank, one sqlite transaction per
// crank. Translating kernel-space krefs to a vat's own vrefs happens here,
// right before the delivery crosses into the supervisor -- kernel store
// tables never see a vref, and supervisors never see a kref.
use std::collections::HashMap;

use kernel_core::{Kref, VatId};
use kernel_message::{Delivery, DeliveryKind, DeliveryResult, GcActionKind, Resolution, RunqueueEntry};
use kernel_store::tables::promises::PromiseState;
use kernel_store::{KVResult, KernelStore, KernelTx};
use kernel_supervisor::VatSupervisor;
use tracing::{info, warn};

use crate::dispatcher::KernelSyscallDispatcher;

pub struct Scheduler {
    store: KernelStore,
    supervisors: HashMap<VatId, Box<dyn VatSupervisor>>,
    /// Whose turn it is when both the runqueue and the acceptance queue are
    /// non-empty. Starts `false` (local first) so a freshly booted kernel is
    /// local-biased on the very first tied crank, per the tie-break rule.
    acceptance_turn: bool,
}

impl Scheduler {
    pub fn new(store: KernelStore) -> Self {
        Self {
            store,
            supervisors: HashMap::new(),
            acceptance_turn: false,
        }
    }

    pub fn store(&self) -> &KernelStore {
        &self.store
    }

    pub fn register_supervisor(&mut self, vat: VatId, supervisor: Box<dyn VatSupervisor>) {
        self.supervisors.insert(vat, supervisor);
    }

    pub fn unregister_supervisor(&mut self, vat: VatId) {
        self.supervisors.remove(&vat);
    }

    /// Dequeue and process exactly one runqueue entry. Returns `Ok(false)` if
    /// the runqueue was empty, `Ok(true)` if one crank ran (whether or not it
    /// found a live supervisor to deliver to).
    pub async fn run_one_crank(&mut self) -> anyhow::Result<bool> {
        let mut tx = self.store.begin()?;
        let entry = match self.next_entry(&mut tx)? {
            Some(entry) => entry,
            None => {
                tx.rollback()?;
                return Ok(false);
            }
        };

        match self.process_entry(&mut tx, entry).await {
            Ok(()) => {
                tx.commit()?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "crank failed, rolling back");
                tx.rollback()?;
                Err(e)
            }
        }
    }

    /// Pop the next entry to crank, alternating between the acceptance queue
    /// (remote deliveries) and the main runqueue (local work) whenever both
    /// are non-empty so remote traffic can't starve local work or be starved
    /// by it; ties go to the runqueue first.
    fn next_entry(&mut self, tx: &mut KernelTx<'_>) -> KVResult<Option<RunqueueEntry>> {
        let local_empty = tx.runqueue_is_empty()?;
        let remote_empty = tx.acceptance_is_empty()?;
        if local_empty && remote_empty {
            return Ok(None);
        }
        let take_acceptance = if remote_empty {
            false
        } else if local_empty {
            true
        } else {
            let take = self.acceptance_turn;
            self.acceptance_turn = !self.acceptance_turn;
            take
        };
        if take_acceptance {
            tx.pop_acceptance()
        } else {
            tx.pop_runqueue()
        }
    }

    /// Run cranks until the runqueue is empty. Returns the number processed.
    pub async fn run_until_idle(&mut self) -> anyhow::Result<usize> {
        let mut count = 0;
        while self.run_one_crank().await? {
            count += 1;
        }
        Ok(count)
    }

    /// Schedule retire actions for every object whose `reachable` count has
    /// dropped to zero while still recognized, then flush the coalesced GC
    /// action queue onto the runqueue as one crank of its own.
    pub fn run_bring_out_your_dead(&mut self) -> anyhow::Result<usize> {
        let mut tx = self.store.begin()?;
        let scheduled = kernel_gc::sweep_for_retire(&mut tx)?;
        tx.flush_gc_actions()?;
        tx.commit()?;
        Ok(scheduled)
    }

    async fn process_entry(&mut self, tx: &mut KernelTx<'_>, entry: RunqueueEntry) -> anyhow::Result<()> {
        match entry {
            RunqueueEntry::Send { target, method, args, result } => {
                self.deliver_send(tx, target, method, args, result).await
            }
            RunqueueEntry::Notify { subscriber, promise } => self.deliver_notify(tx, subscriber, promise).await,
            RunqueueEntry::GcAction(action) => self.deliver_gc_action(tx, action).await,
            RunqueueEntry::BringOutYourDead(vat) => self.deliver_delivery(tx, vat, Delivery::BringOutYourDead).await,
        }
    }

    async fn deliver_send(
        &mut self,
        tx: &mut KernelTx<'_>,
        target: Kref,
        method: String,
        args: kernel_message::CapData,
        result: Option<kernel_core::PromiseKref>,
    ) -> anyhow::Result<()> {
        let owner = match target {
            Kref::Object(_) => tx
                .object(&target)?
                .map(|record| record.owner)
                .ok_or_else(|| anyhow::anyhow!("send target {target} has no object record"))?,
            Kref::Promise(kpref) => {
                // Sending to an unresolved promise queues the message instead
                // of dispatching it; a resolved promise should never still
                // appear as a `Send` target since resolution already forwarded
                // or rejected everything queued against it.
                let record = tx
                    .promise(kpref)?
                    .ok_or_else(|| anyhow::anyhow!("send target {target} has no promise record"))?;
                if record.state == PromiseState::Unresolved {
                    tx.enqueue_message(
                        kpref,
                        kernel_store::tables::promises::PendingMessage { method, args, result },
                    )?;
                    return Ok(());
                }
                return Err(anyhow::anyhow!("promise {target} already settled but still appeared as a send target"));
            }
            Kref::Device(_) => return Err(anyhow::anyhow!("device sends are not yet implemented")),
        };

        let vref = kernel_clist::provide_vref_for_kref(tx, owner, target)?;
        let result_vref = match result {
            Some(kpref) => Some(kernel_clist::provide_vref_for_kref(tx, owner, Kref::Promise(kpref))?),
            None => None,
        };
        let delivery = Delivery::Deliver(DeliveryKind::Send {
            target: vref,
            method,
            args,
            result: result_vref,
        });
        self.deliver_delivery(tx, owner, delivery).await
    }

    async fn deliver_notify(&mut self, tx: &mut KernelTx<'_>, subscriber: VatId, promise: kernel_core::PromiseKref) -> anyhow::Result<()> {
        let record = tx
            .promise(promise)?
            .ok_or_else(|| anyhow::anyhow!("notify for unknown promise {promise}"))?;
        let resolution = match record.state {
            PromiseState::Fulfilled => Resolution::Fulfilled(
                record.resolution.clone().expect("fulfilled promise always has a resolution"),
            ),
            PromiseState::Rejected => Resolution::Rejected(
                record.resolution.clone().expect("rejected promise always has a resolution"),
            ),
            PromiseState::Unresolved => {
                return Err(anyhow::anyhow!("notify for promise {promise} that has not settled"))
            }
        };
        let vref = kernel_clist::provide_vref_for_kref(tx, subscriber, Kref::Promise(promise))?;
        let delivery = Delivery::Deliver(DeliveryKind::Notify { promise: vref, resolution });
        self.deliver_delivery(tx, subscriber, delivery).await
    }

    async fn deliver_gc_action(&mut self, tx: &mut KernelTx<'_>, action: kernel_message::GcAction) -> anyhow::Result<()> {
        let mut vrefs = Vec::with_capacity(action.krefs.len());
        for kref in &action.krefs {
            vrefs.push(kernel_clist::provide_vref_for_kref(tx, action.vat, *kref)?);
        }
        let delivery = match action.kind {
            GcActionKind::Drop => Delivery::DropExports(vrefs),
            GcActionKind::Retire => Delivery::RetireImports(vrefs),
        };
        self.deliver_delivery(tx, action.vat, delivery).await
    }

    async fn deliver_delivery(&mut self, tx: &mut KernelTx<'_>, vat: VatId, delivery: Delivery) -> anyhow::Result<()> {
        let Some(supervisor) = self.supervisors.get_mut(&vat) else {
            warn!(%vat, "no live supervisor registered, dropping delivery");
            return Ok(());
        };

        let mut dispatcher = KernelSyscallDispatcher::new(tx, vat);
        let outcome = supervisor.deliver(vat, delivery, &mut dispatcher).await?;
        let produced = std::mem::take(&mut dispatcher.produced);
        for entry in produced {
            dispatcher.tx.push_runqueue(&entry)?;
        }

        match outcome {
            DeliveryResult::Ok => Ok(()),
            DeliveryResult::Fatal(reason) => {
                info!(%vat, %reason, "vat reported a fatal error, terminating");
                self.terminate_vat(tx, vat)?;
                Ok(())
            }
        }
    }

    /// Terminate a vat outside of a crank delivery, e.g. from an operator
    /// command rather than a vat reporting a fatal error.
    pub fn terminate_vat_now(&mut self, vat: VatId) -> anyhow::Result<()> {
        let mut tx = self.store.begin()?;
        self.terminate_vat(&mut tx, vat)?;
        tx.commit()?;
        Ok(())
    }

    fn terminate_vat(&mut self, tx: &mut KernelTx<'_>, vat: VatId) -> KVResult<()> {
        self.supervisors.remove(&vat);
        let terminated = kernel_message::CapData::encode(&kernel_message::Value::Error {
            name: "VatTerminatedError".to_string(),
            message: format!("vat {vat} was terminated"),
        })
        .expect("encoding a fixed error value never fails");
        tx.reject_all_for_decider(vat, terminated)?;
        tx.delete_vat(vat)?;
        tx.vatstore_clear_vat(vat)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kernel_core::ObjectKref;
    use kernel_message::Value;
    use kernel_supervisor::SyscallSink;
    use kernel_store::tables::directory::{VatLifecycle, VatRecord};

    struct EchoSupervisor {
        deliveries: Vec<Delivery>,
    }

    #[async_trait]
    impl VatSupervisor for EchoSupervisor {
        async fn deliver(
            &mut self,
            _vat: VatId,
            delivery: Delivery,
            _syscalls: &mut dyn SyscallSink,
        ) -> anyhow::Result<DeliveryResult> {
            self.deliveries.push(delivery);
            Ok(DeliveryResult::Ok)
        }
    }

    #[tokio::test]
    async fn acceptance_queue_alternates_with_runqueue_once_both_are_non_empty() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let local_target = Kref::Object(ObjectKref::new(1));
        let remote_target = Kref::Object(ObjectKref::new(2));
        {
            let mut tx = store.begin().unwrap();
            tx.init_object(local_target, vat, "o+1".to_string()).unwrap();
            tx.init_object(remote_target, vat, "o+2".to_string()).unwrap();
            tx.put_vat(&VatRecord {
                id: vat,
                subcluster: "s1".to_string(),
                bundle_name: "echo".to_string(),
                lifecycle: VatLifecycle::Running,
            })
            .unwrap();
            for _ in 0..2 {
                tx.push_runqueue(&RunqueueEntry::Send {
                    target: local_target,
                    method: "ping".to_string(),
                    args: kernel_message::CapData::encode(&Value::Undefined).unwrap(),
                    result: None,
                })
                .unwrap();
                tx.push_acceptance(&RunqueueEntry::Send {
                    target: remote_target,
                    method: "ping".to_string(),
                    args: kernel_message::CapData::encode(&Value::Undefined).unwrap(),
                    result: None,
                })
                .unwrap();
            }
            tx.commit().unwrap();
        }

        let mut scheduler = Scheduler::new(store);
        scheduler.register_supervisor(vat, Box::new(EchoSupervisor { deliveries: Vec::new() }));
        let processed = scheduler.run_until_idle().await.unwrap();
        assert_eq!(processed, 4);
        assert_eq!(scheduler.store().read().runqueue_len().unwrap(), 0);
        assert_eq!(scheduler.store().read().acceptance_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn send_to_a_registered_vat_drains_the_runqueue() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let target = Kref::Object(ObjectKref::new(1));
        {
            let mut tx = store.begin().unwrap();
            tx.init_object(target, vat, "o+1".to_string()).unwrap();
            tx.put_vat(&VatRecord {
                id: vat,
                subcluster: "s1".to_string(),
                bundle_name: "echo".to_string(),
                lifecycle: VatLifecycle::Running,
            })
            .unwrap();
            tx.push_runqueue(&RunqueueEntry::Send {
                target,
                method: "ping".to_string(),
                args: kernel_message::CapData::encode(&Value::Undefined).unwrap(),
                result: None,
            })
            .unwrap();
            tx.commit().unwrap();
        }

        let mut scheduler = Scheduler::new(store);
        scheduler.register_supervisor(vat, Box::new(EchoSupervisor { deliveries: Vec::new() }));

        let processed = scheduler.run_until_idle().await.unwrap();
        assert_eq!(processed, 1);
        assert!(scheduler.store().read().runqueue_len().unwrap() == 0);
    }
}
