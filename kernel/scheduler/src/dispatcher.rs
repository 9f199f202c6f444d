// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Translates one vat's syscalls into kernel store transitions. Lives for
// exactly one `deliver` call: the supervisor issues syscalls synchronously
// against `tx` while a delivery is in flight, and every answer the vat gets
// back is visible only within the crank's own uncommitted transaction.
use std::collections::BTreeSet;

use async_trait::async_trait;
use kernel_core::{Kref, RefCountTag, VatId};
use kernel_message::{CapData, RunqueueEntry, Syscall, SyscallResult};
use kernel_store::KernelTx;
use kernel_supervisor::SyscallSink;

pub struct KernelSyscallDispatcher<'a, 'tx> {
    pub tx: &'a mut KernelTx<'tx>,
    pub vat: VatId,
    /// Runqueue entries produced by this delivery's syscalls (sends,
    /// notifies from resolutions), flushed to the runqueue after the
    /// delivery returns: a vat's syscalls during one delivery are all
    /// applied before any of their consequences run.
    pub produced: Vec<RunqueueEntry>,
}

impl<'a, 'tx> KernelSyscallDispatcher<'a, 'tx> {
    pub fn new(tx: &'a mut KernelTx<'tx>, vat: VatId) -> Self {
        Self {
            tx,
            vat,
            produced: Vec::new(),
        }
    }

    fn send(
        &mut self,
        target: Kref,
        method: String,
        args: CapData,
        result: Option<kernel_core::PromiseKref>,
    ) -> Result<(), String> {
        // Only object krefs carry a refcounted object record; promise and
        // device krefs referenced in the same argument list have their own
        // lifecycles and aren't tracked here.
        for kref in args.referenced_krefs() {
            if matches!(kref, Kref::Object(_)) {
                self.tx
                    .increment_ref_count(kref, RefCountTag::Reachable)
                    .map_err(|e| e.to_string())?;
            }
        }
        self.produced.push(RunqueueEntry::Send {
            target,
            method,
            args,
            result,
        });
        Ok(())
    }
}

#[async_trait]
impl<'a, 'tx> SyscallSink for KernelSyscallDispatcher<'a, 'tx> {
    async fn syscall(&mut self, call: Syscall) -> SyscallResult {
        match call {
            Syscall::Send { target, method, args, result } => {
                let target_kref = match kernel_clist::provide_kref_for_vref(self.tx, self.vat, target) {
                    Ok(k) => k,
                    Err(e) => return SyscallResult::Error(e.to_string()),
                };
                let result_kref = match result {
                    None => match self.tx.next_promise_kref() {
                        Ok(kpref) => {
                            if self.tx.init_promise(kpref, None).is_err() {
                                return SyscallResult::Error("failed to allocate result promise".to_string());
                            }
                            Some(kpref)
                        }
                        Err(e) => return SyscallResult::Error(e.to_string()),
                    },
                    Some(vref) => match kernel_clist::provide_kref_for_vref(self.tx, self.vat, vref) {
                        Ok(Kref::Promise(p)) => Some(p),
                        Ok(_) => return SyscallResult::Error("send result vref must name a promise".to_string()),
                        Err(e) => return SyscallResult::Error(e.to_string()),
                    },
                };
                let answer = match result_kref {
                    Some(kpref) if result.is_none() => SyscallResult::ResultPromise(
                        kernel_clist::provide_vref_for_kref(self.tx, self.vat, Kref::Promise(kpref))
                            .unwrap_or_else(|_| kernel_core::Vref::Promise(kernel_core::Polarity::Import, kpref.as_u64())),
                    ),
                    _ => SyscallResult::Ok,
                };
                if let Err(e) = self.send(target_kref, method, args, result_kref) {
                    return SyscallResult::Error(e);
                }
                answer
            }
            Syscall::Resolve { promise, rejected, value } => {
                let kpref = match kernel_clist::provide_kref_for_vref(self.tx, self.vat, promise) {
                    Ok(Kref::Promise(p)) => p,
                    Ok(_) => return SyscallResult::Error("resolve target vref must name a promise".to_string()),
                    Err(e) => return SyscallResult::Error(e.to_string()),
                };
                match kernel_promise::resolve_and_forward(self.tx, kpref, value, rejected) {
                    Ok(entries) => {
                        self.produced.extend(entries);
                        SyscallResult::Ok
                    }
                    Err(e) => SyscallResult::Error(e.to_string()),
                }
            }
            Syscall::Subscribe { promise } => {
                let kpref = match kernel_clist::provide_kref_for_vref(self.tx, self.vat, promise) {
                    Ok(Kref::Promise(p)) => p,
                    Ok(_) => return SyscallResult::Error("subscribe target vref must name a promise".to_string()),
                    Err(e) => return SyscallResult::Error(e.to_string()),
                };
                match self.tx.subscribe(self.vat, kpref) {
                    Ok(()) => SyscallResult::Ok,
                    Err(e) => SyscallResult::Error(e.to_string()),
                }
            }
            Syscall::Exit { failure } => {
                let _ = failure;
                SyscallResult::Ok
            }
            Syscall::VatstoreGet { key } => match self.tx.vatstore_get(self.vat, &key) {
                Ok(value) => SyscallResult::VatstoreValue(value),
                Err(e) => SyscallResult::Error(e.to_string()),
            },
            Syscall::VatstoreSet { key, value } => match self.tx.vatstore_set(self.vat, &key, &value) {
                Ok(()) => SyscallResult::Ok,
                Err(e) => SyscallResult::Error(e.to_string()),
            },
            Syscall::VatstoreDelete { key } => match self.tx.vatstore_delete(self.vat, &key) {
                Ok(()) => SyscallResult::Ok,
                Err(e) => SyscallResult::Error(e.to_string()),
            },
            Syscall::DropImports(vrefs) => {
                let krefs = match resolve_all(self.tx, self.vat, &vrefs) {
                    Ok(k) => k,
                    Err(e) => return SyscallResult::Error(e),
                };
                match kernel_gc::process_drop_imports(self.tx, self.vat, &krefs) {
                    Ok(()) => SyscallResult::Ok,
                    Err(e) => SyscallResult::Error(e.to_string()),
                }
            }
            Syscall::RetireImports(vrefs) => {
                let krefs = match resolve_all(self.tx, self.vat, &vrefs) {
                    Ok(k) => k,
                    Err(e) => return SyscallResult::Error(e),
                };
                match kernel_gc::process_retire_ack(self.tx, self.vat, &krefs) {
                    Ok(()) => SyscallResult::Ok,
                    Err(e) => SyscallResult::Error(e.to_string()),
                }
            }
            Syscall::RetireExports(vrefs) => {
                let krefs = match resolve_all(self.tx, self.vat, &vrefs) {
                    Ok(k) => k,
                    Err(e) => return SyscallResult::Error(e),
                };
                // An export can only be retired once nobody else recognizes
                // it; scheduling that check is `sweep_for_retire`'s job. Here
                // we only record that the exporting vat itself is done with it.
                let mut distinct: BTreeSet<Kref> = BTreeSet::new();
                distinct.extend(krefs);
                for kref in distinct {
                    if let Err(e) = self.tx.clist_retire(self.vat, &kref) {
                        return SyscallResult::Error(e.to_string());
                    }
                }
                SyscallResult::Ok
            }
        }
    }
}

fn resolve_all(tx: &mut KernelTx<'_>, vat: VatId, vrefs: &[kernel_core::Vref]) -> Result<Vec<Kref>, String> {
    vrefs
        .iter()
        .map(|v| kernel_clist::provide_kref_for_vref(tx, vat, *v).map_err(|e| e.to_string()))
        .collect()
}
