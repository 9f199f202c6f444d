// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Runqueue entries and the GC action queue they schedule.
use kernel_core::{Kref, PromiseKref, VatId};
use serde::{Deserialize, Serialize};

use crate::capdata::CapData;

/// One drop or retire action, coalesced per (vat, kind) in the GC action queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GcActionKind {
    Drop,
    Retire,
}

/// A `gc-action` runqueue entry: the named vat is told to drop or retire the
/// listed krefs from its clist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GcAction {
    pub kind: GcActionKind,
    pub vat: VatId,
    pub krefs: Vec<Kref>,
}

/// One unit of work the scheduler can dequeue and dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RunqueueEntry {
    /// A message sent to `target`. If `target` is an unresolved promise, the send
    /// is queued on it instead of being delivered (pipelining).
    Send {
        target: Kref,
        method: String,
        args: CapData,
        result: Option<PromiseKref>,
    },
    /// `subscriber` is told that `promise` has resolved.
    Notify {
        subscriber: VatId,
        promise: PromiseKref,
    },
    /// A coalesced drop/retire action for one vat.
    GcAction(GcAction),
    /// Periodic GC sweep: ask `vat`'s supervisor to release its own finalized refs.
    BringOutYourDead(VatId),
}

impl RunqueueEntry {
    /// The krefs this entry references, for refcount bookkeeping when the entry is
    /// enqueued or dequeued: every occurrence in the runqueue adjusts `reachable`.
    pub fn referenced_krefs(&self) -> Vec<Kref> {
        match self {
            RunqueueEntry::Send { target, args, result, .. } => {
                let mut krefs = vec![*target];
                krefs.extend(args.referenced_krefs().iter().copied());
                if let Some(p) = result {
                    krefs.push(Kref::Promise(*p));
                }
                krefs
            }
            RunqueueEntry::Notify { promise, .. } => vec![Kref::Promise(*promise)],
            RunqueueEntry::GcAction(a) => a.krefs.clone(),
            RunqueueEntry::BringOutYourDead(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::ObjectKref;

    #[test]
    fn send_references_target_args_and_result() {
        let target = Kref::Object(ObjectKref::new(1));
        let arg_kref = Kref::Object(ObjectKref::new(2));
        let args = CapData {
            body: "[{\"type\":\"slot\",\"index\":0}]".to_string(),
            slots: vec![arg_kref],
        };
        let result = PromiseKref::new(9);
        let entry = RunqueueEntry::Send {
            target,
            method: "foo".to_string(),
            args,
            result: Some(result),
        };
        let refs = entry.referenced_krefs();
        assert!(refs.contains(&target));
        assert!(refs.contains(&arg_kref));
        assert!(refs.contains(&Kref::Promise(result)));
    }
}
