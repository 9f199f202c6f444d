// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// In-memory settlement broadcaster, grounded on the `ResolvePool`/`TVar`
// pattern: a caller can register interest in a promise and await its
// settlement without polling the store on a timer. This is an optimization
// over the otherwise-authoritative kernel store, not a second source of
// truth -- on restart, every `TVar` here starts empty, and waiters on an
// already-settled promise just fetch its resolution straight from storage
// instead of registering a watch.
use async_stm::{StmResult, TVar};
use im::HashMap;
use kernel_core::PromiseKref;
use kernel_message::CapData;

#[derive(Clone, Debug, PartialEq)]
pub enum Settlement {
    Fulfilled(CapData),
    Rejected(CapData),
}

#[derive(Clone, Default)]
pub struct PromiseWatch {
    pending: TVar<HashMap<PromiseKref, TVar<Option<Settlement>>>>,
}

impl PromiseWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `kpref`, returning a handle whose value flips
    /// from `None` to `Some` exactly once, when the crank loop calls
    /// [`PromiseWatch::settle`].
    pub fn watch(&self, kpref: PromiseKref) -> StmResult<TVar<Option<Settlement>>> {
        self.pending.modify(|mut map| {
            let slot = map.entry(kpref).or_insert_with(TVar::default).clone();
            (map, slot)
        })
    }

    /// Called once by the scheduler after a crank resolves `kpref`.
    pub fn settle(&self, kpref: PromiseKref, settlement: Settlement) -> StmResult<()> {
        let slot = self.pending.modify(|mut map| {
            let slot = map.entry(kpref).or_insert_with(TVar::default).clone();
            map.remove(&kpref);
            (map, slot)
        })?;
        slot.write(Some(settlement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_stm::atomically;
    use kernel_message::Value;

    #[tokio::test]
    async fn watch_then_settle_delivers_value() {
        let watch = PromiseWatch::new();
        let kpref = PromiseKref::new(1);
        let slot = atomically(|| watch.watch(kpref)).await;

        atomically(|| {
            watch.settle(kpref, Settlement::Fulfilled(CapData::encode(&Value::Bool(true)).unwrap()))
        })
        .await;

        let observed = atomically(|| slot.read_clone()).await;
        assert_eq!(
            observed,
            Some(Settlement::Fulfilled(CapData::encode(&Value::Bool(true)).unwrap()))
        );
    }
}
