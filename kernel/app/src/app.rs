// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The composition root: one `Scheduler` behind a `tokio::sync::Mutex`,
// shared between the crank-loop task and the `Facade` implementation the
// RPC server calls into. Grounded on `fendermint_app::App`, which plays the
// same role between the ABCI lifecycle and the Tendermint-facing server.
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kernel_core::{Kref, VatId};
use kernel_message::RunqueueEntry;
use kernel_rpc::{
    Facade, LaunchSubclusterParams, LaunchVatParams, PingVatResult, QueueMessageParams,
    QueueMessageResult, StatusReport,
};
use kernel_scheduler::Scheduler;
use kernel_store::tables::directory::{SubclusterRecord, VatLifecycle, VatRecord};
use kernel_store::{KernelStore, QueryResult};
use kernel_supervisor::WasmSupervisor;
use tokio::sync::Mutex;
use tracing::info;

pub struct App {
    scheduler: Arc<Mutex<Scheduler>>,
    bundles_dir: PathBuf,
}

impl App {
    pub fn new(store: KernelStore, bundles_dir: PathBuf) -> Self {
        Self {
            scheduler: Arc::new(Mutex::new(Scheduler::new(store))),
            bundles_dir,
        }
    }

    pub fn scheduler_handle(&self) -> Arc<Mutex<Scheduler>> {
        self.scheduler.clone()
    }

    fn bundle_path(&self, bundle_name: &str) -> PathBuf {
        self.bundles_dir.join(format!("{bundle_name}.wasm"))
    }

    async fn launch_one(&self, scheduler: &mut Scheduler, params: LaunchVatParams) -> anyhow::Result<()> {
        let bundle_path = self.bundle_path(&params.bundle_name);
        let bundle = std::fs::read(&bundle_path)
            .map_err(|e| anyhow::anyhow!("reading vat bundle {bundle_path:?}: {e}"))?;
        let supervisor = WasmSupervisor::load(params.vat, &bundle)?;

        {
            let mut tx = scheduler.store().begin()?;
            tx.put_vat(&VatRecord {
                id: params.vat,
                subcluster: params.subcluster.clone(),
                bundle_name: params.bundle_name.clone(),
                lifecycle: VatLifecycle::Running,
            })?;
            let mut record = tx
                .subcluster(&params.subcluster)?
                .unwrap_or_else(|| SubclusterRecord {
                    id: params.subcluster.clone(),
                    vats: Vec::new(),
                });
            if !record.vats.contains(&params.vat) {
                record.vats.push(params.vat);
            }
            tx.put_subcluster(&record)?;
            tx.commit()?;
        }

        scheduler.register_supervisor(params.vat, Box::new(supervisor));
        info!(vat = %params.vat, subcluster = %params.subcluster, "vat launched");
        Ok(())
    }
}

#[async_trait]
impl Facade for App {
    async fn get_status(&self) -> anyhow::Result<StatusReport> {
        let scheduler = self.scheduler.lock().await;
        let read = scheduler.store().read();
        Ok(StatusReport {
            incarnation: read.incarnation()?,
            vat_count: read.list_vats()?.len(),
            subcluster_count: read.list_subclusters()?.len(),
            runqueue_len: read.runqueue_len()?,
        })
    }

    async fn launch_subcluster(&self, params: LaunchSubclusterParams) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        {
            let mut tx = scheduler.store().begin()?;
            if tx.subcluster(&params.subcluster)?.is_none() {
                tx.put_subcluster(&SubclusterRecord {
                    id: params.subcluster.clone(),
                    vats: Vec::new(),
                })?;
            }
            tx.commit()?;
        }
        for vat_params in params.vats {
            self.launch_one(&mut scheduler, vat_params).await?;
        }
        Ok(())
    }

    async fn terminate_subcluster(&self, subcluster: String) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        let vats = {
            let read = scheduler.store().read();
            match read.subcluster(&subcluster)? {
                Some(record) => record.vats,
                None => return Err(anyhow::anyhow!("unknown subcluster {subcluster}")),
            }
        };
        for vat in vats {
            scheduler.terminate_vat_now(vat)?;
        }
        let mut tx = scheduler.store().begin()?;
        tx.delete_subcluster(&subcluster)?;
        tx.commit()?;
        Ok(())
    }

    async fn reload_subcluster(&self, subcluster: String) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        let vats: Vec<VatRecord> = {
            let read = scheduler.store().read();
            let record = read
                .subcluster(&subcluster)?
                .ok_or_else(|| anyhow::anyhow!("unknown subcluster {subcluster}"))?;
            record
                .vats
                .into_iter()
                .filter_map(|vat| read.vat(vat).transpose())
                .collect::<Result<_, _>>()?
        };
        for record in &vats {
            scheduler.terminate_vat_now(record.id)?;
        }
        for record in vats {
            self.launch_one(
                &mut scheduler,
                LaunchVatParams {
                    vat: record.id,
                    subcluster: record.subcluster,
                    bundle_name: record.bundle_name,
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn launch_vat(&self, params: LaunchVatParams) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        self.launch_one(&mut scheduler, params).await
    }

    async fn restart_vat(&self, vat: VatId) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        let record = {
            let read = scheduler.store().read();
            read.vat(vat)?
                .ok_or_else(|| anyhow::anyhow!("unknown vat {vat}"))?
        };
        scheduler.terminate_vat_now(vat)?;
        self.launch_one(
            &mut scheduler,
            LaunchVatParams {
                vat: record.id,
                subcluster: record.subcluster,
                bundle_name: record.bundle_name,
            },
        )
        .await
    }

    async fn terminate_vat(&self, vat: VatId) -> anyhow::Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        scheduler.terminate_vat_now(vat)
    }

    async fn ping_vat(&self, vat: VatId) -> anyhow::Result<PingVatResult> {
        let scheduler = self.scheduler.lock().await;
        let alive = scheduler.store().read().vat(vat)?.is_some();
        Ok(PingVatResult { alive })
    }

    async fn queue_message(&self, params: QueueMessageParams) -> anyhow::Result<QueueMessageResult> {
        let scheduler = self.scheduler.lock().await;
        let mut tx = scheduler.store().begin()?;
        let result_kref = tx.next_promise_kref()?;
        tx.init_promise(result_kref, None)?;
        tx.push_runqueue(&RunqueueEntry::Send {
            target: params.target,
            method: params.method,
            args: params.args,
            result: Some(result_kref),
        })?;
        tx.commit()?;
        Ok(QueueMessageResult {
            result_promise: Some(result_kref),
        })
    }

    async fn inspect(&self, vat: VatId) -> anyhow::Result<serde_json::Value> {
        let scheduler = self.scheduler.lock().await;
        let read = scheduler.store().read();
        let record = read.vat(vat)?;
        let clist = read.clist_for_vat(vat)?;
        Ok(serde_json::json!({
            "vat": record,
            "clist": clist,
        }))
    }

    async fn execute_db_query(&self, sql: String) -> anyhow::Result<QueryResult> {
        let scheduler = self.scheduler.lock().await;
        Ok(scheduler.store().execute_query(&sql)?)
    }

    async fn clear_state(&self) -> anyhow::Result<()> {
        let scheduler = self.scheduler.lock().await;
        Ok(scheduler.store().clear()?)
    }
}

/// Look up a kernel-space reference for the `inspect` CLI command; this
/// doesn't go through the `Facade` trait since it reports on objects and
/// promises, not just vats.
pub async fn inspect_kref(scheduler: &Arc<Mutex<Scheduler>>, kref: Kref) -> anyhow::Result<serde_json::Value> {
    let scheduler = scheduler.lock().await;
    let read = scheduler.store().read();
    match kref {
        Kref::Object(_) => Ok(serde_json::json!({ "kref": kref.to_string(), "object": read.object(&kref)? })),
        Kref::Promise(kpref) => Ok(serde_json::json!({ "kref": kref.to_string(), "promise": read.promise(kpref)? })),
        Kref::Device(_) => Ok(serde_json::json!({ "kref": kref.to_string(), "device": serde_json::Value::Null })),
    }
}
