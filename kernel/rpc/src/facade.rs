// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The surface every kernel deployment exposes over JSON-RPC. `kernel-app`
// supplies the real implementation, wiring it to a `Scheduler` and a
// `KernelStore`; this crate only knows the request/response shapes and how
// to route them, the same separation `fendermint_eth_api` draws between its
// handlers and the node they end up calling into.
use async_trait::async_trait;
use kernel_core::VatId;
use kernel_message::CapData;
use kernel_store::QueryResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub incarnation: u64,
    pub vat_count: usize,
    pub subcluster_count: usize,
    pub runqueue_len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchSubclusterParams {
    pub subcluster: String,
    pub vats: Vec<LaunchVatParams>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchVatParams {
    pub vat: VatId,
    pub subcluster: String,
    pub bundle_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueMessageParams {
    pub target: kernel_core::Kref,
    pub method: String,
    pub args: CapData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueMessageResult {
    pub result_promise: Option<kernel_core::PromiseKref>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingVatResult {
    pub alive: bool,
}

/// Implemented once, by `kernel-app`, over whatever combination of
/// `kernel_scheduler::Scheduler` and `kernel_store::KernelStore` a running
/// kernel actually holds.
#[async_trait]
pub trait Facade: Send + Sync {
    async fn get_status(&self) -> anyhow::Result<StatusReport>;
    async fn launch_subcluster(&self, params: LaunchSubclusterParams) -> anyhow::Result<()>;
    async fn terminate_subcluster(&self, subcluster: String) -> anyhow::Result<()>;
    async fn reload_subcluster(&self, subcluster: String) -> anyhow::Result<()>;
    async fn launch_vat(&self, params: LaunchVatParams) -> anyhow::Result<()>;
    async fn restart_vat(&self, vat: VatId) -> anyhow::Result<()>;
    async fn terminate_vat(&self, vat: VatId) -> anyhow::Result<()>;
    async fn ping_vat(&self, vat: VatId) -> anyhow::Result<PingVatResult>;
    async fn queue_message(&self, params: QueueMessageParams) -> anyhow::Result<QueueMessageResult>;
    async fn inspect(&self, vat: VatId) -> anyhow::Result<serde_json::Value>;
    async fn execute_db_query(&self, sql: String) -> anyhow::Result<QueryResult>;
    async fn clear_state(&self) -> anyhow::Result<()>;
}
