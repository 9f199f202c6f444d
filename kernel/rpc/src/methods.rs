// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use jsonrpc_v2::{Data, Params};
use kernel_core::VatId;

use crate::error::RpcResult;
use crate::facade::{
    Facade, LaunchSubclusterParams, LaunchVatParams, PingVatResult, QueueMessageParams,
    QueueMessageResult, StatusReport,
};

pub type FacadeData = Data<Arc<dyn Facade>>;

pub async fn get_status(data: FacadeData) -> RpcResult<StatusReport> {
    Ok(data.get_status().await?)
}

pub async fn launch_subcluster(data: FacadeData, Params(params): Params<LaunchSubclusterParams>) -> RpcResult<()> {
    Ok(data.launch_subcluster(params).await?)
}

pub async fn terminate_subcluster(data: FacadeData, Params(subcluster): Params<String>) -> RpcResult<()> {
    Ok(data.terminate_subcluster(subcluster).await?)
}

pub async fn reload_subcluster(data: FacadeData, Params(subcluster): Params<String>) -> RpcResult<()> {
    Ok(data.reload_subcluster(subcluster).await?)
}

pub async fn launch_vat(data: FacadeData, Params(params): Params<LaunchVatParams>) -> RpcResult<()> {
    Ok(data.launch_vat(params).await?)
}

pub async fn restart_vat(data: FacadeData, Params(vat): Params<VatId>) -> RpcResult<()> {
    Ok(data.restart_vat(vat).await?)
}

pub async fn terminate_vat(data: FacadeData, Params(vat): Params<VatId>) -> RpcResult<()> {
    Ok(data.terminate_vat(vat).await?)
}

pub async fn ping_vat(data: FacadeData, Params(vat): Params<VatId>) -> RpcResult<PingVatResult> {
    Ok(data.ping_vat(vat).await?)
}

pub async fn queue_message(data: FacadeData, Params(params): Params<QueueMessageParams>) -> RpcResult<QueueMessageResult> {
    Ok(data.queue_message(params).await?)
}

pub async fn inspect(data: FacadeData, Params(vat): Params<VatId>) -> RpcResult<serde_json::Value> {
    Ok(data.inspect(vat).await?)
}

pub async fn execute_db_query(data: FacadeData, Params(sql): Params<String>) -> RpcResult<kernel_store::QueryResult> {
    Ok(data.execute_db_query(sql).await?)
}

pub async fn clear_state(data: FacadeData) -> RpcResult<()> {
    Ok(data.clear_state().await?)
}
