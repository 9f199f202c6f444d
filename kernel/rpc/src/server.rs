// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Grounded on `fendermint_eth_api`'s Ethereum JSON-RPC listener: one
// `jsonrpc_v2::Server` wrapping the facade, exposed over `axum` at a single
// POST route.
use std::net::ToSocketAddrs;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use jsonrpc_v2::{Data, Id, RequestObject};

use crate::facade::Facade;
use crate::methods;

type JsonRpcServer = Arc<jsonrpc_v2::Server<jsonrpc_v2::MapRouter>>;

pub async fn listen<A: ToSocketAddrs>(listen_addr: A, facade: Arc<dyn Facade>) -> anyhow::Result<()> {
    let addr = listen_addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("failed to convert to any socket address"))?;

    let server = make_server(facade);
    let router = make_router(server);
    let server = axum::Server::try_bind(&addr)?.serve(router.into_make_service());

    tracing::info!(?addr, "bound kernel JSON-RPC facade");
    server.await?;
    Ok(())
}

fn make_server(facade: Arc<dyn Facade>) -> JsonRpcServer {
    jsonrpc_v2::Server::new()
        .with_data(Data(facade))
        .with_method("getStatus", methods::get_status)
        .with_method("launchSubcluster", methods::launch_subcluster)
        .with_method("terminateSubcluster", methods::terminate_subcluster)
        .with_method("reloadSubcluster", methods::reload_subcluster)
        .with_method("launchVat", methods::launch_vat)
        .with_method("restartVat", methods::restart_vat)
        .with_method("terminateVat", methods::terminate_vat)
        .with_method("pingVat", methods::ping_vat)
        .with_method("queueMessage", methods::queue_message)
        .with_method("inspect", methods::inspect)
        .with_method("executeDBQuery", methods::execute_db_query)
        .with_method("clearState", methods::clear_state)
        .finish()
}

fn make_router(server: JsonRpcServer) -> axum::Router {
    axum::Router::new()
        .route("/rpc/v0", post(handle))
        .with_state(server)
}

async fn handle(
    _headers: HeaderMap,
    axum::extract::State(server): axum::extract::State<JsonRpcServer>,
    axum::Json(request): axum::Json<RequestObject>,
) -> impl IntoResponse {
    let headers = [("content-type", "application/json-rpc;charset=utf-8")];
    let id = request.id_ref().map(id_to_string).unwrap_or_default();
    let method = request.method_ref().to_owned();

    let response = server.handle(request).await;
    let body = serde_json::to_string(&response).unwrap_or_else(|e| e.to_string());
    tracing::debug!(method, id, "handled kernel RPC call");
    (StatusCode::OK, headers, body)
}

fn id_to_string(id: &Id) -> String {
    match id {
        Id::Null => "null".to_owned(),
        Id::Str(s) => (**s).to_owned(),
        Id::Num(n) => n.to_string(),
    }
}
