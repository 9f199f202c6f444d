// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The kernel's JSON-RPC facade.
//!
//! Grounded on `fendermint_eth_api`'s `jsonrpc_v2` + `axum` listener: one
//! server registered with a handful of named methods, routed through a
//! single POST endpoint, with a facade trait standing in for whatever the
//! teacher's version calls into `tendermint_rpc` for.

mod error;
mod facade;
mod methods;
mod server;

pub use error::{RpcError, RpcResult};
pub use facade::{
    Facade, LaunchSubclusterParams, LaunchVatParams, PingVatResult, QueueMessageParams,
    QueueMessageResult, StatusReport,
};
pub use server::listen;
