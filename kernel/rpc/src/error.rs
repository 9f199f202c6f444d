// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Mirrors `fendermint_eth_api`'s `JsonRpcError`: a thin, JSON-RPC-shaped
// wrapper around whatever `anyhow::Error` a facade method actually raised,
// since the kernel has no ABCI exit-code concept of its own to carry through.
pub struct RpcError {
    message: String,
}

impl From<anyhow::Error> for RpcError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            message: format!("{value:#}"),
        }
    }
}

impl From<RpcError> for jsonrpc_v2::Error {
    fn from(value: RpcError) -> Self {
        jsonrpc_v2::Error::Full {
            code: 0,
            message: value.message,
            data: None,
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
