// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The request/response pair exchanged between kernels, and a JSON codec for
// them built on `libp2p::request_response`. There is no kernel-specific
// streaming format here -- length-prefixed JSON over whatever transport the
// behaviour negotiates, the same shallow-codec approach the resolver example
// takes for its own CapTP-free subnet gossip.
use std::io;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use kernel_message::CapData;
use libp2p::core::ProtocolName;
use libp2p::request_response::RequestResponseCodec;
use serde::{Deserialize, Serialize};

use crate::ocap_url::OcapUrl;

const MAX_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OcapRequest {
    /// Redeem a previously issued ocap URL, establishing a remote reference
    /// to the object it names.
    Redeem { swiss_num: String },
    /// Send a message to a capability the peer already redeemed.
    Send {
        swiss_num: String,
        method: String,
        args: CapData,
        incarnation: u64,
    },
    /// The sending kernel just restarted: its incarnation counter bumped to
    /// `incarnation`. Capabilities and in-flight promises the receiver holds
    /// against the sender's old incarnation are no longer backed by the same
    /// process and must be treated as stale.
    IncarnationBump { incarnation: u64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OcapResponse {
    Redeemed { ok: bool },
    SendAccepted { ok: bool, error: Option<String> },
    Ack,
}

#[derive(Debug, Clone, Default)]
pub struct OcapProtocol;

impl ProtocolName for OcapProtocol {
    fn protocol_name(&self) -> &[u8] {
        b"/kernel/ocap/1.0.0"
    }
}

#[derive(Debug, Clone, Default)]
pub struct OcapCodec;

#[async_trait]
impl RequestResponseCodec for OcapCodec {
    type Protocol = OcapProtocol;
    type Request = OcapRequest;
    type Response = OcapResponse;

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_json(io).await
    }

    async fn read_response<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_json(io).await
    }

    async fn write_request<T>(&mut self, _: &Self::Protocol, io: &mut T, req: Self::Request) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_json(io, &req).await
    }

    async fn write_response<T>(&mut self, _: &Self::Protocol, io: &mut T, res: Self::Response) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_json(io, &res).await
    }
}

async fn read_json<T, M>(io: &mut T) -> io::Result<M>
where
    T: AsyncRead + Unpin + Send,
    M: for<'de> Deserialize<'de>,
{
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "ocap message too large"));
    }
    let mut body = vec![0u8; len as usize];
    io.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_json<T, M>(io: &mut T, message: &M) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: Serialize,
{
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "ocap message too large"))?;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&body).await?;
    Ok(())
}

/// What an ocap URL's swiss number resolves to once issued, before it has
/// ever been redeemed.
#[derive(Clone, Debug)]
pub struct IssuedCapability {
    pub url: OcapUrl,
    pub target: kernel_core::Kref,
}
