// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// A cheap, cloneable handle onto a running `Service`, mirroring the
// resolver's own split between a `Client` that only ever pushes onto an
// unbounded channel and a `Service` that owns the swarm and actually reads
// it back.
use anyhow::anyhow;
use libp2p::request_response::ResponseChannel;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::protocol::{OcapRequest, OcapResponse};

/// Internal requests enqueued to the `Service`.
pub(crate) enum Request {
    Dial(Multiaddr, oneshot::Sender<anyhow::Result<()>>),
    Send(PeerId, OcapRequest, oneshot::Sender<anyhow::Result<OcapResponse>>),
    Respond(ResponseChannel<OcapResponse>, OcapResponse),
}

/// Pushed to clients outside of the request/response flow they themselves
/// initiated: a peer reaching out to redeem or invoke one of our
/// capabilities.
#[derive(Clone)]
pub enum Event {
    Inbound {
        peer: PeerId,
        request: OcapRequest,
        channel: InboundChannel,
    },
}

/// A handle back to the pending inbound request, consumed by exactly one
/// call to [`Client::respond`].
#[derive(Clone)]
pub struct InboundChannel(pub(crate) std::sync::Arc<std::sync::Mutex<Option<ResponseChannel<OcapResponse>>>>);

#[derive(Clone)]
pub struct Client {
    request_tx: mpsc::UnboundedSender<Request>,
}

impl Client {
    pub(crate) fn new(request_tx: mpsc::UnboundedSender<Request>) -> Self {
        Self { request_tx }
    }

    fn send(&self, req: Request) -> anyhow::Result<()> {
        self.request_tx.send(req).map_err(|_| anyhow!("remote service has stopped"))
    }

    pub async fn dial(&self, addr: Multiaddr) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Dial(addr, tx))?;
        rx.await?
    }

    pub async fn redeem(&self, peer: PeerId, swiss_num: String) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Send(peer, OcapRequest::Redeem { swiss_num }, tx))?;
        match rx.await?? {
            OcapResponse::Redeemed { ok } => Ok(ok),
            other => Err(anyhow!("unexpected response to redeem: {other:?}")),
        }
    }

    /// Tell `peer` that this kernel just restarted under a new incarnation,
    /// per the remote comms subsystem's `remoteIncarnationChange` notice.
    pub async fn notify_incarnation_bump(&self, peer: PeerId, incarnation: u64) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Send(peer, OcapRequest::IncarnationBump { incarnation }, tx))?;
        match rx.await?? {
            OcapResponse::Ack => Ok(()),
            other => Err(anyhow!("unexpected response to incarnation bump notice: {other:?}")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_message(
        &self,
        peer: PeerId,
        swiss_num: String,
        method: String,
        args: kernel_message::CapData,
        incarnation: u64,
    ) -> anyhow::Result<OcapResponse> {
        let (tx, rx) = oneshot::channel();
        let request = OcapRequest::Send {
            swiss_num,
            method,
            args,
            incarnation,
        };
        self.send(Request::Send(peer, request, tx))?;
        rx.await?
    }

    pub fn respond(&self, channel: InboundChannel, response: OcapResponse) -> anyhow::Result<()> {
        let inner = channel
            .0
            .lock()
            .expect("inbound channel mutex poisoned")
            .take()
            .ok_or_else(|| anyhow!("inbound request already answered"))?;
        self.send(Request::Respond(inner, response))
    }
}

pub(crate) fn subscribe(event_tx: &broadcast::Sender<Event>) -> broadcast::Receiver<Event> {
    event_tx.subscribe()
}
