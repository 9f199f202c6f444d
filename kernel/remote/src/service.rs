// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The Swarm owner: builds the transport, drives the event loop, and answers
// whatever a `Client` enqueues. Grounded on the resolver's own
// `Service::run` select loop -- one arm for swarm events, one arm for
// client-originated requests -- simplified down to the one behaviour
// bundle this kernel actually needs.
use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::Boxed;
use libp2p::core::upgrade;
use libp2p::request_response::{RequestId, RequestResponseEvent, RequestResponseMessage};
use libp2p::swarm::SwarmEvent;
use libp2p::{identity::Keypair, noise, tcp, yamux, Multiaddr, PeerId, Swarm, Transport};
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::behaviour::{Behaviour, BehaviourEvent};
use crate::client::{Client, Event, InboundChannel, Request};
use crate::protocol::{OcapRequest, OcapResponse};

const EVENT_BUFFER_CAPACITY: usize = 256;

pub struct Service {
    peer_id: PeerId,
    listen_addr: Multiaddr,
    swarm: Swarm<Behaviour>,
    request_rx: mpsc::UnboundedReceiver<Request>,
    request_tx: mpsc::UnboundedSender<Request>,
    event_tx: broadcast::Sender<Event>,
    pending_outbound: HashMap<RequestId, oneshot::Sender<anyhow::Result<OcapResponse>>>,
}

impl Service {
    pub fn new(keypair: Keypair, listen_addr: Multiaddr) -> anyhow::Result<(Self, Client)> {
        let peer_id = keypair.public().to_peer_id();
        let transport = build_transport(keypair.clone())?;
        let behaviour = Behaviour::new(keypair.public());
        let swarm = Swarm::new(
            transport,
            behaviour,
            peer_id,
            libp2p::swarm::Config::with_tokio_executor(),
        );
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        let client = Client::new(request_tx.clone());
        let service = Self {
            peer_id,
            listen_addr,
            swarm,
            request_rx,
            request_tx,
            event_tx,
            pending_outbound: HashMap::new(),
        };
        Ok((service, client))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        Swarm::listen_on(&mut self.swarm, self.listen_addr.clone())?;
        loop {
            select! {
                event = self.swarm.next() => match event {
                    Some(SwarmEvent::Behaviour(event)) => self.handle_behaviour_event(event),
                    Some(_) => {},
                    None => break,
                },
                request = self.request_rx.recv() => match request {
                    Some(req) => self.handle_request(req),
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Dial(addr, respond_to) => {
                let result = Swarm::dial(&mut self.swarm, addr).map_err(|e| anyhow!(e.to_string()));
                let _ = respond_to.send(result);
            }
            Request::Send(peer, req, respond_to) => {
                let id = self
                    .swarm
                    .behaviour_mut()
                    .request_response
                    .send_request(&peer, req);
                self.pending_outbound.insert(id, respond_to);
            }
            Request::Respond(channel, response) => {
                if self
                    .swarm
                    .behaviour_mut()
                    .request_response
                    .send_response(channel, response)
                    .is_err()
                {
                    debug!("tried to answer an inbound ocap request whose channel was already gone");
                }
            }
        }
    }

    fn handle_behaviour_event(&mut self, event: BehaviourEvent) {
        match event {
            BehaviourEvent::RequestResponse(event) => self.handle_request_response_event(event),
            BehaviourEvent::Identify(event) => self.handle_identify_event(event),
            BehaviourEvent::Ping(event) => self.handle_ping_event(event),
        }
    }

    fn handle_request_response_event(
        &mut self,
        event: RequestResponseEvent<OcapRequest, OcapResponse>,
    ) {
        match event {
            RequestResponseEvent::Message { peer, message } => match message {
                RequestResponseMessage::Request {
                    request, channel, ..
                } => {
                    let inbound = InboundChannel(std::sync::Arc::new(std::sync::Mutex::new(Some(
                        channel,
                    ))));
                    let _ = self.event_tx.send(Event::Inbound {
                        peer,
                        request,
                        channel: inbound,
                    });
                }
                RequestResponseMessage::Response {
                    request_id,
                    response,
                } => {
                    if let Some(respond_to) = self.pending_outbound.remove(&request_id) {
                        let _ = respond_to.send(Ok(response));
                    }
                }
            },
            RequestResponseEvent::OutboundFailure {
                request_id, error, ..
            } => {
                if let Some(respond_to) = self.pending_outbound.remove(&request_id) {
                    let _ = respond_to.send(Err(anyhow!("ocap request failed: {error}")));
                }
            }
            RequestResponseEvent::InboundFailure { peer, error, .. } => {
                warn!("ocap request from {peer} failed: {error}");
            }
            RequestResponseEvent::ResponseSent { .. } => {}
        }
    }

    fn handle_identify_event(&mut self, event: libp2p::identify::Event) {
        if let libp2p::identify::Event::Received { peer_id, info } = event {
            trace!(
                "identified {peer_id} with {} listen addresses",
                info.listen_addrs.len()
            );
            for addr in info.listen_addrs {
                self.swarm
                    .behaviour_mut()
                    .request_response
                    .add_address(&peer_id, addr);
            }
        }
    }

    fn handle_ping_event(&mut self, event: libp2p::ping::Event) {
        if let Err(failure) = event.result {
            debug!("ping to {} failed: {failure}", event.peer);
        }
    }
}

fn build_transport(keypair: Keypair) -> anyhow::Result<Boxed<(PeerId, StreamMuxerBox)>> {
    let tcp_transport = tcp::tokio::Transport::new(tcp::Config::new().nodelay(true));
    let transport = libp2p::dns::tokio::Transport::system(tcp_transport)?;
    let auth_config = noise::Config::new(&keypair)?;
    let transport = transport
        .upgrade(upgrade::Version::V1)
        .authenticate(auth_config)
        .multiplex(yamux::Config::default())
        .timeout(Duration::from_secs(20))
        .boxed();
    Ok(transport)
}
