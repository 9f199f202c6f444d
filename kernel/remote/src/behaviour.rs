// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// The libp2p behaviour bundle driven by `Service`: request/response for ocap
// traffic, identify so peers learn each other's listen addresses, and ping
// to detect dead connections. One derive, one event enum, same shape the
// resolver's own `Behaviour` takes for its own handful of sub-behaviours.
use libp2p::request_response::{ProtocolSupport, RequestResponse, RequestResponseConfig};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, ping};

use crate::protocol::{OcapCodec, OcapProtocol};

#[derive(NetworkBehaviour)]
pub struct Behaviour {
    pub request_response: RequestResponse<OcapCodec>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

impl Behaviour {
    pub fn new(local_public_key: libp2p::identity::PublicKey) -> Self {
        let request_response = RequestResponse::new(
            OcapCodec,
            std::iter::once((OcapProtocol, ProtocolSupport::Full)),
            RequestResponseConfig::default(),
        );
        let identify = identify::Behaviour::new(identify::Config::new(
            "/kernel/1.0.0".into(),
            local_public_key,
        ));
        let ping = ping::Behaviour::default();
        Self {
            request_response,
            identify,
            ping,
        }
    }
}
