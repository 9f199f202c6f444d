// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Peer identity: a libp2p keypair and the `PeerId` derived from it. Grounded
// on the resolver's `NetworkConfig::local_key`/`local_peer_id` split between
// the signing key a deployment persists and the derived identifier that
// shows up everywhere else.
use libp2p::identity::Keypair;
use libp2p::PeerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to decode keypair: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct PeerIdentity {
    keypair: Keypair,
}

impl PeerIdentity {
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate_ed25519(),
        }
    }

    pub fn from_protobuf_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let keypair = Keypair::from_protobuf_encoding(bytes).map_err(|e| IdentityError::Decode(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn to_protobuf_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        self.keypair
            .to_protobuf_encoding()
            .map_err(|e| IdentityError::Decode(e.to_string()))
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_protobuf_bytes() {
        let identity = PeerIdentity::generate();
        let bytes = identity.to_protobuf_bytes().unwrap();
        let restored = PeerIdentity::from_protobuf_bytes(&bytes).unwrap();
        assert_eq!(identity.peer_id(), restored.peer_id());
    }
}
