// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Object-capability URLs: an unguessable token naming one specific exported
// object on one specific peer, in the same spirit as a CapTP "sturdyref" --
// possessing the URL is the only credential needed to redeem it.
use std::fmt;
use std::str::FromStr;

use libp2p::PeerId;
use rand::RngCore;
use thiserror::Error;

const SWISS_NUM_BYTES: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OcapUrlError {
    #[error("ocap URL {0:?} is missing the ocap:// scheme")]
    MissingScheme(String),
    #[error("ocap URL {0:?} is missing its peer or swiss number segment")]
    MissingSegment(String),
    #[error("ocap URL {0:?} has an invalid peer id")]
    InvalidPeerId(String),
}

/// `ocap://<peer-id>/<swiss-number>`. The swiss number is a random,
/// unguessable token minted fresh for every `issue`; redeeming it is the only
/// way for a remote peer to learn which kernel object it names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OcapUrl {
    pub peer: PeerId,
    pub swiss_num: String,
}

impl OcapUrl {
    pub fn issue(peer: PeerId) -> Self {
        let mut bytes = [0u8; SWISS_NUM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            peer,
            swiss_num: hex::encode(bytes),
        }
    }
}

impl fmt::Display for OcapUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ocap://{}/{}", self.peer, self.swiss_num)
    }
}

impl FromStr for OcapUrl {
    type Err = OcapUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("ocap://")
            .ok_or_else(|| OcapUrlError::MissingScheme(s.to_string()))?;
        let (peer, swiss_num) = rest
            .split_once('/')
            .ok_or_else(|| OcapUrlError::MissingSegment(s.to_string()))?;
        let peer = PeerId::from_str(peer).map_err(|_| OcapUrlError::InvalidPeerId(s.to_string()))?;
        Ok(Self {
            peer,
            swiss_num: swiss_num.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_urls_round_trip_through_their_display_form() {
        let peer = PeerId::random();
        let url = OcapUrl::issue(peer);
        let parsed: OcapUrl = url.to_string().parse().unwrap();
        assert_eq!(url, parsed);
    }

    #[test]
    fn two_issued_urls_never_collide() {
        let peer = PeerId::random();
        let a = OcapUrl::issue(peer);
        let b = OcapUrl::issue(peer);
        assert_ne!(a.swiss_num, b.swiss_num);
    }

    #[test]
    fn rejects_urls_without_the_scheme() {
        assert!(OcapUrl::from_str("http://x/y").is_err());
    }
}
