// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Peer identity, ocap URL issuance, and the libp2p transport kernels use to
//! reach each other.
//!
//! Grounded on the resolver's own `Client`/`Service` split over a libp2p
//! `Swarm`: a cheap, cloneable `Client` that only ever pushes requests onto
//! an unbounded channel, and a `Service` that owns the swarm, drives a
//! `tokio::select!` event loop, and answers those requests plus whatever
//! other peers send in return.

mod behaviour;
mod client;
mod identity;
mod ocap_url;
mod protocol;
mod service;

pub use behaviour::Behaviour;
pub use client::{Client, Event, InboundChannel};
pub use identity::{IdentityError, PeerIdentity};
pub use ocap_url::{OcapUrl, OcapUrlError};
pub use protocol::{IssuedCapability, OcapCodec, OcapProtocol, OcapRequest, OcapResponse};
pub use service::Service;
