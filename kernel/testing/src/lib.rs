// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Shared test helpers for the kernel workspace, grounded on `fendermint_testing`'s
//! split between arbitrary-data generators and on-disk fixtures, each behind its
//! own Cargo feature so a dependent crate only pulls in what it exercises.

#[cfg(feature = "arb")]
pub mod arb;

#[cfg(feature = "fixtures")]
pub mod fixtures;
