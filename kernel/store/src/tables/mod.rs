// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod acceptance;
pub mod clist;
pub mod counters;
pub mod directory;
pub mod objects;
pub mod promises;
pub mod runqueue;
pub mod vatstore;
