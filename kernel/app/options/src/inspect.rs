// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Kernel-space reference to inspect, e.g. `ko3` or `kp7`.
    pub kref: String,
}
