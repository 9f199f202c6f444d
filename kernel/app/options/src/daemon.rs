// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommands,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum DaemonCommands {
    /// Run the kernel, driving cranks until interrupted.
    Run {
        /// Listen address for the JSON-RPC facade.
        #[arg(long, default_value = "127.0.0.1:8645")]
        rpc_listen: String,

        /// Listen multiaddr for the remote peer transport.
        #[arg(long, default_value = "/ip4/0.0.0.0/tcp/0")]
        remote_listen: String,

        /// Seconds between `bringOutYourDead` sweeps; 0 disables the sweep.
        #[arg(long, default_value = "30")]
        sweep_interval_secs: u64,
    },
}
