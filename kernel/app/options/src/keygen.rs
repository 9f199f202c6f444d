// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory the generated peer keypair is written into.
    #[arg(long, short, default_value = "~/.kernel/keys")]
    pub out_dir: PathBuf,

    /// Base file name; the keypair is written to `<name>.key`.
    #[arg(long, short, default_value = "peer")]
    pub name: String,
}
