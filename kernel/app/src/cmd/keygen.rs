// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs;

use kernel_app_options::keygen::KeygenArgs;
use kernel_remote::PeerIdentity;
use tracing::info;

crate::cmd! {
  KeygenArgs(self, _settings) {
    fs::create_dir_all(&self.out_dir)?;
    let identity = PeerIdentity::generate();
    let path = self.out_dir.join(format!("{}.key", self.name));
    fs::write(&path, identity.to_protobuf_bytes()?)?;
    info!(peer = %identity.peer_id(), path = %path.display(), "wrote peer keypair");
    Ok(())
  }
}
