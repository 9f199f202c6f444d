// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::str::FromStr;

use kernel_app_options::inspect::InspectArgs;
use kernel_core::Kref;
use kernel_store::KernelStore;

crate::cmd! {
  InspectArgs(self, settings) {
    let kref = Kref::from_str(&self.kref)
        .map_err(|e| anyhow::anyhow!("{:?} is not a kernel-space reference: {e}", self.kref))?;
    let store = KernelStore::open(settings.db_path())?;
    let read = store.read();
    let report = match kref {
        Kref::Object(_) => serde_json::json!({ "kref": kref.to_string(), "object": read.object(&kref)? }),
        Kref::Promise(kpref) => serde_json::json!({ "kref": kref.to_string(), "promise": read.promise(kpref)? }),
        Kref::Device(_) => serde_json::json!({ "kref": kref.to_string(), "device": serde_json::Value::Null }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
  }
}
