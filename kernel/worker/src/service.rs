// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use async_trait::async_trait;
use kernel_core::VatId;
use kernel_supervisor::VatSupervisor;

use crate::worker::ProcessSupervisor;

/// Launches the sandbox for a newly created vat. Separated from
/// `ProcessSupervisor` itself so the scheduler can depend on this trait
/// without caring whether a given deployment actually runs vats as OS
/// processes, in-process WASM instances, or something else entirely.
#[async_trait]
pub trait VatWorkerService: Send + Sync {
    async fn launch(&self, vat: VatId, bundle_path: &Path) -> anyhow::Result<Box<dyn VatSupervisor>>;
}

/// Runs every vat worker as its own OS process, re-executing the kernel's own
/// binary in a `vat-worker` subcommand mode that reads `bundle_path` and
/// speaks the stdio protocol.
pub struct ProcessWorkerService {
    program: String,
    subcommand: String,
}

impl ProcessWorkerService {
    pub fn new(program: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.into(),
        }
    }
}

#[async_trait]
impl VatWorkerService for ProcessWorkerService {
    async fn launch(&self, vat: VatId, bundle_path: &Path) -> anyhow::Result<Box<dyn VatSupervisor>> {
        let args = vec![
            self.subcommand.clone(),
            "--bundle".to_string(),
            bundle_path.display().to_string(),
        ];
        let supervisor = ProcessSupervisor::spawn(vat, &self.program, &args)?;
        Ok(Box::new(supervisor))
    }
}
