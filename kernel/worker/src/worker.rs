// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// A vat worker running as a child OS process, speaking the line-delimited
// JSON protocol in `protocol`. Each `deliver` call picks a fresh label,
// writes one `ToChild::Deliver`, then reads lines until it gets back the
// matching `FromChild::Result`, answering any interleaved syscalls as they
// arrive.
use std::process::Stdio;

use async_trait::async_trait;
use kernel_core::{ProtocolError, VatId};
use kernel_message::{Delivery, DeliveryResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use kernel_supervisor::{SyscallSink, VatSupervisor};

use crate::protocol::{FromChild, ToChild};

pub struct ProcessSupervisor {
    vat: VatId,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_label: u64,
}

impl ProcessSupervisor {
    /// Spawn `program` (a vat worker binary) with `args`, expecting it to
    /// speak the kernel<->worker protocol on its stdio.
    pub fn spawn(vat: VatId, program: &str, args: &[String]) -> std::io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("child spawned with piped stdin");
        let stdout = child.stdout.take().expect("child spawned with piped stdout");

        Ok(Self {
            vat,
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_label: 0,
        })
    }

    async fn write_line(&mut self, message: &ToChild) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> anyhow::Result<FromChild> {
        let line = self
            .lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("worker for vat {} closed its stdout", self.vat))?;
        Ok(serde_json::from_str(&line)?)
    }
}

#[async_trait]
impl VatSupervisor for ProcessSupervisor {
    async fn deliver(
        &mut self,
        _vat: VatId,
        delivery: Delivery,
        syscalls: &mut dyn SyscallSink,
    ) -> anyhow::Result<DeliveryResult> {
        let label = self.next_label;
        self.next_label += 1;

        self.write_line(&ToChild::Deliver { label, delivery }).await?;

        loop {
            match self.read_line().await? {
                FromChild::Syscall { label: got, call } if got == label => {
                    let answer = syscalls.syscall(call).await;
                    self.write_line(&ToChild::SyscallAnswer { label, answer }).await?;
                }
                FromChild::Result { label: got, result } if got == label => return Ok(result),
                FromChild::Syscall { label: got, .. } | FromChild::Result { label: got, .. } => {
                    return Err(ProtocolError::LabelMismatch { expected: label, got }.into());
                }
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}
