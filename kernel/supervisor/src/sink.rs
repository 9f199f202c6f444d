// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use kernel_message::{Syscall, SyscallResult};

/// The kernel side of a delivery: whatever drives the current crank accepts
/// syscalls from the supervisor one at a time and answers each before the
/// vat continues running.
#[async_trait]
pub trait SyscallSink: Send {
    async fn syscall(&mut self, call: Syscall) -> SyscallResult;
}

/// A `SyscallSink` that just records every call and replays a fixed answer
/// for each, in order. Used by supervisor implementations' own tests, where
/// there is no real crank loop to ask.
#[derive(Default)]
pub struct VecSyscallSink {
    pub calls: Vec<Syscall>,
    pub answers: std::collections::VecDeque<SyscallResult>,
}

impl VecSyscallSink {
    pub fn with_answers(answers: Vec<SyscallResult>) -> Self {
        Self {
            calls: Vec::new(),
            answers: answers.into(),
        }
    }
}

#[async_trait]
impl SyscallSink for VecSyscallSink {
    async fn syscall(&mut self, call: Syscall) -> SyscallResult {
        self.calls.push(call);
        self.answers.pop_front().unwrap_or(SyscallResult::Ok)
    }
}
