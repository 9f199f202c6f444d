// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Wire framing for the kernel<->worker duplex stream: one JSON object per
// line, tagged with the label of the delivery it belongs to. A worker may
// interleave any number of syscalls into a delivery before sending its
// final result for that label.
use kernel_message::{Delivery, DeliveryResult, Syscall, SyscallResult};
use serde::{Deserialize, Serialize};

/// Kernel -> worker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ToChild {
    Deliver { label: u64, delivery: Delivery },
    SyscallAnswer { label: u64, answer: SyscallResult },
}

/// Worker -> kernel.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FromChild {
    Syscall { label: u64, call: Syscall },
    Result { label: u64, result: DeliveryResult },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_worker_line_with_no_matching_label_variant_tag_is_distinguishable() {
        let syscall = FromChild::Syscall {
            label: 7,
            call: Syscall::Exit { failure: None },
        };
        let result = FromChild::Result {
            label: 7,
            result: DeliveryResult::Ok,
        };
        let syscall_json: serde_json::Value = serde_json::to_value(&syscall).unwrap();
        let result_json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(syscall_json["kind"], "Syscall");
        assert_eq!(result_json["kind"], "Result");
        assert_eq!(syscall_json["label"], result_json["label"]);
    }
}
