// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// A WASM-sandboxed vat supervisor.
//
// Each vat bundle is a `wasmtime` module exporting `alloc`, `dealloc`, and
// `kernel_deliver`, and importing one host function, `kernel_syscall`. Every
// payload crossing the boundary is JSON, packed as a guest-owned
// (ptr, len) byte range; the host frees what it reads, the guest frees what
// it's handed back. There is no shared type system across the boundary on
// purpose -- the point of a bundle is that the kernel never has to trust, or
// even know, what language compiled it.
use async_trait::async_trait;
use kernel_core::VatId;
use kernel_message::{Delivery, DeliveryResult, Syscall, SyscallResult};
use thiserror::Error;
use wasmtime::{Caller, Config, Engine, Linker, Memory, Module, Store, TypedFunc};

use crate::sink::SyscallSink;
use crate::VatSupervisor;

#[derive(Debug, Error)]
pub enum WasmSupervisorError {
    #[error("failed to compile vat bundle: {0}")]
    Compile(String),
    #[error("failed to instantiate vat bundle: {0}")]
    Instantiate(String),
    #[error("vat bundle is missing required export `{0}`")]
    MissingExport(&'static str),
    #[error("vat bundle trapped: {0}")]
    Trap(String),
    #[error("malformed JSON crossing the sandbox boundary: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Host state threaded through every wasmtime call. `syscalls` is only ever
/// `Some` for the lifetime of one `deliver` call; the guest has no way to
/// retain it past that window since the pointer is cleared before `deliver`
/// returns.
struct HostState {
    #[allow(dead_code)]
    vat: VatId,
    syscalls: Option<*mut dyn SyscallSink>,
}

// The raw pointer never outlives the single-threaded `deliver` call that set
// it, and wasmtime does not move `Store` data across threads under us.
unsafe impl Send for HostState {}

pub struct WasmSupervisor {
    store: Store<HostState>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    dealloc: TypedFunc<(i32, i32), ()>,
    deliver_export: TypedFunc<(i32, i32), i64>,
}

impl WasmSupervisor {
    /// Compile and instantiate a vat bundle from raw WASM bytes.
    pub fn load(vat: VatId, bundle: &[u8]) -> Result<Self, WasmSupervisorError> {
        let config = Config::new();
        let engine = Engine::new(&config).map_err(|e| WasmSupervisorError::Compile(e.to_string()))?;
        let module =
            Module::new(&engine, bundle).map_err(|e| WasmSupervisorError::Compile(e.to_string()))?;

        let mut linker: Linker<HostState> = Linker::new(&engine);
        linker
            .func_wrap("env", "kernel_syscall", host_syscall)
            .map_err(|e| WasmSupervisorError::Instantiate(e.to_string()))?;

        let mut store = Store::new(&engine, HostState { vat, syscalls: None });
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| WasmSupervisorError::Instantiate(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(WasmSupervisorError::MissingExport("memory"))?;
        let alloc = instance
            .get_typed_func(&mut store, "alloc")
            .map_err(|_| WasmSupervisorError::MissingExport("alloc"))?;
        let dealloc = instance
            .get_typed_func(&mut store, "dealloc")
            .map_err(|_| WasmSupervisorError::MissingExport("dealloc"))?;
        let deliver_export = instance
            .get_typed_func(&mut store, "kernel_deliver")
            .map_err(|_| WasmSupervisorError::MissingExport("kernel_deliver"))?;

        Ok(Self {
            store,
            memory,
            alloc,
            dealloc,
            deliver_export,
        })
    }

    fn write_json(&mut self, value: &impl serde::Serialize) -> Result<(i32, i32), WasmSupervisorError> {
        let bytes = serde_json::to_vec(value)?;
        let len = bytes.len() as i32;
        let ptr = self
            .alloc
            .call(&mut self.store, len)
            .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
        self.memory
            .write(&mut self.store, ptr as usize, &bytes)
            .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
        Ok((ptr, len))
    }

    fn read_and_free_json<T: serde::de::DeserializeOwned>(
        &mut self,
        packed: i64,
    ) -> Result<T, WasmSupervisorError> {
        let ptr = (packed >> 32) as i32;
        let len = (packed & 0xffff_ffff) as i32;
        let mut bytes = vec![0u8; len as usize];
        self.memory
            .read(&self.store, ptr as usize, &mut bytes)
            .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
        self.dealloc
            .call(&mut self.store, (ptr, len))
            .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The guest's one import: hand a JSON-encoded `Syscall` to the kernel and
/// get back a packed `(ptr, len)` pointing at a JSON-encoded `SyscallResult`
/// the guest is responsible for freeing. Anything that goes wrong here
/// answers with a generic kernel-side error rather than trapping the guest,
/// since a malformed syscall is the vat's problem, not the sandbox's.
fn host_syscall(mut caller: Caller<'_, HostState>, ptr: i32, len: i32) -> i64 {
    let outcome = decode_and_dispatch_syscall(&mut caller, ptr, len)
        .unwrap_or_else(|e| SyscallResult::Error(e.to_string()));
    encode_syscall_result(&mut caller, &outcome).unwrap_or(0)
}

fn decode_and_dispatch_syscall(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> Result<SyscallResult, WasmSupervisorError> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or(WasmSupervisorError::MissingExport("memory"))?;
    let mut bytes = vec![0u8; len as usize];
    memory
        .read(&caller, ptr as usize, &mut bytes)
        .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
    let call: Syscall = serde_json::from_slice(&bytes)?;

    let sink_ptr = caller
        .data()
        .syscalls
        .ok_or_else(|| WasmSupervisorError::Trap("syscall issued outside a delivery".to_string()))?;
    // SAFETY: `sink_ptr` is only `Some` for the duration of the `deliver` call
    // that owns the referent, and `host_syscall` only ever runs synchronously
    // on that same call stack.
    let sink: &mut dyn SyscallSink = unsafe { &mut *sink_ptr };
    let answer = tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(sink.syscall(call))
    });
    Ok(answer)
}

fn encode_syscall_result(
    caller: &mut Caller<'_, HostState>,
    answer: &SyscallResult,
) -> Result<i64, WasmSupervisorError> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or(WasmSupervisorError::MissingExport("memory"))?;
    let alloc = caller
        .get_export("alloc")
        .and_then(|e| e.into_func())
        .ok_or(WasmSupervisorError::MissingExport("alloc"))?
        .typed::<i32, i32>(&caller)
        .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;

    let bytes = serde_json::to_vec(answer)?;
    let out_len = bytes.len() as i32;
    let out_ptr = alloc
        .call(&mut *caller, out_len)
        .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
    memory
        .write(&mut *caller, out_ptr as usize, &bytes)
        .map_err(|e| WasmSupervisorError::Trap(e.to_string()))?;
    Ok(((out_ptr as i64) << 32) | (out_len as i64 & 0xffff_ffff))
}

#[async_trait]
impl VatSupervisor for WasmSupervisor {
    async fn deliver(
        &mut self,
        _vat: VatId,
        delivery: Delivery,
        syscalls: &mut dyn SyscallSink,
    ) -> anyhow::Result<DeliveryResult> {
        let (ptr, len) = self.write_json(&delivery)?;

        self.store.data_mut().syscalls = Some(syscalls as *mut dyn SyscallSink);
        let packed = self.deliver_export.call(&mut self.store, (ptr, len));
        self.store.data_mut().syscalls = None;

        let packed = packed.map_err(|trap| WasmSupervisorError::Trap(trap.to_string()))?;
        Ok(self.read_and_free_json(packed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_malformed_bundle() {
        let err = WasmSupervisor::load(VatId::new(1), b"not a wasm module").unwrap_err();
        assert!(matches!(err, WasmSupervisorError::Compile(_)));
    }
}
