// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk store fixtures, for tests that care about a real sqlite file
//! rather than the in-memory backend (reopening across a simulated restart,
//! inspecting the file with `execute_db_query`).
use std::path::PathBuf;

use kernel_store::KernelStore;

pub struct TempStore {
    pub store: KernelStore,
    dir: tempfile::TempDir,
}

impl TempStore {
    pub fn open() -> Self {
        let dir = tempfile::tempdir().expect("creating temp dir for kernel store fixture");
        let store = KernelStore::open(db_path(&dir)).expect("opening kernel store fixture");
        Self { store, dir }
    }

    pub fn path(&self) -> PathBuf {
        db_path(&self.dir)
    }
}

fn db_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("kernel.sqlite3")
}
