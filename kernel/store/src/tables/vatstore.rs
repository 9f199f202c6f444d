// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Per-vat opaque key/value scratch space backing the vatstoreGet/Set/Delete
// syscalls. Values are opaque strings the vat controls; the kernel never
// interprets them.
use kernel_core::VatId;

use crate::error::KVResult;
use crate::keys;
use crate::kv::{StoreRead, StoreWrite};

pub fn get(tx: &impl StoreRead, vat: VatId, user_key: &str) -> KVResult<Option<String>> {
    match tx.get(&keys::vatstore_entry(vat, user_key))? {
        Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        None => Ok(None),
    }
}

pub fn set(tx: &mut impl StoreWrite, vat: VatId, user_key: &str, value: &str) -> KVResult<()> {
    tx.set(&keys::vatstore_entry(vat, user_key), value.as_bytes())
}

pub fn delete(tx: &mut impl StoreWrite, vat: VatId, user_key: &str) -> KVResult<()> {
    tx.delete(&keys::vatstore_entry(vat, user_key))
}

/// Drop every entry belonging to `vat`, used when the vat is terminated.
pub fn clear_vat(tx: &mut impl StoreWrite, vat: VatId) -> KVResult<()> {
    let keys_to_delete: Vec<String> = tx
        .iter_prefix(&keys::vatstore_prefix(vat))?
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    for key in keys_to_delete {
        tx.delete(&key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn set_get_delete_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let mut tx = store.begin_write().unwrap();
        set(&mut tx, vat, "counter", "1").unwrap();
        assert_eq!(get(&tx, vat, "counter").unwrap(), Some("1".to_string()));

        clear_vat(&mut tx, vat).unwrap();
        assert_eq!(get(&tx, vat, "counter").unwrap(), None);
        tx.commit().unwrap();
    }
}
