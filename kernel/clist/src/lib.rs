// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic kref/vref allocation and clist bookkeeping.
//!
//! A clist entry is a bijection between a kernel-space [`Kref`] and a
//! vat-space [`Vref`]. This crate owns the allocation policy (which number
//! and polarity a fresh vref gets) and the translate-or-allocate algorithm
//! used on both the export and import path; [`kernel_store::tables::clist`]
//! owns only the underlying storage.
use kernel_core::{DeviceKref, Kref, Polarity, VatId, Vref};
use kernel_store::{KVResult, KernelTx};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClistError {
    #[error("vref {0} is not recognized by vat {1}")]
    UnrecognizedVref(Vref, VatId),
    #[error("kref {0} is not known to vat {1}'s clist")]
    UnrecognizedKref(Kref, VatId),
}

fn kind_letter(kref: &Kref) -> char {
    match kref {
        Kref::Object(_) => 'o',
        Kref::Promise(_) => 'p',
        Kref::Device(_) => 'd',
    }
}

fn vref_of(kind: char, polarity: Polarity, n: u64) -> Vref {
    match kind {
        'o' => Vref::Object(polarity, n),
        'p' => Vref::Promise(polarity, n),
        'd' => Vref::Device(polarity, n),
        _ => unreachable!("kind_letter only produces o/p/d"),
    }
}

/// Translate a kref arriving in a delivery to `vat` into that vat's vref
/// space, allocating a fresh import vref (`-N`) the first time this kref
/// reaches the vat and bumping its object record's reachable/recognizable
/// counters to account for the new importer. Idempotent: a kref already
/// reachable in the clist just returns its existing vref; one that was
/// previously dropped and is now reimported has its reachable count
/// restored.
pub fn provide_vref_for_kref(tx: &mut KernelTx<'_>, vat: VatId, kref: Kref) -> KVResult<Vref> {
    if let Some(entry) = tx.clist_by_kref(vat, &kref)? {
        let vref: Vref = entry
            .vref
            .parse()
            .expect("clist only ever stores vrefs produced by this module");
        if !entry.reachable {
            kernel_gc::process_reimport(tx, vat, &kref)?;
        }
        return Ok(vref);
    }
    let kind = kind_letter(&kref);
    let n = tx.next_vref_number(vat, kind)?;
    let vref = vref_of(kind, Polarity::Import, n);
    tx.clist_add(vat, kref, vref.to_string())?;
    kernel_gc::process_new_import(tx, &kref)?;
    Ok(vref)
}

/// Translate a vref a vat just used in a syscall into a kref, allocating a
/// fresh kernel object the first time the vat exports a brand-new vref
/// (`+N`). Importing a vref the vat was never handed (an `-N` it doesn't
/// recognize) is a protocol error.
pub fn provide_kref_for_vref(tx: &mut KernelTx<'_>, vat: VatId, vref: Vref) -> Result<Kref, ClistError> {
    if let Some(kref) = tx
        .clist_by_vref(vat, &vref.to_string())
        .map_err(|_| ClistError::UnrecognizedVref(vref, vat))?
    {
        return Ok(kref);
    }
    match vref.polarity() {
        Polarity::Import => Err(ClistError::UnrecognizedVref(vref, vat)),
        Polarity::Export => {
            let kref = match vref {
                Vref::Object(_, _) => Kref::Object(
                    tx.next_object_kref()
                        .map_err(|_| ClistError::UnrecognizedVref(vref, vat))?,
                ),
                Vref::Promise(_, _) => Kref::Promise(
                    tx.next_promise_kref()
                        .map_err(|_| ClistError::UnrecognizedVref(vref, vat))?,
                ),
                Vref::Device(_, _) => {
                    // Devices are kernel-provided; a vat can never be the one
                    // minting a fresh device export.
                    return Err(ClistError::UnrecognizedVref(vref, vat));
                }
            };
            tx.init_object(kref, vat, vref.to_string())
                .map_err(|_| ClistError::UnrecognizedVref(vref, vat))?;
            tx.clist_add(vat, kref, vref.to_string())
                .map_err(|_| ClistError::UnrecognizedVref(vref, vat))?;
            Ok(kref)
        }
    }
}

/// Kernel-allocated device object, exported to `vat` under a fresh import vref.
pub fn provide_device_vref(tx: &mut KernelTx<'_>, vat: VatId, device: DeviceKref) -> KVResult<Vref> {
    provide_vref_for_kref(tx, vat, Kref::Device(device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::ObjectKref;
    use kernel_store::KernelStore;

    #[test]
    fn provide_vref_for_kref_is_idempotent() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let mut tx = store.begin().unwrap();
        let kref = Kref::Object(ObjectKref::new(5));
        tx.init_object(kref, VatId::new(99), "o+1".to_string()).unwrap();

        let v1 = provide_vref_for_kref(&mut tx, vat, kref).unwrap();
        let v2 = provide_vref_for_kref(&mut tx, vat, kref).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.polarity(), Polarity::Import);
        tx.commit().unwrap();
    }

    #[test]
    fn provide_kref_for_fresh_export_allocates_object() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let mut tx = store.begin().unwrap();
        let vref = Vref::Object(Polarity::Export, 1);
        let kref = provide_kref_for_vref(&mut tx, vat, vref).unwrap();
        assert!(matches!(kref, Kref::Object(_)));
        let again = provide_kref_for_vref(&mut tx, vat, vref).unwrap();
        assert_eq!(kref, again);
        tx.commit().unwrap();
    }

    #[test]
    fn unrecognized_import_vref_is_an_error() {
        let store = KernelStore::open_in_memory().unwrap();
        let vat = VatId::new(1);
        let mut tx = store.begin().unwrap();
        let vref = Vref::Object(Polarity::Import, 7);
        assert!(provide_kref_for_vref(&mut tx, vat, vref).is_err());
    }
}
