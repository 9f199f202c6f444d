// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Key-naming helpers for the flat `kv` table. Every table owns a distinct
// prefix so `iter_prefix` can enumerate it without touching the rest of the
// namespace.
use kernel_core::{Kref, VatId};

pub fn kref(kref: &Kref) -> String {
    kref.to_string()
}

pub fn vat_record(vat: VatId) -> String {
    format!("vat.{vat}")
}

pub fn vat_prefix() -> &'static str {
    "vat."
}

pub fn subcluster_record(id: &str) -> String {
    format!("subcluster.{id}")
}

pub fn subcluster_prefix() -> &'static str {
    "subcluster."
}

pub fn remote_record(peer: &str) -> String {
    format!("remote.{peer}")
}

pub fn remote_prefix() -> &'static str {
    "remote."
}

pub fn clist_c2v(vat: VatId, kref: &Kref) -> String {
    format!("v{vat}.clist.c2v.{kref}")
}

pub fn clist_v2c(vat: VatId, vref: &str) -> String {
    format!("v{vat}.clist.v2c.{vref}")
}

pub fn clist_prefix(vat: VatId) -> String {
    format!("v{vat}.clist.")
}

pub fn clist_c2v_prefix(vat: VatId) -> String {
    format!("v{vat}.clist.c2v.")
}

pub fn vatstore_entry(vat: VatId, user_key: &str) -> String {
    format!("v{vat}.vs.{user_key}")
}

pub fn vatstore_prefix(vat: VatId) -> String {
    format!("v{vat}.vs.")
}

pub fn runqueue_entry(seq: u64) -> String {
    format!("rq.{seq:020}")
}

pub fn runqueue_prefix() -> &'static str {
    "rq."
}

pub fn acceptance_entry(seq: u64) -> String {
    format!("accept.{seq:020}")
}

pub fn acceptance_prefix() -> &'static str {
    "accept."
}

pub fn gc_action(vat: VatId, kind: &str, kref: &Kref) -> String {
    format!("gc.{vat}.{kind}.{kref}")
}

pub fn gc_prefix() -> &'static str {
    "gc."
}

pub fn counter(name: &str) -> String {
    format!("counter.{name}")
}

pub const INCARNATION: &str = "incarnation";

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::ObjectKref;

    #[test]
    fn clist_keys_are_disjoint_per_direction() {
        let vat = VatId::new(3);
        let k = Kref::Object(ObjectKref::new(5));
        assert_ne!(clist_c2v(vat, &k), clist_v2c(vat, "o+1"));
        assert!(clist_c2v(vat, &k).starts_with(&clist_prefix(vat)));
    }

    #[test]
    fn runqueue_keys_sort_numerically_as_strings() {
        let a = runqueue_entry(2);
        let b = runqueue_entry(10);
        assert!(a < b, "zero-padding must keep lexicographic order numeric");
    }
}
