// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Arbitrary-data generators for kernel-space identifiers, dual-implemented
//! against `quickcheck::Arbitrary` and `arbitrary::Arbitrary` the way
//! `fendermint_testing::arb` does for its chain identifiers.
use kernel_core::{DeviceKref, Kref, ObjectKref, PromiseKref, RefCountTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbKref(pub Kref);

fn kref_from_parts(kind: u8, n: u64) -> Kref {
    match kind % 3 {
        0 => Kref::Object(ObjectKref::new(n)),
        1 => Kref::Promise(PromiseKref::new(n)),
        _ => Kref::Device(DeviceKref::new(n)),
    }
}

impl quickcheck::Arbitrary for ArbKref {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        ArbKref(kref_from_parts(u8::arbitrary(g), u64::arbitrary(g) % 64))
    }
}

impl<'a> arbitrary::Arbitrary<'a> for ArbKref {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let n = u64::arbitrary(u)? % 64;
        Ok(ArbKref(kref_from_parts(u8::arbitrary(u)?, n)))
    }
}

/// Either refcount tag, for property tests that drive random increment/decrement
/// sequences against an object record.
#[derive(Debug, Clone, Copy)]
pub struct ArbRefCountTag(pub RefCountTag);

impl quickcheck::Arbitrary for ArbRefCountTag {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let tag = if bool::arbitrary(g) {
            RefCountTag::Reachable
        } else {
            RefCountTag::Recognizable
        };
        ArbRefCountTag(tag)
    }
}
