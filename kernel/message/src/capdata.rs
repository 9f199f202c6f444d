// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Capdata wire format: `{ body: string, slots: kref[] }`, where `body` is a
// text encoding of the argument graph with slot placeholders referring by index into
// `slots`. Grounded on `fendermint_vm_message`'s pattern of a plain serde-derived
// message type plus a small hand-written codec module (`encoding.rs`) around it.
use std::collections::BTreeMap;

use kernel_core::Kref;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The argument graph embedded in a capdata body. Round-trips primitives, arrays,
/// plain records, tagged values (errors, bigints, symbols-by-name) and slot
/// references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision integer, carried as a decimal string since `f64` would
    /// lose precision.
    BigInt(String),
    String(String),
    /// A symbol referenced by its name; kernel code never interprets the name.
    Symbol(String),
    Array(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// An index into the enclosing [`CapData::slots`].
    Slot(usize),
    /// A thrown error, marshaled by name and message only.
    Error { name: String, message: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum CapDataError {
    #[error("failed to encode capdata body: {0}")]
    Encode(String),
    #[error("failed to decode capdata body: {0}")]
    Decode(String),
    #[error("slot index {0} out of range (have {1} slots)")]
    SlotOutOfRange(usize, usize),
}

/// `{ body, slots }` as carried over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapData {
    pub body: String,
    pub slots: Vec<Kref>,
}

impl CapData {
    /// Encode a value graph with no slot references.
    pub fn encode(value: &Value) -> Result<Self, CapDataError> {
        let body = serde_json::to_string(value).map_err(|e| CapDataError::Encode(e.to_string()))?;
        Ok(CapData {
            body,
            slots: Vec::new(),
        })
    }

    /// Decode the body back into a value graph, without resolving slot indices.
    pub fn decode_value(&self) -> Result<Value, CapDataError> {
        serde_json::from_str(&self.body).map_err(|e| CapDataError::Decode(e.to_string()))
    }

    /// Resolve a `Value::Slot(i)` against this capdata's slot list.
    pub fn resolve_slot(&self, index: usize) -> Result<Kref, CapDataError> {
        self.slots
            .get(index)
            .copied()
            .ok_or(CapDataError::SlotOutOfRange(index, self.slots.len()))
    }

    /// All krefs this capdata carries a reference to. Every occurrence bumps the
    /// `reachable` refcount of the corresponding kref.
    pub fn referenced_krefs(&self) -> &[Kref] {
        &self.slots
    }
}

/// Builds a [`Value`] tree while interning [`Kref`]s into [`CapData::slots`], so
/// callers never have to manage slot indices by hand.
#[derive(Default)]
pub struct CapDataBuilder {
    slots: Vec<Kref>,
}

impl CapDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a kref, returning a `Value::Slot` placeholder for it. Interning the
    /// same kref twice reuses the earlier slot index.
    pub fn slot(&mut self, kref: Kref) -> Value {
        let index = match self.slots.iter().position(|k| *k == kref) {
            Some(i) => i,
            None => {
                self.slots.push(kref);
                self.slots.len() - 1
            }
        };
        Value::Slot(index)
    }

    pub fn finish(self, body: Value) -> Result<CapData, CapDataError> {
        let body = serde_json::to_string(&body).map_err(|e| CapDataError::Encode(e.to_string()))?;
        Ok(CapData {
            body,
            slots: self.slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::ObjectKref;

    #[test]
    fn round_trips_primitives_and_records() {
        let mut rec = BTreeMap::new();
        rec.insert("a".to_string(), Value::Number(1.0));
        rec.insert("b".to_string(), Value::Bool(true));
        let value = Value::Array(vec![Value::Null, Value::Record(rec), Value::Undefined]);

        let cd = CapData::encode(&value).unwrap();
        assert_eq!(cd.decode_value().unwrap(), value);
    }

    #[test]
    fn round_trips_tagged_values() {
        let value = Value::Array(vec![
            Value::BigInt("123456789012345678901234567890".to_string()),
            Value::Symbol("Symbol.iterator".to_string()),
            Value::Error {
                name: "TypeError".to_string(),
                message: "boom".to_string(),
            },
        ]);
        let cd = CapData::encode(&value).unwrap();
        assert_eq!(cd.decode_value().unwrap(), value);
    }

    #[test]
    fn builder_interns_slots_and_dedupes() {
        let k1 = Kref::Object(ObjectKref::new(1));
        let k2 = Kref::Object(ObjectKref::new(2));
        let mut b = CapDataBuilder::new();
        let s1 = b.slot(k1);
        let s2 = b.slot(k2);
        let s1_again = b.slot(k1);

        let cd = b
            .finish(Value::Array(vec![s1, s2, s1_again]))
            .unwrap();

        assert_eq!(cd.slots, vec![k1, k2]);
        assert_eq!(cd.resolve_slot(0).unwrap(), k1);
        assert_eq!(cd.resolve_slot(1).unwrap(), k2);
        assert!(cd.resolve_slot(2).is_err());
    }
}
