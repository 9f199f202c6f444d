// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Identifiers are short text tokens with a type prefix and a monotonic integer.
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("identifier {0:?} has an unrecognized prefix")]
    UnknownPrefix(String),
    #[error("identifier {0:?} is missing its numeric suffix")]
    MissingNumber(String),
    #[error("identifier {0:?} has a non-numeric suffix")]
    InvalidNumber(String),
}

macro_rules! kernel_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new(n: u64) -> Self {
                Self(n)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let rest = s
                    .strip_prefix(Self::PREFIX)
                    .ok_or_else(|| IdParseError::UnknownPrefix(s.to_owned()))?;
                if rest.is_empty() {
                    return Err(IdParseError::MissingNumber(s.to_owned()));
                }
                let n = rest
                    .parse::<u64>()
                    .map_err(|_| IdParseError::InvalidNumber(s.to_owned()))?;
                Ok(Self(n))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(de::Error::custom)
            }
        }
    };
}

// Kernel-space identifiers: opaque, scoped to the whole kernel.
kernel_id!(ObjectKref, "ko", "Kernel-space reference to a callable object");
kernel_id!(PromiseKref, "kp", "Kernel-space reference to a promise");
kernel_id!(DeviceKref, "kd", "Kernel-space reference to a built-in device");
kernel_id!(VatId, "v", "A compartment running user vat code");
kernel_id!(SubclusterId, "s", "A named group of vats launched together");
kernel_id!(RemotePeerId, "r", "A remote kernel reachable via the peer transport");

/// Any kernel-space reference a clist entry, a runqueue item, or a capdata slot can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kref {
    Object(ObjectKref),
    Promise(PromiseKref),
    Device(DeviceKref),
}

impl fmt::Display for Kref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kref::Object(k) => k.fmt(f),
            Kref::Promise(k) => k.fmt(f),
            Kref::Device(k) => k.fmt(f),
        }
    }
}

impl FromStr for Kref {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(k) = ObjectKref::from_str(s) {
            return Ok(Kref::Object(k));
        }
        if let Ok(k) = PromiseKref::from_str(s) {
            return Ok(Kref::Promise(k));
        }
        if let Ok(k) = DeviceKref::from_str(s) {
            return Ok(Kref::Device(k));
        }
        Err(IdParseError::UnknownPrefix(s.to_owned()))
    }
}

impl Serialize for Kref {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Kref {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Whether a vat-space identifier refers to something the vat exported to the
/// kernel, or something the kernel imported into the vat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Polarity {
    /// `o+<N>` / `p+<N>` / `d+<N>`: the vat is the exporter.
    Export,
    /// `o-<N>` / `p-<N>` / `d-<N>`: the vat is the importer.
    Import,
}

impl Polarity {
    fn sigil(self) -> char {
        match self {
            Polarity::Export => '+',
            Polarity::Import => '-',
        }
    }

    fn from_sigil(c: char) -> Option<Self> {
        match c {
            '+' => Some(Polarity::Export),
            '-' => Some(Polarity::Import),
            _ => None,
        }
    }
}

/// Vat-space identifiers, scoped to a single vat's clist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Vref {
    Object(Polarity, u64),
    Promise(Polarity, u64),
    Device(Polarity, u64),
}

impl Vref {
    fn kind_prefix(&self) -> char {
        match self {
            Vref::Object(..) => 'o',
            Vref::Promise(..) => 'p',
            Vref::Device(..) => 'd',
        }
    }

    fn parts(&self) -> (Polarity, u64) {
        match *self {
            Vref::Object(p, n) | Vref::Promise(p, n) | Vref::Device(p, n) => (p, n),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.parts().0
    }

    pub fn number(&self) -> u64 {
        self.parts().1
    }
}

impl fmt::Display for Vref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (polarity, n) = self.parts();
        write!(f, "{}{}{}", self.kind_prefix(), polarity.sigil(), n)
    }
}

impl FromStr for Vref {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = chars.next().ok_or_else(|| IdParseError::UnknownPrefix(s.to_owned()))?;
        let sigil = chars.next().ok_or_else(|| IdParseError::MissingNumber(s.to_owned()))?;
        let polarity =
            Polarity::from_sigil(sigil).ok_or_else(|| IdParseError::UnknownPrefix(s.to_owned()))?;
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(IdParseError::MissingNumber(s.to_owned()));
        }
        let n = rest
            .parse::<u64>()
            .map_err(|_| IdParseError::InvalidNumber(s.to_owned()))?;
        match kind {
            'o' => Ok(Vref::Object(polarity, n)),
            'p' => Ok(Vref::Promise(polarity, n)),
            'd' => Ok(Vref::Device(polarity, n)),
            _ => Err(IdParseError::UnknownPrefix(s.to_owned())),
        }
    }
}

impl Serialize for Vref {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Vref {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kref_roundtrips() {
        let k = ObjectKref::new(42);
        assert_eq!(k.to_string(), "ko42");
        assert_eq!(ObjectKref::from_str("ko42").unwrap(), k);
    }

    #[test]
    fn kref_dispatches_on_prefix() {
        assert_eq!(Kref::from_str("ko1").unwrap(), Kref::Object(ObjectKref::new(1)));
        assert_eq!(Kref::from_str("kp1").unwrap(), Kref::Promise(PromiseKref::new(1)));
        assert_eq!(Kref::from_str("kd1").unwrap(), Kref::Device(DeviceKref::new(1)));
        assert!(Kref::from_str("v1").is_err());
    }

    #[test]
    fn vref_roundtrips_all_kinds_and_polarities() {
        for s in ["o+3", "o-3", "p+3", "p-3", "d+3", "d-3"] {
            let v = Vref::from_str(s).unwrap();
            assert_eq!(v.to_string(), s);
        }
    }

    #[test]
    fn vref_rejects_garbage() {
        assert!(Vref::from_str("").is_err());
        assert!(Vref::from_str("o").is_err());
        assert!(Vref::from_str("x+3").is_err());
        assert!(Vref::from_str("o+").is_err());
        assert!(Vref::from_str("o+x").is_err());
    }

    #[test]
    fn ids_serialize_as_strings() {
        let v = VatId::new(7);
        let j = serde_json::to_string(&v).unwrap();
        assert_eq!(j, "\"v7\"");
        let back: VatId = serde_json::from_str(&j).unwrap();
        assert_eq!(back, v);
    }
}
