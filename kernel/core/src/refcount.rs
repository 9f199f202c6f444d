// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

/// Every clist import/export of a kref adjusts one or both of these counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefCountTag {
    /// Decrements when a vat issues `dropImports`; does not imply the kref is forgotten.
    Reachable,
    /// Decrements only when the last vat stops recognizing the kref; implies `Reachable`.
    Recognizable,
}
