// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structural error type shared by the netlist data model.
//!
//! Comparison-engine internals do *not* use this type: the matcher signals backtracking
//! failure with a plain sentinel (see `compare::matcher`), never an exception, since that
//! path is hot and a `Result` there would cost more than it buys.

use thiserror::Error;

/// Errors raised by the public netlist data-model API.
#[derive(Error, Debug)]
pub enum NetlistError {
    /// `add_*` was called with an object that already belongs to some circuit.
    #[error("object `{0}` is already owned by a circuit")]
    AlreadyOwned(String),
    /// `remove_*` was called with an object that does not belong to the given circuit.
    #[error("object `{0}` is not owned by this circuit")]
    NotOwned(String),
    /// Lookup or rename referenced an id that does not exist.
    #[error("no object with id `{0}` exists")]
    InvalidId(String),
    /// Lookup or rename referenced a name that does not exist, or a rename collided
    /// with an existing name.
    #[error("invalid or conflicting name `{0}`")]
    InvalidName(String),
    /// An internal integrity check failed. This should never happen through ordinary
    /// public-API use; callers should treat it as fatal rather than attempt recovery.
    #[error("internal consistency check failed: {0}")]
    Internal(String),
}

/// Convenience alias for results of the netlist data-model API.
pub type Result<T> = std::result::Result<T, NetlistError>;
