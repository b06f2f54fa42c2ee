// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `prelude` helps to import the most commonly used items.

pub use crate::compare::prelude::*;
pub use crate::error::{NetlistError, Result};
pub use crate::id::Id;
pub use crate::netlist::prelude::*;
pub use crate::transform::{Polygon, Transform};
