/*
 * Copyright (c) 2020-2020 Thomas Kramer.
 *
 * This file is part of LibrEDA
 * (see https://codeberg.org/libreda).
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */
//! This crate is a database for hierarchical, transistor-level netlists: circuits, nets,
//! pins, devices and subcircuit instances, together with a netlist comparison engine that
//! decides whether two netlists describe the same circuit topology up to device and
//! terminal equivalences (the kind of check commonly called LVS, "layout versus schematic").

#![deny(missing_docs)]

// Public modules.
pub mod prelude;
pub mod netlist;
pub mod compare;
pub mod transaction;
pub mod error;
pub mod id;
pub mod transform;
