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
//! A `Pin` is a connection point on the boundary of a circuit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A connection point on the boundary of a circuit.
///
/// Pin ids are dense 0-based indices into the owning circuit's pin list. `remove_pin`
/// leaves a hole (the slot becomes unoccupied) until `join_pins` closes the gap and
/// renumbers the pins that shifted down.
pub struct Pin {
    id: Cell<usize>,
    name: RefCell<String>,
}

impl Pin {
    pub(super) fn new(id: usize, name: String) -> Self {
        Pin { id: Cell::new(id), name: RefCell::new(name) }
    }

    /// The dense 0-based id of this pin within its circuit.
    pub fn id(&self) -> usize {
        self.id.get()
    }

    pub(super) fn set_id(&self, id: usize) {
        self.id.set(id);
    }

    /// The pin's name.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(super) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }
}

impl Eq for Pin {}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Hash for Pin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin").field("id", &self.id()).field("name", &self.name()).finish()
    }
}
