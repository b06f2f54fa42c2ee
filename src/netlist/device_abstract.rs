// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A `DeviceAbstract` links a device type to an opaque layout cell and, per terminal, to a
//! layout-extraction cluster id.

use crate::id::Id;
use super::device_class::DeviceClass;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Geometry-side counterpart of a [`DeviceClass`](super::device_class::DeviceClass): ties
/// device terminals to layout clusters for a specific cell.
pub struct DeviceAbstract {
    id: Id<DeviceAbstract>,
    name: RefCell<Option<String>>,
    device_class: Weak<DeviceClass>,
    cell_index: RefCell<Option<usize>>,
    terminal_cluster_ids: RefCell<Vec<u64>>,
}

impl DeviceAbstract {
    /// Creates a new device abstract for the given device class.
    pub fn new(device_class: &Rc<DeviceClass>, name: Option<String>) -> Rc<Self> {
        let num_terminals = device_class.num_terminals();
        Rc::new(DeviceAbstract {
            id: Id::new(),
            name: RefCell::new(name),
            device_class: Rc::downgrade(device_class),
            cell_index: RefCell::new(None),
            terminal_cluster_ids: RefCell::new(vec![0; num_terminals]),
        })
    }

    /// The abstract's unique id.
    pub fn id(&self) -> Id<DeviceAbstract> {
        self.id
    }

    /// The abstract's name, if any.
    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    /// Renames the abstract.
    pub fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    /// The device class this abstract belongs to.
    pub fn device_class(&self) -> Weak<DeviceClass> {
        self.device_class.clone()
    }

    /// The opaque layout cell index this abstract links to, if assigned.
    pub fn cell_index(&self) -> Option<usize> {
        *self.cell_index.borrow()
    }

    /// Sets the opaque layout cell index.
    pub fn set_cell_index(&self, cell_index: Option<usize>) {
        *self.cell_index.borrow_mut() = cell_index;
    }

    /// The layout-extraction cluster id for the given terminal.
    pub fn terminal_cluster_id(&self, terminal_id: usize) -> u64 {
        self.terminal_cluster_ids.borrow().get(terminal_id).copied().unwrap_or(0)
    }

    /// Sets the layout-extraction cluster id for the given terminal.
    pub fn set_terminal_cluster_id(&self, terminal_id: usize, cluster_id: u64) {
        let mut ids = self.terminal_cluster_ids.borrow_mut();
        if terminal_id >= ids.len() {
            ids.resize(terminal_id + 1, 0);
        }
        ids[terminal_id] = cluster_id;
    }
}

impl fmt::Debug for DeviceAbstract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAbstract").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for DeviceAbstract {}

impl PartialEq for DeviceAbstract {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
