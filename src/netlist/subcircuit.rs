// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A `SubCircuit` is an instance of one [`Circuit`] inside another.

use crate::transform::Transform;
use super::circuit::Circuit;
use super::net::{Net, NetSubcircuitPinRef};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// An instance of a [`Circuit`] (the "referenced circuit") placed inside another circuit
/// (the "parent circuit").
///
/// Like [`Device`](super::device::Device), a subcircuit's id is a monotonic counter scoped
/// to its parent circuit, not the process-wide id service.
pub struct SubCircuit {
    pub(super) id: u64,
    name: RefCell<Option<String>>,
    pub(super) parent_circuit: Weak<Circuit>,
    circuit_ref: RefCell<Weak<Circuit>>,
    transform: Cell<Transform>,
    pub(super) pin_refs: RefCell<Vec<Option<Rc<NetSubcircuitPinRef>>>>,
}

impl SubCircuit {
    pub(super) fn new(id: u64, name: Option<String>, parent_circuit: Weak<Circuit>, circuit_ref: &Rc<Circuit>) -> Self {
        let num_pins = circuit_ref.num_pins();
        SubCircuit {
            id,
            name: RefCell::new(name),
            parent_circuit,
            circuit_ref: RefCell::new(Rc::downgrade(circuit_ref)),
            transform: Cell::new(Transform::identity()),
            pin_refs: RefCell::new(vec![None; num_pins]),
        }
    }

    /// The per-circuit monotonic instance id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The subcircuit's name, if any.
    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    /// Sets the subcircuit's name.
    pub fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    /// Name if set, else `"$<id>"`.
    pub fn expanded_name(&self) -> String {
        self.name().unwrap_or_else(|| format!("${}", self.id))
    }

    /// The circuit this instance lives in.
    pub fn parent_circuit(&self) -> Weak<Circuit> {
        self.parent_circuit.clone()
    }

    /// The circuit this is an instance of.
    pub fn circuit_ref(&self) -> Weak<Circuit> {
        self.circuit_ref.borrow().clone()
    }

    /// The subcircuit's placement transform in micrometres.
    pub fn transform(&self) -> Transform {
        self.transform.get()
    }

    /// Sets the subcircuit's placement transform.
    pub fn set_transform(&self, transform: Transform) {
        self.transform.set(transform);
    }

    /// The net connected to the given pin (in the referenced circuit's pin-id space), if any.
    pub fn net_for_pin(&self, pin_id: usize) -> Option<Rc<Net>> {
        self.pin_refs.borrow().get(pin_id).and_then(|r| r.as_ref()).and_then(|r| r.net().upgrade())
    }

    /// Connects (or disconnects, with `net = None`) the given pin (in the referenced
    /// circuit's pin-id space) to a net of the parent circuit. Returns the previously
    /// connected net.
    ///
    /// # Panics
    /// Panics if `pin_id` is out of range, or if `net` does not live in the parent circuit.
    pub fn connect_pin(self: &Rc<SubCircuit>, pin_id: usize, net: Option<&Rc<Net>>) -> Option<Rc<Net>> {
        if let Some(net) = net {
            assert!(
                net.parent_circuit().ptr_eq(&self.parent_circuit),
                "net does not live in this subcircuit's parent circuit"
            );
        }
        let old = {
            let mut refs = self.pin_refs.borrow_mut();
            assert!(pin_id < refs.len(), "pin id out of range");
            refs[pin_id].take()
        };
        if let Some(old_ref) = &old {
            if let Some(old_net) = old_ref.net().upgrade() {
                old_net.remove_subcircuit_pin_ref(old_ref);
            }
        }
        if let Some(net) = net {
            let r = NetSubcircuitPinRef::new(net, self, pin_id);
            net.add_subcircuit_pin_ref(r.clone());
            self.pin_refs.borrow_mut()[pin_id] = Some(r);
        }
        old.and_then(|r| r.net().upgrade())
    }

    /// Disconnects every pin from its net. Called when this instance is being destroyed.
    pub(super) fn disconnect_all_pins(&self) {
        let n = self.pin_refs.borrow().len();
        for id in 0..n {
            let old = self.pin_refs.borrow_mut()[id].take();
            if let Some(old_ref) = old {
                if let Some(old_net) = old_ref.net().upgrade() {
                    old_net.remove_subcircuit_pin_ref(&old_ref);
                }
            }
        }
    }

    /// Disconnects `pin_id` from its net and removes its slot entirely, shifting every
    /// pin above it down by one. Used by [`Circuit::join_pins`](super::circuit::Circuit::join_pins)
    /// when the referenced circuit's pin count shrinks.
    pub(super) fn erase_pin(&self, pin_id: usize) {
        let removed = self.pin_refs.borrow_mut().remove(pin_id);
        if let Some(old_ref) = removed {
            if let Some(old_net) = old_ref.net().upgrade() {
                old_net.remove_subcircuit_pin_ref(&old_ref);
            }
        }
        let refs = self.pin_refs.borrow();
        for r in refs[pin_id..].iter().flatten() {
            r.set_pin_id(r.pin_id() - 1);
        }
    }

    /// Number of pins (parallel to the referenced circuit's pin list).
    pub fn num_pins(&self) -> usize {
        self.pin_refs.borrow().len()
    }
}

impl fmt::Debug for SubCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubCircuit").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for SubCircuit {}

impl PartialEq for SubCircuit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.parent_circuit.ptr_eq(&other.parent_circuit)
    }
}

impl Hash for SubCircuit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
