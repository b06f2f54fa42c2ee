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
//! A net represents an electric potential: an equivalence class of device terminals,
//! outgoing pins and subcircuit pins that must all be at the same potential.

use crate::id::Id;
use super::circuit::Circuit;
use super::device::Device;
use super::subcircuit::SubCircuit;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// A single electrical node inside a [`Circuit`].
///
/// Nets own three flavors of cross-reference: to device terminals ([`NetTerminalRef`]),
/// to outgoing pins of the containing circuit ([`NetPinRef`]), and to pins of subcircuit
/// instances that connect here ([`NetSubcircuitPinRef`]). Each reference object is shared
/// (via `Rc`) with the peer side (a device's per-terminal slot, a circuit's per-pin cache,
/// a subcircuit's per-pin table), so both endpoints are always addressable from the other.
pub struct Net {
    pub(super) id: Id<Net>,
    name: RefCell<Option<String>>,
    cluster_id: RefCell<u64>,
    pub(super) parent_circuit: Weak<Circuit>,
    pub(super) terminal_refs: RefCell<Vec<Rc<NetTerminalRef>>>,
    pub(super) pin_refs: RefCell<Vec<Rc<NetPinRef>>>,
    pub(super) subcircuit_pin_refs: RefCell<Vec<Rc<NetSubcircuitPinRef>>>,
}

impl Net {
    pub(super) fn new(id: Id<Net>, name: Option<String>, parent_circuit: Weak<Circuit>) -> Self {
        Net {
            id,
            name: RefCell::new(name),
            cluster_id: RefCell::new(0),
            parent_circuit,
            terminal_refs: Default::default(),
            pin_refs: Default::default(),
            subcircuit_pin_refs: Default::default(),
        }
    }

    /// The net's unique id.
    pub fn id(&self) -> Id<Net> {
        self.id
    }

    /// The net's name, if any was given.
    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub(super) fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    /// The layout-extraction cluster id linked to this net.
    pub fn cluster_id(&self) -> u64 {
        *self.cluster_id.borrow()
    }

    /// Sets the layout-extraction cluster id linked to this net.
    pub fn set_cluster_id(&self, cluster_id: u64) {
        *self.cluster_id.borrow_mut() = cluster_id;
    }

    /// The name if set, else a derived name from the cluster id: `"$<cluster_id>"`, or,
    /// for cluster ids in the upper half of the 64-bit range, the compact form `"$I<n>"`
    /// with `n = u64::MAX - cluster_id + 1`.
    pub fn expanded_name(&self) -> String {
        if let Some(name) = self.name() {
            return name;
        }
        let cid = self.cluster_id();
        if cid >= u64::MAX / 2 {
            format!("$I{}", u64::MAX - cid + 1)
        } else {
            format!("${}", cid)
        }
    }

    /// `"<circuit-name>:<expanded-name>"` if the net lives in a circuit, else just the
    /// expanded name.
    pub fn qname(&self) -> String {
        match self.parent_circuit.upgrade() {
            Some(c) => format!("{}:{}", c.name(), self.expanded_name()),
            None => self.expanded_name(),
        }
    }

    /// The circuit this net lives in.
    pub fn parent_circuit(&self) -> Weak<Circuit> {
        self.parent_circuit.clone()
    }

    /// The device-terminal references attached to this net.
    pub fn terminal_refs(&self) -> Vec<Rc<NetTerminalRef>> {
        self.terminal_refs.borrow().clone()
    }

    /// The outgoing-pin references attached to this net.
    pub fn pin_refs(&self) -> Vec<Rc<NetPinRef>> {
        self.pin_refs.borrow().clone()
    }

    /// The subcircuit-pin references attached to this net.
    pub fn subcircuit_pin_refs(&self) -> Vec<Rc<NetSubcircuitPinRef>> {
        self.subcircuit_pin_refs.borrow().clone()
    }

    /// Number of device-terminal references.
    pub fn num_terminals(&self) -> usize {
        self.terminal_refs.borrow().len()
    }

    /// Number of outgoing-pin references.
    pub fn num_pins(&self) -> usize {
        self.pin_refs.borrow().len()
    }

    /// Number of subcircuit-pin references.
    pub fn num_subcircuit_pins(&self) -> usize {
        self.subcircuit_pin_refs.borrow().len()
    }

    /// A net is passive if it has no device terminals and no subcircuit pins attached
    /// (it may still carry outgoing pin references).
    pub fn is_passive(&self) -> bool {
        self.num_terminals() == 0 && self.num_subcircuit_pins() == 0
    }

    /// A net is floating if it has no references at all.
    pub fn is_floating(&self) -> bool {
        self.is_passive() && self.num_pins() == 0
    }

    pub(super) fn add_terminal_ref(&self, r: Rc<NetTerminalRef>) {
        self.terminal_refs.borrow_mut().push(r);
    }

    pub(super) fn add_pin_ref(&self, r: Rc<NetPinRef>) {
        self.pin_refs.borrow_mut().push(r);
    }

    pub(super) fn add_subcircuit_pin_ref(&self, r: Rc<NetSubcircuitPinRef>) {
        self.subcircuit_pin_refs.borrow_mut().push(r);
    }

    pub(super) fn remove_terminal_ref(&self, r: &Rc<NetTerminalRef>) {
        self.terminal_refs.borrow_mut().retain(|x| !Rc::ptr_eq(x, r));
    }

    pub(super) fn remove_pin_ref(&self, r: &Rc<NetPinRef>) {
        self.pin_refs.borrow_mut().retain(|x| !Rc::ptr_eq(x, r));
    }

    pub(super) fn remove_subcircuit_pin_ref(&self, r: &Rc<NetSubcircuitPinRef>) {
        self.subcircuit_pin_refs.borrow_mut().retain(|x| !Rc::ptr_eq(x, r));
    }

    /// Moves every reference (terminal, pin, subcircuit-pin) from `other` onto `self`,
    /// re-pointing each reference's owning-net back-link. `other` is left empty.
    pub(super) fn absorb(self: &Rc<Net>, other: &Rc<Net>) {
        for r in other.terminal_refs.borrow_mut().drain(..) {
            *r.net.borrow_mut() = Rc::downgrade(self);
            self.terminal_refs.borrow_mut().push(r);
        }
        for r in other.pin_refs.borrow_mut().drain(..) {
            *r.net.borrow_mut() = Rc::downgrade(self);
            self.pin_refs.borrow_mut().push(r);
        }
        for r in other.subcircuit_pin_refs.borrow_mut().drain(..) {
            *r.net.borrow_mut() = Rc::downgrade(self);
            self.subcircuit_pin_refs.borrow_mut().push(r);
        }
    }
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for Net {}

impl PartialEq for Net {
    fn eq(&self, other: &Self) -> bool {
        debug_assert_ne!(self.parent_circuit.upgrade(), None, "net does not live in a circuit");
        self.id == other.id && self.parent_circuit.ptr_eq(&other.parent_circuit)
    }
}

impl Hash for Net {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A reference from a [`Net`] to one terminal of a [`Device`].
pub struct NetTerminalRef {
    net: RefCell<Weak<Net>>,
    device: Weak<Device>,
    terminal_id: usize,
}

impl NetTerminalRef {
    pub(super) fn new(net: &Rc<Net>, device: &Rc<Device>, terminal_id: usize) -> Rc<Self> {
        Rc::new(NetTerminalRef { net: RefCell::new(Rc::downgrade(net)), device: Rc::downgrade(device), terminal_id })
    }

    /// The net owning this reference.
    pub fn net(&self) -> Weak<Net> {
        self.net.borrow().clone()
    }

    /// The device this terminal belongs to.
    pub fn device(&self) -> Weak<Device> {
        self.device.clone()
    }

    /// The terminal id on `device`.
    pub fn terminal_id(&self) -> usize {
        self.terminal_id
    }
}

/// A reference from a [`Net`] to an outgoing [`Pin`](super::pin::Pin) of the containing circuit.
pub struct NetPinRef {
    net: RefCell<Weak<Net>>,
    pin_id: Cell<usize>,
}

impl NetPinRef {
    pub(super) fn new(net: &Rc<Net>, pin_id: usize) -> Rc<Self> {
        Rc::new(NetPinRef { net: RefCell::new(Rc::downgrade(net)), pin_id: Cell::new(pin_id) })
    }

    /// The net owning this reference.
    pub fn net(&self) -> Weak<Net> {
        self.net.borrow().clone()
    }

    /// The outgoing pin's id.
    pub fn pin_id(&self) -> usize {
        self.pin_id.get()
    }

    /// Renumbers the pin id, following a `join_pins` gap closure in the owning circuit.
    pub(super) fn set_pin_id(&self, pin_id: usize) {
        self.pin_id.set(pin_id);
    }
}

/// A reference from a [`Net`] to a pin of a [`SubCircuit`] instance connecting here.
pub struct NetSubcircuitPinRef {
    net: RefCell<Weak<Net>>,
    subcircuit: Weak<SubCircuit>,
    pin_id: Cell<usize>,
}

impl NetSubcircuitPinRef {
    pub(super) fn new(net: &Rc<Net>, subcircuit: &Rc<SubCircuit>, pin_id: usize) -> Rc<Self> {
        Rc::new(NetSubcircuitPinRef { net: RefCell::new(Rc::downgrade(net)), subcircuit: Rc::downgrade(subcircuit), pin_id: Cell::new(pin_id) })
    }

    /// The net owning this reference.
    pub fn net(&self) -> Weak<Net> {
        self.net.borrow().clone()
    }

    /// The subcircuit instance this pin belongs to.
    pub fn subcircuit(&self) -> Weak<SubCircuit> {
        self.subcircuit.clone()
    }

    /// The pin id, in the space of the subcircuit's referenced circuit.
    pub fn pin_id(&self) -> usize {
        self.pin_id.get()
    }

    /// Renumbers the pin id, following a `join_pins` gap closure in the referenced circuit.
    pub(super) fn set_pin_id(&self, pin_id: usize) {
        self.pin_id.set(pin_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_name_falls_back_to_cluster_id() {
        let net = Net::new(Id::none(), None, Weak::new());
        net.set_cluster_id(42);
        assert_eq!(net.expanded_name(), "$42");
    }

    #[test]
    fn expanded_name_uses_compact_form_for_large_cluster_ids() {
        let net = Net::new(Id::none(), None, Weak::new());
        net.set_cluster_id(u64::MAX);
        assert_eq!(net.expanded_name(), "$I1");
    }

    #[test]
    fn passive_and_floating() {
        let net = Net::new(Id::none(), None, Weak::new());
        assert!(net.is_passive());
        assert!(net.is_floating());
    }
}
