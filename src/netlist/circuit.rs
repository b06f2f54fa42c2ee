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
//! A `Circuit` is a template for circuit instances: pins interfacing to the outside,
//! subcircuits living inside, nets doing the internal wiring, and devices.

use crate::error::{NetlistError, Result};
use crate::id::Id;
use crate::transform::Polygon;
use super::device::Device;
use super::device_abstract::DeviceAbstract;
use super::device_class::DeviceClass;
use super::net::{Net, NetPinRef};
use super::netlist::Netlist;
use super::pin::Pin;
use super::subcircuit::SubCircuit;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// One level of netlist hierarchy: pins, nets, devices and subcircuit instances.
pub struct Circuit {
    id: Id<Circuit>,
    name: RefCell<String>,
    pub(super) self_reference: RefCell<Weak<Circuit>>,
    pub(super) parent_netlist: RefCell<Weak<Netlist>>,
    boundary: RefCell<Option<Polygon>>,
    cell_index: RefCell<Option<usize>>,
    dont_purge: Cell<bool>,
    external_index: Cell<usize>,
    pins: RefCell<Vec<Option<Rc<Pin>>>>,
    pin_refs: RefCell<Vec<Option<Rc<NetPinRef>>>>,
    nets: RefCell<Vec<Rc<Net>>>,
    devices: RefCell<Vec<Rc<Device>>>,
    next_device_id: Cell<u64>,
    subcircuits: RefCell<Vec<Rc<SubCircuit>>>,
    next_subcircuit_id: Cell<u64>,
    /// Subcircuit instances (possibly in other circuits) that instantiate this circuit.
    pub(super) refs: RefCell<Vec<Weak<SubCircuit>>>,
}

impl Circuit {
    pub(super) fn new(id: Id<Circuit>, name: String) -> Self {
        Circuit {
            id,
            name: RefCell::new(name),
            self_reference: Default::default(),
            parent_netlist: Default::default(),
            boundary: Default::default(),
            cell_index: Default::default(),
            dont_purge: Cell::new(false),
            external_index: Cell::new(0),
            pins: Default::default(),
            pin_refs: Default::default(),
            nets: Default::default(),
            devices: Default::default(),
            next_device_id: Cell::new(1),
            subcircuits: Default::default(),
            next_subcircuit_id: Cell::new(1),
            refs: Default::default(),
        }
    }

    /// The circuit's unique id.
    pub fn id(&self) -> Id<Circuit> {
        self.id
    }

    /// The circuit's name.
    ///
    /// Renaming through this method does not refresh the owning [`Netlist`]'s
    /// name-indexed cache; use [`Netlist::rename_circuit`] when the circuit is held by one.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(super) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    /// A weak handle to this circuit itself.
    pub fn self_reference(&self) -> Weak<Circuit> {
        self.self_reference.borrow().clone()
    }

    /// The netlist this circuit lives in, if any.
    pub fn parent_netlist(&self) -> Weak<Netlist> {
        self.parent_netlist.borrow().clone()
    }

    /// The boundary polygon in micrometre coordinates, if set.
    pub fn boundary(&self) -> Option<Polygon> {
        self.boundary.borrow().clone()
    }

    /// Sets the boundary polygon.
    pub fn set_boundary(&self, boundary: Option<Polygon>) {
        *self.boundary.borrow_mut() = boundary;
    }

    /// The opaque layout cell index linked to this circuit, if assigned.
    pub fn cell_index(&self) -> Option<usize> {
        *self.cell_index.borrow()
    }

    /// Sets the opaque layout cell index.
    pub fn set_cell_index(&self, cell_index: Option<usize>) {
        *self.cell_index.borrow_mut() = cell_index;
    }

    /// Whether this circuit is protected from being purged by [`Netlist::purge_circuit`]
    /// even when it has no instances. Set by [`blank`](Circuit::blank).
    pub fn dont_purge(&self) -> bool {
        self.dont_purge.get()
    }

    /// Sets the don't-purge flag.
    pub fn set_dont_purge(&self, dont_purge: bool) {
        self.dont_purge.set(dont_purge);
    }

    /// An opaque index slot reserved for external bookkeeping (not interpreted here).
    pub fn external_index(&self) -> usize {
        self.external_index.get()
    }

    /// Sets the external-bookkeeping index slot.
    pub fn set_external_index(&self, index: usize) {
        self.external_index.set(index);
    }

    /// Whether any subcircuit instance in another circuit (or itself) refers to this circuit.
    pub fn has_refs(&self) -> bool {
        self.refs.borrow().iter().any(|r| r.upgrade().is_some())
    }

    // -- Pins -----------------------------------------------------------------------

    /// The pins that are still present, in id order (gaps left by `remove_pin` are skipped).
    pub fn pins(&self) -> Vec<Rc<Pin>> {
        self.pins.borrow().iter().flatten().cloned().collect()
    }

    /// The pin with the given dense id, or `None` if it was removed.
    pub fn pin(&self, id: usize) -> Option<Rc<Pin>> {
        self.pins.borrow().get(id).cloned().flatten()
    }

    /// One past the highest pin id ever assigned (includes gaps left by `remove_pin`).
    pub fn pin_id_bound(&self) -> usize {
        self.pins.borrow().len()
    }

    /// Alias for [`pin_id_bound`](Circuit::pin_id_bound), used where a subcircuit instance
    /// needs to size its own per-pin table to match.
    pub fn num_pins(&self) -> usize {
        self.pin_id_bound()
    }

    /// Creates a new pin with a dense, freshly-assigned id.
    pub fn add_pin<S: Into<String>>(&self, name: S) -> Rc<Pin> {
        let mut pins = self.pins.borrow_mut();
        let id = pins.len();
        let pin = Rc::new(Pin::new(id, name.into()));
        pins.push(Some(pin.clone()));
        self.pin_refs.borrow_mut().push(None);
        pin
    }

    /// Removes the pin with the given id, disconnecting its internal net first. The id
    /// becomes a gap; ids above it are not renumbered (only [`join_pins`](Circuit::join_pins) does that).
    pub fn remove_pin(&self, id: usize) {
        self.connect_pin(id, None);
        if let Some(slot) = self.pins.borrow_mut().get_mut(id) {
            *slot = None;
        }
    }

    /// The net attached to the circuit's own pin `pin_id`, if any.
    pub fn net_for_pin(&self, pin_id: usize) -> Option<Rc<Net>> {
        self.pin_refs.borrow().get(pin_id).and_then(|r| r.as_ref()).and_then(|r| r.net().upgrade())
    }

    /// Attaches (or detaches, with `net = None`) the circuit's own pin to an internal net.
    /// Returns the previously attached net. A no-op (cheaply detected) if unchanged.
    ///
    /// # Panics
    /// Panics if `pin_id` is out of range, or `net` does not live in this circuit.
    pub fn connect_pin(&self, pin_id: usize, net: Option<&Rc<Net>>) -> Option<Rc<Net>> {
        let current = self.net_for_pin(pin_id);
        if current.as_ref().map(Rc::as_ptr) == net.map(Rc::as_ptr) {
            return current;
        }
        if let Some(net) = net {
            assert!(net.parent_circuit().ptr_eq(&self.self_reference()), "net does not live in this circuit");
        }
        let old = {
            let mut refs = self.pin_refs.borrow_mut();
            assert!(pin_id < refs.len(), "pin id out of range");
            refs[pin_id].take()
        };
        if let Some(old_ref) = &old {
            if let Some(old_net) = old_ref.net().upgrade() {
                old_net.remove_pin_ref(old_ref);
            }
        }
        if let Some(net) = net {
            let r = NetPinRef::new(net, pin_id);
            net.add_pin_ref(r.clone());
            self.pin_refs.borrow_mut()[pin_id] = Some(r);
        }
        old.and_then(|r| r.net().upgrade())
    }

    /// Attaches the pin to `net`. If `net` already carries a different outgoing pin, the
    /// two pins are merged via [`join_pins`](Circuit::join_pins) instead of creating a
    /// second outgoing-pin reference on the same net.
    pub fn join_pin_with_net(&self, pin_id: usize, net: Option<&Rc<Net>>) {
        if self.net_for_pin(pin_id).as_ref().map(Rc::as_ptr) == net.map(Rc::as_ptr) {
            return;
        }
        {
            let old = {
                let mut refs = self.pin_refs.borrow_mut();
                assert!(pin_id < refs.len(), "pin id out of range");
                refs[pin_id].take()
            };
            if let Some(old_ref) = old {
                if let Some(old_net) = old_ref.net().upgrade() {
                    old_net.remove_pin_ref(&old_ref);
                }
            }
        }
        if let Some(net) = net {
            if let Some(existing) = net.pin_refs().first().cloned() {
                let existing_pin_id = existing.pin_id();
                self.join_pins(existing_pin_id, pin_id);
            } else {
                let r = NetPinRef::new(net, pin_id);
                net.add_pin_ref(r.clone());
                self.pin_refs.borrow_mut()[pin_id] = Some(r);
            }
        }
    }

    /// Merges pin `with` into pin `pin`: `with`'s name is folded into `pin`'s (see
    /// [`join_names`]), `with`'s id slot is deleted and every id above it shifts down by
    /// one (in this circuit's own pin list and pin-ref cache, and in the per-pin table of
    /// every subcircuit instance of this circuit). For every such instance, the two
    /// external nets that used to be attached to `pin` and `with` are joined on the
    /// *parent* circuit.
    ///
    /// No-op if `with == pin` or `with` names an already-removed pin.
    pub fn join_pins(&self, pin: usize, with: usize) {
        if with == pin {
            return;
        }
        let with_pin = match self.pin(with) {
            Some(p) => p,
            None => return,
        };
        let kept_pin = self.pin(pin).expect("pin id out of range or already removed");
        kept_pin.set_name(join_names(&kept_pin.name(), &with_pin.name()));

        self.pins.borrow_mut().remove(with);
        self.pin_refs.borrow_mut().remove(with);

        for p in self.pins.borrow().iter().flatten() {
            if p.id() > with {
                p.set_id(p.id() - 1);
            }
        }
        for r in self.pin_refs.borrow().iter().flatten() {
            if r.pin_id() > with {
                r.set_pin_id(r.pin_id() - 1);
            }
        }

        let pin = if pin > with { pin - 1 } else { pin };

        let instances: Vec<Rc<SubCircuit>> = self.refs.borrow().iter().filter_map(|r| r.upgrade()).collect();
        for sc in instances {
            let with_net = sc.net_for_pin(with);
            sc.erase_pin(with);
            let pin_net = sc.net_for_pin(pin);
            if let (Some(parent), Some(keep), Some(drop)) = (sc.parent_circuit().upgrade(), pin_net, with_net) {
                if !Rc::ptr_eq(&keep, &drop) {
                    parent.join_nets(&keep, &drop);
                }
            }
        }
    }

    // -- Nets -------------------------------------------------------------------------

    /// The nets owned by this circuit, in insertion order.
    pub fn nets(&self) -> Vec<Rc<Net>> {
        self.nets.borrow().clone()
    }

    /// Creates a new, unconnected net.
    pub fn create_net<S: Into<String>>(&self, name: Option<S>) -> Rc<Net> {
        let net = Rc::new(Net::new(Id::new(), name.map(Into::into), self.self_reference()));
        self.nets.borrow_mut().push(net.clone());
        net
    }

    /// Removes a net that belongs to this circuit. The caller is responsible for having
    /// detached every reference from it first (typically true only for passive nets).
    pub fn remove_net(&self, net: &Rc<Net>) -> Result<()> {
        if !net.parent_circuit().ptr_eq(&self.self_reference()) {
            return Err(NetlistError::NotOwned(format!("net {:?} does not belong to circuit '{}'", net.id(), self.name())));
        }
        self.nets.borrow_mut().retain(|n| !Rc::ptr_eq(n, net));
        Ok(())
    }

    /// Moves every reference from `drop` onto `keep` (terminals, subcircuit pins, and —
    /// via [`join_pin_with_net`](Circuit::join_pin_with_net) — outgoing pins), merges their
    /// names, then deletes `drop`. Both nets must belong to this circuit.
    pub fn join_nets(&self, keep: &Rc<Net>, drop: &Rc<Net>) {
        if Rc::ptr_eq(keep, drop) {
            return;
        }
        assert!(keep.parent_circuit().ptr_eq(&self.self_reference()), "net does not live in this circuit");
        assert!(drop.parent_circuit().ptr_eq(&self.self_reference()), "net does not live in this circuit");

        while let Some(r) = drop.terminal_refs().into_iter().next() {
            if let Some(device) = r.device().upgrade() {
                device.connect_terminal(r.terminal_id(), Some(keep));
            } else {
                drop.remove_terminal_ref(&r);
            }
        }
        while let Some(r) = drop.subcircuit_pin_refs().into_iter().next() {
            if let Some(subcircuit) = r.subcircuit().upgrade() {
                subcircuit.connect_pin(r.pin_id(), Some(keep));
            } else {
                drop.remove_subcircuit_pin_ref(&r);
            }
        }
        while let Some(r) = drop.pin_refs().into_iter().next() {
            self.join_pin_with_net(r.pin_id(), Some(keep));
        }

        if let Some(netlist) = self.parent_netlist().upgrade() {
            if let Some(callbacks) = netlist.callbacks() {
                callbacks.link_nets(keep, drop);
            }
        }

        keep.set_name(join_names(&keep.name().unwrap_or_default(), &drop.name().unwrap_or_default()));
        let _ = self.remove_net(drop);
    }

    // -- Devices ------------------------------------------------------------------------

    /// The devices owned by this circuit, in insertion order.
    pub fn devices(&self) -> Vec<Rc<Device>> {
        self.devices.borrow().clone()
    }

    /// Creates a new device of the given class, assigning it the next per-circuit
    /// monotonic instance id.
    pub fn create_device(&self, name: Option<String>, device_class: &Rc<DeviceClass>, device_abstract: Option<&Rc<DeviceAbstract>>) -> Rc<Device> {
        let id = self.next_device_id.get();
        self.next_device_id.set(id + 1);
        let device = Rc::new(Device::new(id, name, self.self_reference(), device_class, device_abstract));
        self.devices.borrow_mut().push(device.clone());
        device
    }

    /// Removes a device that belongs to this circuit, disconnecting all its terminals first.
    pub fn remove_device(&self, device: &Rc<Device>) -> Result<()> {
        if !device.parent_circuit().ptr_eq(&self.self_reference()) {
            return Err(NetlistError::NotOwned(format!("device '{}' does not belong to circuit '{}'", device.expanded_name(), self.name())));
        }
        device.disconnect_all_terminals();
        self.devices.borrow_mut().retain(|d| !Rc::ptr_eq(d, device));
        Ok(())
    }

    // -- Subcircuits ----------------------------------------------------------------------

    /// The subcircuit instances owned by this circuit, in insertion order.
    pub fn subcircuits(&self) -> Vec<Rc<SubCircuit>> {
        self.subcircuits.borrow().clone()
    }

    /// Creates a new instance of `circuit_ref` inside this circuit.
    ///
    /// # Panics
    /// Panics if instantiating `circuit_ref` here would create a cycle in the hierarchy.
    pub fn create_subcircuit(&self, name: Option<String>, circuit_ref: &Rc<Circuit>) -> Rc<SubCircuit> {
        assert!(!self.would_create_cycle(circuit_ref), "cannot create a recursive circuit instance");

        let id = self.next_subcircuit_id.get();
        self.next_subcircuit_id.set(id + 1);
        let subcircuit = Rc::new(SubCircuit::new(id, name, self.self_reference(), circuit_ref));
        circuit_ref.refs.borrow_mut().push(Rc::downgrade(&subcircuit));
        self.subcircuits.borrow_mut().push(subcircuit.clone());
        if let Some(netlist) = self.parent_netlist().upgrade() {
            netlist.invalidate_topology();
        }
        subcircuit
    }

    fn would_create_cycle(&self, candidate: &Rc<Circuit>) -> bool {
        let self_id = self.id;
        let mut stack = vec![candidate.clone()];
        let mut visited = HashSet::new();
        while let Some(c) = stack.pop() {
            if c.id() == self_id {
                return true;
            }
            if !visited.insert(c.id()) {
                continue;
            }
            for sc in c.subcircuits() {
                if let Some(child) = sc.circuit_ref().upgrade() {
                    stack.push(child);
                }
            }
        }
        false
    }

    /// Removes a subcircuit instance that belongs to this circuit, deregistering it from
    /// the referenced circuit's `refs` list and disconnecting all of its pins first.
    pub fn remove_subcircuit(&self, subcircuit: &Rc<SubCircuit>) -> Result<()> {
        if !subcircuit.parent_circuit().ptr_eq(&self.self_reference()) {
            return Err(NetlistError::NotOwned(format!("subcircuit '{}' does not belong to circuit '{}'", subcircuit.expanded_name(), self.name())));
        }
        subcircuit.disconnect_all_pins();
        if let Some(circuit_ref) = subcircuit.circuit_ref().upgrade() {
            circuit_ref.refs.borrow_mut().retain(|r| r.upgrade().map(|s| !Rc::ptr_eq(&s, subcircuit)).unwrap_or(false));
        }
        self.subcircuits.borrow_mut().retain(|s| !Rc::ptr_eq(s, subcircuit));
        if let Some(netlist) = self.parent_netlist().upgrade() {
            netlist.invalidate_topology();
        }
        Ok(())
    }

    /// Replaces `subcircuit` by an inlined, name-prefixed copy of its referenced circuit's
    /// nets, devices and subcircuits, wired into this circuit, then destroys `subcircuit`.
    pub fn flatten_subcircuit(&self, subcircuit: &Rc<SubCircuit>) {
        assert!(subcircuit.parent_circuit().ptr_eq(&self.self_reference()), "subcircuit does not belong to this circuit");
        let child = subcircuit.circuit_ref().upgrade().expect("subcircuit's referenced circuit was already destroyed");
        let prefix = subcircuit.expanded_name();
        let sc_transform = subcircuit.transform();

        let mut net_map: Vec<(Rc<Net>, Rc<Net>)> = Vec::with_capacity(child.nets().len());
        for child_net in child.nets() {
            let pin_refs = child_net.pin_refs();
            let outside_net = if let Some(first) = pin_refs.first() {
                let mut outside: Option<Rc<Net>> = subcircuit.net_for_pin(first.pin_id());
                for p in pin_refs.iter().skip(1) {
                    if let Some(other) = subcircuit.net_for_pin(p.pin_id()) {
                        match &outside {
                            Some(o) if !Rc::ptr_eq(o, &other) => self.join_nets(o, &other),
                            Some(_) => {}
                            None => outside = Some(other),
                        }
                    }
                }
                outside.unwrap_or_else(|| self.create_net::<String>(None))
            } else {
                let name = child_net.name().map(|n| format!("{}.{}", prefix, n));
                let new_net = self.create_net(name);
                if let Some(netlist) = self.parent_netlist().upgrade() {
                    if let Some(callbacks) = netlist.callbacks() {
                        let cluster_id = callbacks.link_net_to_parent_circuit(&child_net, self, &sc_transform);
                        new_net.set_cluster_id(cluster_id);
                    }
                }
                new_net
            };
            net_map.push((child_net, outside_net));
        }
        let net_for = |n: &Rc<Net>| -> Option<Rc<Net>> {
            net_map.iter().find(|(c, _)| Rc::ptr_eq(c, n)).map(|(_, o)| o.clone())
        };

        for d in child.devices() {
            let name = Some(format!("{}.{}", prefix, d.expanded_name()));
            let new_device = self.create_device(name, &d.device_class().upgrade().expect("device class dropped"), d.device_abstract().upgrade().as_ref());
            new_device.set_transform(sc_transform.compose(&d.transform()));
            if let Some(class) = d.device_class().upgrade() {
                for t in class.terminals() {
                    if let Some(tnet) = d.terminal_net(t.id) {
                        if let Some(mapped) = net_for(&tnet) {
                            new_device.connect_terminal(t.id, Some(&mapped));
                        }
                    }
                }
            }
        }

        for sc in child.subcircuits() {
            let name = Some(format!("{}.{}", prefix, sc.expanded_name()));
            let grandchild = sc.circuit_ref().upgrade().expect("subcircuit's referenced circuit was already destroyed");
            let new_subcircuit = self.create_subcircuit(name, &grandchild);
            new_subcircuit.set_transform(sc_transform.compose(&sc.transform()));
            for p in grandchild.pins() {
                if let Some(pnet) = sc.net_for_pin(p.id()) {
                    if let Some(mapped) = net_for(&pnet) {
                        new_subcircuit.connect_pin(p.id(), Some(&mapped));
                    }
                }
            }
        }

        let _ = self.remove_subcircuit(subcircuit);
    }

    /// Removes every passive net. Pins attached to purged nets are left in place.
    pub fn purge_nets_keep_pins(&self) {
        self.do_purge_nets(true);
    }

    /// Removes every passive net, and every pin attached to one (leaving a gap, and
    /// erasing the corresponding subcircuit-pin refs from every instance of this circuit).
    pub fn purge_nets(&self) {
        self.do_purge_nets(false);
    }

    fn do_purge_nets(&self, keep_pins: bool) {
        let passive: Vec<Rc<Net>> = self.nets.borrow().iter().filter(|n| n.is_passive()).cloned().collect();

        let mut pins_to_delete: Vec<usize> = Vec::new();
        for n in &passive {
            if !keep_pins {
                for p in n.pin_refs() {
                    pins_to_delete.push(p.pin_id());
                }
            }
            let _ = self.remove_net(n);
        }

        if pins_to_delete.is_empty() {
            return;
        }
        pins_to_delete.sort_unstable();
        pins_to_delete.dedup();

        for sc in self.refs.borrow().iter().filter_map(|r| r.upgrade()) {
            for &p in &pins_to_delete {
                if let Some(net) = sc.net_for_pin(p) {
                    if let Some(r) = net
                        .subcircuit_pin_refs()
                        .into_iter()
                        .find(|r| r.pin_id() == p && r.subcircuit().upgrade().map(|s| Rc::ptr_eq(&s, &sc)).unwrap_or(false))
                    {
                        net.remove_subcircuit_pin_ref(&r);
                    }
                }
            }
        }

        for p in pins_to_delete {
            self.remove_pin(p);
        }
    }

    /// Deletes all nets, devices and subcircuits, turning this circuit into an empty
    /// blackbox of pins only. Any circuit that becomes uninstantiated as a result is
    /// requested to be purged from the owning netlist. Sets `dont_purge` so that this
    /// now-empty shell survives that same purge sweep.
    pub fn blank(&self) {
        let netlist = self.parent_netlist().upgrade().expect("circuit is not owned by a netlist");

        let called: HashSet<Id<Circuit>> = self.subcircuits().iter().filter_map(|sc| sc.circuit_ref().upgrade()).map(|c| c.id()).collect();
        let called: Vec<Rc<Circuit>> = called.into_iter().filter_map(|id| netlist.circuit_by_id(id)).collect();

        self.nets.borrow_mut().clear();
        for sc in self.subcircuits.borrow_mut().drain(..) {
            if let Some(circuit_ref) = sc.circuit_ref().upgrade() {
                circuit_ref.refs.borrow_mut().retain(|r| r.upgrade().map(|s| !Rc::ptr_eq(&s, &sc)).unwrap_or(false));
            }
        }
        self.devices.borrow_mut().clear();
        netlist.invalidate_topology();

        for c in called {
            if !c.has_refs() {
                netlist.purge_circuit(&c);
            }
        }

        self.set_dont_purge(true);
    }

    /// Runs parallel- and serial-combination sweeps, over every device class that
    /// supports either, to a fixpoint (no further combination possible).
    pub fn combine_devices(&self) {
        loop {
            let mut seen = HashSet::new();
            let classes: Vec<Rc<DeviceClass>> = self
                .devices
                .borrow()
                .iter()
                .filter_map(|d| d.device_class().upgrade())
                .filter(|c| seen.insert(c.comparison_identity()))
                .collect();

            let mut any = false;
            for class in &classes {
                if class.supports_parallel_combination() {
                    any |= self.combine_parallel_devices(class);
                }
                if class.supports_serial_combination() {
                    any |= self.combine_serial_devices(class);
                }
            }
            if !any {
                break;
            }
        }
    }

    fn combine_parallel_devices(&self, class: &Rc<DeviceClass>) -> bool {
        let combiner = match class.device_combiner() {
            Some(c) => c,
            None => return false,
        };
        let terminals = class.terminals();
        let mut groups: std::collections::HashMap<Vec<Id<Net>>, Vec<Rc<Device>>> = Default::default();
        for d in self.devices() {
            if d.device_class().upgrade().map(|c| c.comparison_identity() != class.comparison_identity()).unwrap_or(true) {
                continue;
            }
            let mut key: Vec<Id<Net>> = terminals.iter().filter_map(|t| d.terminal_net(t.id).map(|n| n.id())).collect();
            key.sort_unstable();
            key.dedup();
            groups.entry(key).or_default().push(d);
        }

        let mut combined_any = false;
        for mut group in groups.into_values() {
            let mut i = 0;
            while i < group.len() {
                let mut j = i + 1;
                while j < group.len() {
                    if combiner.combine_parallel(&group[i], &group[j]) {
                        group[i].join_device(&group[j]);
                        self.check_device_before_remove(&group[j]);
                        let removed = group.remove(j);
                        let _ = self.remove_device(&removed);
                        combined_any = true;
                    } else {
                        j += 1;
                    }
                }
                i += 1;
            }
        }
        combined_any
    }

    fn combine_serial_devices(&self, class: &Rc<DeviceClass>) -> bool {
        let combiner = match class.device_combiner() {
            Some(c) => c,
            None => return false,
        };
        let num_terminals = class.num_terminals();
        let mut combined_any = false;

        'outer: loop {
            for net in self.nets() {
                if net.num_pins() != 0 {
                    continue;
                }
                let mut candidates: Vec<(Rc<Device>, usize)> = Vec::new();
                for r in net.terminal_refs() {
                    if let Some(d) = r.device().upgrade() {
                        if d.device_class().upgrade().map(|c| c.comparison_identity() == class.comparison_identity()).unwrap_or(false) {
                            candidates.push((d, r.terminal_id()));
                        }
                    }
                }
                if candidates.len() != 2 {
                    continue;
                }
                let (d1, t1) = candidates[0].clone();
                let (d2, t2) = candidates[1].clone();

                let mut other_nets: Vec<Id<Net>> = class
                    .terminals()
                    .iter()
                    .filter(|t| t.id != t1)
                    .filter_map(|t| d1.terminal_net(t.id).map(|n| n.id()))
                    .chain(class.terminals().iter().filter(|t| t.id != t2).filter_map(|t| d2.terminal_net(t.id).map(|n| n.id())))
                    .collect();
                other_nets.sort_unstable();
                other_nets.dedup();
                if other_nets.len() > num_terminals {
                    continue;
                }

                if combiner.combine_serial(&d1, &d2, t1, t2) {
                    d1.join_device(&d2);
                    self.check_device_before_remove(&d2);
                    let _ = self.remove_device(&d2);
                    combined_any = true;
                    continue 'outer;
                }
            }
            break;
        }
        combined_any
    }

    /// Sanity check run before a device absorbed by [`Device::join_device`](super::device::Device::join_device)
    /// is removed: it must have no terminal still connected.
    fn check_device_before_remove(&self, device: &Rc<Device>) {
        if let Some(class) = device.device_class().upgrade() {
            for t in class.terminals() {
                if device.terminal_net(t.id).is_some() {
                    panic!(
                        "internal error: terminal '{}' of device '{}' still connected after combination in circuit '{}'",
                        t.name,
                        device.expanded_name(),
                        self.name()
                    );
                }
            }
        }
    }
}

/// The shared device/pin/net naming rule used when two entities are merged: keeps `a` if
/// `b` is empty, `b` if `a` is empty, `a` if they're equal, else the comma-joined
/// sorted-unique union of both sides' comma-separated name parts.
pub fn join_names(a: &str, b: &str) -> String {
    if b.is_empty() {
        return a.to_string();
    }
    if a.is_empty() {
        return b.to_string();
    }
    if a == b {
        return a.to_string();
    }
    let mut parts: Vec<&str> = a.split(',').chain(b.split(',')).collect();
    parts.sort_unstable();
    parts.dedup();
    parts.join(",")
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for Circuit {}

impl PartialEq for Circuit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for Circuit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_names_merges_sorted_unique_parts() {
        assert_eq!(join_names("a", ""), "a");
        assert_eq!(join_names("", "b"), "b");
        assert_eq!(join_names("a", "a"), "a");
        assert_eq!(join_names("b,a", "a,c"), "a,b,c");
    }

    fn make_circuit(name: &str) -> Rc<Circuit> {
        let c = Rc::new(Circuit::new(Id::new(), name.to_string()));
        *c.self_reference.borrow_mut() = Rc::downgrade(&c);
        c
    }

    #[test]
    fn add_and_remove_pin_leaves_a_gap() {
        let c = make_circuit("inv");
        let _a = c.add_pin("A");
        let y = c.add_pin("Y");
        assert_eq!(c.pin_id_bound(), 2);
        c.remove_pin(y.id());
        assert_eq!(c.pin(y.id()), None);
        assert_eq!(c.pins().len(), 1);
    }

    #[test]
    fn connect_pin_round_trips() {
        let c = make_circuit("buf");
        let pin = c.add_pin("A");
        let net = c.create_net(Some("n1"));
        assert!(c.connect_pin(pin.id(), Some(&net)).is_none());
        assert_eq!(net.num_pins(), 1);
        let old = c.connect_pin(pin.id(), None);
        assert!(old.is_some());
        assert_eq!(net.num_pins(), 0);
    }

    #[test]
    fn join_pins_merges_names_and_shifts_ids() {
        let c = make_circuit("cell");
        let a = c.add_pin("A");
        let b = c.add_pin("B");
        let z = c.add_pin("Z");
        c.join_pins(a.id(), b.id());
        assert_eq!(a.name(), "A,B");
        assert_eq!(c.pins().len(), 2);
        assert_eq!(z.id(), 1);
    }

    #[test]
    fn join_nets_moves_terminal_refs() {
        let c = make_circuit("cell");
        let n1 = c.create_net(Some("n1"));
        let n2 = c.create_net(Some("n2"));
        let class = DeviceClass::new("R", &["A", "B"]);
        let dev = c.create_device(None, &class, None);
        dev.connect_terminal(0, Some(&n2));
        c.join_nets(&n1, &n2);
        assert_eq!(dev.terminal_net(0).unwrap().id(), n1.id());
        assert_eq!(c.nets().len(), 1);
    }
}
