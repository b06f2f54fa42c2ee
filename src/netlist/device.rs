// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A `Device` is an instance of a [`DeviceClass`](super::device_class::DeviceClass) inside
//! a [`Circuit`].

use crate::transform::Transform;
use super::circuit::Circuit;
use super::device_abstract::DeviceAbstract;
use super::device_class::DeviceClass;
use super::net::{Net, NetTerminalRef};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// An instance of a [`DeviceClass`] inside a [`Circuit`].
///
/// Unlike [`Circuit`], [`Net`] and [`DeviceClass`], a device's identity is a monotonic
/// counter scoped to its containing circuit (assigned `last.id + 1` on `add_device`), not
/// the process-wide [`Id`](crate::id::Id) service — two devices in different circuits may
/// legitimately share the same numeric id.
pub struct Device {
    pub(super) id: u64,
    name: RefCell<Option<String>>,
    pub(super) parent_circuit: Weak<Circuit>,
    device_class: Weak<DeviceClass>,
    device_abstract: RefCell<Weak<DeviceAbstract>>,
    transform: Cell<Transform>,
    parameters: RefCell<Vec<f64>>,
    pub(super) terminal_refs: RefCell<Vec<Option<Rc<NetTerminalRef>>>>,
    other_abstracts: RefCell<Vec<(Weak<DeviceAbstract>, Transform)>>,
    reconnected_terminals: RefCell<HashMap<usize, Vec<(usize, usize)>>>,
}

impl Device {
    pub(super) fn new(
        id: u64,
        name: Option<String>,
        parent_circuit: Weak<Circuit>,
        device_class: &Rc<DeviceClass>,
        device_abstract: Option<&Rc<DeviceAbstract>>,
    ) -> Self {
        let num_terminals = device_class.num_terminals();
        Device {
            id,
            name: RefCell::new(name),
            parent_circuit,
            device_class: Rc::downgrade(device_class),
            device_abstract: RefCell::new(device_abstract.map(Rc::downgrade).unwrap_or_default()),
            transform: Cell::new(Transform::identity()),
            parameters: RefCell::new(Vec::new()),
            terminal_refs: RefCell::new(vec![None; num_terminals]),
            other_abstracts: Default::default(),
            reconnected_terminals: Default::default(),
        }
    }

    /// The per-circuit monotonic instance id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The device's name, if any.
    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    /// Sets the device's name.
    pub fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    /// Name if set, else `"$<id>"`.
    pub fn expanded_name(&self) -> String {
        self.name().unwrap_or_else(|| format!("${}", self.id))
    }

    /// The circuit this device lives in.
    pub fn parent_circuit(&self) -> Weak<Circuit> {
        self.parent_circuit.clone()
    }

    /// The device's class.
    pub fn device_class(&self) -> Weak<DeviceClass> {
        self.device_class.clone()
    }

    /// The primary device abstract (geometry link), if any.
    pub fn device_abstract(&self) -> Weak<DeviceAbstract> {
        self.device_abstract.borrow().clone()
    }

    /// Sets the primary device abstract.
    pub fn set_device_abstract(&self, device_abstract: &Rc<DeviceAbstract>) {
        *self.device_abstract.borrow_mut() = Rc::downgrade(device_abstract);
    }

    /// The device's placement transform in micrometres.
    pub fn transform(&self) -> Transform {
        self.transform.get()
    }

    /// Sets the device's placement transform.
    pub fn set_transform(&self, transform: Transform) {
        self.transform.set(transform);
    }

    /// The value of parameter `id`; falls back to the device class' default for indices
    /// beyond the device's own (possibly shorter) parameter vector.
    pub fn parameter(&self, id: usize) -> f64 {
        let params = self.parameters.borrow();
        if let Some(v) = params.get(id) {
            return *v;
        }
        self.device_class.upgrade().map(|c| c.default_value(id)).unwrap_or(0.0)
    }

    /// Sets parameter `id`, growing the parameter vector (filling gaps with the class
    /// default) if necessary.
    pub fn set_parameter(&self, id: usize, value: f64) {
        let default = self.device_class.upgrade().map(|c| c.default_value(id)).unwrap_or(0.0);
        let mut params = self.parameters.borrow_mut();
        if id >= params.len() {
            params.resize(id + 1, default);
        }
        params[id] = value;
    }

    /// The full parameter vector, as explicitly stored (not padded with class defaults).
    pub fn parameters(&self) -> Vec<f64> {
        self.parameters.borrow().clone()
    }

    /// The net connected to the given terminal, if any.
    pub fn terminal_net(&self, terminal_id: usize) -> Option<Rc<Net>> {
        self.terminal_refs.borrow().get(terminal_id).and_then(|r| r.as_ref()).and_then(|r| r.net().upgrade())
    }

    /// Connects (or disconnects, with `net = None`) the given terminal to a net. The net
    /// must belong to the same circuit as this device. Returns the previously connected net.
    ///
    /// # Panics
    /// Panics if `terminal_id` is out of range, or if `net` does not live in this device's
    /// circuit.
    pub fn connect_terminal(self: &Rc<Device>, terminal_id: usize, net: Option<&Rc<Net>>) -> Option<Rc<Net>> {
        if let Some(net) = net {
            assert!(
                net.parent_circuit().ptr_eq(&self.parent_circuit),
                "net does not live in this device's circuit"
            );
        }
        let old = {
            let mut refs = self.terminal_refs.borrow_mut();
            assert!(terminal_id < refs.len(), "terminal id out of range");
            refs[terminal_id].take()
        };
        if let Some(old_ref) = &old {
            if let Some(old_net) = old_ref.net().upgrade() {
                old_net.remove_terminal_ref(old_ref);
            }
        }
        if let Some(net) = net {
            let r = NetTerminalRef::new(net, self, terminal_id);
            net.add_terminal_ref(r.clone());
            self.terminal_refs.borrow_mut()[terminal_id] = Some(r);
        }
        old.and_then(|r| r.net().upgrade())
    }

    /// Disconnects every terminal from its net. Used when this device is being absorbed by
    /// another (see [`join_device`](Device::join_device)) or removed from its circuit.
    pub(super) fn disconnect_all_terminals(&self) {
        let n = self.terminal_refs.borrow().len();
        for id in 0..n {
            let old = self.terminal_refs.borrow_mut()[id].take();
            if let Some(old_ref) = old {
                if let Some(old_net) = old_ref.net().upgrade() {
                    old_net.remove_terminal_ref(&old_ref);
                }
            }
        }
    }

    /// Absorbs `other` into `self`: records `other`'s device abstract (with its placement
    /// transform expressed relative to `self`) in the combination bookkeeping, then
    /// disconnects every one of `other`'s terminals so the caller's post-condition check
    /// (every terminal of `other` now unconnected) holds. `self`'s own terminals and name
    /// are left untouched by this call; callers merge names via [`super::circuit::join_names`]
    /// before deleting `other`.
    pub fn join_device(self: &Rc<Device>, other: &Rc<Device>) {
        let relative = other.transform().relative_to(&self.transform());
        self.other_abstracts.borrow_mut().push((other.device_abstract(), relative));
        for (weak_abs, t) in other.other_abstracts.borrow().iter() {
            self.other_abstracts.borrow_mut().push((weak_abs.clone(), t.relative_to(&self.transform())));
        }
        other.disconnect_all_terminals();
    }

    /// Records that `this_terminal_id` is now routed, for `device_index` hops (`0` = this
    /// device's primary abstract, `k >= 1` = `other_abstracts()[k - 1]`), to
    /// `other_terminal_id` on that abstract.
    ///
    /// The internal connection this reroute represents (the path through the absorbed
    /// device between its own terminals) is not modeled; only the endpoint mapping is kept.
    pub fn reroute_terminal(&self, this_terminal_id: usize, device_index: usize, other_terminal_id: usize) {
        self.reconnected_terminals
            .borrow_mut()
            .entry(this_terminal_id)
            .or_default()
            .push((device_index, other_terminal_id));
    }

    /// The device abstracts absorbed via [`join_device`](Device::join_device), each with its
    /// placement transform relative to this device (not counting the primary abstract).
    pub fn other_abstracts(&self) -> Vec<(Weak<DeviceAbstract>, Transform)> {
        self.other_abstracts.borrow().clone()
    }

    /// The reroute table built by [`reroute_terminal`](Device::reroute_terminal).
    pub fn reconnected_terminals(&self) -> HashMap<usize, Vec<(usize, usize)>> {
        self.reconnected_terminals.borrow().clone()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for Device {}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.parent_circuit.ptr_eq(&other.parent_circuit)
    }
}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
