// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `Netlist` is the root container: it owns every [`Circuit`], [`DeviceClass`] and
//! [`DeviceAbstract`], and caches the circuit call-graph (which circuits instantiate which).

use crate::error::{NetlistError, Result};
use crate::id::Id;
use crate::transform::Transform;
use super::circuit::Circuit;
use super::device_abstract::DeviceAbstract;
use super::device_class::DeviceClass;
use super::net::Net;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Callbacks the embedder can install to be notified of net-joining operations that cross
/// into layout-extraction territory (cluster ids), used by [`Circuit::join_nets`] and
/// [`Circuit::flatten_subcircuit`]. Both methods are no-ops by default so that netlists can
/// be built and edited without an embedder attached.
pub trait NetlistCallbacks {
    /// Called when `drop` is about to be merged into `keep` by `join_nets`, before `drop`
    /// is destroyed.
    fn link_nets(&self, _keep: &Rc<Net>, _drop: &Rc<Net>) {}

    /// Called by `flatten_subcircuit` when a child net has no outgoing pins and must be
    /// given a fresh cluster id in the parent circuit's geometry. `transform` is the
    /// subcircuit instance's placement. Returns the cluster id to assign to the newly
    /// created parent-side net.
    fn link_net_to_parent_circuit(&self, _child_net: &Rc<Net>, _parent_circuit: &Rc<Circuit>, _transform: &Transform) -> u64 {
        0
    }
}

#[derive(Default)]
struct Topology {
    children: HashMap<Id<Circuit>, Vec<Rc<Circuit>>>,
    parents: HashMap<Id<Circuit>, Vec<Rc<Circuit>>>,
}

/// The top-level container: owns circuits, device classes and device abstracts.
pub struct Netlist {
    self_reference: RefCell<Weak<Netlist>>,
    circuits: RefCell<Vec<Rc<Circuit>>>,
    circuit_by_id: RefCell<HashMap<Id<Circuit>, Rc<Circuit>>>,
    circuit_by_name: RefCell<HashMap<String, Rc<Circuit>>>,
    circuit_by_cell_index: RefCell<HashMap<usize, Rc<Circuit>>>,
    device_classes: RefCell<Vec<Rc<DeviceClass>>>,
    device_abstracts: RefCell<Vec<Rc<DeviceAbstract>>>,
    device_abstract_by_name: RefCell<HashMap<String, Rc<DeviceAbstract>>>,
    device_abstract_by_cell_index: RefCell<HashMap<usize, Rc<DeviceAbstract>>>,
    topology: RefCell<Option<Topology>>,
    callbacks: RefCell<Option<Rc<dyn NetlistCallbacks>>>,
    normalize_name_hook: RefCell<Option<Rc<dyn Fn(&str) -> String>>>,
}

impl Default for Netlist {
    fn default() -> Self {
        Netlist {
            self_reference: Default::default(),
            circuits: Default::default(),
            circuit_by_id: Default::default(),
            circuit_by_name: Default::default(),
            circuit_by_cell_index: Default::default(),
            device_classes: Default::default(),
            device_abstracts: Default::default(),
            device_abstract_by_name: Default::default(),
            device_abstract_by_cell_index: Default::default(),
            topology: RefCell::new(None),
            callbacks: Default::default(),
            normalize_name_hook: Default::default(),
        }
    }
}

impl Netlist {
    /// Creates a new, empty netlist.
    pub fn new() -> Rc<Self> {
        let netlist = Rc::new(Netlist::default());
        *netlist.self_reference.borrow_mut() = Rc::downgrade(&netlist);
        netlist
    }

    /// A weak handle to this netlist itself.
    pub fn self_reference(&self) -> Weak<Netlist> {
        self.self_reference.borrow().clone()
    }

    /// Installs the netlist callbacks used by `join_nets` and `flatten_subcircuit`.
    pub fn set_callbacks(&self, callbacks: Rc<dyn NetlistCallbacks>) {
        *self.callbacks.borrow_mut() = Some(callbacks);
    }

    /// The installed callbacks, if any.
    pub fn callbacks(&self) -> Option<Rc<dyn NetlistCallbacks>> {
        self.callbacks.borrow().clone()
    }

    /// Installs an optional name-normalization hook (e.g. case folding) applied by
    /// [`normalize_name`](Netlist::normalize_name). Identity by default.
    pub fn set_normalize_name_hook(&self, hook: Rc<dyn Fn(&str) -> String>) {
        *self.normalize_name_hook.borrow_mut() = Some(hook);
    }

    /// Normalizes a name through the installed hook, or returns it unchanged.
    pub fn normalize_name(&self, name: &str) -> String {
        match self.normalize_name_hook.borrow().as_ref() {
            Some(hook) => hook(name),
            None => name.to_string(),
        }
    }

    // -- Circuits -----------------------------------------------------------------------

    /// The circuits owned by this netlist, in insertion order.
    pub fn circuits(&self) -> Vec<Rc<Circuit>> {
        self.circuits.borrow().clone()
    }

    /// Creates a new, empty circuit and adds it to this netlist.
    pub fn create_circuit<S: Into<String>>(self: &Rc<Self>, name: S) -> Rc<Circuit> {
        let name = name.into();
        let circuit = Rc::new(Circuit::new(Id::new(), name.clone()));
        *circuit.self_reference.borrow_mut() = Rc::downgrade(&circuit);
        *circuit.parent_netlist.borrow_mut() = Rc::downgrade(self);

        self.circuits.borrow_mut().push(circuit.clone());
        self.circuit_by_id.borrow_mut().insert(circuit.id(), circuit.clone());
        self.circuit_by_name.borrow_mut().insert(name, circuit.clone());
        self.invalidate_topology();
        circuit
    }

    /// Looks up a circuit by id.
    pub fn circuit_by_id(&self, id: Id<Circuit>) -> Option<Rc<Circuit>> {
        self.circuit_by_id.borrow().get(&id).cloned()
    }

    /// Looks up a circuit by name.
    pub fn circuit_by_name(&self, name: &str) -> Option<Rc<Circuit>> {
        self.circuit_by_name.borrow().get(name).cloned()
    }

    /// Looks up a circuit by its linked layout cell index.
    pub fn circuit_by_cell_index(&self, cell_index: usize) -> Option<Rc<Circuit>> {
        self.circuit_by_cell_index.borrow().get(&cell_index).cloned()
    }

    /// Renames a circuit owned by this netlist, refreshing the name-indexed cache. Use this
    /// instead of [`Circuit::set_name`] (which does not know about the owning netlist).
    pub fn rename_circuit(&self, circuit: &Rc<Circuit>, name: impl Into<String>) -> Result<()> {
        if !self.owns_circuit(circuit) {
            return Err(NetlistError::NotOwned(format!("circuit '{}' does not belong to this netlist", circuit.name())));
        }
        let name = name.into();
        self.circuit_by_name.borrow_mut().remove(&circuit.name());
        circuit.set_name(name.clone());
        self.circuit_by_name.borrow_mut().insert(name, circuit.clone());
        Ok(())
    }

    /// Sets a circuit's linked layout cell index, refreshing the cell-index-indexed cache.
    pub fn set_circuit_cell_index(&self, circuit: &Rc<Circuit>, cell_index: Option<usize>) -> Result<()> {
        if !self.owns_circuit(circuit) {
            return Err(NetlistError::NotOwned(format!("circuit '{}' does not belong to this netlist", circuit.name())));
        }
        if let Some(old) = circuit.cell_index() {
            self.circuit_by_cell_index.borrow_mut().remove(&old);
        }
        circuit.set_cell_index(cell_index);
        if let Some(new) = cell_index {
            self.circuit_by_cell_index.borrow_mut().insert(new, circuit.clone());
        }
        Ok(())
    }

    fn owns_circuit(&self, circuit: &Rc<Circuit>) -> bool {
        self.circuit_by_id.borrow().get(&circuit.id()).map(|c| Rc::ptr_eq(c, circuit)).unwrap_or(false)
    }

    /// Removes a circuit from this netlist. Fails with `NotOwned` if the circuit does not
    /// belong to this netlist. The caller is responsible for having removed or flattened
    /// every instance of it first (see [`Circuit::has_refs`]).
    pub fn remove_circuit(&self, circuit: &Rc<Circuit>) -> Result<()> {
        if !self.owns_circuit(circuit) {
            return Err(NetlistError::NotOwned(format!("circuit '{}' does not belong to this netlist", circuit.name())));
        }
        self.circuits.borrow_mut().retain(|c| !Rc::ptr_eq(c, circuit));
        self.circuit_by_id.borrow_mut().remove(&circuit.id());
        self.circuit_by_name.borrow_mut().remove(&circuit.name());
        if let Some(cell_index) = circuit.cell_index() {
            self.circuit_by_cell_index.borrow_mut().remove(&cell_index);
        }
        self.invalidate_topology();
        Ok(())
    }

    /// Removes a circuit that has just become uninstantiated, as requested by
    /// [`Circuit::blank`]. Equivalent to [`remove_circuit`](Netlist::remove_circuit) except
    /// it silently does nothing if the circuit is already gone or flagged
    /// [`dont_purge`](Circuit::dont_purge).
    pub fn purge_circuit(&self, circuit: &Rc<Circuit>) {
        if circuit.dont_purge() {
            return;
        }
        let _ = self.remove_circuit(circuit);
    }

    /// Marks the child/parent adjacency cache as stale; it is rebuilt on the next call to
    /// [`child_circuits`](Netlist::child_circuits) or [`parent_circuits`](Netlist::parent_circuits).
    pub(super) fn invalidate_topology(&self) {
        log::trace!("invalidating circuit call-graph cache");
        *self.topology.borrow_mut() = None;
    }

    fn ensure_topology(&self) {
        if self.topology.borrow().is_some() {
            return;
        }
        log::debug!("rebuilding circuit call-graph cache ({} circuits)", self.circuits.borrow().len());
        let mut topo = Topology::default();
        for c in self.circuits.borrow().iter() {
            let mut seen = std::collections::HashSet::new();
            for sc in c.subcircuits() {
                if let Some(child) = sc.circuit_ref().upgrade() {
                    if seen.insert(child.id()) {
                        topo.children.entry(c.id()).or_default().push(child.clone());
                        topo.parents.entry(child.id()).or_default().push(c.clone());
                    }
                }
            }
        }
        *self.topology.borrow_mut() = Some(topo);
    }

    /// The ordered-unique list of circuits instantiated (directly) by `circuit`, in order
    /// of first appearance.
    pub fn child_circuits(&self, circuit: &Rc<Circuit>) -> Vec<Rc<Circuit>> {
        self.ensure_topology();
        self.topology.borrow().as_ref().and_then(|t| t.children.get(&circuit.id()).cloned()).unwrap_or_default()
    }

    /// The ordered-unique list of circuits that (directly) instantiate `circuit`, in order
    /// of first appearance.
    pub fn parent_circuits(&self, circuit: &Rc<Circuit>) -> Vec<Rc<Circuit>> {
        self.ensure_topology();
        self.topology.borrow().as_ref().and_then(|t| t.parents.get(&circuit.id()).cloned()).unwrap_or_default()
    }

    // -- Device classes -------------------------------------------------------------------

    /// The device classes owned by this netlist, in insertion order.
    pub fn device_classes(&self) -> Vec<Rc<DeviceClass>> {
        self.device_classes.borrow().clone()
    }

    /// Adds a device class to this netlist.
    pub fn add_device_class(&self, class: Rc<DeviceClass>) {
        self.device_classes.borrow_mut().push(class);
    }

    /// Removes a device class from this netlist, if present.
    pub fn remove_device_class(&self, class: &Rc<DeviceClass>) {
        self.device_classes.borrow_mut().retain(|c| !Rc::ptr_eq(c, class));
    }

    // -- Device abstracts -----------------------------------------------------------------

    /// The device abstracts owned by this netlist, in insertion order.
    pub fn device_abstracts(&self) -> Vec<Rc<DeviceAbstract>> {
        self.device_abstracts.borrow().clone()
    }

    /// Adds a device abstract to this netlist, indexing it by name and cell index if set.
    pub fn add_device_abstract(&self, abstr: Rc<DeviceAbstract>) {
        if let Some(name) = abstr.name() {
            self.device_abstract_by_name.borrow_mut().insert(name, abstr.clone());
        }
        if let Some(cell_index) = abstr.cell_index() {
            self.device_abstract_by_cell_index.borrow_mut().insert(cell_index, abstr.clone());
        }
        self.device_abstracts.borrow_mut().push(abstr);
    }

    /// Removes a device abstract from this netlist, if present.
    pub fn remove_device_abstract(&self, abstr: &Rc<DeviceAbstract>) {
        self.device_abstracts.borrow_mut().retain(|a| !Rc::ptr_eq(a, abstr));
        if let Some(name) = abstr.name() {
            self.device_abstract_by_name.borrow_mut().remove(&name);
        }
        if let Some(cell_index) = abstr.cell_index() {
            self.device_abstract_by_cell_index.borrow_mut().remove(&cell_index);
        }
    }

    /// Looks up a device abstract by name.
    pub fn device_abstract_by_name(&self, name: &str) -> Option<Rc<DeviceAbstract>> {
        self.device_abstract_by_name.borrow().get(name).cloned()
    }

    /// Looks up a device abstract by its linked layout cell index.
    pub fn device_abstract_by_cell_index(&self, cell_index: usize) -> Option<Rc<DeviceAbstract>> {
        self.device_abstract_by_cell_index.borrow().get(&cell_index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_circuit_registers_in_caches() {
        let nl = Netlist::new();
        let c = nl.create_circuit("INV");
        assert!(Rc::ptr_eq(&nl.circuit_by_name("INV").unwrap(), &c));
        assert!(Rc::ptr_eq(&nl.circuit_by_id(c.id()).unwrap(), &c));
    }

    #[test]
    fn rename_circuit_refreshes_name_cache() {
        let nl = Netlist::new();
        let c = nl.create_circuit("OLD");
        nl.rename_circuit(&c, "NEW").unwrap();
        assert!(nl.circuit_by_name("OLD").is_none());
        assert!(Rc::ptr_eq(&nl.circuit_by_name("NEW").unwrap(), &c));
    }

    #[test]
    fn child_parent_topology_reflects_subcircuits() {
        let nl = Netlist::new();
        let top = nl.create_circuit("TOP");
        let sub = nl.create_circuit("SUB");
        top.create_subcircuit(Some("X1".to_string()), &sub);
        assert_eq!(nl.child_circuits(&top).len(), 1);
        assert!(Rc::ptr_eq(&nl.child_circuits(&top)[0], &sub));
        assert_eq!(nl.parent_circuits(&sub).len(), 1);
        assert!(Rc::ptr_eq(&nl.parent_circuits(&sub)[0], &top));
    }

    #[test]
    fn remove_circuit_rejects_foreign_circuit() {
        let nl1 = Netlist::new();
        let nl2 = Netlist::new();
        let c = nl1.create_circuit("A");
        assert!(nl2.remove_circuit(&c).is_err());
    }
}
