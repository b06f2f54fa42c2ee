// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Interfaces consumed from the environment: categorizers, a device filter, and the
//! circuit-pin-swap mapper. The comparison engine is parametric over these so that callers
//! can encode domain knowledge (e.g. "MOSFETs with the same electrical type are one
//! category regardless of layout variant") without the core needing to know about it.

use super::super::id::Id;
use super::super::netlist::circuit::Circuit;
use super::super::netlist::device::Device;
use super::super::netlist::device_class::DeviceClass;
use super::super::netlist::subcircuit::SubCircuit;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Groups device classes into comparison categories. Category `0` means "ignore devices of
/// this class when building the comparison graph".
pub trait DeviceCategorizer {
    /// The category `device` falls into.
    fn category_for_device(&self, device: &Rc<Device>) -> usize;
    /// Whether devices of `category` are compared "strictly": terminal ids are used raw
    /// instead of normalized through the class' equivalent-terminal map.
    fn is_strict_category(&self, category: usize) -> bool;
}

/// Groups referenced circuits into comparison categories for subcircuit instances. Category
/// `0` means "ignore this subcircuit instance when building the comparison graph".
pub trait CircuitCategorizer {
    /// The category `subcircuit`'s referenced circuit falls into.
    fn category_for_subcircuit(&self, subcircuit: &Rc<SubCircuit>) -> usize;
}

/// Drops noise devices (e.g. zero-valued parasitic resistors) from the comparison graph.
pub trait DeviceFilter {
    /// Returns `false` to exclude `device` from the comparison graph entirely.
    fn keep(&self, device: &Rc<Device>) -> bool;
}

/// The default [`DeviceCategorizer`]: one category per distinct [`DeviceClass::comparison_name`],
/// assigned on first sight; category `0` is never assigned to a real class so it stays
/// reserved for "ignore". Strictness follows [`DeviceClass::is_strict`].
///
/// Categorizing by name rather than by [`Id`](super::super::id::Id) is deliberate: the two
/// circuits passed to [`compare`](super::compare) are almost always parsed or constructed as
/// entirely separate object graphs, so their device classes are never the same Rust object
/// even when they describe the same device type. Matching by name (the primary class' name,
/// if one was installed with [`DeviceClass::set_primary_class`]) is what lets two
/// independently-built netlists line up at all.
#[derive(Default)]
pub struct DefaultDeviceCategorizer {
    categories: RefCell<HashMap<String, usize>>,
    strict: RefCell<HashMap<usize, bool>>,
    next: RefCell<usize>,
}

impl DefaultDeviceCategorizer {
    /// Creates a new, empty categorizer. Category ids are assigned lazily as devices are
    /// categorized.
    pub fn new() -> Self {
        DefaultDeviceCategorizer { categories: Default::default(), strict: Default::default(), next: RefCell::new(1) }
    }

    fn category_for_class(&self, class: &Rc<DeviceClass>) -> usize {
        let key = class.comparison_name();
        if let Some(cat) = self.categories.borrow().get(&key) {
            return *cat;
        }
        let cat = {
            let mut next = self.next.borrow_mut();
            let cat = *next;
            *next += 1;
            cat
        };
        self.categories.borrow_mut().insert(key, cat);
        self.strict.borrow_mut().insert(cat, class.is_strict());
        cat
    }
}

impl DeviceCategorizer for DefaultDeviceCategorizer {
    fn category_for_device(&self, device: &Rc<Device>) -> usize {
        match device.device_class().upgrade() {
            Some(class) => self.category_for_class(&class),
            None => 0,
        }
    }

    fn is_strict_category(&self, category: usize) -> bool {
        self.strict.borrow().get(&category).copied().unwrap_or(false)
    }
}

/// The default [`CircuitCategorizer`]: one category per distinct referenced [`Circuit`] name,
/// assigned on first sight. Named rather than keyed by [`Id`](super::super::id::Id) for the
/// same reason as [`DefaultDeviceCategorizer`]: the two sides of a comparison reference
/// entirely separate circuit object graphs, so a subcircuit's referenced [`Circuit`] in
/// netlist A is never the same Rust object as its counterpart in netlist B.
#[derive(Default)]
pub struct DefaultCircuitCategorizer {
    categories: RefCell<HashMap<String, usize>>,
    next: RefCell<usize>,
}

impl DefaultCircuitCategorizer {
    /// Creates a new, empty categorizer.
    pub fn new() -> Self {
        DefaultCircuitCategorizer { categories: Default::default(), next: RefCell::new(1) }
    }
}

impl CircuitCategorizer for DefaultCircuitCategorizer {
    fn category_for_subcircuit(&self, subcircuit: &Rc<SubCircuit>) -> usize {
        let circuit = match subcircuit.circuit_ref().upgrade() {
            Some(c) => c,
            None => return 0,
        };
        let name = circuit.name();
        if let Some(cat) = self.categories.borrow().get(&name) {
            return *cat;
        }
        let cat = {
            let mut next = self.next.borrow_mut();
            let cat = *next;
            *next += 1;
            cat
        };
        self.categories.borrow_mut().insert(name, cat);
        cat
    }
}

/// A [`DeviceFilter`] that keeps every device.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllDevices;

impl DeviceFilter for AcceptAllDevices {
    fn keep(&self, _device: &Rc<Device>) -> bool {
        true
    }
}

/// Tracks, per circuit, which pins have been discovered to be swap-equivalent during
/// matching (e.g. the four inputs of a symmetric buffer array once an ambiguity group
/// resolves them as interchangeable). Backed by a union-find per circuit, canonicalized to
/// the smallest pin id in each class.
#[derive(Default)]
pub struct CircuitPinMapper {
    parents: RefCell<HashMap<Id<Circuit>, Vec<usize>>>,
}

impl CircuitPinMapper {
    /// Creates a new, empty pin mapper (every pin starts in its own singleton class).
    pub fn new() -> Self {
        CircuitPinMapper { parents: Default::default() }
    }

    fn ensure_len(&self, circuit: &Rc<Circuit>, len: usize) {
        let mut parents = self.parents.borrow_mut();
        let v = parents.entry(circuit.id()).or_default();
        while v.len() < len {
            let id = v.len();
            v.push(id);
        }
    }

    fn find(v: &mut [usize], mut x: usize) -> usize {
        while v[x] != x {
            v[x] = v[v[x]];
            x = v[x];
        }
        x
    }

    /// The canonical pin id for `pin_id` in `circuit`: the smallest pin id known to be
    /// swap-equivalent with it (itself, if none has been registered).
    pub fn normalize_pin_id(&self, circuit: &Rc<Circuit>, pin_id: usize) -> usize {
        if pin_id >= circuit.pin_id_bound() {
            return pin_id;
        }
        self.ensure_len(circuit, circuit.pin_id_bound());
        let mut parents = self.parents.borrow_mut();
        let v = parents.get_mut(&circuit.id()).expect("ensured above");
        Self::find(v, pin_id)
    }

    /// Registers a newly-discovered swap-equivalence between every pin id in `pin_ids`
    /// (all within `circuit`).
    pub fn map_pins(&self, circuit: &Rc<Circuit>, pin_ids: &[usize]) {
        if pin_ids.len() < 2 {
            return;
        }
        self.ensure_len(circuit, circuit.pin_id_bound());
        let mut parents = self.parents.borrow_mut();
        let v = parents.get_mut(&circuit.id()).expect("ensured above");
        let canonical = pin_ids.iter().copied().filter(|&p| p < v.len()).min();
        let canonical = match canonical {
            Some(c) => c,
            None => return,
        };
        for &p in pin_ids {
            if p >= v.len() {
                continue;
            }
            let root = Self::find(v, p);
            let canon_root = Self::find(v, canonical);
            if root != canon_root {
                v[root] = canon_root;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::netlist::Netlist;

    #[test]
    fn pin_mapper_normalizes_after_union() {
        let nl = Netlist::new();
        let c = nl.create_circuit("BUF4");
        for i in 0..4 {
            c.add_pin(format!("IN{}", i));
        }
        let mapper = CircuitPinMapper::new();
        mapper.map_pins(&c, &[0, 1, 2, 3]);
        let roots: Vec<usize> = (0..4).map(|p| mapper.normalize_pin_id(&c, p)).collect();
        assert!(roots.iter().all(|&r| r == roots[0]));
    }

    #[test]
    fn unmapped_pins_stay_singleton() {
        let nl = Netlist::new();
        let c = nl.create_circuit("INV");
        c.add_pin("A");
        c.add_pin("Y");
        let mapper = CircuitPinMapper::new();
        assert_ne!(mapper.normalize_pin_id(&c, 0), mapper.normalize_pin_id(&c, 1));
    }

    #[test]
    fn device_categorizer_matches_same_named_class_from_separate_objects() {
        let nl_a = Netlist::new();
        let circuit_a = nl_a.create_circuit("CELL");
        let nmos_a = DeviceClass::new("NMOS", &["G", "D", "S"]);
        let device_a = circuit_a.create_device(None, &nmos_a, None);

        let nl_b = Netlist::new();
        let circuit_b = nl_b.create_circuit("CELL");
        let nmos_b = DeviceClass::new("NMOS", &["G", "D", "S"]);
        let device_b = circuit_b.create_device(None, &nmos_b, None);

        assert_ne!(nmos_a.comparison_identity(), nmos_b.comparison_identity());

        let categorizer = DefaultDeviceCategorizer::new();
        let cat_a = categorizer.category_for_device(&device_a);
        let cat_b = categorizer.category_for_device(&device_b);
        assert_eq!(cat_a, cat_b, "same-named device classes from separate netlists must share a category");
    }

    #[test]
    fn circuit_categorizer_matches_same_named_circuit_from_separate_netlists() {
        let nl_a = Netlist::new();
        let top_a = nl_a.create_circuit("TOP");
        let child_a = nl_a.create_circuit("BUF");
        let inst_a = top_a.create_subcircuit(None, &child_a);

        let nl_b = Netlist::new();
        let top_b = nl_b.create_circuit("TOP");
        let child_b = nl_b.create_circuit("BUF");
        let inst_b = top_b.create_subcircuit(None, &child_b);

        let categorizer = DefaultCircuitCategorizer::new();
        let cat_a = categorizer.category_for_subcircuit(&inst_a);
        let cat_b = categorizer.category_for_subcircuit(&inst_b);
        assert_eq!(cat_a, cat_b, "same-named referenced circuits from separate netlists must share a category");
    }
}
