// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A `DeviceClass` describes a device type: its terminals, parameters, which terminals are
//! electrically swappable, and whether devices of this class may be merged during
//! `combine_devices`.

use crate::id::Id;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::device::Device;

/// One terminal of a device class, e.g. gate/drain/source/bulk of a MOSFET.
#[derive(Debug, Clone)]
pub struct TerminalDefinition {
    /// Dense id of this terminal within its device class.
    pub id: usize,
    /// Terminal name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// One parameter of a device class, e.g. width/length of a MOSFET.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    /// Dense id of this parameter within its device class.
    pub id: usize,
    /// Parameter name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Value used for devices whose parameter vector does not reach this index.
    pub default_value: f64,
    /// Whether this parameter is one of the class' "primary" (most significant) ones.
    pub is_primary: bool,
    /// SI unit scaling factor applied when the value is read from or written to a
    /// human-facing representation.
    pub si_scale: f64,
    /// Power-of-length scaling exponent (e.g. `1` for a width, `2` for an area), used by
    /// parameter-compare delegates that need to scale tolerances with geometry.
    pub geometry_scaling_exponent: i32,
}

/// Compares the parameter vectors of two devices of the same class, e.g. with a relative
/// tolerance on device width.
pub trait ParameterCompare {
    /// Returns `true` if the two parameter vectors should be considered equal for the
    /// purposes of netlist comparison.
    fn parameters_equal(&self, class: &DeviceClass, a: &[f64], b: &[f64]) -> bool;
}

/// Decides whether, and how, two devices of the same class can be merged into one.
pub trait DeviceCombiner {
    /// Attempts to combine two parallel devices (same terminals on every pin). On success,
    /// `a` absorbs `b` via [`Device::join_device`](super::device::Device::join_device) and
    /// the caller deletes `b`.
    fn combine_parallel(&self, a: &Rc<Device>, b: &Rc<Device>) -> bool;
    /// Attempts to combine two devices in series through a shared internal node. On
    /// success the caller reroutes `a`'s terminal to `b`'s far terminal via
    /// [`Device::reroute_terminal`](super::device::Device::reroute_terminal) and deletes `b`.
    fn combine_serial(&self, a: &Rc<Device>, b: &Rc<Device>, shared_terminal_a: usize, shared_terminal_b: usize) -> bool;
}

/// Describes a device type: its terminals, parameters, terminal-equivalence table, and
/// combination rules.
pub struct DeviceClass {
    id: Id<DeviceClass>,
    name: RefCell<String>,
    description: RefCell<String>,
    strict_terminal_mapping: RefCell<bool>,
    terminals: RefCell<Vec<TerminalDefinition>>,
    parameters: RefCell<Vec<ParameterDefinition>>,
    equivalent_terminal_map: RefCell<HashMap<usize, usize>>,
    supports_parallel_combination: RefCell<bool>,
    supports_serial_combination: RefCell<bool>,
    parameter_compare: RefCell<Option<Rc<dyn ParameterCompare>>>,
    device_combiner: RefCell<Option<Rc<dyn DeviceCombiner>>>,
    primary_class: RefCell<Weak<DeviceClass>>,
}

impl DeviceClass {
    /// Creates a new device class with the given name and ordered terminal definitions.
    /// Terminal ids are assigned densely in the order given.
    pub fn new<S: Into<String>>(name: S, terminal_names: &[&str]) -> Rc<Self> {
        let terminals = terminal_names
            .iter()
            .enumerate()
            .map(|(id, name)| TerminalDefinition { id, name: name.to_string(), description: String::new() })
            .collect();
        Rc::new(DeviceClass {
            id: Id::new(),
            name: RefCell::new(name.into()),
            description: RefCell::new(String::new()),
            strict_terminal_mapping: RefCell::new(false),
            terminals: RefCell::new(terminals),
            parameters: Default::default(),
            equivalent_terminal_map: Default::default(),
            supports_parallel_combination: RefCell::new(false),
            supports_serial_combination: RefCell::new(false),
            parameter_compare: Default::default(),
            device_combiner: Default::default(),
            primary_class: Default::default(),
        })
    }

    /// The class' unique id.
    pub fn id(&self) -> Id<DeviceClass> {
        self.id
    }

    /// The class name.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    /// Renames the class.
    pub fn set_name<S: Into<String>>(&self, name: S) {
        *self.name.borrow_mut() = name.into();
    }

    /// Human-readable description of the device type.
    pub fn description(&self) -> String {
        self.description.borrow().clone()
    }

    /// Sets the description.
    pub fn set_description<S: Into<String>>(&self, description: S) {
        *self.description.borrow_mut() = description.into();
    }

    /// If `true`, terminals are never treated as swappable, even where the
    /// equivalent-terminal map would otherwise allow it.
    pub fn is_strict(&self) -> bool {
        *self.strict_terminal_mapping.borrow()
    }

    /// Sets the strict-terminal-mapping flag.
    pub fn set_strict(&self, strict: bool) {
        *self.strict_terminal_mapping.borrow_mut() = strict;
    }

    /// The ordered terminal definitions.
    pub fn terminals(&self) -> Vec<TerminalDefinition> {
        self.terminals.borrow().clone()
    }

    /// Number of terminals.
    pub fn num_terminals(&self) -> usize {
        self.terminals.borrow().len()
    }

    /// Appends a parameter definition, assigning it the next dense id.
    pub fn add_parameter(&self, name: impl Into<String>, default_value: f64, is_primary: bool) -> usize {
        let mut params = self.parameters.borrow_mut();
        let id = params.len();
        params.push(ParameterDefinition {
            id,
            name: name.into(),
            description: String::new(),
            default_value,
            is_primary,
            si_scale: 1.0,
            geometry_scaling_exponent: 0,
        });
        id
    }

    /// The ordered parameter definitions.
    pub fn parameters(&self) -> Vec<ParameterDefinition> {
        self.parameters.borrow().clone()
    }

    /// The default value a device's parameter vector falls back to beyond its own length.
    pub fn default_value(&self, parameter_id: usize) -> f64 {
        self.parameters.borrow().get(parameter_id).map(|p| p.default_value).unwrap_or(0.0)
    }

    /// Declares that terminal `a` and terminal `b` are electrically swappable (e.g. source
    /// and drain of a symmetric MOSFET). Symmetric: registers both directions, canonicalized
    /// to the smaller terminal id.
    pub fn set_terminals_equivalent(&self, a: usize, b: usize) {
        let canonical = a.min(b);
        let mut map = self.equivalent_terminal_map.borrow_mut();
        map.insert(a, canonical);
        map.insert(b, canonical);
    }

    /// Normalizes a terminal id through the equivalent-terminal map. Returns the terminal
    /// id unchanged if the class is strict or the terminal has no registered equivalent.
    pub fn normalize_terminal(&self, terminal_id: usize) -> usize {
        if self.is_strict() {
            return terminal_id;
        }
        self.equivalent_terminal_map.borrow().get(&terminal_id).copied().unwrap_or(terminal_id)
    }

    /// Whether devices of this class may be merged when wired identically in parallel.
    pub fn supports_parallel_combination(&self) -> bool {
        *self.supports_parallel_combination.borrow()
    }

    /// Sets the parallel-combination-supported flag.
    pub fn set_supports_parallel_combination(&self, supported: bool) {
        *self.supports_parallel_combination.borrow_mut() = supported;
    }

    /// Whether devices of this class may be merged when wired in series through a shared node.
    pub fn supports_serial_combination(&self) -> bool {
        *self.supports_serial_combination.borrow()
    }

    /// Sets the serial-combination-supported flag.
    pub fn set_supports_serial_combination(&self, supported: bool) {
        *self.supports_serial_combination.borrow_mut() = supported;
    }

    /// Installs the parameter-compare delegate.
    pub fn set_parameter_compare(&self, delegate: Rc<dyn ParameterCompare>) {
        *self.parameter_compare.borrow_mut() = Some(delegate);
    }

    /// Compares two parameter vectors using the installed delegate, or exact equality if
    /// none is installed.
    pub fn parameters_equal(&self, a: &[f64], b: &[f64]) -> bool {
        if let Some(delegate) = self.parameter_compare.borrow().as_ref() {
            delegate.parameters_equal(self, a, b)
        } else {
            a == b
        }
    }

    /// Installs the device-combiner delegate.
    pub fn set_device_combiner(&self, combiner: Rc<dyn DeviceCombiner>) {
        *self.device_combiner.borrow_mut() = Some(combiner);
    }

    /// The installed device-combiner delegate, if any.
    pub fn device_combiner(&self) -> Option<Rc<dyn DeviceCombiner>> {
        self.device_combiner.borrow().clone()
    }

    /// Points this class at a "primary" class copy so that comparison can share delegates
    /// across independently-constructed class objects that describe the same device type.
    pub fn set_primary_class(&self, primary: &Rc<DeviceClass>) {
        *self.primary_class.borrow_mut() = Rc::downgrade(primary);
    }

    /// The primary class, or `self`'s own id if none was set. Used within a single circuit
    /// (e.g. [`Circuit::combine_devices`](crate::netlist::circuit::Circuit::combine_devices))
    /// to group devices that share delegates but were built as separate class objects.
    pub fn comparison_identity(&self) -> Id<DeviceClass> {
        self.primary_class.borrow().upgrade().map(|p| p.id).unwrap_or(self.id)
    }

    /// The primary class' name, or `self`'s own name if none was set. Unlike
    /// [`comparison_identity`](Self::comparison_identity), this survives across two
    /// independently-built netlists: their device classes are always distinct Rust objects,
    /// but a comparison engine that correlates by name still recognizes "NMOS" in one
    /// netlist as the same device type as "NMOS" in the other.
    pub fn comparison_name(&self) -> String {
        self.primary_class.borrow().upgrade().map(|p| p.name()).unwrap_or_else(|| self.name())
    }
}

impl fmt::Debug for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceClass").field("id", &self.id).field("name", &self.name()).finish()
    }
}

impl Eq for DeviceClass {}

impl PartialEq for DeviceClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_equivalence_canonicalizes() {
        let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
        nmos.set_terminals_equivalent(1, 2);
        assert_eq!(nmos.normalize_terminal(1), nmos.normalize_terminal(2));
    }

    #[test]
    fn strict_class_ignores_equivalence_map() {
        let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
        nmos.set_terminals_equivalent(1, 2);
        nmos.set_strict(true);
        assert_eq!(nmos.normalize_terminal(1), 1);
        assert_eq!(nmos.normalize_terminal(2), 2);
    }
}
