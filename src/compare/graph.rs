// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Converts a [`Circuit`] into a [`NetGraph`]: one node per net plus a virtual node per kept
//! subcircuit instance, each carrying a canonically-ordered edge list labelled by the
//! device/subcircuit transitions that connect it to its neighbors.

use super::delegates::{CircuitCategorizer, CircuitPinMapper, DeviceCategorizer, DeviceFilter};
use super::super::id::Id;
use super::super::netlist::circuit::Circuit;
use super::super::netlist::device::Device;
use super::super::netlist::net::Net;
use super::super::netlist::subcircuit::SubCircuit;
use std::collections::HashMap;
use std::rc::Rc;

/// One hop out of a [`NetGraphNode`]: either through a device (between two of its
/// terminals) or through a subcircuit instance (between two of its pins, on the referenced
/// circuit's pin-id space, already normalized through a [`CircuitPinMapper`]).
#[derive(Clone)]
pub enum Transition {
    /// A hop through a device, from one terminal to another.
    Device {
        /// The device this transition passes through.
        device: Rc<Device>,
        /// The device's comparison category (never `0`: zero-category devices are dropped
        /// before a transition is built for them).
        category: usize,
        /// The terminal this hop starts from (normalized unless the category is strict).
        from_terminal: usize,
        /// The terminal this hop ends at (normalized unless the category is strict).
        to_terminal: usize,
    },
    /// A hop through a subcircuit instance, from one pin to another (or from a net into the
    /// subcircuit's virtual node, in which case `from`/`to` both name the same pin).
    Subcircuit {
        /// The subcircuit instance this transition passes through.
        subcircuit: Rc<SubCircuit>,
        /// The referenced circuit's comparison category.
        category: usize,
        /// The pin id after pin-swap normalization.
        mapped_pin_id: usize,
        /// The original, unnormalized pin id (kept so the virtual-node lookup for
        /// `expand_subcircuit_nodes` doesn't need a second normalization pass).
        original_pin_id: usize,
    },
}

/// The part of a [`Transition`] that determines whether two transitions (possibly from
/// different graphs, built from different device/subcircuit instances) play the same
/// structural role. Device transitions sort before subcircuit ones.
pub type TransitionKey = (u8, usize, usize, usize);

impl Transition {
    /// The structural key used to decide whether two transitions (possibly from different
    /// graphs) are "the same kind of hop".
    pub fn match_key(&self) -> TransitionKey {
        match self {
            Transition::Device { category, from_terminal, to_terminal, .. } => (0, *category, *from_terminal, *to_terminal),
            Transition::Subcircuit { category, mapped_pin_id, .. } => (1, *category, *mapped_pin_id, 0),
        }
    }

    /// A total order within one graph: the match key, tie-broken by `Rc` identity so
    /// sorting is deterministic without needing cross-graph agreement.
    fn sort_key(&self) -> (TransitionKey, usize) {
        let ptr = match self {
            Transition::Device { device, .. } => Rc::as_ptr(device) as usize,
            Transition::Subcircuit { subcircuit, .. } => Rc::as_ptr(subcircuit) as usize,
        };
        (self.match_key(), ptr)
    }

    /// The device this transition passes through, if it is a device transition.
    pub fn device(&self) -> Option<&Rc<Device>> {
        match self {
            Transition::Device { device, .. } => Some(device),
            _ => None,
        }
    }

    /// The subcircuit this transition passes through, if it is a subcircuit transition.
    pub fn subcircuit(&self) -> Option<&Rc<SubCircuit>> {
        match self {
            Transition::Subcircuit { subcircuit, .. } => Some(subcircuit),
            _ => None,
        }
    }
}

/// One edge out of a [`NetGraphNode`]: the (possibly several, when more than one
/// device/subcircuit hop lands on the same neighbor) transitions that reach `target`,
/// canonically sorted.
#[derive(Clone)]
pub struct Edge {
    /// Index of the target node within the owning [`NetGraph`].
    pub target: usize,
    /// The target net, if the target is a net node (`None` for a subcircuit virtual node).
    pub target_net: Option<Rc<Net>>,
    /// The canonically-sorted transitions that reach `target`.
    pub transitions: Vec<Transition>,
}

impl Edge {
    fn sort_key(&self) -> Vec<(TransitionKey, usize)> {
        self.transitions.iter().map(Transition::sort_key).collect()
    }

    /// The structural key shared by transitions reaching this edge's target, used to group
    /// edges of two different graphs that play the same role.
    pub fn match_key(&self) -> Vec<TransitionKey> {
        self.transitions.iter().map(Transition::match_key).collect()
    }
}

/// One node of a [`NetGraph`]: either a real net, or a virtual node standing in for a
/// subcircuit instance.
pub struct NetGraphNode {
    /// The net this node represents, or `None` for a subcircuit virtual node.
    pub net: Option<Rc<Net>>,
    /// The subcircuit instance this node represents, or `None` for a net node.
    pub subcircuit: Option<Rc<SubCircuit>>,
    /// This node's canonically-sorted outgoing edges.
    pub edges: Vec<Edge>,
    /// A synthetic disambiguator assigned to no-edge net nodes that still carry an outgoing
    /// pin, so two such nodes in the same graph are never silently treated as one
    /// ambiguity-group member just because their edge lists are both empty.
    pub pin_marker: Option<u64>,
}

/// A circuit rendered into comparison-graph form: nodes indexed `[0, num_nets)` for real
/// nets followed by `[num_nets, num_nets + num_subcircuits)` for virtual subcircuit nodes.
pub struct NetGraph {
    /// The nodes, in the index order described above.
    pub nodes: Vec<NetGraphNode>,
    /// Net id to node index.
    pub net_index: HashMap<Id<Net>, usize>,
    /// Subcircuit instance id (scoped to the circuit this graph was built from) to node index.
    pub subcircuit_index: HashMap<u64, usize>,
}

impl NetGraph {
    /// The node index for `net`, if it is part of this graph.
    pub fn index_of_net(&self, net: &Rc<Net>) -> Option<usize> {
        self.net_index.get(&net.id()).copied()
    }

    /// The node index for `subcircuit`'s virtual node, if it is part of this graph.
    pub fn index_of_subcircuit(&self, subcircuit: &Rc<SubCircuit>) -> Option<usize> {
        self.subcircuit_index.get(&subcircuit.id()).copied()
    }
}

enum TargetKey {
    Net(Id<Net>),
    Subcircuit(u64),
}

#[derive(Default)]
struct EdgeAccumulator {
    by_net: HashMap<Id<Net>, (Rc<Net>, Vec<Transition>)>,
    by_subcircuit: HashMap<u64, Vec<Transition>>,
}

impl EdgeAccumulator {
    fn push(&mut self, key: TargetKey, target_net: Option<Rc<Net>>, transition: Transition) {
        match key {
            TargetKey::Net(id) => {
                let entry = self.by_net.entry(id).or_insert_with(|| (target_net.expect("net target needs a net"), Vec::new()));
                entry.1.push(transition);
            }
            TargetKey::Subcircuit(id) => {
                self.by_subcircuit.entry(id).or_default().push(transition);
            }
        }
    }

    fn finalize(self, net_index: &HashMap<Id<Net>, usize>, subcircuit_index: &HashMap<u64, usize>) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.by_net.len() + self.by_subcircuit.len());
        for (net_id, (net, mut transitions)) in self.by_net {
            transitions.sort_by_key(Transition::sort_key);
            edges.push(Edge { target: net_index[&net_id], target_net: Some(net), transitions });
        }
        for (sc_id, mut transitions) in self.by_subcircuit {
            transitions.sort_by_key(Transition::sort_key);
            edges.push(Edge { target: subcircuit_index[&sc_id], target_net: None, transitions });
        }
        edges.sort_by_key(Edge::sort_key);
        edges
    }
}

/// Builds the [`NetGraph`] for `circuit`. `pin_mapper` supplies the pin-swap normalization
/// for subcircuit transitions; it is shared across every circuit being graphed during one
/// [`compare`](super::compare) call so that equivalences discovered while matching a child
/// circuit are visible when its parent is graphed afterwards.
pub fn build_net_graph(
    circuit: &Rc<Circuit>,
    device_categorizer: &dyn DeviceCategorizer,
    circuit_categorizer: &dyn CircuitCategorizer,
    device_filter: &dyn DeviceFilter,
    pin_mapper: &CircuitPinMapper,
) -> NetGraph {
    let nets = circuit.nets();
    let mut net_index = HashMap::with_capacity(nets.len());
    for (i, n) in nets.iter().enumerate() {
        net_index.insert(n.id(), i);
    }

    let kept_subcircuits: Vec<Rc<SubCircuit>> =
        circuit.subcircuits().into_iter().filter(|sc| circuit_categorizer.category_for_subcircuit(sc) != 0).collect();
    let mut subcircuit_index = HashMap::with_capacity(kept_subcircuits.len());
    for (i, sc) in kept_subcircuits.iter().enumerate() {
        subcircuit_index.insert(sc.id(), nets.len() + i);
    }

    let mut nodes: Vec<NetGraphNode> = Vec::with_capacity(nets.len() + kept_subcircuits.len());

    for net in &nets {
        let mut acc = EdgeAccumulator::default();

        for r in net.terminal_refs() {
            let device = match r.device().upgrade() {
                Some(d) => d,
                None => continue,
            };
            if !device_filter.keep(&device) {
                continue;
            }
            let category = device_categorizer.category_for_device(&device);
            if category == 0 {
                continue;
            }
            let class = match device.device_class().upgrade() {
                Some(c) => c,
                None => continue,
            };
            let strict = device_categorizer.is_strict_category(category);
            let from_terminal = r.terminal_id();
            let from_norm = if strict { from_terminal } else { class.normalize_terminal(from_terminal) };
            for other in class.terminals() {
                if other.id == from_terminal {
                    continue;
                }
                let target_net = match device.terminal_net(other.id) {
                    Some(n) => n,
                    None => continue,
                };
                let to_norm = if strict { other.id } else { class.normalize_terminal(other.id) };
                let transition = Transition::Device { device: device.clone(), category, from_terminal: from_norm, to_terminal: to_norm };
                acc.push(TargetKey::Net(target_net.id()), Some(target_net), transition);
            }
        }

        for r in net.subcircuit_pin_refs() {
            let sc = match r.subcircuit().upgrade() {
                Some(sc) => sc,
                None => continue,
            };
            if !subcircuit_index.contains_key(&sc.id()) {
                continue;
            }
            let category = circuit_categorizer.category_for_subcircuit(&sc);
            let referenced = match sc.circuit_ref().upgrade() {
                Some(c) => c,
                None => continue,
            };
            let original_pin_id = r.pin_id();
            let mapped_pin_id = pin_mapper.normalize_pin_id(&referenced, original_pin_id);
            let transition = Transition::Subcircuit { subcircuit: sc.clone(), category, mapped_pin_id, original_pin_id };
            acc.push(TargetKey::Subcircuit(sc.id()), None, transition);
        }

        let edges = acc.finalize(&net_index, &subcircuit_index);
        let pin_marker = if edges.is_empty() && net.num_pins() > 0 { Some(0) } else { None };
        nodes.push(NetGraphNode { net: Some(net.clone()), subcircuit: None, edges, pin_marker });
    }

    for sc in &kept_subcircuits {
        let referenced = sc.circuit_ref().upgrade().expect("subcircuit's referenced circuit was destroyed");
        let category = circuit_categorizer.category_for_subcircuit(sc);
        let mut acc = EdgeAccumulator::default();
        for pin_id in 0..referenced.pin_id_bound() {
            let target_net = match sc.net_for_pin(pin_id) {
                Some(n) => n,
                None => continue,
            };
            let mapped_pin_id = pin_mapper.normalize_pin_id(&referenced, pin_id);
            let transition =
                Transition::Subcircuit { subcircuit: sc.clone(), category, mapped_pin_id, original_pin_id: pin_id };
            acc.push(TargetKey::Net(target_net.id()), Some(target_net), transition);
        }
        let edges = acc.finalize(&net_index, &subcircuit_index);
        nodes.push(NetGraphNode { net: None, subcircuit: Some(sc.clone()), edges, pin_marker: None });
    }

    let mut next_pin_marker = 1u64;
    for node in nodes.iter_mut() {
        if node.pin_marker.is_some() {
            node.pin_marker = Some(next_pin_marker);
            next_pin_marker += 1;
        }
    }

    log::debug!(
        "built net graph for circuit '{}': {} nets, {} subcircuit nodes",
        circuit.name(),
        nets.len(),
        kept_subcircuits.len()
    );

    NetGraph { nodes, net_index, subcircuit_index }
}

/// As a pre-matching step, replaces every edge of `node_index` whose target is a subcircuit
/// virtual node by that virtual node's own edges (excluding the edge that leads back to
/// `node_index`'s net), so the matcher can see through the subcircuit to its other pins.
pub fn expand_subcircuit_nodes(graph: &NetGraph, node_index: usize) -> Vec<Edge> {
    let node = &graph.nodes[node_index];
    let mut expanded = Vec::with_capacity(node.edges.len());
    for edge in &node.edges {
        let target = &graph.nodes[edge.target];
        if target.subcircuit.is_some() {
            for inner in &target.edges {
                if inner.target == node_index {
                    continue;
                }
                expanded.push(inner.clone());
            }
        } else {
            expanded.push(edge.clone());
        }
    }
    expanded.sort_by_key(Edge::sort_key);
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::delegates::{AcceptAllDevices, DefaultCircuitCategorizer, DefaultDeviceCategorizer};
    use crate::netlist::device_class::DeviceClass;
    use crate::netlist::netlist::Netlist;

    #[test]
    fn inverter_graph_has_four_net_nodes_with_device_edges() {
        let nl = Netlist::new();
        let inv = nl.create_circuit("INV");
        let a = inv.add_pin("A");
        let y = inv.add_pin("Y");
        let vdd = inv.add_pin("VDD");
        let vss = inv.add_pin("VSS");

        let na = inv.create_net(Some("A"));
        let ny = inv.create_net(Some("Y"));
        let nvdd = inv.create_net(Some("VDD"));
        let nvss = inv.create_net(Some("VSS"));
        inv.connect_pin(a.id(), Some(&na));
        inv.connect_pin(y.id(), Some(&ny));
        inv.connect_pin(vdd.id(), Some(&nvdd));
        inv.connect_pin(vss.id(), Some(&nvss));

        let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
        nmos.set_terminals_equivalent(1, 2);
        let m1 = inv.create_device(Some("M1".to_string()), &nmos, None);
        m1.connect_terminal(0, Some(&na));
        m1.connect_terminal(1, Some(&ny));
        m1.connect_terminal(2, Some(&nvss));
        m1.connect_terminal(3, Some(&nvss));

        let categorizer = DefaultDeviceCategorizer::new();
        let circuit_categorizer = DefaultCircuitCategorizer::new();
        let filter = AcceptAllDevices;
        let pin_mapper = CircuitPinMapper::new();
        let graph = build_net_graph(&inv, &categorizer, &circuit_categorizer, &filter, &pin_mapper);

        assert_eq!(graph.nodes.len(), 4);
        let a_index = graph.index_of_net(&na).unwrap();
        assert!(!graph.nodes[a_index].edges.is_empty());
    }
}
