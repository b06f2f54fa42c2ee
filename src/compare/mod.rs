// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Graph-isomorphism-based netlist comparison (LVS-style): decides whether two circuits (or
//! two whole netlists, matched hierarchically bottom-up) represent the same topology up to
//! device/terminal/pin equivalences.

pub mod delegates;
pub mod equivalence;
pub mod graph;
pub mod logger;
pub mod matcher;
pub mod prelude;

use self::delegates::{AcceptAllDevices, CircuitPinMapper, DefaultCircuitCategorizer, DefaultDeviceCategorizer};
use self::equivalence::EquivalenceTracker;
use self::graph::build_net_graph;
use self::logger::Logger;
use self::matcher::{analyze_failed_matches, derive_node_identities, MatchState, NodeMapping};
use super::id::Id;
use super::netlist::circuit::Circuit;
use super::netlist::device::Device;
use super::netlist::netlist::Netlist;
use super::netlist::subcircuit::SubCircuit;
use std::collections::HashMap;
use std::rc::Rc;

/// A cooperative cancellation signal consulted at loop boundaries inside the matcher.
pub trait CancellationToken {
    /// Whether comparison should stop at the next checkpoint.
    fn is_cancelled(&self) -> bool;
}

/// Tuning parameters for one [`compare`] call.
pub struct CompareOptions {
    /// Maximum recursion depth. `None` means unlimited.
    pub max_depth: Option<usize>,
    /// Maximum product of branch factors of pending ambiguity groups. `None` means
    /// unlimited.
    pub max_n_branch: Option<f64>,
    /// If true, recurse into a newly committed pairing immediately; if false, finish the
    /// current depth before recursing.
    pub depth_first: bool,
    /// If true, net names are never used as a match tiebreaker.
    pub dont_consider_net_names: bool,
    /// If true, ambiguity groups are accepted (and reported) instead of rejected.
    pub with_ambiguous: bool,
    /// If true, the matcher emits extra `log` facade trace output for its own recursion.
    pub enable_debug_trace: bool,
    /// An optional cooperative cancellation signal.
    pub cancellation_token: Option<Rc<dyn CancellationToken>>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            max_depth: None,
            max_n_branch: None,
            depth_first: true,
            dont_consider_net_names: false,
            with_ambiguous: false,
            enable_debug_trace: false,
            cancellation_token: None,
        }
    }
}

/// Aggregate counters produced by a [`compare`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompareStats {
    /// Number of circuit pairs compared (hierarchically, including the top pair).
    pub circuits_compared: usize,
    /// Number of those pairs found topologically equal.
    pub circuits_matched: usize,
    /// Number of net pairings committed across every compared circuit.
    pub nets_matched: usize,
    /// Number of device pairings committed.
    pub devices_matched: usize,
    /// Number of subcircuit instance pairings committed.
    pub subcircuits_matched: usize,
}

/// The outcome of a [`compare`] call.
pub struct CompareResult {
    /// Whether every compared circuit pair matched, making the two top circuits equivalent.
    pub matched: bool,
    /// Aggregate counters.
    pub stats: CompareStats,
}

/// Compares two circuits (and, recursively, same-named child circuits instantiated below
/// them) for topological equivalence up to device/terminal/pin equivalences. `logger`
/// receives match/mismatch events as they are decided; `options` tunes the search.
///
/// This is the entry point used directly on two circuits already known to correspond to
/// each other (e.g. two cells with the same name in two different netlists). For comparing
/// two whole netlists without knowing which circuits correspond to which, see
/// [`compare_netlists`].
pub fn compare(circuit_a: &Rc<Circuit>, circuit_b: &Rc<Circuit>, logger: &dyn Logger, options: &CompareOptions) -> CompareResult {
    let netlist_a = circuit_a.parent_netlist().upgrade().expect("circuit outlived its netlist");
    let netlist_b = circuit_b.parent_netlist().upgrade().expect("circuit outlived its netlist");

    let device_eq: EquivalenceTracker<Device> = EquivalenceTracker::new();
    let sc_eq: EquivalenceTracker<SubCircuit> = EquivalenceTracker::new();
    let pin_mapper = CircuitPinMapper::new();
    let mut cache: HashMap<(Id<Circuit>, Id<Circuit>), bool> = HashMap::new();
    let mut stats = CompareStats::default();

    log::info!("comparing circuits '{}' and '{}'", circuit_a.name(), circuit_b.name());

    let matched = compare_circuit_pair(
        circuit_a, circuit_b, &netlist_a, &netlist_b, &device_eq, &sc_eq, &pin_mapper, logger, options, &mut cache, &mut stats,
    );

    CompareResult { matched, stats }
}

/// Compares two whole netlists by picking their respective top-level circuits (those with
/// no parent instantiation) and matching same-named ones, falling back to the first
/// top-level circuit on each side if no name correspondence is found.
pub fn compare_netlists(netlist_a: &Rc<Netlist>, netlist_b: &Rc<Netlist>, logger: &dyn Logger, options: &CompareOptions) -> CompareResult {
    let top_a = top_level_circuits(netlist_a);
    let top_b = top_level_circuits(netlist_b);

    let pair = top_a
        .iter()
        .find_map(|a| top_b.iter().find(|b| b.name() == a.name()).map(|b| (a.clone(), b.clone())))
        .or_else(|| match (top_a.first(), top_b.first()) {
            (Some(a), Some(b)) => Some((a.clone(), b.clone())),
            _ => None,
        });

    match pair {
        Some((a, b)) => compare(&a, &b, logger, options),
        None => CompareResult { matched: false, stats: CompareStats::default() },
    }
}

fn top_level_circuits(netlist: &Rc<Netlist>) -> Vec<Rc<Circuit>> {
    netlist.circuits().into_iter().filter(|c| netlist.parent_circuits(c).is_empty()).collect()
}

#[allow(clippy::too_many_arguments)]
fn compare_circuit_pair(
    circuit_a: &Rc<Circuit>,
    circuit_b: &Rc<Circuit>,
    netlist_a: &Rc<Netlist>,
    netlist_b: &Rc<Netlist>,
    device_eq: &EquivalenceTracker<Device>,
    sc_eq: &EquivalenceTracker<SubCircuit>,
    pin_mapper: &CircuitPinMapper,
    logger: &dyn Logger,
    options: &CompareOptions,
    cache: &mut HashMap<(Id<Circuit>, Id<Circuit>), bool>,
    stats: &mut CompareStats,
) -> bool {
    let key = (circuit_a.id(), circuit_b.id());
    if let Some(&cached) = cache.get(&key) {
        return cached;
    }
    // Insert a provisional "matched" entry before recursing so a (mutually) recursive
    // hierarchy (should one ever arise from a malformed input) terminates instead of
    // looping; it is overwritten with the real result below.
    cache.insert(key, true);

    let children_a = netlist_a.child_circuits(circuit_a);
    let children_b = netlist_b.child_circuits(circuit_b);
    for ca in &children_a {
        if let Some(cb) = children_b.iter().find(|cb| cb.name() == ca.name()) {
            compare_circuit_pair(ca, cb, netlist_a, netlist_b, device_eq, sc_eq, pin_mapper, logger, options, cache, stats);
        }
    }

    let device_categorizer = DefaultDeviceCategorizer::new();
    let circuit_categorizer = DefaultCircuitCategorizer::new();
    let filter = AcceptAllDevices;
    let graph_a = build_net_graph(circuit_a, &device_categorizer, &circuit_categorizer, &filter, pin_mapper);
    let graph_b = build_net_graph(circuit_b, &device_categorizer, &circuit_categorizer, &filter, pin_mapper);

    let state = MatchState::new(circuit_a.clone(), circuit_b.clone(), &graph_a, &graph_b, device_eq, sc_eq, pin_mapper, logger, options);

    let devices_before = device_eq.len();
    let subcircuits_before = sc_eq.len();

    let pin_bound = circuit_a.pin_id_bound().min(circuit_b.pin_id_bound());
    for pin_id in 0..pin_bound {
        let net_a = circuit_a.net_for_pin(pin_id);
        let net_b = circuit_b.net_for_pin(pin_id);
        let (na, nb) = match (net_a, net_b) {
            (Some(a), Some(b)) => (a, b),
            _ => continue,
        };
        let ia = match graph_a.index_of_net(&na) {
            Some(i) => i,
            None => continue,
        };
        let ib = match graph_b.index_of_net(&nb) {
            Some(i) => i,
            None => continue,
        };
        if state.map_of_a(ia) != NodeMapping::Unmapped {
            continue;
        }
        state.map_pair(ia, ib, true);
        logger.match_nets(&na, &nb);
        derive_node_identities(&state, ia, ib, 0, 1.0, false);
    }

    let unmapped_a =
        (0..graph_a.nodes.len()).filter(|&i| graph_a.nodes[i].net.is_some() && state.map_of_a(i) == NodeMapping::Unmapped).count();
    let unmapped_b =
        (0..graph_b.nodes.len()).filter(|&j| graph_b.nodes[j].net.is_some() && state.map_of_b(j) == NodeMapping::Unmapped).count();
    let matched = unmapped_a == 0 && unmapped_b == 0;

    if !matched {
        analyze_failed_matches(&state);
    }

    stats.circuits_compared += 1;
    if matched {
        stats.circuits_matched += 1;
    }
    let matched_net_nodes =
        (0..graph_a.nodes.len()).filter(|&i| graph_a.nodes[i].net.is_some() && matches!(state.map_of_a(i), NodeMapping::Mapped { .. })).count();
    stats.nets_matched += matched_net_nodes;
    stats.devices_matched += device_eq.len() - devices_before;
    stats.subcircuits_matched += sc_eq.len() - subcircuits_before;

    cache.insert(key, matched);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::netlist::device_class::DeviceClass;
    use super::logger::NullLogger;

    fn build_inverter(nl: &Rc<Netlist>) -> Rc<Circuit> {
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
        let pmos = DeviceClass::new("PMOS", &["G", "D", "S", "B"]);
        pmos.set_terminals_equivalent(1, 2);

        let m1 = inv.create_device(Some("M1".to_string()), &nmos, None);
        m1.connect_terminal(0, Some(&na));
        m1.connect_terminal(1, Some(&ny));
        m1.connect_terminal(2, Some(&nvss));
        m1.connect_terminal(3, Some(&nvss));

        let m2 = inv.create_device(Some("M2".to_string()), &pmos, None);
        m2.connect_terminal(0, Some(&na));
        m2.connect_terminal(1, Some(&ny));
        m2.connect_terminal(2, Some(&nvdd));
        m2.connect_terminal(3, Some(&nvdd));

        inv
    }

    #[test]
    fn identical_inverters_match() {
        let nl_a = Netlist::new();
        let nl_b = Netlist::new();
        let inv_a = build_inverter(&nl_a);
        let inv_b = build_inverter(&nl_b);

        let options = CompareOptions::default();
        let result = compare(&inv_a, &inv_b, &NullLogger, &options);
        assert!(result.matched);
    }

    #[test]
    fn source_drain_swap_is_tolerated() {
        let nl_a = Netlist::new();
        let nl_b = Netlist::new();
        let inv_a = build_inverter(&nl_a);
        let inv_b = nl_b.create_circuit("INV");
        let a = inv_b.add_pin("A");
        let y = inv_b.add_pin("Y");
        let vdd = inv_b.add_pin("VDD");
        let vss = inv_b.add_pin("VSS");
        let na = inv_b.create_net(Some("A"));
        let ny = inv_b.create_net(Some("Y"));
        let nvdd = inv_b.create_net(Some("VDD"));
        let nvss = inv_b.create_net(Some("VSS"));
        inv_b.connect_pin(a.id(), Some(&na));
        inv_b.connect_pin(y.id(), Some(&ny));
        inv_b.connect_pin(vdd.id(), Some(&nvdd));
        inv_b.connect_pin(vss.id(), Some(&nvss));

        let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
        nmos.set_terminals_equivalent(1, 2);
        let pmos = DeviceClass::new("PMOS", &["G", "D", "S", "B"]);
        pmos.set_terminals_equivalent(1, 2);

        let m1 = inv_b.create_device(Some("M1".to_string()), &nmos, None);
        m1.connect_terminal(0, Some(&na));
        m1.connect_terminal(1, Some(&nvss));
        m1.connect_terminal(2, Some(&ny));
        m1.connect_terminal(3, Some(&nvss));

        let m2 = inv_b.create_device(Some("M2".to_string()), &pmos, None);
        m2.connect_terminal(0, Some(&na));
        m2.connect_terminal(1, Some(&ny));
        m2.connect_terminal(2, Some(&nvdd));
        m2.connect_terminal(3, Some(&nvdd));

        let options = CompareOptions::default();
        let result = compare(&inv_a, &inv_b, &NullLogger, &options);
        assert!(result.matched);
    }
}
