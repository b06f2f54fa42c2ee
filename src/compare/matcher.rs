// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backtracking subgraph matcher. Given two [`NetGraph`]s and a seed pairing (typically the
//! two circuits' pin nets, matched by the caller before this is invoked), walks both graphs
//! in lockstep, committing node pairings it can prove are forced and exploring the rest as
//! bounded ambiguity groups.

use super::super::netlist::circuit::Circuit;
use super::super::netlist::device::Device;
use super::super::netlist::net::Net;
use super::super::netlist::subcircuit::SubCircuit;
use super::delegates::CircuitPinMapper;
use super::equivalence::{EquivalenceTracker, MapOutcome};
use super::graph::{expand_subcircuit_nodes, Edge, NetGraph, TransitionKey};
use super::logger::{LogMessage, Logger, Severity};
use super::CompareOptions;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

/// Maximum number of candidate nodes examined per unmatched node during fuzzy analysis.
const MAX_SEARCH: usize = 100;
/// A candidate distance must be at most this fraction of the smaller side's edge count.
const MAX_FUZZY_FACTOR: f64 = 0.25;
/// At most this many fuzzy candidates are reported per unmatched node.
const MAX_FUZZY_COUNT: usize = 3;
/// Only nodes with at most this many edges are considered for the two-way join analysis.
const MAX_EDGES_FOR_SPLIT_ANALYSIS: usize = 3;
/// Nodes with fewer edges than this are skipped by the fuzzy analysis (too ambiguous).
const MIN_EDGES_FOR_FUZZY: usize = 2;

/// The matching state of one graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMapping {
    /// No counterpart established yet.
    Unmapped,
    /// Paired with the node at `index` on the other graph. `exact` records whether the pairing
    /// was confirmed by a non-empty matching net name, as opposed to topology alone.
    Mapped {
        /// Node index on the other graph.
        index: usize,
        /// Whether the pairing was name-confirmed.
        exact: bool,
    },
}

enum UndoEntry {
    MapA(usize, NodeMapping),
    MapB(usize, NodeMapping),
    DeviceEq(Rc<Device>, Rc<Device>),
    SubCircuitEq(Rc<SubCircuit>, Rc<SubCircuit>),
}

/// Mutable matching state shared across one `compare` call between two circuits. Every
/// mapping change is appended to a shared undo log; a [`TentativeNodeMapping`] just
/// remembers where in that log its own scope began.
pub struct MatchState<'a> {
    /// The circuit being matched on the "layout" side.
    pub circuit_a: Rc<Circuit>,
    /// The circuit being matched on the "reference" side.
    pub circuit_b: Rc<Circuit>,
    /// The net graph built from `circuit_a`.
    pub graph_a: &'a NetGraph,
    /// The net graph built from `circuit_b`.
    pub graph_b: &'a NetGraph,
    map_a: RefCell<Vec<NodeMapping>>,
    map_b: RefCell<Vec<NodeMapping>>,
    /// Device equivalences discovered so far, shared across the whole `compare` call.
    pub device_eq: &'a EquivalenceTracker<Device>,
    /// Subcircuit equivalences discovered so far.
    pub sc_eq: &'a EquivalenceTracker<SubCircuit>,
    /// The pin-swap mapper, updated when an ambiguity group resolves pins as interchangeable.
    pub pin_mapper: &'a CircuitPinMapper,
    /// The caller-supplied event sink.
    pub logger: &'a dyn Logger,
    /// Tuning parameters for this comparison.
    pub options: &'a CompareOptions,
    undo_log: RefCell<Vec<UndoEntry>>,
    complexity_warned: Cell<bool>,
}

impl<'a> MatchState<'a> {
    /// Creates matching state for one `(circuit_a, circuit_b)` pair, with every node initially
    /// unmapped.
    pub fn new(
        circuit_a: Rc<Circuit>,
        circuit_b: Rc<Circuit>,
        graph_a: &'a NetGraph,
        graph_b: &'a NetGraph,
        device_eq: &'a EquivalenceTracker<Device>,
        sc_eq: &'a EquivalenceTracker<SubCircuit>,
        pin_mapper: &'a CircuitPinMapper,
        logger: &'a dyn Logger,
        options: &'a CompareOptions,
    ) -> Self {
        MatchState {
            circuit_a,
            circuit_b,
            graph_a,
            graph_b,
            map_a: RefCell::new(vec![NodeMapping::Unmapped; graph_a.nodes.len()]),
            map_b: RefCell::new(vec![NodeMapping::Unmapped; graph_b.nodes.len()]),
            device_eq,
            sc_eq,
            pin_mapper,
            logger,
            options,
            undo_log: RefCell::new(Vec::new()),
            complexity_warned: Cell::new(false),
        }
    }

    /// The current mapping of node `i` on graph A.
    pub fn map_of_a(&self, i: usize) -> NodeMapping {
        self.map_a.borrow()[i]
    }

    /// The current mapping of node `j` on graph B.
    pub fn map_of_b(&self, j: usize) -> NodeMapping {
        self.map_b.borrow()[j]
    }

    fn set_map_a(&self, i: usize, new: NodeMapping) {
        let prev = self.map_a.borrow()[i];
        if prev == new {
            return;
        }
        self.map_a.borrow_mut()[i] = new;
        self.undo_log.borrow_mut().push(UndoEntry::MapA(i, prev));
    }

    fn set_map_b(&self, j: usize, new: NodeMapping) {
        let prev = self.map_b.borrow()[j];
        if prev == new {
            return;
        }
        self.map_b.borrow_mut()[j] = new;
        self.undo_log.borrow_mut().push(UndoEntry::MapB(j, prev));
    }

    /// Commits node `i` (graph A) and `j` (graph B) as a pair.
    pub fn map_pair(&self, i: usize, j: usize, exact: bool) {
        self.set_map_a(i, NodeMapping::Mapped { index: j, exact });
        self.set_map_b(j, NodeMapping::Mapped { index: i, exact });
    }

    /// Records that devices `a` and `b` were found equivalent. Callers check for
    /// `MapOutcome::Conflict` with a previously established equivalence.
    pub fn map_device(&self, a: &Rc<Device>, b: &Rc<Device>) -> MapOutcome {
        let outcome = self.device_eq.map(a, b);
        if outcome == MapOutcome::Mapped {
            self.undo_log.borrow_mut().push(UndoEntry::DeviceEq(a.clone(), b.clone()));
        }
        outcome
    }

    /// Records that subcircuits `a` and `b` were found equivalent. Callers check for
    /// `MapOutcome::Conflict` with a previously established equivalence.
    pub fn map_subcircuit(&self, a: &Rc<SubCircuit>, b: &Rc<SubCircuit>) -> MapOutcome {
        let outcome = self.sc_eq.map(a, b);
        if outcome == MapOutcome::Mapped {
            self.undo_log.borrow_mut().push(UndoEntry::SubCircuitEq(a.clone(), b.clone()));
        }
        outcome
    }

    fn rollback_to(&self, start: usize) {
        let mut log = self.undo_log.borrow_mut();
        while log.len() > start {
            match log.pop().unwrap() {
                UndoEntry::MapA(i, prev) => self.map_a.borrow_mut()[i] = prev,
                UndoEntry::MapB(j, prev) => self.map_b.borrow_mut()[j] = prev,
                UndoEntry::DeviceEq(a, b) => self.device_eq.unmap(&a, &b),
                UndoEntry::SubCircuitEq(a, b) => self.sc_eq.unmap(&a, &b),
            }
        }
    }

    fn warn_complexity_exhausted_once(&self) {
        if !self.complexity_warned.replace(true) {
            self.logger.log_entry(LogMessage::new(Severity::Warning, "comparison complexity bound exceeded; result is best-effort"));
        }
    }

    fn cancelled(&self) -> bool {
        self.options.cancellation_token.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }
}

/// Scoped acquisition guard: records a starting point in the shared undo log on
/// construction and, unless [`clear`](Self::clear) is called, reverts every change made
/// during its lifetime on drop. Nested guards compose correctly because they all share the
/// same log: an inner guard's rollback only ever pops entries pushed after it was created.
pub struct TentativeNodeMapping<'a, 'b> {
    state: &'b MatchState<'a>,
    start: usize,
    committed: Cell<bool>,
}

impl<'a, 'b> TentativeNodeMapping<'a, 'b> {
    /// Opens a new tentative scope.
    pub fn new(state: &'b MatchState<'a>) -> Self {
        TentativeNodeMapping { state, start: state.undo_log.borrow().len(), committed: Cell::new(false) }
    }

    /// Finalizes the tentative state accumulated in this scope: dropping the guard after
    /// this call is a no-op.
    pub fn clear(&self) {
        self.committed.set(true);
    }
}

impl<'a, 'b> Drop for TentativeNodeMapping<'a, 'b> {
    fn drop(&mut self) {
        if !self.committed.get() {
            self.state.rollback_to(self.start);
        }
    }
}

fn net_name(graph: &NetGraph, idx: usize) -> Option<String> {
    graph.nodes[idx].net.as_ref().and_then(Net::name)
}

fn node_net(graph: &NetGraph, idx: usize) -> Option<Rc<Net>> {
    graph.nodes[idx].net.clone()
}

fn group_by_match_key(edges: &[Edge]) -> Vec<(Vec<TransitionKey>, Vec<&Edge>)> {
    let mut groups: Vec<(Vec<TransitionKey>, Vec<&Edge>)> = Vec::new();
    for e in edges {
        let key = e.match_key();
        if let Some(last) = groups.last_mut() {
            if last.0 == key {
                last.1.push(e);
                continue;
            }
        }
        groups.push((key, vec![e]));
    }
    groups
}

/// Checks that two edges converging at a pair of candidate nodes do not contradict any
/// already-established device/subcircuit equivalence: grouped by transition key, the sets
/// of "committed-to" counterparts on each side must match exactly.
pub fn edges_are_compatible(
    state: &MatchState,
    edges_a: &[Edge],
    edges_b: &[Edge],
) -> bool {
    let groups_a = group_by_match_key(edges_a);
    let groups_b = group_by_match_key(edges_b);
    let mut ia = 0;
    let mut ib = 0;
    while ia < groups_a.len() && ib < groups_b.len() {
        match groups_a[ia].0.cmp(&groups_b[ib].0) {
            Ordering::Less => {
                if has_committed(state, &groups_a[ia].1, true) {
                    return false;
                }
                ia += 1;
            }
            Ordering::Greater => {
                if has_committed(state, &groups_b[ib].1, false) {
                    return false;
                }
                ib += 1;
            }
            Ordering::Equal => {
                let mut committed_a: Vec<usize> = groups_a[ia]
                    .1
                    .iter()
                    .flat_map(|e| e.transitions.iter())
                    .filter_map(|t| committed_ptr(state, t, true))
                    .collect();
                let mut committed_b: Vec<usize> = groups_b[ib]
                    .1
                    .iter()
                    .flat_map(|e| e.transitions.iter())
                    .filter_map(|t| committed_ptr(state, t, false))
                    .collect();
                committed_a.sort_unstable();
                committed_b.sort_unstable();
                if committed_a != committed_b {
                    return false;
                }
                ia += 1;
                ib += 1;
            }
        }
    }
    if ia < groups_a.len() && has_committed(state, &groups_a[ia..].iter().flat_map(|g| g.1.clone()).collect::<Vec<_>>(), true) {
        return false;
    }
    if ib < groups_b.len() && has_committed(state, &groups_b[ib..].iter().flat_map(|g| g.1.clone()).collect::<Vec<_>>(), false) {
        return false;
    }
    true
}

fn has_committed(state: &MatchState, edges: &[&Edge], side_a: bool) -> bool {
    edges.iter().flat_map(|e| e.transitions.iter()).any(|t| committed_ptr(state, t, side_a).is_some())
}

fn committed_ptr(state: &MatchState, transition: &super::graph::Transition, side_a: bool) -> Option<usize> {
    if side_a {
        transition.device().and_then(|d| state.device_eq.other_of_a(d)).map(|d| Rc::as_ptr(&d) as usize).or_else(|| {
            transition.subcircuit().and_then(|s| state.sc_eq.other_of_a(s)).map(|s| Rc::as_ptr(&s) as usize)
        })
    } else {
        transition.device().and_then(|d| state.device_eq.other_of_b(d)).map(|d| Rc::as_ptr(&d) as usize).or_else(|| {
            transition.subcircuit().and_then(|s| state.sc_eq.other_of_b(s)).map(|s| Rc::as_ptr(&s) as usize)
        })
    }
}

/// Records device/subcircuit equivalences forced by a pair of converging nodes' edges.
/// Committed (non-tentative) newly-discovered equivalences are reported to the logger.
fn derive_entity_equivalences(state: &MatchState, edges_a: &[Edge], edges_b: &[Edge], tentative: bool) -> bool {
    let groups_a = group_by_match_key(edges_a);
    let groups_b = group_by_match_key(edges_b);
    let mut ia = 0;
    let mut ib = 0;
    while ia < groups_a.len() && ib < groups_b.len() {
        match groups_a[ia].0.cmp(&groups_b[ib].0) {
            Ordering::Less => ia += 1,
            Ordering::Greater => ib += 1,
            Ordering::Equal => {
                let ta: Vec<&super::graph::Transition> = groups_a[ia].1.iter().flat_map(|e| e.transitions.iter()).collect();
                let tb: Vec<&super::graph::Transition> = groups_b[ib].1.iter().flat_map(|e| e.transitions.iter()).collect();
                if ta.len() == 1 && tb.len() == 1 {
                    match (ta[0], tb[0]) {
                        (super::graph::Transition::Device { device: da, .. }, super::graph::Transition::Device { device: db, .. }) => {
                            match state.map_device(da, db) {
                                MapOutcome::Conflict => return false,
                                MapOutcome::Mapped if !tentative => state.logger.match_devices(da, db),
                                _ => {}
                            }
                        }
                        (
                            super::graph::Transition::Subcircuit { subcircuit: sa, .. },
                            super::graph::Transition::Subcircuit { subcircuit: sb, .. },
                        ) => {
                            match state.map_subcircuit(sa, sb) {
                                MapOutcome::Conflict => return false,
                                MapOutcome::Mapped if !tentative => state.logger.match_subcircuits(sa, sb),
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                }
                ia += 1;
                ib += 1;
            }
        }
    }
    true
}

/// Main recursion entry: given that node `i` on graph A is already tentatively paired with
/// node `j` on graph B, propagates that identity outward along their edges. Returns `None`
/// (the `FailedMatch` sentinel) on contradiction, `Some(count)` of newly-paired nodes on
/// success.
pub fn derive_node_identities(state: &MatchState, i: usize, j: usize, depth: usize, n_branch: f64, tentative: bool) -> Option<usize> {
    if state.cancelled() {
        return None;
    }
    if let Some(max_depth) = state.options.max_depth {
        if depth > max_depth {
            state.warn_complexity_exhausted_once();
            return Some(0);
        }
    }

    let edges_a = expand_subcircuit_nodes(state.graph_a, i);
    let edges_b = expand_subcircuit_nodes(state.graph_b, j);

    let groups_a = group_by_match_key(&edges_a);
    let groups_b = group_by_match_key(&edges_b);

    let mut ia = 0;
    let mut ib = 0;
    let mut newly_paired = 0usize;
    while ia < groups_a.len() && ib < groups_b.len() {
        match groups_a[ia].0.cmp(&groups_b[ib].0) {
            Ordering::Less => {
                if tentative {
                    return None;
                }
                ia += 1;
            }
            Ordering::Greater => {
                if tentative {
                    return None;
                }
                ib += 1;
            }
            Ordering::Equal => {
                let targets_a: Vec<usize> = groups_a[ia]
                    .1
                    .iter()
                    .map(|e| e.target)
                    .filter(|&t| state.map_of_a(t) == NodeMapping::Unmapped)
                    .collect();
                let targets_b: Vec<usize> = groups_b[ib]
                    .1
                    .iter()
                    .map(|e| e.target)
                    .filter(|&t| state.map_of_b(t) == NodeMapping::Unmapped)
                    .collect();
                if !targets_a.is_empty() && !targets_b.is_empty() {
                    if tentative && targets_a.len() != targets_b.len() {
                        return None;
                    }
                    match derive_node_identities_from_node_set(state, &targets_a, &targets_b, depth + 1, n_branch, tentative) {
                        Some(n) => newly_paired += n,
                        None => return None,
                    }
                }
                ia += 1;
                ib += 1;
            }
        }
    }
    if tentative && (ia < groups_a.len() || ib < groups_b.len()) {
        return None;
    }
    Some(newly_paired)
}

fn node_shape(graph: &NetGraph, idx: usize) -> Vec<Vec<TransitionKey>> {
    graph.nodes[idx].edges.iter().map(|e| e.match_key()).collect()
}

fn node_sort_tuple(graph: &NetGraph, idx: usize) -> (Vec<Vec<TransitionKey>>, Option<String>, u64) {
    (node_shape(graph, idx), net_name(graph, idx), graph.nodes[idx].pin_marker.unwrap_or(0))
}

/// Resolves a set of target nodes reached by one transition-key group, splitting it into
/// singular matches and bounded ambiguity groups.
fn derive_node_identities_from_node_set(
    state: &MatchState,
    nodes_a: &[usize],
    nodes_b: &[usize],
    depth: usize,
    n_branch: f64,
    tentative: bool,
) -> Option<usize> {
    let mut sorted_a = nodes_a.to_vec();
    let mut sorted_b = nodes_b.to_vec();
    sorted_a.sort_by_key(|&x| node_sort_tuple(state.graph_a, x));
    sorted_b.sort_by_key(|&x| node_sort_tuple(state.graph_b, x));

    let mut ia = 0;
    let mut ib = 0;
    let mut total = 0usize;
    while ia < sorted_a.len() && ib < sorted_b.len() {
        let shape_a = node_shape(state.graph_a, sorted_a[ia]);
        let shape_b = node_shape(state.graph_b, sorted_b[ib]);
        match shape_a.cmp(&shape_b) {
            Ordering::Less => {
                if tentative {
                    return None;
                }
                ia += 1;
            }
            Ordering::Greater => {
                if tentative {
                    return None;
                }
                ib += 1;
            }
            Ordering::Equal => {
                let mut ea = ia + 1;
                while ea < sorted_a.len() && node_shape(state.graph_a, sorted_a[ea]) == shape_a {
                    ea += 1;
                }
                let mut eb = ib + 1;
                while eb < sorted_b.len() && node_shape(state.graph_b, sorted_b[eb]) == shape_b {
                    eb += 1;
                }
                let group_a = &sorted_a[ia..ea];
                let group_b = &sorted_b[ib..eb];
                if group_a.len() == 1 && group_b.len() == 1 {
                    match derive_node_identities_from_singular_match(state, group_a[0], group_b[0], depth, tentative) {
                        Some(n) => total += n,
                        None => return None,
                    }
                } else {
                    let branch = (group_a.len().max(group_b.len())) as f64;
                    let new_n_branch = n_branch * branch;
                    if let Some(max) = state.options.max_n_branch {
                        if new_n_branch > max {
                            state.warn_complexity_exhausted_once();
                            if tentative {
                                return None;
                            }
                            ia = ea;
                            ib = eb;
                            continue;
                        }
                    }
                    match derive_node_identities_from_ambiguity_group(state, group_a, group_b, depth, new_n_branch, tentative) {
                        Some(n) => total += n,
                        None => return None,
                    }
                }
                ia = ea;
                ib = eb;
            }
        }
    }
    if tentative && (ia < sorted_a.len() || ib < sorted_b.len()) {
        return None;
    }
    Some(total)
}

fn derive_node_identities_from_singular_match(state: &MatchState, a: usize, b: usize, depth: usize, tentative: bool) -> Option<usize> {
    let edges_a = expand_subcircuit_nodes(state.graph_a, a);
    let edges_b = expand_subcircuit_nodes(state.graph_b, b);

    if !edges_are_compatible(state, &edges_a, &edges_b) {
        return None;
    }

    let name_a = net_name(state.graph_a, a);
    let name_b = net_name(state.graph_b, b);
    let both_named = matches!((&name_a, &name_b), (Some(x), Some(y)) if !x.is_empty() && !y.is_empty());
    let names_differ = both_named && name_a != name_b;

    if tentative && !state.options.dont_consider_net_names && names_differ {
        return None;
    }

    let exact = !names_differ;

    if !derive_entity_equivalences(state, &edges_a, &edges_b, tentative) {
        return None;
    }

    state.map_pair(a, b, exact);

    let recursed = if state.options.depth_first || tentative {
        derive_node_identities(state, a, b, depth + 1, 1.0, tentative)?
    } else {
        0
    };

    if !tentative {
        if exact {
            if let (Some(na), Some(nb)) = (node_net(state.graph_a, a), node_net(state.graph_b, b)) {
                state.logger.match_nets(&na, &nb);
            }
        } else {
            state.logger.log_entry(
                LogMessage::new(Severity::Warning, "nets matched by topology but names differ")
                    .with_net(name_a.unwrap_or_default()),
            );
        }
    }

    Some(1 + recursed)
}

fn derive_node_identities_from_ambiguity_group(
    state: &MatchState,
    nodes_a: &[usize],
    nodes_b: &[usize],
    depth: usize,
    n_branch: f64,
    tentative: bool,
) -> Option<usize> {
    let mut remaining_b: Vec<usize> = nodes_b.to_vec();
    let mut total = 0usize;
    let mut resolved: Vec<(usize, Vec<usize>, bool)> = Vec::new();

    for &a in nodes_a {
        let edges_a = expand_subcircuit_nodes(state.graph_a, a);
        let name_a = net_name(state.graph_a, a);

        let mut succeeding: Vec<usize> = Vec::new();
        for &b in &remaining_b {
            let edges_b = expand_subcircuit_nodes(state.graph_b, b);
            if !edges_are_compatible(state, &edges_a, &edges_b) {
                continue;
            }
            let exact_name = matches!((&name_a, net_name(state.graph_b, b)), (Some(x), Some(y)) if !x.is_empty() && x == &y);
            if exact_name {
                succeeding.insert(0, b);
                break;
            }
            let guard = TentativeNodeMapping::new(state);
            state.map_pair(a, b, false);
            let ok = derive_node_identities(state, a, b, depth + 1, n_branch, true).is_some();
            drop(guard);
            if ok {
                succeeding.push(b);
                if succeeding.len() >= 2 {
                    break;
                }
            }
        }

        if succeeding.is_empty() {
            if tentative {
                return None;
            }
            continue;
        }

        let chosen = succeeding[0];
        let ambiguous = succeeding.len() > 1;
        if ambiguous && !state.options.with_ambiguous {
            if tentative {
                return None;
            }
            continue;
        }
        if !ambiguous {
            remaining_b.retain(|&b| b != chosen);
        }

        if !derive_entity_equivalences(state, &edges_a, &expand_subcircuit_nodes(state.graph_b, chosen), tentative) {
            if tentative {
                return None;
            }
            continue;
        }
        state.map_pair(a, chosen, !ambiguous);
        let recursed = derive_node_identities(state, a, chosen, depth + 1, n_branch, tentative);
        let recursed = match recursed {
            Some(n) => n,
            None => {
                if tentative {
                    return None;
                }
                0
            }
        };
        total += 1 + recursed;
        resolved.push((a, succeeding, ambiguous));
    }

    if !tentative {
        for (a, candidates, ambiguous) in &resolved {
            let net_a = match node_net(state.graph_a, *a) {
                Some(n) => n,
                None => continue,
            };
            if *ambiguous {
                for &b in candidates {
                    if let Some(net_b) = node_net(state.graph_b, b) {
                        state.logger.match_ambiguous_nets(&net_a, &net_b);
                    }
                }
                if net_a.num_pins() > 0 {
                    let pin_ids: Vec<usize> = net_a.pin_refs().iter().map(|r| r.pin_id()).collect();
                    state.pin_mapper.map_pins(&state.circuit_a, &pin_ids);
                    let mut b_pin_ids = Vec::new();
                    for &b in candidates {
                        if let Some(net_b) = node_net(state.graph_b, b) {
                            b_pin_ids.extend(net_b.pin_refs().iter().map(|r| r.pin_id()));
                        }
                    }
                    if !b_pin_ids.is_empty() {
                        state.pin_mapper.map_pins(&state.circuit_b, &b_pin_ids);
                    }
                }
            } else if let Some(net_b) = node_net(state.graph_b, candidates[0]) {
                state.logger.match_nets(&net_a, &net_b);
            }
        }
    }

    Some(total)
}

fn edge_key_multiset(graph: &NetGraph, idx: usize) -> Vec<Vec<TransitionKey>> {
    let mut v = node_shape(graph, idx);
    v.sort();
    v
}

fn distance(a: &[Vec<TransitionKey>], b: &[Vec<TransitionKey>]) -> usize {
    let mut ia = 0;
    let mut ib = 0;
    let mut d = 0usize;
    while ia < a.len() && ib < b.len() {
        match a[ia].cmp(&b[ib]) {
            Ordering::Equal => {
                ia += 1;
                ib += 1;
            }
            Ordering::Less => {
                d += 1;
                ia += 1;
            }
            Ordering::Greater => {
                d += 1;
                ib += 1;
            }
        }
    }
    d + (a.len() - ia) + (b.len() - ib)
}

fn joined(b1: &[Vec<TransitionKey>], b2: &[Vec<TransitionKey>]) -> Vec<Vec<TransitionKey>> {
    let mut v = b1.to_vec();
    v.extend(b2.iter().cloned());
    v.sort();
    v
}

/// Post-match heuristic: for nodes left unmapped on either side, looks for "close" unmatched
/// counterparts on the other side (by edge-set symmetric difference) and, for small-fanout
/// nodes, for evidence that two reference nets were shorted together on the layout side.
/// Reports findings as [`Severity::Info`] entries; never fails the comparison.
pub fn analyze_failed_matches(state: &MatchState) {
    let unmapped_a: Vec<usize> = (0..state.graph_a.nodes.len())
        .filter(|&i| state.graph_a.nodes[i].net.is_some() && state.map_of_a(i) == NodeMapping::Unmapped)
        .collect();
    let unmapped_b: Vec<usize> = (0..state.graph_b.nodes.len())
        .filter(|&j| state.graph_b.nodes[j].net.is_some() && state.map_of_b(j) == NodeMapping::Unmapped)
        .collect();

    for &a in &unmapped_a {
        if let Some(net_a) = node_net(state.graph_a, a) {
            state.logger.net_mismatch(Some(&net_a), None);
        }
    }
    for &b in &unmapped_b {
        if let Some(net_b) = node_net(state.graph_b, b) {
            state.logger.net_mismatch(None, Some(&net_b));
        }
    }

    for &a in &unmapped_a {
        let ks_a = edge_key_multiset(state.graph_a, a);
        if ks_a.len() < MIN_EDGES_FOR_FUZZY {
            continue;
        }
        let net_a = match node_net(state.graph_a, a) {
            Some(n) => n,
            None => continue,
        };

        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for (searched, &b) in unmapped_b.iter().enumerate() {
            if searched >= MAX_SEARCH {
                break;
            }
            let ks_b = edge_key_multiset(state.graph_b, b);
            if ks_b.len() < MIN_EDGES_FOR_FUZZY {
                continue;
            }
            let d = distance(&ks_a, &ks_b);
            let threshold = (MAX_FUZZY_FACTOR * ks_a.len().min(ks_b.len()) as f64).ceil() as usize;
            if d <= threshold.max(1) {
                candidates.push((b, d));
            }
        }
        candidates.sort_by_key(|&(_, d)| d);
        candidates.truncate(MAX_FUZZY_COUNT);

        if ks_a.len() <= MAX_EDGES_FOR_SPLIT_ANALYSIS {
            'pairs: for i in 0..unmapped_b.len().min(MAX_SEARCH) {
                for j in (i + 1)..unmapped_b.len().min(MAX_SEARCH) {
                    let b1 = unmapped_b[i];
                    let b2 = unmapped_b[j];
                    let ks_b1 = edge_key_multiset(state.graph_b, b1);
                    let ks_b2 = edge_key_multiset(state.graph_b, b2);
                    if ks_b1.len() > MAX_EDGES_FOR_SPLIT_ANALYSIS || ks_b2.len() > MAX_EDGES_FOR_SPLIT_ANALYSIS {
                        continue;
                    }
                    let d = distance(&ks_a, &joined(&ks_b1, &ks_b2));
                    if d <= 1 {
                        if let (Some(nb1), Some(nb2)) = (node_net(state.graph_b, b1), node_net(state.graph_b, b2)) {
                            state.logger.log_entry(
                                LogMessage::new(
                                    Severity::Info,
                                    format!(
                                        "Net {} may be shorting nets {} and {} from reference netlist (fuzziness {})",
                                        net_a.name().unwrap_or_default(),
                                        nb1.name().unwrap_or_default(),
                                        nb2.name().unwrap_or_default(),
                                        d
                                    ),
                                )
                                .with_net(net_a.name().unwrap_or_default()),
                            );
                        }
                        break 'pairs;
                    }
                }
            }
        }

        for (b, d) in candidates {
            if let Some(net_b) = node_net(state.graph_b, b) {
                state.logger.log_entry(
                    LogMessage::new(
                        Severity::Info,
                        format!(
                            "Net {} and {} of reference netlist look similar (fuzziness {})",
                            net_a.name().unwrap_or_default(),
                            net_b.name().unwrap_or_default(),
                            d
                        ),
                    )
                    .with_net(net_a.name().unwrap_or_default()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::graph::NetGraphNode;
    use super::super::logger::NullLogger;
    use crate::netlist::device_class::DeviceClass;
    use crate::netlist::netlist::Netlist;
    use std::collections::HashMap;

    fn singleton_graph(net: Rc<Net>) -> NetGraph {
        let mut net_index = HashMap::new();
        net_index.insert(net.id(), 0);
        let nodes = vec![NetGraphNode { net: Some(net), subcircuit: None, edges: Vec::new(), pin_marker: None }];
        NetGraph { nodes, net_index, subcircuit_index: HashMap::new() }
    }

    /// A [`TentativeNodeMapping`] dropped without [`TentativeNodeMapping::clear`] must leave
    /// node mappings and entity equivalences exactly as they were before the scope opened,
    /// including when the scope is abandoned partway through recording several changes.
    #[test]
    fn dropping_a_tentative_scope_without_clear_reverts_everything() {
        let nl_a = Netlist::new();
        let circuit_a = nl_a.create_circuit("A");
        let na = circuit_a.create_net(Some("A"));
        let nl_b = Netlist::new();
        let circuit_b = nl_b.create_circuit("B");
        let nb = circuit_b.create_net(Some("B"));

        let graph_a = singleton_graph(na);
        let graph_b = singleton_graph(nb);

        let device_eq: EquivalenceTracker<Device> = EquivalenceTracker::new();
        let sc_eq: EquivalenceTracker<SubCircuit> = EquivalenceTracker::new();
        let pin_mapper = CircuitPinMapper::new();
        let options = CompareOptions::default();
        let state = MatchState::new(
            circuit_a.clone(),
            circuit_b.clone(),
            &graph_a,
            &graph_b,
            &device_eq,
            &sc_eq,
            &pin_mapper,
            &NullLogger,
            &options,
        );

        let class = DeviceClass::new("R", &["A", "B"]);
        let da = circuit_a.create_device(None, &class, None);
        let db = circuit_b.create_device(None, &class, None);

        assert_eq!(state.map_of_a(0), NodeMapping::Unmapped);
        assert_eq!(state.map_of_b(0), NodeMapping::Unmapped);

        {
            let guard = TentativeNodeMapping::new(&state);
            state.map_pair(0, 0, true);
            assert_eq!(state.map_device(&da, &db), MapOutcome::Mapped);
            assert_eq!(state.map_of_a(0), NodeMapping::Mapped { index: 0, exact: true });
            assert!(Rc::ptr_eq(&device_eq.other_of_a(&da).unwrap(), &db));
            drop(guard);
        }

        assert_eq!(state.map_of_a(0), NodeMapping::Unmapped, "node mapping must revert once the tentative scope is dropped");
        assert_eq!(state.map_of_b(0), NodeMapping::Unmapped);
        assert!(device_eq.other_of_a(&da).is_none(), "device equivalence recorded inside the scope must be undone too");
    }

    /// Calling [`TentativeNodeMapping::clear`] before drop commits every change the scope
    /// made; a later, unrelated tentative scope must not roll those back.
    #[test]
    fn clearing_a_tentative_scope_keeps_its_changes_through_a_later_rollback() {
        let nl_a = Netlist::new();
        let circuit_a = nl_a.create_circuit("A");
        let na = circuit_a.create_net(Some("A"));
        let nl_b = Netlist::new();
        let circuit_b = nl_b.create_circuit("B");
        let nb = circuit_b.create_net(Some("B"));

        let graph_a = singleton_graph(na);
        let graph_b = singleton_graph(nb);

        let device_eq: EquivalenceTracker<Device> = EquivalenceTracker::new();
        let sc_eq: EquivalenceTracker<SubCircuit> = EquivalenceTracker::new();
        let pin_mapper = CircuitPinMapper::new();
        let options = CompareOptions::default();
        let state = MatchState::new(
            circuit_a.clone(),
            circuit_b.clone(),
            &graph_a,
            &graph_b,
            &device_eq,
            &sc_eq,
            &pin_mapper,
            &NullLogger,
            &options,
        );

        {
            let guard = TentativeNodeMapping::new(&state);
            state.map_pair(0, 0, true);
            guard.clear();
        }
        assert_eq!(state.map_of_a(0), NodeMapping::Mapped { index: 0, exact: true });

        {
            let guard = TentativeNodeMapping::new(&state);
            // A second, abandoned scope must only unwind what it itself recorded.
            drop(guard);
        }
        assert_eq!(state.map_of_a(0), NodeMapping::Mapped { index: 0, exact: true });
    }
}
