// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Comparison-engine scenarios that go beyond a single trivial match: a genuine net-level
//! ambiguity group, a short-hint raised through the fuzzy post-match analysis, and matcher
//! symmetry (swapping which side is "layout" and which is "reference" changes nothing but
//! the labels).

use libreda_netlist::compare::prelude::*;
use libreda_netlist::netlist::prelude::*;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Default)]
struct RecordingLogger {
    ambiguous_pairs: RefCell<Vec<(String, String)>>,
    matched_pairs: RefCell<Vec<(String, String)>>,
    matched_devices: RefCell<Vec<(String, String)>>,
    mismatched_nets: RefCell<Vec<(Option<String>, Option<String>)>>,
    entries: RefCell<Vec<LogMessage>>,
}

impl Logger for RecordingLogger {
    fn match_nets(&self, a: &Rc<Net>, b: &Rc<Net>) {
        self.matched_pairs.borrow_mut().push((a.name().unwrap_or_default(), b.name().unwrap_or_default()));
    }

    fn match_ambiguous_nets(&self, a: &Rc<Net>, b: &Rc<Net>) {
        self.ambiguous_pairs.borrow_mut().push((a.name().unwrap_or_default(), b.name().unwrap_or_default()));
    }

    fn net_mismatch(&self, a: Option<&Rc<Net>>, b: Option<&Rc<Net>>) {
        self.mismatched_nets.borrow_mut().push((a.and_then(|n| n.name()), b.and_then(|n| n.name())));
    }

    fn match_devices(&self, a: &Rc<Device>, b: &Rc<Device>) {
        self.matched_devices.borrow_mut().push((a.name().unwrap_or_default(), b.name().unwrap_or_default()));
    }

    fn log_entry(&self, message: LogMessage) {
        self.entries.borrow_mut().push(message);
    }
}

/// A hub net, seeded by a boundary pin, fanning out through a device whose four outer
/// terminals are declared pairwise equivalent to a common terminal, to four unnamed leaf
/// nets (each with its own boundary pin). Because the four terminals are equivalent, the
/// four edges out of the hub form a single ambiguity group: nothing about their structure
/// picks a unique pairing between this circuit's leaves and an identically-shaped peer's.
fn build_symmetric_fanout(nl: &Rc<Netlist>) -> Rc<Circuit> {
    let c = nl.create_circuit("HUBS");
    let root_pin = c.add_pin("ROOT");
    let leaf_pins: Vec<_> = (0..4).map(|i| c.add_pin(format!("IN{}", i))).collect();

    let hub = c.create_net(Some("HUB"));
    c.connect_pin(root_pin.id(), Some(&hub));
    let leaves: Vec<_> = (0..4)
        .map(|i| {
            let leaf = c.create_net::<String>(None);
            c.connect_pin(leaf_pins[i].id(), Some(&leaf));
            leaf
        })
        .collect();

    let fanout = DeviceClass::new("FANOUT", &["C", "T0", "T1", "T2", "T3"]);
    fanout.set_terminals_equivalent(1, 2);
    fanout.set_terminals_equivalent(1, 3);
    fanout.set_terminals_equivalent(1, 4);
    let f = c.create_device(Some("F".to_string()), &fanout, None);
    f.connect_terminal(0, Some(&hub));
    for (i, leaf) in leaves.iter().enumerate() {
        f.connect_terminal(i + 1, Some(leaf));
    }

    c
}

fn build_trivial_inverter(nl: &Rc<Netlist>) -> Rc<Circuit> {
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
fn trivial_inverter_match_emits_the_full_expected_event_stream() {
    let nl_a = Netlist::new();
    let a = build_trivial_inverter(&nl_a);
    let nl_b = Netlist::new();
    let b = build_trivial_inverter(&nl_b);

    let options = CompareOptions::default();
    let logger = RecordingLogger::default();
    let result = compare(&a, &b, &logger, &options);

    assert!(result.matched);
    assert!(logger.mismatched_nets.borrow().is_empty());

    let matched_nets: HashSet<(String, String)> = logger.matched_pairs.borrow().iter().cloned().collect();
    let expected_nets: HashSet<(String, String)> = [("A", "A"), ("Y", "Y"), ("VDD", "VDD"), ("VSS", "VSS")]
        .iter()
        .map(|(x, y)| (x.to_string(), y.to_string()))
        .collect();
    assert_eq!(matched_nets, expected_nets);

    let matched_devices: HashSet<(String, String)> = logger.matched_devices.borrow().iter().cloned().collect();
    let expected_devices: HashSet<(String, String)> =
        [("M1", "M1"), ("M2", "M2")].iter().map(|(x, y)| (x.to_string(), y.to_string())).collect();
    assert_eq!(matched_devices, expected_devices);

    assert_eq!(result.stats.nets_matched, 4);
    assert_eq!(result.stats.devices_matched, 2);
}

#[test]
fn symmetric_fanout_matches_through_a_genuine_ambiguity_group() {
    let nl_a = Netlist::new();
    let a = build_symmetric_fanout(&nl_a);
    let nl_b = Netlist::new();
    let b = build_symmetric_fanout(&nl_b);

    let options = CompareOptions { with_ambiguous: true, dont_consider_net_names: true, ..CompareOptions::default() };
    let logger = RecordingLogger::default();
    let result = compare(&a, &b, &logger, &options);

    assert!(result.matched, "a circuit symmetric under its own terminal-equivalence map must match its twin");
    assert!(
        !logger.ambiguous_pairs.borrow().is_empty(),
        "the four interchangeable leaf nets must be resolved through the ambiguity-group path, not an exact pairing"
    );
}

#[test]
fn without_with_ambiguous_the_same_fanout_is_rejected() {
    let nl_a = Netlist::new();
    let a = build_symmetric_fanout(&nl_a);
    let nl_b = Netlist::new();
    let b = build_symmetric_fanout(&nl_b);

    let options = CompareOptions { with_ambiguous: false, dont_consider_net_names: true, ..CompareOptions::default() };
    let result = compare(&a, &b, &NullLogger, &options);

    assert!(!result.matched, "an unresolved ambiguity group must not be silently accepted when with_ambiguous is false");
}

/// Two pairs of identical two-terminal devices are, on one side, kept apart by separate
/// internal nets, and on the other, tied together onto a single net -- modeling two nets
/// shorted together on the "layout" (first) side relative to the "reference" (second) side.
#[test]
fn shorted_net_is_reported_with_the_exact_fuzzy_hint_wording() {
    let two_terminal = DeviceClass::new("R2", &["P0", "P1"]);

    let nl_a = Netlist::new();
    let a = nl_a.create_circuit("TOP");
    let z = a.create_net(Some("Z"));
    let n1 = a.create_net(Some("N1"));
    let n2 = a.create_net(Some("N2"));
    let d1 = a.create_device(Some("D1".to_string()), &two_terminal, None);
    d1.connect_terminal(0, Some(&z));
    d1.connect_terminal(1, Some(&n1));
    let d2 = a.create_device(Some("D2".to_string()), &two_terminal, None);
    d2.connect_terminal(0, Some(&z));
    d2.connect_terminal(1, Some(&n2));

    let two_terminal_b = DeviceClass::new("R2", &["P0", "P1"]);
    let nl_b = Netlist::new();
    let b = nl_b.create_circuit("TOP");
    let x = b.create_net(Some("X"));
    let y = b.create_net(Some("Y"));
    let n3 = b.create_net(Some("N3"));
    let n4 = b.create_net(Some("N4"));
    let d3 = b.create_device(Some("D3".to_string()), &two_terminal_b, None);
    d3.connect_terminal(0, Some(&x));
    d3.connect_terminal(1, Some(&n3));
    let d4 = b.create_device(Some("D4".to_string()), &two_terminal_b, None);
    d4.connect_terminal(0, Some(&y));
    d4.connect_terminal(1, Some(&n4));

    let options = CompareOptions::default();
    let logger = RecordingLogger::default();
    let result = compare(&a, &b, &logger, &options);

    assert!(!result.matched, "a net shorting two reference nets together must not be reported as a match");

    let entries = logger.entries.borrow();
    let hint = entries
        .iter()
        .find(|m| m.severity == Severity::Info && m.text.contains("may be shorting"))
        .unwrap_or_else(|| panic!("expected a shorting hint, got: {:#?}", entries.iter().map(|m| &m.text).collect::<Vec<_>>()));
    assert_eq!(hint.text, "Net Z may be shorting nets X and Y from reference netlist (fuzziness 0)");
}

#[test]
fn matching_is_symmetric_in_which_side_is_which() {
    let nmos_class = |name: &str| {
        let class = DeviceClass::new(name, &["G", "D", "S", "B"]);
        class.set_terminals_equivalent(1, 2);
        class
    };
    let build = |nl: &Rc<Netlist>| {
        let c = nl.create_circuit("INV");
        let pa = c.add_pin("A");
        let py = c.add_pin("Y");
        let na = c.create_net(Some("A"));
        let ny = c.create_net(Some("Y"));
        c.connect_pin(pa.id(), Some(&na));
        c.connect_pin(py.id(), Some(&ny));
        let nmos = nmos_class("NMOS");
        let m = c.create_device(Some("M1".to_string()), &nmos, None);
        m.connect_terminal(0, Some(&na));
        m.connect_terminal(1, Some(&ny));
        m.connect_terminal(2, Some(&ny));
        m.connect_terminal(3, Some(&ny));
        c
    };

    let nl_a = Netlist::new();
    let a = build(&nl_a);
    let nl_b = Netlist::new();
    let b = build(&nl_b);

    let options = CompareOptions::default();
    let logger_ab = RecordingLogger::default();
    let result_ab = compare(&a, &b, &logger_ab, &options);
    let logger_ba = RecordingLogger::default();
    let result_ba = compare(&b, &a, &logger_ba, &options);

    assert_eq!(result_ab.matched, result_ba.matched);
    assert!(result_ab.matched);

    let forward: HashSet<(String, String)> = logger_ab.matched_pairs.borrow().iter().cloned().collect();
    let backward: HashSet<(String, String)> = logger_ba.matched_pairs.borrow().iter().map(|(x, y)| (y.clone(), x.clone())).collect();
    assert_eq!(forward, backward, "swapping the two sides must swap every matched-net pair, not change which nets match");
}
