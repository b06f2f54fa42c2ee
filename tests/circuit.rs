// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Data-model invariants: pin density, passive-net purge, flatten semantics.

use libreda_netlist::netlist::prelude::*;

#[test]
fn pin_ids_stay_dense_after_remove_and_join() {
    let nl = Netlist::new();
    let c = nl.create_circuit("C");
    c.add_pin("A");
    let b = c.add_pin("B");
    c.add_pin("D");
    c.remove_pin(b.id());
    // B's slot is a gap until join_pins closes it.
    assert_eq!(c.pin(0).unwrap().name(), "A");
    assert!(c.pin(1).is_none());
    assert_eq!(c.pin(2).unwrap().name(), "D");

    let a = c.pin(0).unwrap();
    let d = c.pin(2).unwrap();
    c.join_pins(a.id(), d.id());
    let active: Vec<usize> = (0..c.pin_id_bound()).filter(|&id| c.pin(id).is_some()).collect();
    assert_eq!(active, (0..active.len()).collect::<Vec<_>>());
}

#[test]
fn purge_nets_removes_only_passive_nets() {
    let nl = Netlist::new();
    let c = nl.create_circuit("C");
    let float = c.create_net(Some("FLOAT"));
    assert!(float.is_passive());

    let pwr_pin = c.add_pin("PWR");
    let pwr = c.create_net(Some("PWR"));
    c.connect_pin(pwr_pin.id(), Some(&pwr));
    assert!(pwr.is_passive());

    c.purge_nets();
    assert!(c.nets().iter().all(|n| n.name().as_deref() != Some("FLOAT")));
    assert!(c.nets().iter().all(|n| n.name().as_deref() != Some("PWR")));
}

#[test]
fn purge_nets_keep_pins_preserves_pin_attached_nets() {
    let nl = Netlist::new();
    let c = nl.create_circuit("C");
    c.create_net(Some("FLOAT"));
    let pwr_pin = c.add_pin("PWR");
    let pwr = c.create_net(Some("PWR"));
    c.connect_pin(pwr_pin.id(), Some(&pwr));

    c.purge_nets_keep_pins();
    assert!(c.nets().iter().all(|n| n.name().as_deref() != Some("FLOAT")));
    assert!(c.nets().iter().any(|n| n.name().as_deref() == Some("PWR")));
}

#[test]
fn flatten_subcircuit_inlines_devices_with_prefixed_names() {
    let nl = Netlist::new();
    let child = nl.create_circuit("BUF");
    let ci = child.add_pin("I");
    let co = child.add_pin("O");
    let ni = child.create_net(Some("I"));
    let no = child.create_net(Some("O"));
    child.connect_pin(ci.id(), Some(&ni));
    child.connect_pin(co.id(), Some(&no));

    let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
    let m1 = child.create_device(Some("M1".to_string()), &nmos, None);
    m1.connect_terminal(0, Some(&ni));
    m1.connect_terminal(1, Some(&no));

    let parent = nl.create_circuit("TOP");
    let a = parent.add_pin("A");
    let b = parent.add_pin("B");
    let na = parent.create_net(Some("A"));
    let nb = parent.create_net(Some("B"));
    parent.connect_pin(a.id(), Some(&na));
    parent.connect_pin(b.id(), Some(&nb));

    let inst = parent.create_subcircuit(Some("u1".to_string()), &child);
    inst.connect_pin(0, Some(&na));
    inst.connect_pin(1, Some(&nb));
    let expanded_name = inst.expanded_name();

    parent.flatten_subcircuit(&inst);

    assert!(parent.subcircuits().iter().all(|s| !std::rc::Rc::ptr_eq(s, &inst)));
    let cloned = parent
        .devices()
        .into_iter()
        .find(|d| d.name().starts_with(&format!("{}.", expanded_name)))
        .expect("flattened device should carry the subcircuit's expanded name as a prefix");
    assert_eq!(cloned.terminal_net(0).unwrap().id(), na.id());
    assert_eq!(cloned.terminal_net(1).unwrap().id(), nb.id());
}

#[test]
fn join_names_is_idempotent() {
    assert_eq!(join_names("a", "b"), join_names("a", &join_names("a", "b")));
    assert_eq!(join_names("", "x"), "x");
    assert_eq!(join_names("x", ""), "x");
    assert_eq!(join_names("x", "x"), "x");
}
