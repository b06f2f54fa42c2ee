// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Device-combination invariants: parallel merging of identically-wired devices, with a
//! parameter-compare delegate tolerant of small differences, followed by a comparison
//! against a netlist that already models the combined device.

use libreda_netlist::compare::prelude::*;
use libreda_netlist::netlist::prelude::*;
use std::rc::Rc;

const WIDTH: usize = 0;

struct RelativeToleranceWidth {
    tolerance: f64,
}

impl ParameterCompare for RelativeToleranceWidth {
    fn parameters_equal(&self, _class: &DeviceClass, a: &[f64], b: &[f64]) -> bool {
        let wa = a.get(WIDTH).copied().unwrap_or(0.0);
        let wb = b.get(WIDTH).copied().unwrap_or(0.0);
        let scale = wa.abs().max(wb.abs()).max(1.0);
        (wa - wb).abs() <= self.tolerance * scale
    }
}

struct SumWidths;

impl DeviceCombiner for SumWidths {
    fn combine_parallel(&self, a: &Rc<Device>, b: &Rc<Device>) -> bool {
        let combined = a.parameter(WIDTH) + b.parameter(WIDTH);
        a.set_parameter(WIDTH, combined);
        true
    }

    fn combine_serial(&self, _a: &Rc<Device>, _b: &Rc<Device>, _shared_terminal_a: usize, _shared_terminal_b: usize) -> bool {
        false
    }
}

fn nmos_class() -> Rc<DeviceClass> {
    let nmos = DeviceClass::new("NMOS", &["G", "D", "S", "B"]);
    nmos.set_terminals_equivalent(1, 2);
    nmos.add_parameter("W", 1.0, true);
    nmos.set_supports_parallel_combination(true);
    nmos.set_parameter_compare(Rc::new(RelativeToleranceWidth { tolerance: 1e-6 }));
    nmos.set_device_combiner(Rc::new(SumWidths));
    nmos
}

#[test]
fn two_parallel_devices_combine_into_one_matching_a_double_width_reference() {
    let nl_a = Netlist::new();
    let a = nl_a.create_circuit("CELL");
    let pa = a.add_pin("A");
    let py = a.add_pin("Y");
    let na = a.create_net(Some("A"));
    let ny = a.create_net(Some("Y"));
    a.connect_pin(pa.id(), Some(&na));
    a.connect_pin(py.id(), Some(&ny));

    let nmos_a = nmos_class();
    let m1 = a.create_device(Some("M1".to_string()), &nmos_a, None);
    m1.set_parameter(WIDTH, 1.0);
    m1.connect_terminal(0, Some(&na));
    m1.connect_terminal(1, Some(&ny));
    m1.connect_terminal(2, Some(&ny));
    m1.connect_terminal(3, Some(&ny));

    let m2 = a.create_device(Some("M2".to_string()), &nmos_a, None);
    m2.set_parameter(WIDTH, 1.0);
    m2.connect_terminal(0, Some(&na));
    m2.connect_terminal(1, Some(&ny));
    m2.connect_terminal(2, Some(&ny));
    m2.connect_terminal(3, Some(&ny));

    assert_eq!(a.devices().len(), 2);
    a.combine_devices();
    assert_eq!(a.devices().len(), 1);
    assert!((a.devices()[0].parameter(WIDTH) - 2.0).abs() < 1e-9);

    let nl_b = Netlist::new();
    let b = nl_b.create_circuit("CELL");
    let pb_a = b.add_pin("A");
    let pb_y = b.add_pin("Y");
    let nb_a = b.create_net(Some("A"));
    let nb_y = b.create_net(Some("Y"));
    b.connect_pin(pb_a.id(), Some(&nb_a));
    b.connect_pin(pb_y.id(), Some(&nb_y));

    let nmos_b = nmos_class();
    let m = b.create_device(Some("M".to_string()), &nmos_b, None);
    m.set_parameter(WIDTH, 2.0);
    m.connect_terminal(0, Some(&nb_a));
    m.connect_terminal(1, Some(&nb_y));
    m.connect_terminal(2, Some(&nb_y));
    m.connect_terminal(3, Some(&nb_y));

    let options = CompareOptions::default();
    let result = compare(&a, &b, &NullLogger, &options);
    assert!(result.matched);
}

#[test]
fn combine_devices_never_increases_device_count() {
    let nl = Netlist::new();
    let c = nl.create_circuit("CELL");
    let pa = c.add_pin("A");
    let py = c.add_pin("Y");
    let na = c.create_net(Some("A"));
    let ny = c.create_net(Some("Y"));
    c.connect_pin(pa.id(), Some(&na));
    c.connect_pin(py.id(), Some(&ny));

    let nmos = nmos_class();
    let m1 = c.create_device(Some("M1".to_string()), &nmos, None);
    m1.connect_terminal(0, Some(&na));
    m1.connect_terminal(1, Some(&ny));
    m1.connect_terminal(2, Some(&ny));
    m1.connect_terminal(3, Some(&ny));

    let before = c.devices().len();
    c.combine_devices();
    assert!(c.devices().len() <= before);
}
