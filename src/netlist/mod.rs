// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hierarchical transistor-level netlist data model: circuits, nets, pins, devices,
//! device classes, device abstracts and subcircuit instances.

pub mod circuit;
pub mod device;
pub mod device_abstract;
pub mod device_class;
pub mod net;
pub mod netlist;
pub mod pin;
pub mod prelude;
pub mod subcircuit;
