// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `prelude` helps to import the most commonly used netlist data-model items.

pub use super::circuit::{join_names, Circuit};
pub use super::device::Device;
pub use super::device_abstract::DeviceAbstract;
pub use super::device_class::{DeviceClass, DeviceCombiner, ParameterCompare, ParameterDefinition, TerminalDefinition};
pub use super::net::{Net, NetPinRef, NetSubcircuitPinRef, NetTerminalRef};
pub use super::netlist::{NetlistCallbacks, Netlist};
pub use super::pin::Pin;
pub use super::subcircuit::SubCircuit;
