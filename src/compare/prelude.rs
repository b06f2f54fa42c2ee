// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `prelude` helps to import the most commonly used comparison-engine items.

pub use super::delegates::{
    AcceptAllDevices, CircuitCategorizer, CircuitPinMapper, DefaultCircuitCategorizer, DefaultDeviceCategorizer, DeviceCategorizer,
    DeviceFilter,
};
pub use super::equivalence::{EquivalenceTracker, MapOutcome};
pub use super::graph::{build_net_graph, Edge, NetGraph, NetGraphNode, Transition};
pub use super::logger::{LogMessage, Logger, NullLogger, Severity};
pub use super::matcher::{edges_are_compatible, MatchState, NodeMapping, TentativeNodeMapping};
pub use super::{compare, compare_netlists, CancellationToken, CompareOptions, CompareResult, CompareStats};
