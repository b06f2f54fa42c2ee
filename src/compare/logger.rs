// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The domain [`Logger`]: an abstract sink for match, mismatch, and informational events
//! raised while comparing two netlists. Distinct from the crate's own internal diagnostic
//! logging (via the `log` facade), which exists regardless of whether a caller attaches one
//! of these.

use super::super::netlist::device::Device;
use super::super::netlist::net::Net;
use super::super::netlist::subcircuit::SubCircuit;
use std::rc::Rc;

/// Severity of a [`Logger::log_entry`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// No particular severity; informational chatter below `Info`.
    NoSeverity,
    /// Informational: a hint the caller may want to surface, not a defect.
    Info,
    /// Something unexpected happened but comparison continued.
    Warning,
    /// Comparison could not establish the requested fact.
    Error,
}

/// A free-form log entry, carrying enough context for a caller to render or persist it
/// without needing to re-derive it from the comparison internals.
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// The message severity.
    pub severity: Severity,
    /// Human-readable message text.
    pub text: String,
    /// The owning cell/circuit name, if the message is circuit-scoped.
    pub circuit_name: Option<String>,
    /// The net name, if the message is net-scoped.
    pub net_name: Option<String>,
    /// A caller-defined category tag for downstream filtering (e.g. "short-hint").
    pub category: Option<String>,
}

impl LogMessage {
    /// Builds a bare message with the given severity and text; other fields unset.
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        LogMessage { severity, text: text.into(), circuit_name: None, net_name: None, category: None }
    }

    /// Sets the circuit-name field, builder-style.
    pub fn with_circuit(mut self, name: impl Into<String>) -> Self {
        self.circuit_name = Some(name.into());
        self
    }

    /// Sets the net-name field, builder-style.
    pub fn with_net(mut self, name: impl Into<String>) -> Self {
        self.net_name = Some(name.into());
        self
    }

    /// Sets the category field, builder-style.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// An abstract sink for the events the comparison engine raises about the two netlists it
/// is matching. A no-op default is provided for every method so embedders only need to
/// override what they care about.
pub trait Logger {
    /// Two nets were matched (exactly).
    fn match_nets(&self, _a: &Rc<Net>, _b: &Rc<Net>) {}
    /// Two nets were matched, but only as part of an ambiguity group (there was more than
    /// one equally valid pairing).
    fn match_ambiguous_nets(&self, _a: &Rc<Net>, _b: &Rc<Net>) {}
    /// A net on one side could not be matched to a net on the other.
    fn net_mismatch(&self, _a: Option<&Rc<Net>>, _b: Option<&Rc<Net>>) {}
    /// Two devices were found equivalent.
    fn match_devices(&self, _a: &Rc<Device>, _b: &Rc<Device>) {}
    /// Two subcircuit instances were found equivalent.
    fn match_subcircuits(&self, _a: &Rc<SubCircuit>, _b: &Rc<SubCircuit>) {}
    /// A free-form log entry.
    fn log_entry(&self, _message: LogMessage) {}
}

/// A [`Logger`] that discards every event. Used as the default when the caller does not
/// need to observe comparison events, only the final [`CompareResult`](super::CompareResult).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {}
