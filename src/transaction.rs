// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Optional mutation-notification hooks. A caller that wants to observe (or build its own
//! undo/redo or change-propagation layer on top of) every structural edit can attach a
//! [`TransactionObserver`] to a [`Netlist`](crate::netlist::netlist::Netlist); by default
//! none is attached and mutation has no extra cost.

use crate::netlist::circuit::Circuit;
use crate::netlist::device::Device;
use crate::netlist::net::Net;
use crate::netlist::subcircuit::SubCircuit;
use std::rc::Rc;

/// Identifies the kind of mutation being reported to a [`TransactionObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A net was created.
    CreateNet,
    /// A net was removed.
    RemoveNet,
    /// A device was created.
    CreateDevice,
    /// A device was removed.
    RemoveDevice,
    /// A subcircuit instance was created.
    CreateSubCircuit,
    /// A subcircuit instance was removed.
    RemoveSubCircuit,
}

/// The object a [`MutationKind`] mutation applies to.
pub enum MutationObject {
    /// A net.
    Net(Rc<Net>),
    /// A device.
    Device(Rc<Device>),
    /// A subcircuit instance.
    SubCircuit(Rc<SubCircuit>),
}

/// Observes structural mutations of a circuit. Both methods default to no-ops so an
/// embedder only needs to override what it cares about. Implementations must not mutate the
/// circuit they were called about: re-entrant edits during a callback are unsupported (see
/// the concurrency model's single-threaded, non-reentrant mutation policy).
pub trait TransactionObserver {
    /// Called immediately before a mutation of `kind` is applied to `circuit`.
    fn on_before_mutation(&self, _circuit: &Rc<Circuit>, _kind: MutationKind, _object: &MutationObject) {}
    /// Called immediately after a mutation of `kind` was applied to `circuit`.
    fn on_after_mutation(&self, _circuit: &Rc<Circuit>, _kind: MutationKind, _object: &MutationObject) {}
}

/// A [`TransactionObserver`] that does nothing. Used as the implicit default when no
/// observer is attached to a [`Netlist`](crate::netlist::netlist::Netlist).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransactionObserver;

impl TransactionObserver for NullTransactionObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::netlist::Netlist;
    use std::cell::Cell;

    struct CountingObserver {
        before: Cell<usize>,
        after: Cell<usize>,
    }

    impl TransactionObserver for CountingObserver {
        fn on_before_mutation(&self, _circuit: &Rc<Circuit>, _kind: MutationKind, _object: &MutationObject) {
            self.before.set(self.before.get() + 1);
        }
        fn on_after_mutation(&self, _circuit: &Rc<Circuit>, _kind: MutationKind, _object: &MutationObject) {
            self.after.set(self.after.get() + 1);
        }
    }

    #[test]
    fn null_observer_is_a_no_op() {
        let nl = Netlist::new();
        let c = nl.create_circuit("TOP");
        let observer = NullTransactionObserver;
        let net = c.create_net(Some("A"));
        observer.on_before_mutation(&c, MutationKind::CreateNet, &MutationObject::Net(net.clone()));
        observer.on_after_mutation(&c, MutationKind::CreateNet, &MutationObject::Net(net));
    }

    #[test]
    fn counting_observer_tracks_calls_explicitly() {
        let nl = Netlist::new();
        let c = nl.create_circuit("TOP");
        let observer = CountingObserver { before: Cell::new(0), after: Cell::new(0) };
        let net = c.create_net(Some("A"));
        observer.on_before_mutation(&c, MutationKind::CreateNet, &MutationObject::Net(net.clone()));
        observer.on_after_mutation(&c, MutationKind::CreateNet, &MutationObject::Net(net));
        assert_eq!(observer.before.get(), 1);
        assert_eq!(observer.after.get(), 1);
    }
}
