//! The mutable surface handed to propagators.
//!
//! A [`PropagationContext`] borrows everything a cost function may touch
//! during propagation (the store, the variable arena, the queues, the
//! listeners) except the cost functions themselves, so that the fixpoint loop
//! can hold a cost function and a context at the same time.

use enumset::enum_set;
use enumset::EnumSet;

use crate::basic_types::saturating_add;
use crate::basic_types::Contradiction;
use crate::basic_types::Cost;
use crate::basic_types::PropagationStatus;
use crate::calabash_assert_moderate;
use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::engine::queues::PropagationQueues;
use crate::engine::variable::Domain;
use crate::engine::DomainEvent;
use crate::engine::DomainListener;
use crate::engine::Variable;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

/// Read-only view of the store and the domains, for support computations.
#[derive(Clone, Copy)]
pub(crate) struct DomainView<'a> {
    pub(crate) store: &'a Store,
    pub(crate) variables: &'a KeyedVec<VariableId, Variable>,
}

impl<'a> DomainView<'a> {
    pub(crate) fn variable(&self, variable: VariableId) -> &'a Variable {
        &self.variables[variable]
    }
}

pub(crate) struct PropagationContext<'a> {
    pub(crate) store: &'a mut Store,
    pub(crate) variables: &'a KeyedVec<VariableId, Variable>,
    pub(crate) queues: &'a mut PropagationQueues,
    pub(crate) listeners: &'a mut Vec<Box<dyn DomainListener>>,
    pub(crate) problem_id: u32,
    pub(crate) lb: StateInt,
    pub(crate) ub: Cost,
    pub(crate) nary_projection_threshold: usize,
}

impl PropagationContext<'_> {
    pub(crate) fn view(&self) -> DomainView<'_> {
        DomainView {
            store: self.store,
            variables: self.variables,
        }
    }

    pub(crate) fn lb(&self) -> Cost {
        self.store.get(self.lb)
    }

    pub(crate) fn ub(&self) -> Cost {
        self.ub
    }

    /// Whether a cost on top of the current lower bound crosses the bound.
    pub(crate) fn cutoff(&self, cost: Cost) -> bool {
        saturating_add(self.lb(), cost) >= self.ub
    }

    /// Shift `delta` into the lower bound (the `project0` EPT target) and
    /// requeue node consistency everywhere.
    pub(crate) fn increase_lb(&mut self, delta: Cost) -> PropagationStatus {
        calabash_assert_simple!(delta >= 0);
        if delta == 0 {
            return Ok(());
        }
        let lb = saturating_add(self.store.get(self.lb), delta);
        self.store.set(self.lb, lb);
        let variables = self.variables;
        for variable in variables.keys() {
            self.queues.nc.push(variable);
        }
        if lb >= self.ub {
            Err(Contradiction)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, variable: VariableId, events: EnumSet<DomainEvent>) {
        for listener in self.listeners.iter_mut() {
            for event in events {
                listener.on_event(self.problem_id, variable, event);
            }
        }
    }

    fn enqueue_change(&mut self, variable: VariableId, assigned: bool) {
        let variables = self.variables;
        self.queues.nc.push(variable);
        self.queues.ac.push(variable);
        self.queues.dac.push(variable);
        self.queues.dee.push(variable);
        self.queues.eac.push(variable);
        for &neighbour in &variables[variable].neighbours {
            self.queues.eac.push(neighbour);
        }
        if assigned {
            self.queues.assigned.push(variable);
        }
    }

    /// Remove a single value from an enumerated domain.
    pub(crate) fn remove(&mut self, variable: VariableId, value: usize) -> PropagationStatus {
        let variables = self.variables;
        let domain = variables[variable].enumerated();
        if self.store.get(domain.present[value]) == 0 {
            return Ok(());
        }
        if self.store.get(domain.size) == 1 {
            return Err(Contradiction);
        }

        self.store.set(domain.present[value], 0);
        self.store.add(domain.size, -1);

        let mut events = enum_set!(DomainEvent::Removal);
        let min = self.store.get(domain.min);
        let max = self.store.get(domain.max);
        if value as i64 == min {
            let new_min = (value + 1..=max as usize)
                .find(|&v| self.store.get(domain.present[v]) != 0)
                .expect("a non-singleton domain has a present value above its old minimum");
            self.store.set(domain.min, new_min as i64);
            events |= DomainEvent::LowerBound;
        }
        if value as i64 == max {
            let new_max = (min as usize..value)
                .rev()
                .find(|&v| self.store.get(domain.present[v]) != 0)
                .expect("a non-singleton domain has a present value below its old maximum");
            self.store.set(domain.max, new_max as i64);
            events |= DomainEvent::UpperBound;
        }

        let assigned = self.store.get(domain.size) == 1;
        if assigned {
            events |= DomainEvent::Assign;
        }
        self.notify(variable, events);
        self.enqueue_change(variable, assigned);
        Ok(())
    }

    /// Reduce a domain to the single value `value`.
    pub(crate) fn assign(&mut self, variable: VariableId, value: i64) -> PropagationStatus {
        let variables = self.variables;
        match &variables[variable].domain {
            Domain::Enumerated(domain) => {
                if !variables[variable].contains(self.store, value) {
                    return Err(Contradiction);
                }
                if self.store.get(domain.size) == 1 {
                    return Ok(());
                }
                let min = self.store.get(domain.min) as usize;
                let max = self.store.get(domain.max) as usize;
                for v in min..=max {
                    if v as i64 != value && self.store.get(domain.present[v]) != 0 {
                        self.store.set(domain.present[v], 0);
                    }
                }
                self.store.set(domain.size, 1);
                self.store.set(domain.min, value);
                self.store.set(domain.max, value);
                self.notify(variable, enum_set!(DomainEvent::Assign));
                self.enqueue_change(variable, true);
                Ok(())
            }
            Domain::Interval(domain) => {
                if value < self.store.get(domain.inf) || value > self.store.get(domain.sup) {
                    return Err(Contradiction);
                }
                if self.store.get(domain.inf) == self.store.get(domain.sup) {
                    return Ok(());
                }
                self.store.set(domain.inf, value);
                self.store.set(domain.sup, value);
                self.notify(variable, enum_set!(DomainEvent::Assign));
                self.queues.assigned.push(variable);
                Ok(())
            }
        }
    }

    /// Raise the domain minimum to at least `bound`.
    pub(crate) fn increase(&mut self, variable: VariableId, bound: i64) -> PropagationStatus {
        let variables = self.variables;
        match &variables[variable].domain {
            Domain::Enumerated(domain) => {
                let min = self.store.get(domain.min);
                let max = self.store.get(domain.max);
                if bound <= min {
                    return Ok(());
                }
                if bound > max {
                    return Err(Contradiction);
                }
                for v in min as usize..bound as usize {
                    if self.store.get(domain.present[v]) != 0 {
                        self.store.set(domain.present[v], 0);
                        self.store.add(domain.size, -1);
                    }
                }
                let new_min = (bound as usize..=max as usize)
                    .find(|&v| self.store.get(domain.present[v]) != 0)
                    .expect("the maximum is present");
                self.store.set(domain.min, new_min as i64);

                let assigned = self.store.get(domain.size) == 1;
                let mut events = enum_set!(DomainEvent::Removal | DomainEvent::LowerBound);
                if assigned {
                    events |= DomainEvent::Assign;
                }
                self.notify(variable, events);
                self.enqueue_change(variable, assigned);
                Ok(())
            }
            Domain::Interval(domain) => {
                if bound <= self.store.get(domain.inf) {
                    return Ok(());
                }
                if bound > self.store.get(domain.sup) {
                    return Err(Contradiction);
                }
                self.store.set(domain.inf, bound);
                let assigned = self.store.get(domain.inf) == self.store.get(domain.sup);
                let mut events = enum_set!(DomainEvent::LowerBound);
                if assigned {
                    events |= DomainEvent::Assign;
                }
                self.notify(variable, events);
                if assigned {
                    self.queues.assigned.push(variable);
                }
                Ok(())
            }
        }
    }

    /// Lower the domain maximum to at most `bound`.
    pub(crate) fn decrease(&mut self, variable: VariableId, bound: i64) -> PropagationStatus {
        let variables = self.variables;
        match &variables[variable].domain {
            Domain::Enumerated(domain) => {
                let min = self.store.get(domain.min);
                let max = self.store.get(domain.max);
                if bound >= max {
                    return Ok(());
                }
                if bound < min {
                    return Err(Contradiction);
                }
                for v in (bound + 1) as usize..=max as usize {
                    if self.store.get(domain.present[v]) != 0 {
                        self.store.set(domain.present[v], 0);
                        self.store.add(domain.size, -1);
                    }
                }
                let new_max = (min as usize..=bound as usize)
                    .rev()
                    .find(|&v| self.store.get(domain.present[v]) != 0)
                    .expect("the minimum is present");
                self.store.set(domain.max, new_max as i64);

                let assigned = self.store.get(domain.size) == 1;
                let mut events = enum_set!(DomainEvent::Removal | DomainEvent::UpperBound);
                if assigned {
                    events |= DomainEvent::Assign;
                }
                self.notify(variable, events);
                self.enqueue_change(variable, assigned);
                Ok(())
            }
            Domain::Interval(domain) => {
                if bound >= self.store.get(domain.sup) {
                    return Ok(());
                }
                if bound < self.store.get(domain.inf) {
                    return Err(Contradiction);
                }
                self.store.set(domain.sup, bound);
                let assigned = self.store.get(domain.inf) == self.store.get(domain.sup);
                let mut events = enum_set!(DomainEvent::UpperBound);
                if assigned {
                    events |= DomainEvent::Assign;
                }
                self.notify(variable, events);
                if assigned {
                    self.queues.assigned.push(variable);
                }
                Ok(())
            }
        }
    }

    /// Shift `delta` into the unary cost of `(variable, value)`. A negative
    /// `delta` is an extension drawing cost out of the unary; no unary cost
    /// may drop below zero.
    pub(crate) fn project_unary(&mut self, variable: VariableId, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        let variables = self.variables;
        let slot = variables[variable].enumerated().unary[value];
        let updated = saturating_add(self.store.get(slot), delta);
        calabash_assert_moderate!(
            updated >= 0,
            "cost transfers never drive a unary cost negative"
        );
        self.store.set(slot, updated);
        if delta > 0 {
            self.queues.nc.push(variable);
            self.queues.dee.push(variable);
        } else {
            // A lowered unary can break full supports of earlier variables.
            self.queues.dac.push(variable);
        }
        self.queues.eac.push(variable);
        for &neighbour in &variables[variable].neighbours {
            self.queues.eac.push(neighbour);
        }
    }

    pub(crate) fn extend_unary(&mut self, variable: VariableId, value: usize, delta: Cost) {
        calabash_assert_simple!(delta >= 0);
        self.project_unary(variable, value, -delta);
    }

    /// Logically deconnect a cost function and queue its still-unassigned
    /// scope variables for degree-zero elimination.
    pub(crate) fn deconnect(&mut self, connected: StateInt, scope: &[VariableId]) {
        if self.store.get(connected) == 0 {
            return;
        }
        self.store.set(connected, 0);
        let variables = self.variables;
        for &variable in scope {
            if !variables[variable].is_assigned(self.store) {
                self.queues.elim.push(variable);
            }
        }
    }
}
