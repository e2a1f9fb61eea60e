//! The variable and domain representation.
//!
//! All reversible domain state (presence bits, cached bounds, unary costs)
//! lives in the [`Store`]; a [`Variable`] only holds the slot keys and the
//! immutable structure (name, incidence lists). Domain mutations go through
//! the propagation context so that events are published and queues fed.

use crate::basic_types::Cost;
use crate::containers::StorageKey;
use crate::cost_function::CostFunctionId;
use crate::store::StateInt;
use crate::store::Store;

#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct VariableId {
    id: u32,
}

impl StorageKey for VariableId {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        VariableId { id: index as u32 }
    }
}

impl std::fmt::Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.id)
    }
}

impl std::fmt::Debug for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.id)
    }
}

/// Reversible state of an enumerated domain: one presence bit and one unary
/// cost per initial value, plus cached size and bounds.
#[derive(Debug, Clone)]
pub(crate) struct EnumeratedDomain {
    pub(crate) present: Vec<StateInt>,
    pub(crate) unary: Vec<StateInt>,
    pub(crate) size: StateInt,
    pub(crate) min: StateInt,
    pub(crate) max: StateInt,
}

/// Reversible `[inf, sup]` of an interval domain. Interval variables carry no
/// unary cost vector; table cost functions are rejected on them at load time.
#[derive(Debug, Clone)]
pub(crate) struct IntervalDomain {
    pub(crate) inf: StateInt,
    pub(crate) sup: StateInt,
}

#[derive(Debug, Clone)]
pub(crate) enum Domain {
    Enumerated(EnumeratedDomain),
    Interval(IntervalDomain),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) domain: Domain,
    /// Symbolic value names; empty when values are plain indices.
    pub(crate) value_names: Vec<String>,
    /// Incident cost functions as (function, position of this variable in its
    /// scope); filled when the problem is closed.
    pub(crate) incident: Vec<(CostFunctionId, usize)>,
    /// Scope companions over all incident functions, deduplicated; filled
    /// when the problem is closed.
    pub(crate) neighbours: Vec<VariableId>,
    /// Unary costs as they stood when the problem was closed, for solution
    /// verification and read-only evaluation.
    pub(crate) original_unary: Vec<Cost>,
}

impl Variable {
    pub(crate) fn new_enumerated(name: String, store: &mut Store, size: usize) -> Self {
        let present = (0..size).map(|_| store.register(1)).collect();
        let unary = (0..size).map(|_| store.register(0)).collect();
        Variable {
            name,
            domain: Domain::Enumerated(EnumeratedDomain {
                present,
                unary,
                size: store.register(size as i64),
                min: store.register(0),
                max: store.register(size as i64 - 1),
            }),
            value_names: Vec::new(),
            incident: Vec::new(),
            neighbours: Vec::new(),
            original_unary: Vec::new(),
        }
    }

    pub(crate) fn new_interval(name: String, store: &mut Store, inf: i64, sup: i64) -> Self {
        Variable {
            name,
            domain: Domain::Interval(IntervalDomain {
                inf: store.register(inf),
                sup: store.register(sup),
            }),
            value_names: Vec::new(),
            incident: Vec::new(),
            neighbours: Vec::new(),
            original_unary: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enumerated(&self) -> bool {
        matches!(self.domain, Domain::Enumerated(_))
    }

    pub(crate) fn enumerated(&self) -> &EnumeratedDomain {
        match &self.domain {
            Domain::Enumerated(domain) => domain,
            Domain::Interval(_) => {
                panic!("operation only defined on enumerated variables")
            }
        }
    }

    /// The initial domain size of an enumerated variable.
    pub fn initial_size(&self) -> usize {
        match &self.domain {
            Domain::Enumerated(domain) => domain.present.len(),
            Domain::Interval(_) => 0,
        }
    }

    pub fn size(&self, store: &Store) -> u64 {
        match &self.domain {
            Domain::Enumerated(domain) => store.get(domain.size) as u64,
            Domain::Interval(domain) => (store.get(domain.sup) - store.get(domain.inf) + 1) as u64,
        }
    }

    pub fn inf(&self, store: &Store) -> i64 {
        match &self.domain {
            Domain::Enumerated(domain) => store.get(domain.min),
            Domain::Interval(domain) => store.get(domain.inf),
        }
    }

    pub fn sup(&self, store: &Store) -> i64 {
        match &self.domain {
            Domain::Enumerated(domain) => store.get(domain.max),
            Domain::Interval(domain) => store.get(domain.sup),
        }
    }

    pub fn is_assigned(&self, store: &Store) -> bool {
        self.size(store) == 1
    }

    /// The single remaining value; only meaningful on assigned variables.
    pub fn assigned_value(&self, store: &Store) -> i64 {
        self.inf(store)
    }

    pub fn contains(&self, store: &Store, value: i64) -> bool {
        match &self.domain {
            Domain::Enumerated(domain) => {
                value >= 0
                    && (value as usize) < domain.present.len()
                    && store.get(domain.present[value as usize]) != 0
            }
            Domain::Interval(domain) => {
                value >= store.get(domain.inf) && value <= store.get(domain.sup)
            }
        }
    }

    /// The unary cost of a present value of an enumerated variable. Unary
    /// costs of removed values are not consulted.
    pub fn unary_cost(&self, store: &Store, value: usize) -> Cost {
        store.get(self.enumerated().unary[value])
    }

    /// Iterate over the present values of an enumerated domain in value
    /// order.
    pub fn domain_iter<'a>(&'a self, store: &'a Store) -> impl Iterator<Item = usize> + 'a {
        let domain = self.enumerated();
        let min = store.get(domain.min) as usize;
        let max = store.get(domain.max) as usize;
        (min..=max).filter(move |&value| store.get(domain.present[value]) != 0)
    }

    /// The present value with the lowest unary cost, ties broken towards the
    /// smaller value.
    pub fn unary_support(&self, store: &Store) -> usize {
        let mut best = None;
        let mut best_cost = Cost::MAX;
        for value in self.domain_iter(store) {
            let cost = self.unary_cost(store, value);
            if cost < best_cost {
                best_cost = cost;
                best = Some(value);
            }
        }
        best.expect("domains are non-empty below the propagation fixpoint")
    }

    /// The minimum unary cost over the current domain.
    pub fn min_unary_cost(&self, store: &Store) -> Cost {
        self.domain_iter(store)
            .map(|value| self.unary_cost(store, value))
            .min()
            .expect("domains are non-empty below the propagation fixpoint")
    }

    /// The unary cost of a value as it stood when the problem was closed;
    /// before closing it reads the live slot.
    pub(crate) fn original_unary_cost(&self, store: &Store, value: usize) -> Cost {
        match self.original_unary.get(value) {
            Some(&cost) => cost,
            None if self.is_enumerated() => self.unary_cost(store, value),
            None => 0,
        }
    }

    /// Render a value the way the input model named it.
    pub fn format_value(&self, value: i64) -> String {
        match self.value_names.get(value as usize) {
            Some(name) if self.is_enumerated() => name.clone(),
            _ => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerated_state_is_registered_in_the_store() {
        let mut store = Store::default();
        let x = Variable::new_enumerated("x".into(), &mut store, 3);

        assert_eq!(x.size(&store), 3);
        assert_eq!(x.inf(&store), 0);
        assert_eq!(x.sup(&store), 2);
        assert!(x.contains(&store, 1));
        assert!(!x.contains(&store, 3));
        assert_eq!(x.domain_iter(&store).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn unary_support_prefers_the_cheapest_value() {
        let mut store = Store::default();
        let x = Variable::new_enumerated("x".into(), &mut store, 3);
        let domain = x.enumerated().clone();
        store.set(domain.unary[0], 5);
        store.set(domain.unary[1], 2);
        store.set(domain.unary[2], 7);

        assert_eq!(x.unary_support(&store), 1);
        assert_eq!(x.min_unary_cost(&store), 2);
    }

    #[test]
    fn interval_bounds_are_reversible() {
        let mut store = Store::default();
        let x = Variable::new_interval("x".into(), &mut store, 0, 9);
        let domain = match &x.domain {
            Domain::Interval(domain) => domain.clone(),
            _ => unreachable!(),
        };

        store.store_frame();
        store.set(domain.inf, 4);
        store.set(domain.sup, 6);
        assert_eq!(x.size(&store), 3);

        store.restore(0);
        assert_eq!(x.size(&store), 10);
        assert!(x.contains(&store, 9));
    }
}
