use std::collections::BTreeMap;
use std::ops::Bound;

use crate::basic_types::Cost;
use crate::basic_types::PropagationStatus;
use crate::basic_types::MAX_COST;
use crate::basic_types::MIN_COST;
use crate::cost_function::unassigned_positions;
use crate::cost_function::CostFunction;
use crate::engine::propagation_context::DomainView;
use crate::engine::propagation_context::PropagationContext;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

/// A cost function of arbitrary arity in a sparse representation: an explicit
/// lexicographically ordered tuple list plus a default cost.
///
/// Propagation stays passive while many scope variables are unassigned; once
/// the number of unassigned scope variables falls to the projection threshold
/// the function projects minima onto their unary costs, and with at most one
/// unassigned variable it projects itself away exactly and deconnects.
#[derive(Debug)]
pub struct NaryCostFunction {
    scope: Vec<VariableId>,
    default_cost: Cost,
    tuples: BTreeMap<Vec<usize>, Cost>,
    deltas: Vec<Vec<StateInt>>,
    connected: StateInt,
}

impl NaryCostFunction {
    pub(crate) fn new(
        store: &mut Store,
        scope: Vec<VariableId>,
        sizes: &[usize],
        default_cost: Cost,
        tuples: BTreeMap<Vec<usize>, Cost>,
    ) -> Self {
        let deltas = sizes
            .iter()
            .map(|&size| (0..size).map(|_| store.register(0)).collect())
            .collect();
        NaryCostFunction {
            scope,
            default_cost,
            tuples,
            deltas,
            connected: store.register(1),
        }
    }

    /// The lexicographically first tuple with an explicit cost.
    pub(crate) fn first_lex(&self) -> Option<(&[usize], Cost)> {
        self.tuples
            .iter()
            .next()
            .map(|(tuple, &cost)| (tuple.as_slice(), cost))
    }

    /// The explicit tuple lexicographically after `tuple`.
    pub(crate) fn next_lex(&self, tuple: &[usize]) -> Option<(&[usize], Cost)> {
        self.tuples
            .range::<[usize], _>((Bound::Excluded(tuple), Bound::Unbounded))
            .next()
            .map(|(tuple, &cost)| (tuple.as_slice(), cost))
    }

    fn delta_sum(&self, store: &Store, tuple: &[usize]) -> Cost {
        tuple
            .iter()
            .enumerate()
            .map(|(pos, &value)| store.get(self.deltas[pos][value]))
            .sum()
    }

    fn project(&self, ctx: &mut PropagationContext<'_>, pos: usize, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        ctx.store.add(self.deltas[pos][value], delta);
        ctx.project_unary(self.scope[pos], value, delta);
    }

    /// Minimum effective cost over all completions within the current
    /// domains, with `pos` fixed to `value`. Exponential in the number of
    /// unassigned scope variables; callers gate on the projection threshold.
    fn min_over_completions(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        let mut tuple: Vec<usize> = self
            .scope
            .iter()
            .map(|&variable| view.variable(variable).inf(view.store) as usize)
            .collect();
        tuple[pos] = value;
        self.min_rec(view, pos, &mut tuple, 0)
    }

    fn min_rec(&self, view: DomainView<'_>, pos: usize, tuple: &mut Vec<usize>, depth: usize) -> Cost {
        if depth == self.scope.len() {
            return self.eval(view.store, tuple);
        }
        if depth == pos || view.variable(self.scope[depth]).is_assigned(view.store) {
            return self.min_rec(view, pos, tuple, depth + 1);
        }
        let values: Vec<usize> = view
            .variable(self.scope[depth])
            .domain_iter(view.store)
            .collect();
        let mut best = MAX_COST;
        for v in values {
            tuple[depth] = v;
            best = best.min(self.min_rec(view, pos, tuple, depth + 1));
            if best == 0 {
                break;
            }
        }
        best
    }
}

impl CostFunction for NaryCostFunction {
    fn scope(&self) -> &[VariableId] {
        &self.scope
    }

    fn connected_slot(&self) -> StateInt {
        self.connected
    }

    fn eval(&self, store: &Store, tuple: &[usize]) -> Cost {
        let stored = self
            .tuples
            .get(tuple)
            .copied()
            .unwrap_or(self.default_cost);
        (stored - self.delta_sum(store, tuple)).clamp(MIN_COST, MAX_COST)
    }

    fn original_cost(&self, tuple: &[usize]) -> Cost {
        self.tuples
            .get(tuple)
            .copied()
            .unwrap_or(self.default_cost)
    }

    fn min_cost_given(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        self.min_over_completions(view, pos, value)
    }

    fn support_of(&self, view: DomainView<'_>, pos: usize, value: usize) -> Option<Vec<usize>> {
        // A witness is rebuilt by walking the completions once more.
        let target = self.min_over_completions(view, pos, value);
        let mut tuple: Vec<usize> = self
            .scope
            .iter()
            .map(|&variable| view.variable(variable).inf(view.store) as usize)
            .collect();
        tuple[pos] = value;
        find_witness(self, view, pos, &mut tuple, 0, target).then_some(tuple)
    }

    fn full_support_cost(&self, _view: DomainView<'_>, _pos: usize, _value: usize) -> Cost {
        // Weak existential support: functions beyond ternary arity do not
        // contribute to the existential support cost.
        0
    }

    fn find_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize) {
        if unassigned_positions(ctx.view(), &self.scope).len() > ctx.nary_projection_threshold {
            return;
        }
        let values: Vec<usize> = ctx
            .view()
            .variable(self.scope[pos])
            .domain_iter(ctx.store)
            .collect();
        for a in values {
            let support = self.min_cost_given(ctx.view(), pos, a);
            self.project(ctx, pos, a, support);
        }
    }

    fn find_full_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize) {
        self.find_supports(ctx, pos);
    }

    fn on_assignment(&self, ctx: &mut PropagationContext<'_>) -> PropagationStatus {
        if !self.is_connected(ctx.store) {
            return Ok(());
        }
        let unassigned = unassigned_positions(ctx.view(), &self.scope);
        match unassigned.as_slice() {
            [] => {
                let tuple: Vec<usize> = {
                    let view = ctx.view();
                    self.scope
                        .iter()
                        .map(|&variable| view.variable(variable).assigned_value(view.store) as usize)
                        .collect()
                };
                let cost = self.eval(ctx.store, &tuple);
                ctx.deconnect(self.connected, &self.scope);
                ctx.increase_lb(cost)
            }
            [pos] => {
                let pos = *pos;
                let (mut tuple, values) = {
                    let view = ctx.view();
                    let tuple: Vec<usize> = self
                        .scope
                        .iter()
                        .map(|&variable| view.variable(variable).inf(view.store) as usize)
                        .collect();
                    let values: Vec<usize> = view
                        .variable(self.scope[pos])
                        .domain_iter(view.store)
                        .collect();
                    (tuple, values)
                };
                for a in values {
                    tuple[pos] = a;
                    let cost = self.eval(ctx.store, &tuple);
                    self.project(ctx, pos, a, cost);
                }
                ctx.deconnect(self.connected, &self.scope);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn worst_advantage(
        &self,
        _view: DomainView<'_>,
        _pos: usize,
        _candidate: usize,
        _removed: usize,
    ) -> Option<Cost> {
        None
    }

    fn for_each_original_tuple(&self, visit: &mut dyn FnMut(&[usize], Cost)) {
        let mut current = self.first_lex();
        while let Some((tuple, cost)) = current {
            visit(tuple, cost);
            current = self.next_lex(tuple);
        }
    }

    fn default_cost(&self) -> Cost {
        self.default_cost
    }
}

fn find_witness(
    function: &NaryCostFunction,
    view: DomainView<'_>,
    pos: usize,
    tuple: &mut Vec<usize>,
    depth: usize,
    target: Cost,
) -> bool {
    if depth == function.scope.len() {
        return function.eval(view.store, tuple) == target;
    }
    if depth == pos || view.variable(function.scope[depth]).is_assigned(view.store) {
        return find_witness(function, view, pos, tuple, depth + 1, target);
    }
    let values: Vec<usize> = view
        .variable(function.scope[depth])
        .domain_iter(view.store)
        .collect();
    for v in values {
        tuple[depth] = v;
        if find_witness(function, view, pos, tuple, depth + 1, target) {
            return true;
        }
    }
    false
}
