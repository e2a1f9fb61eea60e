use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::PropagationStatus;
use crate::basic_types::MAX_COST;
use crate::basic_types::MIN_COST;
use crate::calabash_assert_eq_simple;
use crate::cost_function::unassigned_positions;
use crate::cost_function::CostFunction;
use crate::engine::propagation_context::DomainView;
use crate::engine::propagation_context::PropagationContext;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

/// A ternary cost function in extension: a dense table over the initial
/// domains with one reversible delta vector per dimension.
#[derive(Debug)]
pub struct TernaryCostFunction {
    scope: [VariableId; 3],
    sizes: [usize; 3],
    /// Original costs: `costs[(a * sizes[1] + b) * sizes[2] + c]`.
    costs: Vec<Cost>,
    deltas: [Vec<StateInt>; 3],
    connected: StateInt,
}

impl TernaryCostFunction {
    pub(crate) fn new(
        store: &mut Store,
        scope: [VariableId; 3],
        sizes: [usize; 3],
        costs: Vec<Cost>,
    ) -> Self {
        calabash_assert_eq_simple!(costs.len(), sizes[0] * sizes[1] * sizes[2]);
        TernaryCostFunction {
            scope,
            sizes,
            costs,
            deltas: [
                (0..sizes[0]).map(|_| store.register(0)).collect(),
                (0..sizes[1]).map(|_| store.register(0)).collect(),
                (0..sizes[2]).map(|_| store.register(0)).collect(),
            ],
            connected: store.register(1),
        }
    }

    fn eval3(&self, store: &Store, tuple: [usize; 3]) -> Cost {
        let [a, b, c] = tuple;
        let raw = self.costs[(a * self.sizes[1] + b) * self.sizes[2] + c]
            - store.get(self.deltas[0][a])
            - store.get(self.deltas[1][b])
            - store.get(self.deltas[2][c]);
        raw.clamp(MIN_COST, MAX_COST)
    }

    fn project(&self, ctx: &mut PropagationContext<'_>, dim: usize, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        ctx.store.add(self.deltas[dim][value], delta);
        ctx.project_unary(self.scope[dim], value, delta);
    }

    fn extend(&self, ctx: &mut PropagationContext<'_>, dim: usize, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        ctx.store.add(self.deltas[dim][value], -delta);
        ctx.extend_unary(self.scope[dim], value, delta);
    }

    /// The two scope positions other than `pos`.
    fn companions(pos: usize) -> [usize; 2] {
        match pos {
            0 => [1, 2],
            1 => [0, 2],
            _ => [0, 1],
        }
    }

    fn tuple(pos: usize, value: usize, p: usize, b: usize, q: usize, c: usize) -> [usize; 3] {
        let mut tuple = [0; 3];
        tuple[pos] = value;
        tuple[p] = b;
        tuple[q] = c;
        tuple
    }

    /// Minimum effective cost with `pos = value`, optionally weighted by the
    /// unary costs of the two other scope variables.
    fn min_over_pair(
        &self,
        view: DomainView<'_>,
        pos: usize,
        value: usize,
        with_unaries: bool,
    ) -> Cost {
        let [p, q] = Self::companions(pos);
        let y = view.variable(self.scope[p]);
        let z = view.variable(self.scope[q]);
        let mut best = MAX_COST;
        for b in y.domain_iter(view.store) {
            for c in z.domain_iter(view.store) {
                let mut cost = self.eval3(view.store, Self::tuple(pos, value, p, b, q, c));
                if with_unaries {
                    cost = saturating_add(cost, y.unary_cost(view.store, b));
                    cost = saturating_add(cost, z.unary_cost(view.store, c));
                }
                best = best.min(cost);
            }
        }
        best
    }
}

impl CostFunction for TernaryCostFunction {
    fn scope(&self) -> &[VariableId] {
        &self.scope
    }

    fn connected_slot(&self) -> StateInt {
        self.connected
    }

    fn eval(&self, store: &Store, tuple: &[usize]) -> Cost {
        self.eval3(store, [tuple[0], tuple[1], tuple[2]])
    }

    fn original_cost(&self, tuple: &[usize]) -> Cost {
        self.costs[(tuple[0] * self.sizes[1] + tuple[1]) * self.sizes[2] + tuple[2]]
    }

    fn min_cost_given(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        self.min_over_pair(view, pos, value, false)
    }

    fn support_of(&self, view: DomainView<'_>, pos: usize, value: usize) -> Option<Vec<usize>> {
        let [p, q] = Self::companions(pos);
        let y = view.variable(self.scope[p]);
        let z = view.variable(self.scope[q]);
        let mut best: Option<(Cost, Vec<usize>)> = None;
        for b in y.domain_iter(view.store) {
            for c in z.domain_iter(view.store) {
                let tuple = Self::tuple(pos, value, p, b, q, c);
                let cost = self.eval3(view.store, tuple);
                if best.as_ref().map_or(true, |(incumbent, _)| cost < *incumbent) {
                    best = Some((cost, tuple.to_vec()));
                }
            }
        }
        best.map(|(_, tuple)| tuple)
    }

    fn full_support_cost(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        self.min_over_pair(view, pos, value, true)
    }

    fn find_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize) {
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
        let values: Vec<usize> = ctx
            .view()
            .variable(self.scope[pos])
            .domain_iter(ctx.store)
            .collect();
        let needs_support = values
            .iter()
            .any(|&a| self.full_support_cost(ctx.view(), pos, a) > 0);
        if !needs_support {
            return;
        }

        // Extend the unary costs of both companions into the table, project
        // the established minima to `pos`, then project the leftovers back
        // out. Each step is cost preserving, and the net flow is towards the
        // revised variable.
        let [p, q] = Self::companions(pos);
        for other in [p, q] {
            let other_values: Vec<(usize, Cost)> = {
                let view = ctx.view();
                let variable = view.variable(self.scope[other]);
                variable
                    .domain_iter(view.store)
                    .map(|b| (b, variable.unary_cost(view.store, b)))
                    .collect()
            };
            for (b, unary) in other_values {
                self.extend(ctx, other, b, unary);
            }
        }
        for a in values {
            let support = self.min_cost_given(ctx.view(), pos, a);
            self.project(ctx, pos, a, support);
        }
        self.find_supports(ctx, p);
        self.find_supports(ctx, q);
    }

    fn on_assignment(&self, ctx: &mut PropagationContext<'_>) -> PropagationStatus {
        if !self.is_connected(ctx.store) {
            return Ok(());
        }
        let unassigned = unassigned_positions(ctx.view(), &self.scope);
        match unassigned.as_slice() {
            [] => {
                let view = ctx.view();
                let tuple = [
                    view.variable(self.scope[0]).assigned_value(view.store) as usize,
                    view.variable(self.scope[1]).assigned_value(view.store) as usize,
                    view.variable(self.scope[2]).assigned_value(view.store) as usize,
                ];
                let cost = self.eval3(ctx.store, tuple);
                ctx.deconnect(self.connected, &self.scope);
                ctx.increase_lb(cost)
            }
            [pos] => {
                let pos = *pos;
                let [p, q] = Self::companions(pos);
                let (b, c, values) = {
                    let view = ctx.view();
                    (
                        view.variable(self.scope[p]).assigned_value(view.store) as usize,
                        view.variable(self.scope[q]).assigned_value(view.store) as usize,
                        view.variable(self.scope[pos])
                            .domain_iter(view.store)
                            .collect::<Vec<usize>>(),
                    )
                };
                for a in values {
                    let cost = self.eval3(ctx.store, Self::tuple(pos, a, p, b, q, c));
                    self.project(ctx, pos, a, cost);
                }
                ctx.deconnect(self.connected, &self.scope);
                Ok(())
            }
            // With two unassigned scope variables the function keeps
            // propagating as a table with one dimension fixed.
            _ => Ok(()),
        }
    }

    fn worst_advantage(
        &self,
        view: DomainView<'_>,
        pos: usize,
        candidate: usize,
        removed: usize,
    ) -> Option<Cost> {
        let [p, q] = Self::companions(pos);
        let y = view.variable(self.scope[p]);
        let z = view.variable(self.scope[q]);
        let mut worst = None;
        for b in y.domain_iter(view.store) {
            for c in z.domain_iter(view.store) {
                let advantage = self.eval3(view.store, Self::tuple(pos, candidate, p, b, q, c))
                    - self.eval3(view.store, Self::tuple(pos, removed, p, b, q, c));
                worst = Some(worst.map_or(advantage, |w: Cost| w.max(advantage)));
            }
        }
        worst
    }

    fn for_each_original_tuple(&self, visit: &mut dyn FnMut(&[usize], Cost)) {
        for a in 0..self.sizes[0] {
            for b in 0..self.sizes[1] {
                for c in 0..self.sizes[2] {
                    let cost = self.costs[(a * self.sizes[1] + b) * self.sizes[2] + c];
                    if cost != 0 {
                        visit(&[a, b, c], cost);
                    }
                }
            }
        }
    }
}
