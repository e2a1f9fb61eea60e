use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::PropagationStatus;
use crate::basic_types::MAX_COST;
use crate::basic_types::MIN_COST;
use crate::calabash_assert_eq_simple;
use crate::calabash_assert_moderate;
use crate::cost_function::unassigned_positions;
use crate::cost_function::CostFunction;
use crate::engine::propagation_context::DomainView;
use crate::engine::propagation_context::PropagationContext;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

/// A binary cost function in extension: a dense table over the initial
/// domains with one reversible delta vector per dimension.
#[derive(Debug)]
pub struct BinaryCostFunction {
    scope: [VariableId; 2],
    sizes: [usize; 2],
    /// Original costs, row-major: `costs[a * sizes[1] + b]`.
    costs: Vec<Cost>,
    deltas: [Vec<StateInt>; 2],
    connected: StateInt,
}

impl BinaryCostFunction {
    pub(crate) fn new(
        store: &mut Store,
        scope: [VariableId; 2],
        sizes: [usize; 2],
        costs: Vec<Cost>,
    ) -> Self {
        calabash_assert_eq_simple!(costs.len(), sizes[0] * sizes[1]);
        BinaryCostFunction {
            scope,
            sizes,
            costs,
            deltas: [
                (0..sizes[0]).map(|_| store.register(0)).collect(),
                (0..sizes[1]).map(|_| store.register(0)).collect(),
            ],
            connected: store.register(1),
        }
    }

    fn eval2(&self, store: &Store, a: usize, b: usize) -> Cost {
        let raw = self.costs[a * self.sizes[1] + b]
            - store.get(self.deltas[0][a])
            - store.get(self.deltas[1][b]);
        raw.clamp(MIN_COST, MAX_COST)
    }

    /// Move `delta` from this function into the unary cost of the value
    /// `value` of the scope variable at `dim`.
    fn project(&self, ctx: &mut PropagationContext<'_>, dim: usize, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        ctx.store.add(self.deltas[dim][value], delta);
        ctx.project_unary(self.scope[dim], value, delta);
    }

    /// The inverse of [`BinaryCostFunction::project`]: draw `delta` out of
    /// the unary cost and spread it over the function's entries.
    fn extend(&self, ctx: &mut PropagationContext<'_>, dim: usize, value: usize, delta: Cost) {
        if delta == 0 {
            return;
        }
        ctx.store.add(self.deltas[dim][value], -delta);
        ctx.extend_unary(self.scope[dim], value, delta);
    }
}

impl CostFunction for BinaryCostFunction {
    fn scope(&self) -> &[VariableId] {
        &self.scope
    }

    fn connected_slot(&self) -> StateInt {
        self.connected
    }

    fn eval(&self, store: &Store, tuple: &[usize]) -> Cost {
        self.eval2(store, tuple[0], tuple[1])
    }

    fn original_cost(&self, tuple: &[usize]) -> Cost {
        self.costs[tuple[0] * self.sizes[1] + tuple[1]]
    }

    fn min_cost_given(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        let other = view.variable(self.scope[1 - pos]);
        other
            .domain_iter(view.store)
            .map(|b| {
                if pos == 0 {
                    self.eval2(view.store, value, b)
                } else {
                    self.eval2(view.store, b, value)
                }
            })
            .min()
            .unwrap_or(MAX_COST)
    }

    fn support_of(&self, view: DomainView<'_>, pos: usize, value: usize) -> Option<Vec<usize>> {
        let other = view.variable(self.scope[1 - pos]);
        other
            .domain_iter(view.store)
            .min_by_key(|&b| {
                if pos == 0 {
                    self.eval2(view.store, value, b)
                } else {
                    self.eval2(view.store, b, value)
                }
            })
            .map(|b| {
                if pos == 0 {
                    vec![value, b]
                } else {
                    vec![b, value]
                }
            })
    }

    fn full_support_cost(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost {
        let other = view.variable(self.scope[1 - pos]);
        other
            .domain_iter(view.store)
            .map(|b| {
                let pair = if pos == 0 {
                    self.eval2(view.store, value, b)
                } else {
                    self.eval2(view.store, b, value)
                };
                saturating_add(pair, other.unary_cost(view.store, b))
            })
            .min()
            .unwrap_or(MAX_COST)
    }

    fn find_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize) {
        let x = ctx.view().variable(self.scope[pos]);
        let values: Vec<usize> = x.domain_iter(ctx.store).collect();
        for a in values {
            let support = self.min_cost_given(ctx.view(), pos, a);
            self.project(ctx, pos, a, support);
        }
    }

    fn find_full_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize) {
        let other_pos = 1 - pos;
        let other = self.scope[other_pos];
        let values: Vec<usize> = ctx
            .view()
            .variable(self.scope[pos])
            .domain_iter(ctx.store)
            .collect();

        for a in values {
            let support = self.full_support_cost(ctx.view(), pos, a);
            if support == 0 {
                continue;
            }
            // Draw the missing cost out of the other variable's unary costs,
            // then project the established minimum to `a`. The extension per
            // value never exceeds the unary cost it is drawn from.
            let other_values: Vec<usize> =
                ctx.view().variable(other).domain_iter(ctx.store).collect();
            for b in other_values {
                let pair = if pos == 0 {
                    self.eval2(ctx.store, a, b)
                } else {
                    self.eval2(ctx.store, b, a)
                };
                let needed = support - pair;
                if needed > 0 {
                    calabash_assert_moderate!(
                        needed <= ctx.view().variable(other).unary_cost(ctx.store, b)
                    );
                    self.extend(ctx, other_pos, b, needed);
                }
            }
            self.project(ctx, pos, a, support);
        }
    }

    fn on_assignment(&self, ctx: &mut PropagationContext<'_>) -> PropagationStatus {
        if !self.is_connected(ctx.store) {
            return Ok(());
        }
        let unassigned = unassigned_positions(ctx.view(), &self.scope);
        match unassigned.as_slice() {
            [] => {
                let tuple = [
                    ctx.view().variable(self.scope[0]).assigned_value(ctx.store) as usize,
                    ctx.view().variable(self.scope[1]).assigned_value(ctx.store) as usize,
                ];
                let cost = self.eval(ctx.store, &tuple);
                ctx.deconnect(self.connected, &self.scope);
                ctx.increase_lb(cost)
            }
            [pos] => {
                let pos = *pos;
                let assigned = ctx
                    .view()
                    .variable(self.scope[1 - pos])
                    .assigned_value(ctx.store) as usize;
                let values: Vec<usize> = ctx
                    .view()
                    .variable(self.scope[pos])
                    .domain_iter(ctx.store)
                    .collect();
                for b in values {
                    let cost = if pos == 0 {
                        self.eval2(ctx.store, b, assigned)
                    } else {
                        self.eval2(ctx.store, assigned, b)
                    };
                    self.project(ctx, pos, b, cost);
                }
                ctx.deconnect(self.connected, &self.scope);
                Ok(())
            }
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
        let other = view.variable(self.scope[1 - pos]);
        other
            .domain_iter(view.store)
            .map(|b| {
                let (candidate_cost, removed_cost) = if pos == 0 {
                    (
                        self.eval2(view.store, candidate, b),
                        self.eval2(view.store, removed, b),
                    )
                } else {
                    (
                        self.eval2(view.store, b, candidate),
                        self.eval2(view.store, b, removed),
                    )
                };
                candidate_cost - removed_cost
            })
            .max()
    }

    fn for_each_original_tuple(&self, visit: &mut dyn FnMut(&[usize], Cost)) {
        for a in 0..self.sizes[0] {
            for b in 0..self.sizes[1] {
                let cost = self.costs[a * self.sizes[1] + b];
                if cost != 0 {
                    visit(&[a, b], cost);
                }
            }
        }
    }
}
