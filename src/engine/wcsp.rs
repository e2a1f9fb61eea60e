//! The cost function network and its propagation fixpoint.
//!
//! A [`Wcsp`] exclusively owns the variables, the cost functions, the
//! reversible store and the propagation queues. Cost functions and variables
//! reference each other by index only; removal from the network is logical
//! (a reversible connection flag), never structural.

use std::collections::BTreeMap;

use log::debug;

use crate::basic_types::saturating_add;
use crate::basic_types::Contradiction;
use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::basic_types::PropagationStatus;
use crate::basic_types::MAX_COST;
use crate::calabash_assert_eq_simple;
use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::cost_function::BinaryCostFunction;
use crate::cost_function::CostFunction;
use crate::cost_function::CostFunctionId;
use crate::cost_function::NaryCostFunction;
use crate::cost_function::TernaryCostFunction;
use crate::engine::propagation_context::PropagationContext;
use crate::engine::queues::PropagationQueues;
use crate::engine::variable::Domain;
use crate::engine::DomainListener;
use crate::engine::Variable;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

/// The soft local consistency maintained during search, in increasing
/// strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConsistencyLevel {
    NodeConsistency,
    ArcConsistency,
    DirectedArcConsistency,
    FullDirectedArcConsistency,
    #[default]
    ExistentialDirectedArcConsistency,
}

impl ConsistencyLevel {
    pub fn from_index(index: u8) -> ConsistencyLevel {
        match index {
            0 => ConsistencyLevel::NodeConsistency,
            1 => ConsistencyLevel::ArcConsistency,
            2 => ConsistencyLevel::DirectedArcConsistency,
            3 => ConsistencyLevel::FullDirectedArcConsistency,
            _ => ConsistencyLevel::ExistentialDirectedArcConsistency,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PropagationOptions {
    pub consistency: ConsistencyLevel,
    /// Dead-end elimination level, 0 disables it.
    pub dee: u8,
    /// Nary functions start projecting once at most this many scope
    /// variables are unassigned.
    pub nary_projection_threshold: usize,
    /// In enumeration mode the value-pruning rules which are only sound for
    /// optimisation (DEE, degree-zero elimination) are disabled.
    pub enumerate: bool,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        PropagationOptions {
            consistency: ConsistencyLevel::default(),
            dee: 1,
            nary_projection_threshold: 3,
            enumerate: false,
        }
    }
}

/// A weighted constraint satisfaction problem: variables, cost functions, the
/// reversible bounds and the propagation machinery.
pub struct Wcsp {
    id: u32,
    name: String,
    store: Store,
    variables: KeyedVec<VariableId, Variable>,
    functions: KeyedVec<CostFunctionId, Box<dyn CostFunction>>,
    /// Conflict counts per (function, scope position), for the weighted
    /// degree heuristic. Not reversible.
    conflict_weights: KeyedVec<CostFunctionId, Vec<u64>>,
    queues: PropagationQueues,
    listeners: Vec<Box<dyn DomainListener>>,
    lb: StateInt,
    /// The strict upper bound. Monotonically tightened when solutions are
    /// found; improvements survive backtracking, so it is not trailed.
    ub: Cost,
    /// Total shift applied at load time to keep all stored costs
    /// non-negative. Reported solutions subtract it.
    neg_cost: Cost,
    /// Lower bound as it stood when the problem was closed.
    original_lb: Cost,
    dac_rank: Vec<u32>,
    options: PropagationOptions,
    scale: CostScale,
    propagating: bool,
    closed: bool,
}

impl std::fmt::Debug for Wcsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wcsp")
            .field("name", &self.name)
            .field("num_variables", &self.variables.len())
            .field("num_functions", &self.functions.len())
            .field("lb", &self.lower_bound())
            .field("ub", &self.ub)
            .field("neg_cost", &self.neg_cost)
            .finish()
    }
}

impl Default for Wcsp {
    fn default() -> Self {
        Wcsp::new()
    }
}

impl Wcsp {
    pub fn new() -> Self {
        let mut store = Store::default();
        let lb = store.register(0);
        Wcsp {
            id: 0,
            name: String::new(),
            store,
            variables: KeyedVec::default(),
            functions: KeyedVec::default(),
            conflict_weights: KeyedVec::default(),
            queues: PropagationQueues::default(),
            listeners: Vec::new(),
            lb,
            ub: MAX_COST,
            neg_cost: 0,
            original_lb: 0,
            dac_rank: Vec::new(),
            options: PropagationOptions::default(),
            scale: CostScale::default(),
            propagating: false,
            closed: false,
        }
    }

    pub fn with_id(id: u32) -> Self {
        let mut wcsp = Wcsp::new();
        wcsp.id = id;
        wcsp
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &PropagationOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut PropagationOptions {
        &mut self.options
    }

    pub fn cost_scale(&self) -> CostScale {
        self.scale
    }

    pub fn set_cost_scale(&mut self, scale: CostScale) {
        self.scale = scale;
    }

    /// Register an observer of the domain changes of this problem.
    pub fn register_listener(&mut self, listener: Box<dyn DomainListener>) {
        self.listeners.push(listener);
    }

    // ------------------------------------------------------------------
    // Model construction. Structure is immutable once the problem is closed.
    // ------------------------------------------------------------------

    pub fn new_enumerated_variable(
        &mut self,
        size: usize,
        name: impl Into<String>,
    ) -> VariableId {
        calabash_assert_simple!(!self.closed && size > 0);
        let variable = Variable::new_enumerated(name.into(), &mut self.store, size);
        self.variables.push(variable)
    }

    pub fn new_interval_variable(
        &mut self,
        inf: i64,
        sup: i64,
        name: impl Into<String>,
    ) -> VariableId {
        calabash_assert_simple!(!self.closed && inf <= sup);
        let variable = Variable::new_interval(name.into(), &mut self.store, inf, sup);
        self.variables.push(variable)
    }

    pub fn set_value_names(&mut self, variable: VariableId, names: Vec<String>) {
        self.variables[variable].value_names = names;
    }

    /// Accumulate unary costs onto an enumerated variable.
    pub fn post_unary(&mut self, variable: VariableId, costs: &[Cost]) {
        calabash_assert_simple!(!self.closed);
        let domain = self.variables[variable].enumerated().clone();
        calabash_assert_eq_simple!(costs.len(), domain.unary.len());
        for (value, &cost) in costs.iter().enumerate() {
            calabash_assert_simple!(cost >= 0, "unary costs are non-negative");
            let updated = saturating_add(self.store.get(domain.unary[value]), cost);
            self.store.set(domain.unary[value], updated);
        }
    }

    /// Post a binary cost function given its dense table in row-major order.
    pub fn post_binary(
        &mut self,
        x: VariableId,
        y: VariableId,
        costs: Vec<Cost>,
    ) -> CostFunctionId {
        calabash_assert_simple!(!self.closed && x != y);
        let sizes = [
            self.variables[x].initial_size(),
            self.variables[y].initial_size(),
        ];
        calabash_assert_simple!(
            sizes[0] > 0 && sizes[1] > 0,
            "table cost functions require enumerated variables"
        );
        let function = BinaryCostFunction::new(&mut self.store, [x, y], sizes, costs);
        self.push_function(Box::new(function))
    }

    pub fn post_ternary(
        &mut self,
        x: VariableId,
        y: VariableId,
        z: VariableId,
        costs: Vec<Cost>,
    ) -> CostFunctionId {
        calabash_assert_simple!(!self.closed && x != y && y != z && x != z);
        let sizes = [
            self.variables[x].initial_size(),
            self.variables[y].initial_size(),
            self.variables[z].initial_size(),
        ];
        calabash_assert_simple!(sizes.iter().all(|&size| size > 0));
        let function = TernaryCostFunction::new(&mut self.store, [x, y, z], sizes, costs);
        self.push_function(Box::new(function))
    }

    /// Post a cost function from its sparse tuple representation. Functions
    /// of arity at most three are materialised as dense tables; an arity of
    /// one folds into the unary costs and an empty scope into the lower
    /// bound.
    pub fn post_tuples(
        &mut self,
        scope: &[VariableId],
        default_cost: Cost,
        tuples: BTreeMap<Vec<usize>, Cost>,
    ) -> Option<CostFunctionId> {
        calabash_assert_simple!(!self.closed);
        match scope {
            [] => {
                let cost = tuples
                    .get(&Vec::new())
                    .copied()
                    .unwrap_or(default_cost);
                self.post_constant(cost);
                None
            }
            &[x] => {
                let size = self.variables[x].initial_size();
                let costs: Vec<Cost> = (0..size)
                    .map(|v| tuples.get(&vec![v]).copied().unwrap_or(default_cost))
                    .collect();
                self.post_unary(x, &costs);
                None
            }
            &[x, y] => {
                let sizes = [
                    self.variables[x].initial_size(),
                    self.variables[y].initial_size(),
                ];
                let mut costs = vec![default_cost; sizes[0] * sizes[1]];
                for (tuple, cost) in tuples {
                    costs[tuple[0] * sizes[1] + tuple[1]] = cost;
                }
                Some(self.post_binary(x, y, costs))
            }
            &[x, y, z] => {
                let sizes = [
                    self.variables[x].initial_size(),
                    self.variables[y].initial_size(),
                    self.variables[z].initial_size(),
                ];
                let mut costs = vec![default_cost; sizes[0] * sizes[1] * sizes[2]];
                for (tuple, cost) in tuples {
                    costs[(tuple[0] * sizes[1] + tuple[1]) * sizes[2] + tuple[2]] = cost;
                }
                Some(self.post_ternary(x, y, z, costs))
            }
            _ => {
                let sizes: Vec<usize> = scope
                    .iter()
                    .map(|&variable| self.variables[variable].initial_size())
                    .collect();
                calabash_assert_simple!(sizes.iter().all(|&size| size > 0));
                let function = NaryCostFunction::new(
                    &mut self.store,
                    scope.to_vec(),
                    &sizes,
                    default_cost,
                    tuples,
                );
                Some(self.push_function(Box::new(function)))
            }
        }
    }

    /// An empty-scope cost: a constant added to the lower bound.
    pub fn post_constant(&mut self, cost: Cost) {
        calabash_assert_simple!(!self.closed && cost >= 0);
        self.store
            .set(self.lb, saturating_add(self.store.get(self.lb), cost));
    }

    /// Record a load-time shift which kept stored costs non-negative.
    pub fn add_neg_cost(&mut self, shift: Cost) {
        calabash_assert_simple!(!self.closed && shift >= 0);
        self.neg_cost += shift;
    }

    fn push_function(&mut self, function: Box<dyn CostFunction>) -> CostFunctionId {
        let arity = function.arity();
        let id = self.functions.push(function);
        let weights = self.conflict_weights.push(vec![1; arity]);
        calabash_assert_eq_simple!(id.index(), weights.index());
        id
    }

    /// Freeze the structure: build the incidence lists, the DAC order and the
    /// verification snapshots, and queue the initial propagation pass.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for id in self.functions.keys() {
            let scope: Vec<VariableId> = self.functions[id].scope().to_vec();
            for (pos, &variable) in scope.iter().enumerate() {
                self.variables[variable].incident.push((id, pos));
                for &other in &scope {
                    if other != variable
                        && !self.variables[variable].neighbours.contains(&other)
                    {
                        self.variables[variable].neighbours.push(other);
                    }
                }
            }
        }

        // DAC order: variable definition order; cost flows towards earlier
        // variables.
        self.dac_rank = (0..self.variables.len() as u32).collect();

        let store = &self.store;
        for variable in self.variables.iter_mut() {
            if let Domain::Enumerated(domain) = &variable.domain {
                variable.original_unary =
                    domain.unary.iter().map(|&slot| store.get(slot)).collect();
            }
        }
        self.original_lb = self.store.get(self.lb);

        self.queues.grow(self.variables.len());
        for variable in self.variables.keys() {
            self.queues.nc.push(variable);
            self.queues.ac.push(variable);
            self.queues.dac.push(variable);
            self.queues.eac.push(variable);
            self.queues.dee.push(variable);
            if self.variables[variable].is_assigned(&self.store) {
                self.queues.assigned.push(variable);
            }
        }

        debug!(
            "closed problem '{}': {} variables, {} cost functions, ub {}",
            self.name,
            self.variables.len(),
            self.functions.len(),
            self.ub
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ------------------------------------------------------------------
    // Bounds.
    // ------------------------------------------------------------------

    pub fn lower_bound(&self) -> Cost {
        self.store.get(self.lb)
    }

    pub fn upper_bound(&self) -> Cost {
        self.ub
    }

    /// Tighten the strict upper bound; loosening is ignored.
    pub fn update_upper_bound(&mut self, ub: Cost) {
        if ub < self.ub {
            self.ub = ub;
            if self.closed {
                for variable in self.variables.keys() {
                    self.queues.nc.push(variable);
                }
            }
        }
    }

    /// Set the bound from external (unshifted) units.
    pub fn update_external_upper_bound(&mut self, ub: Cost) {
        self.update_upper_bound(saturating_add(ub, self.neg_cost));
    }

    pub fn neg_cost(&self) -> Cost {
        self.neg_cost
    }

    /// The constant term of the problem: the lower bound as loaded, before
    /// any propagation.
    pub fn original_lower_bound(&self) -> Cost {
        if self.closed {
            self.original_lb
        } else {
            self.store.get(self.lb)
        }
    }

    // ------------------------------------------------------------------
    // Accessors used by search, heuristics and output.
    // ------------------------------------------------------------------

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn variable(&self, variable: VariableId) -> &Variable {
        &self.variables[variable]
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        self.variables.keys()
    }

    pub(crate) fn functions(
        &self,
    ) -> impl Iterator<Item = (CostFunctionId, &dyn CostFunction)> + '_ {
        self.functions
            .keys()
            .map(move |id| (id, self.functions[id].as_ref()))
    }

    pub(crate) fn function(&self, id: CostFunctionId) -> &dyn CostFunction {
        self.functions[id].as_ref()
    }

    /// Accumulated conflict weight of a variable over its connected incident
    /// functions, at least one.
    pub fn weighted_degree(&self, variable: VariableId) -> u64 {
        let weight: u64 = self.variables[variable]
            .incident
            .iter()
            .filter(|(id, _)| self.functions[*id].is_connected(&self.store))
            .map(|(id, pos)| self.conflict_weights[*id][*pos])
            .sum();
        weight.max(1)
    }

    /// The current value of every variable; only meaningful when all
    /// variables are assigned.
    pub fn current_values(&self) -> Vec<i64> {
        self.variables
            .iter()
            .map(|variable| variable.assigned_value(&self.store))
            .collect()
    }

    /// Total cost of a complete assignment in the *original* (pre-EPT) cost
    /// tables, in internal units.
    pub fn assignment_cost(&self, values: &[i64]) -> Cost {
        calabash_assert_eq_simple!(values.len(), self.variables.len());
        let mut total = self.original_lower_bound();
        for (variable, &value) in self.variables.iter().zip(values) {
            if variable.is_enumerated() {
                let unary = variable.original_unary_cost(&self.store, value as usize);
                total = saturating_add(total, unary);
            }
        }
        let mut tuple = Vec::new();
        for id in self.functions.keys() {
            let function = &self.functions[id];
            tuple.clear();
            tuple.extend(
                function
                    .scope()
                    .iter()
                    .map(|&variable| values[variable.index()] as usize),
            );
            total = saturating_add(total, function.original_cost(&tuple));
        }
        total
    }

    // ------------------------------------------------------------------
    // Reversibility.
    // ------------------------------------------------------------------

    pub fn depth(&self) -> usize {
        self.store.depth()
    }

    pub fn store_frame(&mut self) {
        self.store.store_frame();
    }

    /// Rewind the reversible state to `depth`. Pending queue entries are
    /// kept: every enforcement rechecks the current state, so stale entries
    /// are harmless, and bound-tightening notifications must survive the
    /// backtrack.
    pub fn restore(&mut self, depth: usize) {
        self.store.restore(depth);
    }

    // ------------------------------------------------------------------
    // Search-facing mutators.
    // ------------------------------------------------------------------

    pub fn assign(&mut self, variable: VariableId, value: i64) -> PropagationStatus {
        let (mut ctx, _) = self.split();
        ctx.assign(variable, value)
    }

    pub fn remove(&mut self, variable: VariableId, value: usize) -> PropagationStatus {
        let (mut ctx, _) = self.split();
        ctx.remove(variable, value)
    }

    pub fn increase(&mut self, variable: VariableId, bound: i64) -> PropagationStatus {
        let (mut ctx, _) = self.split();
        ctx.increase(variable, bound)
    }

    pub fn decrease(&mut self, variable: VariableId, bound: i64) -> PropagationStatus {
        let (mut ctx, _) = self.split();
        ctx.decrease(variable, bound)
    }

    // ------------------------------------------------------------------
    // Propagation.
    // ------------------------------------------------------------------

    fn split(&mut self) -> (
        PropagationContext<'_>,
        &KeyedVec<CostFunctionId, Box<dyn CostFunction>>,
    ) {
        let Wcsp {
            id,
            store,
            variables,
            functions,
            queues,
            listeners,
            lb,
            ub,
            options,
            ..
        } = self;
        (
            PropagationContext {
                store,
                variables,
                queues,
                listeners,
                problem_id: *id,
                lb: *lb,
                ub: *ub,
                nary_projection_threshold: options.nary_projection_threshold,
            },
            functions,
        )
    }

    /// Run the propagation queues to fixpoint with the deterministic priority
    /// NC before AC before DAC before EAC before DEE.
    pub fn propagate(&mut self) -> PropagationStatus {
        calabash_assert_simple!(self.closed, "close the problem before propagating");
        calabash_assert_simple!(!self.propagating, "propagation does not re-enter");
        self.propagating = true;
        let result = self.propagate_inner();
        self.propagating = false;
        if result.is_err() {
            self.queues.clear();
        }
        result
    }

    fn propagate_inner(&mut self) -> PropagationStatus {
        use ConsistencyLevel::*;

        let consistency = self.options.consistency;
        let prune = !self.options.enumerate;
        loop {
            if self.lower_bound() >= self.ub {
                return Err(Contradiction);
            }
            if let Some(variable) = self.queues.assigned.pop() {
                self.process_assigned(variable)?;
                continue;
            }
            if let Some(variable) = self.queues.nc.pop() {
                self.enforce_nc(variable)?;
                continue;
            }
            if consistency >= ArcConsistency {
                if let Some(variable) = self.queues.ac.pop() {
                    self.enforce_ac(variable);
                    continue;
                }
            }
            if consistency >= DirectedArcConsistency {
                if let Some(variable) = self.queues.dac.pop() {
                    self.enforce_dac(variable);
                    continue;
                }
            }
            if consistency >= ExistentialDirectedArcConsistency {
                if let Some(variable) = self.queues.eac.pop() {
                    self.enforce_eac(variable);
                    continue;
                }
            }
            if prune && self.options.dee > 0 {
                if let Some(variable) = self.queues.dee.pop() {
                    self.enforce_dee(variable)?;
                    continue;
                }
            }
            if prune {
                if let Some(variable) = self.queues.elim.pop() {
                    self.eliminate_if_free(variable)?;
                    continue;
                }
            }
            break;
        }
        // Entries of queues disabled at the current consistency level are
        // dropped so they cannot pile up across propagations.
        self.queues.clear();
        Ok(())
    }

    fn bump_conflict_weights(&mut self, id: CostFunctionId) {
        let scope: Vec<VariableId> = self.functions[id].scope().to_vec();
        for (pos, &variable) in scope.iter().enumerate() {
            if !self.variables[variable].is_assigned(&self.store) {
                self.conflict_weights[id][pos] += 1;
            }
        }
    }

    /// A contradiction surfaced while enforcing consistency on `variable` is
    /// attributed to every incident function: their cost transfers deposited
    /// the unary mass that crossed the bound. Deconnected functions count
    /// too, since an assignment projection deconnects the function right
    /// before node consistency trips over the projected costs.
    fn bump_incident_conflict_weights(&mut self, variable: VariableId) {
        let incident = self.variables[variable].incident.clone();
        for (id, _) in incident {
            self.bump_conflict_weights(id);
        }
    }

    /// Project and deconnect the functions whose scope just lost its last or
    /// second-to-last unassigned variable.
    fn process_assigned(&mut self, variable: VariableId) -> PropagationStatus {
        let incident = self.variables[variable].incident.clone();
        for (id, _) in incident {
            let (mut ctx, functions) = self.split();
            if !functions[id].is_connected(ctx.store) {
                continue;
            }
            if let Err(contradiction) = functions[id].on_assignment(&mut ctx) {
                self.bump_conflict_weights(id);
                return Err(contradiction);
            }
        }
        Ok(())
    }

    /// Node consistency: drop values whose unary cost crosses the bound and
    /// shift the unary minimum into the lower bound. A wiped-out domain or a
    /// bound overflow here counts against the incident functions.
    fn enforce_nc(&mut self, variable: VariableId) -> PropagationStatus {
        if !self.variables[variable].is_enumerated() {
            return Ok(());
        }
        let status = self.enforce_nc_inner(variable);
        if status.is_err() {
            self.bump_incident_conflict_weights(variable);
        }
        status
    }

    fn enforce_nc_inner(&mut self, variable: VariableId) -> PropagationStatus {
        let (mut ctx, _) = self.split();
        let values: Vec<(usize, Cost)> = {
            let view = ctx.view();
            let x = view.variable(variable);
            x.domain_iter(view.store)
                .map(|value| (value, x.unary_cost(view.store, value)))
                .collect()
        };
        for (value, unary) in values {
            if ctx.cutoff(unary) {
                ctx.remove(variable, value)?;
            }
        }

        let minimum = ctx.view().variable(variable).min_unary_cost(ctx.store);
        if minimum > 0 {
            let values: Vec<usize> = ctx
                .view()
                .variable(variable)
                .domain_iter(ctx.store)
                .collect();
            for value in values {
                ctx.project_unary(variable, value, -minimum);
            }
            ctx.increase_lb(minimum)?;
        }
        Ok(())
    }

    /// Arc consistency: the domain of `variable` changed, so the supports of
    /// its companions through every incident function are re-established.
    fn enforce_ac(&mut self, variable: VariableId) {
        let incident = self.variables[variable].incident.clone();
        for (id, pos) in incident {
            let (mut ctx, functions) = self.split();
            let function = &functions[id];
            if !function.is_connected(ctx.store) {
                continue;
            }
            for other in 0..function.arity() {
                if other != pos {
                    function.find_supports(&mut ctx, other);
                }
            }
        }
    }

    /// Directed arc consistency: re-establish full supports of the scope
    /// variables earlier than `variable` in the DAC order.
    fn enforce_dac(&mut self, variable: VariableId) {
        let rank = self.dac_rank[variable.index()];
        let incident = self.variables[variable].incident.clone();
        for (id, pos) in incident {
            let earlier: Vec<usize> = self.functions[id]
                .scope()
                .iter()
                .enumerate()
                .filter(|&(other, companion)| {
                    other != pos && self.dac_rank[companion.index()] < rank
                })
                .map(|(other, _)| other)
                .collect();
            if earlier.is_empty() {
                continue;
            }
            let (mut ctx, functions) = self.split();
            if !functions[id].is_connected(ctx.store) {
                continue;
            }
            for other in earlier {
                functions[id].find_full_supports(&mut ctx, other);
            }
        }
    }

    /// Existential directed arc consistency of one variable: some value must
    /// be fully supported at zero cost across all incident functions;
    /// otherwise full supports are enforced so that node consistency can lift
    /// the deficiency into the lower bound.
    fn enforce_eac(&mut self, variable: VariableId) {
        if !self.variables[variable].is_enumerated()
            || self.variables[variable].is_assigned(&self.store)
        {
            return;
        }
        let (mut ctx, functions) = self.split();
        let incident: Vec<(CostFunctionId, usize)> = ctx.view().variables[variable]
            .incident
            .iter()
            .copied()
            .filter(|(id, _)| functions[*id].is_connected(ctx.store))
            .collect();

        let deficiency = {
            let view = ctx.view();
            let x = view.variable(variable);
            x.domain_iter(view.store)
                .map(|value| {
                    let mut cost = x.unary_cost(view.store, value);
                    for &(id, pos) in &incident {
                        cost = saturating_add(
                            cost,
                            functions[id].full_support_cost(view, pos, value),
                        );
                    }
                    cost
                })
                .min()
                .unwrap_or(0)
        };
        if deficiency == 0 {
            return;
        }
        for (id, pos) in incident {
            functions[id].find_full_supports(&mut ctx, pos);
        }
        ctx.queues.nc.push(variable);
    }

    /// Dead-end elimination: remove values dominated by the unary-minimum
    /// value over all completions. Like node consistency, a contradiction is
    /// charged to the incident functions.
    fn enforce_dee(&mut self, variable: VariableId) -> PropagationStatus {
        if !self.variables[variable].is_enumerated()
            || self.variables[variable].is_assigned(&self.store)
        {
            return Ok(());
        }
        let status = self.enforce_dee_inner(variable);
        if status.is_err() {
            self.bump_incident_conflict_weights(variable);
        }
        status
    }

    fn enforce_dee_inner(&mut self, variable: VariableId) -> PropagationStatus {
        let (mut ctx, functions) = self.split();
        let incident: Vec<(CostFunctionId, usize)> = ctx.view().variables[variable]
            .incident
            .iter()
            .copied()
            .filter(|(id, _)| functions[*id].is_connected(ctx.store))
            .collect();

        let (candidate, candidate_unary, values) = {
            let view = ctx.view();
            let x = view.variable(variable);
            let candidate = x.unary_support(view.store);
            (
                candidate,
                x.unary_cost(view.store, candidate),
                x.domain_iter(view.store).collect::<Vec<usize>>(),
            )
        };

        for value in values {
            if value == candidate {
                continue;
            }
            let mut worst = candidate_unary;
            let mut decided = true;
            {
                let view = ctx.view();
                for &(id, pos) in &incident {
                    match functions[id].worst_advantage(view, pos, candidate, value) {
                        Some(advantage) => worst = worst.saturating_add(advantage),
                        None => {
                            decided = false;
                            break;
                        }
                    }
                }
            }
            if decided && worst <= ctx.view().variable(variable).unary_cost(ctx.store, value) {
                ctx.remove(variable, value)?;
            }
        }
        Ok(())
    }

    /// A variable whose last incident function deconnected is constrained by
    /// nothing; assign it its cheapest value.
    fn eliminate_if_free(&mut self, variable: VariableId) -> PropagationStatus {
        if self.variables[variable].is_assigned(&self.store) {
            return Ok(());
        }
        let connected = self.variables[variable]
            .incident
            .iter()
            .any(|(id, _)| self.functions[*id].is_connected(&self.store));
        if connected {
            return Ok(());
        }
        let value = if self.variables[variable].is_enumerated() {
            self.variables[variable].unary_support(&self.store) as i64
        } else {
            self.variables[variable].inf(&self.store)
        };
        let (mut ctx, _) = self.split();
        ctx.assign(variable, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DomainEvent;

    /// Effective total of a complete assignment in the current (post-EPT)
    /// state: `lb` plus the unary costs plus the connected functions.
    fn effective_cost(wcsp: &Wcsp, values: &[i64]) -> Cost {
        let store = wcsp.store();
        let mut total = wcsp.lower_bound();
        for (variable, &value) in wcsp.variable_ids().zip(values) {
            let x = wcsp.variable(variable);
            if x.is_enumerated() {
                total = saturating_add(total, x.unary_cost(store, value as usize));
            }
        }
        let mut tuple = Vec::new();
        for (_, function) in wcsp.functions() {
            if !function.is_connected(store) {
                continue;
            }
            tuple.clear();
            tuple.extend(
                function
                    .scope()
                    .iter()
                    .map(|&variable| values[variable.index()] as usize),
            );
            total = saturating_add(total, function.eval(store, &tuple));
        }
        total
    }

    fn two_variable_problem() -> (Wcsp, VariableId, VariableId) {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(3, "x");
        let y = wcsp.new_enumerated_variable(3, "y");
        wcsp.post_unary(x, &[1, 0, 2]);
        wcsp.post_unary(y, &[0, 3, 1]);
        let costs = vec![
            2, 0, 1, //
            4, 1, 0, //
            0, 2, 3,
        ];
        let _ = wcsp.post_binary(x, y, costs);
        wcsp.update_upper_bound(50);
        (wcsp, x, y)
    }

    #[test]
    fn nc_projects_the_unary_minimum_into_the_lower_bound() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(3, "x");
        wcsp.post_unary(x, &[5, 2, 7]);
        wcsp.update_upper_bound(10);
        wcsp.close();

        assert!(wcsp.propagate().is_ok());
        assert_eq!(wcsp.lower_bound(), 2);
        let store = wcsp.store();
        assert_eq!(wcsp.variable(x).unary_cost(store, 0), 3);
        assert_eq!(wcsp.variable(x).unary_cost(store, 1), 0);
        assert_eq!(wcsp.variable(x).unary_cost(store, 2), 5);
    }

    #[test]
    fn nc_prunes_values_crossing_the_bound() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(3, "x");
        wcsp.post_unary(x, &[5, 2, 7]);
        wcsp.update_upper_bound(6);
        wcsp.close();

        assert!(wcsp.propagate().is_ok());
        let store = wcsp.store();
        assert_eq!(wcsp.lower_bound(), 2);
        assert!(wcsp.variable(x).contains(store, 0));
        assert!(wcsp.variable(x).contains(store, 1));
        assert!(!wcsp.variable(x).contains(store, 2));
    }

    #[test]
    fn propagation_preserves_effective_totals() {
        let (mut wcsp, _, _) = two_variable_problem();
        wcsp.close();
        let originals: Vec<Cost> = (0..3)
            .flat_map(|a| (0..3).map(move |b| (a, b)))
            .map(|(a, b)| wcsp.assignment_cost(&[a, b]))
            .collect();

        assert!(wcsp.propagate().is_ok());

        let store = wcsp.store();
        let mut index = 0;
        for a in 0..3 {
            for b in 0..3 {
                let x = wcsp.variable_ids().next().unwrap();
                let y = wcsp.variable_ids().nth(1).unwrap();
                if wcsp.variable(x).contains(store, a) && wcsp.variable(y).contains(store, b) {
                    assert_eq!(
                        effective_cost(&wcsp, &[a, b]),
                        originals[index],
                        "assignment ({a}, {b})"
                    );
                }
                index += 1;
            }
        }
        // Propagation moved some cost into the lower bound.
        assert!(wcsp.lower_bound() > 0);
        assert!(wcsp.lower_bound() <= originals.iter().copied().min().unwrap());
    }

    #[test]
    fn assignment_projects_the_function_away() {
        let (mut wcsp, x, y) = two_variable_problem();
        wcsp.close();
        assert!(wcsp.propagate().is_ok());

        let original = wcsp.assignment_cost(&[2, 0]);
        assert!(wcsp.assign(x, 2).is_ok());
        assert!(wcsp.propagate().is_ok());

        let store = wcsp.store();
        let all_deconnected = wcsp
            .functions()
            .all(|(_, function)| !function.is_connected(store));
        assert!(all_deconnected);
        // With the function folded into unaries, the effective total of the
        // best completion still matches the original table.
        assert_eq!(effective_cost(&wcsp, &[2, 0]), original);
        assert!(wcsp.variable(y).contains(store, 0));
    }

    #[test]
    fn restore_rewinds_bounds_domains_and_unaries() {
        let (mut wcsp, x, y) = two_variable_problem();
        wcsp.close();
        assert!(wcsp.propagate().is_ok());

        let lb = wcsp.lower_bound();
        let sizes: Vec<u64> = wcsp
            .variable_ids()
            .map(|v| wcsp.variable(v).size(wcsp.store()))
            .collect();
        let unaries: Vec<Cost> = wcsp
            .variable(x)
            .domain_iter(wcsp.store())
            .map(|value| wcsp.variable(x).unary_cost(wcsp.store(), value))
            .collect();

        let depth = wcsp.depth();
        wcsp.store_frame();
        assert!(wcsp.assign(y, 1).is_ok());
        let _ = wcsp.propagate();
        wcsp.restore(depth);

        assert_eq!(wcsp.lower_bound(), lb);
        let restored_sizes: Vec<u64> = wcsp
            .variable_ids()
            .map(|v| wcsp.variable(v).size(wcsp.store()))
            .collect();
        assert_eq!(restored_sizes, sizes);
        let restored_unaries: Vec<Cost> = wcsp
            .variable(x)
            .domain_iter(wcsp.store())
            .map(|value| wcsp.variable(x).unary_cost(wcsp.store(), value))
            .collect();
        assert_eq!(restored_unaries, unaries);
    }

    #[test]
    fn preprocessing_contradiction_when_no_assignment_fits_the_bound() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(2, "x");
        wcsp.post_unary(x, &[3, 4]);
        wcsp.update_upper_bound(2);
        wcsp.close();

        assert!(wcsp.propagate().is_err());
    }

    #[test]
    fn degree_zero_variables_are_assigned_their_cheapest_value() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(2, "x");
        let y = wcsp.new_enumerated_variable(2, "y");
        wcsp.post_unary(y, &[1, 0]);
        // x = y as a soft equality, so that assigning x disconnects it.
        let _ = wcsp.post_binary(x, y, vec![0, 1, 1, 0]);
        wcsp.update_upper_bound(10);
        wcsp.close();

        assert!(wcsp.propagate().is_ok());
        assert!(wcsp.assign(x, 1).is_ok());
        assert!(wcsp.propagate().is_ok());
        // The binary projected itself away, leaving y unconstrained; the
        // elimination queue assigned it its cheapest value.
        assert!(wcsp.variable(y).is_assigned(wcsp.store()));
        assert_eq!(wcsp.variable(y).assigned_value(wcsp.store()), 1);
    }

    #[test]
    fn nc_wipeouts_count_against_the_incident_functions() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(2, "x");
        let y = wcsp.new_enumerated_variable(2, "y");
        let z = wcsp.new_enumerated_variable(2, "z");
        // x = 0 is incompatible with every value of y; z is tied to y by a
        // second function so it witnesses the conflict attribution.
        let _ = wcsp.post_binary(x, y, vec![5, 5, 0, 0]);
        let _ = wcsp.post_binary(y, z, vec![0, 0, 0, 0]);
        wcsp.update_upper_bound(3);
        wcsp.options_mut().consistency = ConsistencyLevel::NodeConsistency;
        wcsp.close();
        assert!(wcsp.propagate().is_ok());

        let before = wcsp.weighted_degree(z);
        let depth = wcsp.depth();
        wcsp.store_frame();
        assert!(wcsp.assign(x, 0).is_ok());
        // The assignment projects the incompatible row into y, whose domain
        // is then wiped out by node consistency.
        assert!(wcsp.propagate().is_err());
        wcsp.restore(depth);

        assert!(
            wcsp.weighted_degree(z) > before,
            "the wipeout of y counts against the functions incident to y"
        );
    }

    #[test]
    fn listeners_observe_domain_events() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder {
            events: Rc<RefCell<Vec<(u32, DomainEvent)>>>,
        }
        impl DomainListener for Recorder {
            fn on_event(&mut self, problem: u32, _variable: VariableId, event: DomainEvent) {
                self.events.borrow_mut().push((problem, event));
            }
        }

        let events = Rc::new(RefCell::new(Vec::new()));
        let mut wcsp = Wcsp::with_id(7);
        let x = wcsp.new_enumerated_variable(3, "x");
        wcsp.register_listener(Box::new(Recorder {
            events: Rc::clone(&events),
        }));
        wcsp.update_upper_bound(100);
        wcsp.close();

        assert!(wcsp.remove(x, 0).is_ok());
        assert!(wcsp.assign(x, 2).is_ok());

        let seen = events.borrow();
        assert!(seen
            .iter()
            .any(|&(problem, event)| problem == 7 && event == DomainEvent::Removal));
        assert!(seen
            .iter()
            .any(|&(problem, event)| problem == 7 && event == DomainEvent::Assign));
    }
}
