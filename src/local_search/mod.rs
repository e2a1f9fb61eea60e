//! Stochastic local search used to seed the initial upper bound.
//!
//! A min-conflicts descent with random-walk noise over the original cost
//! tables. The routine never touches the reversible store: it evaluates
//! candidate assignments through the read-only original-cost accessors and
//! reports the best total it saw, which the solver uses to tighten the bound
//! before the tree search starts.

use log::debug;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::Solution;
use crate::containers::StorageKey;
use crate::cost_function::CostFunction;
use crate::engine::VariableId;
use crate::engine::Wcsp;

#[derive(Debug, Clone, Copy)]
pub struct LocalSearchOptions {
    /// Number of single-variable moves to attempt.
    pub max_moves: u64,
    /// Probability of a random walk move instead of the best improving one.
    pub noise: f64,
}

impl Default for LocalSearchOptions {
    fn default() -> Self {
        LocalSearchOptions {
            max_moves: 10_000,
            noise: 0.1,
        }
    }
}

/// Search for a feasible assignment cheaper than the current upper bound.
pub(crate) fn seed_upper_bound(
    wcsp: &Wcsp,
    options: &LocalSearchOptions,
    rng: &mut SmallRng,
) -> Option<Solution> {
    let store = wcsp.store();
    if wcsp.num_variables() == 0 {
        return None;
    }
    if wcsp
        .variable_ids()
        .any(|variable| !wcsp.variable(variable).is_enumerated())
    {
        debug!("upper-bound seeding skipped: the problem has interval variables");
        return None;
    }

    // Start from the cheapest unary value of every current domain.
    let mut values: Vec<i64> = wcsp
        .variable_ids()
        .map(|variable| wcsp.variable(variable).unary_support(store) as i64)
        .collect();
    let mut current = wcsp.assignment_cost(&values);
    let mut best_values = values.clone();
    let mut best = current;

    let num_variables = wcsp.num_variables();
    for _ in 0..options.max_moves {
        let variable = VariableId::create_from_index(rng.gen_range(0..num_variables));
        let candidates: Vec<i64> = wcsp
            .variable(variable)
            .domain_iter(store)
            .map(|value| value as i64)
            .filter(|&value| value != values[variable.index()])
            .collect();
        if candidates.is_empty() {
            continue;
        }

        let chosen = if rng.gen::<f64>() < options.noise {
            Some(candidates[rng.gen_range(0..candidates.len())])
        } else {
            let saved = values[variable.index()];
            let old_contribution = contribution(wcsp, &values, variable);
            candidates
                .into_iter()
                .map(|value| {
                    values[variable.index()] = value;
                    let delta = contribution(wcsp, &values, variable) - old_contribution;
                    values[variable.index()] = saved;
                    (value, delta)
                })
                .min_by_key(|&(_, delta)| delta)
                .filter(|&(_, delta)| delta < 0)
                .map(|(value, _)| value)
        };

        if let Some(value) = chosen {
            values[variable.index()] = value;
            current = wcsp.assignment_cost(&values);
            if current < best {
                best = current;
                best_values.clone_from(&values);
            }
        }
    }

    if best < wcsp.upper_bound() {
        Some(Solution::new(best_values, best))
    } else {
        None
    }
}

/// Cost mass attached to `variable` under `values`: its unary cost plus the
/// original cost of every incident function.
fn contribution(wcsp: &Wcsp, values: &[i64], variable: VariableId) -> Cost {
    let x = wcsp.variable(variable);
    let mut total = x.original_unary[values[variable.index()] as usize];
    let mut tuple = Vec::new();
    for &(id, _) in &x.incident {
        let function = wcsp.function(id);
        tuple.clear();
        tuple.extend(
            function
                .scope()
                .iter()
                .map(|&scoped| values[scoped.index()] as usize),
        );
        total = saturating_add(total, function.original_cost(&tuple));
    }
    total
}
