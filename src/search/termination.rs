//! Conditions under which the search gives up early.
//!
//! The solver polls its [`TerminationCondition`] between choice points; when
//! it triggers, the search unwinds cleanly and the best solution found so far
//! is reported. Cancellation is never checked inside a propagation fixpoint,
//! matching the engine's single-threaded cooperative model.

use std::time::Duration;
use std::time::Instant;

/// Decides when the solver should stop searching without a conclusion.
pub trait TerminationCondition {
    /// Polled between search nodes; `true` stops the search.
    fn should_stop(&mut self) -> bool;

    /// Called once per opened choice point, for budgets counted in nodes.
    fn notify_node(&mut self) {}
}

/// Never stops; the search runs to completion.
#[derive(Debug, Copy, Clone)]
pub struct Indefinite;

impl TerminationCondition for Indefinite {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Stop once a wall-clock budget has elapsed.
#[derive(Debug, Copy, Clone)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    pub fn starting_now(budget: Duration) -> TimeBudget {
        TimeBudget {
            deadline: Instant::now() + budget,
        }
    }
}

impl TerminationCondition for TimeBudget {
    fn should_stop(&mut self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Stop after a fixed number of search nodes.
#[derive(Debug, Copy, Clone)]
pub struct NodeBudget {
    budget: u64,
    num_nodes: u64,
}

impl NodeBudget {
    pub fn new(budget: u64) -> NodeBudget {
        NodeBudget {
            budget,
            num_nodes: 0,
        }
    }
}

impl TerminationCondition for NodeBudget {
    fn should_stop(&mut self) -> bool {
        self.num_nodes >= self.budget
    }

    fn notify_node(&mut self) {
        self.num_nodes += 1;
    }
}

/// The command line's resource limits in one condition: an optional
/// wall-clock budget and an optional node budget, whichever is exhausted
/// first. With neither set it behaves like [`Indefinite`].
#[derive(Debug, Copy, Clone)]
pub struct ResourceLimits {
    deadline: Option<Instant>,
    node_budget: Option<u64>,
    num_nodes: u64,
}

impl ResourceLimits {
    pub fn new(time_budget: Option<Duration>, node_budget: Option<u64>) -> ResourceLimits {
        ResourceLimits {
            deadline: time_budget.map(|budget| Instant::now() + budget),
            node_budget,
            num_nodes: 0,
        }
    }
}

impl TerminationCondition for ResourceLimits {
    fn should_stop(&mut self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        self.node_budget
            .map_or(false, |budget| self.num_nodes >= budget)
    }

    fn notify_node(&mut self) {
        self.num_nodes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_budget_triggers_after_the_budget() {
        let mut budget = NodeBudget::new(2);
        assert!(!budget.should_stop());
        budget.notify_node();
        budget.notify_node();
        assert!(budget.should_stop());
    }

    #[test]
    fn resource_limits_without_budgets_never_stop() {
        let mut limits = ResourceLimits::new(None, None);
        limits.notify_node();
        assert!(!limits.should_stop());
    }

    #[test]
    fn resource_limits_stop_on_the_node_budget() {
        let mut limits = ResourceLimits::new(None, Some(1));
        assert!(!limits.should_stop());
        limits.notify_node();
        assert!(limits.should_stop());
    }

    #[test]
    fn elapsed_time_budget_stops_immediately() {
        let mut limits = ResourceLimits::new(Some(Duration::ZERO), None);
        assert!(limits.should_stop());
    }
}
