use crate::basic_types::Solution;
use crate::containers::StorageKey;
use crate::engine::VariableId;
use crate::engine::Wcsp;

/// The branching value heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueOrdering {
    /// The value with the smallest unary cost.
    #[default]
    MinUnaryCost,
    /// Solution-based phase saving: reuse the incumbent solution's value
    /// while it is still in the domain, falling back to the unary minimum.
    PhaseSaving,
}

/// Select the branching value for an enumerated variable.
pub(crate) fn select_value(
    wcsp: &Wcsp,
    variable: VariableId,
    ordering: ValueOrdering,
    incumbent: Option<&Solution>,
) -> i64 {
    let store = wcsp.store();
    if ordering == ValueOrdering::PhaseSaving {
        if let Some(solution) = incumbent {
            let value = solution.value(variable.index());
            if wcsp.variable(variable).contains(store, value) {
                return value;
            }
        }
    }
    wcsp.variable(variable).unary_support(store) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_unary_minimum() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(3, "x");
        wcsp.post_unary(x, &[5, 2, 7]);
        wcsp.close();

        assert_eq!(
            select_value(&wcsp, x, ValueOrdering::MinUnaryCost, None),
            1
        );
    }

    #[test]
    fn phase_saving_reuses_the_incumbent() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(3, "x");
        wcsp.post_unary(x, &[5, 2, 7]);
        wcsp.close();

        let incumbent = Solution::new(vec![2], 7);
        assert_eq!(
            select_value(&wcsp, x, ValueOrdering::PhaseSaving, Some(&incumbent)),
            2
        );
    }
}
