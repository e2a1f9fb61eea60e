use crate::engine::VariableId;
use crate::engine::Wcsp;

/// The branching variable heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableOrdering {
    /// Smallest ratio of current domain size to accumulated conflict weight,
    /// ties broken towards the smaller index.
    #[default]
    MinDomainOverWeightedDegree,
    /// First unassigned variable in definition order.
    InputOrder,
}

/// Select the next branching variable, preferring the last conflicting
/// variable for as long as it is unassigned.
pub(crate) fn select_variable(
    wcsp: &Wcsp,
    ordering: VariableOrdering,
    last_conflict: Option<VariableId>,
) -> Option<VariableId> {
    let store = wcsp.store();
    if let Some(variable) = last_conflict {
        if !wcsp.variable(variable).is_assigned(store) {
            return Some(variable);
        }
    }

    match ordering {
        VariableOrdering::InputOrder => wcsp
            .variable_ids()
            .find(|&variable| !wcsp.variable(variable).is_assigned(store)),
        VariableOrdering::MinDomainOverWeightedDegree => {
            let mut best: Option<(f64, VariableId)> = None;
            for variable in wcsp.variable_ids() {
                if wcsp.variable(variable).is_assigned(store) {
                    continue;
                }
                let size = wcsp.variable(variable).size(store) as f64;
                let ratio = size / wcsp.weighted_degree(variable) as f64;
                if best.map_or(true, |(incumbent, _)| ratio < incumbent) {
                    best = Some((ratio, variable));
                }
            }
            best.map(|(_, variable)| variable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_smaller_domains() {
        let mut wcsp = Wcsp::new();
        let _x = wcsp.new_enumerated_variable(5, "x");
        let y = wcsp.new_enumerated_variable(2, "y");
        wcsp.close();

        let selected =
            select_variable(&wcsp, VariableOrdering::MinDomainOverWeightedDegree, None);
        assert_eq!(selected, Some(y));
    }

    #[test]
    fn last_conflict_takes_priority() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(5, "x");
        let _y = wcsp.new_enumerated_variable(2, "y");
        wcsp.close();

        let selected = select_variable(
            &wcsp,
            VariableOrdering::MinDomainOverWeightedDegree,
            Some(x),
        );
        assert_eq!(selected, Some(x));
    }

    #[test]
    fn returns_none_when_everything_is_assigned() {
        let mut wcsp = Wcsp::new();
        let x = wcsp.new_enumerated_variable(1, "x");
        wcsp.close();

        assert!(wcsp.variable(x).is_assigned(wcsp.store()));
        assert_eq!(
            select_variable(&wcsp, VariableOrdering::InputOrder, None),
            None
        );
    }
}
