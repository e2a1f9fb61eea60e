//! Weighted DIMACS (`wcnf`) and plain DIMACS (`cnf`) input.
//!
//! Every clause becomes a cost function charging the clause weight on its
//! single violating tuple. The `top` weight of the header marks hard clauses;
//! it becomes the strict upper bound, so hard violations are forbidden.

use std::collections::BTreeMap;

use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::parsers::malformed;
use crate::parsers::FunctionAccumulator;
use crate::parsers::ParseError;
use crate::parsers::TokenStream;

pub fn parse_wcnf(input: &str, scale: CostScale) -> Result<Wcsp, ParseError> {
    let mut tokens = TokenStream::new(input, &["c"]);
    let mut wcsp = Wcsp::new();
    wcsp.set_cost_scale(scale);

    let header_line = tokens.line();
    if tokens.next("problem line")? != "p" {
        return Err(malformed(header_line, "expected the 'p' problem line"));
    }
    let format = tokens.next("format")?;
    let weighted = match format {
        "wcnf" => true,
        "cnf" => false,
        _ => {
            return Err(malformed(
                header_line,
                format!("unsupported format '{format}'"),
            ))
        }
    };
    wcsp.set_name(format);
    let num_variables = tokens.next_usize("variable count")?;
    let num_clauses = tokens.next_usize("clause count")?;
    // The top weight is optional; without it every clause is soft.
    let top = if weighted && tokens.peek_line() == Some(header_line) {
        Some(tokens.next_i64("top weight")?)
    } else {
        None
    };

    let variables: Vec<VariableId> = (0..num_variables)
        .map(|index| wcsp.new_enumerated_variable(2, format!("x{}", index + 1)))
        .collect();

    let mut accumulator = FunctionAccumulator::default();
    let mut soft_total: Cost = 1;

    for _ in 0..num_clauses {
        let line = tokens.line();
        let weight = if weighted {
            tokens.next_i64("clause weight")?
        } else {
            1
        };
        if weight < 0 {
            return Err(malformed(line, "clause weights are non-negative"));
        }

        // The clause literals, terminated by 0.
        let mut scope: Vec<VariableId> = Vec::new();
        let mut violation: Vec<usize> = Vec::new();
        let mut tautological = false;
        loop {
            let line = tokens.line();
            let literal = tokens.next_i64("literal")?;
            if literal == 0 {
                break;
            }
            let index = literal.unsigned_abs() as usize;
            if index == 0 || index > num_variables {
                return Err(malformed(line, format!("unknown variable {index}")));
            }
            let variable = variables[index - 1];
            // A positive literal is violated by value 0 (false), a negative
            // one by value 1 (true).
            let violating_value = usize::from(literal < 0);
            match scope.iter().position(|&scoped| scoped == variable) {
                Some(position) => {
                    if violation[position] != violating_value {
                        tautological = true;
                    }
                }
                None => {
                    scope.push(variable);
                    violation.push(violating_value);
                }
            }
        }

        if tautological || weight == 0 {
            continue;
        }
        let is_hard = top.is_some_and(|top| weight >= top);
        let cost = scale.integer_to_cost(weight)?;
        if !is_hard {
            soft_total = saturating_add(soft_total, cost);
        }

        if scope.is_empty() {
            // An empty clause is violated by every assignment.
            wcsp.post_constant(cost);
            continue;
        }
        post_clause(&mut wcsp, &mut accumulator, &scope, &violation, cost);
    }

    if !tokens.is_exhausted() {
        return Err(malformed(tokens.line(), "trailing input after the last clause"));
    }

    accumulator.post_all(&mut wcsp);
    let external_ub = match top {
        Some(top) => scale.integer_to_cost(top)?,
        None => soft_total,
    };
    wcsp.update_external_upper_bound(external_ub);
    Ok(wcsp)
}

fn post_clause(
    wcsp: &mut Wcsp,
    accumulator: &mut FunctionAccumulator,
    scope: &[VariableId],
    violation: &[usize],
    cost: Cost,
) {
    match scope.len() {
        1 => {
            let mut costs = vec![0; 2];
            costs[violation[0]] = cost;
            accumulator.add_unary(wcsp, scope[0], costs);
        }
        2 => {
            let mut costs = vec![0; 4];
            costs[violation[0] * 2 + violation[1]] = cost;
            accumulator.add_binary(wcsp, scope[0], scope[1], costs);
        }
        3 => {
            let mut costs = vec![0; 8];
            costs[(violation[0] * 2 + violation[1]) * 2 + violation[2]] = cost;
            accumulator.add_ternary(wcsp, [scope[0], scope[1], scope[2]], costs);
        }
        _ => {
            let mut tuples = BTreeMap::new();
            let _ = tuples.insert(violation.to_vec(), cost);
            let _ = wcsp.post_tuples(scope, 0, tuples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clauses_charge_their_violating_tuple() {
        // (x1 v -x2) with weight 3.
        let wcsp = parse_wcnf("p wcnf 2 1 100\n3 1 -2 0\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.num_variables(), 2);
        assert_eq!(wcsp.num_functions(), 1);
        // x1 = 0, x2 = 1 violates the clause.
        assert_eq!(wcsp.assignment_cost(&[0, 1]), 3);
        assert_eq!(wcsp.assignment_cost(&[1, 0]), 0);
        assert_eq!(wcsp.assignment_cost(&[1, 1]), 0);
    }

    #[test]
    fn tautological_clauses_are_dropped() {
        let wcsp = parse_wcnf("p wcnf 1 1 10\n3 1 -1 0\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.num_functions(), 0);
    }

    #[test]
    fn plain_cnf_counts_violated_clauses() {
        let wcsp = parse_wcnf("p cnf 2 2\n1 2 0\n-1 -2 0\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.assignment_cost(&[0, 0]), 1);
        assert_eq!(wcsp.assignment_cost(&[1, 1]), 1);
        assert_eq!(wcsp.assignment_cost(&[0, 1]), 0);
    }

    #[test]
    fn missing_problem_line_is_rejected() {
        assert!(parse_wcnf("1 -2 0\n", CostScale::default()).is_err());
    }
}
