//! UAI Markov-network input.
//!
//! Preamble `MARKOV`, the variable count, the domain sizes, the function
//! count and one scope line per function; then, per function, the table size
//! and its probabilities in row-major order. Probabilities convert to costs
//! via `round(-ln(p) * norm_factor)`; a zero probability is forbidden.

use std::collections::BTreeMap;

use crate::basic_types::CostScale;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::parsers::malformed;
use crate::parsers::unflatten;
use crate::parsers::FunctionAccumulator;
use crate::parsers::ParseError;
use crate::parsers::TokenStream;

pub fn parse_uai(input: &str, scale: CostScale) -> Result<Wcsp, ParseError> {
    let mut tokens = TokenStream::new(input, &["#", "//"]);
    let mut wcsp = Wcsp::new();
    wcsp.set_cost_scale(scale);

    let line = tokens.line();
    let preamble = tokens.next("preamble")?;
    if preamble != "MARKOV" && preamble != "BAYES" {
        return Err(malformed(line, "expected a MARKOV or BAYES preamble"));
    }
    wcsp.set_name(preamble);

    let num_variables = tokens.next_usize("variable count")?;
    let mut variables: Vec<VariableId> = Vec::with_capacity(num_variables);
    for index in 0..num_variables {
        let line = tokens.line();
        let size = tokens.next_usize("domain size")?;
        if size == 0 {
            return Err(malformed(line, "variables must have a non-empty domain"));
        }
        variables.push(wcsp.new_enumerated_variable(size, format!("x{index}")));
    }

    let num_functions = tokens.next_usize("function count")?;
    let mut scopes: Vec<Vec<VariableId>> = Vec::with_capacity(num_functions);
    for _ in 0..num_functions {
        let arity = tokens.next_usize("scope size")?;
        let mut scope = Vec::with_capacity(arity);
        for _ in 0..arity {
            let line = tokens.line();
            let index = tokens.next_usize("variable index")?;
            let variable = *variables
                .get(index)
                .ok_or_else(|| malformed(line, format!("unknown variable {index}")))?;
            scope.push(variable);
        }
        scopes.push(scope);
    }

    let mut accumulator = FunctionAccumulator::default();
    for scope in scopes {
        let line = tokens.line();
        let table_size = tokens.next_usize("table size")?;
        let expected: usize = scope
            .iter()
            .map(|&variable| wcsp.variable(variable).initial_size())
            .product();
        if table_size != expected {
            return Err(malformed(
                line,
                format!("table of size {table_size} does not match the scope ({expected})"),
            ));
        }
        let mut costs = Vec::with_capacity(table_size);
        for _ in 0..table_size {
            let probability = tokens.next_f64("probability")?;
            costs.push(scale.probability_to_cost(probability));
        }

        match scope.len() {
            0 => {}
            1 => accumulator.add_unary(&wcsp, scope[0], costs),
            2 => accumulator.add_binary(&wcsp, scope[0], scope[1], costs),
            3 => accumulator.add_ternary(&wcsp, [scope[0], scope[1], scope[2]], costs),
            _ => {
                let sizes: Vec<usize> = scope
                    .iter()
                    .map(|&variable| wcsp.variable(variable).initial_size())
                    .collect();
                let mut tuples = BTreeMap::new();
                for (index, &cost) in costs.iter().enumerate() {
                    if cost != 0 {
                        let _ = tuples.insert(unflatten(index, &sizes), cost);
                    }
                }
                let _ = wcsp.post_tuples(&scope, 0, tuples);
            }
        }
    }

    if !tokens.is_exhausted() {
        return Err(malformed(tokens.line(), "trailing input after the last table"));
    }
    accumulator.post_all(&mut wcsp);
    Ok(wcsp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_become_costs() {
        let input = "MARKOV\n2\n2 2\n1\n2 0 1\n4\n1.0 0.5 0.5 1.0\n";
        let wcsp = parse_uai(input, CostScale::with_precision(3)).unwrap();
        assert_eq!(wcsp.num_variables(), 2);
        // Agreeing tuples have probability 1, hence cost 0.
        assert_eq!(wcsp.assignment_cost(&[0, 0]), 0);
        assert!(wcsp.assignment_cost(&[0, 1]) > 0);
    }

    #[test]
    fn table_sizes_must_match_the_scope() {
        let input = "MARKOV\n1\n2\n1\n1 0\n3\n1.0 1.0 1.0\n";
        assert!(parse_uai(input, CostScale::default()).is_err());
    }

    #[test]
    fn unflatten_is_row_major() {
        assert_eq!(crate::parsers::unflatten(5, &[2, 3]), vec![1, 2]);
        assert_eq!(crate::parsers::unflatten(0, &[2, 3]), vec![0, 0]);
    }
}
