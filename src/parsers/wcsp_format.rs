//! The legacy `wcsp` text format.
//!
//! Header `<name> <N> <maxDomainSize> <numFunctions> <UB>`, then `N` domain
//! sizes (negative for interval variables), then the cost functions:
//! `<arity> <var1> ... <vark> <defaultCost> <numTuples>` followed by
//! `<val1> ... <valk> <cost>` lines. An arity of zero is a constant added to
//! the lower bound. A negative arity defines a shared table (and posts it); a
//! negative tuple count references a previously defined shared table by
//! 1-based index.

use std::collections::BTreeMap;

use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::parsers::malformed;
use crate::parsers::shift_sparse;
use crate::parsers::FunctionAccumulator;
use crate::parsers::ParseError;
use crate::parsers::TokenStream;

struct SharedTable {
    default_cost: Cost,
    tuples: Vec<(Vec<usize>, Cost)>,
    sizes: Vec<usize>,
}

pub fn parse_wcsp(input: &str, scale: CostScale) -> Result<Wcsp, ParseError> {
    let mut tokens = TokenStream::new(input, &["#"]);
    let mut wcsp = Wcsp::new();
    wcsp.set_cost_scale(scale);

    wcsp.set_name(tokens.next("problem name")?);
    let num_variables = tokens.next_usize("variable count")?;
    let _max_domain_size = tokens.next_usize("maximum domain size")?;
    let num_functions = tokens.next_usize("cost function count")?;
    let external_ub = scale.integer_to_cost(tokens.next_i64("upper bound")?)?;

    let mut variables = Vec::with_capacity(num_variables);
    for index in 0..num_variables {
        let line = tokens.line();
        let size = tokens.next_i64("domain size")?;
        if size < 0 {
            variables.push(wcsp.new_interval_variable(0, -size - 1, format!("x{index}")));
        } else if size == 0 {
            return Err(malformed(line, "variables must have a non-empty domain"));
        } else {
            variables.push(wcsp.new_enumerated_variable(size as usize, format!("x{index}")));
        }
    }

    let mut shared: Vec<SharedTable> = Vec::new();
    let mut accumulator = FunctionAccumulator::default();

    for _ in 0..num_functions {
        let line = tokens.line();
        let arity_token = tokens.next_i64("arity")?;
        let is_shared_definition = arity_token < 0;
        let arity = arity_token.unsigned_abs() as usize;

        let mut scope = Vec::with_capacity(arity);
        for _ in 0..arity {
            let line = tokens.line();
            let index = tokens.next_usize("variable index")?;
            let variable = *variables
                .get(index)
                .ok_or_else(|| malformed(line, format!("unknown variable {index}")))?;
            if scope.contains(&variable) {
                return Err(malformed(line, "duplicate variable in scope"));
            }
            scope.push(variable);
        }

        if arity == 0 {
            let cost = scale.integer_to_cost(tokens.next_i64("constant cost")?)?;
            let num_tuples = tokens.next_i64("tuple count")?;
            if num_tuples != 0 {
                return Err(malformed(line, "a constant cost function has no tuples"));
            }
            if cost < 0 {
                wcsp.add_neg_cost(-cost);
            } else {
                wcsp.post_constant(cost);
            }
            continue;
        }

        for &variable in &scope {
            if !wcsp.variable(variable).is_enumerated() {
                return Err(malformed(
                    line,
                    "cost functions in extension require enumerated variables",
                ));
            }
        }
        let sizes: Vec<usize> = scope
            .iter()
            .map(|&variable| wcsp.variable(variable).initial_size())
            .collect();

        let default_cost = scale.integer_to_cost(tokens.next_i64("default cost")?)?;
        let num_tuples = tokens.next_i64("tuple count")?;

        let (default_cost, tuples) = if num_tuples < 0 {
            if is_shared_definition {
                return Err(malformed(line, "a shared table cannot reference another"));
            }
            let reference = (-num_tuples) as usize;
            let table = shared.get(reference - 1).ok_or_else(|| {
                malformed(line, format!("unknown shared cost function {reference}"))
            })?;
            if table.sizes != sizes {
                return Err(malformed(
                    line,
                    "shared cost function reused with mismatching domain sizes",
                ));
            }
            (table.default_cost, table.tuples.clone())
        } else {
            let mut tuples = Vec::with_capacity(num_tuples as usize);
            for _ in 0..num_tuples {
                let mut tuple = Vec::with_capacity(arity);
                for position in 0..arity {
                    let line = tokens.line();
                    let value = tokens.next_usize("value index")?;
                    if value >= sizes[position] {
                        return Err(malformed(
                            line,
                            format!("value {value} outside the domain of {}", scope[position]),
                        ));
                    }
                    tuple.push(value);
                }
                let cost = scale.integer_to_cost(tokens.next_i64("tuple cost")?)?;
                tuples.push((tuple, cost));
            }
            (default_cost, tuples)
        };

        if is_shared_definition {
            shared.push(SharedTable {
                default_cost,
                tuples: tuples.clone(),
                sizes: sizes.clone(),
            });
        }
        post_table(&mut wcsp, &mut accumulator, &scope, &sizes, default_cost, tuples);
    }

    if !tokens.is_exhausted() {
        return Err(malformed(tokens.line(), "trailing input after the last cost function"));
    }

    accumulator.post_all(&mut wcsp);
    wcsp.update_external_upper_bound(external_ub);
    Ok(wcsp)
}

fn post_table(
    wcsp: &mut Wcsp,
    accumulator: &mut FunctionAccumulator,
    scope: &[VariableId],
    sizes: &[usize],
    default_cost: Cost,
    tuples: Vec<(Vec<usize>, Cost)>,
) {
    match scope.len() {
        1 => {
            let mut costs = vec![default_cost; sizes[0]];
            for (tuple, cost) in tuples {
                costs[tuple[0]] = cost;
            }
            accumulator.add_unary(wcsp, scope[0], costs);
        }
        2 => {
            let mut costs = vec![default_cost; sizes[0] * sizes[1]];
            for (tuple, cost) in tuples {
                costs[tuple[0] * sizes[1] + tuple[1]] = cost;
            }
            accumulator.add_binary(wcsp, scope[0], scope[1], costs);
        }
        3 => {
            let mut costs = vec![default_cost; sizes[0] * sizes[1] * sizes[2]];
            for (tuple, cost) in tuples {
                costs[(tuple[0] * sizes[1] + tuple[1]) * sizes[2] + tuple[2]] = cost;
            }
            accumulator.add_ternary(wcsp, [scope[0], scope[1], scope[2]], costs);
        }
        _ => {
            let mut map = BTreeMap::new();
            for (tuple, cost) in tuples {
                let _ = map.insert(tuple, cost);
            }
            let (default_cost, map) = shift_sparse(wcsp, default_cost, map);
            let _ = wcsp.post_tuples(scope, default_cost, map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_header_and_domains() {
        let wcsp = parse_wcsp(
            "tiny 2 3 1 10\n3 2\n1 0 0 1\n1 4\n",
            CostScale::default(),
        )
        .unwrap();
        assert_eq!(wcsp.name(), "tiny");
        assert_eq!(wcsp.num_variables(), 2);
        let x = wcsp.variable_ids().next().unwrap();
        assert_eq!(wcsp.variable(x).initial_size(), 3);
        assert_eq!(wcsp.upper_bound(), 10);
    }

    #[test]
    fn arity_zero_adds_to_the_lower_bound() {
        let wcsp = parse_wcsp("constant 1 2 1 100\n2\n0 7 0\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.lower_bound(), 7);
    }

    #[test]
    fn negative_domain_sizes_declare_interval_variables() {
        let wcsp = parse_wcsp("iv 1 10 0 5\n-10\n", CostScale::default()).unwrap();
        let x = wcsp.variable_ids().next().unwrap();
        assert!(!wcsp.variable(x).is_enumerated());
        assert_eq!(wcsp.variable(x).sup(wcsp.store()), 9);
    }

    #[test]
    fn shared_tables_are_reused_by_reference() {
        // Four variables, an equality-penalising table shared by two scopes.
        let input = "shared 4 4 2 1\n4 4 4 4\n\
                     -2 0 1 0 4\n0 0 1\n1 1 1\n2 2 1\n3 3 1\n\
                     2 2 3 0 -1\n";
        let wcsp = parse_wcsp(input, CostScale::default()).unwrap();
        assert_eq!(wcsp.num_functions(), 2);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(parse_wcsp("bad 1 2", CostScale::default()).is_err());
        assert!(parse_wcsp("bad x 2 0 10\n", CostScale::default()).is_err());
    }

    #[test]
    fn unknown_shared_references_are_rejected() {
        let input = "bad 2 2 1 10\n2 2\n2 0 1 0 -3\n";
        assert!(parse_wcsp(input, CostScale::default()).is_err());
    }
}
