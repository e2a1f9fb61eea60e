//! Quadratic pseudo-Boolean optimisation input.
//!
//! `<n> <m>` followed by `m` terms `<i> <j> <coefficient>` with 1-based
//! variable indices; `i == j` is a linear term charged when `x_i = 1`,
//! `i != j` a quadratic term charged when both variables are 1. Negative
//! coefficients are shifted into `neg_cost` when the tables are posted, so
//! reported costs stay in the original units. Maximisation is handled by the
//! caller negating the cost multiplier.

use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::parsers::malformed;
use crate::parsers::FunctionAccumulator;
use crate::parsers::ParseError;
use crate::parsers::TokenStream;

pub fn parse_qpbo(input: &str, scale: CostScale) -> Result<Wcsp, ParseError> {
    let mut tokens = TokenStream::new(input, &["#", "c"]);
    let mut wcsp = Wcsp::new();
    wcsp.set_name("qpbo");
    wcsp.set_cost_scale(scale);

    let num_variables = tokens.next_usize("variable count")?;
    let num_terms = tokens.next_usize("term count")?;

    let variables: Vec<VariableId> = (0..num_variables)
        .map(|index| wcsp.new_enumerated_variable(2, format!("x{}", index + 1)))
        .collect();

    let mut accumulator = FunctionAccumulator::default();
    let mut magnitude: Cost = 1;

    for _ in 0..num_terms {
        let line = tokens.line();
        let i = tokens.next_usize("row index")?;
        let j = tokens.next_usize("column index")?;
        let coefficient = tokens.next("coefficient")?;
        if i == 0 || i > num_variables || j == 0 || j > num_variables {
            return Err(malformed(line, "term indices are 1-based variable indices"));
        }
        let cost = scale.decimal_to_cost(coefficient)?;
        magnitude = saturating_add(magnitude, cost.abs());

        if i == j {
            accumulator.add_unary(&mut wcsp, variables[i - 1], vec![0, cost]);
        } else {
            // Charged only on the (1, 1) tuple.
            let mut costs = vec![0; 4];
            costs[3] = cost;
            accumulator.add_binary(&mut wcsp, variables[i - 1], variables[j - 1], costs);
        }
    }

    if !tokens.is_exhausted() {
        return Err(malformed(tokens.line(), "trailing input after the last term"));
    }

    accumulator.post_all(&mut wcsp);
    // Any assignment costs at most the sum of coefficient magnitudes.
    wcsp.update_external_upper_bound(magnitude);
    Ok(wcsp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_and_quadratic_terms_build_tables() {
        // 2 x0 + 3 x1 - 5 x0 x1
        let wcsp = parse_qpbo("2 3\n1 1 2\n2 2 3\n1 2 -5\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.num_variables(), 2);
        // The quadratic table was shifted by 5 to stay non-negative.
        assert_eq!(wcsp.neg_cost(), 5);
        // Internal costs are original plus the shift.
        assert_eq!(wcsp.assignment_cost(&[0, 0]), 5);
        assert_eq!(wcsp.assignment_cost(&[1, 1]), 5);
        assert_eq!(wcsp.assignment_cost(&[1, 0]), 7);
        assert_eq!(wcsp.assignment_cost(&[0, 1]), 8);
    }

    #[test]
    fn repeated_terms_accumulate() {
        let wcsp = parse_qpbo("1 2\n1 1 2\n1 1 3\n", CostScale::default()).unwrap();
        assert_eq!(wcsp.assignment_cost(&[1]), 5);
        assert_eq!(wcsp.assignment_cost(&[0]), 0);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        assert!(parse_qpbo("1 1\n1 2 4\n", CostScale::default()).is_err());
    }
}
