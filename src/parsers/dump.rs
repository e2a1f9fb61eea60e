//! Dump a problem back out in the legacy `wcsp` format.

use std::io::Write;

use itertools::Itertools;

use crate::basic_types::Cost;
use crate::containers::StorageKey;
use crate::cost_function::CostFunction;
use crate::engine::Wcsp;

/// Write the original (pre-search) problem in legacy `wcsp` text form:
/// the posted cost functions, the unary cost vectors as arity-1 functions and
/// the load-time constant as an arity-0 function.
pub fn dump_wcsp(wcsp: &Wcsp, writer: &mut dyn Write) -> std::io::Result<()> {
    let store = wcsp.store();

    let mut max_domain_size = 1;
    let mut domains = Vec::new();
    for variable in wcsp.variable_ids() {
        let x = wcsp.variable(variable);
        if x.is_enumerated() {
            max_domain_size = max_domain_size.max(x.initial_size());
            domains.push(x.initial_size() as i64);
        } else {
            domains.push(-(x.sup(store) - x.inf(store) + 1));
        }
    }

    let unary_functions: Vec<(usize, Vec<(usize, Cost)>)> = wcsp
        .variable_ids()
        .filter_map(|variable| {
            let x = wcsp.variable(variable);
            if !x.is_enumerated() {
                return None;
            }
            let tuples: Vec<(usize, Cost)> = (0..x.initial_size())
                .map(|value| (value, x.original_unary_cost(store, value)))
                .filter(|&(_, cost)| cost != 0)
                .collect();
            if tuples.is_empty() {
                None
            } else {
                Some((variable.index(), tuples))
            }
        })
        .collect();

    let constant = wcsp.original_lower_bound();
    let num_functions = wcsp.num_functions()
        + unary_functions.len()
        + usize::from(constant > 0);

    let name = if wcsp.name().is_empty() {
        "wcsp"
    } else {
        wcsp.name()
    };
    writeln!(
        writer,
        "{} {} {} {} {}",
        name,
        wcsp.num_variables(),
        max_domain_size,
        num_functions,
        wcsp.upper_bound()
    )?;
    writeln!(
        writer,
        "{}",
        domains.iter().map(|size| size.to_string()).join(" ")
    )?;

    for (_, function) in wcsp.functions() {
        let mut tuples: Vec<(Vec<usize>, Cost)> = Vec::new();
        function.for_each_original_tuple(&mut |tuple, cost| {
            tuples.push((tuple.to_vec(), cost));
        });
        let scope = function
            .scope()
            .iter()
            .map(|variable| variable.index().to_string())
            .join(" ");
        writeln!(
            writer,
            "{} {} {} {}",
            function.arity(),
            scope,
            function.default_cost(),
            tuples.len()
        )?;
        for (tuple, cost) in tuples {
            let values = tuple.iter().map(|value| value.to_string()).join(" ");
            writeln!(writer, "{values} {cost}")?;
        }
    }

    for (variable, tuples) in unary_functions {
        writeln!(writer, "1 {} 0 {}", variable, tuples.len())?;
        for (value, cost) in tuples {
            writeln!(writer, "{value} {cost}")?;
        }
    }

    if constant > 0 {
        writeln!(writer, "0 {constant} 0")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::CostScale;
    use crate::parsers::parse_wcsp;

    #[test]
    fn dumped_problems_parse_back() {
        let input = "roundtrip 2 3 2 9\n3 2\n2 0 1 1 2\n0 0 0\n2 1 0\n1 0 0 1\n2 4\n";
        let wcsp = parse_wcsp(input, CostScale::default()).unwrap();

        let mut buffer = Vec::new();
        dump_wcsp(&wcsp, &mut buffer).unwrap();
        let dumped = String::from_utf8(buffer).unwrap();

        let reparsed = parse_wcsp(&dumped, CostScale::default()).unwrap();
        assert_eq!(reparsed.num_variables(), 2);
        for a in 0..3 {
            for b in 0..2 {
                assert_eq!(
                    reparsed.assignment_cost(&[a, b]),
                    wcsp.assignment_cost(&[a, b])
                );
            }
        }
    }
}
