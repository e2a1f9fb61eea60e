//! End-to-end scenarios driven through the input formats.

use calabash_solver::basic_types::CostScale;
use calabash_solver::parsers::parse_qpbo;
use calabash_solver::parsers::parse_wcnf;
use calabash_solver::parsers::parse_wcsp;
use calabash_solver::search::termination::Indefinite;
use calabash_solver::search::SolveResult;
use calabash_solver::search::Solver;
use calabash_solver::search::SolverOptions;
use calabash_solver::Wcsp;

/// Exhaustively compute the optimum of a small problem from the original
/// cost tables.
fn brute_force_optimum(wcsp: &Wcsp) -> i64 {
    let sizes: Vec<i64> = wcsp
        .variable_ids()
        .map(|variable| wcsp.variable(variable).initial_size() as i64)
        .collect();
    let mut values = vec![0i64; sizes.len()];
    let mut best = i64::MAX;
    loop {
        let cost = wcsp.assignment_cost(&values);
        if cost < wcsp.upper_bound() {
            best = best.min(cost);
        }
        let mut position = sizes.len();
        loop {
            if position == 0 {
                return best;
            }
            position -= 1;
            values[position] += 1;
            if values[position] < sizes[position] {
                break;
            }
            values[position] = 0;
        }
    }
}

/// Four queens as a weighted problem: one variable per row holding the
/// queen's column, violation cost 5 per attacking pair, plus unary biases.
fn four_queens_wcsp() -> String {
    let mut out = String::new();
    let mut functions: Vec<String> = Vec::new();

    for i in 0..4usize {
        for j in (i + 1)..4usize {
            let mut tuples = Vec::new();
            for a in 0..4usize {
                for b in 0..4usize {
                    let diagonal = a.abs_diff(b) == j - i;
                    if a == b || diagonal {
                        tuples.push(format!("{a} {b} 5"));
                    }
                }
            }
            functions.push(format!(
                "2 {i} {j} 0 {}\n{}",
                tuples.len(),
                tuples.join("\n")
            ));
        }
    }
    // Unary biases nudging the queens towards the centre columns.
    functions.push("1 0 0 2\n0 1\n3 1".to_owned());
    functions.push("1 3 0 2\n1 1\n2 1".to_owned());

    out.push_str(&format!("4queens 4 4 {} 100\n4 4 4 4\n", functions.len()));
    out.push_str(&functions.join("\n"));
    out.push('\n');
    out
}

#[test]
fn four_queens_reaches_the_brute_force_optimum() {
    let wcsp = parse_wcsp(&four_queens_wcsp(), CostScale::default()).unwrap();
    let expected = brute_force_optimum(&wcsp);
    // Both valid placements dodge one bias each.
    assert_eq!(expected, 1);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), expected);
            let placement: Vec<i64> = solution.values().to_vec();
            // No two queens share a column or a diagonal.
            for i in 0..4 {
                for j in (i + 1)..4 {
                    assert_ne!(placement[i], placement[j]);
                    assert_ne!(
                        (placement[i] - placement[j]).abs(),
                        (j - i) as i64
                    );
                }
            }
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

const SHARED_ALL_DIFFERENT: &str = "AllDifferentDecomposedIntoBinaryConstraints 4 4 6 1\n\
     4 4 4 4\n\
     -2 0 1 0 4\n0 0 1\n1 1 1\n2 2 1\n3 3 1\n\
     2 0 2 0 -1\n\
     2 0 3 0 -1\n\
     2 1 2 0 -1\n\
     2 1 3 0 -1\n\
     2 2 3 0 -1\n";

#[test]
fn shared_tables_decompose_all_different() {
    let wcsp = parse_wcsp(SHARED_ALL_DIFFERENT, CostScale::default()).unwrap();
    assert_eq!(wcsp.num_functions(), 6);
    assert_eq!(wcsp.upper_bound(), 1);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            let mut values: Vec<i64> = solution.values().to_vec();
            values.sort_unstable();
            assert_eq!(values, vec![0, 1, 2, 3], "a permutation of the columns");
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn counting_enumerates_every_permutation() {
    let wcsp = parse_wcsp(SHARED_ALL_DIFFERENT, CostScale::default()).unwrap();
    let options = SolverOptions {
        enumerate: true,
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(wcsp, options);
    match solver.solve(&mut Indefinite) {
        SolveResult::Enumerated(count) => assert_eq!(count, 24),
        other => panic!("expected an enumeration, got {other:?}"),
    }
}

#[test]
fn wcnf_clause_optimum_and_violation_cost() {
    // (x1 v -x2) with weight 3.
    let input = "p wcnf 2 1 100\n3 1 -2 0\n";
    let wcsp = parse_wcnf(input, CostScale::default()).unwrap();
    assert_eq!(wcsp.assignment_cost(&[0, 1]), 3);
    assert_eq!(wcsp.assignment_cost(&[1, 0]), 0);
    assert_eq!(wcsp.assignment_cost(&[1, 1]), 0);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            // The clause is satisfied: x1 = 1, or both false.
            let satisfied = solution.value(0) == 1 || solution.value(1) == 0;
            assert!(satisfied);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn qpbo_minimisation_with_negative_quadratic_term() {
    // 2 x0 + 3 x1 - 5 x0 x1; minimum value 0 at (0, 0) and (1, 1).
    let wcsp = parse_qpbo("2 3\n1 1 2\n2 2 3\n1 2 -5\n", CostScale::default()).unwrap();
    assert_eq!(wcsp.neg_cost(), 5, "the applied shift");

    let neg_cost = wcsp.neg_cost();
    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            // Reported costs subtract the shift back into original units.
            assert_eq!(solution.cost() - neg_cost, 0);
            assert!(solution.values() == [0, 0] || solution.values() == [1, 1]);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn precision_scales_decimal_costs() {
    // The same matrix at precision 0 and at precision 7.
    let input = "1 1\n1 1 2.5\n";
    let coarse = parse_qpbo(input, CostScale::with_precision(0)).unwrap();
    assert_eq!(coarse.assignment_cost(&[1]), 3, "2.5 rounds at precision 0");

    let fine = parse_qpbo(input, CostScale::with_precision(7)).unwrap();
    assert_eq!(fine.assignment_cost(&[1]), 25_000_000);
    assert_eq!(fine.cost_scale().format_cost(25_000_000), "2.5000000");
}

#[test]
fn boundary_values_at_domain_extremes() {
    // A binary function whose only cheap tuples sit at the domain corners.
    let mut input = String::from("corners 2 5 1 10\n5 5\n2 0 1 1 2\n");
    input.push_str("0 0 0\n4 4 0\n");
    let wcsp = parse_wcsp(&input, CostScale::default()).unwrap();

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            assert!(solution.values() == [0, 0] || solution.values() == [4, 4]);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}
