//! End-to-end solving through the public API.

use calabash_solver::search::termination::Indefinite;
use calabash_solver::search::termination::NodeBudget;
use calabash_solver::search::SolveResult;
use calabash_solver::search::Solver;
use calabash_solver::search::SolverOptions;
use calabash_solver::Wcsp;

#[test]
fn trivial_unary_problem() {
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(3, "x");
    wcsp.post_unary(x, &[5, 2, 7]);
    wcsp.update_upper_bound(10);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 2);
            assert_eq!(solution.value(0), 1);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn soft_binary_equality() {
    // Minimise a disagreement penalty plus opposing unary preferences.
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(2, "x");
    let y = wcsp.new_enumerated_variable(2, "y");
    wcsp.post_unary(x, &[0, 3]);
    wcsp.post_unary(y, &[2, 0]);
    let _ = wcsp.post_binary(x, y, vec![0, 5, 5, 0]);
    wcsp.update_upper_bound(100);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            // x = 0, y = 0 costs 2; x = 1, y = 1 costs 3; disagreeing costs
            // at least 5.
            assert_eq!(solution.cost(), 2);
            assert_eq!(solution.values(), &[0, 0]);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn hard_constraints_prove_unsatisfiability() {
    // x != y over a single value is impossible.
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(1, "x");
    let y = wcsp.new_enumerated_variable(1, "y");
    wcsp.update_upper_bound(10);
    let _ = wcsp.post_binary(x, y, vec![10]);

    let mut solver = Solver::new(wcsp);
    assert!(matches!(
        solver.solve(&mut Indefinite),
        SolveResult::Unsatisfiable
    ));
}

#[test]
fn upper_bound_of_one_admits_only_zero_cost_solutions() {
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(2, "x");
    wcsp.post_unary(x, &[1, 0]);
    wcsp.update_upper_bound(1);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            assert_eq!(solution.value(0), 1);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn interval_variables_are_split_to_a_single_value() {
    let mut wcsp = Wcsp::new();
    let _x = wcsp.new_interval_variable(0, 99, "x");
    wcsp.update_upper_bound(5);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            assert!((0..=99).contains(&solution.value(0)));
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn ternary_tables_propagate_to_the_optimum() {
    // An odd-parity preference over three Booleans.
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(2, "x");
    let y = wcsp.new_enumerated_variable(2, "y");
    let z = wcsp.new_enumerated_variable(2, "z");
    let mut costs = vec![0; 8];
    for a in 0..2 {
        for b in 0..2 {
            for c in 0..2 {
                if (a + b + c) % 2 == 0 {
                    costs[(a * 2 + b) * 2 + c] = 4;
                }
            }
        }
    }
    let _ = wcsp.post_ternary(x, y, z, costs);
    wcsp.post_unary(x, &[0, 1]);
    wcsp.post_unary(y, &[0, 1]);
    wcsp.post_unary(z, &[0, 1]);
    wcsp.update_upper_bound(50);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            // Cheapest odd-parity assignment: exactly one variable at 1.
            assert_eq!(solution.cost(), 1);
            let ones: i64 = solution.values().iter().sum();
            assert_eq!(ones, 1);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn nary_functions_reach_the_optimum() {
    // A 4-ary indicator: the all-ones tuple is free, everything else costs.
    let mut wcsp = Wcsp::new();
    let variables: Vec<_> = (0..4)
        .map(|i| wcsp.new_enumerated_variable(2, format!("x{i}")))
        .collect();
    let mut tuples = std::collections::BTreeMap::new();
    let _ = tuples.insert(vec![1, 1, 1, 1], 0);
    let _ = wcsp.post_tuples(&variables, 3, tuples);
    wcsp.update_upper_bound(50);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            assert_eq!(solution.cost(), 0);
            assert_eq!(solution.values(), &[1, 1, 1, 1]);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn node_budget_interrupts_the_search() {
    let mut wcsp = Wcsp::new();
    for i in 0..12 {
        let x = wcsp.new_enumerated_variable(4, format!("x{i}"));
        wcsp.post_unary(x, &[0, 1, 2, 3]);
    }
    // Pairwise disagreement costs keep the search from closing instantly.
    let ids: Vec<_> = wcsp.variable_ids().collect();
    for window in ids.windows(2) {
        let mut costs = vec![1; 16];
        for v in 0..4 {
            costs[v * 4 + v] = 0;
        }
        let _ = wcsp.post_binary(window[0], window[1], costs);
    }
    wcsp.update_upper_bound(1_000);

    let mut solver = Solver::new(wcsp);
    match solver.solve(&mut NodeBudget::new(1)) {
        SolveResult::Interrupted(_) => {}
        SolveResult::Optimal(_) => {}
        other => panic!("expected an interrupt or a fast optimum, got {other:?}"),
    }
}

#[test]
fn enumeration_counts_distinct_zero_cost_solutions() {
    // Two free Boolean variables: exactly four zero-cost assignments.
    let mut wcsp = Wcsp::new();
    let _x = wcsp.new_enumerated_variable(2, "x");
    let _y = wcsp.new_enumerated_variable(2, "y");
    wcsp.update_upper_bound(1);

    let options = SolverOptions {
        enumerate: true,
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(wcsp, options);

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = std::rc::Rc::clone(&seen);
    solver.on_solution(move |_, solution| {
        sink.borrow_mut().push(solution.values().to_vec());
    });

    match solver.solve(&mut Indefinite) {
        SolveResult::Enumerated(count) => assert_eq!(count, 4),
        other => panic!("expected an enumeration, got {other:?}"),
    }
    let mut solutions = seen.borrow().clone();
    solutions.sort();
    solutions.dedup();
    assert_eq!(solutions.len(), 4, "the four assignments are distinct");
}

#[test]
fn solution_limit_stops_enumeration() {
    let mut wcsp = Wcsp::new();
    let _x = wcsp.new_enumerated_variable(2, "x");
    let _y = wcsp.new_enumerated_variable(2, "y");
    wcsp.update_upper_bound(1);

    let options = SolverOptions {
        enumerate: true,
        solution_limit: Some(2),
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(wcsp, options);
    match solver.solve(&mut Indefinite) {
        SolveResult::Enumerated(count) => assert_eq!(count, 2),
        other => panic!("expected an enumeration, got {other:?}"),
    }
}

#[test]
fn lds_still_proves_the_optimum() {
    let mut wcsp = Wcsp::new();
    for i in 0..6 {
        let x = wcsp.new_enumerated_variable(3, format!("x{i}"));
        wcsp.post_unary(x, &[2, 0, 1]);
    }
    wcsp.update_upper_bound(100);

    let options = SolverOptions {
        lds: Some(4),
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(wcsp, options);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => assert_eq!(solution.cost(), 0),
        other => panic!("expected an optimum, got {other:?}"),
    }
}

#[test]
fn local_search_seeding_keeps_the_result_exact() {
    let mut wcsp = Wcsp::new();
    let x = wcsp.new_enumerated_variable(4, "x");
    let y = wcsp.new_enumerated_variable(4, "y");
    wcsp.post_unary(x, &[3, 1, 0, 2]);
    wcsp.post_unary(y, &[0, 2, 1, 3]);
    let mut costs = vec![0; 16];
    for a in 0..4 {
        for b in 0..4 {
            if a == b {
                costs[a * 4 + b] = 2;
            }
        }
    }
    let _ = wcsp.post_binary(x, y, costs);
    wcsp.update_upper_bound(100);

    let options = SolverOptions {
        local_search: Some(calabash_solver::local_search::LocalSearchOptions::default()),
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(wcsp, options);
    match solver.solve(&mut Indefinite) {
        SolveResult::Optimal(solution) => {
            // x = 2, y = 0 avoids both the unary and equality penalties.
            assert_eq!(solution.cost(), 0);
        }
        other => panic!("expected an optimum, got {other:?}"),
    }
}
