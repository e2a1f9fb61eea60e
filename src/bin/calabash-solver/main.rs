mod result;

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use calabash_solver::basic_types::CostScale;
use calabash_solver::local_search::LocalSearchOptions;
use calabash_solver::parsers;
use calabash_solver::parsers::FileFormat;
use calabash_solver::search::termination::ResourceLimits;
use calabash_solver::search::BranchingStrategy;
use calabash_solver::search::SolveResult;
use calabash_solver::search::Solver;
use calabash_solver::search::SolverOptions;
use calabash_solver::search::ValueOrdering;
use calabash_solver::ConsistencyLevel;
use calabash_solver::Solution;
use calabash_solver::Wcsp;
use clap::Parser;
use clap::ValueEnum;
use itertools::Itertools;
use log::error;
use log::info;
use log::LevelFilter;
use result::CalabashError;
use result::CalabashResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum Branching {
    #[default]
    Binary,
    Kary,
}

impl std::fmt::Display for Branching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Branching::Binary => write!(f, "binary"),
            Branching::Kary => write!(f, "kary"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, arg_required_else_help = true)]
struct Args {
    /// The instance to solve. The format is chosen from the extension:
    ///  - '*.wcsp' for the legacy weighted CSP text format,
    ///  - '*.cfn' for cost function networks in JSON-like syntax,
    ///  - '*.wcnf'/'*.cnf' for (weighted) DIMACS,
    ///  - '*.qpbo' for quadratic pseudo-Boolean matrices,
    ///  - '*.uai' for Markov networks.
    #[clap(verbatim_doc_comment)]
    instance_path: PathBuf,

    /// Initial primal bound, in decimal user units. Solutions must be
    /// strictly cheaper. Overrides the bound stated by the instance when it
    /// is tighter.
    #[arg(short = 'u', long = "upper-bound", verbatim_doc_comment)]
    upper_bound: Option<String>,

    /// Enumerate solutions strictly below the bound instead of optimising;
    /// the optional value limits how many solutions are reported (0 means no
    /// limit).
    #[arg(
        short = 'a',
        long = "all-solutions",
        num_args = 0..=1,
        default_missing_value = "0",
        verbatim_doc_comment
    )]
    all_solutions: Option<u64>,

    /// CPU time budget in seconds, checked between search nodes.
    #[arg(short = 't', long = "time-limit")]
    time_limit: Option<u64>,

    /// Search node budget.
    #[arg(long = "node-limit")]
    node_limit: Option<u64>,

    /// The random seed for value/variable tie-breaking and local search.
    #[arg(short = 'r', long = "random-seed", default_value_t = 42)]
    random_seed: u64,

    /// Number of decimal digits kept by the fixed-point cost representation.
    /// Defaults to 0 for integer formats (wcsp, wcnf, qpbo) and 7 for
    /// probabilistic and decimal formats (uai, cfn).
    #[arg(short = 'p', long = "precision", verbatim_doc_comment)]
    precision: Option<u32>,

    /// Soft local consistency level: 0 node, 1 arc, 2 directed, 3 full
    /// directed, 4 existential directed arc consistency.
    #[arg(short = 'k', long = "consistency-level", default_value_t = 4, verbatim_doc_comment)]
    consistency_level: u8,

    /// Dead-end elimination level (0 disables it).
    #[arg(long = "dee", default_value_t = 1)]
    dee: u8,

    /// Limited discrepancy search: run discrepancy-limited passes with
    /// doubling budgets up to this bound before the complete search.
    #[arg(short = 'l', long = "lds", verbatim_doc_comment)]
    lds: Option<u64>,

    /// Seed the initial upper bound with a local search descent.
    #[arg(short = 'i', long = "local-search")]
    local_search: bool,

    /// Number of local search moves (with --local-search).
    #[arg(long = "local-search-moves", default_value_t = 10_000)]
    local_search_moves: u64,

    /// Branch by assigning/removing a value (binary) or by enumerating the
    /// domain (kary).
    #[arg(long = "branching", value_enum, default_value_t, verbatim_doc_comment)]
    branching: Branching,

    /// Reuse the values of the incumbent solution during value selection.
    #[arg(long = "phase-saving")]
    phase_saving: bool,

    /// Increase the log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// How solutions are printed: 1 value indices, 2 value names,
    /// 3 name=value pairs.
    #[arg(short = 's', long = "solution-format", default_value_t = 1, verbatim_doc_comment)]
    solution_format: u8,

    /// Write the best solution to this file.
    #[arg(
        short = 'w',
        long = "write-solution",
        num_args = 0..=1,
        default_missing_value = "sol",
        verbatim_doc_comment
    )]
    write_solution: Option<PathBuf>,

    /// Dump the loaded problem in legacy wcsp format and exit.
    #[arg(
        short = 'z',
        long = "dump-problem",
        num_args = 0..=1,
        default_missing_value = "problem.wcsp",
        verbatim_doc_comment
    )]
    dump_problem: Option<PathBuf>,

    /// Multiplier applied to every input cost; negate it to turn a
    /// maximisation matrix into minimisation.
    #[arg(short = 'C', long = "cost-multiplier", default_value_t = 1.0, verbatim_doc_comment)]
    cost_multiplier: f64,

    /// Print solver statistics after the search.
    #[arg(long = "log-statistics")]
    log_statistics: bool,
}

fn configure_logging(verbose: u8) {
    let level_filter = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .format(move |buf, record| writeln!(buf, "% {}", record.args()))
        .filter_level(level_filter)
        .target(env_logger::Target::Stdout)
        .init();
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => {
            error!("Execution failed, error: {e}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run() -> CalabashResult<()> {
    let args = Args::parse();
    configure_logging(args.verbose);

    let format = FileFormat::from_extension(&args.instance_path)
        .ok_or_else(|| CalabashError::invalid_instance(args.instance_path.display()))?;
    let precision = args.precision.unwrap_or(match format {
        FileFormat::Wcsp | FileFormat::Wcnf | FileFormat::Qpbo => 0,
        FileFormat::Uai | FileFormat::Cfn => 7,
    });
    let scale = CostScale {
        precision,
        multiplier: args.cost_multiplier,
    };

    let input = fs::read_to_string(&args.instance_path)?;
    let mut wcsp = parsers::parse(&input, format, scale)?;
    info!(
        "loaded '{}': {} variables, {} cost functions",
        wcsp.name(),
        wcsp.num_variables(),
        wcsp.num_functions()
    );

    if let Some(path) = &args.dump_problem {
        let mut file = fs::File::create(path)?;
        parsers::dump_wcsp(&wcsp, &mut file)?;
        info!("problem dumped to {}", path.display());
        return Ok(());
    }

    if let Some(bound) = &args.upper_bound {
        let external = wcsp
            .cost_scale()
            .decimal_to_cost(bound)
            .map_err(|_| CalabashError::InvalidBound(bound.clone()))?;
        wcsp.update_external_upper_bound(external);
    }
    wcsp.options_mut().consistency = ConsistencyLevel::from_index(args.consistency_level);
    wcsp.options_mut().dee = args.dee.min(3);

    let options = SolverOptions {
        branching: match args.branching {
            Branching::Binary => BranchingStrategy::Binary,
            Branching::Kary => BranchingStrategy::KAry,
        },
        value_ordering: if args.phase_saving {
            ValueOrdering::PhaseSaving
        } else {
            ValueOrdering::MinUnaryCost
        },
        lds: args.lds,
        enumerate: args.all_solutions.is_some(),
        solution_limit: args.all_solutions.filter(|&limit| limit > 0),
        local_search: args.local_search.then_some(LocalSearchOptions {
            max_moves: args.local_search_moves,
            ..LocalSearchOptions::default()
        }),
        random_seed: args.random_seed,
        ..SolverOptions::default()
    };

    let mut solver = Solver::with_options(wcsp, options);
    let solution_format = args.solution_format.clamp(1, 3);
    if args.all_solutions.is_some() {
        solver.on_solution(move |wcsp, solution| {
            println!("{}", format_solution(wcsp, solution, solution_format));
        });
    }

    let mut termination = ResourceLimits::new(
        args.time_limit.map(Duration::from_secs),
        args.node_limit,
    );
    let result = solver.solve(&mut termination);

    report(&args, &solver, result)?;

    if args.log_statistics {
        let mut stdout = std::io::stdout();
        solver.statistics().write("%%stat:", &mut stdout)?;
        writeln!(
            stdout,
            "%%stat: upperBound={}",
            solver.wcsp().upper_bound()
        )?;
    }
    Ok(())
}

fn report(args: &Args, solver: &Solver, result: SolveResult) -> CalabashResult<()> {
    let wcsp = solver.wcsp();
    let statistics = solver.statistics();
    let solution_format = args.solution_format.clamp(1, 3);

    let mut best: Option<&Solution> = None;
    match &result {
        SolveResult::Optimal(solution) => {
            println!(
                "Optimum: {} in {} backtracks and {} nodes",
                external_cost(wcsp, solution),
                statistics.num_backtracks,
                statistics.num_nodes
            );
            println!("{}", format_solution(wcsp, solution, solution_format));
            best = Some(solution);
        }
        SolveResult::Unsatisfiable => {
            println!("No solution within the given bound");
        }
        SolveResult::Enumerated(count) => {
            println!(
                "{count} solution(s) found in {} backtracks and {} nodes",
                statistics.num_backtracks, statistics.num_nodes
            );
        }
        SolveResult::Interrupted(solution) => match solution {
            Some(solution) => {
                println!(
                    "Interrupted, best solution: {}",
                    external_cost(wcsp, solution)
                );
                println!("{}", format_solution(wcsp, solution, solution_format));
                best = Some(solution);
            }
            None => println!("Interrupted, no solution found"),
        },
    }

    if let Some(path) = &args.write_solution {
        if let Some(solution) = best {
            let mut file = fs::File::create(path)?;
            writeln!(file, "{}", format_solution(wcsp, solution, solution_format))?;
            info!("solution written to {}", path.display());
        }
    }
    Ok(())
}

/// The solution objective in decimal user units: the internal cost minus the
/// load-time shift, scaled back.
fn external_cost(wcsp: &Wcsp, solution: &Solution) -> String {
    wcsp.cost_scale()
        .format_cost(solution.cost() - wcsp.neg_cost())
}

/// Render a solution in one of the three print modes: value indices, value
/// names, or `name=value` pairs, in variable definition order.
fn format_solution(wcsp: &Wcsp, solution: &Solution, mode: u8) -> String {
    wcsp.variable_ids()
        .enumerate()
        .map(|(index, variable)| {
            let value = solution.value(index);
            let x = wcsp.variable(variable);
            match mode {
                2 => x.format_value(value),
                3 => format!("{}={}", x.name(), x.format_value(value)),
                _ => value.to_string(),
            }
        })
        .join(" ")
}
