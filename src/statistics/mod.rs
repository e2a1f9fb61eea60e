//! Counters of the solving process and their reporting.

use std::io::Write;

/// Counters accumulated over one [`Solver::solve`](crate::search::Solver::solve)
/// run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverStatistics {
    /// The number of choice points opened.
    pub num_nodes: u64,
    /// The number of contradictions caught at choice points.
    pub num_backtracks: u64,
    /// The number of solutions recorded.
    pub num_solutions: u64,
    /// The number of propagation fixpoints computed.
    pub num_propagations: u64,
}

impl SolverStatistics {
    /// Write the counters as one `PREFIX name=value` line each, the format
    /// the command line front end emits under `--log-statistics`.
    pub fn write(&self, prefix: &str, writer: &mut dyn Write) -> std::io::Result<()> {
        for (name, value) in [
            ("nodes", self.num_nodes),
            ("backtracks", self.num_backtracks),
            ("solutions", self.num_solutions),
            ("propagations", self.num_propagations),
        ] {
            writeln!(writer, "{prefix} {name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SolverStatistics;

    #[test]
    fn counters_are_written_one_per_line() {
        let statistics = SolverStatistics {
            num_nodes: 3,
            num_backtracks: 1,
            num_solutions: 2,
            num_propagations: 7,
        };
        let mut buffer = Vec::new();
        statistics.write("%%stat:", &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "%%stat: nodes=3\n%%stat: backtracks=1\n%%stat: solutions=2\n%%stat: propagations=7\n"
        );
    }
}
