//! Loaders turning input formats into a [`Wcsp`] through its posting API.
//!
//! Supported formats: the legacy `wcsp` text format, `cfn` (JSON-like cost
//! function networks), weighted DIMACS (`wcnf`/`cnf`), `qpbo` quadratic
//! pseudo-Boolean matrices and `uai` Markov networks. The format is chosen
//! from the file extension.

mod cfn;
mod dump;
mod qpbo;
mod uai;
mod wcnf;
mod wcsp_format;

pub use cfn::parse_cfn;
pub use dump::dump_wcsp;
pub use qpbo::parse_qpbo;
pub use uai::parse_uai;
pub use wcnf::parse_wcnf;
pub use wcsp_format::parse_wcsp;

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::basic_types::saturating_add;
use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::basic_types::OverflowError;
use crate::containers::StorageKey;
use crate::engine::VariableId;
use crate::engine::Wcsp;

/// The input formats understood by the loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Wcsp,
    Cfn,
    Wcnf,
    Qpbo,
    Uai,
}

impl FileFormat {
    /// Determine the format from a file extension.
    pub fn from_extension(path: &Path) -> Option<FileFormat> {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("wcsp") => Some(FileFormat::Wcsp),
            Some("cfn") => Some(FileFormat::Cfn),
            Some("wcnf") | Some("cnf") => Some(FileFormat::Wcnf),
            Some("qpbo") => Some(FileFormat::Qpbo),
            Some("uai") => Some(FileFormat::Uai),
            _ => None,
        }
    }
}

/// Parse `input` in the given format.
pub fn parse(input: &str, format: FileFormat, scale: CostScale) -> Result<Wcsp, ParseError> {
    match format {
        FileFormat::Wcsp => parse_wcsp(input, scale),
        FileFormat::Cfn => parse_cfn(input, scale),
        FileFormat::Wcnf => parse_wcnf(input, scale),
        FileFormat::Qpbo => parse_qpbo(input, scale),
        FileFormat::Uai => parse_uai(input, scale),
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    WrongFileFormat { line: usize, message: String },
    #[error(transparent)]
    ArithmeticOverflow(#[from] OverflowError),
}

pub(crate) fn malformed(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::WrongFileFormat {
        line,
        message: message.into(),
    }
}

/// Whitespace-separated token stream with line tracking; `c`-prefixed and
/// `#`-prefixed lines are comments.
pub(crate) struct TokenStream<'a> {
    tokens: Vec<(usize, &'a str)>,
    cursor: usize,
}

impl<'a> TokenStream<'a> {
    pub(crate) fn new(input: &'a str, comment_prefixes: &[&str]) -> Self {
        let mut tokens = Vec::new();
        for (index, line) in input.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || comment_prefixes
                    .iter()
                    .any(|prefix| trimmed.starts_with(prefix))
            {
                continue;
            }
            for token in trimmed.split_whitespace() {
                tokens.push((index + 1, token));
            }
        }
        TokenStream { tokens, cursor: 0 }
    }

    pub(crate) fn line(&self) -> usize {
        self.tokens
            .get(self.cursor.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |(line, _)| *line)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    /// The line the next token sits on, if any.
    pub(crate) fn peek_line(&self) -> Option<usize> {
        self.tokens.get(self.cursor).map(|&(line, _)| line)
    }

    pub(crate) fn next(&mut self, expected: &str) -> Result<&'a str, ParseError> {
        match self.tokens.get(self.cursor) {
            Some(&(_, token)) => {
                self.cursor += 1;
                Ok(token)
            }
            None => Err(malformed(
                self.line(),
                format!("unexpected end of input, expected {expected}"),
            )),
        }
    }

    pub(crate) fn next_i64(&mut self, expected: &str) -> Result<i64, ParseError> {
        let line = self.line();
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| malformed(line, format!("expected {expected}, found '{token}'")))
    }

    pub(crate) fn next_usize(&mut self, expected: &str) -> Result<usize, ParseError> {
        let line = self.line();
        let value = self.next_i64(expected)?;
        usize::try_from(value)
            .map_err(|_| malformed(line, format!("expected non-negative {expected}")))
    }

    pub(crate) fn next_f64(&mut self, expected: &str) -> Result<f64, ParseError> {
        let line = self.line();
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| malformed(line, format!("expected {expected}, found '{token}'")))
    }
}

/// Accumulates tables per scope so that several input functions over the same
/// variables merge into a single cost function, then posts them with the
/// non-negativity shift applied.
#[derive(Default)]
pub(crate) struct FunctionAccumulator {
    unary: BTreeMap<usize, Vec<Cost>>,
    binary: BTreeMap<(usize, usize), Vec<Cost>>,
    ternary: BTreeMap<(usize, usize, usize), Vec<Cost>>,
}

impl FunctionAccumulator {
    pub(crate) fn add_unary(&mut self, wcsp: &Wcsp, x: VariableId, costs: Vec<Cost>) {
        let entry = self
            .unary
            .entry(x.index())
            .or_insert_with(|| vec![0; wcsp.variable(x).initial_size()]);
        for (slot, cost) in entry.iter_mut().zip(costs) {
            *slot = saturating_add(*slot, cost);
        }
    }

    /// `costs` is row-major over `(x, y)`; the scope is normalised to
    /// ascending variable index, transposing the table when needed.
    pub(crate) fn add_binary(
        &mut self,
        wcsp: &Wcsp,
        x: VariableId,
        y: VariableId,
        costs: Vec<Cost>,
    ) {
        let (nx, ny) = (
            wcsp.variable(x).initial_size(),
            wcsp.variable(y).initial_size(),
        );
        let ((x, y), costs) = if x.index() <= y.index() {
            ((x.index(), y.index()), costs)
        } else {
            let mut transposed = vec![0; costs.len()];
            for a in 0..nx {
                for b in 0..ny {
                    transposed[b * nx + a] = costs[a * ny + b];
                }
            }
            ((y.index(), x.index()), transposed)
        };
        let entry = self
            .binary
            .entry((x, y))
            .or_insert_with(|| vec![0; costs.len()]);
        for (slot, cost) in entry.iter_mut().zip(costs) {
            *slot = saturating_add(*slot, cost);
        }
    }

    /// `costs` is row-major over `(x, y, z)`; the scope is normalised to
    /// ascending variable index with the table permuted accordingly.
    pub(crate) fn add_ternary(
        &mut self,
        wcsp: &Wcsp,
        scope: [VariableId; 3],
        costs: Vec<Cost>,
    ) {
        let sizes = [
            wcsp.variable(scope[0]).initial_size(),
            wcsp.variable(scope[1]).initial_size(),
            wcsp.variable(scope[2]).initial_size(),
        ];
        let mut order = [0, 1, 2];
        order.sort_by_key(|&position| scope[position].index());
        let sorted_sizes = [sizes[order[0]], sizes[order[1]], sizes[order[2]]];

        let mut permuted = vec![0; costs.len()];
        for a in 0..sizes[0] {
            for b in 0..sizes[1] {
                for c in 0..sizes[2] {
                    let values = [a, b, c];
                    let index = (values[order[0]] * sorted_sizes[1] + values[order[1]])
                        * sorted_sizes[2]
                        + values[order[2]];
                    permuted[index] = costs[(a * sizes[1] + b) * sizes[2] + c];
                }
            }
        }

        let key = (
            scope[order[0]].index(),
            scope[order[1]].index(),
            scope[order[2]].index(),
        );
        let entry = self
            .ternary
            .entry(key)
            .or_insert_with(|| vec![0; permuted.len()]);
        for (slot, cost) in entry.iter_mut().zip(permuted) {
            *slot = saturating_add(*slot, cost);
        }
    }

    /// Post all accumulated tables, shifting each one so that its entries are
    /// non-negative and recording the shifts in the problem's `neg_cost`.
    pub(crate) fn post_all(self, wcsp: &mut Wcsp) {
        for (x, costs) in self.unary {
            let costs = shift_non_negative(wcsp, costs);
            wcsp.post_unary(VariableId::create_from_index(x), &costs);
        }
        for ((x, y), costs) in self.binary {
            let costs = shift_non_negative(wcsp, costs);
            let _ = wcsp.post_binary(
                VariableId::create_from_index(x),
                VariableId::create_from_index(y),
                costs,
            );
        }
        for ((x, y, z), costs) in self.ternary {
            let costs = shift_non_negative(wcsp, costs);
            let _ = wcsp.post_ternary(
                VariableId::create_from_index(x),
                VariableId::create_from_index(y),
                VariableId::create_from_index(z),
                costs,
            );
        }
    }
}

/// Row-major table index back to a value tuple.
pub(crate) fn unflatten(mut index: usize, sizes: &[usize]) -> Vec<usize> {
    let mut tuple = vec![0; sizes.len()];
    for position in (0..sizes.len()).rev() {
        tuple[position] = index % sizes[position];
        index /= sizes[position];
    }
    tuple
}

/// Shift a table so that its minimum entry is zero, accounting the shift in
/// `neg_cost`.
pub(crate) fn shift_non_negative(wcsp: &mut Wcsp, mut costs: Vec<Cost>) -> Vec<Cost> {
    let minimum = costs.iter().copied().min().unwrap_or(0);
    if minimum < 0 {
        for cost in &mut costs {
            *cost -= minimum;
        }
        wcsp.add_neg_cost(-minimum);
    }
    costs
}

/// Shift a sparse table so that neither the default nor any explicit cost is
/// negative.
pub(crate) fn shift_sparse(
    wcsp: &mut Wcsp,
    default_cost: Cost,
    mut map: BTreeMap<Vec<usize>, Cost>,
) -> (Cost, BTreeMap<Vec<usize>, Cost>) {
    let minimum = map
        .values()
        .copied()
        .chain(std::iter::once(default_cost))
        .min()
        .unwrap_or(0);
    if minimum < 0 {
        for cost in map.values_mut() {
            *cost -= minimum;
        }
        wcsp.add_neg_cost(-minimum);
        (default_cost - minimum, map)
    } else {
        (default_cost, map)
    }
}
