//! The `cfn` cost function network format: brace-delimited
//! `problem/variables/functions` sections with symbolic values and decimal
//! costs. The `mustbe` bound gives the objective direction (`<` minimise,
//! `>` maximise) and fixes the decimal precision.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::basic_types::Cost;
use crate::basic_types::CostScale;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::parsers::malformed;
use crate::parsers::shift_sparse;
use crate::parsers::FunctionAccumulator;
use crate::parsers::ParseError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Punct(char),
    Atom(&'a str),
}

struct Lexer<'a> {
    tokens: Vec<(usize, Token<'a>)>,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut tokens = Vec::new();
        for (index, line) in input.lines().enumerate() {
            let line_number = index + 1;
            let mut rest = line;
            while !rest.is_empty() {
                let mut chars = rest.char_indices();
                let Some((start, c)) = chars.find(|&(_, c)| !c.is_whitespace()) else {
                    break;
                };
                rest = &rest[start..];
                match c {
                    '{' | '}' | '[' | ']' | ',' | ':' => {
                        tokens.push((line_number, Token::Punct(c)));
                        rest = &rest[c.len_utf8()..];
                    }
                    '"' | '\'' => {
                        let body = &rest[1..];
                        let end = body.find(c).unwrap_or(body.len());
                        tokens.push((line_number, Token::Atom(&body[..end])));
                        rest = &body[(end + 1).min(body.len())..];
                    }
                    _ => {
                        let end = rest
                            .find(|c: char| c.is_whitespace() || "{}[],:\"'".contains(c))
                            .unwrap_or(rest.len());
                        tokens.push((line_number, Token::Atom(&rest[..end])));
                        rest = &rest[end..];
                    }
                }
            }
        }
        Lexer { tokens, cursor: 0 }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.cursor.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |&(line, _)| line)
    }

    fn next(&mut self, expected: &str) -> Result<Token<'a>, ParseError> {
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

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.cursor).map(|&(_, token)| token)
    }

    fn expect(&mut self, punct: char) -> Result<(), ParseError> {
        let line = self.line();
        match self.next(&format!("'{punct}'"))? {
            Token::Punct(c) if c == punct => Ok(()),
            other => Err(malformed(line, format!("expected '{punct}', found {other:?}"))),
        }
    }

    /// Consume a comma if one is next; separators are optional in practice.
    fn skip_comma(&mut self) {
        if let Some(Token::Punct(',')) = self.peek() {
            self.cursor += 1;
        }
    }

    fn atom(&mut self, expected: &str) -> Result<&'a str, ParseError> {
        let line = self.line();
        match self.next(expected)? {
            Token::Atom(atom) => Ok(atom),
            other => Err(malformed(line, format!("expected {expected}, found {other:?}"))),
        }
    }
}

pub fn parse_cfn(input: &str, scale: CostScale) -> Result<Wcsp, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut wcsp = Wcsp::new();

    lexer.expect('{')?;

    // problem section: name and the objective bound.
    expect_tag(&mut lexer, "problem")?;
    lexer.expect('{')?;
    let mut bound: Option<(bool, String)> = None;
    loop {
        match lexer.peek() {
            Some(Token::Punct('}')) => {
                let _ = lexer.next("'}'")?;
                break;
            }
            _ => {
                let line = lexer.line();
                let key = lexer.atom("a problem field")?;
                lexer.expect(':')?;
                let value = lexer.atom("a field value")?;
                lexer.skip_comma();
                match key {
                    "name" => wcsp.set_name(value),
                    "mustbe" => {
                        let (direction, rest) = value.split_at(1);
                        match direction {
                            "<" => bound = Some((false, rest.to_owned())),
                            ">" => bound = Some((true, rest.to_owned())),
                            _ => {
                                return Err(malformed(
                                    line,
                                    "the mustbe bound starts with '<' or '>'",
                                ))
                            }
                        }
                    }
                    _ => return Err(malformed(line, format!("unknown problem field '{key}'"))),
                }
            }
        }
    }
    lexer.skip_comma();

    // The bound fixes the precision and the objective direction.
    let mut scale = scale;
    if let Some((maximise, value)) = &bound {
        scale.precision = value
            .split('.')
            .nth(1)
            .map_or(0, |decimals| decimals.len() as u32);
        if *maximise {
            scale.multiplier = -scale.multiplier;
        }
    }
    wcsp.set_cost_scale(scale);

    // variables section.
    expect_tag(&mut lexer, "variables")?;
    lexer.expect('{')?;
    let mut names: HashMap<String, VariableId> = HashMap::new();
    loop {
        if let Some(Token::Punct('}')) = lexer.peek() {
            let _ = lexer.next("'}'")?;
            break;
        }
        let line = lexer.line();
        let name = lexer.atom("a variable name")?.to_owned();
        lexer.expect(':')?;
        let variable = match lexer.peek() {
            Some(Token::Punct('[')) => {
                lexer.expect('[')?;
                let mut values = Vec::new();
                loop {
                    if let Some(Token::Punct(']')) = lexer.peek() {
                        let _ = lexer.next("']'")?;
                        break;
                    }
                    values.push(lexer.atom("a value name")?.to_owned());
                    lexer.skip_comma();
                }
                if values.is_empty() {
                    return Err(malformed(line, "variables must have a non-empty domain"));
                }
                let variable = wcsp.new_enumerated_variable(values.len(), name.clone());
                wcsp.set_value_names(variable, values);
                variable
            }
            _ => {
                let size: usize = lexer
                    .atom("a domain size")?
                    .parse()
                    .map_err(|_| malformed(line, "expected a domain size"))?;
                if size == 0 {
                    return Err(malformed(line, "variables must have a non-empty domain"));
                }
                wcsp.new_enumerated_variable(size, name.clone())
            }
        };
        lexer.skip_comma();
        if names.insert(name.clone(), variable).is_some() {
            return Err(malformed(line, format!("duplicate variable '{name}'")));
        }
    }
    lexer.skip_comma();

    // functions section.
    expect_tag(&mut lexer, "functions")?;
    lexer.expect('{')?;
    let mut accumulator = FunctionAccumulator::default();
    loop {
        if let Some(Token::Punct('}')) = lexer.peek() {
            let _ = lexer.next("'}'")?;
            break;
        }
        let _name = lexer.atom("a function name")?;
        lexer.expect(':')?;
        parse_function(&mut lexer, &mut wcsp, &mut accumulator, &names, scale)?;
        lexer.skip_comma();
    }
    lexer.expect('}')?;

    accumulator.post_all(&mut wcsp);
    if let Some((_, value)) = bound {
        // With a negated multiplier this is already the bound on the negated
        // objective, so both directions reduce to a strict upper bound.
        let external = scale.decimal_to_cost(&value)?;
        wcsp.update_external_upper_bound(external);
    }
    Ok(wcsp)
}

fn expect_tag(lexer: &mut Lexer<'_>, tag: &str) -> Result<(), ParseError> {
    let line = lexer.line();
    let found = lexer.atom(&format!("the '{tag}' section"))?;
    if found != tag {
        return Err(malformed(
            line,
            format!("expected the '{tag}' section, found '{found}'"),
        ));
    }
    lexer.expect(':')
}

fn parse_function(
    lexer: &mut Lexer<'_>,
    wcsp: &mut Wcsp,
    accumulator: &mut FunctionAccumulator,
    names: &HashMap<String, VariableId>,
    scale: CostScale,
) -> Result<(), ParseError> {
    lexer.expect('{')?;

    let mut scope: Vec<VariableId> = Vec::new();
    let mut default_cost: Option<Cost> = None;
    let mut cost_atoms: Vec<(usize, String)> = Vec::new();
    loop {
        if let Some(Token::Punct('}')) = lexer.peek() {
            let _ = lexer.next("'}'")?;
            break;
        }
        let line = lexer.line();
        let key = lexer.atom("a function field")?;
        lexer.expect(':')?;
        match key {
            "scope" => {
                lexer.expect('[')?;
                loop {
                    if let Some(Token::Punct(']')) = lexer.peek() {
                        let _ = lexer.next("']'")?;
                        break;
                    }
                    let line = lexer.line();
                    let name = lexer.atom("a scope variable")?;
                    let variable = *names
                        .get(name)
                        .ok_or_else(|| malformed(line, format!("unknown variable '{name}'")))?;
                    scope.push(variable);
                    lexer.skip_comma();
                }
            }
            "defaultcost" => {
                let atom = lexer.atom("a default cost")?;
                default_cost = Some(scale.decimal_to_cost(atom)?);
            }
            "costs" => {
                lexer.expect('[')?;
                loop {
                    if let Some(Token::Punct(']')) = lexer.peek() {
                        let _ = lexer.next("']'")?;
                        break;
                    }
                    let line = lexer.line();
                    cost_atoms.push((line, lexer.atom("a cost entry")?.to_owned()));
                    lexer.skip_comma();
                }
            }
            _ => {
                // Intensional and global cost functions are supplied by
                // dedicated modules, not by this loader.
                return Err(malformed(
                    line,
                    format!("unsupported function field '{key}'"),
                ));
            }
        }
        lexer.skip_comma();
    }

    let line = lexer.line();
    if scope.is_empty() {
        let cost = match cost_atoms.first() {
            Some((_, atom)) => scale.decimal_to_cost(atom)?,
            None => default_cost.unwrap_or(0),
        };
        if cost < 0 {
            wcsp.add_neg_cost(-cost);
        } else {
            wcsp.post_constant(cost);
        }
        return Ok(());
    }

    let sizes: Vec<usize> = scope
        .iter()
        .map(|&variable| wcsp.variable(variable).initial_size())
        .collect();
    let table_size: usize = sizes.iter().product();
    let arity = scope.len();

    let dense: Vec<Cost> = if cost_atoms.len() == table_size && default_cost.is_none() {
        cost_atoms
            .iter()
            .map(|(_, atom)| scale.decimal_to_cost(atom))
            .collect::<Result<_, _>>()?
    } else if cost_atoms.len() % (arity + 1) == 0 {
        // Sparse tuples over the default cost.
        let default_cost = default_cost
            .ok_or_else(|| malformed(line, "sparse cost tables need a defaultcost"))?;
        let mut dense = vec![default_cost; table_size];
        for group in cost_atoms.chunks(arity + 1) {
            let mut index = 0;
            for (position, (line, atom)) in group[..arity].iter().enumerate() {
                let value = value_index(wcsp, scope[position], atom)
                    .ok_or_else(|| malformed(*line, format!("unknown value '{atom}'")))?;
                index = index * sizes[position] + value;
            }
            let (_, cost_atom) = &group[arity];
            dense[index] = scale.decimal_to_cost(cost_atom)?;
        }
        dense
    } else {
        return Err(malformed(
            line,
            "the cost list matches neither a full table nor value/cost tuples",
        ));
    };

    match arity {
        1 => accumulator.add_unary(wcsp, scope[0], dense),
        2 => accumulator.add_binary(wcsp, scope[0], scope[1], dense),
        3 => accumulator.add_ternary(wcsp, [scope[0], scope[1], scope[2]], dense),
        _ => {
            let mut tuples = BTreeMap::new();
            for (index, &cost) in dense.iter().enumerate() {
                if cost != 0 {
                    let _ = tuples.insert(crate::parsers::unflatten(index, &sizes), cost);
                }
            }
            let (default, tuples) = shift_sparse(wcsp, 0, tuples);
            let _ = wcsp.post_tuples(&scope, default, tuples);
        }
    }
    Ok(())
}

/// Resolve a value given by name or by index.
fn value_index(wcsp: &Wcsp, variable: VariableId, atom: &str) -> Option<usize> {
    let x = wcsp.variable(variable);
    if let Some(position) = x.value_names.iter().position(|name| name == atom) {
        return Some(position);
    }
    atom.parse::<usize>()
        .ok()
        .filter(|&value| value < x.initial_size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_network() {
        let input = r#"{
            "problem": { "name": "tiny", "mustbe": "<10.0" },
            "variables": { "x": ["a", "b"], "y": 2 },
            "functions": {
                "unary_x": { "scope": ["x"], "costs": [1.0, 0.0] },
                "pair": {
                    "scope": ["x", "y"],
                    "defaultcost": 0.0,
                    "costs": ["a", 0, 2.5, "b", 1, 1.5]
                }
            }
        }"#;
        let wcsp = parse_cfn(input, CostScale::default()).unwrap();
        assert_eq!(wcsp.name(), "tiny");
        assert_eq!(wcsp.num_variables(), 2);
        // Precision 1 from the mustbe bound.
        assert_eq!(wcsp.cost_scale().precision, 1);
        assert_eq!(wcsp.upper_bound(), 100);
        assert_eq!(wcsp.assignment_cost(&[0, 0]), 10 + 25);
        assert_eq!(wcsp.assignment_cost(&[1, 1]), 15);
    }

    #[test]
    fn maximisation_negates_costs() {
        let input = r#"{
            "problem": { "name": "max", "mustbe": ">0" },
            "variables": { "x": 2 },
            "functions": { "w": { "scope": ["x"], "costs": [0, 3] } }
        }"#;
        let wcsp = parse_cfn(input, CostScale::default()).unwrap();
        // Maximising 3x becomes minimising -3x, shifted by 3.
        assert_eq!(wcsp.neg_cost(), 3);
        assert_eq!(wcsp.assignment_cost(&[1]), 0);
        assert_eq!(wcsp.assignment_cost(&[0]), 3);
    }

    #[test]
    fn unknown_scope_variables_are_rejected() {
        let input = r#"{
            "problem": { "name": "bad" },
            "variables": { "x": 2 },
            "functions": { "f": { "scope": ["z"], "costs": [0, 0] } }
        }"#;
        assert!(parse_cfn(input, CostScale::default()).is_err());
    }
}
