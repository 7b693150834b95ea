//! Text format for finite models.
//!
//! ```text
//! # the universe comes first
//! 0 1 2 3
//! ^ 2          <- operation header: symbol arity
//! 0 0 0        <- n^arity rows: arguments then image
//! ...
//! <= 9 2       <- relation header: symbol tuple-count arity
//! 0 0
//! ...
//! ```
//!
//! Blank lines are ignored and `#` starts a comment running to the end of the
//! line. A header is any line whose first token is not an integer. Only atom
//! universes can be written.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::debug;
use nom::character::complete::{char, digit1, space0, space1};
use nom::bytes::complete::take_while1;
use nom::combinator::{all_consuming, map, map_res, opt, recognize, verify};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::error::{AlgebraError, Result};
use crate::model::{Element, Model, Operation, Relation};
use crate::signature::Signature;

fn parse_atom(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(input)
}

fn parse_count(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

/// A whole line of integers.
fn parse_row(input: &str) -> IResult<&str, Vec<i64>> {
    all_consuming(delimited(space0, separated_list1(space1, parse_atom), space0))(input)
}

fn parse_symbol(input: &str) -> IResult<&str, &str> {
    verify(take_while1(|c: char| !c.is_whitespace()), |s: &str| {
        parse_atom(s).map_or(true, |(rest, _)| !rest.is_empty())
    })(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header<'a> {
    Operation { symbol: &'a str, arity: usize },
    Relation { symbol: &'a str, count: usize, arity: usize },
}

fn parse_header(input: &str) -> IResult<&str, Header<'_>> {
    all_consuming(map(
        delimited(
            space0,
            tuple((
                parse_symbol,
                preceded(space1, parse_count),
                opt(preceded(space1, parse_count)),
            )),
            space0,
        ),
        |(symbol, first, second)| match second {
            Some(arity) => Header::Relation {
                symbol,
                count: first,
                arity,
            },
            None => Header::Operation {
                symbol,
                arity: first,
            },
        },
    ))(input)
}

fn parse_error(line: usize, message: impl Into<String>) -> AlgebraError {
    AlgebraError::Parse {
        line,
        message: message.into(),
    }
}

/// The table currently being read and the number of rows still expected.
enum Pending {
    Operation {
        symbol: String,
        arity: usize,
        rows: BTreeMap<Vec<Element>, Element>,
        left: usize,
    },
    Relation {
        symbol: String,
        arity: usize,
        tuples: Vec<Vec<Element>>,
        left: usize,
    },
}

#[derive(Default)]
struct ModelBuilder {
    universe: Option<Vec<Element>>,
    operations: BTreeMap<String, Operation>,
    relations: BTreeMap<String, Relation>,
    op_arities: Vec<(String, usize)>,
    rel_arities: Vec<(String, usize)>,
    pending: Option<Pending>,
}

impl ModelBuilder {
    fn declared(&self, symbol: &str) -> bool {
        self.operations.contains_key(symbol)
            || self.relations.contains_key(symbol)
            || self.op_arities.iter().any(|(s, _)| s == symbol)
            || self.rel_arities.iter().any(|(s, _)| s == symbol)
    }

    fn line(&mut self, number: usize, line: &str) -> Result<()> {
        let universe = match &self.universe {
            None => {
                let (_, atoms) =
                    parse_row(line).map_err(|_| parse_error(number, "expected the universe"))?;
                self.universe = Some(atoms.into_iter().map(Element::Atom).collect());
                return Ok(());
            }
            Some(universe) => universe.len(),
        };
        if self.pending.is_some() {
            return self.row(number, line);
        }
        let (_, header) = parse_header(line)
            .map_err(|_| parse_error(number, "expected an operation or relation header"))?;
        let symbol = match header {
            Header::Operation { symbol, .. } | Header::Relation { symbol, .. } => symbol,
        };
        if self.declared(symbol) {
            return Err(parse_error(number, format!("symbol `{}` repeated", symbol)));
        }
        let pending = match header {
            Header::Operation { symbol, arity } => {
                self.op_arities.push((symbol.to_owned(), arity));
                Pending::Operation {
                    symbol: symbol.to_owned(),
                    arity,
                    rows: BTreeMap::new(),
                    left: universe.pow(arity as u32),
                }
            }
            Header::Relation {
                symbol,
                count,
                arity,
            } => {
                self.rel_arities.push((symbol.to_owned(), arity));
                Pending::Relation {
                    symbol: symbol.to_owned(),
                    arity,
                    // 0-ary tuples have no line of their own
                    tuples: if arity == 0 { vec![Vec::new(); count.min(1)] } else { Vec::new() },
                    left: if arity == 0 { 0 } else { count },
                }
            }
        };
        self.pending = Some(pending);
        self.finish_table(number)
    }

    fn row(&mut self, number: usize, line: &str) -> Result<()> {
        let (_, values) = parse_row(line).map_err(|_| parse_error(number, "expected a row of integers"))?;
        let values = values.into_iter().map(Element::Atom).collect::<Vec<_>>();
        match self.pending.as_mut() {
            Some(Pending::Operation {
                symbol,
                arity,
                rows,
                left,
            }) => {
                let (image, args) = match values.split_last() {
                    Some((image, args)) if args.len() == *arity => (image.clone(), args.to_vec()),
                    _ => {
                        return Err(parse_error(
                            number,
                            format!("operation `{}` expects {} arguments and an image", symbol, arity),
                        ))
                    }
                };
                if rows.insert(args, image).is_some() {
                    return Err(parse_error(number, format!("operation `{}` row repeated", symbol)));
                }
                *left -= 1;
            }
            Some(Pending::Relation {
                symbol,
                arity,
                tuples,
                left,
            }) => {
                if values.len() != *arity {
                    return Err(parse_error(
                        number,
                        format!("relation `{}` expects tuples of length {}", symbol, arity),
                    ));
                }
                tuples.push(values);
                *left -= 1;
            }
            None => return Err(parse_error(number, "unexpected row")),
        }
        self.finish_table(number)
    }

    fn finish_table(&mut self, number: usize) -> Result<()> {
        let done = match &self.pending {
            Some(Pending::Operation { left, .. }) | Some(Pending::Relation { left, .. }) => *left == 0,
            None => false,
        };
        if !done {
            return Ok(());
        }
        match self.pending.take() {
            Some(Pending::Operation {
                symbol, arity, rows, ..
            }) => {
                let op = Operation::new(arity, rows).map_err(|e| parse_error(number, e.to_string()))?;
                self.operations.insert(symbol, op);
            }
            Some(Pending::Relation {
                symbol,
                arity,
                tuples,
                ..
            }) => {
                let rel = Relation::new(arity, tuples).map_err(|e| parse_error(number, e.to_string()))?;
                self.relations.insert(symbol, rel);
            }
            None => {}
        }
        Ok(())
    }

    fn build(self, last_line: usize) -> Result<Model> {
        if let Some(pending) = &self.pending {
            let (symbol, left) = match pending {
                Pending::Operation { symbol, left, .. } | Pending::Relation { symbol, left, .. } => {
                    (symbol, left)
                }
            };
            return Err(parse_error(
                last_line,
                format!("table of `{}` is missing {} rows", symbol, left),
            ));
        }
        let universe = self
            .universe
            .ok_or_else(|| parse_error(last_line, "missing universe"))?;
        let signature = Signature::new(self.op_arities, self.rel_arities);
        Model::new(signature, universe, self.operations, self.relations)
    }
}

/// Reads a model from the text format.
pub fn parse_model(text: &str) -> Result<Model> {
    let mut builder = ModelBuilder::default();
    let mut last_line = 0;
    for (i, line) in text.lines().enumerate() {
        last_line = i + 1;
        let line = match line.find('#') {
            Some(start) => &line[..start],
            None => line,
        };
        if line.trim().is_empty() {
            continue;
        }
        builder.line(i + 1, line)?;
    }
    builder.build(last_line)
}

/// Reads a model file, naming the model after the file.
pub fn read_model_file(path: &Path) -> Result<Model> {
    let text = fs::read_to_string(path)?;
    let model = parse_model(&text)?;
    debug!(
        "Read {} elements and {} from {}",
        model.cardinality(),
        model.signature(),
        path.display()
    );
    Ok(match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => {
            let name = stem.strip_suffix(".model").unwrap_or(stem).to_owned();
            model.with_name(name)
        }
        None => model,
    })
}

fn atom(x: &Element) -> Result<i64> {
    x.atom().ok_or_else(|| {
        AlgebraError::TypeMismatch(format!("only atoms can be written, found {}", x))
    })
}

fn write_atoms<'a, I: IntoIterator<Item = &'a Element>>(out: &mut String, xs: I) -> Result<()> {
    let atoms = xs.into_iter().map(atom).collect::<Result<Vec<_>>>()?;
    let _ = writeln!(
        out,
        "{}",
        atoms.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ")
    );
    Ok(())
}

fn check_symbol(symbol: &str) -> Result<()> {
    match parse_symbol(symbol) {
        Ok(("", _)) if !symbol.contains('#') => Ok(()),
        _ => Err(AlgebraError::SignatureMismatch(format!(
            "`{}` cannot be written as a symbol",
            symbol
        ))),
    }
}

/// Writes `model` in the text format. Tables are written in signature order,
/// rows in the order of their arguments.
pub fn write_model(model: &Model) -> Result<String> {
    let mut out = String::new();
    if let Some(name) = model.name() {
        let _ = writeln!(out, "# {}", name);
    }
    write_atoms(&mut out, model.universe())?;
    for (symbol, op) in model.operations() {
        check_symbol(symbol)?;
        let _ = writeln!(out, "{} {}", symbol, op.arity());
        for (args, image) in op.rows() {
            write_atoms(&mut out, args.iter().chain(std::iter::once(image)))?;
        }
    }
    for (symbol, rel) in model.relations() {
        check_symbol(symbol)?;
        let _ = writeln!(out, "{} {} {}", symbol, rel.len(), rel.arity());
        if rel.arity() > 0 {
            for tuple in rel.tuples() {
                write_atoms(&mut out, tuple)?;
            }
        }
    }
    Ok(out)
}

/// Writes `model` to `path` in the format read by [read_model_file].
pub fn write_model_file(model: &Model, path: &Path) -> Result<()> {
    fs::write(path, write_model(model)?)?;
    Ok(())
}

/// Symbols mentioned in a model file, without reading the tables.
pub fn symbols(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter_map(|line| parse_header(line.split('#').next().unwrap_or("")).ok())
        .map(|(_, header)| match header {
            Header::Operation { symbol, .. } | Header::Relation { symbol, .. } => symbol.to_owned(),
        })
        .collect()
}
