//! Symbolic rate expressions.
//!
//! A rate string like `"k1*S / (1 + (S/_K)^2)"` is tokenized and put into
//! postfix order by meval, then folded once into an owned [`Term`] tree.
//! Centralizing the parse here guarantees that user rate strings and
//! SBML-imported rate strings follow identical semantics, and that the
//! free-symbol analysis used for interning sees exactly what the evaluator
//! will see.
//!
//! Identifier classification: `volume` and `t` are keywords, a leading `|`
//! (rewritten internally to `_`) marks a parameter, everything else is a
//! species. `pi` and `e` reduce to their numeric constants.

use meval::shunting_yard::to_rpn;
use meval::tokenizer::{tokenize, Operation, Token};

use crate::error::{ModelError, Result};
use crate::symbols::SymbolTable;

/// The declarative marker for parameter references in rate strings.
pub const PARAM_MARKER: char = '|';

/// Internal parameter prefix after rewriting.
pub const PARAM_PREFIX: char = '_';

/// A node of a parsed rate expression.
///
/// Parents exclusively own their children; a tree is built once by the
/// parser and immutable afterwards. Species and parameters carry dense
/// indices into the externally owned state/parameter vectors.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Constant(f64),
    Species(usize),
    Parameter(usize),
    Volume,
    Time,
    Sum(Vec<Term>),
    Product(Vec<Term>),
    Power(Box<Term>, Box<Term>),
    Exp(Box<Term>),
    Log(Box<Term>),
    Step(Box<Term>),
    Abs(Box<Term>),
    Max(Vec<Term>),
    Min(Vec<Term>),
}

impl Term {
    /// Evaluate against counts, parameters and time. Equivalent to
    /// [`Term::volume_evaluate`] with a unit volume.
    #[inline]
    pub fn evaluate(&self, state: &[f64], params: &[f64], time: f64) -> f64 {
        self.volume_evaluate(state, params, 1.0, time)
    }

    /// Evaluate with an explicit cell volume. Species nodes still read raw
    /// counts; any count-to-concentration rescaling is the propensity
    /// layer's responsibility.
    pub fn volume_evaluate(&self, state: &[f64], params: &[f64], volume: f64, time: f64) -> f64 {
        match self {
            Term::Constant(v) => *v,
            Term::Species(i) => state[*i],
            Term::Parameter(i) => params[*i],
            Term::Volume => volume,
            Term::Time => time,
            Term::Sum(terms) => terms
                .iter()
                .map(|t| t.volume_evaluate(state, params, volume, time))
                .sum(),
            Term::Product(terms) => terms
                .iter()
                .map(|t| t.volume_evaluate(state, params, volume, time))
                .product(),
            Term::Power(base, exponent) => base
                .volume_evaluate(state, params, volume, time)
                .powf(exponent.volume_evaluate(state, params, volume, time)),
            Term::Exp(x) => x.volume_evaluate(state, params, volume, time).exp(),
            Term::Log(x) => x.volume_evaluate(state, params, volume, time).ln(),
            Term::Step(x) => {
                if x.volume_evaluate(state, params, volume, time) >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Term::Abs(x) => x.volume_evaluate(state, params, volume, time).abs(),
            Term::Max(terms) => terms
                .iter()
                .map(|t| t.volume_evaluate(state, params, volume, time))
                .reduce(f64::max)
                .unwrap_or(0.0),
            Term::Min(terms) => terms
                .iter()
                .map(|t| t.volume_evaluate(state, params, volume, time))
                .reduce(f64::min)
                .unwrap_or(0.0),
        }
    }

    /// Sorted, deduplicated species indices this tree reads. Used to build
    /// reaction dependency graphs without re-walking trees per step.
    pub fn dependencies(&self) -> Vec<usize> {
        let mut deps = Vec::new();
        self.collect_dependencies(&mut deps);
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    fn collect_dependencies(&self, deps: &mut Vec<usize>) {
        match self {
            Term::Species(i) => deps.push(*i),
            Term::Sum(terms) | Term::Product(terms) | Term::Max(terms) | Term::Min(terms) => {
                for t in terms {
                    t.collect_dependencies(deps);
                }
            }
            Term::Power(base, exponent) => {
                base.collect_dependencies(deps);
                exponent.collect_dependencies(deps);
            }
            Term::Exp(x) | Term::Log(x) | Term::Step(x) | Term::Abs(x) => {
                x.collect_dependencies(deps)
            }
            _ => {}
        }
    }
}

/// How identifiers resolve while a tree is built.
trait Names {
    fn species(&mut self, name: &str) -> Result<usize>;
    fn parameter(&mut self, name: &str) -> Result<usize>;
}

/// Interns every name on first sight; used for free-symbol discovery.
#[derive(Default)]
struct Collector {
    species: Vec<String>,
    params: Vec<String>,
}

impl Names for Collector {
    fn species(&mut self, name: &str) -> Result<usize> {
        if let Some(idx) = self.species.iter().position(|s| s == name) {
            return Ok(idx);
        }
        self.species.push(name.to_string());
        Ok(self.species.len() - 1)
    }

    fn parameter(&mut self, name: &str) -> Result<usize> {
        if let Some(idx) = self.params.iter().position(|s| s == name) {
            return Ok(idx);
        }
        self.params.push(name.to_string());
        Ok(self.params.len() - 1)
    }
}

/// Resolves against a finished symbol table; used for binding.
struct Bound<'a> {
    table: &'a SymbolTable,
}

impl Names for Bound<'_> {
    fn species(&mut self, name: &str) -> Result<usize> {
        self.table
            .species_index(name)
            .ok_or_else(|| ModelError::Lookup(name.to_string()))
    }

    fn parameter(&mut self, name: &str) -> Result<usize> {
        self.table
            .param_index(name)
            .ok_or_else(|| ModelError::Lookup(name.to_string()))
    }
}

/// Free species and parameter names of a rate string, in first-sight order.
///
/// Runs the full parse against a throwaway interner so that any
/// `UnparseableRate` surfaces during the discovery phase.
pub fn analyze(rate: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut collector = Collector::default();
    build(rate, &mut collector)?;
    Ok((collector.species, collector.params))
}

/// Parse a rate string against a finished symbol table.
pub fn parse_expression(rate: &str, table: &SymbolTable) -> Result<Term> {
    build(rate, &mut Bound { table })
}

fn build(rate: &str, names: &mut dyn Names) -> Result<Term> {
    let rewritten = rate.replace(PARAM_MARKER, "_");
    let tokens =
        tokenize(&rewritten).map_err(|e| ModelError::unparseable(rate, format!("{:?}", e)))?;
    let rpn = to_rpn(&tokens).map_err(|e| ModelError::unparseable(rate, format!("{:?}", e)))?;

    let mut stack: Vec<Term> = Vec::new();
    for token in &rpn {
        match token {
            Token::Number(n) => {
                if !n.is_finite() {
                    return Err(ModelError::unparseable(rate, "non-finite numeric literal"));
                }
                stack.push(Term::Constant(*n));
            }
            Token::Var(name) => stack.push(resolve_var(rate, name, names)?),
            Token::Binary(op) => {
                let right = pop(&mut stack, rate)?;
                let left = pop(&mut stack, rate)?;
                stack.push(apply_binary(rate, op.clone(), left, right)?);
            }
            Token::Unary(op) => {
                let operand = pop(&mut stack, rate)?;
                stack.push(apply_unary(rate, op.clone(), operand)?);
            }
            Token::Func(name, arity) => {
                let n_args = (*arity).unwrap_or(1);
                if stack.len() < n_args {
                    return Err(ModelError::unparseable(rate, "malformed function call"));
                }
                let args = stack.split_off(stack.len() - n_args);
                stack.push(apply_func(rate, name, args)?);
            }
            _ => return Err(ModelError::unparseable(rate, "unexpected token")),
        }
    }
    let root = pop(&mut stack, rate)?;
    if !stack.is_empty() {
        return Err(ModelError::unparseable(rate, "dangling operands"));
    }
    Ok(root)
}

fn pop(stack: &mut Vec<Term>, rate: &str) -> Result<Term> {
    stack
        .pop()
        .ok_or_else(|| ModelError::unparseable(rate, "missing operand"))
}

fn resolve_var(rate: &str, name: &str, names: &mut dyn Names) -> Result<Term> {
    match name {
        "volume" => Ok(Term::Volume),
        "t" => Ok(Term::Time),
        "pi" => Ok(Term::Constant(std::f64::consts::PI)),
        "e" => Ok(Term::Constant(std::f64::consts::E)),
        _ => {
            if let Some(stripped) = name.strip_prefix(PARAM_PREFIX) {
                if stripped.is_empty() {
                    return Err(ModelError::unparseable(rate, "empty parameter name"));
                }
                Ok(Term::Parameter(names.parameter(stripped)?))
            } else {
                Ok(Term::Species(names.species(name)?))
            }
        }
    }
}

fn apply_binary(rate: &str, op: Operation, left: Term, right: Term) -> Result<Term> {
    // The node catalog has no Subtract/Divide; both rewrite onto Sum,
    // Product and Power so downstream dispatch stays closed.
    Ok(match op {
        Operation::Plus => sum_of(vec![left, right]),
        Operation::Minus => sum_of(vec![left, negate(right)]),
        Operation::Times => product_of(vec![left, right]),
        Operation::Div => product_of(vec![
            left,
            Term::Power(Box::new(right), Box::new(Term::Constant(-1.0))),
        ]),
        Operation::Pow => Term::Power(Box::new(left), Box::new(right)),
        other => {
            return Err(ModelError::unparseable(
                rate,
                format!("unsupported operator {:?}", other),
            ))
        }
    })
}

fn apply_unary(rate: &str, op: Operation, operand: Term) -> Result<Term> {
    Ok(match op {
        Operation::Plus => operand,
        Operation::Minus => negate(operand),
        other => {
            return Err(ModelError::unparseable(
                rate,
                format!("unsupported unary operator {:?}", other),
            ))
        }
    })
}

fn apply_func(rate: &str, name: &str, mut args: Vec<Term>) -> Result<Term> {
    let unary = |args: &mut Vec<Term>| -> Result<Box<Term>> {
        if args.len() != 1 {
            return Err(ModelError::unparseable(
                rate,
                format!("{} takes exactly one argument", name),
            ));
        }
        Ok(Box::new(args.remove(0)))
    };
    match name {
        "exp" => Ok(Term::Exp(unary(&mut args)?)),
        "log" => Ok(Term::Log(unary(&mut args)?)),
        "abs" => Ok(Term::Abs(unary(&mut args)?)),
        "heaviside" => Ok(Term::Step(unary(&mut args)?)),
        "Max" | "max" => Ok(Term::Max(args)),
        "Min" | "min" => Ok(Term::Min(args)),
        other => Err(ModelError::unparseable(
            rate,
            format!("unknown function '{}'", other),
        )),
    }
}

fn negate(term: Term) -> Term {
    product_of(vec![Term::Constant(-1.0), term])
}

/// Flatten nested sums so `a + b + c` is one n-ary node.
fn sum_of(terms: Vec<Term>) -> Term {
    let mut flat = Vec::with_capacity(terms.len());
    for term in terms {
        match term {
            Term::Sum(children) => flat.extend(children),
            other => flat.push(other),
        }
    }
    Term::Sum(flat)
}

fn product_of(terms: Vec<Term>) -> Term {
    let mut flat = Vec::with_capacity(terms.len());
    for term in terms {
        match term {
            Term::Product(children) => flat.extend(children),
            other => flat.push(other),
        }
    }
    Term::Product(flat)
}
