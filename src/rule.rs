//! Assignment rules evaluated repeatedly during integration.
//!
//! Rules fire in declaration order; each sees the state as mutated by
//! earlier rules in the same step. There is no dependency analysis and no
//! fixed-point iteration: a rule whose right-hand side reads a slot
//! written by a *later* rule sees the pre-step value.

use crate::error::{ModelError, Result};
use crate::expression::{self, Term, PARAM_MARKER, PARAM_PREFIX};
use crate::symbols::SymbolTable;

/// The slot an assignment writes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleTarget {
    Species(usize),
    Parameter(usize),
}

#[derive(Clone, Debug)]
pub enum Rule {
    /// `dest = s1 + s2 + ...` summing species counts into a species slot.
    AdditiveAssignment { dest: usize, sources: Vec<usize> },
    /// `lhs = <expr>` writing into a species or parameter slot.
    GeneralAssignment { target: RuleTarget, rate: Term },
}

impl Rule {
    /// Apply with unit volume.
    pub fn apply(&self, state: &mut [f64], params: &mut [f64], time: f64) {
        self.volume_apply(state, params, 1.0, time);
    }

    /// Apply with an explicit cell volume. Writes to a parameter slot take
    /// effect on every subsequent evaluation in the same step.
    pub fn volume_apply(&self, state: &mut [f64], params: &mut [f64], volume: f64, time: f64) {
        match self {
            Rule::AdditiveAssignment { dest, sources } => {
                state[*dest] = sources.iter().map(|&s| state[s]).sum();
            }
            Rule::GeneralAssignment { target, rate } => {
                let value = rate.volume_evaluate(state, params, volume, time);
                match target {
                    RuleTarget::Species(i) => state[*i] = value,
                    RuleTarget::Parameter(i) => params[*i] = value,
                }
            }
        }
    }

    /// Free species and parameter names of a rule equation, without a
    /// symbol table.
    pub fn species_and_parameters(
        kind: &str,
        frequency: &str,
        equation: &str,
    ) -> Result<(Vec<String>, Vec<String>)> {
        check_frequency(frequency)?;
        let (lhs, rhs) = split_equation(equation)?;
        match kind {
            "additive" => {
                let mut species = vec![lhs.to_string()];
                species.extend(split_sum(rhs));
                Ok((species, Vec::new()))
            }
            "assignment" => {
                let (mut species, mut params) = expression::analyze(rhs)?;
                match classify_target(lhs) {
                    TargetName::Parameter(name) => params.push(name.to_string()),
                    TargetName::Species(name) => species.push(name.to_string()),
                }
                Ok((species, params))
            }
            other => Err(ModelError::UnknownRuleType(other.to_string())),
        }
    }

    /// Bind a rule equation against the symbol table.
    pub fn from_equation(
        kind: &str,
        frequency: &str,
        equation: &str,
        table: &mut SymbolTable,
    ) -> Result<Rule> {
        check_frequency(frequency)?;
        let (lhs, rhs) = split_equation(equation)?;
        match kind {
            "additive" => Ok(Rule::AdditiveAssignment {
                dest: table.intern_species(lhs),
                sources: split_sum(rhs)
                    .iter()
                    .map(|name| table.intern_species(name))
                    .collect(),
            }),
            "assignment" => {
                let target = match classify_target(lhs) {
                    TargetName::Parameter(name) => {
                        RuleTarget::Parameter(table.intern_parameter(name))
                    }
                    TargetName::Species(name) => RuleTarget::Species(table.intern_species(name)),
                };
                Ok(Rule::GeneralAssignment {
                    target,
                    rate: expression::parse_expression(rhs, table)?,
                })
            }
            other => Err(ModelError::UnknownRuleType(other.to_string())),
        }
    }
}

enum TargetName<'a> {
    Species(&'a str),
    Parameter(&'a str),
}

/// The target slot is a parameter iff the left-hand side carries the
/// declarative `|` marker or the internal underscore prefix.
fn classify_target(lhs: &str) -> TargetName<'_> {
    if let Some(stripped) = lhs.strip_prefix(PARAM_MARKER) {
        TargetName::Parameter(stripped)
    } else if let Some(stripped) = lhs.strip_prefix(PARAM_PREFIX) {
        TargetName::Parameter(stripped)
    } else {
        TargetName::Species(lhs)
    }
}

fn check_frequency(frequency: &str) -> Result<()> {
    if frequency != "repeated" {
        return Err(ModelError::UnsupportedRuleFrequency(frequency.to_string()));
    }
    Ok(())
}

fn split_equation(equation: &str) -> Result<(&str, &str)> {
    let mut sides = equation.splitn(2, '=');
    let lhs = sides.next().unwrap_or("").trim();
    let rhs = sides.next().map(str::trim).ok_or_else(|| {
        ModelError::MalformedReaction(format!("rule equation '{}' has no '='", equation))
    })?;
    if lhs.is_empty() || rhs.is_empty() {
        return Err(ModelError::MalformedReaction(format!(
            "rule equation '{}' is missing a side",
            equation
        )));
    }
    Ok((lhs, rhs))
}

fn split_sum(rhs: &str) -> Vec<String> {
    rhs.split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
