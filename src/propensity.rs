//! The closed catalog of rate-law shapes.
//!
//! The specialized variants cover the common reaction forms with
//! straight-line arithmetic; `General` falls back to a tree walk per call.
//! After binding, every variant carries only dense indices into the
//! state/parameter vectors.

use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::expression::{self, Term};
use crate::symbols::{attr_param_name, SymbolTable};

#[derive(Clone, Debug)]
pub enum Propensity {
    /// `k`, volume form `k * V`.
    Constitutive { k: usize },
    /// `k * x`.
    Unimolecular { k: usize, species: usize },
    /// `k * x1 * x2`, volume form divides by `V`.
    Bimolecular { k: usize, species: [usize; 2] },
    /// `k * prod(x_i)`, volume form divides by `V^(n-1)`.
    MassAction { k: usize, species: Vec<usize> },
    /// `k * (x/K)^n / (1 + (x/K)^n)`.
    HillPositive {
        k: usize,
        s1: usize,
        k_half: usize,
        n: usize,
    },
    /// `k / (1 + (x/K)^n)`.
    HillNegative {
        k: usize,
        s1: usize,
        k_half: usize,
        n: usize,
    },
    /// `k * d * (x/K)^n / (1 + (x/K)^n)`; `d` counts are never rescaled.
    ProportionalHillPositive {
        k: usize,
        s1: usize,
        d: usize,
        k_half: usize,
        n: usize,
    },
    /// `k * d / (1 + (x/K)^n)`.
    ProportionalHillNegative {
        k: usize,
        s1: usize,
        d: usize,
        k_half: usize,
        n: usize,
    },
    /// Arbitrary parsed rate expression.
    General { rate: Term },
}

impl Propensity {
    /// Instantaneous firing rate from counts. Non-negative for the
    /// specialized shapes whenever counts and parameters are non-negative.
    pub fn get_propensity(&self, state: &[f64], params: &[f64], time: f64) -> f64 {
        match self {
            Propensity::Constitutive { k } => params[*k],
            Propensity::Unimolecular { k, species } => params[*k] * state[*species],
            Propensity::Bimolecular { k, species } => {
                params[*k] * state[species[0]] * state[species[1]]
            }
            Propensity::MassAction { k, species } => {
                species.iter().fold(params[*k], |acc, &s| acc * state[s])
            }
            Propensity::HillPositive { k, s1, k_half, n } => {
                let ratio = (state[*s1] / params[*k_half]).powf(params[*n]);
                params[*k] * ratio / (1.0 + ratio)
            }
            Propensity::HillNegative { k, s1, k_half, n } => {
                let ratio = (state[*s1] / params[*k_half]).powf(params[*n]);
                params[*k] / (1.0 + ratio)
            }
            Propensity::ProportionalHillPositive { k, s1, d, k_half, n } => {
                let ratio = (state[*s1] / params[*k_half]).powf(params[*n]);
                params[*k] * state[*d] * ratio / (1.0 + ratio)
            }
            Propensity::ProportionalHillNegative { k, s1, d, k_half, n } => {
                let ratio = (state[*s1] / params[*k_half]).powf(params[*n]);
                params[*k] * state[*d] / (1.0 + ratio)
            }
            Propensity::General { rate } => rate.evaluate(state, params, time),
        }
    }

    /// Volume-aware firing rate: counts are rescaled to concentrations
    /// where the rate-law shape calls for it.
    pub fn get_volume_propensity(
        &self,
        state: &[f64],
        params: &[f64],
        volume: f64,
        time: f64,
    ) -> f64 {
        match self {
            Propensity::Constitutive { k } => params[*k] * volume,
            Propensity::Unimolecular { k, species } => params[*k] * state[*species],
            Propensity::Bimolecular { k, species } => {
                params[*k] * state[species[0]] * state[species[1]] / volume
            }
            Propensity::MassAction { k, species } => match species.len() {
                0 => params[*k] * volume,
                n => {
                    let product = species.iter().fold(params[*k], |acc, &s| acc * state[s]);
                    product / volume.powi(n as i32 - 1)
                }
            },
            Propensity::HillPositive { k, s1, k_half, n } => {
                let ratio = (state[*s1] / volume / params[*k_half]).powf(params[*n]);
                params[*k] * ratio / (1.0 + ratio)
            }
            Propensity::HillNegative { k, s1, k_half, n } => {
                let ratio = (state[*s1] / volume / params[*k_half]).powf(params[*n]);
                params[*k] / (1.0 + ratio)
            }
            Propensity::ProportionalHillPositive { k, s1, d, k_half, n } => {
                let ratio = (state[*s1] / volume / params[*k_half]).powf(params[*n]);
                params[*k] * state[*d] * ratio / (1.0 + ratio)
            }
            Propensity::ProportionalHillNegative { k, s1, d, k_half, n } => {
                let ratio = (state[*s1] / volume / params[*k_half]).powf(params[*n]);
                params[*k] * state[*d] / (1.0 + ratio)
            }
            Propensity::General { rate } => rate.volume_evaluate(state, params, volume, time),
        }
    }

    /// Species indices this propensity reads.
    pub fn dependencies(&self) -> Vec<usize> {
        match self {
            Propensity::Constitutive { .. } => Vec::new(),
            Propensity::Unimolecular { species, .. } => vec![*species],
            Propensity::Bimolecular { species, .. } => {
                let mut deps = species.to_vec();
                deps.sort_unstable();
                deps.dedup();
                deps
            }
            Propensity::MassAction { species, .. } => {
                let mut deps = species.clone();
                deps.sort_unstable();
                deps.dedup();
                deps
            }
            Propensity::HillPositive { s1, .. } | Propensity::HillNegative { s1, .. } => {
                vec![*s1]
            }
            Propensity::ProportionalHillPositive { s1, d, .. }
            | Propensity::ProportionalHillNegative { s1, d, .. } => {
                let mut deps = vec![*s1, *d];
                deps.sort_unstable();
                deps.dedup();
                deps
            }
            Propensity::General { rate } => rate.dependencies(),
        }
    }

    /// Free species and parameter names of a propensity's attribute set,
    /// without needing a symbol table. The assembler interns these before
    /// calling [`Propensity::from_fields`].
    pub fn species_and_parameters(
        kind: &str,
        fields: &HashMap<String, String>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut species = Vec::new();
        let mut params = Vec::new();
        match kind {
            "constitutive" => {
                push_param(&mut params, require(fields, kind, "k")?);
            }
            "unimolecular" => {
                push_param(&mut params, require(fields, kind, "k")?);
                species.extend(split_species_product(require(fields, kind, "species")?)?);
            }
            "bimolecular" => {
                push_param(&mut params, require(fields, kind, "k")?);
                species.extend(split_species_product(require(fields, kind, "species")?)?);
            }
            "massaction" => {
                push_param(&mut params, require(fields, kind, "k")?);
                if let Some(product) = fields.get("species") {
                    species.extend(split_species_product(product)?);
                }
            }
            "hillpositive" | "hillnegative" => {
                push_param(&mut params, require(fields, kind, "k")?);
                species.push(require(fields, kind, "s1")?.trim().to_string());
                push_param(&mut params, require(fields, kind, "K")?);
                push_param(&mut params, require(fields, kind, "n")?);
            }
            "proportionalhillpositive" | "proportionalhillnegative" => {
                push_param(&mut params, require(fields, kind, "k")?);
                species.push(require(fields, kind, "d")?.trim().to_string());
                species.push(require(fields, kind, "s1")?.trim().to_string());
                push_param(&mut params, require(fields, kind, "K")?);
                push_param(&mut params, require(fields, kind, "n")?);
            }
            "general" => {
                let (s, p) = expression::analyze(require(fields, kind, "rate")?)?;
                species.extend(s);
                params.extend(p);
            }
            other => return Err(ModelError::UnknownPropensityType(other.to_string())),
        }
        Ok((species, params))
    }

    /// Bind a propensity's attribute set against the symbol table.
    ///
    /// A `massaction` declaration specializes by operand count: 0 becomes
    /// `Constitutive`, 1 `Unimolecular`, 2 `Bimolecular`. Semantics are
    /// identical; the specialized shapes just skip the loop.
    pub fn from_fields(
        kind: &str,
        fields: &HashMap<String, String>,
        table: &mut SymbolTable,
    ) -> Result<Propensity> {
        let built = match kind {
            "constitutive" => {
                warn_unused(kind, fields, &["k"]);
                Propensity::Constitutive {
                    k: table.bind_param_attr(require(fields, kind, "k")?),
                }
            }
            "unimolecular" => {
                warn_unused(kind, fields, &["k", "species"]);
                let operands = bind_species_product(require(fields, kind, "species")?, table)?;
                let [species] = operands.as_slice() else {
                    return Err(ModelError::MalformedReaction(format!(
                        "unimolecular propensity needs exactly one species, got {}",
                        operands.len()
                    )));
                };
                Propensity::Unimolecular {
                    k: table.bind_param_attr(require(fields, kind, "k")?),
                    species: *species,
                }
            }
            "bimolecular" => {
                warn_unused(kind, fields, &["k", "species"]);
                let operands = bind_species_product(require(fields, kind, "species")?, table)?;
                let [s1, s2] = operands.as_slice() else {
                    return Err(ModelError::MalformedReaction(format!(
                        "bimolecular propensity needs exactly two species, got {}",
                        operands.len()
                    )));
                };
                Propensity::Bimolecular {
                    k: table.bind_param_attr(require(fields, kind, "k")?),
                    species: [*s1, *s2],
                }
            }
            "massaction" => {
                warn_unused(kind, fields, &["k", "species"]);
                let k = table.bind_param_attr(require(fields, kind, "k")?);
                let operands = match fields.get("species") {
                    Some(product) => bind_species_product(product, table)?,
                    None => Vec::new(),
                };
                match operands.as_slice() {
                    [] => Propensity::Constitutive { k },
                    [species] => Propensity::Unimolecular {
                        k,
                        species: *species,
                    },
                    [s1, s2] => Propensity::Bimolecular {
                        k,
                        species: [*s1, *s2],
                    },
                    _ => Propensity::MassAction {
                        k,
                        species: operands,
                    },
                }
            }
            "hillpositive" | "hillnegative" => {
                warn_unused(kind, fields, &["k", "s1", "K", "n"]);
                let k = table.bind_param_attr(require(fields, kind, "k")?);
                let s1 = table.intern_species(require(fields, kind, "s1")?.trim());
                let k_half = table.bind_param_attr(require(fields, kind, "K")?);
                let n = table.bind_param_attr(require(fields, kind, "n")?);
                if kind == "hillpositive" {
                    Propensity::HillPositive { k, s1, k_half, n }
                } else {
                    Propensity::HillNegative { k, s1, k_half, n }
                }
            }
            "proportionalhillpositive" | "proportionalhillnegative" => {
                warn_unused(kind, fields, &["k", "d", "s1", "K", "n"]);
                let k = table.bind_param_attr(require(fields, kind, "k")?);
                let d = table.intern_species(require(fields, kind, "d")?.trim());
                let s1 = table.intern_species(require(fields, kind, "s1")?.trim());
                let k_half = table.bind_param_attr(require(fields, kind, "K")?);
                let n = table.bind_param_attr(require(fields, kind, "n")?);
                if kind == "proportionalhillpositive" {
                    Propensity::ProportionalHillPositive { k, s1, d, k_half, n }
                } else {
                    Propensity::ProportionalHillNegative { k, s1, d, k_half, n }
                }
            }
            "general" => {
                warn_unused(kind, fields, &["rate"]);
                Propensity::General {
                    rate: expression::parse_expression(require(fields, kind, "rate")?, table)?,
                }
            }
            other => return Err(ModelError::UnknownPropensityType(other.to_string())),
        };
        Ok(built)
    }
}

fn require<'a>(fields: &'a HashMap<String, String>, kind: &str, key: &str) -> Result<&'a str> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| {
            ModelError::MalformedReaction(format!(
                "{} propensity is missing required attribute '{}'",
                kind, key
            ))
        })
}

fn warn_unused(kind: &str, fields: &HashMap<String, String>, known: &[&str]) {
    for key in fields.keys() {
        if !known.contains(&key.as_str()) {
            log::warn!("unused attribute '{}' on {} propensity", key, kind);
        }
    }
}

fn push_param(params: &mut Vec<String>, value: &str) {
    if let Some(name) = attr_param_name(value) {
        params.push(name.to_string());
    }
}

/// Split a `*`-separated species product like `"A*B*A"`.
fn split_species_product(product: &str) -> Result<Vec<String>> {
    if product.contains('+') || product.contains('-') {
        return Err(ModelError::InvalidStoichiometry(format!(
            "species product '{}' may only combine names with '*'",
            product
        )));
    }
    Ok(product
        .split('*')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

fn bind_species_product(product: &str, table: &mut SymbolTable) -> Result<Vec<usize>> {
    Ok(split_species_product(product)?
        .iter()
        .map(|name| table.intern_species(name))
        .collect())
}
