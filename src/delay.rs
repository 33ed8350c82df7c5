//! Delay-time distributions sampled once per reaction firing.

use std::collections::HashMap;

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma, Normal};

use crate::error::{ModelError, Result};
use crate::symbols::{attr_param_name, SymbolTable};

#[derive(Clone, Debug, Default)]
pub enum Delay {
    /// Delayed stoichiometry applies immediately.
    #[default]
    None,
    /// Deterministic waiting time `params[delay]`.
    Fixed { delay: usize },
    /// N(mean, std). May sample negative; the delay queue decides how to
    /// treat negative waiting times.
    Gaussian { mean: usize, std: usize },
    /// Gamma(shape k, scale theta).
    Gamma { shape: usize, scale: usize },
}

impl Delay {
    /// Draw one waiting time. Never reads `state`; the argument keeps the
    /// evaluation contract uniform with propensities.
    pub fn sample(&self, _state: &[f64], params: &[f64], rng: &mut ChaCha8Rng) -> f64 {
        match self {
            Delay::None => 0.0,
            Delay::Fixed { delay } => params[*delay],
            Delay::Gaussian { mean, std } => Normal::new(params[*mean], params[*std])
                .map(|dist| dist.sample(rng))
                .unwrap_or(params[*mean]),
            Delay::Gamma { shape, scale } => Gamma::new(params[*shape], params[*scale])
                .map(|dist| dist.sample(rng))
                .unwrap_or(0.0),
        }
    }

    /// Free parameter names of a delay's attribute set. Delays never
    /// reference species.
    pub fn species_and_parameters(
        kind: &str,
        fields: &HashMap<String, String>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut params = Vec::new();
        match kind {
            "none" => {}
            "fixed" => push_param(&mut params, require(fields, kind, "delay")?),
            "gaussian" => {
                push_param(&mut params, require(fields, kind, "mean")?);
                push_param(&mut params, require(fields, kind, "std")?);
            }
            "gamma" => {
                push_param(&mut params, require(fields, kind, "k")?);
                push_param(&mut params, require(fields, kind, "theta")?);
            }
            other => return Err(ModelError::UnknownDelayType(other.to_string())),
        }
        Ok((Vec::new(), params))
    }

    /// Bind a delay's attribute set against the symbol table.
    pub fn from_fields(
        kind: &str,
        fields: &HashMap<String, String>,
        table: &mut SymbolTable,
    ) -> Result<Delay> {
        let built = match kind {
            "none" => {
                warn_unused(kind, fields, &[]);
                Delay::None
            }
            "fixed" => {
                warn_unused(kind, fields, &["delay"]);
                Delay::Fixed {
                    delay: table.bind_param_attr(require(fields, kind, "delay")?),
                }
            }
            "gaussian" => {
                warn_unused(kind, fields, &["mean", "std"]);
                Delay::Gaussian {
                    mean: table.bind_param_attr(require(fields, kind, "mean")?),
                    std: table.bind_param_attr(require(fields, kind, "std")?),
                }
            }
            "gamma" => {
                warn_unused(kind, fields, &["k", "theta"]);
                Delay::Gamma {
                    shape: table.bind_param_attr(require(fields, kind, "k")?),
                    scale: table.bind_param_attr(require(fields, kind, "theta")?),
                }
            }
            other => return Err(ModelError::UnknownDelayType(other.to_string())),
        };
        Ok(built)
    }

    /// Whether a firing of this reaction ever schedules delayed updates.
    pub fn is_none(&self) -> bool {
        matches!(self, Delay::None)
    }
}

fn require<'a>(fields: &'a HashMap<String, String>, kind: &str, key: &str) -> Result<&'a str> {
    fields.get(key).map(String::as_str).ok_or_else(|| {
        ModelError::MalformedReaction(format!(
            "{} delay is missing required attribute '{}'",
            kind, key
        ))
    })
}

fn warn_unused(kind: &str, fields: &HashMap<String, String>, known: &[&str]) {
    for key in fields.keys() {
        if !known.contains(&key.as_str()) {
            log::warn!("unused attribute '{}' on {} delay", key, kind);
        }
    }
}

fn push_param(params: &mut Vec<String>, value: &str) {
    if let Some(name) = attr_param_name(value) {
        params.push(name.to_string());
    }
}
