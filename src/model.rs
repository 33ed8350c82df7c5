//! Model assembly: from a declarative document to bound reactions,
//! stoichiometry and initial values.
//!
//! Assembly runs in three phases. Discovery surfaces every species and
//! parameter name and interns it; binding resolves names to dense indices
//! inside every propensity, delay and rule; valuation fills the initial
//! state and parameter vectors. Structural errors surface here so that
//! simulators never see a malformed model.

use std::collections::HashMap;
use std::path::Path;

use crate::delay::Delay;
use crate::document::{parse_reaction_text, ModelDocument};
use crate::error::{ModelError, Result};
use crate::expression::{self, Term};
use crate::propensity::Propensity;
use crate::rule::Rule;
use crate::symbols::SymbolTable;

/// Net change of one species when a reaction fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeciesDelta {
    pub species: usize,
    pub delta: i32,
}

/// A bound reaction: how fast it fires, how long its delayed products
/// wait, and what it changes now versus after the delay expires.
#[derive(Clone, Debug)]
pub struct Reaction {
    pub propensity: Propensity,
    pub delay: Delay,
    pub updates: Vec<SpeciesDelta>,
    pub delayed_updates: Vec<SpeciesDelta>,
}

/// A fully assembled reaction network model.
///
/// The model structure is immutable during simulation; evaluation calls
/// are read-only on the model and touch only the externally owned
/// state/parameter vectors handed in by the simulator.
#[derive(Clone, Debug, Default)]
pub struct Model {
    symbols: SymbolTable,
    species_values: Vec<f64>,
    param_values: Vec<f64>,
    reactions: Vec<Reaction>,
    rules: Vec<Rule>,
}

impl Model {
    pub fn from_xml_file(path: impl AsRef<Path>) -> Result<Model> {
        Self::from_document(&ModelDocument::from_xml_file(path)?)
    }

    pub fn from_xml_str(text: &str) -> Result<Model> {
        Self::from_document(&ModelDocument::from_xml_str(text)?)
    }

    pub fn from_sbml_file(path: impl AsRef<Path>) -> Result<Model> {
        Self::from_document(&crate::sbml::load_sbml_file(path)?)
    }

    pub fn from_sbml_str(text: &str) -> Result<Model> {
        Self::from_document(&crate::sbml::load_sbml_str(text)?)
    }

    pub fn from_document(document: &ModelDocument) -> Result<Model> {
        let mut table = SymbolTable::new();

        // Discovery: intern every name the document can reach, in
        // document order, before anything is bound.
        let mut reaction_sides = Vec::with_capacity(document.reactions.len());
        for entry in &document.reactions {
            let immediate = parse_reaction_text(&entry.text)?;
            let delayed = entry
                .after
                .as_deref()
                .map(parse_reaction_text)
                .transpose()?;
            for name in immediate.0.iter().chain(immediate.1.iter()) {
                table.intern_species(name);
            }
            if let Some((reactants, products)) = &delayed {
                for name in reactants.iter().chain(products.iter()) {
                    table.intern_species(name);
                }
            }
            let (species, params) =
                Propensity::species_and_parameters(&entry.propensity_type, &entry.propensity_fields)?;
            intern_names(&mut table, &species, &params);
            let (species, params) =
                Delay::species_and_parameters(&entry.delay_type, &entry.delay_fields)?;
            intern_names(&mut table, &species, &params);
            reaction_sides.push((immediate, delayed));
        }
        for entry in &document.rules {
            let (species, params) =
                Rule::species_and_parameters(&entry.rule_type, &entry.frequency, &entry.equation)?;
            intern_names(&mut table, &species, &params);
        }

        // Binding: resolve names to indices everywhere.
        let mut reactions = Vec::with_capacity(document.reactions.len());
        for (entry, (immediate, delayed)) in document.reactions.iter().zip(&reaction_sides) {
            let propensity =
                Propensity::from_fields(&entry.propensity_type, &entry.propensity_fields, &mut table)?;
            let delay = Delay::from_fields(&entry.delay_type, &entry.delay_fields, &mut table)?;
            let updates = bind_stoichiometry(&mut table, immediate);
            let delayed_updates = delayed
                .as_ref()
                .map(|sides| bind_stoichiometry(&mut table, sides))
                .unwrap_or_default();
            reactions.push(Reaction {
                propensity,
                delay,
                updates,
                delayed_updates,
            });
        }
        let mut rules = Vec::with_capacity(document.rules.len());
        for entry in &document.rules {
            rules.push(Rule::from_equation(
                &entry.rule_type,
                &entry.frequency,
                &entry.equation,
                &mut table,
            )?);
        }

        // Valuation: fill the dense vectors, then check coverage.
        let referenced_species = table.n_species();
        let mut species_valued = vec![false; referenced_species];
        let mut species_values_by_index: HashMap<usize, f64> = HashMap::new();
        for (name, value) in &document.species {
            let idx = match table.species_index(name) {
                Some(idx) => idx,
                None => {
                    log::warn!("species '{}' is valued but never referenced", name);
                    table.intern_species(name)
                }
            };
            if idx < referenced_species {
                species_valued[idx] = true;
            }
            species_values_by_index.insert(idx, *value);
        }
        let mut species_values = vec![0.0; table.n_species()];
        for (idx, value) in species_values_by_index {
            species_values[idx] = value;
        }
        for (idx, valued) in species_valued.iter().enumerate() {
            if !valued {
                log::warn!(
                    "species '{}' has no declared value, defaulting to 0",
                    table.species_names()[idx]
                );
            }
        }

        let mut declared_params: HashMap<&str, f64> = HashMap::new();
        for (name, value) in &document.parameters {
            if table.param_index(name).is_none() {
                log::warn!("parameter '{}' is valued but never referenced", name);
                continue;
            }
            declared_params.insert(name, *value);
        }
        let mut param_values = vec![0.0; table.n_params()];
        let mut filled = vec![false; table.n_params()];
        for &(idx, value) in table.literal_values() {
            param_values[idx] = value;
            filled[idx] = true;
        }
        let mut missing = Vec::new();
        for (idx, name) in table.param_names().iter().enumerate() {
            if filled[idx] {
                continue;
            }
            match declared_params.get(name.as_str()) {
                Some(&value) => param_values[idx] = value,
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(ModelError::UnspecifiedParameter(missing.join(", ")));
        }

        Ok(Model {
            symbols: table,
            species_values,
            param_values,
            reactions,
            rules,
        })
    }

    pub fn n_species(&self) -> usize {
        self.symbols.n_species()
    }

    pub fn n_params(&self) -> usize {
        self.symbols.n_params()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Species names in index order.
    pub fn species_list(&self) -> &[String] {
        self.symbols.species_names()
    }

    /// Parameter names in index order.
    pub fn param_list(&self) -> &[String] {
        self.symbols.param_names()
    }

    /// Initial state vector, indexed by the symbol table.
    pub fn species_values(&self) -> &[f64] {
        &self.species_values
    }

    /// Parameter vector, indexed by the symbol table.
    pub fn param_values(&self) -> &[f64] {
        &self.param_values
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.symbols.species_index(name)
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.symbols.param_index(name)
    }

    pub fn species_value(&self, name: &str) -> Result<f64> {
        self.symbols
            .species_index(name)
            .map(|idx| self.species_values[idx])
            .ok_or_else(|| ModelError::Lookup(name.to_string()))
    }

    pub fn param_value(&self, name: &str) -> Result<f64> {
        self.symbols
            .param_index(name)
            .map(|idx| self.param_values[idx])
            .ok_or_else(|| ModelError::Lookup(name.to_string()))
    }

    /// Overwrite initial species values by name.
    pub fn set_species(&mut self, values: &HashMap<String, f64>) -> Result<()> {
        for (name, value) in values {
            let idx = self
                .symbols
                .species_index(name)
                .ok_or_else(|| ModelError::Lookup(name.clone()))?;
            self.species_values[idx] = *value;
        }
        Ok(())
    }

    /// Overwrite parameter values by name.
    pub fn set_params(&mut self, values: &HashMap<String, f64>) -> Result<()> {
        for (name, value) in values {
            let idx = self
                .symbols
                .param_index(name)
                .ok_or_else(|| ModelError::Lookup(name.clone()))?;
            self.param_values[idx] = *value;
        }
        Ok(())
    }

    /// Dense immediate stoichiometry, `[species][reaction]`.
    pub fn update_array(&self) -> Vec<Vec<i32>> {
        self.dense_stoichiometry(false)
    }

    /// Dense delayed stoichiometry, `[species][reaction]`.
    pub fn delay_update_array(&self) -> Vec<Vec<i32>> {
        self.dense_stoichiometry(true)
    }

    fn dense_stoichiometry(&self, delayed: bool) -> Vec<Vec<i32>> {
        let mut matrix = vec![vec![0i32; self.reactions.len()]; self.symbols.n_species()];
        for (r, reaction) in self.reactions.iter().enumerate() {
            let column = if delayed {
                &reaction.delayed_updates
            } else {
                &reaction.updates
            };
            for delta in column {
                matrix[delta.species][r] = delta.delta;
            }
        }
        matrix
    }

    /// Parse a rate string against this model's symbol table. Unknown
    /// names are a [`ModelError::Lookup`] error.
    pub fn parse_general_expression(&self, rate: &str) -> Result<Term> {
        expression::parse_expression(rate, &self.symbols)
    }

    /// Apply every repeated rule in declaration order with unit volume.
    pub fn apply_repeated_rules(&self, state: &mut [f64], params: &mut [f64], time: f64) {
        for rule in &self.rules {
            rule.apply(state, params, time);
        }
    }

    /// Apply every repeated rule in declaration order with an explicit
    /// cell volume.
    pub fn apply_repeated_volume_rules(
        &self,
        state: &mut [f64],
        params: &mut [f64],
        volume: f64,
        time: f64,
    ) {
        for rule in &self.rules {
            rule.volume_apply(state, params, volume, time);
        }
    }
}

fn intern_names(table: &mut SymbolTable, species: &[String], params: &[String]) {
    for name in species {
        table.intern_species(name);
    }
    for name in params {
        table.intern_parameter(name);
    }
}

fn bind_stoichiometry(
    table: &mut SymbolTable,
    (reactants, products): &(Vec<String>, Vec<String>),
) -> Vec<SpeciesDelta> {
    let mut net: HashMap<usize, i32> = HashMap::new();
    for name in reactants {
        *net.entry(table.intern_species(name)).or_insert(0) -= 1;
    }
    for name in products {
        *net.entry(table.intern_species(name)).or_insert(0) += 1;
    }
    let mut deltas: Vec<SpeciesDelta> = net
        .into_iter()
        .filter(|&(_, delta)| delta != 0)
        .map(|(species, delta)| SpeciesDelta { species, delta })
        .collect();
    deltas.sort_by_key(|d| d.species);
    deltas
}
