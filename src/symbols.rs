//! Name interning for species and parameters.
//!
//! Every late-bound name in a model is resolved exactly once, at assembly
//! time, into a dense index. Evaluation never touches strings.

use std::collections::HashMap;

/// Two injective mappings, species name -> index and parameter name -> index.
///
/// Indices are assigned monotonically on first sight and never change for
/// the lifetime of the model.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    species: HashMap<String, usize>,
    species_names: Vec<String>,
    params: HashMap<String, usize>,
    param_names: Vec<String>,
    literal_values: Vec<(usize, f64)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, assigning the next free species slot on first sight.
    pub fn intern_species(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.species.get(name) {
            return idx;
        }
        let idx = self.species_names.len();
        self.species.insert(name.to_string(), idx);
        self.species_names.push(name.to_string());
        idx
    }

    /// Index of `name`, assigning the next free parameter slot on first sight.
    pub fn intern_parameter(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.params.get(name) {
            return idx;
        }
        let idx = self.param_names.len();
        self.params.insert(name.to_string(), idx);
        self.param_names.push(name.to_string());
        idx
    }

    /// Allocate a synthetic parameter slot for a numeric literal that
    /// appeared where a parameter name was expected. The value is recorded
    /// so the valuation phase can fill the slot.
    ///
    /// Synthetic names keep a leading underscore, which user-visible
    /// parameter names can never carry (the parser strips the marker).
    pub fn intern_literal(&mut self, value: f64) -> usize {
        let name = format!("_lit{}", self.literal_values.len());
        let idx = self.intern_parameter(&name);
        self.literal_values.push((idx, value));
        idx
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.get(name).copied()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.get(name).copied()
    }

    pub fn species_names(&self) -> &[String] {
        &self.species_names
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn n_species(&self) -> usize {
        self.species_names.len()
    }

    pub fn n_params(&self) -> usize {
        self.param_names.len()
    }

    pub(crate) fn literal_values(&self) -> &[(usize, f64)] {
        &self.literal_values
    }

    /// Bind a rate-like attribute value: either the name of a parameter or
    /// a numeric literal that becomes a synthetic parameter slot.
    pub(crate) fn bind_param_attr(&mut self, value: &str) -> usize {
        match value.trim().parse::<f64>() {
            Ok(v) => self.intern_literal(v),
            Err(_) => self.intern_parameter(value.trim()),
        }
    }
}

/// The parameter name carried by a rate-like attribute value, or `None`
/// when the value is a numeric literal.
pub(crate) fn attr_param_name(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.parse::<f64>().is_ok() {
        None
    } else {
        Some(trimmed)
    }
}
