//! Model core for stochastic biochemical reaction network simulation.
//!
//! A model is assembled once from a declarative document (native XML or an
//! SBML subset): rate strings parse into owned expression trees, every
//! species/parameter name is interned into a dense index, and the closed
//! catalogs of propensities, delays, rules and volume models are bound
//! against the symbol table. Downstream simulators then drive the model
//! through pure `evaluate(state, params, [volume,] time)` calls; steady
//! state evaluation allocates nothing and the model structure is never
//! mutated after assembly, so disjoint state vectors may be evaluated in
//! parallel against one shared model.

pub mod delay;
pub mod document;
pub mod error;
pub mod expression;
pub mod lineage;
pub mod model;
pub mod propensity;
pub mod rule;
pub mod sbml;
pub mod symbols;
pub mod volume;

#[cfg(feature = "python")]
mod python;

pub use delay::Delay;
pub use document::{ModelDocument, ReactionEntry, RuleEntry};
pub use error::{ModelError, Result};
pub use expression::{analyze, parse_expression, Term};
pub use lineage::{Lineage, Schnitz};
pub use model::{Model, Reaction, SpeciesDelta};
pub use propensity::Propensity;
pub use rule::{Rule, RuleTarget};
pub use symbols::SymbolTable;
pub use volume::CellVolume;

#[cfg(test)]
mod tests;
