use thiserror::Error;

/// Errors raised while assembling or querying a model.
///
/// Structural problems are reported at assembly time so that simulators
/// never see a malformed model. Arithmetic NaN/Inf during evaluation is
/// not intercepted at this layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unparseable rate expression '{expression}': {reason}")]
    UnparseableRate { expression: String, reason: String },
    #[error("malformed reaction: {0}")]
    MalformedReaction(String),
    #[error("invalid stoichiometry: {0}")]
    InvalidStoichiometry(String),
    #[error("unknown propensity type '{0}'")]
    UnknownPropensityType(String),
    #[error("unknown delay type '{0}'")]
    UnknownDelayType(String),
    #[error("unknown rule type '{0}'")]
    UnknownRuleType(String),
    #[error("unsupported rule frequency '{0}' (only 'repeated' rules are evaluated)")]
    UnsupportedRuleFrequency(String),
    #[error("parameters referenced but never given a value: {0}")]
    UnspecifiedParameter(String),
    #[error("sampled division volume {sampled} does not exceed the initial volume {initial}")]
    ImpossibleDivision { sampled: f64, initial: f64 },
    #[error("unknown name '{0}'")]
    Lookup(String),
    #[error("malformed model document: {0}")]
    Xml(String),
}

impl ModelError {
    pub(crate) fn unparseable(expression: &str, reason: impl ToString) -> Self {
        Self::UnparseableRate {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
