//! Evaluation-specific error types.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during rule compilation or evaluation.
///
/// Variants are configuration errors: they are raised while a rule is
/// compiled and keep that rule from ever seeing traffic. The one runtime
/// error is [`EvalError::ExpectedNumeric`] when a macro expands to something
/// that is not a number.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A regex pattern failed to compile.
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// An `@ipMatch` network failed to parse.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(#[from] ipnet::AddrParseError),

    /// The operator name is not known to the engine.
    #[error("unknown operator '@{0}'")]
    UnknownOperator(String),

    /// The operator parameter is unusable.
    #[error("invalid parameter for operator '@{operator}': {reason}")]
    InvalidOperatorParam { operator: String, reason: String },

    /// The action name is not known to the engine.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// A `status` action parameter that is not an HTTP status code.
    #[error("invalid status '{0}': expected a number between 100 and 599")]
    InvalidStatus(String),

    /// Any other action parameter that failed validation.
    #[error("invalid parameter for action '{action}': {reason}")]
    InvalidActionParam { action: String, reason: String },

    /// The rule has no `id` action.
    #[error("rule has no 'id' action")]
    MissingRuleId,

    /// Two rules registered with the same `id`.
    #[error("duplicate rule id '{0}'")]
    DuplicateRuleId(String),

    /// A numeric operator or `setvar` got a value that is not a number.
    #[error("expected numeric value: {0}")]
    ExpectedNumeric(String),

    /// One or more rules failed to compile while loading a rule set.
    #[error("{} rule(s) failed to load: {}", .0.len(), LoadErrors(.0))]
    Configuration(Vec<RuleLoadError>),
}

/// A rule that could not be registered, with its position in the rule set.
#[derive(Debug)]
pub struct RuleLoadError {
    /// Index of the rule in the rule set it was loaded from.
    pub index: usize,
    /// The rule's `id`, when it had one.
    pub rule_id: Option<String>,
    pub error: EvalError,
}

impl fmt::Display for RuleLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule_id {
            Some(id) => write!(f, "rule {id} (#{}): {}", self.index, self.error),
            None => write!(f, "rule #{}: {}", self.index, self.error),
        }
    }
}

struct LoadErrors<'a>(&'a [RuleLoadError]);

impl fmt::Display for LoadErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EvalError>;
