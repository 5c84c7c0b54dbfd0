//! Result types for rule and transaction evaluation.

use rwaf_parser::Phase;
use serde::Serialize;

use crate::intervention::Intervention;
use crate::message::RuleMessage;

/// Terminal state of one rule for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    NoMatch,
    /// Matched, and at least one message was kept for the log.
    Logged,
    /// Matched, but every message was suppressed (`nolog`).
    Suppressed,
}

/// What evaluating a single rule produced.
#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub outcome: RuleOutcome,
    /// Every message built, saved or not.
    pub messages: Vec<RuleMessage>,
    /// The rule's finalized intervention, if any action asked for one.
    pub intervention: Option<Intervention>,
    /// An `allow` action ran. Applied to the transaction by the engine.
    pub allow: bool,
}

impl RuleEvaluation {
    pub fn no_match() -> Self {
        RuleEvaluation {
            outcome: RuleOutcome::NoMatch,
            messages: Vec::new(),
            intervention: None,
            allow: false,
        }
    }
}

/// A rule that failed while evaluating a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleError {
    pub rule_id: String,
    pub phase: Phase,
    pub error: String,
}

/// Per-rule outcome entry of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub outcome: RuleOutcome,
}

/// Result of running one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    /// Messages that reached the log, in rule order.
    pub messages: Vec<RuleMessage>,
    /// Outcome of every rule that ran without error.
    pub outcomes: Vec<RuleResult>,
    pub errors: Vec<RuleError>,
}

impl PhaseResult {
    pub fn new(phase: Phase) -> Self {
        PhaseResult {
            phase,
            messages: Vec::new(),
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Result of running a whole transaction through every phase.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub transaction_id: String,
    pub messages: Vec<RuleMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RuleError>,
    /// The transaction's final intervention; absent when nothing was
    /// requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<Intervention>,
    pub allowed: bool,
}
