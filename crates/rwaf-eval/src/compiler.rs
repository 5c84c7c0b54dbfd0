//! Compile parsed rule definitions into runnable [`Rule`]s.
//!
//! Compilation is where every configuration error surfaces: unknown
//! operators and actions, bad regexes, unparsable `status` codes, missing
//! `id`. A rule that fails here is never registered with the engine.

use rwaf_parser::{ActionSpec, Phase, RuleDef, VariableExpr, VariableKind};

use crate::action::Action;
use crate::collection::{Collection, Variable};
use crate::error::{EvalError, Result};
use crate::operator::Operator;
use crate::transformation::{TransformStep, Transformation};

// =============================================================================
// Compiled rule
// =============================================================================

/// A compiled rule, ready for evaluation. Immutable once built.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub phase: Phase,
    /// Target expressions, exclusions included. Empty for unconditional
    /// rules.
    pub variables: Vec<VariableExpr>,
    pub operator: Operator,
    /// Transformation chain applied to each candidate value.
    pub transformations: Vec<Transformation>,
    /// Runtime actions, in declaration order.
    pub actions: Vec<Action>,
    pub description: Option<String>,
}

impl Rule {
    /// Rules without targets run their actions on every transaction.
    pub fn is_unconditional(&self) -> bool {
        self.variables.is_empty()
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a parsed rule definition.
///
/// `id`, `phase` and `t` configure the rule itself; every other action is
/// validated and kept, in order, for match time.
pub fn compile_rule(def: &RuleDef) -> Result<Rule> {
    let mut id = None;
    let mut phase = Phase::default();
    let mut transformations = Vec::new();
    let mut actions = Vec::new();

    for spec in &def.actions {
        match spec.name.to_ascii_lowercase().as_str() {
            "id" => id = Some(rule_id(spec)?),
            "phase" => phase = rule_phase(spec)?,
            "t" => {
                let name = spec.param.as_deref().unwrap_or_default();
                match TransformStep::from_name(name)? {
                    TransformStep::None => transformations.clear(),
                    TransformStep::Apply(t) => transformations.push(t),
                }
            }
            _ => actions.push(Action::new(spec)?),
        }
    }

    let id = id.ok_or(EvalError::MissingRuleId)?;
    let operator = match &def.operator {
        Some(spec) => Operator::from_spec(spec)?,
        None => Operator::unconditional(),
    };

    Ok(Rule {
        id,
        phase,
        variables: def.variables.clone(),
        operator,
        transformations,
        actions,
        description: def.description.clone(),
    })
}

fn rule_id(spec: &ActionSpec) -> Result<String> {
    match spec.param.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(EvalError::InvalidActionParam {
            action: "id".into(),
            reason: "empty rule id".into(),
        }),
    }
}

fn rule_phase(spec: &ActionSpec) -> Result<Phase> {
    let param = spec.param.as_deref().unwrap_or_default();
    Phase::from_str(param).ok_or_else(|| EvalError::InvalidActionParam {
        action: "phase".into(),
        reason: format!("unknown phase '{param}'"),
    })
}

// =============================================================================
// Candidate resolution
// =============================================================================

/// Resolve one expression through the store tier its shape selects.
pub fn resolve_expression(vars: &dyn Collection, expr: &VariableExpr) -> Vec<Variable> {
    let key = expr.key();
    let resolved = match expr.kind() {
        VariableKind::Collection => vars.resolve_multi_matches(&key),
        VariableKind::Single => vars.resolve_single_match(&key),
        VariableKind::Regex => vars.resolve_regular_expression(&key),
    };
    if expr.count {
        return vec![Variable::new(format!("&{key}"), resolved.len().to_string())];
    }
    resolved
}

/// The candidate values a rule's operator is run against: every target
/// expression in order, minus the entries an exclusion names.
pub fn resolve_candidates(vars: &dyn Collection, rule: &Rule) -> Vec<Variable> {
    let excluded: Vec<String> = rule
        .variables
        .iter()
        .filter(|e| e.exclude)
        .flat_map(|e| resolve_expression(vars, &VariableExpr { exclude: false, ..e.clone() }))
        .map(|v| v.key)
        .collect();

    rule.variables
        .iter()
        .filter(|e| !e.exclude)
        .flat_map(|e| resolve_expression(vars, e))
        .filter(|v| !excluded.contains(&v.key))
        .collect()
}
