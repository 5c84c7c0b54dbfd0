//! Rule evaluation engine.
//!
//! The [`Engine`] holds compiled rules in load order and drives the
//! resolve → evaluate → act cycle for each transaction, one phase at a time.
//! A rule that fails at runtime is reported and skipped; it never aborts the
//! rest of the transaction.

use rwaf_parser::{Phase, RuleDef, RuleSet};

use crate::collection::{Collection, Variable};
use crate::compiler::{Rule, compile_rule, resolve_candidates};
use crate::error::{EvalError, Result, RuleLoadError};
use crate::intervention::Intervention;
use crate::message::RuleMessage;
use crate::result::{
    PhaseResult, ProcessResult, RuleError, RuleEvaluation, RuleOutcome, RuleResult,
};
use crate::transaction::Transaction;
use crate::transformation::apply_all;

/// Store key updated with the value of every match.
pub const MATCHED_VAR: &str = "MATCHED_VAR";
/// Store key updated with the key of every match.
pub const MATCHED_VAR_NAME: &str = "MATCHED_VAR_NAME";

// =============================================================================
// Configuration
// =============================================================================

/// Whether and how interventions are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Evaluate rules and record interventions.
    On,
    /// Evaluate rules and log, but never record an intervention.
    DetectionOnly,
    /// Evaluate nothing.
    Off,
}

/// How many candidates of one rule may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePolicy {
    /// Stop at the first matching candidate.
    FirstMatch,
    /// Run the rule's actions once per matching candidate.
    AllMatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: EngineMode,
    pub candidate_policy: CandidatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: EngineMode::On,
            candidate_policy: CandidatePolicy::FirstMatch,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The rule evaluation engine.
///
/// # Example
///
/// ```rust
/// use rwaf_eval::{Engine, Transaction};
/// use rwaf_parser::parse_rules_yaml;
/// use serde_json::json;
///
/// let yaml = r#"
/// variables: ARGS
/// operator: "@detectXSS"
/// actions: "id:941100,phase:2,deny,status:403,msg:'XSS Attack'"
/// "#;
///
/// let set = parse_rules_yaml(yaml).unwrap();
/// let mut engine = Engine::new();
/// engine.add_collection(&set).unwrap();
///
/// let mut tx = Transaction::from_value("tx-1", &json!({"args": {"q": "<script>"}}));
/// let result = engine.process(&mut tx);
/// assert_eq!(result.messages.len(), 1);
/// assert_eq!(result.intervention.unwrap().status, 403);
/// ```
pub struct Engine {
    rules: Vec<Rule>,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            rules: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Compile and register a single rule definition.
    pub fn add_rule(&mut self, def: &RuleDef) -> Result<()> {
        let rule = compile_rule(def)?;
        self.add_compiled_rule(rule)
    }

    /// Register a compiled rule. Rule ids must be unique.
    pub fn add_compiled_rule(&mut self, rule: Rule) -> Result<()> {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(EvalError::DuplicateRuleId(rule.id));
        }
        log::debug!("registered rule {} (phase {})", rule.id, rule.phase.number());
        self.rules.push(rule);
        Ok(())
    }

    /// Compile and register every rule of a parsed rule set.
    ///
    /// Valid rules are registered even when others fail; the failures are
    /// returned together as [`EvalError::Configuration`].
    pub fn add_collection(&mut self, set: &RuleSet) -> Result<()> {
        let mut errors = Vec::new();
        for (index, def) in set.rules.iter().enumerate() {
            if let Err(error) = self.add_rule(def) {
                errors.push(RuleLoadError {
                    index,
                    rule_id: def.action_param("id").map(str::to_string),
                    error,
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EvalError::Configuration(errors))
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the rules of one phase against `tx`, in load order.
    ///
    /// Outside the logging phase, evaluation stops once `allow` fired or, in
    /// [`EngineMode::On`], a disruptive intervention is pending.
    pub fn process_phase(&self, tx: &mut Transaction, phase: Phase) -> PhaseResult {
        let mut result = PhaseResult::new(phase);
        if self.config.mode == EngineMode::Off {
            return result;
        }

        for rule in self.rules.iter().filter(|r| r.phase == phase) {
            if phase != Phase::Logging && self.should_stop(tx) {
                log::debug!(
                    "transaction {}: skipping rest of phase {}",
                    tx.id(),
                    phase.number()
                );
                break;
            }

            let evaluation = match evaluate_rule(rule, tx, self.config.candidate_policy) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    log::warn!("transaction {}: rule {} failed: {e}", tx.id(), rule.id);
                    result.errors.push(RuleError {
                        rule_id: rule.id.clone(),
                        phase,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for message in evaluation.messages {
                if message.save_message {
                    log::info!("transaction {}: {}", tx.id(), message.log_line());
                    result.messages.push(message);
                } else {
                    log::debug!("transaction {}: rule {} matched (nolog)", tx.id(), rule.id);
                }
            }

            if let Some(pending) = evaluation.intervention {
                self.apply_intervention(tx, pending);
            }
            if evaluation.allow {
                log::debug!("transaction {}: allowed by rule {}", tx.id(), rule.id);
                tx.allow();
            }

            result.outcomes.push(RuleResult {
                rule_id: rule.id.clone(),
                outcome: evaluation.outcome,
            });
        }

        result
    }

    /// Run every phase in order. Once processing stops early, only the
    /// logging phase still runs.
    pub fn process(&self, tx: &mut Transaction) -> ProcessResult {
        let mut out = ProcessResult {
            transaction_id: tx.id().to_string(),
            messages: Vec::new(),
            errors: Vec::new(),
            intervention: None,
            allowed: false,
        };

        for phase in Phase::ALL {
            let phase_result = self.process_phase(tx, phase);
            out.messages.extend(phase_result.messages);
            out.errors.extend(phase_result.errors);
        }

        if !tx.intervention().is_empty() {
            out.intervention = Some(tx.intervention().clone());
        }
        out.allowed = tx.is_allowed();
        out
    }

    fn should_stop(&self, tx: &Transaction) -> bool {
        tx.is_allowed() || (self.config.mode == EngineMode::On && tx.is_disrupted())
    }

    fn apply_intervention(&self, tx: &mut Transaction, pending: Intervention) {
        match self.config.mode {
            EngineMode::On => {
                let kind = pending.kind;
                let rule_id = pending.rule_id.clone().unwrap_or_default();
                if tx.merge_intervention(pending) {
                    log::info!(
                        "transaction {}: intervention {kind:?} (status {}) from rule {rule_id}",
                        tx.id(),
                        tx.intervention().status
                    );
                }
            }
            EngineMode::DetectionOnly => {
                log::info!(
                    "transaction {}: detection only, not enforcing {:?} from rule {}",
                    tx.id(),
                    pending.kind,
                    pending.rule_id.as_deref().unwrap_or_default()
                );
            }
            EngineMode::Off => {}
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Rule evaluation
// =============================================================================

/// Evaluate one rule against `tx`.
///
/// Resolves the candidates, applies the transformation chain and the
/// operator to each, and on a match runs the actions in declaration order
/// into a fresh [`RuleMessage`] and a per-rule pending [`Intervention`].
/// Operator and action failures abort the rule with an error: its
/// intervention and `allow` are dropped, while `setvar` writes and
/// `MATCHED_VAR` made before the failure stay in the store.
pub fn evaluate_rule(
    rule: &Rule,
    tx: &mut Transaction,
    policy: CandidatePolicy,
) -> Result<RuleEvaluation> {
    let matched = if rule.is_unconditional() {
        vec![Variable::new("", "")]
    } else {
        let mut matched = Vec::new();
        for candidate in resolve_candidates(tx.vars(), rule) {
            let value = apply_all(&rule.transformations, &candidate.value);
            if rule.operator.evaluate(tx, &value)? {
                matched.push(Variable::new(candidate.key, value.into_owned()));
                if policy == CandidatePolicy::FirstMatch {
                    break;
                }
            }
        }
        matched
    };

    if matched.is_empty() {
        return Ok(RuleEvaluation::no_match());
    }
    log::debug!("transaction {}: rule {} matched", tx.id(), rule.id);

    let mut messages = Vec::with_capacity(matched.len());
    let mut pending = Intervention::new();
    let mut filled = false;
    let mut allow = false;

    for var in matched {
        let mut message = RuleMessage::new(&rule.id, rule.phase);
        if rule.is_unconditional() {
            message.match_message = rule.operator.match_message().to_string();
        } else {
            let vars = tx.vars_mut();
            vars.store_or_update_first(MATCHED_VAR, &var.value);
            vars.store_or_update_first(MATCHED_VAR_NAME, &var.key);
            message.match_message = rule.operator.resolve_match_message(&var);
            message.matched_var = Some(var);
        }

        for action in &rule.actions {
            if !action.evaluate(tx, &mut message)? {
                log::debug!("rule {}: action {} reported failure", rule.id, action.name());
            }
            allow |= action.grants_allow();
            if action.is_disruptive() {
                filled |= action.fill_intervention(tx, &mut pending);
            }
        }
        messages.push(message);
    }

    let intervention = if filled {
        pending.finalize();
        if pending.is_empty() {
            None
        } else {
            pending.rule_id = Some(rule.id.clone());
            pending.log = messages
                .iter()
                .rev()
                .find(|m| m.save_message)
                .map(RuleMessage::log_line);
            Some(pending)
        }
    } else {
        None
    };

    let outcome = if messages.iter().any(|m| m.save_message) {
        RuleOutcome::Logged
    } else {
        RuleOutcome::Suppressed
    };

    Ok(RuleEvaluation {
        outcome,
        messages,
        intervention,
        allow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervention::InterventionKind;
    use rwaf_parser::parse_rules_yaml;

    fn engine(yaml: &str) -> Engine {
        engine_with(yaml, EngineConfig::default())
    }

    fn engine_with(yaml: &str, config: EngineConfig) -> Engine {
        let set = parse_rules_yaml(yaml).unwrap();
        assert!(set.errors.is_empty(), "{:?}", set.errors);
        let mut engine = Engine::with_config(config);
        engine.add_collection(&set).unwrap();
        engine
    }

    fn tx_with(pairs: &[(&str, &str)]) -> Transaction {
        let mut tx = Transaction::new("t-1");
        for (k, v) in pairs {
            tx.add_variable(k, v);
        }
        tx
    }

    const XSS_RULE: &str = r#"
variables: ARGS
operator: "@rx <script"
actions: "id:1,phase:2,deny,status:403,msg:'XSS'"
"#;

    #[test]
    fn test_match_logs_and_denies() {
        let e = engine(XSS_RULE);
        let mut tx = tx_with(&[("ARGS:q", "<script>alert(1)</script>")]);
        let r = e.process_phase(&mut tx, Phase::RequestBody);
        assert_eq!(r.messages.len(), 1);
        assert_eq!(r.messages[0].message.as_deref(), Some("XSS"));
        assert_eq!(r.outcomes[0].outcome, RuleOutcome::Logged);
        assert_eq!(tx.intervention().kind, InterventionKind::Deny);
        assert_eq!(tx.intervention().status, 403);
        assert_eq!(tx.intervention().rule_id.as_deref(), Some("1"));
        assert_eq!(tx.vars().resolve_first(MATCHED_VAR_NAME), Some("ARGS:q"));
    }

    #[test]
    fn test_no_match() {
        let e = engine(XSS_RULE);
        let mut tx = tx_with(&[("ARGS:q", "hello")]);
        let r = e.process_phase(&mut tx, Phase::RequestBody);
        assert!(r.messages.is_empty());
        assert_eq!(r.outcomes[0].outcome, RuleOutcome::NoMatch);
        assert!(tx.intervention().is_empty());
    }

    #[test]
    fn test_other_phase_rules_do_not_run() {
        let e = engine(XSS_RULE);
        let mut tx = tx_with(&[("ARGS:q", "<script>")]);
        let r = e.process_phase(&mut tx, Phase::RequestHeaders);
        assert!(r.outcomes.is_empty());
    }

    #[test]
    fn test_nolog_suppresses_but_keeps_intervention() {
        let e = engine(
            r#"
variables: ARGS
operator: "@rx <script"
actions: "id:2,deny,nolog"
"#,
        );
        let mut tx = tx_with(&[("ARGS:q", "<script>")]);
        let r = e.process_phase(&mut tx, Phase::RequestBody);
        assert!(r.messages.is_empty());
        assert_eq!(r.outcomes[0].outcome, RuleOutcome::Suppressed);
        assert!(tx.is_disrupted());
    }

    #[test]
    fn test_first_match_vs_all_matches() {
        let yaml = r#"
variables: ARGS
operator: "@contains bad"
actions: "id:3,setvar:tx.hits=+1"
"#;
        let pairs = [("ARGS:a", "bad1"), ("ARGS:b", "bad2"), ("ARGS:c", "ok")];

        let mut tx = tx_with(&pairs);
        let r = engine(yaml).process_phase(&mut tx, Phase::RequestBody);
        assert_eq!(r.messages.len(), 1);
        assert_eq!(tx.vars().resolve_first("TX:hits"), Some("1"));

        let config = EngineConfig {
            candidate_policy: CandidatePolicy::AllMatches,
            ..EngineConfig::default()
        };
        let mut tx = tx_with(&pairs);
        let r = engine_with(yaml, config).process_phase(&mut tx, Phase::RequestBody);
        assert_eq!(r.messages.len(), 2);
        assert_eq!(tx.vars().resolve_first("TX:hits"), Some("2"));
    }

    #[test]
    fn test_runtime_error_is_isolated() {
        let e = engine(
            r#"
variables: ARGS:n
operator: "@gt %{tx.limit}"
actions: id:10
---
variables: ARGS:n
operator: "@rx ."
actions: "id:11,status:404"
"#,
        );
        let mut tx = tx_with(&[("ARGS:n", "5"), ("TX:limit", "many")]);
        let r = e.process_phase(&mut tx, Phase::RequestBody);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].rule_id, "10");
        assert_eq!(r.outcomes.len(), 1);
        assert_eq!(tx.intervention().status, 404);
    }

    #[test]
    fn test_deny_not_overridden_by_later_status_rule() {
        let yaml = r#"
variables: ARGS
operator: "@rx a"
actions: "id:20,phase:1,deny,status:406"
---
actions: "id:21,phase:5,status:404"
"#;
        let mut tx = tx_with(&[("ARGS:x", "a")]);
        let r = engine(yaml).process(&mut tx);
        let it = r.intervention.unwrap();
        assert_eq!(it.kind, InterventionKind::Deny);
        assert_eq!(it.status, 406);
    }

    #[test]
    fn test_disruption_skips_to_logging_phase() {
        let yaml = r#"
variables: ARGS
operator: "@rx a"
actions: "id:30,phase:1,deny"
---
actions: "id:31,phase:2,setvar:tx.phase2=1"
---
actions: "id:32,phase:5,setvar:tx.logged=1"
"#;
        let mut tx = tx_with(&[("ARGS:x", "a")]);
        engine(yaml).process(&mut tx);
        assert_eq!(tx.vars().resolve_first("TX:phase2"), None);
        assert_eq!(tx.vars().resolve_first("TX:logged"), Some("1"));
    }

    #[test]
    fn test_allow_stops_request_phases() {
        let yaml = r#"
variables: REMOTE_ADDR
operator: "@ipMatch 10.0.0.0/8"
actions: "id:40,phase:1,allow,nolog"
---
variables: ARGS
operator: "@rx a"
actions: "id:41,phase:2,deny"
"#;
        let mut tx = tx_with(&[("REMOTE_ADDR", "10.1.2.3"), ("ARGS:x", "a")]);
        let r = engine(yaml).process(&mut tx);
        assert!(r.allowed);
        assert!(r.intervention.is_none());
        assert!(r.messages.is_empty());
    }

    #[test]
    fn test_failing_rule_does_not_grant_allow() {
        let yaml = r#"
actions: "id:42,phase:1,allow,setvar:tx.n=+%{tx.word}"
---
variables: ARGS
operator: "@rx a"
actions: "id:43,phase:2,deny"
"#;
        let mut tx = tx_with(&[("TX:word", "abc"), ("ARGS:x", "a")]);
        let r = engine(yaml).process(&mut tx);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].rule_id, "42");
        assert!(!r.allowed);
        assert_eq!(r.intervention.unwrap().kind, InterventionKind::Deny);
    }

    #[test]
    fn test_intervention_log_skips_suppressed_messages() {
        let mut tx = tx_with(&[("ARGS:q", "<script>")]);
        let e = engine(
            r#"
variables: ARGS
operator: "@rx <script"
actions: "id:2,deny,nolog"
"#,
        );
        e.process_phase(&mut tx, Phase::RequestBody);
        assert!(tx.is_disrupted());
        assert_eq!(tx.intervention().log, None);
    }

    #[test]
    fn test_detection_only_never_intervenes() {
        let config = EngineConfig {
            mode: EngineMode::DetectionOnly,
            ..EngineConfig::default()
        };
        let mut tx = tx_with(&[("ARGS:q", "<script>")]);
        let r = engine_with(XSS_RULE, config).process(&mut tx);
        assert_eq!(r.messages.len(), 1);
        assert!(r.intervention.is_none());
    }

    #[test]
    fn test_mode_off_evaluates_nothing() {
        let config = EngineConfig {
            mode: EngineMode::Off,
            ..EngineConfig::default()
        };
        let mut tx = tx_with(&[("ARGS:q", "<script>")]);
        let r = engine_with(XSS_RULE, config).process(&mut tx);
        assert!(r.messages.is_empty());
        assert!(r.intervention.is_none());
    }

    #[test]
    fn test_duplicate_rule_id() {
        let set = parse_rules_yaml("actions: id:1\n---\nactions: id:1\n").unwrap();
        let mut e = Engine::new();
        let err = e.add_collection(&set).unwrap_err();
        match err {
            EvalError::Configuration(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].index, 1);
                assert!(matches!(errors[0].error, EvalError::DuplicateRuleId(_)));
            }
            other => panic!("expected Configuration, got: {other}"),
        }
        assert_eq!(e.rule_count(), 1);
    }
}
