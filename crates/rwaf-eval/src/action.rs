//! Actions run when a rule matches.
//!
//! An [`Action`] is validated when its rule is compiled (`init`), so a bad
//! parameter such as `status:abc` is a configuration error and never reaches
//! traffic. At match time the engine calls [`Action::evaluate`] for every
//! action in declaration order, and [`Action::fill_intervention`] for the
//! disruptive ones.
//!
//! Configuration actions (`id`, `phase`, `t`) are consumed by the compiler and
//! never become an [`Action`].

use rwaf_parser::{ActionSpec, Severity};

use crate::collection::Collection;
use crate::error::{EvalError, Result};
use crate::intervention::Intervention;
use crate::macros::{expand, macro_key};
use crate::message::RuleMessage;
use crate::transaction::Transaction;

/// A `setvar` operation on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetVarOp {
    /// `tx.name=value`, or `tx.name` alone (sets `1`).
    Set(String),
    /// `tx.name=+n`
    Add(String),
    /// `tx.name=-n`
    Sub(String),
    /// `!tx.name`
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVar {
    /// Store key, e.g. `TX:anomaly_score`.
    pub key: String,
    pub op: SetVarOp,
}

impl SetVar {
    pub fn parse(param: &str) -> Result<Self> {
        let param = param.trim();
        let (name, op) = if let Some(name) = param.strip_prefix('!') {
            (name, SetVarOp::Delete)
        } else {
            match param.split_once('=') {
                Some((name, value)) => {
                    let op = if let Some(n) = value.strip_prefix('+') {
                        SetVarOp::Add(n.to_string())
                    } else if let Some(n) = value.strip_prefix('-') {
                        SetVarOp::Sub(n.to_string())
                    } else {
                        SetVarOp::Set(value.to_string())
                    };
                    (name, op)
                }
                None => (param, SetVarOp::Set("1".into())),
            }
        };

        let name = name.trim();
        match name.split_once('.') {
            Some((collection, key)) if !collection.is_empty() && !key.is_empty() => {}
            _ => {
                return Err(EvalError::InvalidActionParam {
                    action: "setvar".into(),
                    reason: format!("expected COLLECTION.name, got '{name}'"),
                });
            }
        }

        Ok(SetVar {
            key: macro_key(name),
            op,
        })
    }

    fn apply(&self, tx: &mut Transaction) -> Result<()> {
        match &self.op {
            SetVarOp::Delete => tx.vars_mut().del(&self.key),
            SetVarOp::Set(value) => {
                let value = expand(value, tx.vars()).into_owned();
                tx.vars_mut().store_or_update_first(&self.key, &value);
            }
            SetVarOp::Add(delta) | SetVarOp::Sub(delta) => {
                let delta = expand(delta, tx.vars()).into_owned();
                let delta: i64 = delta.trim().parse().map_err(|_| {
                    EvalError::ExpectedNumeric(format!("setvar {} by '{delta}'", self.key))
                })?;
                let current = match tx.vars().resolve_first(&self.key) {
                    None => 0,
                    Some(v) => v.trim().parse::<i64>().map_err(|_| {
                        EvalError::ExpectedNumeric(format!("{} holds '{v}'", self.key))
                    })?,
                };
                let next = if matches!(self.op, SetVarOp::Add(_)) {
                    current.saturating_add(delta)
                } else {
                    current.saturating_sub(delta)
                };
                tx.vars_mut()
                    .store_or_update_first(&self.key, &next.to_string());
            }
        }
        Ok(())
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Msg(String),
    LogData(String),
    Severity(Severity),
    Tag(String),
    /// Re-enable logging after an earlier `nolog`.
    Log,
    /// Suppress logging of this match.
    NoLog,
    SetVar(SetVar),
    /// Stop evaluating further rules for the transaction.
    Allow,
    Status(u16),
    Deny,
    Drop,
    Redirect(String),
    Pass,
    /// Delay in milliseconds.
    Pause(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    kind: ActionKind,
}

impl Action {
    /// Validate and build a runtime action (`init`).
    pub fn new(spec: &ActionSpec) -> Result<Self> {
        let param = spec.param.as_deref();
        let kind = match spec.name.to_ascii_lowercase().as_str() {
            "msg" => ActionKind::Msg(required(spec)?.to_string()),
            "logdata" => ActionKind::LogData(required(spec)?.to_string()),
            "severity" => {
                let p = required(spec)?;
                ActionKind::Severity(Severity::from_str(p).ok_or_else(|| {
                    EvalError::InvalidActionParam {
                        action: spec.name.clone(),
                        reason: format!("unknown severity '{p}'"),
                    }
                })?)
            }
            "tag" => ActionKind::Tag(required(spec)?.to_string()),
            "log" => ActionKind::Log,
            "nolog" => ActionKind::NoLog,
            "setvar" => ActionKind::SetVar(SetVar::parse(required(spec)?)?),
            "allow" => ActionKind::Allow,
            "status" => ActionKind::Status(parse_status(param.unwrap_or_default())?),
            "deny" => ActionKind::Deny,
            "drop" => ActionKind::Drop,
            "redirect" => ActionKind::Redirect(required(spec)?.to_string()),
            "pass" => ActionKind::Pass,
            "pause" => {
                let p = required(spec)?;
                ActionKind::Pause(p.trim().parse().map_err(|_| EvalError::InvalidActionParam {
                    action: spec.name.clone(),
                    reason: format!("expected milliseconds, got '{p}'"),
                })?)
            }
            _ => return Err(EvalError::UnknownAction(spec.name.clone())),
        };
        Ok(Action {
            name: spec.name.clone(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Whether this action writes into the pending intervention.
    pub fn is_disruptive(&self) -> bool {
        matches!(
            self.kind,
            ActionKind::Status(_)
                | ActionKind::Deny
                | ActionKind::Drop
                | ActionKind::Redirect(_)
                | ActionKind::Pass
                | ActionKind::Pause(_)
        )
    }

    /// Whether the action lets the transaction skip its remaining request
    /// rules. The engine applies this only once the whole rule succeeded.
    pub fn grants_allow(&self) -> bool {
        matches!(self.kind, ActionKind::Allow)
    }

    /// Run the action against a match. Returns whether the action itself
    /// succeeded; failures are errors of the rule, not of the transaction.
    pub fn evaluate(&self, tx: &mut Transaction, message: &mut RuleMessage) -> Result<bool> {
        match &self.kind {
            ActionKind::Msg(text) => {
                message.message = Some(expand(text, tx.vars()).into_owned());
            }
            ActionKind::LogData(text) => {
                message.log_data = Some(expand(text, tx.vars()).into_owned());
            }
            ActionKind::Severity(s) => message.severity = Some(*s),
            ActionKind::Tag(tag) => message.tags.push(expand(tag, tx.vars()).into_owned()),
            ActionKind::Log => message.save_message = true,
            ActionKind::NoLog => message.save_message = false,
            ActionKind::SetVar(setvar) => setvar.apply(tx)?,
            ActionKind::Deny | ActionKind::Drop | ActionKind::Redirect(_) => {
                message.disruptive = true;
            }
            ActionKind::Allow
            | ActionKind::Status(_)
            | ActionKind::Pass
            | ActionKind::Pause(_) => {}
        }
        Ok(true)
    }

    /// Write this action's request into `intervention`. Returns `false` for
    /// actions that have nothing to write.
    pub fn fill_intervention(&self, tx: &Transaction, intervention: &mut Intervention) -> bool {
        match &self.kind {
            ActionKind::Status(status) => intervention.set_status(*status),
            ActionKind::Deny => intervention.set_deny(),
            ActionKind::Drop => intervention.set_drop(),
            ActionKind::Redirect(url) => {
                intervention.set_redirect(expand(url, tx.vars()).into_owned())
            }
            ActionKind::Pass => intervention.clear_disruption(),
            ActionKind::Pause(ms) => intervention.set_pause(*ms),
            _ => return false,
        }
        true
    }
}

/// Parse a `status` parameter: an HTTP status code, 100 to 599.
pub fn parse_status(param: &str) -> Result<u16> {
    param
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|s| (100..=599).contains(s))
        .ok_or_else(|| EvalError::InvalidStatus(param.to_string()))
}

fn required(spec: &ActionSpec) -> Result<&str> {
    spec.param
        .as_deref()
        .ok_or_else(|| EvalError::InvalidActionParam {
            action: spec.name.clone(),
            reason: "missing parameter".into(),
        })
}
