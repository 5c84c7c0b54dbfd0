//! Operators: the predicate a rule applies to each candidate value.
//!
//! Each [`Operator`] is built once when its rule is compiled; regexes, IP
//! networks and phrase lists are prepared at that point so bad parameters
//! surface as configuration errors. Negation (`!@rx`) lives on the
//! [`Operator`] itself and is applied once, after the variant has reported
//! its plain result.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::{Regex, RegexSet};
use rwaf_parser::OperatorSpec;

use crate::collection::Variable;
use crate::error::{EvalError, Result};
use crate::macros::{expand, has_macros};
use crate::transaction::Transaction;

// =============================================================================
// Built-in detectors
// =============================================================================

static XSS_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)<\s*script[^>]*>",
        r"(?i)<[^>]*\bon[a-z]+\s*=",
        r"(?i)(?:java|vb)script\s*:",
        r"(?i)data\s*:\s*text/html",
        r"(?i)<\s*(?:iframe|object|embed|svg|math|base|form|meta|link|style)\b",
        r"(?i)document\s*\.\s*(?:cookie|domain|write|location)",
        r"(?i)\bexpression\s*\(",
    ])
    .expect("built-in XSS signatures compile")
});

static SQLI_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?is)\bunion\b.*\bselect\b",
        r"(?i)'\s*(?:or|and)\s+'?[\w]+'?\s*(?:=|like)",
        r"(?i)\b(?:or|and)\s+(\d+)\s*=\s*\d+",
        r"(?i);\s*(?:drop|delete|insert|update|alter|create|truncate)\s",
        r"(?i)\b(?:sleep|benchmark|pg_sleep)\s*\(",
        r"(?i)\bwaitfor\s+delay\b",
        r"'\s*(?:--|#|/\*)",
        r"(?i)\bexec(?:ute)?\s+(?:master\.|xp_|sp_)",
        r"(?i)\binformation_schema\b",
    ])
    .expect("built-in SQLi signatures compile")
});

// =============================================================================
// Operator variants
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCmp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl NumericCmp {
    fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            NumericCmp::Eq => lhs == rhs,
            NumericCmp::Gt => lhs > rhs,
            NumericCmp::Ge => lhs >= rhs,
            NumericCmp::Lt => lhs < rhs,
            NumericCmp::Le => lhs <= rhs,
        }
    }
}

/// Right-hand side of a numeric comparison.
#[derive(Debug, Clone)]
pub enum NumericParam {
    Fixed(i64),
    /// Contains macros; expanded and parsed on every evaluation.
    Dynamic(String),
}

/// The predicate behind an [`Operator`].
///
/// String parameters may contain `%{...}` macros and are expanded against the
/// transaction at evaluation time.
#[derive(Debug, Clone)]
pub enum OperatorKind {
    /// `@rx`: regex search.
    Rx(Regex),
    /// `@streq`: exact, case-sensitive equality.
    StrEq(String),
    /// `@contains`: input contains the parameter.
    Contains(String),
    /// `@beginsWith`
    BeginsWith(String),
    /// `@endsWith`
    EndsWith(String),
    /// `@within`: the parameter contains the input.
    Within(String),
    /// `@pm`: any of the space-separated phrases, case-insensitive.
    Pm(Vec<String>),
    /// `@eq`, `@gt`, `@ge`, `@lt`, `@le`
    Numeric(NumericCmp, NumericParam),
    /// `@ipMatch`: comma-separated addresses or CIDR networks.
    IpMatch(Vec<IpNet>),
    /// `@detectXSS`
    DetectXss,
    /// `@detectSQLi`
    DetectSqli,
    /// `@unconditionalMatch`
    Unconditional,
    /// `@noMatch`
    NoMatch,
}

impl OperatorKind {
    /// The non-negated truth value for `input`.
    fn evaluate(&self, tx: &Transaction, input: &str) -> Result<bool> {
        Ok(match self {
            OperatorKind::Rx(re) => re.is_match(input),
            OperatorKind::StrEq(p) => input == expand(p, tx.vars()),
            OperatorKind::Contains(p) => input.contains(expand(p, tx.vars()).as_ref()),
            OperatorKind::BeginsWith(p) => input.starts_with(expand(p, tx.vars()).as_ref()),
            OperatorKind::EndsWith(p) => input.ends_with(expand(p, tx.vars()).as_ref()),
            OperatorKind::Within(p) => expand(p, tx.vars()).contains(input),
            OperatorKind::Pm(phrases) => {
                let lowered = input.to_lowercase();
                phrases.iter().any(|p| lowered.contains(p.as_str()))
            }
            OperatorKind::Numeric(cmp, param) => {
                let rhs = match param {
                    NumericParam::Fixed(n) => *n,
                    NumericParam::Dynamic(template) => {
                        let expanded = expand(template, tx.vars());
                        parse_number(&expanded).ok_or_else(|| {
                            EvalError::ExpectedNumeric(format!(
                                "'{template}' expanded to '{expanded}'"
                            ))
                        })?
                    }
                };
                parse_number(input).is_some_and(|lhs| cmp.holds(lhs, rhs))
            }
            OperatorKind::IpMatch(nets) => input
                .trim()
                .parse::<IpAddr>()
                .is_ok_and(|ip| nets.iter().any(|n| n.contains(&ip))),
            OperatorKind::DetectXss => XSS_SIGNATURES.is_match(input),
            OperatorKind::DetectSqli => SQLI_SIGNATURES.is_match(input),
            OperatorKind::Unconditional => true,
            OperatorKind::NoMatch => false,
        })
    }
}

// =============================================================================
// Operator
// =============================================================================

/// A configured operator: variant, raw parameter, negation flag and the
/// message explaining a match.
#[derive(Debug, Clone)]
pub struct Operator {
    name: String,
    param: String,
    negated: bool,
    kind: OperatorKind,
    match_message: String,
}

impl Operator {
    /// Build an operator from its name (without `@`), parameter and
    /// negation flag. Fails on unknown names and unusable parameters.
    pub fn new(name: &str, param: &str, negated: bool) -> Result<Self> {
        let kind = compile_kind(name, param)?;
        let match_message = match kind {
            OperatorKind::DetectXss => "detected XSS using built-in signatures".to_string(),
            OperatorKind::DetectSqli => "detected SQLi using built-in signatures".to_string(),
            _ => format!("Matched \"Operator `{name}' with parameter `{param}'\""),
        };
        Ok(Operator {
            name: name.to_string(),
            param: param.to_string(),
            negated,
            kind,
            match_message,
        })
    }

    pub fn from_spec(spec: &OperatorSpec) -> Result<Self> {
        Self::new(&spec.name, &spec.param, spec.negated)
    }

    /// The operator of a rule without variables: always matches.
    pub fn unconditional() -> Self {
        Operator {
            name: "unconditionalMatch".into(),
            param: String::new(),
            negated: false,
            kind: OperatorKind::Unconditional,
            match_message: "Unconditional match".into(),
        }
    }

    /// Evaluate against one candidate value, applying negation.
    pub fn evaluate(&self, tx: &Transaction, input: &str) -> Result<bool> {
        Ok(self.kind.evaluate(tx, input)? != self.negated)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    pub fn match_message(&self) -> &str {
        &self.match_message
    }

    /// The match message completed with the variable that matched.
    pub fn resolve_match_message(&self, var: &Variable) -> String {
        format!(
            "{} against variable `{}' (Value: `{}')",
            self.match_message, var.key, var.value
        )
    }
}

// =============================================================================
// Compilation helpers
// =============================================================================

fn compile_kind(name: &str, param: &str) -> Result<OperatorKind> {
    let kind = match name.to_ascii_lowercase().as_str() {
        "rx" => OperatorKind::Rx(Regex::new(param)?),
        "streq" => OperatorKind::StrEq(param.to_string()),
        "contains" => OperatorKind::Contains(param.to_string()),
        "beginswith" => OperatorKind::BeginsWith(param.to_string()),
        "endswith" => OperatorKind::EndsWith(param.to_string()),
        "within" => OperatorKind::Within(param.to_string()),
        "pm" => {
            let phrases: Vec<String> = param.split_whitespace().map(str::to_lowercase).collect();
            if phrases.is_empty() {
                return Err(invalid_param(name, "expected at least one phrase"));
            }
            OperatorKind::Pm(phrases)
        }
        "eq" => OperatorKind::Numeric(NumericCmp::Eq, numeric_param(name, param)?),
        "gt" => OperatorKind::Numeric(NumericCmp::Gt, numeric_param(name, param)?),
        "ge" => OperatorKind::Numeric(NumericCmp::Ge, numeric_param(name, param)?),
        "lt" => OperatorKind::Numeric(NumericCmp::Lt, numeric_param(name, param)?),
        "le" => OperatorKind::Numeric(NumericCmp::Le, numeric_param(name, param)?),
        "ipmatch" => OperatorKind::IpMatch(ip_networks(name, param)?),
        "detectxss" => OperatorKind::DetectXss,
        "detectsqli" => OperatorKind::DetectSqli,
        "unconditionalmatch" => OperatorKind::Unconditional,
        "nomatch" => OperatorKind::NoMatch,
        _ => return Err(EvalError::UnknownOperator(name.to_string())),
    };
    Ok(kind)
}

fn numeric_param(name: &str, param: &str) -> Result<NumericParam> {
    if has_macros(param) {
        return Ok(NumericParam::Dynamic(param.to_string()));
    }
    parse_number(param)
        .map(NumericParam::Fixed)
        .ok_or_else(|| EvalError::ExpectedNumeric(format!("@{name} parameter '{param}'")))
}

fn ip_networks(name: &str, param: &str) -> Result<Vec<IpNet>> {
    let mut nets = Vec::new();
    for item in param.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item.contains('/') {
            nets.push(item.parse::<IpNet>()?);
        } else {
            let ip: IpAddr = item
                .parse()
                .map_err(|e| invalid_param(name, &format!("'{item}': {e}")))?;
            nets.push(IpNet::from(ip));
        }
    }
    if nets.is_empty() {
        return Err(invalid_param(name, "expected at least one address"));
    }
    Ok(nets)
}

fn invalid_param(name: &str, reason: &str) -> EvalError {
    EvalError::InvalidOperatorParam {
        operator: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}
