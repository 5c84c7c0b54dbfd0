//! AST types for rule files: variable expressions, operator and action
//! specifications, and the rule definitions built from them.

use std::fmt;

use serde::Serialize;

// =============================================================================
// Enumerations
// =============================================================================

/// Processing phase a rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
    Logging,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::RequestHeaders,
        Phase::RequestBody,
        Phase::ResponseHeaders,
        Phase::ResponseBody,
        Phase::Logging,
    ];

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Phase::RequestHeaders),
            2 => Some(Phase::RequestBody),
            3 => Some(Phase::ResponseHeaders),
            4 => Some(Phase::ResponseBody),
            5 => Some(Phase::Logging),
            _ => None,
        }
    }

    /// Parse a `phase:` parameter. Accepts `1`-`5` and the aliases
    /// `request` (2), `response` (4) and `logging` (5).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" => Some(Phase::RequestBody),
            "response" => Some(Phase::ResponseBody),
            "logging" => Some(Phase::Logging),
            other => other.parse::<u8>().ok().and_then(Phase::from_number),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Phase::RequestHeaders => 1,
            Phase::RequestBody => 2,
            Phase::ResponseHeaders => 3,
            Phase::ResponseBody => 4,
            Phase::Logging => 5,
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::RequestBody
    }
}

/// Syslog-style severity attached to a rule match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    /// Parse a severity by name (case-insensitive) or by number (`0`-`7`).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergency" | "0" => Some(Severity::Emergency),
            "alert" | "1" => Some(Severity::Alert),
            "critical" | "2" => Some(Severity::Critical),
            "error" | "3" => Some(Severity::Error),
            "warning" | "4" => Some(Severity::Warning),
            "notice" | "5" => Some(Severity::Notice),
            "info" | "6" => Some(Severity::Info),
            "debug" | "7" => Some(Severity::Debug),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Variable expressions
// =============================================================================

/// Which store lookup a variable expression resolves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// `ARGS` — every entry of the collection, plus the bare key itself.
    Collection,
    /// `ARGS:id` — entries stored under exactly that key.
    Single,
    /// `ARGS:/^id/` — collection entries whose sub-key matches the regex.
    Regex,
}

/// The part after the `:` in `COLLECTION:selector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Key(String),
    Regex(String),
}

/// One entry of a rule's `|`-separated variable list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableExpr {
    /// Collection or variable name, upper-cased.
    pub collection: String,
    pub selector: Option<Selector>,
    /// `!` prefix: remove matching entries from the rule's candidates.
    pub exclude: bool,
    /// `&` prefix: evaluate the number of entries instead of their values.
    pub count: bool,
}

impl VariableExpr {
    pub fn new(collection: impl Into<String>) -> Self {
        VariableExpr {
            collection: collection.into().to_ascii_uppercase(),
            selector: None,
            exclude: false,
            count: false,
        }
    }

    pub fn with_key(collection: impl Into<String>, key: impl Into<String>) -> Self {
        VariableExpr {
            selector: Some(Selector::Key(key.into())),
            ..VariableExpr::new(collection)
        }
    }

    pub fn with_regex(collection: impl Into<String>, pattern: impl Into<String>) -> Self {
        VariableExpr {
            selector: Some(Selector::Regex(pattern.into())),
            ..VariableExpr::new(collection)
        }
    }

    pub fn kind(&self) -> VariableKind {
        match self.selector {
            None => VariableKind::Collection,
            Some(Selector::Key(_)) => VariableKind::Single,
            Some(Selector::Regex(_)) => VariableKind::Regex,
        }
    }

    /// The store key this expression is resolved with: `ARGS`, `ARGS:id`
    /// or `ARGS:/^id/`.
    pub fn key(&self) -> String {
        match &self.selector {
            None => self.collection.clone(),
            Some(Selector::Key(k)) => format!("{}:{k}", self.collection),
            Some(Selector::Regex(p)) => format!("{}:/{p}/", self.collection),
        }
    }
}

impl fmt::Display for VariableExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            write!(f, "!")?;
        }
        if self.count {
            write!(f, "&")?;
        }
        write!(f, "{}", self.key())
    }
}

// =============================================================================
// Operators and actions
// =============================================================================

/// An operator as written in a rule: `!@rx ^admin` → name `rx`, param
/// `^admin`, negated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorSpec {
    pub name: String,
    pub param: String,
    pub negated: bool,
}

impl fmt::Display for OperatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "@{}", self.name)?;
        if !self.param.is_empty() {
            write!(f, " {}", self.param)?;
        }
        Ok(())
    }
}

/// One entry of a rule's action list: `status:403`, `deny`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub param: Option<String>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, param: Option<&str>) -> Self {
        ActionSpec {
            name: name.into(),
            param: param.map(str::to_string),
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(p) => write!(f, "{}:{p}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A rule as loaded from a rule file, before compilation.
///
/// A rule without variables and operator is unconditional: its actions run
/// on every transaction in its phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDef {
    pub variables: Vec<VariableExpr>,
    pub operator: Option<OperatorSpec>,
    pub actions: Vec<ActionSpec>,
    pub description: Option<String>,
}

impl RuleDef {
    /// Value of the first action with the given name, e.g. the rule `id`.
    pub fn action_param(&self, name: &str) -> Option<&str> {
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .and_then(|a| a.param.as_deref())
    }

    pub fn is_unconditional(&self) -> bool {
        self.operator.is_none()
    }
}

/// A set of parsed rules from one or more rule files, in file order.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSet {
    pub rules: Vec<RuleDef>,
    /// Per-document parse errors; the offending documents are skipped.
    #[serde(skip)]
    pub errors: Vec<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet {
            rules: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
        self.errors.extend(other.errors);
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_aliases() {
        assert_eq!(Phase::from_str("1"), Some(Phase::RequestHeaders));
        assert_eq!(Phase::from_str("request"), Some(Phase::RequestBody));
        assert_eq!(Phase::from_str("RESPONSE"), Some(Phase::ResponseBody));
        assert_eq!(Phase::from_str("logging"), Some(Phase::Logging));
        assert_eq!(Phase::from_str("6"), None);
        assert_eq!(Phase::from_str("x"), None);
        assert_eq!(Phase::default().number(), 2);
    }

    #[test]
    fn test_severity_by_name_or_number() {
        assert_eq!(Severity::from_str("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::from_str("2"), Some(Severity::Critical));
        assert_eq!(Severity::from_str("7"), Some(Severity::Debug));
        assert_eq!(Severity::from_str("8"), None);
        assert!(Severity::Emergency < Severity::Debug);
    }

    #[test]
    fn test_variable_keys() {
        assert_eq!(VariableExpr::new("args").key(), "ARGS");
        assert_eq!(VariableExpr::with_key("args", "Id").key(), "ARGS:Id");
        assert_eq!(VariableExpr::with_regex("ARGS", "^id").key(), "ARGS:/^id/");
        assert_eq!(
            VariableExpr::with_regex("ARGS", "^id").kind(),
            VariableKind::Regex
        );
    }

    #[test]
    fn test_display_round_trip_shapes() {
        let mut v = VariableExpr::with_key("ARGS", "safe");
        v.exclude = true;
        assert_eq!(v.to_string(), "!ARGS:safe");

        let op = OperatorSpec {
            name: "rx".into(),
            param: "^a".into(),
            negated: true,
        };
        assert_eq!(op.to_string(), "!@rx ^a");
        assert_eq!(ActionSpec::new("status", Some("403")).to_string(), "status:403");
    }
}
