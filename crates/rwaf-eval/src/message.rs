//! Per-match record handed to the logging sink.

use rwaf_parser::{Phase, Severity};
use serde::Serialize;

use crate::collection::Variable;

/// What one rule match produced.
///
/// Created fresh for every match with `save_message` set; actions then fill
/// in metadata (`msg`, `severity`, `tag`, ...) and may flip `save_message`
/// (`nolog` / `log`). Only messages that still have `save_message` set when
/// the rule finishes reach the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMessage {
    pub rule_id: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Expanded `msg` text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Why the operator matched, including the variable that matched.
    pub match_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_var: Option<Variable>,
    /// Set when a disruptive action (`deny`, `drop`, `redirect`) ran.
    pub disruptive: bool,
    #[serde(skip)]
    pub save_message: bool,
}

impl RuleMessage {
    pub fn new(rule_id: impl Into<String>, phase: Phase) -> Self {
        RuleMessage {
            rule_id: rule_id.into(),
            phase,
            severity: None,
            message: None,
            match_message: String::new(),
            log_data: None,
            tags: Vec::new(),
            matched_var: None,
            disruptive: false,
            save_message: true,
        }
    }

    /// One-line, bracketed rendering for logs and intervention records.
    pub fn log_line(&self) -> String {
        let mut line = self.match_message.clone();
        line.push_str(&format!(" [id \"{}\"]", self.rule_id));
        if let Some(msg) = &self.message {
            line.push_str(&format!(" [msg \"{msg}\"]"));
        }
        if let Some(data) = &self.log_data {
            line.push_str(&format!(" [data \"{data}\"]"));
        }
        if let Some(severity) = self.severity {
            line.push_str(&format!(" [severity \"{severity}\"]"));
        }
        for tag in &self.tags {
            line.push_str(&format!(" [tag \"{tag}\"]"));
        }
        line
    }
}
