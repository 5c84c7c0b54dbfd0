//! YAML → AST parser for rule files.
//!
//! Handles:
//! - Multi-document YAML (one rule per `---` document)
//! - Variable and action fields given either as one SecLang string or as a
//!   list of strings
//! - Unconditional rules (no `variables` / `operator`)
//! - Directory-based rule loading, in sorted path order

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use crate::ast::{RuleDef, RuleSet};
use crate::error::{ParserError, Result};
use crate::seclang::{parse_actions, parse_operator, parse_variables};

// =============================================================================
// Raw document shape
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn items(&self) -> Vec<&str> {
        match self {
            StringOrList::One(s) => vec![s.as_str()],
            StringOrList::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    variables: Option<StringOrList>,
    operator: Option<String>,
    actions: Option<StringOrList>,
    description: Option<String>,
}

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string containing one or more rule documents.
///
/// Documents that fail to parse are skipped and their errors collected into
/// [`RuleSet::errors`]; the remaining rules keep their file order. A YAML
/// syntax error ends the stream: documents after it are not read.
///
/// # Examples
///
/// ```
/// use rwaf_parser::parse_rules_yaml;
///
/// let yaml = r#"
/// variables: ARGS
/// operator: "@detectXSS"
/// actions: "id:941100,phase:2,deny,status:403"
/// "#;
///
/// let set = parse_rules_yaml(yaml).unwrap();
/// assert_eq!(set.rules.len(), 1);
/// assert_eq!(set.rules[0].action_param("id"), Some("941100"));
/// ```
pub fn parse_rules_yaml(yaml: &str) -> Result<RuleSet> {
    let mut set = RuleSet::new();

    for (index, doc) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = match Value::deserialize(doc) {
            Ok(v) => v,
            Err(e) => {
                // The scanner cannot resync after a syntax error and would
                // keep yielding the same document.
                set.errors.push(format!("document {index}: YAML parse error: {e}"));
                break;
            }
        };

        if value.is_null() {
            continue;
        }

        match parse_document(value) {
            Ok(rule) => set.rules.push(rule),
            Err(e) => set.errors.push(format!("document {index}: {e}")),
        }
    }

    Ok(set)
}

/// Parse a single rule file.
pub fn parse_rules_file(path: &Path) -> Result<RuleSet> {
    let content = std::fs::read_to_string(path)?;
    parse_rules_yaml(&content)
}

/// Parse all rule files (`.yml` / `.yaml`) from a directory, recursively.
///
/// Files are visited in sorted path order so rule order is reproducible.
pub fn parse_rules_directory(dir: &Path) -> Result<RuleSet> {
    let mut set = RuleSet::new();

    fn walk(dir: &Path, set: &mut RuleSet) -> Result<()> {
        let mut paths = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if path.is_dir() {
                walk(&path, set)?;
            } else if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml" | "yaml")
            ) {
                match parse_rules_file(&path) {
                    Ok(sub) => {
                        set.rules.extend(sub.rules);
                        set.errors.extend(
                            sub.errors
                                .into_iter()
                                .map(|e| format!("{}: {e}", path.display())),
                        );
                    }
                    Err(e) => set.errors.push(format!("{}: {e}", path.display())),
                }
            }
        }
        Ok(())
    }

    walk(dir, &mut set)?;
    Ok(set)
}

/// Parse a rule file or, when `path` is a directory, every rule file below it.
pub fn parse_rules_path(path: &Path) -> Result<RuleSet> {
    if path.is_dir() {
        parse_rules_directory(path)
    } else {
        parse_rules_file(path)
    }
}

// =============================================================================
// Document parsing
// =============================================================================

fn parse_document(value: Value) -> Result<RuleDef> {
    if !value.is_mapping() {
        return Err(ParserError::InvalidRule(
            "document is not a YAML mapping".into(),
        ));
    }
    let raw: RawRule = serde_yaml::from_value(value)?;

    let mut variables = Vec::new();
    if let Some(ref vars) = raw.variables {
        for item in vars.items() {
            variables.extend(parse_variables(item)?);
        }
    }

    let operator = raw.operator.as_deref().map(parse_operator).transpose()?;

    match (variables.is_empty(), operator.is_some()) {
        (true, true) => {
            return Err(ParserError::InvalidRule(
                "'operator' requires 'variables'".into(),
            ));
        }
        (false, false) => {
            return Err(ParserError::InvalidRule(
                "'variables' requires an 'operator'".into(),
            ));
        }
        _ => {}
    }

    if !variables.is_empty() && variables.iter().all(|v| v.exclude) {
        return Err(ParserError::InvalidRule(
            "variable list contains only exclusions".into(),
        ));
    }

    let mut actions = Vec::new();
    if let Some(ref acts) = raw.actions {
        for item in acts.items() {
            actions.extend(parse_actions(item)?);
        }
    }

    Ok(RuleDef {
        variables,
        operator,
        actions,
        description: raw.description,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActionSpec, VariableExpr};

    #[test]
    fn test_single_rule() {
        let yaml = r#"
variables: ARGS|REQUEST_HEADERS:User-Agent
operator: "@rx <script"
actions: "id:1001,phase:2,deny,status:403,msg:'Script tag'"
description: Detect script tags
"#;
        let set = parse_rules_yaml(yaml).unwrap();
        assert!(set.errors.is_empty(), "{:?}", set.errors);
        let rule = &set.rules[0];
        assert_eq!(rule.variables.len(), 2);
        assert_eq!(rule.operator.as_ref().unwrap().param, "<script");
        assert_eq!(rule.actions.len(), 5);
        assert_eq!(rule.action_param("msg"), Some("Script tag"));
        assert_eq!(rule.description.as_deref(), Some("Detect script tags"));
    }

    #[test]
    fn test_list_forms() {
        let yaml = r#"
variables:
  - ARGS
  - "!ARGS:csrf_token"
operator: "@contains evil"
actions:
  - id:7
  - "msg:'a, b'"
  - deny
"#;
        let set = parse_rules_yaml(yaml).unwrap();
        let rule = &set.rules[0];
        assert_eq!(rule.variables[1], {
            let mut v = VariableExpr::with_key("ARGS", "csrf_token");
            v.exclude = true;
            v
        });
        assert_eq!(
            rule.actions,
            vec![
                ActionSpec::new("id", Some("7")),
                ActionSpec::new("msg", Some("a, b")),
                ActionSpec::new("deny", None),
            ]
        );
    }

    #[test]
    fn test_unconditional_rule() {
        let set = parse_rules_yaml("actions: id:900000,phase:1,setvar:tx.threshold=5").unwrap();
        assert!(set.rules[0].is_unconditional());
        assert!(set.rules[0].variables.is_empty());
    }

    #[test]
    fn test_multi_document_keeps_order_and_collects_errors() {
        let yaml = r#"
variables: ARGS
operator: "@rx a"
actions: id:1
---
variables: ARGS
actions: id:2
---
---
variables: ARGS
operator: "@rx c"
actions: id:3
"#;
        let set = parse_rules_yaml(yaml).unwrap();
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].action_param("id"), Some("1"));
        assert_eq!(set.rules[1].action_param("id"), Some("3"));
        assert_eq!(set.errors.len(), 1);
        assert!(set.errors[0].contains("requires an 'operator'"));
    }

    #[test]
    fn test_unknown_field_is_error() {
        let set = parse_rules_yaml("variables: ARGS\noperator: x\nchain: true\n").unwrap();
        assert!(set.rules.is_empty());
        assert_eq!(set.errors.len(), 1);
    }

    #[test]
    fn test_only_exclusions_is_error() {
        let set = parse_rules_yaml("variables: \"!ARGS:a\"\noperator: x\n").unwrap();
        assert!(set.rules.is_empty());
        assert!(set.errors[0].contains("only exclusions"));
    }

    #[test]
    fn test_non_mapping_document() {
        let set = parse_rules_yaml("42").unwrap();
        assert!(set.rules.is_empty());
        assert!(set.errors[0].contains("not a YAML mapping"));
    }

    #[test]
    fn test_directory_loading_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "variables: ARGS\noperator: b\nactions: id:2\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "variables: ARGS\noperator: a\nactions: id:1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = parse_rules_directory(dir.path()).unwrap();
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].action_param("id"), Some("1"));
        assert_eq!(set.rules[1].action_param("id"), Some("2"));
    }
}
