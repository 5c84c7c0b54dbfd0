//! SecLang-style fragments used inside rule documents: `|`-separated
//! variable lists, `,`-separated action lists, and operator strings.
//!
//! Variable and action lists are parsed with a pest PEG grammar
//! (`seclang.pest`); operators are simple enough to split by hand.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::{ActionSpec, OperatorSpec, Selector, VariableExpr};
use crate::error::{ParserError, Result};

#[derive(Parser)]
#[grammar = "src/seclang.pest"]
struct SecLangParser;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a variable list such as `ARGS|!ARGS:safe|REQUEST_HEADERS:/^x-/`.
///
/// # Examples
///
/// ```
/// use rwaf_parser::{VariableKind, parse_variables};
///
/// let vars = parse_variables("ARGS|!ARGS:token|&REQUEST_HEADERS").unwrap();
/// assert_eq!(vars.len(), 3);
/// assert_eq!(vars[0].kind(), VariableKind::Collection);
/// assert!(vars[1].exclude);
/// assert!(vars[2].count);
/// ```
pub fn parse_variables(input: &str) -> Result<Vec<VariableExpr>> {
    let pairs = SecLangParser::parse(Rule::variables, input)
        .map_err(|e| ParserError::Variables(input.to_string(), e.to_string()))?;

    let mut out = Vec::new();
    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::variable) {
        out.push(parse_variable(pair));
    }
    Ok(out)
}

/// Parse an action list such as `id:1,phase:2,deny,msg:'a, b'`.
///
/// Quoted parameters may contain commas; `\'` inside quotes is an escaped
/// quote. Bare parameters are trimmed.
pub fn parse_actions(input: &str) -> Result<Vec<ActionSpec>> {
    let pairs = SecLangParser::parse(Rule::actions, input)
        .map_err(|e| ParserError::Actions(input.to_string(), e.to_string()))?;

    let mut out = Vec::new();
    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::action) {
        out.push(parse_action(pair));
    }
    Ok(out)
}

/// Parse an operator string: `@name param`, `!@name param`, or a bare
/// pattern which is shorthand for `@rx`.
pub fn parse_operator(input: &str) -> Result<OperatorSpec> {
    let trimmed = input.trim();
    let (negated, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    if rest.is_empty() {
        return Err(ParserError::Operator(
            input.to_string(),
            "empty operator".into(),
        ));
    }

    let Some(named) = rest.strip_prefix('@') else {
        return Ok(OperatorSpec {
            name: "rx".into(),
            param: rest.to_string(),
            negated,
        });
    };

    let (name, param) = match named.find(char::is_whitespace) {
        Some(idx) => (&named[..idx], named[idx..].trim()),
        None => (named, ""),
    };
    if name.is_empty() {
        return Err(ParserError::Operator(
            input.to_string(),
            "missing operator name after '@'".into(),
        ));
    }

    Ok(OperatorSpec {
        name: name.to_string(),
        param: param.to_string(),
        negated,
    })
}

// ---------------------------------------------------------------------------
// Internal parsing helpers
// ---------------------------------------------------------------------------

fn parse_variable(pair: Pair<'_, Rule>) -> VariableExpr {
    let mut exclude = false;
    let mut count = false;
    let mut name = "";
    let mut selector = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::exclude_flag => exclude = true,
            Rule::count_flag => count = true,
            Rule::var_name => name = p.as_str(),
            Rule::regex_selector => {
                let body = p.into_inner().next().map(|b| b.as_str()).unwrap_or("");
                selector = Some(Selector::Regex(body.to_string()));
            }
            Rule::quoted_selector => {
                let body = p.into_inner().next().map(|b| b.as_str()).unwrap_or("");
                selector = Some(quoted_selector(body));
            }
            Rule::key_selector => selector = Some(Selector::Key(p.as_str().to_string())),
            _ => {}
        }
    }

    VariableExpr {
        selector,
        exclude,
        count,
        ..VariableExpr::new(name)
    }
}

/// `ARGS:'/^id/'` is a regex selector, any other quoted text is a key.
fn quoted_selector(body: &str) -> Selector {
    if body.len() >= 2 && body.starts_with('/') && body.ends_with('/') {
        Selector::Regex(body[1..body.len() - 1].to_string())
    } else {
        Selector::Key(body.to_string())
    }
}

fn parse_action(pair: Pair<'_, Rule>) -> ActionSpec {
    let mut name = String::new();
    let mut param = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::action_name => name = p.as_str().to_string(),
            Rule::quoted_param => {
                let text = p.into_inner().next().map(|t| t.as_str()).unwrap_or("");
                param = Some(unescape_quoted(text));
            }
            Rule::bare_param => param = Some(p.as_str().trim().to_string()),
            _ => {}
        }
    }

    ActionSpec { name, param }
}

fn unescape_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('\'') => out.push('\''),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::VariableKind;

    #[test]
    fn test_single_collection() {
        let vars = parse_variables("args").unwrap();
        assert_eq!(vars, vec![VariableExpr::new("ARGS")]);
    }

    #[test]
    fn test_keyed_variable_keeps_key_case() {
        let vars = parse_variables("REQUEST_HEADERS:User-Agent").unwrap();
        assert_eq!(
            vars,
            vec![VariableExpr::with_key("REQUEST_HEADERS", "User-Agent")]
        );
        assert_eq!(vars[0].kind(), VariableKind::Single);
    }

    #[test]
    fn test_regex_variable() {
        let vars = parse_variables("ARGS:/^id.*/").unwrap();
        assert_eq!(vars, vec![VariableExpr::with_regex("ARGS", "^id.*")]);
    }

    #[test]
    fn test_regex_with_alternation_inside() {
        let vars = parse_variables("ARGS:/^(a|b)$/|REQUEST_URI").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0], VariableExpr::with_regex("ARGS", "^(a|b)$"));
        assert_eq!(vars[1], VariableExpr::new("REQUEST_URI"));
    }

    #[test]
    fn test_quoted_selectors() {
        let vars = parse_variables("ARGS:'/^x/'|ARGS:'odd key'").unwrap();
        assert_eq!(vars[0], VariableExpr::with_regex("ARGS", "^x"));
        assert_eq!(vars[1], VariableExpr::with_key("ARGS", "odd key"));
    }

    #[test]
    fn test_flags_and_spacing() {
        let vars = parse_variables(" ARGS | !ARGS:token | &ARGS ").unwrap();
        assert_eq!(vars.len(), 3);
        assert!(!vars[0].exclude && !vars[0].count);
        assert!(vars[1].exclude);
        assert_eq!(vars[1].key(), "ARGS:token");
        assert!(vars[2].count);
    }

    #[test]
    fn test_empty_variable_list_fails() {
        assert!(matches!(
            parse_variables(""),
            Err(ParserError::Variables(_, _))
        ));
        assert!(parse_variables("ARGS||ARGS").is_err());
    }

    #[test]
    fn test_actions_basic() {
        let actions = parse_actions("id:941100,phase:2,deny,status:403").unwrap();
        assert_eq!(
            actions,
            vec![
                ActionSpec::new("id", Some("941100")),
                ActionSpec::new("phase", Some("2")),
                ActionSpec::new("deny", None),
                ActionSpec::new("status", Some("403")),
            ]
        );
    }

    #[test]
    fn test_actions_quoted_param_with_commas() {
        let actions = parse_actions("msg:'XSS, reflected',nolog").unwrap();
        assert_eq!(actions[0].param.as_deref(), Some("XSS, reflected"));
        assert_eq!(actions[1].name, "nolog");
    }

    #[test]
    fn test_actions_escaped_quote() {
        let actions = parse_actions(r"msg:'it\'s bad'").unwrap();
        assert_eq!(actions[0].param.as_deref(), Some("it's bad"));
    }

    #[test]
    fn test_actions_bare_param_with_colon() {
        let actions = parse_actions("redirect:http://example.com/blocked, setvar:tx.score=+5").unwrap();
        assert_eq!(actions[0].param.as_deref(), Some("http://example.com/blocked"));
        assert_eq!(actions[1].param.as_deref(), Some("tx.score=+5"));
    }

    #[test]
    fn test_actions_empty_and_trailing_comma() {
        assert!(parse_actions("").unwrap().is_empty());
        assert_eq!(parse_actions("deny,").unwrap().len(), 1);
    }

    #[test]
    fn test_actions_unterminated_quote_fails() {
        assert!(parse_actions("msg:'abc'def").is_err());
    }

    #[test]
    fn test_operator_forms() {
        let op = parse_operator("@rx ^admin").unwrap();
        assert_eq!((op.name.as_str(), op.param.as_str(), op.negated), ("rx", "^admin", false));

        let op = parse_operator("!@streq  GET ").unwrap();
        assert_eq!((op.name.as_str(), op.param.as_str(), op.negated), ("streq", "GET", true));

        let op = parse_operator("@detectXSS").unwrap();
        assert_eq!(op.name, "detectXSS");
        assert!(op.param.is_empty());

        let op = parse_operator("union\\s+select").unwrap();
        assert_eq!(op.name, "rx");
        assert_eq!(op.param, "union\\s+select");
    }

    #[test]
    fn test_operator_errors() {
        assert!(matches!(parse_operator("  "), Err(ParserError::Operator(_, _))));
        assert!(matches!(parse_operator("!@ x"), Err(ParserError::Operator(_, _))));
    }
}
