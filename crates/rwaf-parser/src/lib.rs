//! # rwaf-parser
//!
//! Parser for WAF rule files.
//!
//! Rule files are YAML, one rule per document. Inside a document the
//! `variables`, `operator` and `actions` fields use SecLang syntax:
//!
//! - **Variable lists**: `ARGS|REQUEST_HEADERS:User-Agent|ARGS:/^id/|!ARGS:token|&ARGS`
//! - **Operators**: `@rx pattern`, `!@streq GET`, `@detectXSS`; a bare pattern means `@rx`
//! - **Action lists**: `id:941100,phase:2,deny,status:403,msg:'quoted, text'`
//!
//! ## Architecture
//!
//! - **PEG grammar** ([`pest`]) for variable and action lists
//! - **serde_yaml** for the document structure
//! - Interpretation of operator and action names is left to the evaluator;
//!   this crate only produces the typed AST.
//!
//! ## Quick Start
//!
//! ```rust
//! use rwaf_parser::parse_rules_yaml;
//!
//! let yaml = r#"
//! variables: ARGS|REQUEST_URI
//! operator: "@detectXSS"
//! actions: "id:941100,phase:2,deny,status:403,msg:'XSS Attack Detected'"
//! "#;
//!
//! let set = parse_rules_yaml(yaml).unwrap();
//! assert_eq!(set.rules.len(), 1);
//! assert_eq!(set.rules[0].variables.len(), 2);
//! ```

pub mod ast;
pub mod error;
pub mod parser;
pub mod seclang;

// Re-export the most commonly used types and functions at crate root
pub use ast::{
    ActionSpec, OperatorSpec, Phase, RuleDef, RuleSet, Selector, Severity, VariableExpr,
    VariableKind,
};
pub use error::{ParserError, Result};
pub use parser::{parse_rules_directory, parse_rules_file, parse_rules_path, parse_rules_yaml};
pub use seclang::{parse_actions, parse_operator, parse_variables};
