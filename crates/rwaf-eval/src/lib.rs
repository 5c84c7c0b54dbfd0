//! # rwaf-eval
//!
//! Runtime core of the rwaf web application firewall rule engine.
//!
//! This crate consumes the rule definitions produced by [`rwaf_parser`],
//! compiles them (validating every operator and action parameter up front),
//! and evaluates transactions against them.
//!
//! ## Architecture
//!
//! - **Variable store** ([`VariableStore`], [`Collection`]): per-transaction
//!   multimap with three resolution tiers (exact key, collection prefix,
//!   collection plus sub-key regex).
//! - **Operators** ([`Operator`]): predicates such as `@rx`, `@pm`,
//!   `@ipMatch` and `@detectXSS`, with negation applied centrally.
//! - **Actions** ([`Action`]): metadata, logging control, `setvar`, and the
//!   disruptive actions that fill an [`Intervention`].
//! - **Engine** ([`Engine`]): runs rules phase by phase, builds a
//!   [`RuleMessage`] per match and merges interventions by precedence.
//!
//! ## Quick Start
//!
//! ```rust
//! use rwaf_eval::{Engine, InterventionKind, Transaction};
//! use rwaf_parser::parse_rules_yaml;
//! use serde_json::json;
//!
//! let yaml = r#"
//! variables: ARGS|!ARGS:comment
//! operator: "@detectSQLi"
//! actions: "id:942100,phase:2,t:urlDecode,deny,msg:'SQL Injection'"
//! ---
//! variables: ARGS
//! operator: "@rx ^\\d+$"
//! actions: "id:900100,phase:1,nolog,setvar:tx.numeric_args=+1"
//! "#;
//!
//! let set = parse_rules_yaml(yaml).unwrap();
//! let mut engine = Engine::new();
//! engine.add_collection(&set).unwrap();
//!
//! let mut tx = Transaction::from_value(
//!     "tx-1",
//!     &json!({"args": {"id": "1%20UNION%20SELECT%20password%20FROM%20users"}}),
//! );
//! let result = engine.process(&mut tx);
//! assert_eq!(result.messages.len(), 1);
//! assert_eq!(result.messages[0].message.as_deref(), Some("SQL Injection"));
//! assert_eq!(result.intervention.unwrap().kind, InterventionKind::Deny);
//! ```

pub mod action;
pub mod collection;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod intervention;
pub mod macros;
pub mod message;
pub mod operator;
pub mod result;
pub mod transaction;
pub mod transformation;

// Re-export the most commonly used types and functions at crate root
pub use action::{Action, ActionKind, SetVar, SetVarOp, parse_status};
pub use collection::{COLLECTION_SEPARATOR, Collection, Variable, VariableStore};
pub use compiler::{Rule, compile_rule, resolve_candidates, resolve_expression};
pub use engine::{
    CandidatePolicy, Engine, EngineConfig, EngineMode, MATCHED_VAR, MATCHED_VAR_NAME,
    evaluate_rule,
};
pub use error::{EvalError, Result, RuleLoadError};
pub use intervention::{Intervention, InterventionKind};
pub use message::RuleMessage;
pub use operator::{Operator, OperatorKind};
pub use result::{
    PhaseResult, ProcessResult, RuleError, RuleEvaluation, RuleOutcome, RuleResult,
};
pub use transaction::Transaction;
pub use transformation::{TransformStep, Transformation};
