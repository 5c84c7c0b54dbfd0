//! One inspected request: its variables, its intervention and its flow state.

use serde_json::Value;

use crate::collection::{COLLECTION_SEPARATOR, Collection, VariableStore};
use crate::intervention::Intervention;

/// Per-request evaluation state.
///
/// Owns its [`VariableStore`] and [`Intervention`] exclusively; both live
/// exactly as long as the transaction. Callers fill the store (through
/// [`Transaction::add_variable`] or [`Transaction::from_value`]) before
/// handing the transaction to the engine.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: String,
    vars: VariableStore,
    intervention: Intervention,
    allowed: bool,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Self {
        Transaction {
            id: id.into(),
            vars: VariableStore::new(),
            intervention: Intervention::new(),
            allowed: false,
        }
    }

    /// Build a transaction from a JSON object.
    ///
    /// Scalars and arrays of scalars are stored under their (upper-cased)
    /// name. Nested objects become collections: `{"args": {"id": "1"}}` is
    /// stored as `ARGS:id`, sub-keys keeping their case. Nulls are skipped
    /// and deeper structures are stored as their JSON text.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwaf_eval::{Collection, Transaction};
    /// use serde_json::json;
    ///
    /// let tx = Transaction::from_value(
    ///     "tx-1",
    ///     &json!({"request_uri": "/login", "args": {"user": "admin"}}),
    /// );
    /// assert_eq!(tx.vars().resolve_first("REQUEST_URI"), Some("/login"));
    /// assert_eq!(tx.vars().resolve_first("ARGS:user"), Some("admin"));
    /// ```
    pub fn from_value(id: impl Into<String>, value: &Value) -> Self {
        let mut tx = Transaction::new(id);
        let Some(obj) = value.as_object() else {
            log::debug!("transaction {} input is not a JSON object", tx.id);
            return tx;
        };

        for (name, member) in obj {
            let name = name.to_ascii_uppercase();
            match member {
                Value::Object(sub) => {
                    for (subkey, v) in sub {
                        let key = format!("{name}{COLLECTION_SEPARATOR}{subkey}");
                        store_json(&mut tx.vars, &key, v);
                    }
                }
                other => store_json(&mut tx.vars, &name, other),
            }
        }
        tx
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    /// Store one value; keys may repeat.
    pub fn add_variable(&mut self, key: &str, value: &str) {
        self.vars.store(key, value);
    }

    pub fn intervention(&self) -> &Intervention {
        &self.intervention
    }

    /// Merge a rule's finalized intervention by precedence.
    pub fn merge_intervention(&mut self, pending: Intervention) -> bool {
        self.intervention.merge(pending)
    }

    /// Whether a disruptive intervention is pending.
    pub fn is_disrupted(&self) -> bool {
        self.intervention.disruptive
    }

    /// Whether an `allow` action fired.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub(crate) fn allow(&mut self) {
        self.allowed = true;
    }
}

fn store_json(vars: &mut VariableStore, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => vars.store(key, s),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) => vars.store(key, &item.to_string()),
                    _ => store_json(vars, key, item),
                }
            }
        }
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => {
            vars.store(key, &value.to_string())
        }
    }
}
