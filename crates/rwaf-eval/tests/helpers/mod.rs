#![allow(dead_code)]

use rwaf_eval::{Engine, EngineConfig, ProcessResult, Transaction};
use rwaf_parser::parse_rules_yaml;
use serde_json::Value;

pub fn engine_from_yaml(yaml: &str) -> Engine {
    engine_with_config(yaml, EngineConfig::default())
}

pub fn engine_with_config(yaml: &str, config: EngineConfig) -> Engine {
    let set = parse_rules_yaml(yaml).unwrap();
    assert!(set.errors.is_empty(), "parse errors: {:?}", set.errors);
    let mut engine = Engine::with_config(config);
    engine.add_collection(&set).unwrap();
    engine
}

pub fn process(yaml: &str, tx_json: Value) -> ProcessResult {
    let engine = engine_from_yaml(yaml);
    let mut tx = Transaction::from_value("test-tx", &tx_json);
    engine.process(&mut tx)
}

pub fn rule_ids(result: &ProcessResult) -> Vec<&str> {
    result.messages.iter().map(|m| m.rule_id.as_str()).collect()
}
