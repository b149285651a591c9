use std::fs;

use sheetform::config::{load_config, merge_values, parse_config, Config, Layout};
use sheetform::error::Error;
use sheetform::rules::RuleSet;
use tempfile::TempDir;

#[test]
fn test_builtin_config_is_valid() {
    let config = Config::from_overlay(None).unwrap();

    assert_eq!(config.required_sheets, vec!["Build_ENV", "Resources", "NSG"]);
    assert_eq!(config.virtual_machines.sheet, "Resources");
    assert_eq!(config.project["location"].layout, Layout::RowLabel);
    assert_eq!(config.project["location"].column_offset, 2);
    assert!(config.templates_dir.is_none());
    RuleSet::compile(&config).unwrap();
}

#[test]
fn test_parse_config_json_and_yaml() {
    let json = parse_config(r#"{"header_max_len": 30}"#).unwrap();
    let yaml = parse_config("header_max_len: 30\n").unwrap();
    assert_eq!(json, yaml);
}

#[test]
fn test_merge_values_is_recursive() {
    let mut base = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
    merge_values(&mut base, serde_json::json!({"a": {"c": [3]}, "e": true}));

    assert_eq!(base, serde_json::json!({"a": {"b": 1, "c": [3]}, "d": "x", "e": true}));
}

#[test]
fn test_overlay_changes_one_field() {
    let overlay = r#"
project:
  location:
    column_offset: 1
virtual_machines:
  min_populated_cells: 3
"#;
    let config = Config::from_overlay(Some(overlay)).unwrap();

    let location = &config.project["location"];
    assert_eq!(location.column_offset, 1);
    assert_eq!(location.sheet.as_deref(), Some("Build_ENV"));
    assert_eq!(config.virtual_machines.min_populated_cells, 3);
    assert_eq!(config.virtual_machines.table_keywords, vec!["hostname", "vm name", "server name"]);
}

#[test]
fn test_overlay_adds_field_order_after_defaults() {
    let overlay = r#"{"project": {"cost_center": {"synonyms": ["cost center"], "default": "6500"}}}"#;
    let config = Config::from_overlay(Some(overlay)).unwrap();

    assert_eq!(config.project.keys().last().map(String::as_str), Some("cost_center"));
}

#[test]
fn test_unknown_rule_key_is_rejected() {
    let overlay = "project:\n  location:\n    colum_offset: 1\n";
    let result = Config::from_overlay(Some(overlay));
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[test]
fn test_removed_typed_field_is_rejected() {
    let mut value = serde_json::to_value(Config::from_overlay(None).unwrap()).unwrap();
    value["security_rules"]["fields"].as_object_mut().unwrap().remove("priority");
    let config: Config = serde_json::from_value(value).unwrap();

    match config.validate() {
        Err(Error::ConfigError(message)) => assert!(message.contains("security_rules.priority")),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_invalid_pattern_is_a_config_error() {
    let overlay = "virtual_machines:\n  fields:\n    size:\n      pattern: \"(unclosed\"\n";
    let config = Config::from_overlay(Some(overlay)).unwrap();
    assert!(matches!(RuleSet::compile(&config), Err(Error::ConfigError(_))));
}

#[test]
fn test_load_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.yaml");
    fs::write(&path, "header_max_len: 64\ncommon_tags:\n  cost-center: \"6500\"\n").unwrap();

    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.header_max_len, 64);
    assert_eq!(config.common_tags["cost-center"], "6500");
    assert_eq!(config.common_tags["managed-by"], "Terraform");
}

#[test]
fn test_load_config_missing_file() {
    let result = load_config(Some("/nonexistent/rules.yaml"));
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[test]
fn test_load_config_without_file_uses_defaults() {
    let config = load_config::<&str>(None).unwrap();
    assert_eq!(config.header_max_len, 48);
}
