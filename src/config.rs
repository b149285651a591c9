//! Configuration handling for sheetform.
//! The rule table that drives value resolution ships with the binary
//! (`default_config.yaml`); a user supplied JSON or YAML file is merged over it.

use crate::constants::DEFAULT_CONFIG;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project fields the typed project record reads.
pub const PROJECT_FIELDS: [&str; 15] = [
    "project_name",
    "application_name",
    "environment",
    "location",
    "subscription",
    "spn",
    "app_owner",
    "business_owner",
    "service_now_ticket",
    "app_tier",
    "admin_username",
    "key_vault_sku",
    "soft_delete_retention_days",
    "public_network_access",
    "subnet_prefix",
];

/// Fields the typed virtual machine record reads.
pub const VM_FIELDS: [&str; 11] = [
    "name",
    "size",
    "image",
    "os_disk_size",
    "os_disk_type",
    "data_disks",
    "ip_allocation",
    "zone",
    "role",
    "patch_optin",
    "snow_item",
];

/// Fields the typed security rule record reads.
pub const RULE_FIELDS: [&str; 10] = [
    "name",
    "priority",
    "direction",
    "access",
    "protocol",
    "source_port_range",
    "destination_ports",
    "source_name",
    "destination_name",
    "description",
];

/// How a table stores the value of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// The field is a column; its header contains one of the keywords.
    #[default]
    Header,
    /// The field is a row; its first cell contains one of the keywords.
    RowLabel,
}

/// Resolution rule for one semantic field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    /// Label texts that identify the field in key-value pairs
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Substrings matched against table headers (or row labels)
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Sheet to search first; every sheet when absent
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    /// Distance from the label column to the value column
    #[serde(default)]
    pub column_offset: i32,
    /// Whether exact key-value pairs are consulted. Defaults to `true` for
    /// project fields and `false` for repeating entity fields.
    #[serde(default)]
    pub key_value: Option<bool>,
    /// Per-field globs rejected in addition to the global denylist
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Regular expression a value must match to be accepted
    #[serde(default)]
    pub pattern: Option<String>,
    /// Fallback value; may contain MiniJinja expressions
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Rules for a repeating entity read from one table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRule {
    pub sheet: String,
    /// Header substrings identifying the entity table
    pub table_keywords: Vec<String>,
    /// Rows with fewer non-empty cells are not entities
    #[serde(default = "default_min_populated_cells")]
    pub min_populated_cells: usize,
    pub fields: IndexMap<String, FieldRule>,
}

fn default_min_populated_cells() -> usize {
    2
}

/// Terraform module and provider pinning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformSettings {
    pub module_source: String,
    pub module_version: String,
    pub required_version: String,
    pub azurerm_version: String,
}

/// Complete configuration for one run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub required_sheets: Vec<String>,
    #[serde(default)]
    pub optional_sheets: Vec<String>,
    pub header_max_len: usize,
    #[serde(default)]
    pub label_vocabulary: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
    pub terraform: TerraformSettings,
    #[serde(default)]
    pub common_tags: IndexMap<String, String>,
    pub project: IndexMap<String, FieldRule>,
    pub virtual_machines: EntityRule,
    pub security_rules: EntityRule,
    /// Directory of `<target>.j2` files overriding the built-in templates
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

/// Parses configuration content, trying JSON first and YAML second.
///
/// # Arguments
/// * `content` - Raw configuration text
///
/// # Returns
/// * `Result<serde_json::Value>` - The document as a JSON value
///
/// # Errors
/// * `Error::ConfigError` if the content is neither JSON nor YAML
pub fn parse_config(content: &str) -> Result<serde_json::Value> {
    match serde_json::from_str(content) {
        Ok(v) => Ok(v),
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration format: {e}"))),
    }
}

/// Recursively merges `overlay` into `base`.
/// Objects merge key by key; any other value replaces the base value.
pub fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, value) in overlay_obj {
                match base_obj.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_obj.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// Builds a configuration from the built-in defaults and an optional overlay document.
    pub fn from_overlay(overlay: Option<&str>) -> Result<Self> {
        let mut value = parse_config(DEFAULT_CONFIG)?;
        if let Some(content) = overlay {
            merge_values(&mut value, parse_config(content)?);
        }

        let config: Config = serde_json::from_value(value)
            .map_err(|e| Error::ConfigError(format!("Invalid schema: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field the typed entities read has a rule.
    pub fn validate(&self) -> Result<()> {
        let groups: [(&str, &IndexMap<String, FieldRule>, &[&str]); 3] = [
            ("project", &self.project, &PROJECT_FIELDS),
            ("virtual_machines", &self.virtual_machines.fields, &VM_FIELDS),
            ("security_rules", &self.security_rules.fields, &RULE_FIELDS),
        ];

        for (group, rules, expected) in groups {
            for field in expected {
                if !rules.contains_key(*field) {
                    return Err(Error::ConfigError(format!(
                        "missing rule for '{group}.{field}'"
                    )));
                }
            }
        }

        for entity in [&self.virtual_machines, &self.security_rules] {
            if entity.table_keywords.is_empty() {
                return Err(Error::ConfigError(format!(
                    "entity table on sheet '{}' has no table_keywords",
                    entity.sheet
                )));
            }
        }
        Ok(())
    }
}

/// Loads the run configuration, merging the file at `path` over the built-in defaults.
///
/// # Arguments
/// * `path` - Optional path to a JSON or YAML configuration file
///
/// # Errors
/// * `Error::ConfigError` if the file is missing, malformed or incomplete
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config> {
    let overlay = match path {
        Some(path) => {
            let path = path.as_ref();
            if !path.is_file() {
                return Err(Error::ConfigError(format!(
                    "Invalid configuration path: {}",
                    path.display()
                )));
            }
            debug!("Loading configuration from {}", path.display());
            Some(std::fs::read_to_string(path).map_err(Error::IoError)?)
        }
        None => None,
    };

    Config::from_overlay(overlay.as_deref())
}
