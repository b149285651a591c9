//! Compiled rule table.
//! Turns the configuration's field rules into matchers the resolver can apply
//! directly: lower-cased keywords, normalized synonyms, compiled denylist globs
//! and value patterns.

use std::collections::HashSet;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use regex::Regex;

use crate::cache::{normalize_key, CacheOptions};
use crate::config::{Config, EntityRule, FieldRule, Layout};
use crate::error::{Error, Result};

/// Builds a case-insensitive glob set from denylist patterns.
///
/// # Errors
/// * `Error::ConfigError` if a pattern is not a valid glob
pub fn build_denylist<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .map_err(|e| Error::ConfigError(format!("invalid denylist pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::ConfigError(format!("denylist loading failed: {e}")))
}

/// A field rule ready for resolution.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    /// Semantic key, e.g. `location`
    pub key: String,
    /// Normalized key-value labels, the semantic key first
    pub synonyms: Vec<String>,
    /// Lower-cased header keywords
    pub keywords: Vec<String>,
    pub sheet: Option<String>,
    pub layout: Layout,
    pub column_offset: i32,
    pub key_value: bool,
    pub denylist: GlobSet,
    pub pattern: Option<Regex>,
    pub default: Option<String>,
    pub required: bool,
}

impl FieldMatcher {
    /// Compiles one rule. `key_value_default` applies when the rule leaves
    /// `key_value` unset.
    pub fn compile(key: &str, rule: &FieldRule, key_value_default: bool) -> Result<Self> {
        let mut synonyms = vec![normalize_key(&key.replace('_', " "))];
        for synonym in &rule.synonyms {
            let synonym = normalize_key(synonym);
            if !synonym.is_empty() && !synonyms.contains(&synonym) {
                synonyms.push(synonym);
            }
        }

        let pattern = rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::ConfigError(format!("invalid pattern for '{key}': {e}")))?;

        Ok(Self {
            key: key.to_string(),
            synonyms,
            keywords: rule.keywords.iter().map(|k| k.trim().to_lowercase()).collect(),
            sheet: rule.sheet.clone(),
            layout: rule.layout,
            column_offset: rule.column_offset,
            key_value: rule.key_value.unwrap_or(key_value_default),
            denylist: build_denylist(&rule.denylist)?,
            pattern,
            default: rule.default.clone(),
            required: rule.required,
        })
    }

    /// True when a header or row label names this field.
    pub fn matches_label(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

fn compile_fields(
    fields: &IndexMap<String, FieldRule>,
    key_value_default: bool,
) -> Result<Vec<FieldMatcher>> {
    fields
        .iter()
        .map(|(key, rule)| FieldMatcher::compile(key, rule, key_value_default))
        .collect()
}

/// Matchers for a repeating entity.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    pub sheet: String,
    pub table_keywords: Vec<String>,
    pub min_populated_cells: usize,
    pub fields: Vec<FieldMatcher>,
}

impl EntityMatcher {
    pub fn compile(rule: &EntityRule) -> Result<Self> {
        Ok(Self {
            sheet: rule.sheet.clone(),
            table_keywords: rule.table_keywords.iter().map(|k| k.trim().to_lowercase()).collect(),
            min_populated_cells: rule.min_populated_cells.max(1),
            fields: compile_fields(&rule.fields, false)?,
        })
    }
}

/// The whole rule table, compiled.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub denylist: GlobSet,
    pub project: Vec<FieldMatcher>,
    pub virtual_machines: EntityMatcher,
    pub security_rules: EntityMatcher,
    header_max_len: usize,
    label_vocabulary: Vec<String>,
}

impl RuleSet {
    /// Compiles every rule of the configuration.
    ///
    /// # Errors
    /// * `Error::ConfigError` on invalid globs or regular expressions
    pub fn compile(config: &Config) -> Result<Self> {
        Ok(Self {
            denylist: build_denylist(&config.denylist)?,
            project: compile_fields(&config.project, true)?,
            virtual_machines: EntityMatcher::compile(&config.virtual_machines)?,
            security_rules: EntityMatcher::compile(&config.security_rules)?,
            header_max_len: config.header_max_len,
            label_vocabulary: config.label_vocabulary.clone(),
        })
    }

    /// Cache options whose vocabulary holds every label the rules can look up.
    pub fn cache_options(&self) -> CacheOptions {
        let fields = self
            .project
            .iter()
            .chain(&self.virtual_machines.fields)
            .chain(&self.security_rules.fields);

        let mut vocabulary: HashSet<String> = fields
            .filter(|f| f.key_value)
            .flat_map(|f| f.synonyms.iter().cloned())
            .collect();
        vocabulary.extend(self.label_vocabulary.iter().map(|l| normalize_key(l)));

        CacheOptions { header_max_len: self.header_max_len, vocabulary }
    }
}
