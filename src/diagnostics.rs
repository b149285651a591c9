//! Run diagnostics and the end-of-run summary.

use std::fmt;

use log::warn;
use serde::Serialize;

/// What happened to a field or entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A required field took its fallback default
    Defaulted { value: String },
    /// A required field had neither a source value nor a default
    Placeholder { value: String },
    /// A value could not be converted; the fallback was used
    Unparsable { value: String, fallback: String },
    NameCollision { original: String, assigned: String },
    RenderFailure { reason: String },
}

/// A diagnostic record about one entity, optionally one of its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub entity: String,
    pub field: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.field {
            Some(field) => format!("{}.{}", self.entity, field),
            None => self.entity.clone(),
        };
        match &self.kind {
            DiagnosticKind::Defaulted { value } => {
                write!(f, "{target}: not found in workbook, defaulted to '{value}'")
            }
            DiagnosticKind::Placeholder { value } => {
                write!(f, "{target}: not found and no default, using placeholder '{value}'")
            }
            DiagnosticKind::Unparsable { value, fallback } => {
                write!(f, "{target}: cannot interpret '{value}', using '{fallback}'")
            }
            DiagnosticKind::NameCollision { original, assigned } => {
                write!(f, "{target}: name '{original}' already used, renamed to '{assigned}'")
            }
            DiagnosticKind::RenderFailure { reason } => {
                write!(f, "{target}: not rendered, {reason}")
            }
        }
    }
}

/// Counts and diagnostics collected over one workbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub virtual_machines: usize,
    pub security_rules: usize,
    /// Fields whose value came from the workbook
    pub resolved_fields: usize,
    /// Fields that fell back to a default or placeholder
    pub defaulted_fields: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Summary {
    /// Records a diagnostic and logs it as a warning.
    pub fn record(&mut self, entity: &str, field: Option<&str>, kind: DiagnosticKind) {
        let diagnostic = Diagnostic {
            entity: entity.to_string(),
            field: field.map(str::to_string),
            kind,
        };
        warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    fn count(&self, pred: impl Fn(&DiagnosticKind) -> bool) -> usize {
        self.diagnostics.iter().filter(|d| pred(&d.kind)).count()
    }

    pub fn defaulted_required(&self) -> usize {
        self.count(|k| matches!(k, DiagnosticKind::Defaulted { .. }))
    }

    pub fn placeholders(&self) -> usize {
        self.count(|k| matches!(k, DiagnosticKind::Placeholder { .. }))
    }

    pub fn collisions(&self) -> usize {
        self.count(|k| matches!(k, DiagnosticKind::NameCollision { .. }))
    }

    pub fn render_failures(&self) -> usize {
        self.count(|k| matches!(k, DiagnosticKind::RenderFailure { .. }))
    }

    /// Diagnostics recorded for one field of one entity.
    pub fn for_field<'s>(
        &'s self,
        entity: &'s str,
        field: &'s str,
    ) -> impl Iterator<Item = &'s Diagnostic> + 's {
        self.diagnostics
            .iter()
            .filter(move |d| d.entity == entity && d.field.as_deref() == Some(field))
    }

    /// True when every field came from the workbook and nothing failed.
    pub fn is_fully_resolved(&self) -> bool {
        self.defaulted_fields == 0 && self.diagnostics.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Entities: 1 project, {} virtual machines, {} security rules",
            self.virtual_machines, self.security_rules
        )?;
        writeln!(
            f,
            "Fields: {} resolved from workbook, {} defaulted ({} required defaulted, {} placeholders)",
            self.resolved_fields,
            self.defaulted_fields,
            self.defaulted_required(),
            self.placeholders()
        )?;
        writeln!(f, "Name collisions: {}", self.collisions())?;
        write!(f, "Render failures: {}", self.render_failures())
    }
}
