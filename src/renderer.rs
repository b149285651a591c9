//! Template rendering for sheetform.
//! Turns an assembled workbook into the files of a deployment package. The
//! renderer performs no lookups and applies no defaults: everything it prints
//! comes from the assembly or the Terraform settings of the configuration.

use std::path::PathBuf;

use indexmap::IndexMap;
use log::debug;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::assembler::Assembly;
use crate::config::{Config, TerraformSettings};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::entity::{normalize_name, ProjectSpec, SecurityRuleSpec, VirtualMachineSpec};
use crate::error::{Error, Result};
use crate::template::TemplateSet;

/// Trait for template rendering engines.
pub trait TemplateRenderer {
    /// Renders a template string with the given context.
    ///
    /// # Arguments
    /// * `template` - Template string to render
    /// * `context` - Context variables for rendering
    ///
    /// # Returns
    /// * `Result<String>` - Rendered template string
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String>;

    /// Renders a template string, naming it in any error.
    fn render_named(
        &self,
        name: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<String> {
        self.render(template, context)
            .map_err(|e| Error::TemplateError(format!("'{name}': {e}")))
    }
}

/// Escapes a value for use inside a double-quoted HCL string.
pub fn hcl_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "$${")
        .replace("%{", "%%{")
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Creates the environment used for defaults and package templates:
    /// undefined values are errors, block tags do not leave blank lines and
    /// files keep their final newline.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_filter("hcl", |value: String| hcl_escape(&value));
        env.add_filter("slug", |value: String| normalize_name(&value));
        Self { env }
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    /// Renders a template string using MiniJinja.
    ///
    /// # Errors
    /// * `Error::MinijinjaError` on syntax errors, undefined values or failing filters
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        self.env.render_str(template, context).map_err(Error::MinijinjaError)
    }
}

/// A file of the deployment package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Path relative to the package root
    pub path: PathBuf,
    pub content: String,
    pub executable: bool,
}

/// Rendered files plus the entities left out of them.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub files: Vec<RenderedFile>,
    pub failures: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct Counts {
    virtual_machines: usize,
    security_rules: usize,
}

#[derive(Serialize)]
struct PackageContext<'a> {
    project: &'a ProjectSpec,
    virtual_machines: Vec<&'a VirtualMachineSpec>,
    security_rules: Vec<&'a SecurityRuleSpec>,
    terraform: &'a TerraformSettings,
    common_tags: &'a IndexMap<String, String>,
    counts: Counts,
}

/// Keeps the entities that pass `validate` and reports the rest.
fn partition<'a, T>(
    entities: &'a [T],
    validate: impl Fn(&T) -> Result<()>,
    failures: &mut Vec<Diagnostic>,
) -> Vec<&'a T> {
    entities
        .iter()
        .filter(|entity| match validate(entity) {
            Ok(()) => true,
            Err(Error::RenderError { entity, reason }) => {
                failures.push(Diagnostic {
                    entity,
                    field: None,
                    kind: DiagnosticKind::RenderFailure { reason },
                });
                false
            }
            Err(e) => {
                failures.push(Diagnostic {
                    entity: "package".to_string(),
                    field: None,
                    kind: DiagnosticKind::RenderFailure { reason: e.to_string() },
                });
                false
            }
        })
        .collect()
}

/// Renders every template of the set against an assembly.
///
/// Entities that fail validation are excluded and reported in
/// [`RenderOutput::failures`]; the remaining ones are rendered.
///
/// # Errors
/// * `Error::RenderError` if the project record itself is unusable
/// * `Error::TemplateError` if a template does not render
pub fn render_package(
    engine: &dyn TemplateRenderer,
    assembly: &Assembly,
    config: &Config,
    templates: &TemplateSet,
) -> Result<RenderOutput> {
    assembly.project.validate()?;

    let mut failures = Vec::new();
    let virtual_machines =
        partition(&assembly.virtual_machines, VirtualMachineSpec::validate, &mut failures);
    let security_rules =
        partition(&assembly.security_rules, SecurityRuleSpec::validate, &mut failures);

    let context = PackageContext {
        project: &assembly.project,
        counts: Counts {
            virtual_machines: virtual_machines.len(),
            security_rules: security_rules.len(),
        },
        virtual_machines,
        security_rules,
        terraform: &config.terraform,
        common_tags: &config.common_tags,
    };
    let context = serde_json::to_value(&context)
        .map_err(|e| Error::TemplateError(format!("cannot build context: {e}")))?;

    let mut files = Vec::new();
    for (target, source) in templates.iter() {
        debug!("Rendering {target}");
        let content = engine.render_named(target, source, &context)?;
        files.push(RenderedFile {
            path: PathBuf::from(target),
            executable: target.ends_with(".sh"),
            content,
        });
    }

    Ok(RenderOutput { files, failures })
}
