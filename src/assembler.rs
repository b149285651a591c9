//! Entity assembly.
//! Builds the project record and one record per populated row of each entity
//! table. Templated defaults are rendered here, required shortfalls become
//! placeholders, and names are made unique within each entity kind.

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::json;

use crate::cache::TableRegion;
use crate::constants::PLACEHOLDER_PREFIX;
use crate::diagnostics::{DiagnosticKind, Summary};
use crate::entity::{NameRegistry, ProjectSpec, ResolvedFields, SecurityRuleSpec, VirtualMachineSpec};
use crate::error::{Error, Result};
use crate::renderer::TemplateRenderer;
use crate::resolver::{Resolver, RowBinding};
use crate::rules::{EntityMatcher, FieldMatcher, RuleSet};

/// Everything resolved from one workbook.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub project: ProjectSpec,
    pub virtual_machines: Vec<VirtualMachineSpec>,
    pub security_rules: Vec<SecurityRuleSpec>,
    /// Resolved fields per entity label, with their sources
    pub fields: IndexMap<String, ResolvedFields>,
    pub summary: Summary,
}

/// Value substituted for a required field that has nothing to fall back on.
pub fn placeholder(field: &str) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, field.to_uppercase())
}

fn is_templated(text: &str) -> bool {
    text.contains("{{") || text.contains("{%")
}

/// Assembles typed entities from a resolver and the compiled rules.
pub struct Assembler<'a> {
    resolver: &'a Resolver<'a>,
    rules: &'a RuleSet,
    engine: &'a dyn TemplateRenderer,
}

impl<'a> Assembler<'a> {
    pub fn new(resolver: &'a Resolver<'a>, rules: &'a RuleSet, engine: &'a dyn TemplateRenderer) -> Self {
        Self { resolver, rules, engine }
    }

    /// Resolves and converts every entity of the workbook.
    ///
    /// # Errors
    /// * `Error::ConfigError` if a templated default does not render
    pub fn assemble(&self) -> Result<Assembly> {
        let mut summary = Summary::default();

        let project_fields = self.resolve_fields(
            &self.rules.project,
            None,
            ProjectSpec::ENTITY,
            |fields| json!({ "project": fields.context() }),
            &mut summary,
        )?;
        let project = ProjectSpec::from_fields(&project_fields, &mut summary);
        let project_context = project_fields.context();
        let mut resolved = IndexMap::new();
        resolved.insert(ProjectSpec::ENTITY.to_string(), project_fields);

        let mut virtual_machines = Vec::new();
        let mut names = NameRegistry::default();
        for (index, fields) in self
            .resolve_rows(&self.rules.virtual_machines, &project_context, VirtualMachineSpec::label, &mut summary)?
            .into_iter()
            .enumerate()
        {
            let index = index + 1;
            let mut vm = VirtualMachineSpec::from_fields(&fields, index, &mut summary);
            let label = VirtualMachineSpec::label(index);
            vm.name = claim_name(&mut names, &vm.name, &label, &mut summary);
            resolved.insert(label, fields);
            virtual_machines.push(vm);
        }

        let mut security_rules = Vec::new();
        let mut names = NameRegistry::default();
        for (index, fields) in self
            .resolve_rows(&self.rules.security_rules, &project_context, SecurityRuleSpec::label, &mut summary)?
            .into_iter()
            .enumerate()
        {
            let index = index + 1;
            let mut rule = SecurityRuleSpec::from_fields(&fields, index, &mut summary);
            let label = SecurityRuleSpec::label(index);
            rule.name = claim_name(&mut names, &rule.name, &label, &mut summary);
            resolved.insert(label, fields);
            security_rules.push(rule);
        }

        summary.virtual_machines = virtual_machines.len();
        summary.security_rules = security_rules.len();
        debug!(
            "Assembled {} virtual machines and {} security rules",
            summary.virtual_machines, summary.security_rules
        );

        Ok(Assembly { project, virtual_machines, security_rules, fields: resolved, summary })
    }

    /// The entity's table: the first region of its sheet whose headers
    /// contain a table keyword.
    pub fn entity_table(&self, entity: &EntityMatcher) -> Option<&'a TableRegion> {
        self.resolver
            .cache()
            .tables_in_sheet(&entity.sheet)
            .iter()
            .find(|region| region.has_header_matching(&entity.table_keywords))
    }

    /// Data rows of the entity table with enough populated cells.
    pub fn entity_rows(&self, entity: &EntityMatcher) -> Vec<RowBinding<'a>> {
        let Some(region) = self.entity_table(entity) else {
            warn!("No table matching {:?} on sheet '{}'", entity.table_keywords, entity.sheet);
            return Vec::new();
        };

        let cache = self.resolver.cache();
        region
            .data_rows()
            .filter(|&row| {
                let populated = region
                    .columns()
                    .filter(|&col| cache.cell(&region.sheet, row, col).is_some_and(|c| !c.is_empty()))
                    .count();
                populated >= entity.min_populated_cells
            })
            .map(|row| RowBinding { region, row })
            .collect()
    }

    fn resolve_rows(
        &self,
        entity: &EntityMatcher,
        project_context: &serde_json::Value,
        label: fn(usize) -> String,
        summary: &mut Summary,
    ) -> Result<Vec<ResolvedFields>> {
        let rows = self.entity_rows(entity);
        debug!("{} populated rows on sheet '{}'", rows.len(), entity.sheet);

        rows.into_iter()
            .enumerate()
            .map(|(index0, binding)| {
                self.resolve_fields(
                    &entity.fields,
                    Some(binding),
                    &label(index0 + 1),
                    |fields| {
                        json!({
                            "project": project_context,
                            "row": fields.context(),
                            "index": index0 + 1,
                            "index0": index0,
                        })
                    },
                    summary,
                )
            })
            .collect()
    }

    /// Resolves fields in rule order. `context` builds the templating context
    /// for defaults from the fields resolved so far.
    fn resolve_fields(
        &self,
        matchers: &[FieldMatcher],
        binding: Option<RowBinding<'_>>,
        entity: &str,
        context: impl Fn(&ResolvedFields) -> serde_json::Value,
        summary: &mut Summary,
    ) -> Result<ResolvedFields> {
        let mut fields = ResolvedFields::default();

        for field in matchers {
            let fallback = match &field.default {
                Some(default) => Some(self.render_default(field, default, &context(&fields))?),
                None => None,
            }
            .filter(|value| !value.trim().is_empty());

            let mut entry = self.resolver.resolve(field, binding, fallback.as_deref());
            if entry.is_defaulted() {
                summary.defaulted_fields += 1;
                if field.required {
                    match &entry.value {
                        Some(value) => summary.record(
                            entity,
                            Some(&field.key),
                            DiagnosticKind::Defaulted { value: value.clone() },
                        ),
                        None => {
                            let value = placeholder(&field.key);
                            summary.record(
                                entity,
                                Some(&field.key),
                                DiagnosticKind::Placeholder { value: value.clone() },
                            );
                            entry.value = Some(value);
                        }
                    }
                }
            } else {
                summary.resolved_fields += 1;
                debug!(
                    "{}.{} = '{}' ({:?}{})",
                    entity,
                    field.key,
                    entry.text(),
                    entry.confidence,
                    entry.source.as_ref().map(|s| format!(" at {s}")).unwrap_or_default()
                );
            }
            fields.insert(entry);
        }

        Ok(fields)
    }

    fn render_default(
        &self,
        field: &FieldMatcher,
        default: &str,
        context: &serde_json::Value,
    ) -> Result<String> {
        if !is_templated(default) {
            return Ok(default.to_string());
        }
        self.engine
            .render(default, context)
            .map(|value| value.trim().to_string())
            .map_err(|e| Error::ConfigError(format!("default of '{}' does not render: {e}", field.key)))
    }
}

fn claim_name(names: &mut NameRegistry, name: &str, entity: &str, summary: &mut Summary) -> String {
    let (assigned, collided) = names.claim(name);
    if collided {
        summary.record(
            entity,
            Some("name"),
            DiagnosticKind::NameCollision { original: name.to_string(), assigned: assigned.clone() },
        );
    }
    assigned
}
