//! Typed entity records assembled from resolved fields.
//! Conversion from text to numbers, lists and flags happens here, once; the
//! records are handed to the renderer unchanged.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::constants::{FALLBACK_RESOURCE_NAME, MAX_RESOURCE_NAME_LEN};
use crate::diagnostics::{DiagnosticKind, Summary};
use crate::error::{Error, Result};
use crate::resolver::KeyValueEntry;

/// OS disk size used when the sheet value has no digits.
pub const DEFAULT_OS_DISK_SIZE_GB: u32 = 128;

/// Key vault retention used when the sheet value has no digits.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

/// Lowest and highest priority a network security rule may carry.
pub const RULE_PRIORITY_RANGE: (u32, u32) = (100, 4096);

/// Resolved fields of one entity, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedFields {
    entries: IndexMap<String, KeyValueEntry>,
}

impl ResolvedFields {
    pub fn insert(&mut self, entry: KeyValueEntry) {
        self.entries.insert(entry.semantic_key.clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&KeyValueEntry> {
        self.entries.get(key)
    }

    /// Value of a field; empty when the field is absent or unresolved.
    pub fn text(&self, key: &str) -> &str {
        self.entries.get(key).map(KeyValueEntry::text).unwrap_or_default()
    }

    /// Field values as a flat JSON object for templated defaults.
    pub fn context(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let value = match &entry.value {
                    Some(v) => serde_json::Value::String(v.clone()),
                    None => serde_json::Value::Null,
                };
                (key.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Normalizes a resource name: lower case, spaces and underscores become
/// hyphens, anything outside `[a-z0-9-]` is dropped, hyphen runs collapse,
/// edge hyphens are trimmed and the result is capped at 60 characters.
pub fn normalize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        let ch = if ch == ' ' || ch == '_' { '-' } else { ch };
        match ch {
            'a'..='z' | '0'..='9' => name.push(ch),
            '-' if !name.is_empty() && !name.ends_with('-') => name.push('-'),
            _ => {}
        }
    }

    let mut name: String = name.chars().take(MAX_RESOURCE_NAME_LEN).collect();
    while name.ends_with('-') {
        name.pop();
    }

    if name.is_empty() {
        FALLBACK_RESOURCE_NAME.to_string()
    } else {
        name
    }
}

/// Hands out unique names within one entity kind.
#[derive(Debug, Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    /// Claims `name`, or the first free `name-2`, `name-3`, ... when taken.
    /// Returns the assigned name and whether it differs from the request.
    pub fn claim(&mut self, name: &str) -> (String, bool) {
        if self.taken.insert(name.to_string()) {
            return (name.to_string(), false);
        }

        let mut n = 2;
        loop {
            let suffix = format!("-{n}");
            let room = MAX_RESOURCE_NAME_LEN.saturating_sub(suffix.len());
            let base: String = name.chars().take(room).collect();
            let candidate = format!("{}{}", base.trim_end_matches('-'), suffix);
            if self.taken.insert(candidate.clone()) {
                return (candidate, true);
            }
            n += 1;
        }
    }
}

/// First run of digits in `text`, e.g. `128` from `"128 GB"`.
pub fn parse_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Splits on commas, semicolons and whitespace.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "enabled" => Some(true),
        "0" | "false" | "no" | "n" | "disabled" => Some(false),
        _ => None,
    }
}

/// Converts with `parse`, recording an `Unparsable` diagnostic and using
/// `fallback` when the text is present but cannot be read.
fn convert<T: ToString>(
    summary: &mut Summary,
    entity: &str,
    field: &str,
    text: &str,
    parse: impl Fn(&str) -> Option<T>,
    fallback: T,
) -> T {
    if let Some(value) = parse(text) {
        return value;
    }
    if !text.trim().is_empty() {
        summary.record(
            entity,
            Some(field),
            DiagnosticKind::Unparsable { value: text.to_string(), fallback: fallback.to_string() },
        );
    }
    fallback
}

fn require(entity: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::RenderError {
            entity: entity.to_string(),
            reason: format!("required field '{field}' is empty"),
        });
    }
    Ok(())
}

/// Operating system family of a VM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    Windows,
    Linux,
}

impl OsType {
    /// Detects the family from an image description; Windows when unknown.
    pub fn detect(image: &str) -> Self {
        let image = image.to_lowercase();
        if image.contains("win") {
            return OsType::Windows;
        }
        let linux = ["linux", "ubuntu", "rhel", "red hat", "centos", "debian", "suse"];
        if linux.iter().any(|l| image.contains(l)) {
            OsType::Linux
        } else {
            OsType::Windows
        }
    }

    /// Marketplace image used by the base-vm module.
    pub fn image_urn(&self) -> &'static str {
        match self {
            OsType::Windows => "MicrosoftWindowsServer:WindowsServer:2022-datacenter-g2:latest",
            OsType::Linux => "Canonical:0001-com-ubuntu-server-jammy:22_04-lts-gen2:latest",
        }
    }
}

/// Project-wide settings, one per workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSpec {
    pub project_name: String,
    pub application_name: String,
    pub environment: String,
    pub location: String,
    pub subscription: String,
    pub spn: String,
    pub app_owner: String,
    pub business_owner: String,
    pub service_now_ticket: String,
    pub app_tier: String,
    pub admin_username: String,
    pub key_vault_sku: String,
    pub soft_delete_retention_days: u32,
    pub public_network_access: bool,
    pub subnet_prefix: String,
}

impl ProjectSpec {
    pub const ENTITY: &'static str = "project";

    pub fn from_fields(fields: &ResolvedFields, summary: &mut Summary) -> Self {
        let entity = Self::ENTITY;
        let text = |key: &str| fields.text(key).to_string();

        Self {
            soft_delete_retention_days: convert(
                summary,
                entity,
                "soft_delete_retention_days",
                fields.text("soft_delete_retention_days"),
                parse_number,
                DEFAULT_RETENTION_DAYS,
            ),
            public_network_access: convert(
                summary,
                entity,
                "public_network_access",
                fields.text("public_network_access"),
                parse_bool,
                true,
            ),
            project_name: text("project_name"),
            application_name: text("application_name"),
            environment: text("environment"),
            location: text("location"),
            subscription: text("subscription"),
            spn: text("spn"),
            app_owner: text("app_owner"),
            business_owner: text("business_owner"),
            service_now_ticket: text("service_now_ticket"),
            app_tier: text("app_tier"),
            admin_username: text("admin_username"),
            key_vault_sku: text("key_vault_sku"),
            subnet_prefix: text("subnet_prefix"),
        }
    }

    /// # Errors
    /// * `Error::RenderError` when a field every file depends on is empty
    pub fn validate(&self) -> Result<()> {
        require(Self::ENTITY, "project_name", &self.project_name)?;
        require(Self::ENTITY, "application_name", &self.application_name)?;
        require(Self::ENTITY, "location", &self.location)?;
        require(Self::ENTITY, "spn", &self.spn)
    }
}

/// One virtual machine row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMachineSpec {
    /// 1-based position among the VM rows
    pub index: usize,
    pub name: String,
    pub size: String,
    pub image: String,
    pub os_type: OsType,
    pub image_urn: String,
    pub os_disk_size_gb: u32,
    pub os_disk_type: String,
    pub data_disk_sizes_gb: Vec<u32>,
    pub ip_allocation: String,
    /// Empty when the VM is not pinned to a zone
    pub zone: String,
    pub role: String,
    pub patch_optin: String,
    pub snow_item: String,
}

impl VirtualMachineSpec {
    /// Diagnostic label of the VM at a 1-based index.
    pub fn label(index: usize) -> String {
        format!("virtual_machines[{index}]")
    }

    pub fn from_fields(fields: &ResolvedFields, index: usize, summary: &mut Summary) -> Self {
        let entity = Self::label(index);
        let image = fields.text("image").to_string();
        let os_type = OsType::detect(&image);

        let mut data_disk_sizes_gb = Vec::new();
        // Sizes may carry units ("50 GB"), so only commas and semicolons separate disks.
        let disks = fields.text("data_disks").split([',', ';']).map(str::trim);
        for disk in disks.filter(|d| !d.is_empty()) {
            match parse_number(disk) {
                Some(size) if size > 0 => data_disk_sizes_gb.push(size),
                _ => summary.record(
                    &entity,
                    Some("data_disks"),
                    DiagnosticKind::Unparsable { value: disk.to_string(), fallback: "skipped".into() },
                ),
            }
        }

        Self {
            index,
            name: normalize_name(fields.text("name")),
            size: fields.text("size").to_string(),
            os_type,
            image_urn: os_type.image_urn().to_string(),
            image,
            os_disk_size_gb: convert(
                summary,
                &entity,
                "os_disk_size",
                fields.text("os_disk_size"),
                parse_number,
                DEFAULT_OS_DISK_SIZE_GB,
            ),
            os_disk_type: fields.text("os_disk_type").to_string(),
            data_disk_sizes_gb,
            ip_allocation: fields.text("ip_allocation").to_string(),
            zone: fields.text("zone").to_string(),
            role: fields.text("role").to_string(),
            patch_optin: fields.text("patch_optin").to_string(),
            snow_item: fields.text("snow_item").to_string(),
        }
    }

    /// # Errors
    /// * `Error::RenderError` naming the first empty required field
    pub fn validate(&self) -> Result<()> {
        let entity = Self::label(self.index);
        require(&entity, "name", &self.name)?;
        require(&entity, "size", &self.size)?;
        require(&entity, "image", &self.image)?;
        if self.os_disk_size_gb == 0 {
            return Err(Error::RenderError { entity, reason: "OS disk size is zero".into() });
        }
        Ok(())
    }
}

/// One network security rule row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityRuleSpec {
    /// 1-based position among the rule rows
    pub index: usize,
    pub name: String,
    pub priority: u32,
    pub direction: String,
    pub access: String,
    pub protocol: String,
    pub source_port_range: String,
    pub destination_ports: Vec<String>,
    pub source_name: String,
    pub destination_name: String,
    pub description: String,
}

impl SecurityRuleSpec {
    pub fn label(index: usize) -> String {
        format!("security_rules[{index}]")
    }

    pub fn from_fields(fields: &ResolvedFields, index: usize, summary: &mut Summary) -> Self {
        let entity = Self::label(index);
        // 100, 110, 120, ... capped at the highest valid priority.
        let fallback_priority = u32::try_from(index.saturating_sub(1))
            .ok()
            .and_then(|i| i.checked_mul(10))
            .and_then(|step| step.checked_add(RULE_PRIORITY_RANGE.0))
            .map_or(RULE_PRIORITY_RANGE.1, |p| p.min(RULE_PRIORITY_RANGE.1));

        Self {
            index,
            name: normalize_name(fields.text("name")),
            priority: convert(
                summary,
                &entity,
                "priority",
                fields.text("priority"),
                parse_number,
                fallback_priority,
            ),
            direction: fields.text("direction").to_string(),
            access: fields.text("access").to_string(),
            protocol: fields.text("protocol").to_string(),
            source_port_range: fields.text("source_port_range").to_string(),
            destination_ports: parse_list(fields.text("destination_ports")),
            source_name: fields.text("source_name").to_string(),
            destination_name: fields.text("destination_name").to_string(),
            description: fields.text("description").to_string(),
        }
    }

    /// # Errors
    /// * `Error::RenderError` for an empty name, no destination ports or an
    ///   out-of-range priority
    pub fn validate(&self) -> Result<()> {
        let entity = Self::label(self.index);
        require(&entity, "name", &self.name)?;
        if self.destination_ports.is_empty() {
            return Err(Error::RenderError { entity, reason: "no destination ports".into() });
        }
        let (low, high) = RULE_PRIORITY_RANGE;
        if !(low..=high).contains(&self.priority) {
            return Err(Error::RenderError {
                entity,
                reason: format!("priority {} outside {low}-{high}", self.priority),
            });
        }
        Ok(())
    }
}
