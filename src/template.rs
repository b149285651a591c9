//! Package templates.
//! The built-in templates are compiled into the binary. A directory of
//! `<target>.j2` files may replace or extend them.

use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extension marking a file as a template.
const TEMPLATE_SUFFIX: &str = ".j2";

const BUILTIN: [(&str, &str); 12] = [
    ("main.tf", include_str!("../templates/main.tf.j2")),
    ("variables.tf", include_str!("../templates/variables.tf.j2")),
    ("terraform.tfvars", include_str!("../templates/terraform.tfvars.j2")),
    ("outputs.tf", include_str!("../templates/outputs.tf.j2")),
    ("versions.tf", include_str!("../templates/versions.tf.j2")),
    ("data.tf", include_str!("../templates/data.tf.j2")),
    ("locals.tf", include_str!("../templates/locals.tf.j2")),
    ("scripts/deploy.sh", include_str!("../templates/scripts/deploy.sh.j2")),
    ("scripts/destroy.sh", include_str!("../templates/scripts/destroy.sh.j2")),
    ("scripts/validate.sh", include_str!("../templates/scripts/validate.sh.j2")),
    ("README.md", include_str!("../templates/README.md.j2")),
    (".gitignore", include_str!("../templates/gitignore.j2")),
];

/// Checks whether a file name carries a target name plus the `.j2` suffix.
///
/// `main.tf.j2` and `.gitignore.j2` qualify, a bare `.j2` does not.
pub fn is_template_path(filename: &str) -> bool {
    filename.strip_suffix(TEMPLATE_SUFFIX).is_some_and(|target| !target.is_empty())
}

/// Ordered map of package path → template source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    templates: IndexMap<String, String>,
}

impl TemplateSet {
    /// The templates shipped with sheetform.
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|(target, source)| (target.to_string(), source.to_string()))
            .collect();
        Self { templates }
    }

    /// Replaces or adds templates from `<target>.j2` files under `dir`.
    /// The target is the file's path relative to `dir` without the suffix.
    ///
    /// # Errors
    /// * `Error::TemplateError` if `dir` is not a directory or cannot be walked
    /// * `Error::IoError` if a template file cannot be read
    pub fn with_overrides<P: AsRef<Path>>(mut self, dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::TemplateError(format!(
                "template directory '{}' does not exist",
                dir.display()
            )));
        }

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::TemplateError(e.to_string()))?;
            let path = entry.path();
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !entry.file_type().is_file() || !is_template_path(filename) {
                continue;
            }

            let relative = path
                .strip_prefix(dir)
                .map_err(|e| Error::TemplateError(e.to_string()))?;
            let target = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let target = target.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&target).to_string();

            let source = std::fs::read_to_string(path).map_err(Error::IoError)?;
            debug!("Template override for '{}' from {}", target, path.display());
            self.templates.insert(target, source);
        }
        Ok(self)
    }

    /// Targets and sources in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates.iter().map(|(t, s)| (t.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
