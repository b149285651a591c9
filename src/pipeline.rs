//! Run orchestration.
//! One workbook goes through open → cache → resolve → assemble → render →
//! write. A directory of workbooks is a plain loop over the same steps.

use std::fs;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use indexmap::IndexMap;
use log::{debug, error, info};
use serde::Serialize;
use walkdir::WalkDir;

use crate::assembler::{Assembler, Assembly};
use crate::cache::RawDataCache;
use crate::cli::Args;
use crate::config::{load_config, Config};
use crate::constants::{FALLBACK_DIRECTORY_NAME, LOCK_FILE_PREFIX, MAX_DIRECTORY_NAME_LEN};
use crate::diagnostics::Summary;
use crate::entity::ResolvedFields;
use crate::emitter::{ensure_output_dir, write_files};
use crate::error::{Error, Result};
use crate::renderer::{render_package, MiniJinjaRenderer, RenderOutput};
use crate::resolver::Resolver;
use crate::rules::RuleSet;
use crate::template::TemplateSet;
use crate::workbook::Workbook;

/// Outcome of one workbook.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    /// Package-relative paths, written or (in a dry run) due to be written
    pub files: Vec<PathBuf>,
    pub summary: Summary,
    /// Every resolved field per entity, with confidence and source cell
    pub fields: IndexMap<String, ResolvedFields>,
}

/// A workbook that could not be converted.
#[derive(Debug, Clone, Serialize)]
pub struct FailedWorkbook {
    pub source: PathBuf,
    pub error: String,
}

/// Outcome of a run over one workbook or a directory of them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<FailedWorkbook>,
}

/// Writes the run report as pretty-printed JSON.
///
/// # Errors
/// * `Error::IoError` if the report cannot be serialized or written
pub fn write_report<P: AsRef<Path>>(path: P, report: &RunReport) -> Result<()> {
    let path = path.as_ref();
    let mut json = serde_json::to_string_pretty(report).map_err(|e| Error::IoError(e.into()))?;
    json.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(Error::IoError)?;
    }
    fs::write(path, json).map_err(Error::IoError)?;
    info!("Run report written to {}", path.display());
    Ok(())
}

/// Replaces characters outside `[A-Za-z0-9_-]` with `_`, collapses
/// underscore runs, trims them from the edges and caps the length at 50.
pub fn sanitize_directory_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' };
        if ch == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(ch);
    }

    let sanitized: String = sanitized.trim_matches('_').chars().take(MAX_DIRECTORY_NAME_LEN).collect();
    let sanitized = sanitized.trim_end_matches('_');
    if sanitized.is_empty() {
        FALLBACK_DIRECTORY_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

/// Lists the workbooks directly inside `dir` whose file name matches
/// `pattern`, skipping editor lock files, sorted by name.
///
/// # Errors
/// * `Error::ConfigError` if the pattern is not a valid glob
/// * `Error::NoInputFilesError` if nothing matches
pub fn discover_workbooks<P: AsRef<Path>>(dir: P, pattern: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let matcher = GlobBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::ConfigError(format!("invalid file pattern '{pattern}': {e}")))?
        .compile_matcher();

    let mut workbooks = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(LOCK_FILE_PREFIX) {
            debug!("Skipping lock file {name}");
            continue;
        }
        if matcher.is_match(name.as_ref()) {
            workbooks.push(entry.into_path());
        }
    }

    if workbooks.is_empty() {
        return Err(Error::NoInputFilesError {
            input_dir: dir.display().to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(workbooks)
}

/// Shared state of a run: configuration, compiled rules, templates and engine.
pub struct Pipeline {
    config: Config,
    rules: RuleSet,
    templates: TemplateSet,
    engine: MiniJinjaRenderer,
    force: bool,
    dry_run: bool,
}

impl Pipeline {
    /// Compiles the rules and loads the templates of a configuration.
    ///
    /// # Errors
    /// * `Error::ConfigError` on invalid rules
    /// * `Error::TemplateError` if the override directory is unusable
    pub fn new(config: Config, force: bool, dry_run: bool) -> Result<Self> {
        let rules = RuleSet::compile(&config)?;
        let templates = match &config.templates_dir {
            Some(dir) => TemplateSet::builtin().with_overrides(dir)?,
            None => TemplateSet::builtin(),
        };
        Ok(Self { config, rules, templates, engine: MiniJinjaRenderer::new(), force, dry_run })
    }

    /// Resolves, assembles and renders an opened workbook. Writes nothing.
    ///
    /// # Errors
    /// * `Error::MissingSheetError` if a required sheet is absent
    /// * `Error::RenderError` if the project record is unusable
    /// * `Error::TemplateError` if a template does not render
    pub fn render_workbook(&self, workbook: Workbook) -> Result<(Assembly, RenderOutput)> {
        workbook.require_sheets(&self.config.required_sheets)?;
        for sheet in &self.config.optional_sheets {
            if workbook.sheet(sheet).is_some() {
                debug!("Optional sheet '{sheet}' present");
            } else {
                debug!("Optional sheet '{sheet}' absent");
            }
        }

        let cache = RawDataCache::build(workbook, &self.rules.cache_options());
        let resolver = Resolver::new(&cache, &self.rules.denylist);
        let mut assembly = Assembler::new(&resolver, &self.rules, &self.engine).assemble()?;

        let output = render_package(&self.engine, &assembly, &self.config, &self.templates)?;
        for failure in &output.failures {
            assembly.summary.record(&failure.entity, failure.field.as_deref(), failure.kind.clone());
        }
        Ok((assembly, output))
    }

    /// Converts one workbook file into a package under `output_dir`.
    ///
    /// # Errors
    /// * `Error::OutputDirectoryExistsError` if `output_dir` exists without `force`
    /// * `Error::WorkbookError` if the file cannot be read
    /// * Any error of [`Pipeline::render_workbook`] or of writing files
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output_dir: Q) -> Result<FileReport> {
        let input = input.as_ref();
        let output_dir = if self.dry_run {
            output_dir.as_ref().to_path_buf()
        } else {
            ensure_output_dir(output_dir, self.force)?
        };

        info!("Processing {}", input.display());
        let workbook = Workbook::open(input)?;
        let (assembly, output) = self.render_workbook(workbook)?;

        if !self.dry_run {
            write_files(&output_dir, &output.files)?;
        }

        Ok(FileReport {
            source: input.to_path_buf(),
            output_dir,
            files: output.files.into_iter().map(|f| f.path).collect(),
            summary: assembly.summary,
            fields: assembly.fields,
        })
    }

    /// Converts every matching workbook of `input_dir` into
    /// `output_root/<sanitized file stem>`. Failures are logged and counted.
    ///
    /// # Errors
    /// * `Error::NoInputFilesError` if nothing matches `pattern`
    /// * `Error::BatchError` if every workbook failed
    pub fn process_dir<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        output_root: Q,
        pattern: &str,
    ) -> Result<RunReport> {
        let workbooks = discover_workbooks(input_dir, pattern)?;
        let output_root = output_root.as_ref();
        debug!("Batch of {} workbooks", workbooks.len());

        let mut report = RunReport::default();
        for workbook in workbooks {
            let stem = workbook.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            let output_dir = output_root.join(sanitize_directory_name(&stem));
            match self.process_file(&workbook, &output_dir) {
                Ok(file_report) => report.succeeded.push(file_report),
                Err(e) => {
                    error!("{}: {}", workbook.display(), e);
                    report.failed.push(FailedWorkbook { source: workbook, error: e.to_string() });
                }
            }
        }

        if report.succeeded.is_empty() {
            return Err(Error::BatchError { total: report.failed.len() });
        }
        Ok(report)
    }

    fn print_report(&self, report: &FileReport) {
        if self.dry_run {
            println!(
                "Dry run for '{}': {} files would be written to {}.",
                report.source.display(),
                report.files.len(),
                report.output_dir.display()
            );
            for file in &report.files {
                println!("  {}", file.display());
            }
        } else {
            println!(
                "Package for '{}' written to {} ({} files).",
                report.source.display(),
                report.output_dir.display(),
                report.files.len()
            );
        }
        println!("{}", report.summary);
        if report.summary.is_fully_resolved() {
            println!("Every field was resolved from the workbook.");
        }
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Loads and validates the configuration
/// 2. Compiles rules and templates
/// 3. Processes the input file, or every workbook of the input directory
/// 4. Prints the summary of each workbook
/// 5. Writes the JSON run report when `--report` is given
pub fn run(args: &Args) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let pipeline = Pipeline::new(config, args.force, args.dry_run)?;

    let report = if args.input.is_dir() {
        let report = pipeline.process_dir(&args.input, &args.output_dir, &args.pattern)?;
        for file_report in &report.succeeded {
            pipeline.print_report(file_report);
        }
        println!(
            "Batch finished: {} succeeded, {} failed.",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    } else {
        let file_report = pipeline.process_file(&args.input, &args.output_dir)?;
        pipeline.print_report(&file_report);
        RunReport { succeeded: vec![file_report], failed: Vec::new() }
    };

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    Ok(())
}
