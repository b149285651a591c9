//! Common constants used throughout sheetform.

/// Default directory for generated packages
pub const DEFAULT_OUTPUT_DIR: &str = "output_package";

/// Default glob used to pick workbooks in batch mode
pub const DEFAULT_FILE_PATTERN: &str = "*.xls*";

/// Prefix of lock files that spreadsheet editors leave next to open workbooks
pub const LOCK_FILE_PREFIX: &str = "~$";

/// Prefix of the value substituted for required fields that could not be resolved
pub const PLACEHOLDER_PREFIX: &str = "UNRESOLVED_";

/// Name used when a resource name normalizes to nothing
pub const FALLBACK_RESOURCE_NAME: &str = "default-resource";

/// Longest resource name the target cloud accepts
pub const MAX_RESOURCE_NAME_LEN: usize = 60;

/// Longest directory name produced for batch outputs
pub const MAX_DIRECTORY_NAME_LEN: usize = 50;

/// Built-in rule table and defaults
pub const DEFAULT_CONFIG: &str = include_str!("default_config.yaml");

/// Directory name used when a workbook stem sanitizes to nothing
pub const FALLBACK_DIRECTORY_NAME: &str = "unknown";
