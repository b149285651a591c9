//! sheetform turns infrastructure workbooks into Terraform deployment packages.
//! Values are located in free-form label/value cells and in table regions,
//! validated against a rule table, defaulted where missing and rendered
//! through MiniJinja templates.

/// Entity assembly: project, virtual machines and security rules
pub mod assembler;

/// Raw data cache built once per workbook
/// Holds the key-value index and the detected table regions
pub mod cache;

/// Command-line interface module for the sheetform application
pub mod cli;

/// Configuration handling for sheetform
/// Supports JSON and YAML overlays merged over the built-in rule table
pub mod config;

/// Common constants
pub mod constants;

/// Diagnostics and the end-of-run summary
pub mod diagnostics;

/// Writes rendered packages to disk
pub mod emitter;

/// Typed entity records and value conversion
pub mod entity;

/// Error types and handling for the sheetform application
pub mod error;

/// Logger initialization
pub mod logger;

/// Single-file and batch orchestration
pub mod pipeline;

/// Template rendering of deployment packages
pub mod renderer;

/// Value resolution: key-value pairs, then table inference, then defaults
pub mod resolver;

/// Compiled field rules
pub mod rules;

/// Built-in and overriding package templates
pub mod template;

/// Spreadsheet access through calamine
pub mod workbook;
