//! CLI support for xql
//!
//! Provides programmatic access to the query/check commands for embedding
//! in other tools; `src/main.rs` is a thin argument-parsing shell over this.

mod run;

pub use run::{execute_run, RunOptions, RunOutcome};

use std::io;

/// Errors that can occur during CLI operations
#[derive(Debug)]
pub enum CliError {
    /// Query text did not parse
    Parse(crate::parser::ParseError),
    /// IO error
    Io(io::Error),
    /// No query provided on the command line or stdin
    NoQuery,
    /// Unknown output format name
    UnknownFormat(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Parse(e) => write!(f, "Parse error: {}", e),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::NoQuery => write!(f, "No query provided (pass one as an argument or pipe it in)"),
            CliError::UnknownFormat(name) => {
                write!(f, "Unknown output format '{}'; expected table, json, csv, or html", name)
            }
        }
    }
}

impl std::error::Error for CliError {}
