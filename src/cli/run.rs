//! Execute xql queries against XML files on disk.

use super::CliError;
use crate::executor::{Executor, ExecutorConfig};
use crate::output::{render, OutputFormat};
use crate::parser::parse;

/// Options for the query command
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The query to execute
    pub query: String,
    /// Output format name (table, json, csv, html)
    pub format: String,
    /// Emit ambiguity advisories for partial field paths
    pub verbose: bool,
    /// Force single-threaded execution
    pub sequential: bool,
    /// Override the worker-thread cap
    pub threads: Option<usize>,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            query: String::new(),
            format: "table".to_string(),
            verbose: false,
            sequential: false,
            threads: None,
            syntax_only: false,
        }
    }
}

/// Result of a run
#[derive(Debug)]
pub enum RunOutcome {
    /// Syntax validation passed
    SyntaxValid,
    /// Query executed; `advisories` is non-empty only in verbose mode
    Rendered {
        output: String,
        advisories: Vec<String>,
    },
}

/// Parse and (unless `syntax_only`) execute a query.
pub fn execute_run(options: &RunOptions) -> Result<RunOutcome, CliError> {
    let query = parse(&options.query).map_err(CliError::Parse)?;

    if options.syntax_only {
        return Ok(RunOutcome::SyntaxValid);
    }

    let format = OutputFormat::from_name(&options.format)
        .ok_or_else(|| CliError::UnknownFormat(options.format.clone()))?;

    let mut config = if options.sequential {
        ExecutorConfig::sequential()
    } else {
        ExecutorConfig::default()
    };
    if let Some(threads) = options.threads {
        config.max_threads = threads.max(1);
    }
    let executor = Executor::with_config(config);

    let advisories = if options.verbose {
        executor
            .check_ambiguous_fields(&query)
            .into_iter()
            .map(|field| {
                format!(
                    "field '{}' matches more than one document path; first match is used",
                    field
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    let rows = executor.execute(&query);
    Ok(RunOutcome::Rendered {
        output: render(&rows, format),
        advisories,
    })
}
