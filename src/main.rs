use clap::{Parser as ClapParser, Subcommand};
use std::io::{self, Read};
use xql_lang::cli::{self, CliError, RunOptions, RunOutcome};

#[derive(ClapParser)]
#[command(name = "xql")]
#[command(about = "xql - A SQL-like query language for searching XML documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query against the files named in its FROM clause
    Query {
        /// The query to execute (reads from stdin if not provided)
        query: Option<String>,

        /// Output format: table, json, csv, or html
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Warn about field paths that match more than one document path
        #[arg(short, long)]
        verbose: bool,

        /// Disable multi-threaded file processing
        #[arg(long)]
        sequential: bool,

        /// Cap the number of worker threads
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Validate query syntax without executing
    Check {
        /// The query to validate (reads from stdin if not provided)
        query: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Query {
            query,
            format,
            verbose,
            sequential,
            threads,
        } => run_query(query, format, verbose, sequential, threads),
        Commands::Check { query } => run_check(query),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// Take the query from the argument, or from stdin when piped.
fn read_query(arg: Option<String>) -> Result<String, CliError> {
    match arg {
        Some(query) => Ok(query),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(CliError::Io)?;
            let query = buffer.trim().to_string();
            if query.is_empty() {
                Err(CliError::NoQuery)
            } else {
                Ok(query)
            }
        }
        None => Err(CliError::NoQuery),
    }
}

fn run_query(
    query: Option<String>,
    format: String,
    verbose: bool,
    sequential: bool,
    threads: Option<usize>,
) -> Result<(), CliError> {
    let options = RunOptions {
        query: read_query(query)?,
        format,
        verbose,
        sequential,
        threads,
        syntax_only: false,
    };

    match cli::execute_run(&options)? {
        RunOutcome::SyntaxValid => println!("Syntax is valid"),
        RunOutcome::Rendered { output, advisories } => {
            for advisory in advisories {
                eprintln!("warning: {}", advisory);
            }
            print!("{}", output);
        }
    }
    Ok(())
}

fn run_check(query: Option<String>) -> Result<(), CliError> {
    let options = RunOptions {
        query: read_query(query)?,
        syntax_only: true,
        ..RunOptions::default()
    };

    if let RunOutcome::SyntaxValid = cli::execute_run(&options)? {
        println!("Syntax is valid");
    }
    Ok(())
}
