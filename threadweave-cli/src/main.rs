use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod error;
mod policy;
mod redact;
mod schema;

use error::CliError;
use policy::run_policy_command;
use redact::run_redact;
use schema::run_schema_command;

#[derive(Parser, Debug)]
#[command(name = "threadweave", version)]
#[command(about = "Threadweave CLI - tool permissions, secret redaction and structured output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and evaluate permission policies
    Policy {
        #[command(subcommand)]
        policy_command: PolicyCommands,
    },
    /// Redact secrets from a file or stdin
    Redact {
        /// Treat the input as JSON and redact sensitive fields too
        #[arg(long)]
        json: bool,
        /// Placeholder for redacted values
        #[arg(long)]
        replacement: Option<String>,
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },
    /// Validate structured output against a JSON schema
    Schema {
        #[command(subcommand)]
        schema_command: SchemaCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Evaluate a tool invocation and print the decision as JSON
    Check {
        /// Tool name
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// Policy file (TOML, or JSON with a .json extension)
        #[arg(long, conflicts_with = "preset")]
        policy: Option<PathBuf>,
        /// Built-in preset (default, strict, permissive)
        #[arg(long, default_value = "default")]
        preset: String,
    },
    /// Print a built-in preset as TOML
    Show {
        #[arg(long, default_value = "default")]
        preset: String,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCommands {
    /// Validate a JSON document, optionally repairing it
    Validate {
        /// JSON schema file
        #[arg(long)]
        schema: PathBuf,
        /// JSON data file
        #[arg(long)]
        data: PathBuf,
        /// Print a repaired document when validation fails
        #[arg(long)]
        repair: bool,
    },
}

fn main() {
    // Initialize JSON logging once.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Policy { policy_command } => run_policy_command(policy_command),
        Commands::Redact {
            json,
            replacement,
            file,
        } => run_redact(json, replacement, file.as_deref()),
        Commands::Schema { schema_command } => run_schema_command(schema_command),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, code = e.code(), "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
