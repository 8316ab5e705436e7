use clearquote::api::{LiveServices, ServiceBuilder};
use clearquote::config::{ConfigStore, DEFAULT_CONFIG_PATH};
use clearquote::schema::{SchemaContext, SchemaHandle};
use clearquote::validator::{SqlValidator, ValidationVerdict};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clearquote")]
#[command(about = "Ask questions about vehicle damages, repairs and quotes in plain language")]
#[command(version)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Schema description to use instead of the built-in one
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a question through the full pipeline
    Ask {
        /// The question in natural language
        question: String,

        /// Print the result rows as JSON
        #[arg(long)]
        rows: bool,
    },
    /// Check a SQL statement against the validator without running it
    Validate {
        /// The SQL to check
        sql: String,
    },
    /// Print the schema context handed to the SQL generator
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let schema = match &args.schema {
        Some(path) => SchemaContext::from_json_file(path)?,
        None => SchemaContext::describe(),
    };

    match args.command {
        Commands::Ask { question, rows } => {
            let config = ConfigStore::load(&args.config)?;
            let handle = Arc::new(SchemaHandle::new(schema));
            let services = LiveServices.build(&config.snapshot(), handle, None)?;
            let run = services.pipeline.run(question.trim()).await;

            println!("Stage:         {}", run.stage.as_str());
            if let Some(sql) = &run.validated_sql {
                println!("SQL:           {}", sql);
            } else if let Some(sql) = &run.generated_sql {
                println!("Generated SQL: {}", sql);
            }
            println!("Rows:          {}", run.row_count);
            if let Some(answer) = &run.answer {
                println!("\n{}", answer);
            }
            if rows {
                if let Some(rows) = &run.rows {
                    println!("\n{}", serde_json::to_string_pretty(&rows.to_json_rows())?);
                }
            }
            if let Some(reason) = run.error {
                if reason.is_validation() {
                    bail!("Generated SQL was rejected: {} ({})", reason.summary(), reason);
                }
                if !run.is_completed() {
                    bail!("{} ({})", reason.summary(), reason);
                }
                eprintln!("Note: {}", reason.summary());
            }
        }
        Commands::Validate { sql } => match SqlValidator::new().validate(&sql, &schema) {
            ValidationVerdict::Accepted(statement) => {
                println!("ACCEPTED");
                println!("Normalized: {}", statement.normalized());
                let tables: Vec<&str> = statement.referenced_tables().iter().map(String::as_str).collect();
                println!("Tables:     {}", tables.join(", "));
            }
            ValidationVerdict::Rejected(rejection) => {
                println!("REJECTED: {}", rejection.reason);
                println!("Fragment: {}", rejection.fragment);
                std::process::exit(2);
            }
        },
        Commands::Schema => {
            println!("{}", schema.prompt_context());
        }
    }

    Ok(())
}
