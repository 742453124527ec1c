//! Reportal CLI - inspect and run report definitions
//!
//! Usage:
//!   reportal compose <definitions.json> --report <id> --variant <id> [--filter k=v]...
//!   reportal policy <definitions.json> --report <id> [--role r]... [--caseload c]...
//!   reportal run <definitions.json> --report <id> --variant <id> [--page n] [--size n]
//!
//! Examples:
//!   reportal compose defs.json -r external-movements -v last-month -f direction=in
//!   reportal policy defs.json -r external-movements --role ROLE_PRISONS --caseload LEI
//!   reportal run defs.json -r external-movements -v last-month --config reportal.toml

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reportal::config::Settings;
use reportal::definition::{DefinitionStore, InMemoryDefinitionStore, ReportDefinition};
use reportal::execution::{Page, ReportRequest, SyncExecutionService};
use reportal::filter::validate_and_map;
use reportal::policy::{evaluate, CallerContext};
use reportal::query::{resolve_sort, QueryComposer};
use reportal::Dialect;

#[derive(Parser)]
#[command(name = "reportal")]
#[command(about = "Reportal - declarative reports over data-warehouse backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the layered SQL for a report variant
    Compose {
        #[command(flatten)]
        report: ReportArgs,

        #[command(flatten)]
        caller: CallerArgs,

        /// SQL dialect to generate
        #[arg(short, long, default_value = "redshift")]
        dialect: Dialect,

        /// Wrap the query in CREATE TABLE AS for this result schema
        #[arg(long)]
        schema: Option<String>,
    },

    /// Print the evaluated policy predicate for a caller
    Policy {
        /// Path to the definitions JSON file
        file: PathBuf,

        /// Report id
        #[arg(short, long)]
        report: String,

        #[command(flatten)]
        caller: CallerArgs,
    },

    /// Execute a report synchronously and print JSON rows
    Run {
        #[command(flatten)]
        report: ReportArgs,

        #[command(flatten)]
        caller: CallerArgs,

        /// Settings file (defaults to the usual search locations)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = 20)]
        size: u64,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Path to the definitions JSON file
    file: PathBuf,

    /// Report id
    #[arg(short, long)]
    report: String,

    /// Variant id
    #[arg(short, long)]
    variant: String,

    /// Filter as key=value; repeat for several
    #[arg(short, long = "filter", value_parser = parse_key_val)]
    filters: Vec<(String, String)>,

    /// Sort column
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,
}

impl ReportArgs {
    fn request(&self) -> ReportRequest {
        let mut request = ReportRequest::new(&self.report, &self.variant);
        request.filters = self.filters.iter().cloned().collect::<HashMap<_, _>>();
        if let Some(column) = &self.sort {
            request = request.sorted_by(column, !self.desc);
        }
        request
    }
}

#[derive(Args)]
struct CallerArgs {
    /// Caller username, recorded in logs
    #[arg(long = "user")]
    username: Option<String>,

    /// Caller role; repeat for several
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Active caseload; repeat for several
    #[arg(long = "caseload")]
    caseloads: Vec<String>,

    /// Caller presents a token
    #[arg(long)]
    token: bool,

    /// Evaluate without a caller
    #[arg(long)]
    anonymous: bool,
}

impl CallerArgs {
    fn context(&self) -> Option<CallerContext> {
        if self.anonymous {
            return None;
        }
        Some(CallerContext {
            username: self.username.clone(),
            roles: self.roles.clone(),
            active_caseloads: self.caseloads.clone(),
            has_token: self.token,
        })
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid filter '{}': expected key=value", s))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compose {
            report,
            caller,
            dialect,
            schema,
        } => cmd_compose(report, caller, dialect, schema).await,
        Commands::Policy {
            file,
            report,
            caller,
        } => cmd_policy(file, report, caller).await,
        Commands::Run {
            report,
            caller,
            config,
            page,
            size,
        } => cmd_run(report, caller, config, Page::new(page, size)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn load_definition(
    file: &PathBuf,
    report_id: &str,
) -> Result<(Arc<InMemoryDefinitionStore>, Arc<ReportDefinition>), String> {
    let store = InMemoryDefinitionStore::from_file(file)
        .map_err(|e| format!("reading '{}': {}", file.display(), e))?;
    let definition = store
        .report_definition(report_id)
        .await
        .ok_or_else(|| format!("report '{}' not found in '{}'", report_id, file.display()))?;
    Ok((Arc::new(store), definition))
}

async fn cmd_compose(
    args: ReportArgs,
    caller: CallerArgs,
    dialect: Dialect,
    schema: Option<String>,
) -> Result<(), String> {
    let (_, definition) = load_definition(&args.file, &args.report).await?;
    let report = definition
        .resolve(&args.variant)
        .ok_or_else(|| format!("variant '{}' not found", args.variant))?;

    let request = args.request();
    let filters = validate_and_map(report, &request.filters, None, None).map_err(|e| e.to_string())?;
    let sort = resolve_sort(report, request.sort_column.as_deref(), request.sorted_asc)
        .map_err(|e| e.to_string())?;
    let policy = evaluate(&definition.policies, caller.context().as_ref());

    let composer = QueryComposer::new(dialect, schema.clone().unwrap_or_default());
    let select = composer.layered_query(&definition.dataset.query, &policy, &filters, sort.as_ref());
    match schema {
        Some(_) => {
            let table_id = reportal::query::generate_table_id();
            println!("{}", composer.create_result_table(&table_id, &select));
        }
        None => println!("{}", select),
    }
    Ok(())
}

async fn cmd_policy(file: PathBuf, report_id: String, caller: CallerArgs) -> Result<(), String> {
    let (_, definition) = load_definition(&file, &report_id).await?;
    let policy = evaluate(&definition.policies, caller.context().as_ref());
    println!("{}", policy);
    Ok(())
}

async fn cmd_run(
    args: ReportArgs,
    caller: CallerArgs,
    config: Option<PathBuf>,
    page: Page,
) -> Result<(), String> {
    let settings = match &config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| e.to_string())?;

    let (store, _) = load_definition(&args.file, &args.report).await?;
    let service = SyncExecutionService::from_settings(store, &settings)
        .await
        .map_err(|e| e.to_string())?;

    let rows = service
        .execute(&args.request(), page, caller.context().as_ref())
        .await
        .map_err(|e| format!("{} ({})", e, e.reason()))?;

    let json = serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
