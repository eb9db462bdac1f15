use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use objectquel::{Config, MemoryAdapter, Params, SchemaMetadata, Value};
use objectquel::query::prepare;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser)]
#[command(name = "objectquel", version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL for a statement
    Compile(QueryArgs),
    /// Print the execution plan for a statement
    Explain(QueryArgs),
    /// Evaluate a statement; only JSON ranges produce rows
    Run(QueryArgs),
    /// Interactive shell
    Repl(SessionArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
struct SessionArgs {
    /// Entity schema (JSON, `{"entities": [...]}`)
    #[arg(long)]
    schema: PathBuf,

    /// Session configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser)]
struct QueryArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// ObjectQuel statement
    #[arg(long, conflicts_with = "file")]
    query: Option<String>,

    /// Read the statement from a file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Parameters as a JSON object (e.g. '{\"min\":10}')
    #[arg(long)]
    params_json: Option<String>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub(crate) struct Session {
    pub schema: SchemaMetadata,
    pub config: Config,
}

impl SessionArgs {
    fn load(&self) -> Result<Session> {
        let text = std::fs::read_to_string(&self.schema)
            .with_context(|| format!("failed to read schema {}", self.schema.display()))?;
        let schema = SchemaMetadata::from_json_str(&text)
            .with_context(|| format!("invalid schema {}", self.schema.display()))?;
        let config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        Ok(Session {
            schema,
            config: config.with_env_overrides(),
        })
    }
}

pub(crate) fn parse_params_json(raw: Option<&str>) -> Result<Params> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Params::new());
    };
    let parsed: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).context("params must be a JSON object")?;
    Ok(parsed
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect())
}

fn read_query(args: &QueryArgs) -> Result<String> {
    if let Some(query) = args.query.as_ref() {
        return Ok(query.clone());
    }
    let Some(path) = args.file.as_ref() else {
        bail!("either --query or --file is required");
    };
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read query file {}", path.display()))
}

fn compile(args: QueryArgs) -> Result<()> {
    let session = args.session.load()?;
    let source = read_query(&args)?;
    let params = parse_params_json(args.params_json.as_deref())?;
    let query = prepare(&source, &session.schema, &session.config.query_options())?;
    let compiled = query.sql(&params)?;

    let mut stdout = std::io::stdout().lock();
    match args.format {
        OutputFormat::Text => writeln!(stdout, "{}", compiled.sql)?,
        OutputFormat::Json => {
            let out = serde_json::json!({ "sql": compiled.sql, "params": compiled.params });
            serde_json::to_writer_pretty(&mut stdout, &out)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn explain(args: QueryArgs) -> Result<()> {
    let session = args.session.load()?;
    let source = read_query(&args)?;
    let query = prepare(&source, &session.schema, &session.config.query_options())?;
    print!("{}", query.explain()?);
    Ok(())
}

fn run(args: QueryArgs) -> Result<()> {
    let session = args.session.load()?;
    let source = read_query(&args)?;
    let params = parse_params_json(args.params_json.as_deref())?;
    let query = prepare(&source, &session.schema, &session.config.query_options())?;
    let rows = query.execute(&mut MemoryAdapter::new(), &params)?;

    let mut stdout = std::io::stdout().lock();
    for row in &rows {
        serde_json::to_writer(&mut stdout, row)?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compile(args) => compile(args),
        Commands::Explain(args) => explain(args),
        Commands::Run(args) => run(args),
        Commands::Repl(args) => args.load().and_then(|session| repl::run_repl(&session)),
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_json_becomes_params() {
        let params = parse_params_json(Some(r#"{"min": 10, "name": "tea"}"#)).unwrap();
        assert_eq!(params.get("min"), Some(&Value::Int(10)));
        assert_eq!(params.get("name"), Some(&Value::from("tea")));
        assert!(parse_params_json(Some("  ")).unwrap().is_empty());
        assert!(parse_params_json(Some("[1]")).is_err());
    }
}
