use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tablesage_core::{Config, ErrorResponse, Orchestrator, PipelineError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tablesage")]
#[command(about = "Upload CSV or PDF tables and ask questions about them")]
struct Cli {
    /// JSON config file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for stored uploads (temporary when unset)
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Maximum upload size in bytes
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Number of sample rows shown to the model
    #[arg(long)]
    sample_rows: Option<usize>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Python model as module:Class.method (requires the python feature)
    #[arg(long)]
    python_model: Option<String>,

    /// Log filter, e.g. "info" or "tablesage_core=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let base = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        let mut config = base.with_overrides(|key| std::env::var(key).ok())?;

        if let Some(dir) = &self.upload_dir {
            config.upload_dir = Some(dir.clone());
        }
        if let Some(limit) = self.max_upload_bytes {
            config.max_upload_bytes = limit;
        }
        if let Some(rows) = self.sample_rows {
            config.sample_rows = rows;
        }
        if let Some(model) = &self.model {
            config.model_name = model.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    tracing::debug!(
        max_upload_bytes = config.max_upload_bytes,
        sample_rows = config.sample_rows,
        model = %config.model_name,
        "configuration loaded"
    );

    println!("TableSage v{}", env!("CARGO_PKG_VERSION"));
    println!("Initializing...\n");

    let orchestrator = build_orchestrator(config, cli.python_model.as_deref())?;

    print_help();

    loop {
        print!("tablesage> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command.to_ascii_lowercase().as_str() {
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "help" => print_help(),
            "list" => print_json(&orchestrator.list_datasets()),
            "upload" => {
                if rest.is_empty() {
                    eprintln!("Usage: upload <path>");
                    continue;
                }
                let path = PathBuf::from(rest);
                let bytes = match std::fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        eprintln!("Cannot read {}: {}", path.display(), e);
                        continue;
                    }
                };
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match orchestrator.upload(&bytes, &filename) {
                    Ok(response) => print_json(&response),
                    Err(e) => print_error(&e),
                }
            }
            "ask" => match rest.split_once(char::is_whitespace) {
                Some((id, question)) => {
                    println!("Translating: '{}'", question.trim());
                    match orchestrator.analyze_dataset(id, question) {
                        Ok(response) => print_json(&response),
                        Err(e) => print_error(&e),
                    }
                }
                None => eprintln!("Usage: ask <id> <question>"),
            },
            "sql" => match rest.split_once(char::is_whitespace) {
                Some((id, query)) => match orchestrator.run_sql(id, query) {
                    Ok(rows) => print_json(&rows.records()),
                    Err(e) => print_error(&e),
                },
                None => eprintln!("Usage: sql <id> <query>"),
            },
            other => eprintln!("Unknown command '{}'. Type 'help' for a list of commands.", other),
        }
    }

    Ok(())
}

#[cfg(feature = "python")]
fn build_orchestrator(config: Config, python_model: Option<&str>) -> anyhow::Result<Orchestrator> {
    use std::sync::Arc;
    use tablesage_core::{PyPdfTextExtractor, PythonModel, TabulaExtractor};

    let mut builder = Orchestrator::builder(config)
        .table_extractor(Arc::new(TabulaExtractor))
        .text_extractor(Arc::new(PyPdfTextExtractor));

    if let Some(spec) = python_model {
        let (module, target) = spec
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("--python-model must look like module:Class.method"))?;
        let (class, method) = target
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("--python-model must look like module:Class.method"))?;
        tablesage_core::bridge::add_search_path(&std::env::current_dir()?)?;
        builder = builder.model(Arc::new(PythonModel::new(module, class, method)?));
        println!("Python model {} enabled", spec);
    }

    println!("PDF extraction enabled");
    Ok(builder.build()?)
}

#[cfg(not(feature = "python"))]
fn build_orchestrator(config: Config, python_model: Option<&str>) -> anyhow::Result<Orchestrator> {
    if python_model.is_some() {
        anyhow::bail!("--python-model requires building with the python feature");
    }
    println!("Warning: PDF extraction not available (built without the python feature)");
    Ok(Orchestrator::from_config(config)?)
}

fn print_help() {
    println!("Ready. Commands:");
    println!("  - upload <path>          Upload a CSV or PDF file");
    println!("  - list                   List uploaded datasets");
    println!("  - ask <id> <question>    Ask a question about a dataset");
    println!("  - sql <id> <query>       Run SQL directly against a dataset (table: dataset)");
    println!("  - help                   Show this message");
    println!("  - exit | quit            Leave the shell\n");
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render result: {}", e),
    }
}

fn print_error(err: &PipelineError) {
    let response = ErrorResponse::from(err);
    eprintln!("Error {} ({:?}): {}", err.status_code(), response.kind, response.message);
    if let PipelineError::QueryExecution { query, .. } = err {
        eprintln!("Query: {}", query);
    }
}
