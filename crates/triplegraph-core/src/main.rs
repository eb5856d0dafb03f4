//! TripleGraph CLI - Load RDF statements into a property graph store
//!
//! Statements are read as JSON lines, one statement per line:
//!
//! ```text
//! {"subject":{"type":"iri","value":"http://ex.org/a"},"predicate":"http://ex.org/name","object":{"value":"Ann"}}
//! ```
//!
//! Commands:
//! - `load` - Add statements to the store
//! - `delete` - Remove statements from the store
//! - `preview` - Show what a load would produce, without writing
//! - `stats` - Show store counts
//! - `prefixes` - List persisted namespace prefixes
//! - `map` - Persist an IRI to name mapping for MAP mode
//! - `config` - Show or initialize configuration

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use triplegraph_config::{
    CommitSize, ConfigLoader, ConfigOverrides, LogFormat, LoggingConfig, MultivalMode,
    TripleGraphConfig, VocabUriMode,
};
use triplegraph_core::{
    preview, run, CommitPool, DeleteSummary, GraphStore, ImportSummary, SqliteGraphStore,
    Statement, StatementDeleter, StatementLoader,
};

/// TripleGraph - RDF statement streams as labeled property graphs
#[derive(Parser, Debug)]
#[command(name = "triplegraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file (skips global/local lookup)
    #[arg(long, short = 'c', global = true, env = "TRIPLEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Graph store database
    #[arg(long, short = 'd', global = true, env = "TRIPLEGRAPH_DATABASE")]
    database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

/// Import policy overrides shared by load, delete and preview
#[derive(Args, Debug, Clone, Default)]
struct PolicyOptions {
    /// IRI handling: SHORTEN, IGNORE, MAP or KEEP
    #[arg(long)]
    vocab_uris: Option<VocabUriMode>,

    /// Repeated properties: OVERWRITE or ARRAY
    #[arg(long)]
    multival: Option<MultivalMode>,

    /// Statements per transaction, or "unbounded"
    #[arg(long)]
    commit_size: Option<CommitSize>,

    /// Identity cache capacity
    #[arg(long)]
    node_cache_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add statements to the store
    Load {
        /// JSON-lines statement files ("-" for stdin)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Scope node identity by the statement graph
        #[arg(long)]
        quads: bool,

        #[command(flatten)]
        policy: PolicyOptions,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove statements from the store
    Delete {
        /// JSON-lines statement files ("-" for stdin)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        quads: bool,

        #[command(flatten)]
        policy: PolicyOptions,

        #[arg(long)]
        json: bool,
    },

    /// Show the graph a load would produce, without writing
    Preview {
        /// JSON-lines statement file ("-" for stdin)
        input: PathBuf,

        /// Only map the first N statements
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        policy: PolicyOptions,
    },

    /// Show store counts
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List persisted namespace prefixes
    Prefixes,

    /// Persist an IRI to name mapping used in MAP mode
    Map {
        iri: String,
        name: String,
    },

    /// View and initialize configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Create .triplegraph/config.toml in the current directory
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        database: cli.global.database.clone(),
        ..policy_of(&cli.command).to_overrides()
    };
    let config = load_config(&cli.global, &overrides)?;
    init_logging(&config.logging, &cli.global)?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Load {
            inputs,
            quads,
            json,
            ..
        } => cmd_load(&config, inputs, quads, json),
        Commands::Delete {
            inputs,
            quads,
            json,
            ..
        } => cmd_delete(&config, inputs, quads, json),
        Commands::Preview { input, limit, .. } => cmd_preview(&config, &input, limit),
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Prefixes => cmd_prefixes(&config),
        Commands::Map { iri, name } => cmd_map(&config, &iri, &name),
        Commands::Config(cmd) => cmd_config(&config, cmd),
    }
}

impl PolicyOptions {
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            handle_vocab_uris: self.vocab_uris,
            handle_multival: self.multival,
            commit_size: self.commit_size,
            node_cache_size: self.node_cache_size,
            ..Default::default()
        }
    }
}

fn policy_of(command: &Commands) -> PolicyOptions {
    match command {
        Commands::Load { policy, .. }
        | Commands::Delete { policy, .. }
        | Commands::Preview { policy, .. } => policy.clone(),
        _ => PolicyOptions::default(),
    }
}

fn load_config(global: &GlobalOptions, overrides: &ConfigOverrides) -> Result<TripleGraphConfig> {
    let loader = ConfigLoader::new();
    let config = match &global.config {
        Some(path) => loader.load_file(path, Some(overrides)),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let mut loader = loader;
            loader.load(&cwd, Some(overrides))
        }
    };
    config.context("Failed to load configuration")
}

fn init_logging(logging: &LoggingConfig, global: &GlobalOptions) -> Result<()> {
    let level = if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

/// Read JSON-lines statements; blank lines and `#` comments are skipped.
fn read_statements(path: &Path) -> Result<Vec<Statement>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        Box::new(BufReader::new(file))
    };

    let mut statements = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let statement = serde_json::from_str(trimmed)
            .with_context(|| format!("{}:{}: invalid statement", path.display(), index + 1))?;
        statements.push(statement);
    }
    Ok(statements)
}

fn open_store(config: &TripleGraphConfig) -> Result<SqliteGraphStore> {
    let path = &config.storage.database;
    SqliteGraphStore::open_or_create(path)
        .with_context(|| format!("Failed to open graph store {:?}", path))
}

fn load_one(config: &TripleGraphConfig, input: &Path, quads: bool) -> Result<ImportSummary> {
    let statements = read_statements(input)?;
    let store = open_store(config)?;
    let mut loader = if quads {
        StatementLoader::for_quads(store, &config.import)?
    } else {
        StatementLoader::new(store, &config.import)?
    };
    run(&mut loader, statements).map_err(|failure| {
        eprintln!(
            "Load of {:?} aborted after {} committed statements",
            input, failure.partial.triples_mapped
        );
        anyhow::Error::new(failure)
    })
}

/// Load inputs, each file on its own pool worker and store connection
fn cmd_load(config: &TripleGraphConfig, inputs: Vec<PathBuf>, quads: bool, json: bool) -> Result<()> {
    let start = Instant::now();

    let summaries = if inputs.len() == 1 {
        vec![(inputs[0].clone(), load_one(config, &inputs[0], quads)?)]
    } else {
        let pool = CommitPool::new();
        let handles = inputs
            .into_iter()
            .map(|input| {
                let config = config.clone();
                let job_input = input.clone();
                let handle = pool.submit(move || load_one(&config, &job_input, quads))?;
                Ok((input, handle))
            })
            .collect::<Result<Vec<_>>>()?;
        handles
            .into_iter()
            .map(|(input, handle)| Ok((input, handle.join()??)))
            .collect::<Result<Vec<_>>>()?
    };

    if json {
        let out: Vec<_> = summaries
            .iter()
            .map(|(input, summary)| serde_json::json!({ "input": input, "summary": summary }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (input, summary) in &summaries {
        summary.log();
        println!("\nLoaded {:?}", input);
        println!("  Statements parsed: {}", summary.triples_parsed);
        println!("  Statements mapped: {}", summary.triples_mapped);
        println!("  Transactions: {}", summary.flushes);
        if summary.failed_flushes > 0 {
            println!("  Failed transactions: {}", summary.failed_flushes);
        }
        for (prefix, namespace) in &summary.namespaces {
            println!("  {}: {}", prefix, namespace);
        }
        for warning in &summary.warnings {
            println!("  Warning: {}", warning);
        }
    }
    println!("  Time: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn cmd_delete(config: &TripleGraphConfig, inputs: Vec<PathBuf>, quads: bool, json: bool) -> Result<()> {
    let mut summaries: Vec<(PathBuf, DeleteSummary)> = Vec::new();
    for input in inputs {
        let statements = read_statements(&input)?;
        let store = open_store(config)?;
        let mut deleter = if quads {
            StatementDeleter::for_quads(store, &config.import)?
        } else {
            StatementDeleter::new(store, &config.import)?
        };
        let summary = run(&mut deleter, statements).map_err(anyhow::Error::new)?;
        summary.log();
        summaries.push((input, summary));
    }

    if json {
        let out: Vec<_> = summaries
            .iter()
            .map(|(input, summary)| serde_json::json!({ "input": input, "summary": summary }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (input, summary) in &summaries {
        println!("\nDeleted {:?}", input);
        println!("  Statements parsed: {}", summary.triples_parsed);
        println!("  Statements deleted: {}", summary.triples_deleted);
        println!("  Not deleted: {}", summary.not_deleted);
        println!("  Nodes pruned: {}", summary.nodes_pruned);
        if let Some(info) = &summary.info {
            println!("  {}", info);
        }
    }
    Ok(())
}

fn cmd_preview(config: &TripleGraphConfig, input: &Path, limit: Option<usize>) -> Result<()> {
    let statements = read_statements(input)?;
    let preview = preview(statements, &config.import, limit).map_err(anyhow::Error::new)?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

fn cmd_stats(config: &TripleGraphConfig, json: bool) -> Result<()> {
    let store = SqliteGraphStore::open(&config.storage.database)
        .with_context(|| format!("Failed to open graph store {:?}", config.storage.database))?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("\nGraph Statistics");
        println!("================");
        println!("  Nodes: {}", stats.node_count);
        println!("  Relationships: {}", stats.relationship_count);
        println!("  Namespace prefixes: {}", stats.namespace_count);
    }
    Ok(())
}

fn cmd_prefixes(config: &TripleGraphConfig) -> Result<()> {
    let store = SqliteGraphStore::open(&config.storage.database)
        .with_context(|| format!("Failed to open graph store {:?}", config.storage.database))?;
    for (prefix, namespace) in store.namespace_prefixes()? {
        println!("{}\t{}", prefix, namespace);
    }
    Ok(())
}

fn cmd_map(config: &TripleGraphConfig, iri: &str, name: &str) -> Result<()> {
    let mut store = open_store(config)?;
    store.begin()?;
    if let Err(e) = store.add_vocabulary_mapping(iri, name) {
        store.rollback()?;
        return Err(e.into());
    }
    store.commit()?;
    info!(iri, name, "Mapping saved");
    Ok(())
}

fn cmd_config(config: &TripleGraphConfig, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommand::Init => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let path = ConfigLoader::new().init_local(&cwd)?;
            println!("Configuration at {:?}", path);
        }
    }
    Ok(())
}
