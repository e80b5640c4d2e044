use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use codesense_core::{ChunkKind, CodesenseConfig, OutputFormat, SearchResult};
use codesense_lens::{BuildReport, Codesense, IndexInfo, SearchFilter, SearchOptions, SearchOutcome};

#[derive(Parser)]
#[command(
    name = "codesense",
    version,
    about = "Local semantic code search with incremental indexing",
    long_about = "codesense indexes a source tree into functions, classes and methods,\n\
                   embeds them, and answers natural-language queries by vector similarity.\n\
                   Updates only re-embed files whose content changed.\n\n\
                   Examples:\n  \
                     codesense index . --name my-repo         Build an index\n  \
                     codesense update my-repo                 Re-index changed files\n  \
                     codesense search 'user signup' --index my-repo\n  \
                     codesense search 'order model' --index my-repo --filter django\n  \
                     codesense list                           Show all indexes"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .codesense.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the indexes (overrides storage.index_dir)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Show debug logs
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index from a directory, replacing any index with the same name
    #[command(long_about = "Build an index from a directory.\n\n\
        Walks the directory (honoring .gitignore and the ignored_dirs setting),\n\
        splits supported source files into chunks, embeds every chunk and\n\
        commits the result. An existing index with the same name is replaced.\n\n\
        Examples:\n  codesense index . --name my-repo\n  codesense index ~/src/api --name api --model hashing-768")]
    Index {
        /// Directory to index
        path: PathBuf,

        /// Name of the index
        #[arg(long)]
        name: String,

        /// Embedding model id (default: from configuration)
        #[arg(long)]
        model: Option<String>,
    },
    /// Re-index only the files that changed since the last build
    #[command(long_about = "Re-index only the files that changed since the last build.\n\n\
        Files are compared by size and modification time, then by content hash.\n\
        Unchanged files keep their vectors. Nothing is written if nothing changed.\n\n\
        Example:\n  codesense update my-repo")]
    Update {
        /// Name of the index
        name: String,
    },
    /// Search an index with a natural-language query
    #[command(long_about = "Search an index with a natural-language query.\n\n\
        Queries that mention a framework or kind of code (\"django\", \"route\",\n\
        \"serializer\", ...) are filtered to matching chunks unless --no-intent\n\
        or an explicit filter is given.\n\n\
        Examples:\n  codesense search 'where are refunds issued' --index shop\n  \
        codesense search 'order' --index shop --filter model --top-k 10\n  \
        codesense search 'login' --index shop --kind function --auto-update")]
    Search {
        /// Query text
        query: String,

        /// Name of the index
        #[arg(long)]
        index: String,

        /// Number of results (default: search.default_top_k)
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Category filter: model, route, view, serializer, function, class,
        /// method, django, fastapi, flask, or a framework tag
        #[arg(long)]
        filter: Option<String>,

        /// Only chunks of this kind (function, class, method, whole_file)
        #[arg(long)]
        kind: Option<ChunkKind>,

        /// Only chunks whose name or text contains this (case-insensitive)
        #[arg(long)]
        name_contains: Option<String>,

        /// Update the index before searching
        #[arg(long)]
        auto_update: bool,

        /// Do not infer a filter from the query
        #[arg(long)]
        no_intent: bool,

        /// Do not print code previews
        #[arg(long)]
        no_preview: bool,
    },
    /// List all indexes
    List,
    /// Show statistics for an index
    Info {
        /// Name of the index
        name: String,
    },
    /// Delete an index
    Delete {
        /// Name of the index
        name: String,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Create a default .codesense.toml configuration file
    #[command(long_about = "Create a default .codesense.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .codesense.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# codesense configuration

[storage]
# index_dir = "~/.codesense/indexes"

[embedding]
# provider = "hashing"        # hashing | voyage | openai
# model = "hashing-384"
# dimensions = 384            # used by the hashing provider
# batch_size = 64
# api_key = "..."             # or VOYAGE_API_KEY / OPENAI_API_KEY
# base_url = "https://api.openai.com/v1"

[indexing]
# chunking = "ast"            # ast | whole_file
# extensions = ["py", "rs"]   # empty means every supported language
# respect_gitignore = true
# skip_hidden_dirs = true
# max_file_size = 1048576
# ignored_dirs = [".git", "node_modules", "target", "venv"]

[search]
# default_top_k = 5
# overfetch_factor = 10
# detect_intent = true
# preview_lines = 3
"#;

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if std::env::var_os("RUST_LOG").is_none() {
        if verbose {
            builder.filter_level(log::LevelFilter::Debug);
        } else if quiet {
            builder.filter_level(log::LevelFilter::Error);
        }
    }
    builder
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> Result<CodesenseConfig> {
    let mut config = match &cli.config {
        Some(path) => CodesenseConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".codesense.toml");
            if default_path.exists() {
                CodesenseConfig::from_file(default_path)?
            } else {
                CodesenseConfig::default()
            }
        }
    };
    if let Some(dir) = &cli.index_dir {
        config.storage.index_dir = Some(dir.clone());
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_build_report(report: &BuildReport, root: Option<&Path>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => return print_json(report),
        OutputFormat::Markdown => {
            println!("# Index `{}`\n", report.index_name);
            println!("| | |\n|---|---|");
            println!("| Added | {} |", report.added.len());
            println!("| Changed | {} |", report.changed.len());
            println!("| Deleted | {} |", report.deleted.len());
            println!("| Unchanged | {} |", report.unchanged);
            println!("| Files | {} |", report.total_files);
            println!("| Chunks | {} |", report.total_chunks);
            println!("| Generation | {} |", report.generation);
            if !report.warnings.is_empty() {
                println!("\n## Warnings\n");
                for warning in &report.warnings {
                    println!("- `{}`: {}", warning.file_path, warning.message);
                }
            }
        }
        OutputFormat::Text => {
            if !report.committed {
                println!(
                    "Index '{}' is up to date ({} files, {} chunks)",
                    report.index_name, report.total_files, report.total_chunks
                );
                return Ok(());
            }
            match root {
                Some(root) => println!(
                    "Indexed '{}' from {}: {} files, {} chunks (generation {})",
                    report.index_name,
                    root.display(),
                    report.total_files,
                    report.total_chunks,
                    report.generation
                ),
                None => println!(
                    "Updated '{}': {} added, {} changed, {} deleted, {} restamped; {} files, {} chunks (generation {})",
                    report.index_name,
                    report.added.len(),
                    report.changed.len(),
                    report.deleted.len(),
                    report.restamped,
                    report.total_files,
                    report.total_chunks,
                    report.generation
                ),
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
        }
    }
    Ok(())
}

fn result_label(result: &SearchResult) -> String {
    let chunk = &result.chunk;
    let mut label = chunk.kind().to_string();
    if let Some(name) = chunk.name() {
        label = match chunk.entity.parent() {
            Some(parent) => format!("{label} {parent}.{name}"),
            None => format!("{label} {name}"),
        };
    }
    if let Some(route) = chunk.entity.route() {
        label.push_str(&format!(" {}", route.method));
        if let Some(path) = &route.path {
            label.push_str(&format!(" {path}"));
        }
    }
    if let Some(tag) = &chunk.framework_tag {
        label.push_str(&format!(" [{tag}]"));
    }
    label
}

fn print_search(outcome: &SearchOutcome, preview_lines: usize, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(outcome);
    }
    if let Some(error) = &outcome.update_error {
        eprintln!("auto-update failed, showing the last committed index: {error}");
    }
    if let Some(intent) = &outcome.detected_intent {
        eprintln!("filtering by detected intent: {intent}");
    }
    if outcome.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    match format {
        OutputFormat::Markdown => {
            println!("# Search Results\n");
            for r in &outcome.results {
                let lang = Path::new(&r.file_path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("text");
                println!(
                    "## {}. `{}:{}-{}` {} (score: {:.4})\n\n```{lang}\n{}\n```\n",
                    r.rank,
                    r.file_path,
                    r.chunk.start_line,
                    r.chunk.end_line,
                    result_label(r),
                    r.score,
                    r.chunk.text,
                );
            }
        }
        _ => {
            for r in &outcome.results {
                println!(
                    "{}. {}:{}-{}  {}  (score: {:.4})",
                    r.rank,
                    r.file_path,
                    r.chunk.start_line,
                    r.chunk.end_line,
                    result_label(r),
                    r.score,
                );
                for line in r.chunk.text.lines().take(preview_lines) {
                    println!("     {line}");
                }
            }
        }
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

fn print_info(info: &IndexInfo, format: OutputFormat) -> Result<()> {
    let dimension = info
        .dimension
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".into());
    let rows = [
        ("Root", info.root_directory.display().to_string()),
        ("Model", info.model_id.clone()),
        ("Dimension", dimension),
        ("Files", info.num_files.to_string()),
        ("Chunks", info.num_chunks.to_string()),
        ("Vectors", info.num_vectors.to_string()),
        ("Generation", info.generation.to_string()),
        ("Created", info.created_at.to_rfc3339()),
        ("Updated", info.updated_at.to_rfc3339()),
        ("Size", human_size(info.size_bytes)),
    ];
    match format {
        OutputFormat::Json => print_json(info)?,
        OutputFormat::Markdown => {
            println!("# Index `{}`\n", info.name);
            println!("| | |\n|---|---|");
            for (key, value) in rows {
                println!("| {key} | {value} |");
            }
        }
        OutputFormat::Text => {
            println!("Index:      {}", info.name);
            for (key, value) in rows {
                println!("{:<11} {value}", format!("{key}:"));
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let Some(command) = &cli.command else {
        Cli::command().print_help().into_diagnostic()?;
        return Ok(());
    };

    match command {
        Command::Init => {
            let path = Path::new(".codesense.toml");
            if path.exists() {
                miette::bail!(".codesense.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .codesense.toml with default configuration");
            return Ok(());
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "codesense", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;
    log::debug!("format: {}", cli.format);
    let preview_lines = config.search.preview_lines;
    let codesense = Codesense::new(config)?;
    log::debug!("index directory: {}", codesense.store().index_dir().display());

    match command {
        Command::Index { path, name, model } => {
            let report = codesense.index(path, name, model.as_deref()).await?;
            print_build_report(&report, Some(path.as_path()), cli.format)?;
        }
        Command::Update { name } => {
            let report = codesense.update(name).await?;
            print_build_report(&report, None, cli.format)?;
        }
        Command::Search {
            query,
            index,
            top_k,
            filter,
            kind,
            name_contains,
            auto_update,
            no_intent,
            no_preview,
        } => {
            let filter = SearchFilter {
                category: filter.clone(),
                kind: *kind,
                name_contains: name_contains.clone(),
            };
            let options = SearchOptions {
                top_k: *top_k,
                filter: (!filter.is_empty()).then_some(filter),
                auto_update: *auto_update,
                detect_intent: no_intent.then_some(false),
            };
            let outcome = codesense.search(index, query, options).await?;
            let preview = if *no_preview { 0 } else { preview_lines };
            print_search(&outcome, preview, cli.format)?;
        }
        Command::List => {
            let names = codesense.list_indexes()?;
            match cli.format {
                OutputFormat::Json => print_json(&names)?,
                _ if names.is_empty() => println!("No indexes found."),
                OutputFormat::Markdown => {
                    for name in &names {
                        println!("- `{name}`");
                    }
                }
                OutputFormat::Text => {
                    for name in &names {
                        println!("{name}");
                    }
                }
            }
        }
        Command::Info { name } => {
            let info = codesense.info(name)?;
            print_info(&info, cli.format)?;
        }
        Command::Delete { name, yes } => {
            if !*yes {
                miette::bail!(miette::miette!(
                    help = "Re-run with --yes to confirm",
                    "Refusing to delete index '{name}' without confirmation"
                ));
            }
            codesense.delete(name).await?;
            if cli.format == OutputFormat::Json {
                print_json(&serde_json::json!({ "deleted": name }))?;
            } else {
                println!("Deleted index '{name}'");
            }
        }
        Command::Init | Command::Completions { .. } => {}
    }

    Ok(())
}
