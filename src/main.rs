use anyhow::{bail, Context, Result};
use citation_master::config::{find_config_file, get_config, load_config, Config, ConfigFile};
use citation_master::engine::{Analyzer, ClaimOutcome, SessionState};
use citation_master::library::Library;
use citation_master::models::{CitationStyle, MetadataBuilder, PageText, WorkId};
use citation_master::oracle;
use citation_master::utils::{
    get_structured_citation, metadata_from_filename, truncate_chars, Document,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Citation Master - Find supporting sources in your library and cite them
#[derive(Parser, Debug)]
#[command(name = "citation-master")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Find supporting passages in your PDF library and insert formatted citations", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Library file (overrides the configured path)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the source library
    #[command(alias = "lib")]
    Library {
        #[command(subcommand)]
        command: LibraryCommands,
    },

    /// Find claims in a manuscript and insert citations
    #[command(alias = "a")]
    Analyze {
        /// Manuscript (.txt or .md)
        document: PathBuf,

        /// Citation style: apa, mla, chicago or ieee
        #[arg(long, short)]
        style: Option<String>,

        /// Maximum candidates considered per claim
        #[arg(long, short)]
        max_candidates: Option<usize>,

        /// Skip the relevance oracle and rank lexically
        #[arg(long)]
        offline: bool,

        /// Session file holding citations from a previous run
        #[arg(long)]
        session: Option<PathBuf>,

        /// Save the session next to the document (or to --session)
        #[arg(long)]
        save_session: bool,

        /// Write the annotated document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Insert the supporting quote after each cited sentence
        #[arg(long)]
        quotes: bool,
    },

    /// Format a library work in one or all styles
    #[command(alias = "f")]
    Format {
        /// Work ID
        work_id: String,

        /// Citation style (default: all)
        #[arg(long, short)]
        style: Option<String>,
    },

    /// List supported citation styles
    Styles,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryCommands {
    /// Add PDFs or plain-text sources
    Add {
        /// Files to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Title (plain-text sources, or PDFs without metadata)
        #[arg(long)]
        title: Option<String>,

        /// Author, "Family, Given"
        #[arg(long)]
        author: Option<String>,

        /// Publication year
        #[arg(long)]
        year: Option<String>,
    },

    /// Import a bibliography export (plain text or JSON)
    Import {
        /// Bibliography file
        file: PathBuf,
    },

    /// List works
    #[command(alias = "ls")]
    List,

    /// Search indexed passages
    Search {
        /// Query text
        query: String,

        /// Maximum number of passages
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Remove a work and its passages
    #[command(alias = "rm")]
    Remove {
        /// Work ID
        work_id: String,

        /// Session files whose citations must keep their works
        #[arg(long)]
        session: Vec<PathBuf>,
    },

    /// Show library statistics
    Stats,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Destination (default: ./citation-master.toml)
        #[arg(default_value = "citation-master.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Print all available environment variables
fn print_env_vars() {
    println!("Citation Master - Environment Variables");
    println!();
    println!("Relevance Oracle:");
    println!("  OPENAI_API_KEY                          API key for the relevance oracle");
    println!("  CITATION_MASTER_ORACLE__API_KEY         API key (takes precedence over OPENAI_API_KEY)");
    println!("  CITATION_MASTER_ORACLE__ENABLED         Set to false to always rank lexically");
    println!("  CITATION_MASTER_ORACLE__MODEL           Chat model (default: gpt-4o-mini)");
    println!("  CITATION_MASTER_ORACLE__TIMEOUT_MS      Per-call deadline in milliseconds (default: 8000)");
    println!();
    println!("Retrieval:");
    println!("  CITATION_MASTER_RETRIEVAL__MIN_RELEVANCE   Minimum relevance for a candidate (default: 0.2)");
    println!("  CITATION_MASTER_RETRIEVAL__MAX_CANDIDATES  Candidates per claim (default: 3)");
    println!();
    println!("Citations:");
    println!("  CITATION_MASTER_CITATIONS__STYLE        Default style: apa, mla, chicago, ieee");
    println!();
    println!("Library:");
    println!("  CITATION_MASTER_LIBRARY__PATH           Library file location");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                                Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export OPENAI_API_KEY=\"your-key-here\"");
    println!("  export CITATION_MASTER_CITATIONS__STYLE=\"ieee\"");
    std::process::exit(0);
}

fn init_logging(cli: &Cli, config: &Config) {
    let level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("citation_master={}", level)),
    );

    let json = config.logging.format.as_deref() == Some("json");
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn read_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => match find_config_file() {
            Some(path) => load_config(&path)?,
            None => get_config()?,
        },
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
    }

    let config = read_config(&cli)?;
    init_logging(&cli, &config);

    let library_path = cli
        .library
        .clone()
        .unwrap_or_else(|| config.library.path.clone());
    let format = cli.output.resolve();

    match cli.command {
        Some(Commands::Library { command }) => {
            run_library(command, &library_path, format)?;
        }

        Some(Commands::Analyze {
            document,
            style,
            max_candidates,
            offline,
            session,
            save_session,
            out,
            quotes,
        }) => {
            let mut config = config;
            if let Some(n) = max_candidates {
                config.retrieval.max_candidates = n;
            }
            if quotes {
                config.citations.include_quotes = true;
            }
            let style = match style {
                Some(s) => s.parse::<CitationStyle>()?,
                None => config.citations.style,
            };

            let library = Library::load(&library_path)?;
            let oracle = if offline {
                None
            } else {
                oracle::from_config(&config.oracle)?
            };

            let manuscript = Document::load(&document)?;
            let session_path = session.unwrap_or_else(|| default_session_path(&document));
            let previous = if session_path.is_file() {
                Some(load_session(&session_path)?)
            } else {
                None
            };

            let analyzer = Analyzer::new(library.snapshot(), &config).with_oracle(oracle);
            let report = analyzer.analyze(manuscript.text(), style, previous).await?;

            if save_session {
                let content = serde_json::to_string_pretty(&report.session)?;
                std::fs::write(&session_path, content)
                    .with_context(|| format!("writing session {}", session_path.display()))?;
                tracing::info!(path = %session_path.display(), "session saved");
            }

            if let Some(out) = &out {
                std::fs::write(out, &report.rendered)
                    .with_context(|| format!("writing {}", out.display()))?;
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                _ if out.is_none() => print!("{}", report.rendered),
                OutputFormat::Plain => {
                    for claim in &report.claims {
                        println!("{}\t{}", outcome_label(&claim.outcome), claim.claim.text);
                    }
                }
                _ => {
                    use comfy_table::{Cell, Table};
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["Claim", "Outcome", "Citation", "Relevance"]);
                    for claim in &report.claims {
                        let citation = report.citations.iter().find(|c| c.claim == claim.claim.span);
                        table.add_row(vec![
                            Cell::new(truncate_chars(&claim.claim.text, 60)),
                            Cell::new(outcome_label(&claim.outcome)),
                            Cell::new(citation.map(|c| c.in_text_form.clone()).unwrap_or_default()),
                            Cell::new(
                                citation
                                    .map(|c| format!("{:.2}", c.relevance))
                                    .unwrap_or_default(),
                            ),
                        ]);
                    }
                    println!("{table}");
                }
            }

            if !cli.quiet && format != OutputFormat::Json {
                let stats = report.stats;
                eprintln!(
                    "{} claims, {} cited ({} reused), {} sources, {} uncited{}",
                    stats.claims_identified,
                    stats.citations_added + stats.citations_reused,
                    stats.citations_reused,
                    stats.sources_used,
                    stats.uncited,
                    if stats.degraded_claims > 0 {
                        format!(", {} ranked without the oracle", stats.degraded_claims)
                    } else {
                        String::new()
                    }
                );
            }
        }

        Some(Commands::Format { work_id, style }) => {
            let library = Library::load(&library_path)?;
            let work_id = WorkId::new(work_id);
            let Some(work) = library.work(&work_id) else {
                bail!("Unknown work: {}", work_id);
            };
            let styles = match style {
                Some(s) => vec![s.parse::<CitationStyle>()?],
                None => CitationStyle::all().to_vec(),
            };
            let citations: Vec<_> = styles
                .into_iter()
                .map(|style| get_structured_citation(work, style))
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&citations)?),
                OutputFormat::Plain => {
                    for citation in &citations {
                        println!("{}: {}", citation.style, citation.formatted);
                    }
                }
                _ => {
                    use comfy_table::{Attribute, Cell, Table};
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["Style", "In-text", "Reference"]);
                    for citation in &citations {
                        table.add_row(vec![
                            Cell::new(&citation.style).add_attribute(Attribute::Bold),
                            Cell::new(&citation.in_text),
                            Cell::new(&citation.formatted),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        Some(Commands::Styles) => match format {
            OutputFormat::Json => {
                let styles: Vec<_> = CitationStyle::all()
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "id": s.as_str(),
                            "name": s.to_string(),
                            "numeric": s.is_numeric(),
                            "reference_header": s.reference_header(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&styles)?);
            }
            _ => {
                use comfy_table::{Cell, Table};
                let mut table = Table::new();
                table.load_preset(comfy_table::presets::UTF8_FULL);
                table.set_header(vec!["ID", "Style", "Keys", "Reference list"]);
                for style in CitationStyle::all() {
                    table.add_row(vec![
                        Cell::new(style.as_str()),
                        Cell::new(style.to_string()),
                        Cell::new(if style.is_numeric() { "numeric" } else { "author-date" }),
                        Cell::new(style.reference_header()),
                    ]);
                }
                println!("{table}");
            }
        },

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Init { path, force } => {
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                ConfigFile::default().save(&path)?;
                println!("Wrote {}", path.display());
            }
            ConfigCommands::Show => {
                let mut shown = ConfigFile::from(config);
                if shown.oracle.api_key.is_some() {
                    shown.oracle.api_key = Some("********".to_string());
                }
                println!("{}", toml::to_string_pretty(&shown)?);
            }
        },

        None => {
            println!("Citation Master v{}", env!("CARGO_PKG_VERSION"));
            println!("Run with --help for usage information");
        }
    }

    Ok(())
}

fn run_library(command: LibraryCommands, library_path: &Path, format: OutputFormat) -> Result<()> {
    let mut library = Library::load(library_path)?;

    match command {
        LibraryCommands::Add {
            paths,
            title,
            author,
            year,
        } => {
            if paths.len() > 1 && (title.is_some() || author.is_some() || year.is_some()) {
                bail!("--title, --author and --year apply to a single file");
            }
            for path in &paths {
                let work_id = match path.extension().and_then(|e| e.to_str()) {
                    Some(ext) if ext.eq_ignore_ascii_case("pdf") && title.is_none() => {
                        library.add_pdf(path)?
                    }
                    _ => {
                        let pages = source_pages(path)?;
                        let file_name = path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or_default();
                        let (file_author, file_year) = metadata_from_filename(file_name);
                        let title = title.clone().unwrap_or_else(|| file_name.replace('_', " "));
                        let mut builder = MetadataBuilder::new(title)
                            .source_file(path.display().to_string());
                        if let Some(a) = author.clone().or(file_author) {
                            builder = builder.author(a);
                        }
                        if let Some(y) = year.clone().or(file_year) {
                            builder = builder.year(y);
                        }
                        library.add_work(builder.build(), &pages)?
                    }
                };
                println!("{}\t{}", work_id, path.display());
            }
            library.save(library_path)?;
        }

        LibraryCommands::Import { file } => {
            let report = library.import_file(&file)?;
            library.save(library_path)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                _ => {
                    println!(
                        "{} added, {} merged, {} need manual resolution",
                        report.added.len(),
                        report.merged.len(),
                        report.rejected.len()
                    );
                    for (title, reason) in &report.rejected {
                        println!("  {}: {}", truncate_chars(title, 60), reason);
                    }
                }
            }
        }

        LibraryCommands::List => {
            let works: Vec<_> = library.works().collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&works)?),
                OutputFormat::Plain => {
                    for work in works {
                        println!(
                            "{}\t{}\t{}",
                            work.work_id,
                            work.year.map(|y| y.to_string()).unwrap_or_default(),
                            work.title
                        );
                    }
                }
                _ => {
                    use comfy_table::{Attribute, Cell, Table};
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["ID", "Title", "Authors", "Year", "Passages"]);
                    for work in works {
                        let authors = work
                            .authors
                            .iter()
                            .map(|a| a.family.as_str())
                            .collect::<Vec<_>>()
                            .join(", ");
                        table.add_row(vec![
                            Cell::new(work.work_id.as_str()),
                            Cell::new(truncate_chars(&work.title, 50)).add_attribute(Attribute::Bold),
                            Cell::new(truncate_chars(&authors, 30)),
                            Cell::new(work.year.map(|y| y.to_string()).unwrap_or_default()),
                            Cell::new(library.index().passages_for(&work.work_id).count()),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        LibraryCommands::Search { query, limit } => {
            let results = library.search(&query, limit)?;
            match format {
                OutputFormat::Json => {
                    let rows: Vec<_> = results
                        .iter()
                        .map(|(p, score)| serde_json::json!({ "passage": p, "score": score }))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Plain => {
                    for (passage, score) in &results {
                        println!("{:.3}\t{}\t{}", score, passage.work_id, truncate_chars(&passage.text, 100));
                    }
                }
                _ => {
                    use comfy_table::{Cell, Table};
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["Score", "Work", "Page", "Passage"]);
                    for (passage, score) in &results {
                        let title = library
                            .work(&passage.work_id)
                            .map(|w| truncate_chars(&w.title, 30))
                            .unwrap_or_else(|| passage.work_id.to_string());
                        table.add_row(vec![
                            Cell::new(format!("{:.3}", score)),
                            Cell::new(title),
                            Cell::new(passage.locator().unwrap_or_default()),
                            Cell::new(truncate_chars(&passage.text, 80)),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        LibraryCommands::Remove { work_id, session } => {
            let mut referenced = BTreeSet::new();
            for path in &session {
                referenced.extend(load_session(path)?.cited_works());
            }
            let work = library.remove_work(&WorkId::new(work_id), &referenced)?;
            library.save(library_path)?;
            println!("Removed {} ({})", work.work_id, work.title);
        }

        LibraryCommands::Stats => {
            let stats = library.stats();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                _ => {
                    println!("Library: {}", library_path.display());
                    println!("  Works:          {}", stats.works);
                    println!("  Indexed works:  {}", stats.indexed_works);
                    println!("  Passages:       {}", stats.passages);
                    println!("  Pages:          {}", stats.pages);
                    println!("  Characters:     {}", stats.characters);
                }
            }
        }
    }

    Ok(())
}

/// Pages of a non-PDF source; plain text has no page numbers
fn source_pages(path: &Path) -> Result<Vec<PageText>> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return Ok(citation_master::utils::extract_pdf(path)?.pages);
    }
    let document = Document::load(path)?;
    Ok(vec![PageText::unnumbered(document.into_text())])
}

fn default_session_path(document: &Path) -> PathBuf {
    let mut name = document.as_os_str().to_owned();
    name.push(".citations.json");
    PathBuf::from(name)
}

fn load_session(path: &Path) -> Result<SessionState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading session {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing session {}", path.display()))
}

fn outcome_label(outcome: &ClaimOutcome) -> &'static str {
    match outcome {
        ClaimOutcome::Cited { .. } => "cited",
        ClaimOutcome::Reused { .. } => "reused",
        ClaimOutcome::NoCandidatesFound => "no source",
        ClaimOutcome::Failed { .. } => "failed",
    }
}
