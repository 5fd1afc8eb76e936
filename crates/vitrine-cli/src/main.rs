#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vitrine_core::ErrorCode;
use vitrine_core::config::resolve_config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vitrine: multimodal hybrid product search",
    long_about = None
)]
struct Cli {
    /// Config file (default: ./vitrine.toml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create the catalog schema and the lexical index directory",
        after_help = "EXAMPLES:\n    vt init"
    )]
    Init,

    #[command(
        next_help_heading = "Setup",
        about = "Load product records from a JSONL file into the catalog",
        after_help = "EXAMPLES:\n    vt import articles.jsonl\n\n    # Drop existing records (and their vectors) first\n    vt import articles.jsonl --replace"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Embed catalog records and rebuild the search indexes",
        after_help = "EXAMPLES:\n    vt index --image-root ./images\n\n    # Re-embed everything regardless of content hash\n    vt index --force"
    )]
    Index(cmd::index::IndexArgs),

    #[command(
        next_help_heading = "Query",
        about = "Run one hybrid query against the local indexes",
        after_help = "EXAMPLES:\n    vt search \"red shirt\" -n 5\n\n    vt search \"summer dress\" --image query.jpg --json"
    )]
    Search(cmd::search::SearchArgs),

    #[command(
        next_help_heading = "Query",
        about = "Serve the HTTP search API",
        after_help = "EXAMPLES:\n    vt serve\n\n    VITRINE_BIND=0.0.0.0:8000 vt serve"
    )]
    Serve,

    #[command(
        next_help_heading = "Shell",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    vt completions bash > ~/.local/share/bash-completion/completions/vt"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VITRINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "vitrine=debug,info"
        } else {
            "vitrine=info,warn"
        })
    });

    let format = env::var("VITRINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    if let Commands::Completions(args) = &cli.command {
        let mut stdout = std::io::stdout().lock();
        return cmd::completions::run_completions(args.shell, &mut Cli::command(), &mut stdout);
    }

    let working_dir = env::current_dir()?;
    let config = resolve_config(cli.config.as_deref(), &working_dir)
        .map_err(|err| ErrorCode::ConfigInvalid.wrap(err))?;

    match cli.command {
        Commands::Init => cmd::init::run_init(&config, output),
        Commands::Import(args) => cmd::import::run_import(&args, &config, output),
        Commands::Index(args) => cmd::index::run_index(&args, &config, output),
        Commands::Search(args) => cmd::search::run_search(&args, &config, output),
        Commands::Serve => cmd::serve::run_serve(&config),
        Commands::Completions(_) => Ok(()),
    }
}
