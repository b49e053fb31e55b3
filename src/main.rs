use clap::{Parser, Subcommand};
use texsense::commands::*;
use texsense::core::{
    command_init::CommandOptions,
    error::{Result, TexSenseError},
    print_error,
    tex_data::Category,
};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "texsense")]
#[command(about = "Structure, bibliography and build diagnostics for LaTeX documents")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Keep derived data in memory only
    #[arg(long, global = true)]
    no_cache: bool,

    /// Project settings file (default: nearest *.texsense-project)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the extracted structure of a TeX file
    Parse {
        file: PathBuf,
        /// Only this category (e.g. "label", "cite", "words")
        #[arg(short, long)]
        category: Option<Category>,
        /// Follow \input and friends through the document tree
        #[arg(short, long)]
        walk: bool,
    },
    /// List the records of a bibliography file
    Bib { file: PathBuf },
    /// Print E:/W:/B: diagnostics of a compiler log
    Log {
        file: PathBuf,
        /// Document the log belongs to (default: the log path with .tex)
        #[arg(long)]
        tex: Option<PathBuf>,
    },
    /// Compile a document with the configured builder
    Build {
        file: PathBuf,
        /// Answer yes to questions asked during the build
        #[arg(short, long)]
        yes: bool,
    },
    /// Inspect and maintain the derived-data cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show every category with its age and size
    Show,
    /// Re-parse cached files now (all local categories by default)
    Refresh { category: Option<String> },
    /// Invalidate categories, or delete them with --hard
    Clear {
        category: Option<String>,
        #[arg(long)]
        hard: bool,
    },
}

fn run(cli: Cli) -> Result<bool> {
    let options = CommandOptions {
        no_cache: cli.no_cache,
        project: cli.project,
    };

    match cli.command {
        Commands::Parse { file, category, walk } => execute_parse(&options, &file, category, walk).map(|_| true),
        Commands::Bib { file } => execute_bib(&options, &file).map(|_| true),
        Commands::Log { file, tex } => execute_log(&file, tex.as_deref()),
        Commands::Build { file, yes } => execute_build(&options, &file, yes),
        Commands::Cache { action } => match action {
            CacheAction::Show => execute_cache_show(&options),
            CacheAction::Refresh { category } => execute_cache_refresh(&options, category.as_deref()),
            CacheAction::Clear { category, hard } => execute_cache_clear(&options, category.as_deref(), hard),
        }
        .map(|_| true),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configure logging based on --debug flag
    if cli.debug {
        env::set_var("RUST_LOG", "debug");
    } else if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "warn");
    }
    env_logger::init();

    match run(cli) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            match &e {
                TexSenseError::SourceMissing { path } => {
                    print_error(&format!("No such file: {}", path.display()))
                }
                _ => print_error(&e.to_string()),
            }
            std::process::exit(e.status_code());
        }
    }
}
