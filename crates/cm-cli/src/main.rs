//! crawlmatch CLI
//!
//! Classifies crawled requests against block lists, and offers a few tools
//! for checking lists by hand.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use cm_compiler::{optimize_rules, parse_filter_list};
use cm_core::RequestType;
use cm_pipeline::{classify_url, Pipeline, PipelineConfig, RuleSetConfig, Verdict};

#[derive(Parser)]
#[command(name = "cm-cli")]
#[command(about = "Classify crawled requests against ad and tracker block lists")]
struct Cli {
    /// JSON configuration file; built-in defaults otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the crawl database and write matches (default)
    Classify {
        /// Crawl database to read
        #[arg(long)]
        crawl_db: Option<PathBuf>,

        /// Output database to write
        #[arg(long)]
        output_db: Option<PathBuf>,
    },

    /// Check a single request against the configured lists
    Check {
        /// Request URL
        url: String,

        /// Top-level page URL
        top_level_url: String,

        /// Resource kind to check the request as
        #[arg(short, long, value_enum, default_value_t = Kind::Xhr)]
        kind: Kind,
    },

    /// Compile the configured lists and report rule counts
    Compile {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Script,
    Xhr,
}

impl Kind {
    fn request_type(self) -> RequestType {
        match self {
            Kind::Script => RequestType::SCRIPT,
            Kind::Xhr => RequestType::XMLHTTPREQUEST,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        None => cmd_classify(config),
        Some(Commands::Classify { crawl_db, output_db }) => {
            let mut config = config;
            if let Some(path) = crawl_db {
                config.crawl_db = path;
            }
            if let Some(path) = output_db {
                config.output_db = path;
            }
            cmd_classify(config)
        }
        Some(Commands::Check {
            url,
            top_level_url,
            kind,
        }) => cmd_check(config, &url, &top_level_url, kind),
        Some(Commands::Compile { verbose }) => cmd_compile(&config, verbose),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, String> {
    let config = match path {
        Some(path) => PipelineConfig::load(path).map_err(|e| e.to_string())?,
        None => PipelineConfig::default(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn cmd_classify(config: PipelineConfig) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;

    let pipeline = Pipeline::from_config(config).map_err(|e| e.to_string())?;
    let summary = runtime.block_on(pipeline.run()).map_err(|e| e.to_string())?;

    println!(
        "Classified {} http requests and {} scripts",
        summary.http_requests, summary.javascripts
    );
    println!(
        "  Kept:     {} http requests, {} scripts",
        summary.kept_http_requests, summary.kept_javascripts
    );
    println!("  Output:   {}", pipeline.config().output_db.display());

    Ok(())
}

#[derive(Serialize)]
struct CheckReport<'a> {
    url: &'a str,
    top_level_url: &'a str,
    request_type: &'static str,
    lists: Vec<Verdict<'a>>,
    blocked: bool,
    exception: bool,
}

fn cmd_check(config: PipelineConfig, url: &str, top_level_url: &str, kind: Kind) -> Result<(), String> {
    let pipeline = Pipeline::from_config(config).map_err(|e| e.to_string())?;
    let result = classify_url(url, top_level_url, kind.request_type(), pipeline.engines());

    let report = CheckReport {
        url,
        top_level_url,
        request_type: match kind {
            Kind::Script => "script",
            Kind::Xhr => "xmlhttprequest",
        },
        blocked: result.any_blocked(),
        exception: result.exception_override(),
        lists: result.verdicts,
    };

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_compile(config: &PipelineConfig, verbose: bool) -> Result<(), String> {
    let start = Instant::now();
    let lists: Vec<&RuleSetConfig> = config
        .block_lists
        .iter()
        .chain(std::iter::once(&config.exception_list))
        .collect();

    let mut total_lines = 0usize;
    let mut total_rules = 0usize;

    for list in &lists {
        let content = fs::read_to_string(&list.path)
            .map_err(|e| format!("Failed to read '{}': {}", list.path.display(), e))?;
        let line_count = content.lines().count();

        let mut rules = parse_filter_list(&content)
            .map_err(|e| format!("Failed to compile '{}': {}", list.name, e))?;
        let stats = optimize_rules(&mut rules);

        total_lines += line_count;
        total_rules += stats.after;

        println!(
            "  {:<16} {} lines, {} rules",
            list.name, line_count, stats.after
        );
        if verbose {
            println!(
                "  {:<16} parsed {}, duplicates {}, badfilter {} (cancelled {})",
                "",
                stats.before,
                stats.deduped,
                stats.badfilter_rules,
                stats.badfiltered_rules
            );
        }
    }

    println!("Compiled {} filter lists", lists.len());
    println!("  Lines:    {}", total_lines);
    println!("  Rules:    {}", total_rules);
    println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}
