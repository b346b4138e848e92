use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use benchgrid_core::{select_winners, ResultSet, ResultsDoc, RowFilter};
use benchgrid_report::{
    render_analysis, render_markdown, render_text, scan_sources, summarize, LogSource,
};

#[derive(Parser)]
#[command(name = "benchgrid")]
#[command(about = "llama-bench results toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan llama-bench logs and write results.json
    Generate {
        /// Directory of single-node logs
        #[arg(long)]
        logs: PathBuf,

        /// Directory of distributed RPC logs
        #[arg(long)]
        rpc_logs: Option<PathBuf>,

        /// Output file
        #[arg(short, long, default_value = "results.json")]
        out: PathBuf,
    },

    /// Print per-test winner counts and average throughput
    Summarize {
        /// results.json to analyse
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,
    },

    /// Render the markdown comparison report
    Report {
        /// results.json to analyse
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,

        /// Context window tag (e.g. longctx32768); default window if omitted
        #[arg(long)]
        context: Option<String>,

        /// Comma-separated backend column order (sorted env list if omitted)
        #[arg(long, value_delimiter = ',')]
        backends: Option<Vec<String>>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print placement counts, head-to-head wins, and feature impact
    Analyze {
        /// results.json to analyse
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,

        /// Flash Attention filter
        #[arg(long, default_value = "on", value_parser = ["on", "off", "any"])]
        fa: String,
    },

    /// Print the winner set for every model row of one test
    Winners {
        /// results.json to analyse
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,

        /// Test to inspect (pp512, tg128)
        #[arg(short, long)]
        test: String,

        /// Context window tag; default window if omitted
        #[arg(long)]
        context: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { logs, rpc_logs, out } => cmd_generate(logs, rpc_logs, out),
        Commands::Summarize { input } => cmd_summarize(input),
        Commands::Report { input, context, backends, out } => {
            cmd_report(input, context.as_deref(), backends, out)
        }
        Commands::Analyze { input, fa } => cmd_analyze(input, &fa),
        Commands::Winners { input, test, context } => {
            cmd_winners(input, &test, context.as_deref())
        }
    }
}

fn load_doc(path: &PathBuf) -> Result<ResultsDoc> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    ResultsDoc::from_json(&text).with_context(|| format!("malformed {}", path.display()))
}

fn cmd_generate(logs: PathBuf, rpc_logs: Option<PathBuf>, out: PathBuf) -> Result<()> {
    let mut sources = vec![LogSource::new(logs)];
    if let Some(dir) = rpc_logs {
        sources.push(LogSource::rpc(dir));
    }

    let doc = scan_sources(&sources).context("failed to scan log sources")?;
    tracing::info!(
        runs = doc.runs.len(),
        environments = doc.meta.environments.len(),
        builds = doc.meta.llamacpp_builds.len(),
        "scan complete"
    );
    let json = serde_json::to_string_pretty(&doc)?;
    fs::write(&out, json).with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "Wrote {} with {} rows across {} environments ({} builds)",
        out.display(),
        doc.runs.len(),
        doc.meta.environments.len(),
        doc.meta.llamacpp_builds.len()
    );
    Ok(())
}

fn cmd_summarize(input: PathBuf) -> Result<()> {
    let doc = load_doc(&input)?;
    let summaries = summarize(&doc.runs);
    print!("{}", render_text(&summaries));
    Ok(())
}

fn cmd_report(
    input: PathBuf,
    context: Option<&str>,
    backends: Option<Vec<String>>,
    out: Option<PathBuf>,
) -> Result<()> {
    let doc = load_doc(&input)?;
    let md = render_markdown(&doc, context, backends.as_deref())?;
    match out {
        Some(path) => {
            fs::write(&path, md)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{md}"),
    }
    Ok(())
}

fn cmd_analyze(input: PathBuf, fa: &str) -> Result<()> {
    let doc = load_doc(&input)?;
    let fa = match fa {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    };
    let set = ResultSet::from_runs(&doc.runs);
    print!("{}", render_analysis(&doc.runs, &set.environments, fa));
    Ok(())
}

fn cmd_winners(input: PathBuf, test: &str, context: Option<&str>) -> Result<()> {
    let doc = load_doc(&input)?;
    let set = ResultSet::from_runs(&doc.runs);
    let ctx = match context {
        Some(key) => set
            .context(key)
            .with_context(|| format!("unknown context: {key}"))?,
        None => set.default_context().context("no successful runs")?,
    };
    let group = ctx
        .tests
        .get(test)
        .with_context(|| format!("no {test} runs in context {}", ctx.key))?;

    println!("{} — {} ({} backends)", test, ctx.label, set.environments.len());
    for row in RowFilter::default().apply(group) {
        let candidates = row.candidates(&set.environments);
        let winners = select_winners(&candidates);
        if winners.is_empty() {
            println!("  {:<50} —", row.model);
        } else {
            println!("  {:<50} {}", row.model, winners.join(", "));
        }
    }
    Ok(())
}
