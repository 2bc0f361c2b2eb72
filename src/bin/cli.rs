//! CLI binary for sage.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sage::knowledge::RunOutcome;
use sage::{KnowledgeStore, RunReport, SageConfig, StudyPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sage: study any topic from papers, news and discussion.
#[derive(Parser)]
#[command(name = "sage", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Retrieve, summarize and record study material for a topic.
    Run {
        /// Topic to study.
        #[arg(short, long)]
        topic: String,

        /// Number of results to return.
        #[arg(short = 'n', long)]
        count: usize,
    },

    /// Show what is known about a topic.
    Show {
        #[arg(short, long)]
        topic: String,
    },

    /// List recent runs for a topic, most recent first.
    History {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sage=info,sage_search=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => SageConfig::from_file(path)?,
        None => SageConfig::load_or_default(&SageConfig::default_config_path())?,
    };

    match cli.command {
        Command::Run { topic, count } => run_study(config, &topic, count).await,
        Command::Show { topic } => show_topic(&config, &topic).await,
        Command::History { topic, limit } => show_history(&config, &topic, limit).await,
        Command::Config => print_config(&config),
    }
}

fn open_store(config: &SageConfig) -> anyhow::Result<Arc<KnowledgeStore>> {
    let store = KnowledgeStore::open(
        &config.knowledge.root_dir,
        config.knowledge.mastery_policy(),
    )?;
    Ok(Arc::new(store))
}

async fn run_study(config: SageConfig, topic: &str, count: usize) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let pipeline = StudyPipeline::from_config(config, store)?;
    let cancel = pipeline.cancel_token();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling run...");
            cancel_clone.cancel();
        }
    });

    let report = pipeline.run(topic, count).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "{} ({} of {} requested)\n",
        report.topic,
        report.selected.len(),
        report.requested_count
    );
    for item in &report.selected {
        let document = &item.result.document;
        println!("{}. {} [{}]", item.result.rank, document.title, document.source.name());
        println!("   {}", document.canonical_url);
        for line in item.summary.lines() {
            println!("   {line}");
        }
        println!();
    }

    if !report.source_failures.is_empty() {
        println!("Unavailable sources:");
        for failure in &report.source_failures {
            println!("  - {}: {}", failure.source.name(), failure.reason);
        }
    }
    if !report.candidate_failures.is_empty() {
        println!("Skipped documents: {}", report.candidate_failures.len());
    }
    if report.deadline_hit {
        println!("Run deadline reached; some documents were not fetched.");
    }

    let knowledge = &report.knowledge_after;
    println!(
        "\nMastery: {} | subtopics covered: {} | runs recorded: {}",
        knowledge.mastery_level,
        knowledge.covered_subtopics.len(),
        knowledge.history.len()
    );
}

async fn show_topic(config: &SageConfig, topic: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let entry = store.read(topic).await?;
    if entry.is_new() {
        println!("Nothing recorded for \"{}\" yet.", entry.topic);
        return Ok(());
    }

    println!("{}", entry.topic);
    println!("Mastery: {}", entry.mastery_level);
    if let Some(updated) = entry.last_updated {
        println!("Last updated: {}", updated.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("\nSubtopics:");
    for subtopic in &entry.covered_subtopics {
        println!("  - {subtopic}");
    }

    if let Some(latest) = entry.history.last()
        && let Some(digest) = store.summary(&latest.summary_ref).await?
    {
        println!("\nLatest digest ({}):\n\n{digest}", latest.timestamp.format("%Y-%m-%d"));
    }
    Ok(())
}

async fn show_history(config: &SageConfig, topic: &str, limit: usize) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let runs = store.recent_runs(topic, limit).await?;
    if runs.is_empty() {
        println!("No runs recorded for \"{topic}\".");
        return Ok(());
    }

    for run in runs {
        let outcome = match &run.outcome {
            RunOutcome::Succeeded => format!("{} selected", run.selected_urls.len()),
            RunOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        let elapsed = run.ended_at - run.started_at;
        println!(
            "{}  {}  n={}  {}  ({:.1}s)",
            run.ended_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_id,
            run.requested_count,
            outcome,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        for failure in &run.source_failures {
            println!("    source {}: {}", failure.source, failure.reason);
        }
        for failure in &run.candidate_failures {
            println!("    {}: {}", failure.url, failure.reason);
        }
    }
    Ok(())
}

fn print_config(config: &SageConfig) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    if redacted.search.brave_api_key.is_some() {
        redacted.search.brave_api_key = Some("<redacted>".into());
    }
    print!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}
