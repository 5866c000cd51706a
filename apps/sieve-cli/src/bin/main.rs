use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sieve_core::config::Config;
use sieve_core::loader::DocumentLoader;
use sieve_core::{Document, VectorStore};
use sieve_pipeline::{ResultSet, RetrievalComponent, SelectionInput};

#[derive(Parser, Debug)]
#[command(name = "sieve", version, about = "Retrieval with LLM relevance filtering", long_about = None)]
struct Args {
    /// Directory holding sieve.toml and its per-environment overlays
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load documents from a file or directory and add the new ones to the store
    Ingest {
        path: PathBuf,
    },
    /// Show documents already in the store
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Search the store, optionally resolving a selection against the results
    Search {
        query: String,

        /// JSON array of result indexes, e.g. '["0","2"]'
        #[arg(short, long)]
        select: Option<String>,

        /// Ingest this file or directory before searching
        #[arg(long)]
        ingest: Option<PathBuf>,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn spinner(msg: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    Ok(pb)
}

fn load_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    DocumentLoader::new()
        .load(path)
        .with_context(|| format!("loading documents from {}", path.display()))
}

fn print_documents(docs: &[Document]) {
    for doc in docs {
        let index = doc.sequence_index.map_or_else(|| "-".to_string(), |i| i.to_string());
        let id = doc.id.as_deref().unwrap_or("-");
        let mut preview: String = doc.content.chars().take(120).collect();
        if preview.len() < doc.content.len() {
            preview.push_str("...");
        }
        println!("[{index}] {id}\n    {}", preview.replace('\n', " "));
        for (k, v) in &doc.metadata {
            println!("    {k}: {v}");
        }
    }
}

fn print_results(results: &ResultSet, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&results.as_rows())?);
    } else {
        println!("columns: {}", results.columns().join(", "));
        print_documents(results.documents());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = Config::load_from(&args.config_dir).map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;

    match args.command {
        Command::Ingest { path } => {
            let docs = load_documents(&path)?;
            let offered = docs.len();
            let component = RetrievalComponent::builder(settings).ingest_data(docs).build()?;
            let pb = spinner(&format!("Ingesting {offered} documents"))?;
            component.vector_store().await?;
            pb.finish_and_clear();
            println!("✅ Ingest complete ({offered} documents offered, {})", component.status().await);
        }
        Command::List { limit } => {
            let component = RetrievalComponent::builder(settings).build()?;
            let store = component.vector_store().await?;
            let docs = store.list(limit).await?;
            println!("📊 {} documents in collection '{}'", docs.len(), store.collection_name());
            print_documents(&docs);
        }
        Command::Search { query, select, ingest, json } => {
            let docs = match &ingest {
                Some(path) => load_documents(path)?,
                None => Vec::new(),
            };
            let component = RetrievalComponent::builder(settings).ingest_data(docs).build()?;
            let pb = spinner("Searching")?;
            let results = component.search(&query).await;
            pb.finish_and_clear();
            let results = results?;

            match select {
                None => {
                    print_results(&results, json)?;
                    eprintln!("{}", component.status().await);
                }
                Some(raw) => {
                    let selected = component.selected_results(&query, &SelectionInput::from(raw.as_str())).await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&selected)?);
                    } else {
                        print_documents(&selected);
                    }
                    eprintln!("{}", component.status().await);
                }
            }
        }
    }
    Ok(())
}
