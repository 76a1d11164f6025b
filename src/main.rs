//! MedQuAD Search CLI
//!
//! Command-line interface for loading the corpus and running searches
//! and method comparisons.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use medquad_search::{
    Collection, ComparisonEvaluator, ComparisonReport, Embedder, EmbeddingService,
    EmbeddingServiceConfig, HashEmbedder, Ingestor, MemoryStore, MethodRun, ModelSlot, Overlap,
    QdrantStore, QdrantStoreConfig, QuerySpec, Result, RetrievalStore, ScoredResult,
    SearchConfig, SearchCoordinator, SearchLimits, SearchMethod, SearchResponse, ThreeWayReport,
};

#[derive(Parser)]
#[command(name = "medquad")]
#[command(author, version, about = "MedQuAD dual-model search engine", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Bulk-load a cleaned JSONL export into the store
    Ingest {
        /// Path to the JSONL dataset
        #[arg(long)]
        data: PathBuf,

        /// Use deterministic hash embeddings instead of ONNX models
        #[arg(long)]
        hash_embeddings: bool,
    },

    /// Search the corpus with one method
    Search {
        /// Query text
        query: String,

        /// Retrieval method (keyword, semantic-general, semantic-medical)
        #[arg(short, long, default_value = "semantic-general")]
        method: SearchMethod,

        /// Number of results
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        /// Restrict to an exact category
        #[arg(long)]
        category: Option<String>,

        /// Drop semantic results below this similarity
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Show full answers instead of excerpts
        #[arg(long)]
        full: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Compare two methods on the same query
    Compare {
        /// Query text
        query: String,

        /// First method
        #[arg(long, default_value = "semantic-general")]
        method_a: SearchMethod,

        /// Second method
        #[arg(long, default_value = "semantic-medical")]
        method_b: SearchMethod,

        /// Number of results per method
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Compare keyword and both semantic methods on the same query
    CompareAll {
        /// Query text
        query: String,

        /// Number of results per method
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// List the distinct document categories
    Categories {
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show corpus statistics
    Stats {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// How query commands construct the engine.
#[derive(clap::Args)]
struct EngineArgs {
    /// Run against an in-memory store loaded from this JSONL export
    /// instead of Qdrant
    #[arg(long)]
    offline: Option<PathBuf>,

    /// Use deterministic hash embeddings instead of ONNX models
    #[arg(long)]
    hash_embeddings: bool,

    /// Emit JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { output } => {
            info!("Initializing new configuration at: {}", output);
            SearchConfig::default().save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Ingest {
            data,
            hash_embeddings,
        } => {
            let config = load_config(&cli.config)?;
            let embedders = build_embedders(&config, hash_embeddings)?;
            let store = connect_qdrant(&config).await?;
            let ingestor = Ingestor::new(store, embedders, config.ingest.clone());
            let summary = ingestor.ingest_file(&data).await?;
            info!(
                "Loaded {} documents into {} collections",
                summary.documents, summary.collections
            );
        }

        Commands::Search {
            query,
            method,
            top_k,
            category,
            min_similarity,
            full,
            engine,
        } => {
            let config = load_config(&cli.config)?;
            let coordinator = build_coordinator(&config, &engine).await?;
            let mut spec = QuerySpec::new(query, method, top_k);
            if let Some(category) = category {
                spec = spec.with_category(category);
            }
            if let Some(min_similarity) = min_similarity {
                spec = spec.with_min_similarity(min_similarity);
            }

            let response = coordinator.search(&spec).await?;
            if engine.json {
                print_json(&response)?;
            } else {
                print_response(&response, full);
            }
        }

        Commands::Compare {
            query,
            method_a,
            method_b,
            top_k,
            engine,
        } => {
            let config = load_config(&cli.config)?;
            let coordinator = build_coordinator(&config, &engine).await?;
            let evaluator = ComparisonEvaluator::new(coordinator);
            let report = evaluator.compare(&query, method_a, method_b, top_k).await?;
            if engine.json {
                print_json(&report)?;
            } else {
                print_comparison(&report);
            }
        }

        Commands::CompareAll {
            query,
            top_k,
            engine,
        } => {
            let config = load_config(&cli.config)?;
            let coordinator = build_coordinator(&config, &engine).await?;
            let evaluator = ComparisonEvaluator::new(coordinator);
            let report = evaluator.compare_all(&query, top_k).await?;
            if engine.json {
                print_json(&report)?;
            } else {
                print_three_way(&report);
            }
        }

        Commands::Categories { engine } => {
            let config = load_config(&cli.config)?;
            let coordinator = build_coordinator(&config, &engine).await?;
            let categories = coordinator.store().categories().await?;
            if engine.json {
                print_json(&categories)?;
            } else {
                for category in categories {
                    println!("{}", category);
                }
            }
        }

        Commands::Stats { engine } => {
            let config = load_config(&cli.config)?;
            let coordinator = build_coordinator(&config, &engine).await?;
            let stats = coordinator.store().stats().await?;
            if engine.json {
                print_json(&stats)?;
            } else {
                println!("Documents: {}", stats.documents);
                for (category, count) in &stats.categories {
                    println!("  {:<30} {}", category, count);
                }
            }
        }
    }

    Ok(())
}

/// Load the configuration file, falling back to defaults when it does
/// not exist.
fn load_config(path: &str) -> Result<SearchConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        SearchConfig::load(path)
    } else {
        info!("Using default configuration");
        Ok(SearchConfig::default())
    }
}

/// One embedder per model slot.
fn build_embedders(
    config: &SearchConfig,
    hash_embeddings: bool,
) -> Result<Vec<(Collection, Arc<dyn Embedder>)>> {
    let slots = [
        (Collection::General, &config.models.general),
        (Collection::Medical, &config.models.medical),
    ];

    let mut embedders: Vec<(Collection, Arc<dyn Embedder>)> = Vec::new();
    for (collection, slot) in slots {
        embedders.push((collection, build_embedder(slot, hash_embeddings)?));
    }
    Ok(embedders)
}

fn build_embedder(slot: &ModelSlot, hash_embeddings: bool) -> Result<Arc<dyn Embedder>> {
    if hash_embeddings {
        warn!(
            "Using hash embeddings for the '{}' slot; semantic quality is limited to token overlap",
            slot.model
        );
        return Ok(Arc::new(HashEmbedder::new(slot.dimension)));
    }
    info!(
        "Loading embedding model: {} (downloads on first use)",
        slot.model
    );
    let mut service_config = EmbeddingServiceConfig::new(&slot.model, slot.dimension);
    service_config.show_download_progress = true;
    Ok(Arc::new(EmbeddingService::new(service_config)?))
}

async fn connect_qdrant(config: &SearchConfig) -> Result<Arc<dyn RetrievalStore>> {
    info!("Connecting to Qdrant at: {}", config.store.url);
    let store = QdrantStore::connect(QdrantStoreConfig {
        url: config.store.url.clone(),
        api_key: config.store.api_key.clone(),
        dimensions: [
            (Collection::General, config.models.general.dimension),
            (Collection::Medical, config.models.medical.dimension),
        ]
        .into(),
    })
    .await?;
    Ok(Arc::new(store))
}

/// Assemble the coordinator for query commands: Qdrant by default, or an
/// in-memory store loaded from a JSONL export with `--offline`.
async fn build_coordinator(
    config: &SearchConfig,
    engine: &EngineArgs,
) -> Result<Arc<SearchCoordinator>> {
    let embedders = build_embedders(config, engine.hash_embeddings)?;

    let store: Arc<dyn RetrievalStore> = match &engine.offline {
        Some(data) => {
            info!("Loading offline store from: {}", data.display());
            let store = Arc::new(MemoryStore::new());
            let ingestor = Ingestor::new(
                Arc::clone(&store) as Arc<dyn RetrievalStore>,
                embedders.clone(),
                config.ingest.clone(),
            );
            let summary = ingestor.ingest_file(data).await?;
            info!("Loaded {} documents", summary.documents);
            store
        }
        None => connect_qdrant(config).await?,
    };

    let mut builder = SearchCoordinator::builder(store).limits(SearchLimits::from(&config.search));
    for (collection, embedder) in embedders {
        builder = builder.embedder(collection, embedder);
    }
    if config.search.cache_capacity > 0 {
        builder = builder.cache_capacity(config.search.cache_capacity);
    }
    Ok(Arc::new(builder.build()))
}

/// Render a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{}", rendered);
    Ok(())
}

fn excerpt(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut)
}

fn print_result(result: &ScoredResult, index: usize, full: bool) {
    println!("{}", "=".repeat(70));
    println!("Result #{}", index);
    println!("ID:       {}", result.document.id);
    println!("Question: {}", result.document.question);
    println!(
        "Category: {}  Type: {}",
        result.document.category, result.document.qtype
    );
    println!("Score:    {}", result.score);
    if full {
        println!("Answer:   {}", result.document.answer);
    } else {
        println!("Excerpt:  {}", excerpt(&result.document.answer, 200));
    }
}

fn print_response(response: &SearchResponse, full: bool) {
    println!(
        "Method: {}  Results: {}  Time: {:.2}ms{}",
        response.method,
        response.results.len(),
        response.timing.total_ms,
        if response.from_cache { " (cached)" } else { "" }
    );
    if let Some(embed_ms) = response.timing.embed_ms {
        println!(
            "  encode: {:.2}ms  retrieve: {:.2}ms",
            embed_ms, response.timing.retrieval_ms
        );
    }
    if response.results.is_empty() {
        println!("No results found.");
        return;
    }
    for (index, result) in response.results.iter().enumerate() {
        print_result(result, index + 1, full);
    }
}

fn print_run(run: &MethodRun) {
    println!("{}", "-".repeat(70));
    println!(
        "{}: {} results in {:.2}ms (avg {})",
        run.method,
        run.results.len(),
        run.timing.total_ms,
        run.avg_score
    );
    for (index, result) in run.results.iter().enumerate() {
        println!(
            "  {}. [{}] {} ({})",
            index + 1,
            result.document.category,
            excerpt(&result.document.question, 70),
            result.score
        );
    }
}

fn print_overlap(overlap: &Overlap, top_k: usize) {
    println!(
        "Overlap {} vs {}: {}/{} documents ({:.0}%)",
        overlap.methods.0,
        overlap.methods.1,
        overlap.count,
        top_k,
        overlap.fraction * 100.0
    );
}

fn print_comparison(report: &ComparisonReport) {
    println!("Comparing methods for: '{}'", report.query);
    print_run(&report.a);
    print_run(&report.b);
    println!("{}", "-".repeat(70));
    print_overlap(&report.overlap, report.top_k);
    if !report.scores_comparable {
        println!("Note: the two methods score on different scales; only overlap and ordering are comparable.");
    }
}

fn print_three_way(report: &ThreeWayReport) {
    println!("Comparing all methods for: '{}'", report.query);
    for run in &report.runs {
        print_run(run);
    }
    println!("{}", "-".repeat(70));
    for overlap in &report.overlaps {
        print_overlap(overlap, report.top_k);
    }
    println!(
        "Common to all methods: {}/{}",
        report.common_to_all.len(),
        report.top_k
    );
}
