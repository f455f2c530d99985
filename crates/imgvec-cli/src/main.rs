mod client;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{QueryRequest, config::AppConfig};
use embeddings::{EmbeddingConfig, ImageEmbeddingEngine};
use indexer::{ExtractionOptions, ImageFolder, telemetry::IndexerTelemetry};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::client::{QueryClient, QueryOutcome};

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "imgvec")]
#[command(about = "Extract, load and query image embeddings")]
struct Cli {
    #[arg(long, global = true, default_value = "imgvec.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Re-encode PNG/JPEG-extension images as .jpg, deleting the originals.
    Convert {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Run the pretrained model over the dataset and write one JSON per image.
    Extract {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        embedding_dir: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        skip_convert: bool,
    },
    /// Load stored embeddings and print the matrix shape and file paths.
    Load {
        #[arg(long)]
        embedding_dir: Option<PathBuf>,
    },
    /// POST a stored embedding to the query server.
    Query {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Convert { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(&cfg.data_dir));
            convert(&data_dir, None)
        }
        Commands::Extract {
            data_dir,
            embedding_dir,
            model,
            batch_size,
            skip_convert,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(&cfg.data_dir));
            let embedding_dir =
                embedding_dir.unwrap_or_else(|| PathBuf::from(&cfg.embedding_dir));
            let model = model.unwrap_or_else(|| cfg.model_path.clone());
            let batch_size = batch_size.unwrap_or(cfg.batch_size);
            extract(&data_dir, &embedding_dir, model, batch_size, skip_convert)
        }
        Commands::Load { embedding_dir } => {
            let embedding_dir =
                embedding_dir.unwrap_or_else(|| PathBuf::from(&cfg.embedding_dir));
            load(&embedding_dir)
        }
        Commands::Query { file, url, top_k } => {
            let url = url.unwrap_or_else(|| cfg.query_url.clone());
            query(&file, &url, top_k)
        }
    }
}

fn convert(data_dir: &Path, telemetry: Option<&IndexerTelemetry>) -> anyhow::Result<()> {
    let report = indexer::convert_images_to_jpeg_with_telemetry(data_dir, telemetry)?;
    println!(
        "converted images: converted={}, failed={}, skipped={}",
        report.converted, report.failed, report.skipped
    );
    Ok(())
}

fn extract(
    data_dir: &Path,
    embedding_dir: &Path,
    model: String,
    batch_size: usize,
    skip_convert: bool,
) -> anyhow::Result<()> {
    let telemetry = IndexerTelemetry::default();
    if !skip_convert {
        convert(data_dir, Some(&telemetry))?;
    }

    let folder = ImageFolder::scan(data_dir)?;
    info!(
        classes = folder.classes().len(),
        images = folder.samples().len(),
        "scanned dataset"
    );

    let engine = ImageEmbeddingEngine::new(EmbeddingConfig {
        model_path: model,
        batch_size,
        ..EmbeddingConfig::default()
    });
    info!(
        device = engine.device_mode(),
        runtime = engine.runtime_name(),
        "Using device: {}",
        engine.device_mode()
    );

    let report = indexer::run_extraction_with_telemetry(
        &folder,
        &engine,
        &ExtractionOptions {
            embedding_dir: embedding_dir.to_path_buf(),
            batch_size,
        },
        Some(&telemetry),
    )?;
    info!(telemetry = ?telemetry.snapshot(), "extraction finished");
    println!(
        "extracted embeddings: written={}, failed={}, batches={}",
        report.written, report.failed, report.batches
    );
    Ok(())
}

fn load(embedding_dir: &Path) -> anyhow::Result<()> {
    let set = indexer::load_embeddings(embedding_dir)?;
    let (rows, dim) = set.shape();
    println!("({rows}, {dim})");
    for path in set.paths() {
        println!("{path}");
    }
    Ok(())
}

fn query(file: &Path, url: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    println!("{}", file.display());
    let embedding = indexer::read_embedding(file)?;
    let client = QueryClient::new(url, QUERY_TIMEOUT)?;
    let outcome = client.query(&QueryRequest {
        embedding,
        top_k,
        metric: None,
    })?;

    match outcome {
        QueryOutcome::Matches(body) => {
            let rendered = serde_json::to_string(&body).context("failed rendering response")?;
            println!("Response: {rendered}");
            Ok(())
        }
        QueryOutcome::Rejected { status, body } => {
            println!("Error {status}: {body}");
            anyhow::bail!("query server rejected the request with status {status}")
        }
    }
}
