use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetag_core::{BoundingBox, OnnxEmbedder, Orientation, Preprocessor, Registry, SharedRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod manifest;
mod report;
mod tagger;

use config::Config;
use manifest::Manifest;
use report::Report;

/// Pending requests the engine thread buffers before callers wait.
const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Parser)]
#[command(name = "facetag", version, about = "Tag the people in a set of images by face identity")]
struct Cli {
    /// TOML configuration file (FACETAG_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify every detected face in a manifest and report identities per image
    Tag {
        /// JSON manifest of images and detector boxes
        #[arg(short, long)]
        manifest: PathBuf,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Embedding model (overrides the configured path)
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Write the aligned 112x112 face for one bounding box
    Crop {
        /// Source image
        #[arg(short, long)]
        image: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        left: f32,
        #[arg(long, allow_hyphen_values = true)]
        top: f32,
        #[arg(long, allow_hyphen_values = true)]
        right: f32,
        #[arg(long, allow_hyphen_values = true)]
        bottom: f32,
        /// Clockwise rotation applied before cropping
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rotation: f32,
        /// Mirror horizontally after rotating
        #[arg(long)]
        mirror: bool,
        /// Padding around the box (defaults to the configured padding)
        #[arg(long)]
        padding: Option<u32>,
        /// Output image (format from extension)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Tag {
            manifest,
            output,
            model,
        } => run_tag(&config, &manifest, output.as_deref(), model).await,
        Commands::Crop {
            image,
            left,
            top,
            right,
            bottom,
            rotation,
            mirror,
            padding,
            output,
        } => {
            let preprocessor =
                Preprocessor::new(padding.unwrap_or(config.padding), config.resize_filter);
            run_crop(
                &image,
                &BoundingBox::new(left, top, right, bottom),
                Orientation::new(rotation, mirror),
                preprocessor,
                &output,
            )
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_tag(
    config: &Config,
    manifest_path: &Path,
    output: Option<&Path>,
    model: Option<PathBuf>,
) -> Result<()> {
    let started_at = chrono::Utc::now();
    let run_id = uuid::Uuid::new_v4();

    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;
    tracing::info!(
        %run_id,
        images = manifest.images.len(),
        faces = manifest.face_count(),
        "manifest loaded"
    );

    let model_path = model.unwrap_or_else(|| config.model_path());
    let embedder = OnnxEmbedder::load(&model_path.to_string_lossy(), config.intra_threads)
        .with_context(|| format!("failed to load model {}", model_path.display()))?;
    let model_version = embedder.model_version().to_string();

    let engine = engine::spawn_engine(embedder, ENGINE_QUEUE_DEPTH)?;
    let registry = Arc::new(SharedRegistry::new(Registry::with_threshold(
        config.distance_threshold,
    )));
    let preprocessor = Preprocessor::new(config.padding, config.resize_filter);

    let images = tagger::tag_images(
        &manifest.images,
        preprocessor,
        engine,
        Arc::clone(&registry),
        config.max_concurrent_images,
    )
    .await;

    let report = Report::build(
        run_id,
        started_at,
        model_version,
        registry.threshold(),
        images,
        registry.labels(),
    );

    tracing::info!(
        %run_id,
        images = report.summary.images,
        faces = report.summary.faces,
        failed_faces = report.summary.failed_faces,
        identities = report.summary.identities,
        "tagging finished"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_crop(
    image_path: &Path,
    bbox: &BoundingBox,
    orientation: Orientation,
    preprocessor: Preprocessor,
    output: &Path,
) -> Result<()> {
    let image = image::open(image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?
        .to_rgb8();

    let aligned = preprocessor.prepare_face(&image, orientation, bbox)?;
    aligned
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        output = %output.display(),
        filter = %preprocessor.filter,
        padding = preprocessor.padding,
        "aligned face written"
    );
    println!("{}", output.display());
    Ok(())
}
