// src/main.rs
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use persona_lib::{
    features::{CategoryFeatureExtractor, EmbeddingFeatureExtractor, FeaturePipeline},
    models::{CoverageSummary, Profile},
    utils::{
        env::load_env,
        feature_config::{FeatureConfig, StoreMode},
        progress::{create_logging_callback, create_progress_bar_callback, AbortFlag, ExtractionHooks, ProgressConfig},
    },
    FeatureMatrix,
};

#[derive(Parser)]
#[command(author, version, about = "Extract personality features from profile JSON Lines", long_about = None)]
struct ExtractArgs {
    /// Profiles, one JSON object per line
    #[arg(short, long)]
    input: PathBuf,

    /// Destination CSV for the feature matrix
    #[arg(short, long)]
    output: PathBuf,

    /// Per-profile coverage records as JSON Lines
    #[arg(long)]
    coverage: Option<PathBuf>,

    /// Overrides EMBEDDING_STORE_PATH
    #[arg(long)]
    store: Option<PathBuf>,

    /// Overrides EMBEDDING_STORE_MODE (flat | lmdb)
    #[arg(long)]
    store_mode: Option<StoreMode>,

    /// Overrides CATEGORY_SCHEMA, comma-separated
    #[arg(long, value_delimiter = ',')]
    schema: Option<Vec<String>>,

    /// Overrides FEATURE_WORKERS
    #[arg(long)]
    workers: Option<usize>,

    /// Skip standard scaling
    #[arg(long)]
    no_scaling: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    info!("Starting profile feature extraction");

    let args = ExtractArgs::parse();
    let mut config = FeatureConfig::from_env();
    if let Some(store) = args.store {
        config.store_path = Some(store);
    }
    if let Some(mode) = args.store_mode {
        config.store_mode = mode;
    }
    if let Some(schema) = args.schema {
        config.category_schema = schema
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(workers) = args.workers.filter(|&w| w > 0) {
        config.workers = workers;
    }
    if args.no_scaling {
        config.scaling = false;
    }
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    let start = Instant::now();

    let profiles = read_profiles(&args.input)?;
    info!("Loaded {} profiles from {}", profiles.len(), args.input.display());

    let abort = AbortFlag::new();
    let ctrl_c_flag = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current profile");
            ctrl_c_flag.abort();
        }
    });

    let progress = match progress_config.create_progress_bar(profiles.len() as u64, "Extracting embeddings") {
        Some(pb) => create_progress_bar_callback(pb),
        None => create_logging_callback("embedding"),
    };
    let hooks = ExtractionHooks::default()
        .with_progress(progress)
        .with_abort(abort);

    let mut builder = FeaturePipeline::builder().workers(config.workers).hooks(hooks);
    let mut columns = Vec::new();
    if !config.category_schema.is_empty() {
        let category = CategoryFeatureExtractor::new(config.category_schema.iter().cloned())?;
        columns.extend(category.schema().iter().map(|s| s.to_string()));
        builder = builder.category(category);
    }
    if config.store_path.is_some() {
        let store = config.open_store()?;
        let embedding = EmbeddingFeatureExtractor::from_boxed(store)
            .with_low_coverage_warning(config.low_coverage_warn_ratio);
        columns.extend(embedding_columns(embedding.dimension()));
        builder = builder.embedding(embedding);
    }
    if config.scaling {
        builder = builder.standard_scaler();
    }
    let mut pipeline = builder
        .build()
        .context("Neither CATEGORY_SCHEMA nor EMBEDDING_STORE_PATH is configured")?;

    let output = if pipeline.requires_fit() {
        pipeline.fit_transform(&profiles).await?
    } else {
        pipeline.transform(&profiles).await?
    };

    write_matrix(&args.output, &columns, &profiles, &output.matrix)?;
    info!(
        "Wrote {} x {} feature matrix to {}",
        output.matrix.nrows(),
        output.matrix.ncols(),
        args.output.display()
    );

    if let Some(records) = output.coverage {
        if let Some(summary) = CoverageSummary::from_records(&records) {
            log_summary(&summary);
        }
        if let Some(path) = args.coverage {
            let mut writer = BufWriter::new(
                File::create(&path).context(format!("Failed to create {}", path.display()))?,
            );
            for record in &records {
                serde_json::to_writer(&mut writer, record)?;
                writeln!(writer)?;
            }
            writer.flush()?;
            info!("Wrote coverage for {} profiles to {}", records.len(), path.display());
        }
    }

    info!("Feature extraction finished in {:.2?}", start.elapsed());
    Ok(())
}

fn read_profiles(path: &Path) -> Result<Vec<Profile>> {
    let file = File::open(path).context(format!("Failed to open {}", path.display()))?;
    let mut profiles = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context(format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let profile: Profile = serde_json::from_str(&line)
            .context(format!("Invalid profile on line {}", idx + 1))?;
        profiles.push(profile);
    }
    Ok(profiles)
}

fn embedding_columns(dimension: usize) -> Vec<String> {
    ["mean", "max", "min"]
        .iter()
        .flat_map(|stat| (0..dimension).map(move |i| format!("emb_{}_{}", stat, i)))
        .collect()
}

fn write_matrix(path: &Path, columns: &[String], profiles: &[Profile], matrix: &FeatureMatrix) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).context(format!("Failed to create {}", path.display()))?;
    writer.write_record(std::iter::once("user_id").chain(columns.iter().map(String::as_str)))?;
    for (profile, row) in profiles.iter().zip(matrix.rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(profile.user_id.clone());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn log_summary(summary: &CoverageSummary) {
    info!(
        "Coverage over {} profiles: mean {:.3}, min {:.3}, max {:.3}, mean word count {:.1}",
        summary.profiles, summary.mean_ratio, summary.min_ratio, summary.max_ratio, summary.mean_word_count
    );
}
