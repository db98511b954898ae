// src/bin/build_embedding_store.rs
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::info;
use persona_lib::{
    store::{EmbeddingStore, InMemoryStore, LmdbStore},
    utils::{env::load_env, progress::ProgressConfig},
};

#[derive(Parser)]
#[command(author, version, about = "Convert a GloVe text file into an LMDB embedding store", long_about = None)]
struct BuildArgs {
    /// GloVe vectors, `word v1 ... vD` per line
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the LMDB environment; created if missing
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let args = BuildArgs::parse();
    let start = Instant::now();

    let flat = InMemoryStore::from_glove_file(&args.input)?;
    let total = flat.len() as u64;
    let pb = ProgressConfig::from_env().create_progress_bar(total, "Writing vectors");

    let store = LmdbStore::create(
        &args.output,
        flat.into_pairs().inspect(|_| {
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }),
    )?;
    if let Some(pb) = pb {
        pb.finish_with_message("Complete");
    }

    info!(
        "Built LMDB store at {} with {} words of dimension {} in {:.2?}",
        args.output.display(),
        store.len(),
        store.dimension(),
        start.elapsed()
    );
    Ok(())
}
