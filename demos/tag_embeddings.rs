/*
Tag precomputed VGGish embeddings, one line per block.

The embeddings file is a safetensors file holding an `embeddings` tensor of
shape [T, 128] with quantised values in 0..=255.

cargo run --example tag_embeddings -- --weights attention.safetensors --labels class_labels_indices.csv --embeddings clip.safetensors --hop 10
*/
use clap::Parser;
use eyre::Result;
use ndarray::Array2;
use tracing_subscriber::EnvFilter;
use vggish_tag::audio_tag::{AudioTag, AudioTagConfig};
use vggish_tag::weights::WeightStore;
use vggish_tag::EMBEDDING_SIZE;

/// Tag embeddings
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    weights: String,

    #[arg(short, long)]
    labels: String,

    #[arg(short, long)]
    embeddings: String,

    #[arg(long, default_value_t = 1)]
    hop: usize,

    #[arg(long, default_value_t = 0.2)]
    threshold: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let config = AudioTagConfig {
        weights: args.weights,
        labels: args.labels,
        hop: args.hop,
        threshold: args.threshold,
        ..Default::default()
    };
    let tagger = AudioTag::new(config)?;

    let store = WeightStore::open(&args.embeddings)?;
    let tensor = store.tensor_f32("embeddings")?;
    let frames = tensor.data.len() / EMBEDDING_SIZE;
    let embeddings = Array2::from_shape_vec((frames, EMBEDDING_SIZE), tensor.data)?;

    let labels = tagger.compute(embeddings.view())?;
    for (block, names) in &labels {
        println!(
            "{:>7.2}s  {}",
            tagger.block_start_seconds(*block),
            names.join(", ")
        );
    }
    println!("✅ {} blocks from {} embeddings", labels.len(), frames);
    Ok(())
}
