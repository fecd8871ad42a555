/*
Tag an audio file end to end: decode, VGGish embeddings, attention classifier.

cargo run --example tag_file --features vggish -- --vggish vggish.onnx --pca vggish_pca_params.safetensors --weights attention.safetensors --labels class_labels_indices.csv clip.wav
*/
use clap::Parser;
use eyre::Result;
use tracing_subscriber::EnvFilter;
use vggish_tag::audio_tag::{AudioTag, AudioTagConfig};
use vggish_tag::embedding::{VggishConfig, VggishProvider};

/// Tag audio file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    path: String,

    #[arg(long)]
    vggish: String,

    #[arg(long)]
    pca: String,

    #[arg(short, long)]
    weights: String,

    #[arg(short, long)]
    labels: String,

    #[arg(long, default_value_t = 1)]
    hop: usize,

    #[arg(long)]
    num_threads: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut provider = VggishProvider::new(VggishConfig {
        model: args.vggish,
        pca_params: args.pca,
        num_threads: args.num_threads,
        ..Default::default()
    })?;
    let tagger = AudioTag::new(AudioTagConfig {
        weights: args.weights,
        labels: args.labels,
        hop: args.hop,
        ..Default::default()
    })?;

    let labels = tagger.compute_file(&mut provider, &args.path)?;
    provider.close();

    for (block, names) in &labels {
        println!(
            "{:>7.2}s  {}",
            tagger.block_start_seconds(*block),
            names.join(", ")
        );
    }
    Ok(())
}
