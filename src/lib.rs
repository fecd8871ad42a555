pub mod audio_tag;
pub mod block;
pub mod classifier;
pub mod embedding;
pub mod error;
pub mod labels;
pub mod layers;
pub mod weights;

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use embedding::Waveform;
pub use error::{Result, TagError};

/// Embedding width produced by the VGGish postprocessor.
pub const EMBEDDING_SIZE: usize = 128;
/// Embeddings per block the classifier was trained on.
pub const BLOCK_WINDOW: usize = 10;
/// Width of the three feature layers.
pub const HIDDEN_UNITS: usize = 1024;
/// AudioSet ontology size.
pub const NUM_CLASSES: usize = 527;
/// Seconds of audio covered by one embedding.
pub const EMBEDDING_HOP_SECONDS: f32 = 0.96;

/// Decode any file symphonia understands into interleaved samples in [-1, 1].
pub fn read_audio_file<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let path = path.as_ref();
    let decode_err = |reason: String| TagError::AudioDecode {
        path: path.display().to_string(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("unknown sample rate".into()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frame, the decoder has already resynchronised.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };
        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(decode_err("unknown channel layout".into()));
    }

    let waveform = Waveform::new(samples, channels, sample_rate);
    tracing::debug!(
        "decoded {} ({} Hz, {} channels, {:.2}s)",
        path.display(),
        sample_rate,
        channels,
        waveform.duration_seconds()
    );
    Ok(waveform)
}

/// Write interleaved samples as 16-bit PCM WAV.
pub fn write_audio_file<P: AsRef<Path>>(path: P, waveform: &Waveform) -> Result<()> {
    let path = path.as_ref();
    let encode_err = |e: hound::Error| TagError::AudioDecode {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let spec = hound::WavSpec {
        channels: waveform.channels as u16,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(encode_err)?;

    for &sample in &waveform.samples {
        let scaled_sample =
            (sample * (i16::MAX as f32)).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(scaled_sample).map_err(encode_err)?;
    }

    writer.finalize().map_err(encode_err)?;
    Ok(())
}
