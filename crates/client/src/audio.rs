//! PCM helpers for the buffered capture strategy.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate the offline transcriber expects.
pub const TRANSCRIBER_SAMPLE_RATE: f64 = 16000.0;

const RESAMPLE_CHUNK: usize = 1024;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )?;
    Ok(resampler)
}

/// Resamples a complete mono recording. The final partial chunk is zero padded.
pub fn resample(samples: &[f32], in_rate: f64, out_rate: f64) -> anyhow::Result<Vec<f32>> {
    if samples.is_empty() || in_rate == out_rate {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(in_rate, out_rate, RESAMPLE_CHUNK)?;
    let mut output = Vec::with_capacity((samples.len() as f64 * out_rate / in_rate) as usize);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let frames = resampler.process(&[chunk], None)?;
        output.extend_from_slice(&frames[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let partial: [&[f32]; 1] = [rest];
        let frames = resampler.process_partial(Some(&partial[..]), None)?;
        output.extend_from_slice(&frames[0]);
    }
    Ok(output)
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}
