//! PCM format helpers: interleaved stereo S16LE in and out, mono float inside.

/// Bytes per interleaved stereo 16-bit frame
pub const STEREO_FRAME_BYTES: usize = 4;

/// Downmix interleaved stereo i16 to mono float in [-1, 1)
///
/// # Panics
/// If samples length is not even
pub fn stereo_to_mono(samples: &[i16]) -> Vec<f32> {
    assert!(
        samples.len() % 2 == 0,
        "Stereo audio must have even number of samples"
    );
    samples
        .chunks_exact(2)
        .map(|lr| (lr[0] as f32 + lr[1] as f32) / 2.0 / 32768.0)
        .collect()
}

/// Downmix whole S16LE stereo frames from `bytes`; a trailing partial frame is ignored
pub fn s16le_stereo_to_mono(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(STEREO_FRAME_BYTES)
        .map(|f| {
            let left = i16::from_le_bytes([f[0], f[1]]) as f32;
            let right = i16::from_le_bytes([f[2], f[3]]) as f32;
            (left + right) / 2.0 / 32768.0
        })
        .collect()
}

/// Duplicate mono float samples onto both channels of an i16 stream
pub fn mono_to_stereo(samples: &[f32]) -> Vec<i16> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        out.push(v);
        out.push(v);
    }
    out
}

/// Serialize interleaved i16 samples as little-endian bytes
pub fn to_s16le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Resample mono audio to a target sample rate using linear interpolation
///
/// # Example
/// ```ignore
/// let audio_44k = resample_audio(&audio_48k, 48000, 44100);
/// ```
pub fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64)) as usize;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}
