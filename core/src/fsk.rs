use crate::error::{CassetteError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Coarse candidate positions tried per frame search
pub const FSK_ANALYZE_NSTEPS: usize = 3;

/// Fine candidate positions tried when refining a frame position
pub const FSK_ANALYZE_NSTEPS_FINE: usize = 8;

/// Result of scoring one candidate frame position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCandidate {
    /// Signal-to-noise ratio discounted by bit-to-bit magnitude spread; 0 when
    /// the fixed framing bits did not match
    pub confidence: f32,
    /// Mean magnitude of the winning tone across all bits
    pub amplitude: f32,
    /// Offset of the frame's first bit within the searched samples
    pub start: usize,
    /// Bit values in line order (index 0 = first bit of the pattern)
    pub bits: Vec<u8>,
}

/// Band-limited mark/space analysis for one modem profile.
///
/// The spectrum is divided into bands of `band_width` Hz; mark and space
/// tones are identified by their band index. Per-bit analysis uses a Goertzel
/// filter on the two bands of interest, while carrier autodetection runs a
/// full FFT over the band grid.
#[derive(Clone)]
pub struct FskBands {
    sample_rate: f32,
    band_width: f32,
    fft_size: usize,
    n_bands: usize,
    b_mark: usize,
    b_space: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for FskBands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FskBands")
            .field("band_width", &self.band_width)
            .field("fft_size", &self.fft_size)
            .field("b_mark", &self.b_mark)
            .field("b_space", &self.b_space)
            .finish()
    }
}

impl FskBands {
    pub fn new(sample_rate: u32, mark_hz: f32, space_hz: f32, band_width: f32) -> Result<Self> {
        if band_width <= 0.0 {
            return Err(CassetteError::InvalidConfig("band width must be positive".into()));
        }
        let sample_rate = sample_rate as f32;
        let fft_size = ((sample_rate + band_width / 2.0) / band_width) as usize;
        let n_bands = fft_size / 2 + 1;
        let b_mark = ((mark_hz + band_width / 2.0) / band_width) as usize;
        let b_space = ((space_hz + band_width / 2.0) / band_width) as usize;

        if b_mark >= n_bands || b_space >= n_bands {
            return Err(CassetteError::InvalidConfig(format!(
                "b_mark={} or b_space={} is invalid (nbands={})",
                b_mark, b_space, n_bands
            )));
        }

        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Ok(Self {
            sample_rate,
            band_width,
            fft_size,
            n_bands,
            b_mark,
            b_space,
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn n_bands(&self) -> usize {
        self.n_bands
    }

    pub fn mark_band(&self) -> usize {
        self.b_mark
    }

    pub fn space_band(&self) -> usize {
        self.b_space
    }

    /// Center frequency of a band in Hz
    pub fn band_hz(&self, band: usize) -> f32 {
        band as f32 * self.band_width
    }

    /// Retune to an autodetected carrier: space sits `b_shift` bands from mark.
    pub fn set_tones_by_bandshift(&mut self, b_mark: usize, b_shift: i32) -> Result<()> {
        let b_space = b_mark as i64 + b_shift as i64;
        if b_mark >= self.n_bands || b_space < 1 || b_space >= self.n_bands as i64 {
            return Err(CassetteError::InvalidConfig(format!(
                "band shift {} from mark band {} leaves the spectrum",
                b_shift, b_mark
            )));
        }
        self.b_mark = b_mark;
        self.b_space = b_space as usize;
        Ok(())
    }

    /// Goertzel magnitude of one band, scaled by `scalar`
    pub fn band_magnitude(&self, samples: &[f32], band: usize, scalar: f32) -> f32 {
        let omega = 2.0 * PI * band as f32 / self.fft_size as f32;
        let coeff = 2.0 * omega.cos();

        let mut q1 = 0.0f32;
        let mut q2 = 0.0f32;
        for &sample in samples {
            let q0 = coeff * q1 - q2 + sample;
            q2 = q1;
            q1 = q0;
        }

        let real = q1 - q2 * omega.cos();
        let imag = q2 * omega.sin();
        (real * real + imag * imag).sqrt() * scalar
    }

    /// Mark and space magnitudes for one bit's worth of samples
    pub fn analyze_bit(&self, samples: &[f32]) -> (f32, f32) {
        let scalar = 2.0 / samples.len().max(1) as f32;
        (
            self.band_magnitude(samples, self.b_mark, scalar),
            self.band_magnitude(samples, self.b_space, scalar),
        )
    }

    /// Score `samples` as one frame laid out per `expect`.
    ///
    /// Returns `None` when there are not enough samples for the whole frame.
    /// Fixed '0'/'1' positions are checked first and any mismatch scores 0
    /// without analyzing the data bits.
    pub fn analyze_frame(&self, samples: &[f32], samples_per_bit: f32, expect: &[u8]) -> Option<FrameCandidate> {
        let n_bits = expect.len();
        if n_bits == 0 {
            return None;
        }
        let bit_nsamples = (samples_per_bit + 0.5) as usize;
        let last_begin = (samples_per_bit * (n_bits - 1) as f32 + 0.5) as usize;
        if last_begin + bit_nsamples > samples.len() {
            return None;
        }

        let mut bits = vec![0u8; n_bits];
        let mut signal = vec![0.0f32; n_bits];
        let mut noise = vec![0.0f32; n_bits];

        let mut analyze = |bitnum: usize| {
            let begin = (samples_per_bit * bitnum as f32 + 0.5) as usize;
            let (mark, space) = self.analyze_bit(&samples[begin..begin + bit_nsamples]);
            let (bit, sig, nse) = if mark > space { (1, mark, space) } else { (0, space, mark) };
            bits[bitnum] = bit;
            signal[bitnum] = sig;
            noise[bitnum] = nse;
            bit
        };

        for (bitnum, &want) in expect.iter().enumerate() {
            if want == b'd' {
                continue;
            }
            if analyze(bitnum) != want - b'0' {
                return Some(FrameCandidate::default());
            }
        }
        for (bitnum, &want) in expect.iter().enumerate() {
            if want == b'd' {
                analyze(bitnum);
            }
        }

        let (confidence, amplitude) = frame_confidence(&bits, &signal, &noise);
        Some(FrameCandidate {
            confidence,
            amplitude,
            start: 0,
            bits,
        })
    }

    /// Search `[try_first, try_max)` for the best-scoring frame start.
    ///
    /// Candidates alternate around `try_first` in `try_step` increments
    /// (first, first+step, first-step, first+2*step, ...). The search ends
    /// early once a candidate reaches `search_limit`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_frame(
        &self,
        samples: &[f32],
        samples_per_bit: f32,
        try_first: usize,
        try_max: usize,
        try_step: usize,
        search_limit: f32,
        expect: &[u8],
    ) -> FrameCandidate {
        let step = try_step.max(1) as i64;
        let mut best = FrameCandidate::default();

        for j in 0i64.. {
            let up = if j % 2 == 1 { 1 } else { -1 };
            let t = try_first as i64 + up * ((j + 1) / 2) * step;
            if t >= try_max as i64 {
                break;
            }
            if t < 0 {
                continue;
            }
            let t = t as usize;
            let Some(candidate) = self.analyze_frame(&samples[t.min(samples.len())..], samples_per_bit, expect) else {
                continue;
            };
            if candidate.confidence > best.confidence {
                best = FrameCandidate { start: t, ..candidate };
                if best.confidence >= search_limit {
                    break;
                }
            }
        }

        best
    }

    /// Strongest band at or above `min_magnitude`, ignoring DC.
    pub fn detect_carrier(&self, samples: &[f32], min_magnitude: f32) -> Option<usize> {
        let nsamples = samples.len().min(self.fft_size);
        if nsamples == 0 {
            return None;
        }

        let mut spectrum: Vec<Complex<f32>> = samples[..nsamples]
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(self.fft_size)
            .collect();
        self.fft.process(&mut spectrum);

        let scalar = 2.0 / nsamples as f32;
        let mut best: Option<(usize, f32)> = None;
        for (band, bin) in spectrum.iter().enumerate().take(self.n_bands).skip(1) {
            let mag = bin.norm() * scalar;
            if mag < min_magnitude {
                continue;
            }
            if best.map_or(true, |(_, m)| mag > m) {
                best = Some((band, mag));
            }
        }

        if let Some((band, mag)) = best {
            log::debug!(
                "carrier candidate band {} ({:.0} Hz) magnitude {:.3}",
                band,
                band as f32 * self.sample_rate / self.fft_size as f32,
                mag
            );
        }
        best.map(|(band, _)| band)
    }
}

/// Confidence = SNR x (1 - divergence), where divergence measures how far each
/// bit's signal strays from the average for its value.
fn frame_confidence(bits: &[u8], signal: &[f32], noise: &[f32]) -> (f32, f32) {
    let n = bits.len() as f32;

    let (mut mark_sum, mut mark_n, mut space_sum, mut space_n) = (0.0f32, 0u32, 0.0f32, 0u32);
    for (&bit, &sig) in bits.iter().zip(signal) {
        if bit == 1 {
            mark_sum += sig;
            mark_n += 1;
        } else {
            space_sum += sig;
            space_n += 1;
        }
    }
    let avg_mark = if mark_n > 0 { mark_sum / mark_n as f32 } else { 0.0 };
    let avg_space = if space_n > 0 { space_sum / space_n as f32 } else { 0.0 };

    let mut divergence = 0.0f32;
    for (&bit, &sig) in bits.iter().zip(signal) {
        let avg = if bit == 1 { avg_mark } else { avg_space };
        if avg > 0.0 {
            divergence += (sig - avg).abs() / avg;
        }
    }
    divergence = divergence * 2.0 / n;

    let avg_signal = signal.iter().sum::<f32>() / n;
    let avg_noise = noise.iter().sum::<f32>() / n;
    if avg_signal <= 0.0 {
        return (0.0, 0.0);
    }
    let snr = avg_signal / avg_noise.max(f32::EPSILON);

    (snr * (1.0 - divergence), avg_signal)
}
