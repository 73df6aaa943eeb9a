use std::f32::consts::PI;

/// Default number of entries in the sine lookup table
pub const DEFAULT_SIN_TABLE_LEN: usize = 4096;

/// Phase-continuous sine/silence generator producing interleaved stereo i16.
///
/// The fractional phase left over at the end of one segment is carried into
/// the next, so back-to-back tones of different frequencies join without a
/// click. Silence (frequency 0) resets the carried phase.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    magnitude: i16,
    sin_table: Option<Vec<i16>>,
    carry_phase: f32,
}

impl ToneGenerator {
    /// Create a generator.
    ///
    /// - `sin_table_len`: lookup table size, 0 computes `sin` per sample
    /// - `amplitude`: 1.0 is full scale; values above are clamped and a
    ///   vanishingly small gain still yields a magnitude of 1
    pub fn new(sin_table_len: usize, amplitude: f32) -> Self {
        let scaled = 32767.0 * amplitude.max(0.0) + 0.5;
        let magnitude = scaled.clamp(1.0, 32767.0) as i16;

        let sin_table = (sin_table_len > 0).then(|| {
            (0..sin_table_len)
                .map(|i| {
                    let turns = i as f32 / sin_table_len as f32;
                    (magnitude as f32 * (2.0 * PI * turns).sin()).round() as i16
                })
                .collect()
        });

        Self {
            magnitude,
            sin_table,
            carry_phase: 0.0,
        }
    }

    pub fn magnitude(&self) -> i16 {
        self.magnitude
    }

    /// Fraction of a cycle carried into the next segment, in [0, 1)
    pub fn phase(&self) -> f32 {
        self.carry_phase
    }

    pub fn reset(&mut self) {
        self.carry_phase = 0.0;
    }

    /// Render `nsamples` stereo frames of `freq_hz` (0 = silence).
    pub fn render(&mut self, freq_hz: f32, nsamples: usize, sample_rate: u32) -> Vec<i16> {
        let mut out = Vec::with_capacity(nsamples * 2);
        self.render_into(freq_hz, nsamples, sample_rate, &mut out);
        out
    }

    /// Append `nsamples` stereo frames to `out`.
    pub fn render_into(&mut self, freq_hz: f32, nsamples: usize, sample_rate: u32, out: &mut Vec<i16>) {
        if freq_hz <= 0.0 {
            out.resize(out.len() + nsamples * 2, 0);
            self.carry_phase = 0.0;
            return;
        }

        let wave_nsamples = sample_rate as f32 / freq_hz;
        for i in 0..nsamples {
            let turns = i as f32 / wave_nsamples + self.carry_phase;
            let value = self.sample_at(turns);
            out.push(value);
            out.push(value);
        }

        self.carry_phase = (self.carry_phase + nsamples as f32 / wave_nsamples) % 1.0;
    }

    fn sample_at(&self, turns: f32) -> i16 {
        match &self.sin_table {
            Some(table) => {
                let len = table.len();
                let idx = (len as f32 * turns + 0.5) as usize % len;
                table[idx]
            }
            None => (self.magnitude as f32 * (2.0 * PI * turns).sin()).round() as i16,
        }
    }
}

impl Default for ToneGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SIN_TABLE_LEN, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left(stereo: &[i16]) -> Vec<i16> {
        stereo.iter().step_by(2).copied().collect()
    }

    #[test]
    fn test_silence_resets_phase() {
        let mut tone = ToneGenerator::default();
        tone.render(1200.0, 17, 48000);
        assert!(tone.phase() > 0.0);

        let silence = tone.render(0.0, 10, 48000);
        assert_eq!(silence.len(), 20);
        assert!(silence.iter().all(|&s| s == 0));
        assert_eq!(tone.phase(), 0.0);
    }

    #[test]
    fn test_channels_are_identical() {
        let mut tone = ToneGenerator::default();
        let samples = tone.render(2200.0, 64, 48000);
        for frame in samples.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_phase_continuous_across_frequency_change() {
        let sample_rate = 48000;
        let mut tone = ToneGenerator::new(0, 1.0);
        let first = left(&tone.render(1200.0, 37, sample_rate));
        let carried = tone.phase();
        let second = left(&tone.render(2200.0, 40, sample_rate));

        // Next segment starts exactly where the carried phase says
        let expected = (32767.0 * (2.0 * PI * carried).sin()).round() as i16;
        assert!((second[0] as i32 - expected as i32).abs() <= 1);

        // No jump wider than one sample step of the faster tone
        let max_step = 32767.0 * 2.0 * PI * 2200.0 / sample_rate as f32;
        let jump = (second[0] as f32 - *first.last().unwrap() as f32).abs();
        assert!(jump <= max_step + 1.0, "jump {} exceeds {}", jump, max_step);
    }

    #[test]
    fn test_table_close_to_direct_sine() {
        let mut table = ToneGenerator::new(DEFAULT_SIN_TABLE_LEN, 0.5);
        let mut direct = ToneGenerator::new(0, 0.5);
        let a = table.render(1000.0, 480, 48000);
        let b = direct.render(1000.0, 480, 48000);
        let limit = 2.0 * PI * 16384.0 / DEFAULT_SIN_TABLE_LEN as f32 + 1.0;
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(((*x as f32) - (*y as f32)).abs() <= limit);
        }
    }

    #[test]
    fn test_amplitude_clamped_and_floored() {
        assert_eq!(ToneGenerator::new(16, 4.0).magnitude(), 32767);
        assert_eq!(ToneGenerator::new(16, 0.0).magnitude(), 1);
        assert_eq!(ToneGenerator::new(16, 1e-9).magnitude(), 1);
    }
}
