use crate::databits::BitCodec;
use crate::error::{CassetteError, Result};
use crate::fsk::{FrameCandidate, FskBands, FSK_ANALYZE_NSTEPS, FSK_ANALYZE_NSTEPS_FINE};
use crate::pcm::{s16le_stereo_to_mono, STEREO_FRAME_BYTES};
use crate::profile::FskFramePlan;
use std::collections::VecDeque;

/// Consecutive low-confidence searches tolerated before carrier is dropped
pub const FSK_MAX_NOCONFIDENCE_BITS: u32 = 20;

/// Confidence below this fraction of the session peak triggers a fine search
const REFINE_CONFIDENCE_RATIO: f32 = 0.75;

/// Amplitude below this fraction of the tracked level counts as a dropout
const DROPOUT_AMPLITUDE_RATIO: f32 = 0.25;

/// Counters for the current carrier, reported when it is lost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStats {
    pub frames_decoded: u64,
    pub carrier_nsamples: u64,
    pub confidence_total: f32,
    pub amplitude_total: f32,
}

/// Mutable receive-session state.
#[derive(Debug, Clone)]
pub struct ReceiverState {
    samplebuf: Vec<f32>,
    nvalid: usize,
    advance: usize,
    carrier: bool,
    carrier_band: Option<usize>,
    track_amplitude: f32,
    peak_confidence: f32,
    noconfidence: u32,
    stats: ReceiverStats,
    /// Downmixed samples waiting for room in `samplebuf`
    pending: VecDeque<f32>,
    /// Tail of a stereo frame split across reads
    leftover: Vec<u8>,
}

impl ReceiverState {
    fn new(samplebuf_size: usize) -> Self {
        Self {
            samplebuf: vec![0.0; samplebuf_size],
            nvalid: 0,
            advance: 0,
            carrier: false,
            carrier_band: None,
            track_amplitude: 0.0,
            peak_confidence: 0.0,
            noconfidence: 0,
            stats: ReceiverStats::default(),
            pending: VecDeque::new(),
            leftover: Vec::with_capacity(STEREO_FRAME_BYTES),
        }
    }

    fn drop_carrier(&mut self) {
        self.carrier = false;
        self.track_amplitude = 0.0;
        self.peak_confidence = 0.0;
        self.stats = ReceiverStats::default();
    }
}

/// Frame-synchronizing FSK demodulator.
///
/// Feed it audio in any chunk size; it returns whatever bytes the bit codec
/// produced from the frames completed so far. Frame search only runs once a
/// full search window is buffered, otherwise the samples wait for the next
/// call.
pub struct FskReceiver {
    plan: FskFramePlan,
    bands: FskBands,
    codec: BitCodec,
    state: ReceiverState,
}

impl FskReceiver {
    pub fn new(plan: FskFramePlan) -> Result<Self> {
        let profile = &plan.profile;
        let bands = FskBands::new(profile.sample_rate, profile.mark_hz, profile.space_hz, profile.band_width)?;
        let codec = BitCodec::new(profile.codec, profile.data_bits);
        let state = ReceiverState::new(plan.samplebuf_size);

        log::info!(
            "receiver: {} baud mark={:.1} space={:.1} band_width={:.1} frame={}",
            profile.data_rate,
            profile.mark_hz,
            profile.space_hz,
            profile.band_width,
            String::from_utf8_lossy(&plan.expect_data)
        );

        Ok(Self {
            plan,
            bands,
            codec,
            state,
        })
    }

    pub fn plan(&self) -> &FskFramePlan {
        &self.plan
    }

    pub fn is_carrier(&self) -> bool {
        self.state.carrier
    }

    /// Mark tone currently tracked, in Hz
    pub fn mark_hz(&self) -> f32 {
        self.bands.band_hz(self.bands.mark_band())
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.state.stats
    }

    /// Samples received but not yet consumed by frame search
    pub fn buffered_samples(&self) -> usize {
        self.state.nvalid - self.state.advance.min(self.state.nvalid) + self.state.pending.len()
    }

    pub fn reset(&mut self) -> Result<()> {
        let profile = &self.plan.profile;
        self.bands = FskBands::new(profile.sample_rate, profile.mark_hz, profile.space_hz, profile.band_width)?;
        self.codec.reset();
        self.state = ReceiverState::new(self.plan.samplebuf_size);
        Ok(())
    }

    /// Feed interleaved stereo S16LE bytes, split anywhere.
    pub fn push_pcm(&mut self, mut bytes: &[u8]) -> Result<Vec<u8>> {
        let st = &mut self.state;
        if !st.leftover.is_empty() {
            let take = (STEREO_FRAME_BYTES - st.leftover.len()).min(bytes.len());
            st.leftover.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if st.leftover.len() == STEREO_FRAME_BYTES {
                st.pending.extend(s16le_stereo_to_mono(&st.leftover));
                st.leftover.clear();
            }
        }

        let whole = bytes.len() / STEREO_FRAME_BYTES * STEREO_FRAME_BYTES;
        st.pending.extend(s16le_stereo_to_mono(&bytes[..whole]));
        st.leftover.extend_from_slice(&bytes[whole..]);

        self.run()
    }

    /// Feed mono samples in [-1, 1).
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        self.state.pending.extend(samples.iter().copied());
        self.run()
    }

    /// Flush the tail of the stream by appending one buffer of silence.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        self.state.leftover.clear();
        let silence = self.plan.samplebuf_size;
        self.state.pending.extend(std::iter::repeat(0.0).take(silence));
        let out = self.run()?;
        if self.state.carrier {
            self.report_carrier_lost();
            self.state.drop_carrier();
        }
        Ok(out)
    }

    fn run(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            self.apply_advance()?;

            let span = self.plan.search_span(self.state.carrier);
            if self.state.nvalid < span.max(self.state.samplebuf.len() / 2) {
                self.top_up();
            }
            if self.state.nvalid < span {
                break;
            }

            if self.plan.profile.autodetect_threshold > 0.0 && self.state.carrier_band.is_none() && !self.autodetect_carrier() {
                continue;
            }

            self.process_frame(&mut out);
        }
        Ok(out)
    }

    fn apply_advance(&mut self) -> Result<()> {
        let st = &mut self.state;
        if st.advance == 0 {
            return Ok(());
        }
        if st.advance == st.samplebuf.len() {
            st.nvalid = 0;
            st.advance = 0;
            return Ok(());
        }
        if st.advance > st.nvalid {
            log::error!("sample buffer advance {} past {} valid samples", st.advance, st.nvalid);
            return Err(CassetteError::BufferInvariant {
                advance: st.advance,
                valid: st.nvalid,
            });
        }
        st.samplebuf.copy_within(st.advance..st.nvalid, 0);
        st.nvalid -= st.advance;
        st.advance = 0;
        Ok(())
    }

    fn top_up(&mut self) {
        let st = &mut self.state;
        let n = (st.samplebuf.len() - st.nvalid).min(st.pending.len());
        for (dst, sample) in st.samplebuf[st.nvalid..st.nvalid + n].iter_mut().zip(st.pending.drain(..n)) {
            *dst = sample;
        }
        st.nvalid += n;
    }

    /// Scan for a carrier and retune to it. Returns false (with the scanned
    /// samples marked consumed) when nothing usable was found.
    fn autodetect_carrier(&mut self) -> bool {
        let profile = &self.plan.profile;
        let scan = (self.plan.samples_per_bit().min(self.bands.fft_size() as f32) as usize).max(1);
        let nvalid = self.state.nvalid;

        let mut i = 0;
        let mut found = None;
        while i + scan <= nvalid {
            let chunk = &self.state.samplebuf[i..i + scan];
            if let Some(band) = self.bands.detect_carrier(chunk, profile.autodetect_threshold) {
                found = Some(band);
                break;
            }
            i += scan;
        }

        let Some(band) = found else {
            self.state.advance = i.max(1).min(nvalid);
            return false;
        };

        let mut b_shift = -(profile.autodetect_shift / profile.band_width).round() as i32;
        if profile.inverted_freqs {
            b_shift = -b_shift;
        }
        match self.bands.set_tones_by_bandshift(band, b_shift) {
            Ok(()) => {
                log::debug!(
                    "autodetected carrier mark={:.1} space={:.1}",
                    self.bands.band_hz(self.bands.mark_band()),
                    self.bands.band_hz(self.bands.space_band())
                );
                self.state.carrier_band = Some(band);
                true
            }
            Err(err) => {
                log::debug!("rejecting carrier band {}: {}", band, err);
                self.state.advance = (i + scan).min(nvalid);
                false
            }
        }
    }

    fn search(&self, try_step: usize, search_limit: f32) -> FrameCandidate {
        let carrier = self.state.carrier;
        self.bands.find_frame(
            &self.state.samplebuf[..self.state.nvalid],
            self.plan.samples_per_bit(),
            self.plan.try_first_sample(carrier),
            self.plan.try_max_nsamples(carrier),
            try_step,
            search_limit,
            self.plan.expect_pattern(carrier),
        )
    }

    fn process_frame(&mut self, out: &mut Vec<u8>) {
        let try_max = self.plan.try_max_nsamples(self.state.carrier);
        let try_step = (try_max / FSK_ANALYZE_NSTEPS).max(1);
        let mut frame = self.search(try_step, self.plan.profile.confidence_search_limit);

        let mut refine = false;
        if frame.confidence < self.state.peak_confidence * REFINE_CONFIDENCE_RATIO {
            refine = true;
            self.state.peak_confidence = 0.0;
        }
        if frame.amplitude < self.state.track_amplitude * DROPOUT_AMPLITUDE_RATIO {
            frame.confidence = 0.0;
        }

        if frame.confidence <= self.plan.profile.confidence_threshold {
            self.state.noconfidence += 1;
            if self.state.noconfidence > FSK_MAX_NOCONFIDENCE_BITS {
                self.state.carrier_band = None;
                if self.state.carrier {
                    self.report_carrier_lost();
                    self.state.drop_carrier();
                }
            }
            self.state.advance = try_max;
            return;
        }

        if !self.state.carrier {
            refine = true;
            self.codec.reset();
            log::info!("### CARRIER {} @ {:.1} Hz ###", self.plan.profile.data_rate, self.mark_hz());
        }

        if refine && try_step > 1 {
            let fine_step = (try_max / FSK_ANALYZE_NSTEPS_FINE).max(1);
            let fine = self.search(fine_step, f32::INFINITY);
            if fine.confidence > frame.confidence {
                frame = fine;
            }
        }

        // the search ran with the pre-acquisition window, so flip afterwards
        self.state.carrier = true;

        let st = &mut self.state;
        st.track_amplitude = (st.track_amplitude + frame.amplitude) / 2.0;
        if frame.confidence > st.peak_confidence {
            st.peak_confidence = frame.confidence;
        }
        st.noconfidence = 0;

        let advance = (frame.start + self.plan.frame_nsamples)
            .saturating_sub(self.plan.overscan)
            .clamp(1, st.nvalid);
        st.advance = advance;
        st.stats.frames_decoded += 1;
        st.stats.carrier_nsamples += advance as u64;
        st.stats.confidence_total += frame.confidence;
        st.stats.amplitude_total += frame.amplitude;

        let profile = &self.plan.profile;
        let mut bits = &frame.bits[..];
        if profile.stop_bits != 0.0 {
            // previous frame's stop bit
            bits = &bits[1..];
        }
        let mut word = bit_window(bits, profile.start_bits as usize, profile.data_bits as usize);
        if profile.msb_first {
            word = bit_reverse(word, profile.data_bits);
        }

        if profile.sync_byte.map(u64::from) == Some(word) {
            log::trace!("sync byte suppressed");
            return;
        }
        self.codec.decode(word, profile.data_bits, out);
    }

    fn report_carrier_lost(&self) {
        let stats = &self.state.stats;
        let profile = &self.plan.profile;
        let frames = stats.frames_decoded.max(1) as f32;
        let seconds = stats.carrier_nsamples as f32 / profile.sample_rate as f32;
        let bps = if seconds > 0.0 {
            stats.frames_decoded as f32 * self.plan.frame_bits as f32 / seconds
        } else {
            0.0
        };
        log::info!(
            "### NOCARRIER ndata={} confidence={:.3} ampl={:.3} bps={:.2} ({:+.1}%) ###",
            stats.frames_decoded,
            stats.confidence_total / frames,
            stats.amplitude_total / frames,
            bps,
            (bps / profile.data_rate - 1.0) * 100.0
        );
    }
}

/// `n` bits starting at `offset`, first bit in bit 0
fn bit_window(bits: &[u8], offset: usize, n: usize) -> u64 {
    bits[offset..offset + n]
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | ((b as u64) << i))
}

fn bit_reverse(word: u64, n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    word.reverse_bits() >> (64 - n)
}
