use crate::databits::BitCodec;
use crate::error::{CassetteError, Result};
use crate::line::LineFrameCodec;
use crate::profile::ModemProfile;
use crate::tone::ToneGenerator;
use std::io::Write;

/// Destination for interleaved stereo 16-bit PCM.
pub trait PcmSink {
    /// Write interleaved samples, returning the number of stereo frames
    /// accepted. Zero means the sink failed.
    fn write_pcm(&mut self, samples: &[i16]) -> Result<usize>;
}

impl PcmSink for Vec<i16> {
    fn write_pcm(&mut self, samples: &[i16]) -> Result<usize> {
        self.extend_from_slice(samples);
        Ok(samples.len() / 2)
    }
}

/// Adapts any byte writer into a little-endian S16 sink.
pub struct IoSink<W: Write> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> PcmSink for IoSink<W> {
    fn write_pcm(&mut self, samples: &[i16]) -> Result<usize> {
        self.inner.write_all(&crate::pcm::to_s16le_bytes(samples))?;
        Ok(samples.len() / 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    LeaderTone,
    SyncPreamble,
    DataFrames,
}

/// Turns bytes into FSK tone bursts.
///
/// The first byte after [`FskTransmitter::restart`] (or creation) is preceded
/// by the leader tone and sync preamble; after that frames follow back to
/// back until [`FskTransmitter::end_burst`].
pub struct FskTransmitter {
    profile: ModemProfile,
    tone: ToneGenerator,
    codec: BitCodec,
    state: TxState,
    bit_nsamples: usize,
    scratch: Vec<i16>,
    last_pause: Option<String>,
}

impl FskTransmitter {
    pub fn new(profile: ModemProfile) -> Result<Self> {
        if profile.data_bits > 64 {
            return Err(CassetteError::FrameTooLong(profile.data_bits));
        }
        let tone = ToneGenerator::new(profile.sin_table_len, profile.tx_amplitude);
        let codec = BitCodec::new(profile.codec, profile.data_bits);
        let bit_nsamples = profile.bit_nsamples();
        Ok(Self {
            profile,
            tone,
            codec,
            state: TxState::Idle,
            bit_nsamples,
            scratch: Vec::new(),
            last_pause: None,
        })
    }

    pub fn profile(&self) -> &ModemProfile {
        &self.profile
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Require a fresh leader for the next byte and forget tone phase.
    pub fn restart(&mut self) {
        self.state = TxState::Idle;
        self.tone.reset();
        self.codec.reset();
        self.last_pause = None;
    }

    /// Transmit one tape record line, appending the newline terminator.
    ///
    /// A mute record with a non-zero gap becomes that many seconds of
    /// silence instead of modem tones. Replicated copies of the same mute
    /// record that follow directly are not silenced again, so the recorded
    /// gap matches the record. Returns stereo frames written.
    pub fn transmit_line<S: PcmSink>(&mut self, line: &str, sink: &mut S) -> Result<usize> {
        let text = line.trim_end_matches(['\r', '\n']);

        if let Some(seconds) = LineFrameCodec::parse(text).ok().and_then(|f| f.pause_seconds()) {
            if self.last_pause.as_deref() == Some(text) {
                return Ok(0);
            }
            self.last_pause = Some(text.to_string());
            log::debug!("pause record: {} s of silence", seconds);
            let mut written = 0;
            for _ in 0..seconds {
                written += self.tone_out(0.0, self.profile.sample_rate as usize, sink)?;
            }
            // the receiver loses carrier over the gap, so lead in again
            self.state = TxState::Idle;
            return Ok(written);
        }
        self.last_pause = None;

        let mut written = self.transmit_bytes(text.as_bytes(), sink)?;
        written += self.transmit_bytes(b"\n", sink)?;
        Ok(written)
    }

    /// Transmit raw bytes through the profile's bit codec.
    pub fn transmit_bytes<S: PcmSink>(&mut self, data: &[u8], sink: &mut S) -> Result<usize> {
        let mut written = 0;
        let mut words = Vec::new();
        for &byte in data {
            words.clear();
            self.codec.encode(byte, &mut words);
            for &word in &words {
                written += self.transmit_word(word, sink)?;
            }
        }
        Ok(written)
    }

    /// Close the burst with the trailer tone and return to idle.
    pub fn end_burst<S: PcmSink>(&mut self, sink: &mut S) -> Result<usize> {
        let mut written = 0;
        if self.state != TxState::Idle && self.profile.trailer_bits > 0 {
            let n = self.bit_nsamples * self.profile.trailer_bits as usize;
            written = self.tone_out(self.profile.stop_tone(), n, sink)?;
        }
        self.restart();
        Ok(written)
    }

    fn transmit_word<S: PcmSink>(&mut self, word: u64, sink: &mut S) -> Result<usize> {
        let mut written = 0;

        if self.state == TxState::Idle {
            self.state = TxState::LeaderTone;
            if self.profile.leader_bits > 0 {
                let n = self.bit_nsamples * self.profile.leader_bits as usize;
                written += self.tone_out(self.profile.stop_tone(), n, sink)?;
            }
            self.state = TxState::SyncPreamble;
            if let Some(sync) = self.profile.sync_byte {
                for _ in 0..self.profile.sync_preamble_count {
                    written += self.frame_out(sync as u64, false, sink)?;
                }
            }
            self.state = TxState::DataFrames;
        }

        written += self.frame_out(word, self.profile.msb_first, sink)?;
        Ok(written)
    }

    fn frame_out<S: PcmSink>(&mut self, word: u64, msb_first: bool, sink: &mut S) -> Result<usize> {
        let profile = &self.profile;
        let n_data = profile.data_bits;
        let start_n = self.bit_nsamples * profile.start_bits as usize;
        let stop_n = (self.bit_nsamples as f32 * profile.stop_bits) as usize;
        let (start_tone, stop_tone, mark, space) =
            (profile.start_tone(), profile.stop_tone(), profile.mark_hz, profile.space_hz);

        let mut written = 0;
        if start_n > 0 {
            written += self.tone_out(start_tone, start_n, sink)?;
        }
        for i in 0..n_data {
            let bitno = if msb_first { n_data - 1 - i } else { i };
            let bit = (word >> bitno) & 1;
            let freq = if bit == 1 { mark } else { space };
            written += self.tone_out(freq, self.bit_nsamples, sink)?;
        }
        if stop_n > 0 {
            written += self.tone_out(stop_tone, stop_n, sink)?;
        }
        Ok(written)
    }

    fn tone_out<S: PcmSink>(&mut self, freq: f32, nsamples: usize, sink: &mut S) -> Result<usize> {
        self.scratch.clear();
        self.tone
            .render_into(freq, nsamples, self.profile.sample_rate, &mut self.scratch);
        let written = sink.write_pcm(&self.scratch)?;
        if written == 0 && nsamples > 0 {
            log::error!("audio sink refused {} samples", nsamples);
            return Err(CassetteError::SinkWrite);
        }
        Ok(written)
    }
}
