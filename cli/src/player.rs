use cassetteflow_core::{AudioEntry, Player, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Where playback time comes from.
#[derive(Clone)]
pub enum PlayClock {
    /// Wall clock, for real-time tape playback
    Wall,
    /// Samples pushed into the demodulator so far, so decoding faster than
    /// real time still sees tape time
    Tape { fed: Arc<AtomicU64>, sample_rate: u32 },
}

impl PlayClock {
    fn now_ms(&self, origin: Instant) -> u64 {
        match self {
            PlayClock::Wall => origin.elapsed().as_millis() as u64,
            PlayClock::Tape { fed, sample_rate } => {
                fed.load(Ordering::Relaxed) * 1000 / (*sample_rate).max(1) as u64
            }
        }
    }
}

/// Running item: where it started and when.
struct Running {
    entry: AudioEntry,
    start_byte: u64,
    start_ms: u64,
}

/// Stand-in for the audio output: logs what a real player would do and
/// tracks a simulated read position.
pub struct LoggingPlayer {
    clock: PlayClock,
    origin: Instant,
    running: Option<Running>,
    stopped: Option<(AudioEntry, u64)>,
    pub starts: usize,
}

impl LoggingPlayer {
    pub fn new(clock: PlayClock) -> Self {
        Self {
            clock,
            origin: Instant::now(),
            running: None,
            stopped: None,
            starts: 0,
        }
    }

    fn start(&mut self, entry: AudioEntry, byte_offset: u64) {
        self.running = Some(Running {
            entry,
            start_byte: byte_offset,
            start_ms: self.clock.now_ms(self.origin),
        });
    }
}

impl Player for LoggingPlayer {
    fn play(&mut self, entry: &AudioEntry, byte_offset: u64) -> Result<()> {
        println!("play {} from byte {} ({})", entry.audio_id, byte_offset, entry.path.display());
        self.starts += 1;
        self.stopped = None;
        self.start(entry.clone(), byte_offset);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(bytes) = self.position_bytes() {
            if let Some(running) = self.running.take() {
                println!("stop {} at byte {}", running.entry.audio_id, bytes);
                self.stopped = Some((running.entry, bytes));
            }
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if let Some((entry, bytes)) = self.stopped.take() {
            println!("resume {} at byte {}", entry.audio_id, bytes);
            self.start(entry, bytes);
        }
        Ok(())
    }

    fn position_bytes(&self) -> Option<u64> {
        let running = self.running.as_ref()?;
        let elapsed_ms = self.clock.now_ms(self.origin).saturating_sub(running.start_ms);
        let bytes_per_sec = running.entry.avg_bitrate as u64 / 8;
        Some(running.start_byte + elapsed_ms * bytes_per_sec / 1000)
    }
}
