//! Cassette tape data modem and playback sync
//!
//! Text records are carried over a Bell 202 style FSK audio channel (1200 Hz
//! mark, 2200 Hz space at 1200 baud), recorded on tape and decoded on playback
//! to keep a digital audio player in step with the tape.

pub mod config;
pub mod databits;
pub mod error;
pub mod fsk;
pub mod line;
pub mod pcm;
#[cfg(feature = "pipeline")]
pub mod pipeline;
pub mod profile;
pub mod receiver;
pub mod sync;
pub mod tape;
pub mod tone;
pub mod transmitter;

pub use config::{CassetteConfig, ModemConfig, SyncConfig};
pub use error::{CassetteError, Result};
pub use line::{DecodedFrame, FrameKind, LineAssembler, LineFrameCodec, TapeItem, TapeWriter};
pub use profile::{Direction, FskFramePlan, ModemFamily, ModemProfile, ProfileOverrides};
pub use receiver::FskReceiver;
pub use sync::{AudioDatabase, AudioEntry, DynamicResolver, PlaybackSyncController, Player, SyncOutcome, SyncState};
pub use tape::{AudioDb, SideMap, TapeFileReader};
pub use transmitter::{FskTransmitter, IoSink, PcmSink};

/// Audio sample rate used on the tape path
pub const SAMPLE_RATE: u32 = 48000;
