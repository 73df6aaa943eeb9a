use crate::error::{CassetteError, Result};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Length of one record, excluding the line terminator
pub const LINE_LENGTH: usize = 29;

/// Each record is written this many times in a row on tape
pub const REPLICATION: usize = 4;

/// audio_id marking a record whose real target comes from the side map
pub const DYNAMIC_AUDIO_ID: &str = "DYNAMICMP3";

/// Lines longer than this are garbage and get dropped by [`LineAssembler`]
pub const MAX_LINE_LENGTH: usize = 63;

const TAPE_ID_LEN: usize = 4;
const AUDIO_ID_LEN: usize = 10;

/// Second half of a record: what the tape wants at this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Seconds into the audio item
    Play { playtime_seconds: u32 },
    /// Silence gap; 0 means "no pause"
    Mute { mute_seconds: u32 },
}

/// One parsed line record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedFrame {
    pub tape_id: String,
    pub side: char,
    pub track: u32,
    pub audio_id: String,
    pub kind: FrameKind,
    /// Seconds elapsed on this tape side
    pub total_seconds: u32,
}

impl DecodedFrame {
    pub fn new(tape_id: &str, side: char, track: u32, audio_id: &str, kind: FrameKind, total_seconds: u32) -> Result<Self> {
        let frame = Self {
            tape_id: tape_id.to_string(),
            side: side.to_ascii_uppercase(),
            track,
            audio_id: audio_id.to_string(),
            kind,
            total_seconds,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn play(tape_id: &str, side: char, track: u32, audio_id: &str, playtime_seconds: u32, total_seconds: u32) -> Result<Self> {
        Self::new(tape_id, side, track, audio_id, FrameKind::Play { playtime_seconds }, total_seconds)
    }

    pub fn mute(tape_id: &str, side: char, track: u32, audio_id: &str, mute_seconds: u32, total_seconds: u32) -> Result<Self> {
        Self::new(tape_id, side, track, audio_id, FrameKind::Mute { mute_seconds }, total_seconds)
    }

    pub fn is_dynamic(&self, sentinel: &str) -> bool {
        self.audio_id == sentinel
    }

    /// Mute seconds if this is a pause record with a non-zero gap
    pub fn pause_seconds(&self) -> Option<u32> {
        match self.kind {
            FrameKind::Mute { mute_seconds } if mute_seconds > 0 => Some(mute_seconds),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |what: &str| CassetteError::InvalidConfig(format!("record field {}", what));

        if self.tape_id.len() != TAPE_ID_LEN || !is_token(&self.tape_id) {
            return Err(invalid("tape_id must be 4 visible ASCII characters"));
        }
        if self.side != 'A' && self.side != 'B' {
            return Err(invalid("side must be A or B"));
        }
        if self.track > 99 {
            return Err(invalid("track exceeds 99"));
        }
        if self.audio_id.len() != AUDIO_ID_LEN || !is_token(&self.audio_id) {
            return Err(invalid("audio_id must be 10 visible ASCII characters"));
        }
        match self.kind {
            FrameKind::Play { playtime_seconds } if playtime_seconds > 9999 => {
                return Err(invalid("playtime exceeds 9999"))
            }
            FrameKind::Mute { mute_seconds } if mute_seconds > 999 => return Err(invalid("mute exceeds 999")),
            _ => {}
        }
        if self.total_seconds > 9999 {
            return Err(invalid("total time exceeds 9999"));
        }
        Ok(())
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{:02}_{}_", self.tape_id, self.side, self.track, self.audio_id)?;
        match self.kind {
            FrameKind::Play { playtime_seconds } => write!(f, "{:04}", playtime_seconds)?,
            FrameKind::Mute { mute_seconds } => write!(f, "{:03}M", mute_seconds)?,
        }
        write!(f, "_{:04}", self.total_seconds)
    }
}

impl FromStr for DecodedFrame {
    type Err = CassetteError;

    fn from_str(s: &str) -> Result<Self> {
        LineFrameCodec::parse(s)
    }
}

fn is_token(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_graphic())
}

fn digits(field: &[u8]) -> Option<u32> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(field.iter().fold(0u32, |acc, d| acc * 10 + (d - b'0') as u32))
}

/// Fixed-width text records: `TTTTS_NN_MMMMMMMMMM_PPPP_TTTT` (play) and
/// `TTTTS_NN_MMMMMMMMMM_NNNM_TTTT` (mute).
pub struct LineFrameCodec;

impl LineFrameCodec {
    /// Parse one record; a trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<DecodedFrame> {
        let text = line.trim_end_matches(['\r', '\n']);
        let bad = |reason: &'static str| CassetteError::LineDecode {
            line: text.to_string(),
            reason,
        };

        let b = text.as_bytes();
        if !text.is_ascii() {
            return Err(bad("non-ASCII bytes"));
        }
        if b.len() != LINE_LENGTH {
            return Err(bad("wrong length"));
        }
        if b[5] != b'_' || b[8] != b'_' || b[19] != b'_' || b[24] != b'_' {
            return Err(bad("field separators out of place"));
        }

        let tape_id = &text[0..4];
        let side = b[4] as char;
        if side != 'A' && side != 'B' {
            return Err(bad("side is neither A nor B"));
        }
        let audio_id = &text[9..19];
        if !is_token(tape_id) || !is_token(audio_id) {
            return Err(bad("id contains whitespace or control characters"));
        }
        let track = digits(&b[6..8]).ok_or_else(|| bad("track is not numeric"))?;
        let total_seconds = digits(&b[25..29]).ok_or_else(|| bad("total time is not numeric"))?;

        let kind = if let Some(playtime_seconds) = digits(&b[20..24]) {
            FrameKind::Play { playtime_seconds }
        } else if b[23] == b'M' {
            let mute_seconds = digits(&b[20..23]).ok_or_else(|| bad("mute time is not numeric"))?;
            FrameKind::Mute { mute_seconds }
        } else {
            return Err(bad("playtime is neither NNNN nor NNNM"));
        };

        DecodedFrame::new(tape_id, side, track, audio_id, kind, total_seconds).map_err(|_| bad("field out of range"))
    }

    pub fn format(frame: &DecodedFrame) -> String {
        frame.to_string()
    }
}

/// One audio item placed on a tape side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeItem {
    pub audio_id: String,
    pub duration_seconds: u32,
}

impl TapeItem {
    pub fn new(audio_id: &str, duration_seconds: u32) -> Self {
        Self {
            audio_id: audio_id.to_string(),
            duration_seconds,
        }
    }
}

/// Lays out the record stream for one tape side.
///
/// Each item contributes one play record per second of its duration; a mute
/// record carrying the gap length sits between consecutive items when a gap
/// is configured.
#[derive(Debug, Clone)]
pub struct TapeWriter {
    tape_id: String,
    side: char,
    mute_seconds: u32,
    replicate: usize,
}

impl TapeWriter {
    pub fn new(tape_id: &str, side: char) -> Result<Self> {
        // validate ids early with a throwaway record
        DecodedFrame::play(tape_id, side, 0, DYNAMIC_AUDIO_ID, 0, 0)?;
        Ok(Self {
            tape_id: tape_id.to_string(),
            side: side.to_ascii_uppercase(),
            mute_seconds: 0,
            replicate: REPLICATION,
        })
    }

    pub fn with_mute_seconds(mut self, mute_seconds: u32) -> Self {
        self.mute_seconds = mute_seconds;
        self
    }

    /// Copies of each record; 1 gives the side map layout
    pub fn with_replicate(mut self, replicate: usize) -> Self {
        self.replicate = replicate.max(1);
        self
    }

    /// Logical records, one per second of tape (plus mute records).
    pub fn frames(&self, items: &[TapeItem]) -> Result<Vec<DecodedFrame>> {
        let mut frames = Vec::new();
        let mut total = 0u32;

        for (index, item) in items.iter().enumerate() {
            let track = index as u32 + 1;
            if index > 0 && self.mute_seconds > 0 {
                frames.push(DecodedFrame::mute(
                    &self.tape_id,
                    self.side,
                    track,
                    &item.audio_id,
                    self.mute_seconds,
                    total,
                )?);
                total += self.mute_seconds;
            }
            for playtime in 0..item.duration_seconds {
                frames.push(DecodedFrame::play(&self.tape_id, self.side, track, &item.audio_id, playtime, total)?);
                total += 1;
            }
        }
        Ok(frames)
    }

    /// Write the replicated record stream; returns total seconds on the side.
    pub fn write<W: Write>(&self, out: &mut W, items: &[TapeItem]) -> Result<u32> {
        let frames = self.frames(items)?;
        for frame in &frames {
            let line = frame.to_string();
            for _ in 0..self.replicate {
                writeln!(out, "{}", line)?;
            }
        }
        let total = frames.last().map_or(0, |f| match f.kind {
            FrameKind::Play { .. } => f.total_seconds + 1,
            FrameKind::Mute { mute_seconds } => f.total_seconds + mute_seconds,
        });
        log::info!(
            "tape {}{}: {} records x{}, {} s",
            self.tape_id,
            self.side,
            frames.len(),
            self.replicate,
            total
        );
        Ok(total)
    }
}

/// Splits a decoded byte stream into lines.
///
/// CR is ignored, LF terminates a line, and a line running past
/// [`MAX_LINE_LENGTH`] is discarded up to the next LF.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                b'\r' => {}
                b'\n' => {
                    if !self.overflowed {
                        lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                    }
                    self.buf.clear();
                    self.overflowed = false;
                }
                _ if self.overflowed => {}
                _ => {
                    if self.buf.len() >= MAX_LINE_LENGTH {
                        log::debug!("dropping overlong line");
                        self.buf.clear();
                        self.overflowed = true;
                    } else {
                        self.buf.push(b);
                    }
                }
            }
        }
        lines
    }

    /// Bytes held for the current unterminated line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
