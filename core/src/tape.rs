//! Tape-format files on disk: the audio database, the side map used for
//! dynamic records, and a sequential reader for timer-driven playback.

use crate::error::{CassetteError, Result};
use crate::line::{DecodedFrame, FrameKind, LineFrameCodec};
use crate::sync::{AudioDatabase, AudioEntry, DynamicResolver};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Audio items keyed by id, loaded from a tab-separated file:
/// `audio_id  duration  avg_bitrate  path [relative_path]`.
#[derive(Debug, Default, Clone)]
pub struct AudioDb {
    entries: HashMap<String, AudioEntry>,
}

impl AudioDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let db = Self::from_reader(BufReader::new(file))?;
        log::info!("loaded {} audio entries from {}", db.len(), path.as_ref().display());
        Ok(db)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut db = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = parse_db_line(line).ok_or_else(|| {
                CassetteError::Config(format!("audio db line {}: expected id, duration, bitrate, path", lineno + 1))
            })?;
            db.insert(entry);
        }
        Ok(db)
    }

    pub fn insert(&mut self, entry: AudioEntry) {
        self.entries.insert(entry.audio_id.clone(), entry);
    }

    pub fn get(&self, audio_id: &str) -> Option<&AudioEntry> {
        self.entries.get(audio_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_db_line(line: &str) -> Option<AudioEntry> {
    let mut fields = line.split('\t');
    let audio_id = fields.next()?.trim();
    let duration_seconds = fields.next()?.trim().parse().ok()?;
    let avg_bitrate = fields.next()?.trim().parse().ok()?;
    let path = fields.next()?.trim();
    if audio_id.is_empty() || path.is_empty() {
        return None;
    }
    Some(AudioEntry {
        audio_id: audio_id.to_string(),
        path: PathBuf::from(path),
        duration_seconds,
        avg_bitrate,
    })
}

impl AudioDatabase for AudioDb {
    fn lookup(&self, audio_id: &str) -> Result<AudioEntry> {
        self.get(audio_id)
            .cloned()
            .ok_or_else(|| CassetteError::NotFound(audio_id.to_string()))
    }
}

/// Maps elapsed tape seconds to the record written for that second.
///
/// Reads an unreplicated tape file forward; a lookup earlier than the last one
/// rewinds to the start.
pub struct SideMap<R: BufRead + Seek> {
    reader: R,
    lookahead: Option<DecodedFrame>,
    last_total: u32,
    line: String,
}

impl SideMap<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead + Seek> SideMap<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lookahead: None,
            last_total: 0,
            line: String::new(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.lookahead = None;
        self.last_total = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if let Some(frame) = self.lookahead.take() {
            return Ok(Some(frame));
        }
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            match LineFrameCodec::parse(&self.line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => log::debug!("side map: {}", err),
            }
        }
    }

    /// Play record covering `total_seconds`, or `None` inside a gap or past the end
    pub fn lookup(&mut self, total_seconds: u32) -> Result<Option<DecodedFrame>> {
        if total_seconds < self.last_total {
            self.rewind()?;
        }
        self.last_total = total_seconds;

        let mut covering = None;
        while let Some(frame) = self.next_frame()? {
            if frame.total_seconds > total_seconds {
                self.lookahead = Some(frame);
                break;
            }
            covering = Some(frame);
        }

        Ok(covering.filter(|frame| match frame.kind {
            FrameKind::Play { .. } => frame.total_seconds == total_seconds,
            FrameKind::Mute { .. } => false,
        }))
    }
}

impl<R: BufRead + Seek + Send> DynamicResolver for SideMap<R> {
    fn resolve(&mut self, total_seconds: u32) -> Result<Option<DecodedFrame>> {
        self.lookup(total_seconds)
    }
}

/// Sequential lines of a tape file, for playback without the modem.
pub struct TapeFileReader<R: BufRead> {
    reader: R,
    line: String,
    lines_read: usize,
}

impl TapeFileReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> TapeFileReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            lines_read: 0,
        }
    }

    /// Next non-empty line without its terminator, `None` at end of tape
    pub fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                self.lines_read += 1;
                return Ok(Some(text.to_string()));
            }
        }
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for TapeFileReader<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
