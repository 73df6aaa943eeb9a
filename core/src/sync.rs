use crate::config::SyncConfig;
use crate::error::Result;
use crate::line::{DecodedFrame, FrameKind, LineFrameCodec};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What the audio database knows about one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEntry {
    pub audio_id: String,
    pub path: PathBuf,
    pub duration_seconds: u32,
    /// Average bitrate in bits per second
    pub avg_bitrate: u32,
}

impl AudioEntry {
    /// Byte offset of `seconds` into the file at the average bitrate
    pub fn byte_offset(&self, seconds: u32) -> u64 {
        if seconds == 0 {
            return 0;
        }
        seconds as u64 * self.avg_bitrate as u64 / 8
    }
}

/// Resolves audio ids to files.
pub trait AudioDatabase {
    fn lookup(&self, audio_id: &str) -> Result<AudioEntry>;
}

/// Maps elapsed seconds on the current tape side to the record that should
/// be playing there, for records carrying the dynamic sentinel.
pub trait DynamicResolver {
    fn resolve(&mut self, total_seconds: u32) -> Result<Option<DecodedFrame>>;
}

/// The playback pipeline being synchronized.
pub trait Player {
    /// (Re)start playback of `entry` from `byte_offset`
    fn play(&mut self, entry: &AudioEntry, byte_offset: u64) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Continue after a pause stopped playback
    fn resume(&mut self) -> Result<()>;
    /// Bytes consumed from the current file, `None` when nothing is running
    fn position_bytes(&self) -> Option<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    Playing,
    Paused,
}

/// What a frame, tick or timeout did to playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Playback already matched the frame
    Unchanged,
    Started { audio_id: String, byte_offset: u64 },
    Paused { seconds: u32 },
    Resumed,
    Stopped,
    /// Frame could not be acted on; playback untouched
    Ignored,
}

/// Current target of playback.
#[derive(Debug, Clone, Default)]
pub struct PlaybackCursor {
    pub entry: Option<AudioEntry>,
    pub last_frame: Option<Instant>,
}

impl PlaybackCursor {
    pub fn audio_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.audio_id.as_str())
    }
}

/// Reconciles decoded tape records with what the player is doing.
///
/// Owned by a single task; everything else talks to it through that task's
/// queue.
pub struct PlaybackSyncController<P: Player, D: AudioDatabase> {
    player: P,
    db: D,
    resolver: Option<Box<dyn DynamicResolver + Send>>,
    config: SyncConfig,
    cursor: PlaybackCursor,
    state: SyncState,
    pause_remaining: Duration,
    last_mute: Option<DecodedFrame>,
}

impl<P: Player, D: AudioDatabase> PlaybackSyncController<P, D> {
    pub fn new(player: P, db: D, config: SyncConfig) -> Self {
        Self {
            player,
            db,
            resolver: None,
            config,
            cursor: PlaybackCursor::default(),
            state: SyncState::Init,
            pause_remaining: Duration::ZERO,
            last_mute: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn DynamicResolver + Send>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Playback (or a pause) is in progress
    pub fn is_active(&self) -> bool {
        self.state != SyncState::Init
    }

    pub fn is_paused(&self) -> bool {
        self.state == SyncState::Paused
    }

    /// Parse and apply one line.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Result<SyncOutcome> {
        let frame = LineFrameCodec::parse(line)?;
        self.handle_frame(&frame, now)
    }

    pub fn handle_frame(&mut self, frame: &DecodedFrame, now: Instant) -> Result<SyncOutcome> {
        self.cursor.last_frame = Some(now);

        match frame.kind {
            FrameKind::Mute { mute_seconds } => self.handle_mute(frame, mute_seconds),
            FrameKind::Play { playtime_seconds } => {
                if frame.is_dynamic(&self.config.dynamic_audio_id) {
                    let Some(mapped) = self.resolve_dynamic(frame.total_seconds)? else {
                        log::debug!("no side map entry at {} s, keeping playback", frame.total_seconds);
                        return Ok(SyncOutcome::Ignored);
                    };
                    let FrameKind::Play { playtime_seconds } = mapped.kind else {
                        return Ok(SyncOutcome::Ignored);
                    };
                    self.handle_play(&mapped.audio_id, playtime_seconds)
                } else {
                    self.handle_play(&frame.audio_id, playtime_seconds)
                }
            }
        }
    }

    fn resolve_dynamic(&mut self, total_seconds: u32) -> Result<Option<DecodedFrame>> {
        match self.resolver.as_mut() {
            Some(resolver) => resolver.resolve(total_seconds),
            None => Ok(None),
        }
    }

    fn handle_mute(&mut self, frame: &DecodedFrame, mute_seconds: u32) -> Result<SyncOutcome> {
        if mute_seconds == 0 {
            return Ok(SyncOutcome::Unchanged);
        }
        // replicated copies of a gap pause once, even when read after it ended
        if self.last_mute.as_ref() == Some(frame) {
            return Ok(SyncOutcome::Unchanged);
        }

        if self.player.position_bytes().is_some() {
            self.player.stop()?;
        }
        self.pause_remaining = Duration::from_secs(mute_seconds as u64);
        self.state = SyncState::Paused;
        self.last_mute = Some(frame.clone());
        log::info!("pausing playback for {} s", mute_seconds);
        Ok(SyncOutcome::Paused { seconds: mute_seconds })
    }

    fn handle_play(&mut self, audio_id: &str, playtime_seconds: u32) -> Result<SyncOutcome> {
        if self.state == SyncState::Paused {
            // tape moved on before the gap ran out
            self.pause_remaining = Duration::ZERO;
        }
        self.last_mute = None;

        if self.state == SyncState::Playing && self.cursor.audio_id() == Some(audio_id) {
            let current = self.current_position_seconds();
            if (playtime_seconds as i64 - current as i64).unsigned_abs() <= self.config.tolerance_seconds as u64 {
                return Ok(SyncOutcome::Unchanged);
            }
            log::info!(
                "{} drifted: tape at {} s, player at {} s",
                audio_id,
                playtime_seconds,
                current
            );
        }

        let entry = self.db.lookup(audio_id)?;
        let byte_offset = entry.byte_offset(playtime_seconds);

        if self.player.position_bytes().is_some() {
            self.player.stop()?;
        }
        self.player.play(&entry, byte_offset)?;
        log::info!(
            "playing {} from {} s (byte {}) {}",
            entry.audio_id,
            playtime_seconds,
            byte_offset,
            entry.path.display()
        );

        self.cursor.entry = Some(entry);
        self.state = SyncState::Playing;
        Ok(SyncOutcome::Started {
            audio_id: audio_id.to_string(),
            byte_offset,
        })
    }

    /// Playback position of the current item in whole seconds
    pub fn current_position_seconds(&self) -> u32 {
        let (Some(entry), Some(bytes)) = (&self.cursor.entry, self.player.position_bytes()) else {
            return 0;
        };
        let bytes_per_sec = entry.avg_bitrate as u64 / 8;
        if bytes_per_sec == 0 {
            return 0;
        }
        (bytes / bytes_per_sec) as u32
    }

    /// Advance the pause countdown; resumes playback once it runs out.
    ///
    /// The tape is silent for the whole gap, so the no-data timeout restarts
    /// from `now` when the pause ends.
    pub fn tick(&mut self, elapsed: Duration, now: Instant) -> Result<Option<SyncOutcome>> {
        if self.state != SyncState::Paused {
            return Ok(None);
        }
        self.pause_remaining = self.pause_remaining.saturating_sub(elapsed);
        if !self.pause_remaining.is_zero() {
            return Ok(None);
        }

        self.cursor.last_frame = Some(now);
        if self.cursor.entry.is_some() {
            self.player.resume()?;
            self.state = SyncState::Playing;
        } else {
            self.state = SyncState::Init;
        }
        log::info!("pause over");
        Ok(Some(SyncOutcome::Resumed))
    }

    /// Stop if no frame arrived within the no-data timeout.
    pub fn check_timeout(&mut self, now: Instant) -> Result<Option<SyncOutcome>> {
        let timeout = self.config.no_data_timeout();
        match self.cursor.last_frame {
            Some(last) if self.state == SyncState::Playing && now.duration_since(last) > timeout => {
                self.stop().map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Halt playback and forget the current item.
    pub fn stop(&mut self) -> Result<SyncOutcome> {
        let was_active = self.is_active();
        if self.player.position_bytes().is_some() {
            self.player.stop()?;
        }
        self.cursor = PlaybackCursor::default();
        self.state = SyncState::Init;
        self.pause_remaining = Duration::ZERO;
        self.last_mute = None;
        if was_active {
            log::info!("no data, playback stopped");
        }
        Ok(SyncOutcome::Stopped)
    }

    /// Give up the collaborators, e.g. after the owning stage finished
    pub fn into_parts(self) -> (P, D) {
        (self.player, self.db)
    }
}

/// Playback outcome of an error: transient errors become [`SyncOutcome::Ignored`].
pub fn absorb_transient(result: Result<SyncOutcome>) -> Result<SyncOutcome> {
    match result {
        Err(err) if err.is_transient() => {
            log::warn!("{}", err);
            Ok(SyncOutcome::Ignored)
        }
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CassetteError;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PlayerCall {
        Play(String, u64),
        Stop,
        Resume,
    }

    /// Records calls; position stays at the last start offset.
    #[derive(Clone, Default)]
    pub struct MockPlayer {
        pub calls: Arc<Mutex<Vec<PlayerCall>>>,
        position: Option<u64>,
    }

    impl MockPlayer {
        pub fn calls(&self) -> Vec<PlayerCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Player for MockPlayer {
        fn play(&mut self, entry: &AudioEntry, byte_offset: u64) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(PlayerCall::Play(entry.audio_id.clone(), byte_offset));
            self.position = Some(byte_offset);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(PlayerCall::Stop);
            self.position = None;
            Ok(())
        }

        fn resume(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(PlayerCall::Resume);
            Ok(())
        }

        fn position_bytes(&self) -> Option<u64> {
            self.position
        }
    }

    #[derive(Default)]
    pub struct MapDb(pub HashMap<String, AudioEntry>);

    impl MapDb {
        pub fn with(ids: &[&str]) -> Self {
            let mut map = HashMap::new();
            for id in ids {
                map.insert(
                    id.to_string(),
                    AudioEntry {
                        audio_id: id.to_string(),
                        path: PathBuf::from(format!("/music/{}.mp3", id)),
                        duration_seconds: 300,
                        avg_bitrate: 128_000,
                    },
                );
            }
            Self(map)
        }
    }

    impl AudioDatabase for MapDb {
        fn lookup(&self, audio_id: &str) -> Result<AudioEntry> {
            self.0
                .get(audio_id)
                .cloned()
                .ok_or_else(|| CassetteError::NotFound(audio_id.to_string()))
        }
    }

    struct FixedResolver(Option<DecodedFrame>);

    impl DynamicResolver for FixedResolver {
        fn resolve(&mut self, _total_seconds: u32) -> Result<Option<DecodedFrame>> {
            Ok(self.0.clone())
        }
    }

    fn controller() -> (PlaybackSyncController<MockPlayer, MapDb>, MockPlayer) {
        let player = MockPlayer::default();
        let ctl = PlaybackSyncController::new(
            player.clone(),
            MapDb::with(&["0123456789", "abcdefabcd"]),
            SyncConfig::default(),
        );
        (ctl, player)
    }

    #[test]
    fn test_replicated_frame_starts_once() {
        let (mut ctl, player) = controller();
        let now = Instant::now();
        let line = "AB12A_01_0123456789_0005_0005";
        let outcomes: Vec<_> = (0..4).map(|_| ctl.handle_line(line, now).unwrap()).collect();

        assert_eq!(
            outcomes[0],
            SyncOutcome::Started {
                audio_id: "0123456789".into(),
                byte_offset: 5 * 16_000
            }
        );
        assert!(outcomes[1..].iter().all(|o| *o == SyncOutcome::Unchanged));
        assert_eq!(player.calls(), vec![PlayerCall::Play("0123456789".into(), 80_000)]);
    }

    #[test]
    fn test_zero_playtime_seeks_to_start() {
        let (mut ctl, player) = controller();
        ctl.handle_line("AB12A_01_0123456789_0000_0000", Instant::now()).unwrap();
        assert_eq!(player.calls(), vec![PlayerCall::Play("0123456789".into(), 0)]);
    }

    #[test]
    fn test_out_of_tolerance_seeks() {
        let (mut ctl, player) = controller();
        let now = Instant::now();
        ctl.handle_line("AB12A_01_0123456789_0005_0005", now).unwrap();
        ctl.handle_line("AB12A_01_0123456789_0007_0007", now).unwrap();
        assert_eq!(player.calls().len(), 1, "2 s drift is within tolerance");

        let outcome = ctl.handle_line("AB12A_01_0123456789_0030_0030", now).unwrap();
        assert!(matches!(outcome, SyncOutcome::Started { byte_offset: 480_000, .. }));
        assert_eq!(
            player.calls()[1..],
            [PlayerCall::Stop, PlayerCall::Play("0123456789".into(), 480_000)]
        );
    }

    #[test]
    fn test_switch_item() {
        let (mut ctl, player) = controller();
        let now = Instant::now();
        ctl.handle_line("AB12A_01_0123456789_0009_0009", now).unwrap();
        ctl.handle_line("AB12A_02_abcdefabcd_0000_0010", now).unwrap();
        assert_eq!(ctl.cursor().audio_id(), Some("abcdefabcd"));
        assert_eq!(player.calls().last(), Some(&PlayerCall::Play("abcdefabcd".into(), 0)));
    }

    #[test]
    fn test_unknown_audio_is_transient() {
        let (mut ctl, player) = controller();
        let err = ctl
            .handle_line("AB12A_01_ffffffffff_0005_0005", Instant::now())
            .unwrap_err();
        assert!(err.is_transient());
        assert!(player.calls().is_empty());
        assert_eq!(ctl.state(), SyncState::Init);
    }

    #[test]
    fn test_mute_pauses_once_then_resumes() {
        let (mut ctl, player) = controller();
        let now = Instant::now();
        ctl.handle_line("AB12A_01_0123456789_0009_0009", now).unwrap();

        let line = "AB12A_02_0123456789_003M_0010";
        let outcomes: Vec<_> = (0..4).map(|_| ctl.handle_line(line, now).unwrap()).collect();
        assert_eq!(outcomes[0], SyncOutcome::Paused { seconds: 3 });
        assert!(outcomes[1..].iter().all(|o| *o == SyncOutcome::Unchanged));
        assert_eq!(ctl.state(), SyncState::Paused);

        let quarter = Duration::from_millis(250);
        for _ in 0..11 {
            assert_eq!(ctl.tick(quarter, now).unwrap(), None);
        }
        let resumed_at = now + Duration::from_secs(3);
        assert_eq!(ctl.tick(quarter, resumed_at).unwrap(), Some(SyncOutcome::Resumed));
        // silence during the gap does not count as missing data
        assert_eq!(ctl.check_timeout(resumed_at + Duration::from_millis(500)).unwrap(), None);
        // remaining copies read after the gap do not pause again
        assert_eq!(ctl.handle_line(line, resumed_at).unwrap(), SyncOutcome::Unchanged);
        assert_eq!(ctl.state(), SyncState::Playing);
        assert_eq!(
            player.calls()[1..],
            [PlayerCall::Stop, PlayerCall::Resume]
        );
        assert!(matches!(
            ctl.handle_line("AB12A_02_abcdefabcd_0000_0013", resumed_at).unwrap(),
            SyncOutcome::Started { .. }
        ));
        assert_eq!(ctl.handle_line(line, resumed_at).unwrap(), SyncOutcome::Paused { seconds: 3 });
    }

    #[test]
    fn test_zero_mute_is_noop() {
        let (mut ctl, player) = controller();
        let outcome = ctl.handle_line("AB12A_02_0123456789_000M_0010", Instant::now()).unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(ctl.state(), SyncState::Init);
        assert!(player.calls().is_empty());
    }

    #[test]
    fn test_timeout_stops_and_clears() {
        let (mut ctl, player) = controller();
        let start = Instant::now();
        let line = "AB12A_01_0123456789_0005_0005";
        ctl.handle_line(line, start).unwrap();

        assert_eq!(ctl.check_timeout(start + Duration::from_millis(900)).unwrap(), None);
        let later = start + Duration::from_millis(1500);
        assert_eq!(ctl.check_timeout(later).unwrap(), Some(SyncOutcome::Stopped));
        assert_eq!(ctl.cursor().audio_id(), None);

        // same record again is a cold start
        assert!(matches!(ctl.handle_line(line, later).unwrap(), SyncOutcome::Started { .. }));
        assert_eq!(
            player.calls(),
            vec![
                PlayerCall::Play("0123456789".into(), 80_000),
                PlayerCall::Stop,
                PlayerCall::Play("0123456789".into(), 80_000),
            ]
        );
    }

    #[test]
    fn test_dynamic_without_mapping_keeps_playback() {
        let (ctl, player) = controller();
        let mut ctl = ctl.with_resolver(Box::new(FixedResolver(None)));
        let now = Instant::now();
        ctl.handle_line("AB12A_01_0123456789_0005_0005", now).unwrap();
        let before = (ctl.cursor().audio_id().map(String::from), ctl.current_position_seconds());

        let outcome = ctl.handle_line("AB12A_02_DYNAMICMP3_0000_0006", now).unwrap();
        assert_eq!(outcome, SyncOutcome::Ignored);
        assert_eq!(
            (ctl.cursor().audio_id().map(String::from), ctl.current_position_seconds()),
            before
        );
        assert_eq!(player.calls().len(), 1);
        assert_eq!(ctl.state(), SyncState::Playing);
    }

    #[test]
    fn test_dynamic_with_mapping_plays_target() {
        let mapped = DecodedFrame::play("AB12", 'A', 2, "abcdefabcd", 4, 20).unwrap();
        let (ctl, player) = controller();
        let mut ctl = ctl.with_resolver(Box::new(FixedResolver(Some(mapped))));
        ctl.handle_line("AB12A_02_DYNAMICMP3_0000_0020", Instant::now()).unwrap();
        assert_eq!(player.calls(), vec![PlayerCall::Play("abcdefabcd".into(), 64_000)]);
    }

    #[test]
    fn test_absorb_transient() {
        let err = Err(CassetteError::NotFound("x".into()));
        assert_eq!(absorb_transient(err).unwrap(), SyncOutcome::Ignored);
        assert!(absorb_transient(Err(CassetteError::SinkWrite)).is_err());
    }
}
