//! Tokio stage runtime: receiver, sync, tape playback and transmitter stages
//! joined by bounded channels and addressed by [`StageId`].

use crate::error::{CassetteError, Result};
use crate::line::LineAssembler;
use crate::receiver::FskReceiver;
use crate::sync::{absorb_transient, AudioDatabase, PlaybackSyncController, Player, SyncOutcome, SyncState};
use crate::tape::TapeFileReader;
use crate::transmitter::{FskTransmitter, PcmSink};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io::BufRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Receiver,
    Sync,
    TapePlayback,
    Transmitter,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageId::Receiver => "receiver",
            StageId::Sync => "sync",
            StageId::TapePlayback => "tape-playback",
            StageId::Transmitter => "transmitter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Started,
    /// Input ran out or the stage was told to stop
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub stage: StageId,
    pub status: StageStatus,
}

struct StageHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<Result<()>>,
}

/// Owns the running stages and their stop signals.
pub struct Pipeline {
    stages: HashMap<StageId, StageHandle>,
    events_tx: mpsc::UnboundedSender<StageEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StageEvent>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            stages: HashMap::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// The single listener for stage events; `None` once taken
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StageEvent>> {
        self.events_rx.take()
    }

    pub fn is_running(&self, stage: StageId) -> bool {
        self.stages.get(&stage).is_some_and(|h| !h.join.is_finished())
    }

    fn spawn_stage<F, Fut>(&mut self, stage: StageId, body: F) -> Result<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_running(stage) {
            return Err(CassetteError::InvalidConfig(format!("stage {} already running", stage)));
        }

        let (stop, stop_rx) = watch::channel(false);
        let events = self.events_tx.clone();
        let fut = body(stop_rx);
        let join = tokio::spawn(async move {
            let _ = events.send(StageEvent {
                stage,
                status: StageStatus::Started,
            });
            let result = fut.await;
            let status = match &result {
                Ok(()) => StageStatus::Finished,
                Err(err) => {
                    log::error!("stage {} failed: {}", stage, err);
                    StageStatus::Failed(err.to_string())
                }
            };
            let _ = events.send(StageEvent { stage, status });
            result
        });
        log::debug!("stage {} spawned", stage);
        self.stages.insert(stage, StageHandle { stop, join });
        Ok(())
    }

    /// Signal a stage to stop and wait until it has released its buffers.
    pub async fn stop_stage(&mut self, stage: StageId) -> Result<()> {
        let Some(handle) = self.stages.remove(&stage) else {
            return Ok(());
        };
        let _ = handle.stop.send(true);
        join_stage(stage, handle.join).await
    }

    /// Wait for a stage to finish on its own (its input closed).
    pub async fn wait(&mut self, stage: StageId) -> Result<()> {
        let Some(StageHandle { stop, join }) = self.stages.remove(&stage) else {
            return Ok(());
        };
        // a dropped sender reads as a stop request
        let result = join_stage(stage, join).await;
        drop(stop);
        result
    }

    /// Stop every stage, sources first.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_err = None;
        for stage in [StageId::Receiver, StageId::TapePlayback, StageId::Sync, StageId::Transmitter] {
            if let Err(err) = self.stop_stage(stage).await {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Demodulate PCM chunks (S16LE stereo) into lines.
    ///
    /// Each chunk is decoded on the blocking pool. When `pcm` closes the tail
    /// of the receive buffer is flushed before the stage finishes.
    pub fn spawn_receiver(
        &mut self,
        receiver: FskReceiver,
        mut pcm: mpsc::Receiver<Vec<u8>>,
        lines: mpsc::Sender<String>,
    ) -> Result<()> {
        self.spawn_stage(StageId::Receiver, move |mut stop| async move {
            let mut receiver = Some(receiver);
            let mut assembler = LineAssembler::new();

            loop {
                let chunk = tokio::select! {
                    _ = stop.changed() => break,
                    chunk = pcm.recv() => chunk,
                };
                let Some(mut rx) = receiver.take() else { break };
                let last = chunk.is_none();

                let (rx, decoded) = tokio::task::spawn_blocking(move || {
                    let decoded = match chunk {
                        Some(bytes) => rx.push_pcm(&bytes),
                        None => rx.finish(),
                    };
                    (rx, decoded)
                })
                .await
                .map_err(|e| CassetteError::StageStopped(format!("receiver: {}", e)))?;

                for line in assembler.push(&decoded?) {
                    if lines.send(line).await.is_err() {
                        return Ok(());
                    }
                }
                if last {
                    break;
                }
                receiver = Some(rx);
            }
            Ok(())
        })
    }

    /// Reconcile incoming lines with the player.
    ///
    /// Ticks every `tape_tick` to run the pause countdown and the no-data
    /// timeout. Playback is stopped when the stage ends. The returned watch
    /// follows the controller state; a tape source holds back lines on it.
    pub fn spawn_sync<P, D>(
        &mut self,
        mut controller: PlaybackSyncController<P, D>,
        mut lines: mpsc::Receiver<String>,
    ) -> Result<watch::Receiver<SyncState>>
    where
        P: Player + Send + 'static,
        D: AudioDatabase + Send + 'static,
    {
        let tick = controller.config().tape_tick();
        let (state_tx, state_rx) = watch::channel(controller.state());
        self.spawn_stage(StageId::Sync, move |mut stop| async move {
            let mut ticker = time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    line = lines.recv() => {
                        let Some(line) = line else { break };
                        let now = time::Instant::now().into_std();
                        match absorb_transient(controller.handle_line(&line, now))? {
                            SyncOutcome::Unchanged | SyncOutcome::Ignored => {}
                            outcome => log::debug!("{} -> {:?}", line, outcome),
                        }
                    }
                    _ = ticker.tick() => {
                        let now = time::Instant::now().into_std();
                        controller.tick(tick, now)?;
                        controller.check_timeout(now)?;
                    }
                }
                state_tx.send_if_modified(|state| {
                    let changed = *state != controller.state();
                    *state = controller.state();
                    changed
                });
            }
            controller.stop()?;
            state_tx.send_replace(controller.state());
            Ok(())
        })?;
        Ok(state_rx)
    }

    /// Feed a tape file into `lines`, one line per `tick`.
    ///
    /// No line is read while `sync` reports [`SyncState::Paused`], so a mute
    /// gap lasts its full length before the next record goes out.
    pub fn spawn_tape_playback<R>(
        &mut self,
        mut reader: TapeFileReader<R>,
        lines: mpsc::Sender<String>,
        tick: time::Duration,
        sync: watch::Receiver<SyncState>,
    ) -> Result<()>
    where
        R: BufRead + Send + 'static,
    {
        self.spawn_stage(StageId::TapePlayback, move |mut stop| async move {
            let mut ticker = time::interval(tick);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if *sync.borrow() == SyncState::Paused {
                            continue;
                        }
                        let Some(line) = reader.next_line()? else {
                            log::info!("end of tape after {} lines", reader.lines_read());
                            break;
                        };
                        if lines.send(line).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Modulate lines into `sink`, closing the burst when input ends.
    pub fn spawn_transmitter<S>(
        &mut self,
        transmitter: FskTransmitter,
        mut lines: mpsc::Receiver<String>,
        sink: S,
    ) -> Result<()>
    where
        S: PcmSink + Send + 'static,
    {
        self.spawn_stage(StageId::Transmitter, move |mut stop| async move {
            let mut state = Some((transmitter, sink));
            loop {
                let line = tokio::select! {
                    _ = stop.changed() => None,
                    line = lines.recv() => line,
                };
                let Some((mut tx, mut sink)) = state.take() else { break };
                let done = line.is_none();

                let (tx, sink, written) = tokio::task::spawn_blocking(move || {
                    let written = match line {
                        Some(line) => tx.transmit_line(&line, &mut sink),
                        None => tx.end_burst(&mut sink),
                    };
                    (tx, sink, written)
                })
                .await
                .map_err(|e| CassetteError::StageStopped(format!("transmitter: {}", e)))?;
                written?;

                if done {
                    break;
                }
                state = Some((tx, sink));
            }
            Ok(())
        })
    }
}

async fn join_stage(stage: StageId, join: JoinHandle<Result<()>>) -> Result<()> {
    join.await
        .map_err(|e| CassetteError::StageStopped(format!("{}: {}", stage, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::line::{TapeItem, TapeWriter};
    use crate::profile::{Direction, FskFramePlan, ModemProfile};
    use crate::sync::tests::{MapDb, MockPlayer, PlayerCall};
    use crate::transmitter::IoSink;
    use std::io::Cursor;
    use std::time::Duration;

    fn controller(player: &MockPlayer) -> PlaybackSyncController<MockPlayer, MapDb> {
        PlaybackSyncController::new(
            player.clone(),
            MapDb::with(&["0123456789", "abcdefabcd"]),
            SyncConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_tape_playback_drives_player() {
        let writer = TapeWriter::new("AB12", 'A').unwrap();
        let mut tape = Vec::new();
        writer
            .write(&mut tape, &[TapeItem::new("0123456789", 3), TapeItem::new("abcdefabcd", 2)])
            .unwrap();

        let player = MockPlayer::default();
        let mut pipeline = Pipeline::new();
        let mut events = pipeline.take_events().unwrap();
        let (line_tx, line_rx) = mpsc::channel(5);

        let sync = pipeline.spawn_sync(controller(&player), line_rx).unwrap();
        pipeline
            .spawn_tape_playback(
                TapeFileReader::new(Cursor::new(tape)),
                line_tx,
                Duration::from_millis(250),
                sync,
            )
            .unwrap();

        pipeline.wait(StageId::TapePlayback).await.unwrap();
        pipeline.wait(StageId::Sync).await.unwrap();

        assert_eq!(
            player.calls(),
            vec![
                PlayerCall::Play("0123456789".into(), 0),
                PlayerCall::Stop,
                PlayerCall::Play("abcdefabcd".into(), 0),
                PlayerCall::Stop,
            ]
        );

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&StageEvent {
            stage: StageId::TapePlayback,
            status: StageStatus::Finished
        }));
        assert!(!pipeline.is_running(StageId::Sync));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tape_playback_holds_lines_during_mute() {
        let writer = TapeWriter::new("AB12", 'A').unwrap().with_mute_seconds(3);
        let mut tape = Vec::new();
        writer
            .write(&mut tape, &[TapeItem::new("0123456789", 2), TapeItem::new("abcdefabcd", 2)])
            .unwrap();

        let player = MockPlayer::default();
        let mut pipeline = Pipeline::new();
        let (line_tx, line_rx) = mpsc::channel(5);
        let sync = pipeline.spawn_sync(controller(&player), line_rx).unwrap();
        pipeline
            .spawn_tape_playback(
                TapeFileReader::new(Cursor::new(tape)),
                line_tx,
                Duration::from_millis(250),
                sync,
            )
            .unwrap();

        // first mute copy goes out at 2 s; the gap runs until about 5 s
        time::sleep(Duration::from_millis(4600)).await;
        assert_eq!(
            player.calls(),
            vec![PlayerCall::Play("0123456789".into(), 0), PlayerCall::Stop]
        );

        pipeline.wait(StageId::TapePlayback).await.unwrap();
        pipeline.wait(StageId::Sync).await.unwrap();
        assert_eq!(
            player.calls(),
            vec![
                PlayerCall::Play("0123456789".into(), 0),
                PlayerCall::Stop,
                PlayerCall::Resume,
                PlayerCall::Play("abcdefabcd".into(), 0),
                PlayerCall::Stop,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_stops_when_lines_dry_up() {
        let player = MockPlayer::default();
        let mut pipeline = Pipeline::new();
        let (line_tx, line_rx) = mpsc::channel(5);
        pipeline.spawn_sync(controller(&player), line_rx).unwrap();

        line_tx.send("AB12A_01_0123456789_0005_0005".into()).await.unwrap();
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(player.calls(), vec![PlayerCall::Play("0123456789".into(), 80_000)]);

        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(player.calls().last(), Some(&PlayerCall::Stop));

        pipeline.shutdown().await.unwrap();
        assert_eq!(player.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_runs_on_ticks() {
        let player = MockPlayer::default();
        let mut pipeline = Pipeline::new();
        let (line_tx, line_rx) = mpsc::channel(5);
        pipeline.spawn_sync(controller(&player), line_rx).unwrap();

        line_tx.send("AB12A_01_0123456789_0000_0000".into()).await.unwrap();
        for _ in 0..4 {
            line_tx.send("AB12A_02_abcdefabcd_002M_0001".into()).await.unwrap();
        }
        time::sleep(Duration::from_millis(2600)).await;

        assert_eq!(
            player.calls()[..3],
            [
                PlayerCall::Play("0123456789".into(), 0),
                PlayerCall::Stop,
                PlayerCall::Resume,
            ]
        );
        pipeline.stop_stage(StageId::Sync).await.unwrap();
    }

    #[tokio::test]
    async fn test_receiver_stage_emits_lines() {
        let line = "AB12A_01_0123456789_0005_0005";
        let mut tx = FskTransmitter::new(ModemProfile::bell202(Direction::Transmit).unwrap()).unwrap();
        let mut sink = IoSink::new(Vec::new());
        tx.transmit_line(line, &mut sink).unwrap();
        tx.end_burst(&mut sink).unwrap();
        let bytes = sink.into_inner();

        let rx = FskReceiver::new(FskFramePlan::new(ModemProfile::bell202(Direction::Receive).unwrap()).unwrap())
            .unwrap();
        let mut pipeline = Pipeline::new();
        let (pcm_tx, pcm_rx) = mpsc::channel(4);
        let (line_tx, mut line_rx) = mpsc::channel(5);
        pipeline.spawn_receiver(rx, pcm_rx, line_tx).unwrap();

        for chunk in bytes.chunks(4096) {
            pcm_tx.send(chunk.to_vec()).await.unwrap();
        }
        drop(pcm_tx);

        assert_eq!(line_rx.recv().await.as_deref(), Some(line));
        pipeline.wait(StageId::Receiver).await.unwrap();
        assert_eq!(line_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_transmitter_stage_writes_sink() {
        let tx = FskTransmitter::new(ModemProfile::bell202(Direction::Transmit).unwrap()).unwrap();
        let mut pipeline = Pipeline::new();
        let (line_tx, line_rx) = mpsc::channel(5);
        let (pcm_tx, mut pcm_rx) = mpsc::unbounded_channel();
        pipeline.spawn_transmitter(tx, line_rx, ChannelSink(pcm_tx)).unwrap();

        line_tx.send("AB12A_01_0123456789_0005_0005".into()).await.unwrap();
        drop(line_tx);
        pipeline.wait(StageId::Transmitter).await.unwrap();

        let mut frames = 0;
        while let Ok(samples) = pcm_rx.try_recv() {
            frames += samples.len() / 2;
        }
        // leader, 30 frames of 10 bits, trailer
        assert_eq!(frames, (2 + 300 + 2) * 40);
    }

    #[tokio::test]
    async fn test_duplicate_stage_rejected() {
        let player = MockPlayer::default();
        let mut pipeline = Pipeline::new();
        let (_tx1, rx1) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);
        pipeline.spawn_sync(controller(&player), rx1).unwrap();
        assert!(pipeline.spawn_sync(controller(&player), rx2).is_err());
        pipeline.stop_stage(StageId::Sync).await.unwrap();
        assert!(!pipeline.is_running(StageId::Sync));
    }

    struct ChannelSink(mpsc::UnboundedSender<Vec<i16>>);

    impl PcmSink for ChannelSink {
        fn write_pcm(&mut self, samples: &[i16]) -> Result<usize> {
            self.0
                .send(samples.to_vec())
                .map_err(|_| CassetteError::SinkWrite)?;
            Ok(samples.len() / 2)
        }
    }
}
