mod player;

use cassetteflow_core::pcm::{stereo_to_mono, to_s16le_bytes};
use cassetteflow_core::pipeline::{Pipeline, StageId};
use cassetteflow_core::{
    AudioDatabase, AudioDb, CassetteConfig, CassetteError, Direction, FskReceiver, FskTransmitter, LineAssembler,
    PcmSink, PlaybackSyncController, SideMap, TapeFileReader, TapeItem, TapeWriter,
};
use clap::{Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use player::{LoggingPlayer, PlayClock};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cassetteflow")]
#[command(about = "Cassette tape data modem and playback sync")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, value_name = "CONFIG.JSON")]
    config: Option<PathBuf>,

    /// Modem mode: a baud rate (default 1200), rtty, tdd, same, callerid, uic, v21
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Modem sample rate in Hz
    #[arg(long, global = true)]
    sample_rate: Option<u32>,

    /// Seconds of drift tolerated before playback is re-seeked
    #[arg(long, global = true)]
    tolerance: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the record file for one tape side
    Tapefile {
        /// Four character tape id
        tape_id: String,

        /// Tape side, A or B
        side: char,

        /// Items as AUDIO_ID:SECONDS, or AUDIO_ID alone when --db gives the duration
        #[arg(required = true)]
        items: Vec<String>,

        /// Output tape file
        #[arg(short, long, value_name = "TAPE.TXT")]
        output: PathBuf,

        /// Audio database for item durations
        #[arg(long, value_name = "AUDIODB.TSV")]
        db: Option<PathBuf>,

        /// Seconds of silence between items
        #[arg(long, default_value = "0")]
        mute: u32,

        /// Copies of each record (1 writes a side map)
        #[arg(long, default_value = "4")]
        replicate: usize,
    },

    /// Modulate text lines to a WAV file
    Encode {
        /// Input text file, one record per line
        #[arg(value_name = "INPUT.TXT")]
        input: PathBuf,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,
    },

    /// Demodulate a WAV file to text lines
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Output text file (stdout when omitted)
        #[arg(value_name = "OUTPUT.TXT")]
        output: Option<PathBuf>,
    },

    /// Decode a tape recording and keep a simulated player in sync with it
    Sync {
        /// Tape recording
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Audio database
        #[arg(long, value_name = "AUDIODB.TSV")]
        db: PathBuf,

        /// Side map for dynamic records
        #[arg(long, value_name = "SIDEMAP.TXT")]
        side_map: Option<PathBuf>,

        /// Feed audio at real-time speed, as a tape deck would
        #[arg(long)]
        realtime: bool,
    },

    /// Replay a tape file on a timer, without the modem
    Playback {
        /// Tape file
        #[arg(value_name = "TAPE.TXT")]
        input: PathBuf,

        /// Audio database
        #[arg(long, value_name = "AUDIODB.TSV")]
        db: PathBuf,

        /// Side map for dynamic records
        #[arg(long, value_name = "SIDEMAP.TXT")]
        side_map: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CassetteError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = std::result::Result<T, CliError>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Tapefile {
            tape_id,
            side,
            items,
            output,
            db,
            mute,
            replicate,
        } => tapefile_command(&tape_id, side, &items, &output, db.as_deref(), mute, replicate),
        Commands::Encode { input, output } => encode_command(&config, &input, &output),
        Commands::Decode { input, output } => decode_command(&config, &input, output.as_deref()),
        Commands::Sync {
            input,
            db,
            side_map,
            realtime,
        } => sync_command(&config, &input, &db, side_map.as_deref(), realtime).await,
        Commands::Playback { input, db, side_map } => {
            playback_command(&config, &input, &db, side_map.as_deref()).await
        }
    }
}

fn load_config(cli: &Cli) -> CliResult<CassetteConfig> {
    let mut config = match &cli.config {
        Some(path) => CassetteConfig::load(path)?,
        None => CassetteConfig::default(),
    };
    if let Some(mode) = &cli.mode {
        config.modem.mode = mode.clone();
    }
    if let Some(rate) = cli.sample_rate {
        config.modem.sample_rate = rate;
    }
    if let Some(tolerance) = cli.tolerance {
        config.sync.tolerance_seconds = tolerance;
    }
    Ok(config)
}

fn tapefile_command(
    tape_id: &str,
    side: char,
    items: &[String],
    output: &Path,
    db: Option<&Path>,
    mute: u32,
    replicate: usize,
) -> CliResult<()> {
    let db = db.map(AudioDb::load).transpose()?;

    let mut tape_items = Vec::with_capacity(items.len());
    for item in items {
        let (audio_id, seconds) = match item.split_once(':') {
            Some((id, secs)) => {
                let secs = secs
                    .parse()
                    .map_err(|_| CliError::Usage(format!("bad duration in {:?}", item)))?;
                (id, secs)
            }
            None => {
                let db = db
                    .as_ref()
                    .ok_or_else(|| CliError::Usage(format!("{} has no duration and no --db was given", item)))?;
                (item.as_str(), db.lookup(item)?.duration_seconds)
            }
        };
        tape_items.push(TapeItem::new(audio_id, seconds));
    }

    let writer = TapeWriter::new(tape_id, side)?
        .with_mute_seconds(mute)
        .with_replicate(replicate);
    let mut out = BufWriter::new(File::create(output)?);
    let total = writer.write(&mut out, &tape_items)?;
    out.flush()?;

    println!(
        "Wrote {} items, {} s of tape, to {}",
        tape_items.len(),
        total,
        output.display()
    );
    Ok(())
}

struct WavSink<W: Write + std::io::Seek> {
    writer: WavWriter<W>,
}

impl<W: Write + std::io::Seek> PcmSink for WavSink<W> {
    fn write_pcm(&mut self, samples: &[i16]) -> cassetteflow_core::Result<usize> {
        for &s in samples {
            self.writer
                .write_sample(s)
                .map_err(|e| CassetteError::Io(std::io::Error::other(e)))?;
        }
        Ok(samples.len() / 2)
    }
}

fn encode_command(config: &CassetteConfig, input: &Path, output: &Path) -> CliResult<()> {
    let profile = config.modem.profile(Direction::Transmit)?;
    let spec = WavSpec {
        channels: 2,
        sample_rate: profile.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut tx = FskTransmitter::new(profile)?;
    let mut sink = WavSink {
        writer: WavWriter::create(output, spec)?,
    };

    let mut lines = 0usize;
    let mut frames = 0usize;
    for line in BufReader::new(File::open(input)?).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        frames += tx.transmit_line(&line, &mut sink)?;
        lines += 1;
    }
    frames += tx.end_burst(&mut sink)?;
    sink.writer.finalize()?;

    println!(
        "Encoded {} lines to {:.1} s of audio in {}",
        lines,
        frames as f32 / spec.sample_rate as f32,
        output.display()
    );
    Ok(())
}

/// Interleaved stereo i16 samples of a WAV file, plus its sample rate.
fn read_wav_stereo(path: &Path) -> CliResult<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    tracing::info!(
        "read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * 32768.0).clamp(-32768.0, 32767.0) as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(CliError::Usage(format!("unsupported WAV format {:?}/{} bits", format, bits)));
        }
    };

    let stereo = match spec.channels {
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples,
        n => return Err(CliError::Usage(format!("unsupported channel count {}", n))),
    };
    Ok((stereo, spec.sample_rate))
}

fn receiver_for(config: &CassetteConfig, sample_rate: u32) -> CliResult<FskReceiver> {
    let mut modem = config.modem.clone();
    if modem.sample_rate != sample_rate {
        tracing::info!("using recording sample rate {} Hz", sample_rate);
        modem.sample_rate = sample_rate;
    }
    Ok(FskReceiver::new(modem.receive_plan()?)?)
}

fn decode_command(config: &CassetteConfig, input: &Path, output: Option<&Path>) -> CliResult<()> {
    let (stereo, sample_rate) = read_wav_stereo(input)?;
    let mut rx = receiver_for(config, sample_rate)?;

    let mut bytes = rx.push_samples(&stereo_to_mono(&stereo))?;
    bytes.extend(rx.finish()?);
    let lines = LineAssembler::new().push(&bytes);

    match output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            for line in &lines {
                writeln!(out, "{}", line)?;
            }
            out.flush()?;
            println!("Decoded {} lines to {}", lines.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for line in &lines {
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}

fn controller(
    config: &CassetteConfig,
    db: &Path,
    side_map: Option<&Path>,
    clock: PlayClock,
) -> CliResult<PlaybackSyncController<LoggingPlayer, AudioDb>> {
    let mut ctl = PlaybackSyncController::new(LoggingPlayer::new(clock), AudioDb::load(db)?, config.sync.clone());
    if let Some(path) = side_map {
        ctl = ctl.with_resolver(Box::new(SideMap::open(path)?));
    }
    Ok(ctl)
}

/// Run the pipeline until `last` finishes or Ctrl-C, then stop what is left.
async fn run_until_done(pipeline: &mut Pipeline, last: StageId) -> CliResult<()> {
    let interrupted = tokio::select! {
        result = pipeline.wait(last) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        println!("Interrupted");
    }
    pipeline.shutdown().await?;
    Ok(())
}

async fn sync_command(
    config: &CassetteConfig,
    input: &Path,
    db: &Path,
    side_map: Option<&Path>,
    realtime: bool,
) -> CliResult<()> {
    let (stereo, sample_rate) = read_wav_stereo(input)?;
    let rx = receiver_for(config, sample_rate)?;

    let fed = Arc::new(AtomicU64::new(0));
    let clock = PlayClock::Tape {
        fed: fed.clone(),
        sample_rate,
    };
    let ctl = controller(config, db, side_map, clock)?;

    let mut pipeline = Pipeline::new();
    let (pcm_tx, pcm_rx) = mpsc::channel::<Vec<u8>>(4);
    let (line_tx, line_rx) = mpsc::channel(config.sync.line_queue_depth.max(1));
    pipeline.spawn_receiver(rx, pcm_rx, line_tx)?;
    pipeline.spawn_sync(ctl, line_rx)?;

    // 100 ms of audio per chunk
    let chunk_frames = (sample_rate / 10).max(1) as usize;
    let feeder = tokio::spawn(async move {
        let mut pace = tokio::time::interval(Duration::from_millis(100));
        for chunk in stereo.chunks(chunk_frames * 2) {
            if realtime {
                pace.tick().await;
            }
            if pcm_tx.send(to_s16le_bytes(chunk)).await.is_err() {
                break;
            }
            fed.fetch_add((chunk.len() / 2) as u64, Ordering::Relaxed);
        }
    });

    run_until_done(&mut pipeline, StageId::Sync).await?;
    feeder.abort();
    println!("Tape ended");
    Ok(())
}

async fn playback_command(config: &CassetteConfig, input: &Path, db: &Path, side_map: Option<&Path>) -> CliResult<()> {
    let reader = TapeFileReader::open(input)?;
    let ctl = controller(config, db, side_map, PlayClock::Wall)?;

    let mut pipeline = Pipeline::new();
    let (line_tx, line_rx) = mpsc::channel(config.sync.line_queue_depth.max(1));
    let sync = pipeline.spawn_sync(ctl, line_rx)?;
    pipeline.spawn_tape_playback(reader, line_tx, config.sync.tape_tick(), sync)?;

    run_until_done(&mut pipeline, StageId::Sync).await?;
    println!("Tape ended");
    Ok(())
}
