use crate::error::{CassetteError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest frame (start + data + stop bits) the bit accumulator can hold
pub const MAX_FRAME_BITS: f32 = 64.0;

/// Receive sample buffer is never smaller than this fraction of a second
const SAMPLE_BUF_DIVISOR: u32 = 12;

/// Frame pattern of a UIC-751-3 telegram: 8 fixed header bits then 39 data bits
const UIC_START_PATTERN: &str = "11110010";
const UIC_DATA_BITS: u32 = 39;

/// Modem family selector, as accepted on the command line and in config files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModemFamily {
    /// Plain numeric baud rate with Bell-like default tones
    Baud(f32),
    Rtty,
    Tdd,
    Same,
    CallerId,
    UicTrain,
    UicGround,
    V21,
}

impl FromStr for ModemFamily {
    type Err = CassetteError;

    fn from_str(s: &str) -> Result<Self> {
        let family = match s.to_ascii_lowercase().as_str() {
            "rtty" => ModemFamily::Rtty,
            "tdd" => ModemFamily::Tdd,
            "same" => ModemFamily::Same,
            "callerid" => ModemFamily::CallerId,
            "uic" | "uic-train" => ModemFamily::UicTrain,
            "uic-ground" => ModemFamily::UicGround,
            "v21" | "v.21" => ModemFamily::V21,
            other => {
                let rate: f32 = other
                    .parse()
                    .map_err(|_| CassetteError::InvalidConfig(format!("unknown modem mode {:?}", s)))?;
                if !(rate > 0.0 && rate.is_finite()) {
                    return Err(CassetteError::InvalidConfig(format!("baud rate must be positive, got {}", rate)));
                }
                ModemFamily::Baud(rate)
            }
        };
        Ok(family)
    }
}

impl fmt::Display for ModemFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemFamily::Baud(rate) => write!(f, "{}", rate),
            ModemFamily::Rtty => f.write_str("rtty"),
            ModemFamily::Tdd => f.write_str("tdd"),
            ModemFamily::Same => f.write_str("same"),
            ModemFamily::CallerId => f.write_str("callerid"),
            ModemFamily::UicTrain => f.write_str("uic-train"),
            ModemFamily::UicGround => f.write_str("uic-ground"),
            ModemFamily::V21 => f.write_str("v.21"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Transmit => "transmit",
            Direction::Receive => "receive",
        }
    }
}

/// Bit-to-byte coding used on top of the FSK frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Ascii8,
    Baudot,
    Binary,
    CallerId,
    UicTrain,
    UicGround,
}

/// Optional knobs layered over a family's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub mark_hz: Option<f32>,
    pub space_hz: Option<f32>,
    pub band_width: Option<f32>,
    pub data_bits: Option<u32>,
    pub start_bits: Option<u32>,
    pub stop_bits: Option<f32>,
    pub msb_first: bool,
    pub invert_start_stop: bool,
    pub inverted_freqs: bool,
    pub sync_byte: Option<u8>,
    pub sync_preamble_count: Option<u32>,
    /// Raw N-bit frames with no start/stop framing
    pub raw_bits: Option<u32>,
    pub binary_output: bool,
    pub confidence_threshold: Option<f32>,
    pub confidence_search_limit: Option<f32>,
    /// Carrier autodetection magnitude threshold; absent or 0 disables it
    pub autodetect_threshold: Option<f32>,
    pub tx_amplitude: Option<f32>,
    pub sin_table_len: Option<usize>,
    pub leader_bits: Option<u32>,
    pub trailer_bits: Option<u32>,
}

/// Immutable modem parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ModemProfile {
    pub family: ModemFamily,
    pub sample_rate: u32,
    pub data_rate: f32,
    pub mark_hz: f32,
    pub space_hz: f32,
    pub band_width: f32,
    /// Signed mark-to-space offset used when deriving the space band of an autodetected carrier
    pub autodetect_shift: f32,
    pub start_bits: u32,
    pub data_bits: u32,
    pub stop_bits: f32,
    pub msb_first: bool,
    pub invert_start_stop: bool,
    pub inverted_freqs: bool,
    pub sync_byte: Option<u8>,
    pub sync_preamble_count: u32,
    pub codec: CodecKind,
    pub confidence_threshold: f32,
    pub confidence_search_limit: f32,
    pub autodetect_threshold: f32,
    pub tx_amplitude: f32,
    pub sin_table_len: usize,
    pub leader_bits: u32,
    pub trailer_bits: u32,
    start_pattern: Option<&'static str>,
}

impl ModemProfile {
    /// Derive a profile from a family selector and overrides.
    ///
    /// Tone defaults by rate when not fixed by the family or overridden:
    /// - rate >= 400: mark = rate/2 + 600, space = mark + rate*5/6, 200 Hz bands
    /// - rate >= 100: mark 1270, space 1070, 50 Hz bands
    /// - below: mark 1585, space 1415, 10 Hz bands
    pub fn derive(
        family: ModemFamily,
        direction: Direction,
        overrides: &ProfileOverrides,
        sample_rate: u32,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CassetteError::InvalidConfig("sample rate must be positive".into()));
        }

        let mut mark_hz = 0.0f32;
        let mut space_hz = 0.0f32;
        let mut band_width = 0.0f32;
        let mut data_bits = 8u32;
        let mut start_bits = 1u32;
        let mut stop_bits = 1.0f32;
        let mut sync_byte = None;
        let mut sync_preamble_count = 0u32;
        let mut codec = CodecKind::Ascii8;
        let mut start_pattern = None;

        let data_rate = match family {
            ModemFamily::Baud(rate) => rate,
            ModemFamily::Rtty => {
                data_bits = 5;
                stop_bits = 1.5;
                codec = CodecKind::Baudot;
                45.45
            }
            ModemFamily::Tdd => {
                data_bits = 5;
                stop_bits = 2.0;
                codec = CodecKind::Baudot;
                mark_hz = 1400.0;
                space_hz = 1800.0;
                45.45
            }
            ModemFamily::Same => {
                let rate = 520.0 + 5.0 / 6.0;
                start_bits = 0;
                stop_bits = 0.0;
                sync_byte = Some(0xAB);
                sync_preamble_count = 16;
                mark_hz = 2083.0 + 1.0 / 3.0;
                space_hz = 1562.5;
                band_width = rate;
                rate
            }
            ModemFamily::CallerId => {
                codec = CodecKind::CallerId;
                mark_hz = 1200.0;
                space_hz = 2200.0;
                1200.0
            }
            ModemFamily::UicTrain | ModemFamily::UicGround => {
                codec = if family == ModemFamily::UicTrain {
                    CodecKind::UicTrain
                } else {
                    CodecKind::UicGround
                };
                data_bits = UIC_DATA_BITS;
                start_bits = UIC_START_PATTERN.len() as u32;
                stop_bits = 0.0;
                start_pattern = Some(UIC_START_PATTERN);
                mark_hz = 1300.0;
                space_hz = 1700.0;
                600.0
            }
            ModemFamily::V21 => {
                mark_hz = 980.0;
                space_hz = 1180.0;
                300.0
            }
        };

        if matches!(codec, CodecKind::CallerId | CodecKind::UicTrain | CodecKind::UicGround)
            && direction == Direction::Transmit
        {
            return Err(CassetteError::UnsupportedMode {
                mode: family.to_string(),
                direction: direction.as_str(),
            });
        }

        if let Some(raw) = overrides.raw_bits {
            data_bits = raw;
            start_bits = 0;
            stop_bits = 0.0;
            codec = CodecKind::Binary;
        }
        if let Some(n) = overrides.data_bits {
            data_bits = n;
        }
        if let Some(n) = overrides.start_bits {
            start_bits = n;
            start_pattern = None;
        }
        if let Some(n) = overrides.stop_bits {
            stop_bits = n;
        }
        if overrides.binary_output && codec != CodecKind::Binary {
            codec = CodecKind::Binary;
        }
        if let Some(byte) = overrides.sync_byte {
            sync_byte = Some(byte);
            sync_preamble_count = 16;
        }
        if let Some(count) = overrides.sync_preamble_count {
            sync_preamble_count = count;
        }
        mark_hz = overrides.mark_hz.unwrap_or(mark_hz);
        space_hz = overrides.space_hz.unwrap_or(space_hz);
        band_width = overrides.band_width.unwrap_or(band_width);

        if data_bits == 0 {
            return Err(CassetteError::InvalidConfig("at least one data bit is required".into()));
        }
        if stop_bits < 0.0 || !stop_bits.is_finite() {
            return Err(CassetteError::InvalidConfig(format!("invalid stop bit count {}", stop_bits)));
        }
        frame_bit_count(start_bits, data_bits, stop_bits)?;

        let autodetect_shift;
        if data_rate >= 400.0 {
            autodetect_shift = -(data_rate * 5.0 / 6.0);
            if mark_hz == 0.0 {
                mark_hz = data_rate / 2.0 + 600.0;
            }
            if space_hz == 0.0 {
                space_hz = mark_hz - autodetect_shift;
            }
            if band_width == 0.0 {
                band_width = 200.0;
            }
        } else if data_rate >= 100.0 {
            autodetect_shift = 200.0;
            if mark_hz == 0.0 {
                mark_hz = 1270.0;
            }
            if space_hz == 0.0 {
                space_hz = mark_hz - autodetect_shift;
            }
            if band_width == 0.0 {
                band_width = 50.0;
            }
        } else {
            autodetect_shift = 170.0;
            if mark_hz == 0.0 {
                mark_hz = 1585.0;
            }
            if space_hz == 0.0 {
                space_hz = mark_hz - autodetect_shift;
            }
            if band_width == 0.0 {
                band_width = 10.0;
            }
        }

        if overrides.inverted_freqs {
            std::mem::swap(&mut mark_hz, &mut space_hz);
        }
        if band_width > data_rate {
            band_width = data_rate;
        }
        if mark_hz <= 0.0 || space_hz <= 0.0 || band_width <= 0.0 {
            return Err(CassetteError::InvalidConfig(format!(
                "invalid tones mark={} space={} band_width={}",
                mark_hz, space_hz, band_width
            )));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if mark_hz >= nyquist || space_hz >= nyquist {
            return Err(CassetteError::InvalidConfig(format!(
                "tones must stay below {} Hz at {} Hz sample rate",
                nyquist, sample_rate
            )));
        }

        let confidence_threshold = overrides.confidence_threshold.unwrap_or(1.5);
        let confidence_search_limit = overrides
            .confidence_search_limit
            .unwrap_or(2.3)
            .max(confidence_threshold);
        let leader_bits = if start_bits == 0 {
            0
        } else {
            overrides.leader_bits.unwrap_or(2)
        };

        Ok(Self {
            family,
            sample_rate,
            data_rate,
            mark_hz,
            space_hz,
            band_width,
            autodetect_shift,
            start_bits,
            data_bits,
            stop_bits,
            msb_first: overrides.msb_first,
            invert_start_stop: overrides.invert_start_stop,
            inverted_freqs: overrides.inverted_freqs,
            sync_byte,
            sync_preamble_count,
            codec,
            confidence_threshold,
            confidence_search_limit,
            autodetect_threshold: overrides.autodetect_threshold.unwrap_or(0.0).max(0.0),
            tx_amplitude: overrides.tx_amplitude.unwrap_or(1.0),
            sin_table_len: overrides.sin_table_len.unwrap_or(crate::tone::DEFAULT_SIN_TABLE_LEN),
            leader_bits,
            trailer_bits: overrides.trailer_bits.unwrap_or(2),
            start_pattern,
        })
    }

    /// 1200 baud Bell 202 style profile used for tape data
    pub fn bell202(direction: Direction) -> Result<Self> {
        Self::derive(
            ModemFamily::Baud(1200.0),
            direction,
            &ProfileOverrides::default(),
            crate::SAMPLE_RATE,
        )
    }

    pub fn samples_per_bit(&self) -> f32 {
        self.sample_rate as f32 / self.data_rate
    }

    /// Rounded per-bit duration used by the transmitter
    pub fn bit_nsamples(&self) -> usize {
        (self.samples_per_bit() + 0.5) as usize
    }

    pub fn start_tone(&self) -> f32 {
        if self.invert_start_stop {
            self.mark_hz
        } else {
            self.space_hz
        }
    }

    pub fn stop_tone(&self) -> f32 {
        if self.invert_start_stop {
            self.space_hz
        } else {
            self.mark_hz
        }
    }
}

/// Start + data + stop bits, rejected above [`MAX_FRAME_BITS`]
fn frame_bit_count(start_bits: u32, data_bits: u32, stop_bits: f32) -> Result<f32> {
    let total = start_bits as f32 + data_bits as f32 + stop_bits;
    if total > MAX_FRAME_BITS {
        let reported = start_bits.saturating_add(data_bits).saturating_add(stop_bits.ceil() as u32);
        return Err(CassetteError::FrameTooLong(reported));
    }
    Ok(total)
}

/// Receive-side frame geometry derived from a [`ModemProfile`].
#[derive(Debug, Clone, PartialEq)]
pub struct FskFramePlan {
    pub profile: ModemProfile,
    /// Whole bits per frame (start + data + integral stop bits)
    pub frame_bits: u32,
    pub frame_nsamples: usize,
    /// Pattern for data frames: '0'/'1' fixed framing bits, 'd' free data bits
    pub expect_data: Vec<u8>,
    /// Pattern used while acquiring; matches the sync byte when one is configured
    pub expect_sync: Vec<u8>,
    pub expect_nsamples: usize,
    pub overscan: usize,
    pub samplebuf_size: usize,
}

impl FskFramePlan {
    pub fn new(profile: ModemProfile) -> Result<Self> {
        let spb = profile.samples_per_bit();
        let frame_bits = frame_bit_count(profile.start_bits, profile.data_bits, profile.stop_bits)? as u32;
        let frame_nsamples = (spb * frame_bits as f32 + 0.5) as usize;

        let expect_data = build_expect_bits(&profile, None);
        let expect_sync = match profile.sync_byte {
            Some(byte) => build_expect_bits(&profile, Some(byte as u64)),
            None => expect_data.clone(),
        };
        if expect_data.len() > 65 {
            return Err(CassetteError::FrameTooLong(expect_data.len() as u32));
        }
        let expect_nsamples = (spb * expect_data.len() as f32) as usize;

        let overscan = ((spb * 0.5 + 0.5) as usize).max(1);

        let nbits = 1 + profile.start_bits as usize + profile.data_bits as usize + 1;
        let mut samplebuf_size = spb.ceil() as usize * (nbits + 1) * 2;
        let floor = (profile.sample_rate / SAMPLE_BUF_DIVISOR) as usize;
        if samplebuf_size < floor {
            samplebuf_size = floor;
        }

        let mut plan = Self {
            profile,
            frame_bits,
            frame_nsamples,
            expect_data,
            expect_sync,
            expect_nsamples,
            overscan,
            samplebuf_size,
        };
        // Room for the widest search window plus one frame
        plan.samplebuf_size = plan.samplebuf_size.max(plan.search_span(false) * 2);

        log::debug!(
            "frame plan: spb={:.2} frame_bits={} expect={} overscan={} buf={}",
            spb,
            plan.frame_bits,
            String::from_utf8_lossy(&plan.expect_data),
            plan.overscan,
            plan.samplebuf_size
        );
        Ok(plan)
    }

    pub fn samples_per_bit(&self) -> f32 {
        self.profile.samples_per_bit()
    }

    /// End of the frame-start search window: tighter once a carrier is tracked
    pub fn try_max_nsamples(&self, carrier: bool) -> usize {
        let spb = self.samples_per_bit();
        let base = if carrier {
            (spb * 0.75 + 0.5) as usize
        } else {
            spb as usize
        };
        base + self.overscan
    }

    pub fn try_first_sample(&self, carrier: bool) -> usize {
        if carrier {
            self.overscan
        } else {
            0
        }
    }

    /// Valid samples needed before a frame search may run
    pub fn search_span(&self, carrier: bool) -> usize {
        self.try_max_nsamples(carrier) + self.expect_nsamples + 2
    }

    pub fn expect_pattern(&self, carrier: bool) -> &[u8] {
        if carrier {
            &self.expect_data
        } else {
            &self.expect_sync
        }
    }
}

fn build_expect_bits(profile: &ModemProfile, fixed_data: Option<u64>) -> Vec<u8> {
    let (start_value, stop_value) = if profile.invert_start_stop {
        (b'1', b'0')
    } else {
        (b'0', b'1')
    };
    let mut bits = Vec::with_capacity((profile.start_bits + profile.data_bits + 2) as usize);

    if profile.stop_bits != 0.0 {
        bits.push(stop_value);
    }
    match profile.start_pattern {
        Some(pattern) => bits.extend_from_slice(pattern.as_bytes()),
        None => bits.extend(std::iter::repeat(start_value).take(profile.start_bits as usize)),
    }
    for i in 0..profile.data_bits {
        bits.push(match fixed_data {
            Some(word) => b'0' + ((word >> i) & 1) as u8,
            None => b'd',
        });
    }
    if profile.stop_bits != 0.0 {
        bits.push(stop_value);
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx(family: ModemFamily) -> Result<ModemProfile> {
        ModemProfile::derive(family, Direction::Receive, &ProfileOverrides::default(), 48000)
    }

    #[test]
    fn test_bell202_defaults() {
        let profile = ModemProfile::bell202(Direction::Transmit).unwrap();
        assert_eq!(profile.mark_hz, 1200.0);
        assert_eq!(profile.space_hz, 2200.0);
        assert_eq!(profile.band_width, 200.0);
        assert_eq!(profile.autodetect_shift, -1000.0);
        assert_eq!(profile.bit_nsamples(), 40);
        assert_eq!(profile.leader_bits, 2);
        assert_eq!(profile.codec, CodecKind::Ascii8);
    }

    #[test]
    fn test_rate_ranges() {
        let bell103 = rx(ModemFamily::Baud(300.0)).unwrap();
        assert_eq!((bell103.mark_hz, bell103.space_hz, bell103.band_width), (1270.0, 1070.0, 50.0));

        let rtty = rx(ModemFamily::Rtty).unwrap();
        assert_eq!((rtty.mark_hz, rtty.space_hz), (1585.0, 1415.0));
        assert_eq!(rtty.band_width, 10.0);
        assert_eq!(rtty.stop_bits, 1.5);
        assert_eq!(rtty.codec, CodecKind::Baudot);

        let tdd = rx(ModemFamily::Tdd).unwrap();
        assert_eq!((tdd.mark_hz, tdd.space_hz, tdd.stop_bits), (1400.0, 1800.0, 2.0));
    }

    #[test]
    fn test_band_width_capped_to_rate() {
        let same = rx(ModemFamily::Same).unwrap();
        assert!(same.band_width <= same.data_rate);
        let slow = ModemProfile::derive(
            ModemFamily::Baud(50.0),
            Direction::Receive,
            &ProfileOverrides {
                band_width: Some(100.0),
                ..Default::default()
            },
            48000,
        )
        .unwrap();
        assert_eq!(slow.band_width, 50.0);
    }

    #[test]
    fn test_frame_bit_limit() {
        for data_bits in 1..=62u32 {
            let overrides = ProfileOverrides {
                data_bits: Some(data_bits),
                ..Default::default()
            };
            assert!(
                ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Receive, &overrides, 48000).is_ok(),
                "{} data bits should fit",
                data_bits
            );
        }

        let too_long = ProfileOverrides {
            data_bits: Some(63),
            ..Default::default()
        };
        let result = ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Transmit, &too_long, 48000);
        assert!(matches!(result, Err(CassetteError::FrameTooLong(65))));

        let raw_64 = ProfileOverrides {
            raw_bits: Some(64),
            ..Default::default()
        };
        assert!(ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Receive, &raw_64, 48000).is_ok());

        let huge = ProfileOverrides {
            data_bits: Some(u32::MAX),
            ..Default::default()
        };
        let result = ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Receive, &huge, 48000);
        assert!(matches!(result, Err(CassetteError::FrameTooLong(u32::MAX))));

        let mut profile = ModemProfile::bell202(Direction::Receive).unwrap();
        profile.start_bits = u32::MAX;
        assert!(matches!(FskFramePlan::new(profile), Err(CassetteError::FrameTooLong(_))));
    }

    #[test]
    fn test_receive_only_families() {
        for family in [ModemFamily::CallerId, ModemFamily::UicTrain, ModemFamily::UicGround] {
            let tx = ModemProfile::derive(family, Direction::Transmit, &ProfileOverrides::default(), 48000);
            assert!(matches!(tx, Err(CassetteError::UnsupportedMode { .. })));
            assert!(rx(family).is_ok());
        }
    }

    #[test]
    fn test_expect_patterns() {
        let plan = FskFramePlan::new(ModemProfile::bell202(Direction::Receive).unwrap()).unwrap();
        assert_eq!(plan.expect_data, b"10dddddddd1".to_vec());
        assert_eq!(plan.expect_sync, plan.expect_data);
        assert_eq!(plan.frame_bits, 10);
        assert_eq!(plan.frame_nsamples, 400);
        assert_eq!(plan.overscan, 20);
        assert_eq!(plan.try_max_nsamples(false), 60);
        assert_eq!(plan.try_max_nsamples(true), 50);

        let same = FskFramePlan::new(rx(ModemFamily::Same).unwrap()).unwrap();
        assert_eq!(same.expect_sync, b"11010101".to_vec());
        assert_eq!(same.expect_data, b"dddddddd".to_vec());

        let uic = FskFramePlan::new(rx(ModemFamily::UicTrain).unwrap()).unwrap();
        assert_eq!(uic.expect_data.len(), 47);
        assert!(uic.expect_data.starts_with(b"11110010d"));
    }

    #[test]
    fn test_inverted_start_stop_pattern() {
        let overrides = ProfileOverrides {
            invert_start_stop: true,
            ..Default::default()
        };
        let profile = ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Receive, &overrides, 48000).unwrap();
        let plan = FskFramePlan::new(profile).unwrap();
        assert_eq!(plan.expect_data, b"01dddddddd0".to_vec());
    }

    #[test]
    fn test_inverted_freqs_swap() {
        let overrides = ProfileOverrides {
            inverted_freqs: true,
            ..Default::default()
        };
        let profile = ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Receive, &overrides, 48000).unwrap();
        assert_eq!((profile.mark_hz, profile.space_hz), (2200.0, 1200.0));
    }

    #[test]
    fn test_samplebuf_floor() {
        let plan = FskFramePlan::new(ModemProfile::bell202(Direction::Receive).unwrap()).unwrap();
        assert!(plan.samplebuf_size >= 48000 / 12);
        assert!(plan.samplebuf_size >= plan.search_span(false) * 2);
    }

    #[test]
    fn test_parse_family() {
        assert_eq!("1200".parse::<ModemFamily>().unwrap(), ModemFamily::Baud(1200.0));
        assert_eq!("RTTY".parse::<ModemFamily>().unwrap(), ModemFamily::Rtty);
        assert_eq!("V.21".parse::<ModemFamily>().unwrap(), ModemFamily::V21);
        assert!("fast".parse::<ModemFamily>().is_err());
        assert!("-5".parse::<ModemFamily>().is_err());
    }

    #[test]
    fn test_leader_disabled_without_start_bits() {
        let overrides = ProfileOverrides {
            raw_bits: Some(16),
            ..Default::default()
        };
        let profile = ModemProfile::derive(ModemFamily::Baud(1200.0), Direction::Transmit, &overrides, 48000).unwrap();
        assert_eq!(profile.leader_bits, 0);
        assert_eq!(profile.codec, CodecKind::Binary);
    }
}
