use crate::profile::CodecKind;
use std::fmt::Write as _;

/// ITA2 shift codes
const BAUDOT_FIGS: u8 = 0x1B;
const BAUDOT_LTRS: u8 = 0x1F;
const BAUDOT_SPACE: u8 = 0x04;

/// Letters and US figures for each 5-bit code. 0 marks a shift code.
const BAUDOT_TABLE: [(u8, u8); 32] = [
    (b'*', b'*'),
    (b'E', b'3'),
    (b'\n', b'\n'),
    (b'A', b'-'),
    (b' ', b' '),
    (b'S', 0x07),
    (b'I', b'8'),
    (b'U', b'7'),
    (b'\r', b'\r'),
    (b'D', b'$'),
    (b'R', b'4'),
    (b'J', b'\''),
    (b'N', b','),
    (b'F', b'!'),
    (b'C', b':'),
    (b'K', b'('),
    (b'T', b'5'),
    (b'Z', b'"'),
    (b'L', b')'),
    (b'W', b'2'),
    (b'H', b'#'),
    (b'Y', b'6'),
    (b'P', b'0'),
    (b'Q', b'1'),
    (b'O', b'9'),
    (b'B', b'?'),
    (b'G', b'&'),
    (0, 0),
    (b'M', b'.'),
    (b'X', b'/'),
    (b'V', b';'),
    (0, 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudotShift {
    Letters,
    Figures,
}

/// Caller-ID message types
const CID_MSG_SDMF: u8 = 0x04;
const CID_MSG_MDMF: u8 = 0x80;

/// MDMF parameter types
const CID_DATETIME: u8 = 0x01;
const CID_PHONE: u8 = 0x02;
const CID_PHONE_NA: u8 = 0x04;
const CID_NAME: u8 = 0x07;
const CID_NAME_NA: u8 = 0x08;

/// Turns frame data words into output bytes and back.
///
/// Only [`BitCodec::Ascii8`] is used by the tape format; the other variants
/// cover the remaining modem families.
#[derive(Debug, Clone)]
pub enum BitCodec {
    Ascii8,
    Baudot { rx: BaudotShift, tx: BaudotShift },
    /// Each data bit rendered as an ASCII '0'/'1', in line order
    Binary { data_bits: u32, pending: u64, npending: u32 },
    CallerId { message: Vec<u8> },
    Uic { ground: bool },
}

impl BitCodec {
    pub fn new(kind: CodecKind, data_bits: u32) -> Self {
        match kind {
            CodecKind::Ascii8 => BitCodec::Ascii8,
            CodecKind::Baudot => BitCodec::Baudot {
                rx: BaudotShift::Letters,
                tx: BaudotShift::Letters,
            },
            CodecKind::Binary => BitCodec::Binary {
                data_bits,
                pending: 0,
                npending: 0,
            },
            CodecKind::CallerId => BitCodec::CallerId { message: Vec::new() },
            CodecKind::UicTrain => BitCodec::Uic { ground: false },
            CodecKind::UicGround => BitCodec::Uic { ground: true },
        }
    }

    /// Drop shift state and partial messages, e.g. on a fresh carrier
    pub fn reset(&mut self) {
        match self {
            BitCodec::Ascii8 | BitCodec::Uic { .. } => {}
            BitCodec::Baudot { rx, tx } => {
                *rx = BaudotShift::Letters;
                *tx = BaudotShift::Letters;
            }
            BitCodec::Binary { pending, npending, .. } => {
                *pending = 0;
                *npending = 0;
            }
            BitCodec::CallerId { message } => message.clear(),
        }
    }

    /// Decode one frame's data word (`nbits` wide, first received bit in bit 0).
    pub fn decode(&mut self, word: u64, nbits: u32, out: &mut Vec<u8>) {
        match self {
            BitCodec::Ascii8 => out.push(word as u8),
            BitCodec::Baudot { rx, .. } => {
                let code = (word & 0x1F) as u8;
                match code {
                    BAUDOT_FIGS => *rx = BaudotShift::Figures,
                    BAUDOT_LTRS => *rx = BaudotShift::Letters,
                    _ => {
                        if code == BAUDOT_SPACE {
                            *rx = BaudotShift::Letters;
                        }
                        let (letter, figure) = BAUDOT_TABLE[code as usize];
                        out.push(if *rx == BaudotShift::Letters { letter } else { figure });
                    }
                }
            }
            BitCodec::Binary { .. } => {
                out.extend((0..nbits).map(|i| b'0' + ((word >> i) & 1) as u8));
            }
            BitCodec::CallerId { message } => {
                message.push(word as u8);
                if let Some(text) = callerid_take(message) {
                    out.extend_from_slice(text.as_bytes());
                }
            }
            BitCodec::Uic { ground } => {
                out.extend_from_slice(uic_describe(word, *ground).as_bytes());
            }
        }
    }

    /// Encode one input byte into zero or more frame data words.
    pub fn encode(&mut self, byte: u8, words: &mut Vec<u64>) {
        match self {
            BitCodec::Ascii8 => words.push(byte as u64),
            BitCodec::Baudot { tx, .. } => baudot_encode(tx, byte, words),
            BitCodec::Binary {
                data_bits,
                pending,
                npending,
            } => {
                let bit = match byte {
                    b'0' => 0,
                    b'1' => 1,
                    _ => return,
                };
                *pending |= bit << *npending;
                *npending += 1;
                if *npending == *data_bits {
                    words.push(*pending);
                    *pending = 0;
                    *npending = 0;
                }
            }
            BitCodec::CallerId { .. } | BitCodec::Uic { .. } => {
                log::warn!("receive-only codec cannot encode byte {:#04x}", byte);
            }
        }
    }
}

fn baudot_encode(shift: &mut BaudotShift, byte: u8, words: &mut Vec<u64>) {
    let ch = byte.to_ascii_uppercase();
    let Some(code) = BAUDOT_TABLE.iter().position(|&(l, _)| l == ch && l != 0) else {
        let Some(code) = BAUDOT_TABLE.iter().position(|&(_, f)| f == ch && f != 0) else {
            log::debug!("no baudot code for {:#04x}", byte);
            return;
        };
        if *shift != BaudotShift::Figures {
            words.push(BAUDOT_FIGS as u64);
            *shift = BaudotShift::Figures;
        }
        words.push(code as u64);
        return;
    };

    let (letter, figure) = BAUDOT_TABLE[code];
    if letter != figure && *shift != BaudotShift::Letters {
        words.push(BAUDOT_LTRS as u64);
        *shift = BaudotShift::Letters;
    }
    if code as u8 == BAUDOT_SPACE {
        // receivers unshift on space
        *shift = BaudotShift::Letters;
    }
    words.push(code as u64);
}

/// Returns formatted text once `message` holds a full Caller-ID message.
fn callerid_take(message: &mut Vec<u8>) -> Option<String> {
    if message[0] != CID_MSG_SDMF && message[0] != CID_MSG_MDMF {
        message.clear();
        return None;
    }
    if message.len() < 2 {
        return None;
    }
    let len = message[1] as usize;
    if message.len() < len + 3 {
        return None;
    }

    let sum = message.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let msg = std::mem::take(message);
    if sum != 0 {
        log::warn!("caller-id checksum mismatch, dropping {} byte message", msg.len());
        return None;
    }

    let body = &msg[2..2 + len];
    let mut text = String::from("CALLER-ID\n");
    if msg[0] == CID_MSG_SDMF {
        if body.len() >= 8 {
            push_datetime(&mut text, &body[..8]);
            let _ = writeln!(text, " NUMBER: {}", String::from_utf8_lossy(&body[8..]));
        }
        return Some(text);
    }

    let mut rest = body;
    while rest.len() >= 2 {
        let (kind, plen) = (rest[0], rest[1] as usize);
        let value = &rest[2..(2 + plen).min(rest.len())];
        match kind {
            CID_DATETIME if value.len() >= 8 => push_datetime(&mut text, value),
            CID_PHONE => {
                let _ = writeln!(text, " NUMBER: {}", String::from_utf8_lossy(value));
            }
            CID_NAME => {
                let _ = writeln!(text, " NAME: {}", String::from_utf8_lossy(value));
            }
            CID_PHONE_NA | CID_NAME_NA => {
                let reason = match value.first() {
                    Some(b'O') => "unavailable",
                    Some(b'P') => "private",
                    _ => "unknown",
                };
                let field = if kind == CID_PHONE_NA { "NUMBER" } else { "NAME" };
                let _ = writeln!(text, " {}: {}", field, reason);
            }
            _ => {}
        }
        rest = &rest[(2 + plen).min(rest.len())..];
    }
    Some(text)
}

fn push_datetime(text: &mut String, field: &[u8]) {
    let _ = writeln!(text, " DATE: {}", String::from_utf8_lossy(&field[..4]));
    let _ = writeln!(text, " TIME: {}", String::from_utf8_lossy(&field[4..8]));
}

/// UIC-751-3 telegram: 24-bit identifier followed by an 8-bit message code
fn uic_describe(word: u64, ground: bool) -> String {
    let identifier = word & 0xFF_FFFF;
    let code = (word >> 24) & 0xFF;
    let origin = if ground { "ground" } else { "train" };
    format!("UIC-751-3 {} id {:06X} message {:02X}\n", origin, identifier, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(codec: &mut BitCodec, text: &[u8]) -> Vec<u64> {
        let mut words = Vec::new();
        for &b in text {
            codec.encode(b, &mut words);
        }
        words
    }

    #[test]
    fn test_ascii8_passthrough() {
        let mut codec = BitCodec::new(CodecKind::Ascii8, 8);
        let words = encode_all(&mut codec, b"AB12");
        let mut out = Vec::new();
        for w in words {
            codec.decode(w, 8, &mut out);
        }
        assert_eq!(out, b"AB12");
    }

    #[test]
    fn test_baudot_shifts() {
        let mut tx = BitCodec::new(CodecKind::Baudot, 5);
        let words = encode_all(&mut tx, b"RY 73 de K1");
        // FIGS before "73", space unshifts, FIGS again before "1"
        assert_eq!(words.iter().filter(|&&w| w == BAUDOT_FIGS as u64).count(), 2);

        let mut rx = BitCodec::new(CodecKind::Baudot, 5);
        let mut out = Vec::new();
        for w in words {
            rx.decode(w, 5, &mut out);
        }
        assert_eq!(out, b"RY 73 DE K1");
    }

    #[test]
    fn test_baudot_unshift_on_space() {
        let mut rx = BitCodec::new(CodecKind::Baudot, 5);
        let mut out = Vec::new();
        for code in [BAUDOT_FIGS, 0x01, BAUDOT_SPACE, 0x01] {
            rx.decode(code as u64, 5, &mut out);
        }
        assert_eq!(out, b"3 E");
    }

    #[test]
    fn test_binary_bits() {
        let mut codec = BitCodec::new(CodecKind::Binary, 4);
        let words = encode_all(&mut codec, b"1011x0001");
        assert_eq!(words, vec![0b1101, 0b1000]);

        let mut out = Vec::new();
        codec.decode(0b1101, 4, &mut out);
        assert_eq!(out, b"1011");
    }

    #[test]
    fn test_callerid_sdmf() {
        let mut codec = BitCodec::new(CodecKind::CallerId, 8);
        let body = b"011512305551234";
        let mut msg = vec![CID_MSG_SDMF, body.len() as u8];
        msg.extend_from_slice(body);
        let sum = msg.iter().fold(0u8, |a, b| a.wrapping_add(*b));
        msg.push(0u8.wrapping_sub(sum));

        let mut out = Vec::new();
        for b in msg {
            codec.decode(b as u64, 8, &mut out);
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("DATE: 0115"));
        assert!(text.contains("TIME: 1230"));
        assert!(text.contains("NUMBER: 5551234"));
    }

    #[test]
    fn test_callerid_bad_checksum_dropped() {
        let mut codec = BitCodec::new(CodecKind::CallerId, 8);
        let mut out = Vec::new();
        for b in [CID_MSG_MDMF, 3, CID_PHONE, 1, b'5', 0x00] {
            codec.decode(b as u64, 8, &mut out);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_callerid_mdmf_fields() {
        let mut codec = BitCodec::new(CodecKind::CallerId, 8);
        let mut body = vec![CID_PHONE, 3, b'5', b'5', b'5', CID_NAME_NA, 1, b'P'];
        let mut msg = vec![CID_MSG_MDMF, body.len() as u8];
        msg.append(&mut body);
        let sum = msg.iter().fold(0u8, |a, b| a.wrapping_add(*b));
        msg.push(0u8.wrapping_sub(sum));

        let mut out = Vec::new();
        for b in msg {
            codec.decode(b as u64, 8, &mut out);
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("NUMBER: 555"));
        assert!(text.contains("NAME: private"));
    }

    #[test]
    fn test_uic_message() {
        let mut codec = BitCodec::new(CodecKind::UicGround, 39);
        let mut out = Vec::new();
        codec.decode((0x44u64 << 24) | 0x12_3456, 39, &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "UIC-751-3 ground id 123456 message 44\n");
    }
}
