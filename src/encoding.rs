use std::borrow::Cow;
use std::fmt;

use anyhow::Result;
use encoding_rs::{
    Encoding, ISO_8859_5, KOI8_R, KOI8_U, UTF_16BE, UTF_16LE, WINDOWS_1251, WINDOWS_1252,
};
use tracing::debug;

use crate::bom::strip_utf8_bom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    Utf16Le,
    Utf16Be,
    Koi8R,
    Koi8U,
    Windows1251,
    Windows1252,
    Latin1,
    Iso8859_5,
}

impl Codec {
    fn legacy_encoding(self) -> Option<&'static Encoding> {
        match self {
            Codec::Koi8R => Some(KOI8_R),
            Codec::Koi8U => Some(KOI8_U),
            Codec::Windows1251 => Some(WINDOWS_1251),
            Codec::Windows1252 => Some(WINDOWS_1252),
            Codec::Iso8859_5 => Some(ISO_8859_5),
            Codec::Utf8 | Codec::Utf16Le | Codec::Utf16Be | Codec::Latin1 => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingCandidate {
    pub label: &'static str,
    pub codec: Codec,
}

pub const CANDIDATES: &[EncodingCandidate] = &[
    EncodingCandidate {
        label: "UTF-8",
        codec: Codec::Utf8,
    },
    EncodingCandidate {
        label: "UTF-16LE",
        codec: Codec::Utf16Le,
    },
    EncodingCandidate {
        label: "UTF-16BE",
        codec: Codec::Utf16Be,
    },
    EncodingCandidate {
        label: "KOI8-R",
        codec: Codec::Koi8R,
    },
    EncodingCandidate {
        label: "KOI8-U",
        codec: Codec::Koi8U,
    },
    EncodingCandidate {
        label: "CP1251",
        codec: Codec::Windows1251,
    },
    EncodingCandidate {
        label: "CP1252",
        codec: Codec::Windows1252,
    },
    EncodingCandidate {
        label: "WINDOWS-1252",
        codec: Codec::Windows1252,
    },
    EncodingCandidate {
        label: "ISO-8859-1",
        codec: Codec::Latin1,
    },
    EncodingCandidate {
        label: "ISO-8859-5",
        codec: Codec::Iso8859_5,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    ControlCharacter(char),
    Noncharacter(char),
    Pseudographic(char),
    WideScriptWithoutSpacing,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Malformed => f.write_str("malformed byte sequence"),
            Rejection::ControlCharacter(ch) => {
                write!(f, "control character U+{:04X}", u32::from(*ch))
            }
            Rejection::Noncharacter(ch) => write!(f, "noncharacter U+{:04X}", u32::from(*ch)),
            Rejection::Pseudographic(ch) => {
                write!(f, "pseudographic character U+{:04X}", u32::from(*ch))
            }
            Rejection::WideScriptWithoutSpacing => {
                f.write_str("ideographs without any spacing in BOM-less UTF-16 text")
            }
        }
    }
}

impl EncodingCandidate {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, Rejection> {
        let text = match self.codec {
            Codec::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| Rejection::Malformed)?,
            Codec::Utf16Le => decode_utf16(UTF_16LE, bytes)?,
            Codec::Utf16Be => decode_utf16(UTF_16BE, bytes)?,
            Codec::Latin1 => encoding_rs::mem::decode_latin1(bytes),
            legacy => {
                let encoding = legacy.legacy_encoding().ok_or(Rejection::Malformed)?;
                let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
                if had_errors {
                    debug!("{}: unmappable bytes replaced with U+FFFD", self.label);
                }
                text
            }
        };

        check_text(&text, self.codec.legacy_encoding().is_some())?;
        Ok(text)
    }
}

fn decode_utf16<'a>(
    encoding: &'static Encoding,
    bytes: &'a [u8],
) -> Result<Cow<'a, str>, Rejection> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(Rejection::Malformed);
    }
    if let Some(rest) = text.strip_prefix('\u{FEFF}') {
        return Ok(Cow::Owned(rest.to_owned()));
    }
    // 8-bit text read as UTF-16 pairs printable bytes into CJK, Hangul or
    // private-use code units and never yields a spacing code unit.
    let spaced = text.contains([' ', '\t', '\r', '\n', '\u{3000}']);
    if !spaced && text.chars().any(is_wide_script) {
        return Err(Rejection::WideScriptWithoutSpacing);
    }
    Ok(text)
}

fn is_wide_script(ch: char) -> bool {
    matches!(
        ch,
        '\u{2E80}'..='\u{9FFF}'
            | '\u{A000}'..='\u{A4CF}'
            | '\u{AC00}'..='\u{D7AF}'
            | '\u{E000}'..='\u{FAFF}'
    )
}

fn check_text(text: &str, legacy: bool) -> Result<(), Rejection> {
    for ch in text.chars() {
        if is_disallowed_control(ch) {
            return Err(Rejection::ControlCharacter(ch));
        }
        if matches!(ch, '\u{FFFE}' | '\u{FFFF}') {
            return Err(Rejection::Noncharacter(ch));
        }
        if legacy && is_koi8_graphic(ch) {
            return Err(Rejection::Pseudographic(ch));
        }
    }
    Ok(())
}

// KOI8 graphics at 0x80..0xBF, where the Windows pages keep punctuation.
fn is_koi8_graphic(ch: char) -> bool {
    matches!(
        ch,
        '\u{2500}'..='\u{25A0}'
            | '\u{2320}'
            | '\u{2321}'
            | '\u{2219}'
            | '\u{221A}'
            | '\u{2248}'
            | '\u{2264}'
            | '\u{2265}'
    )
}

pub fn is_disallowed_control(ch: char) -> bool {
    match ch {
        '\t' | '\n' | '\u{0B}' | '\u{0C}' | '\r' | '\u{1A}' | '\u{1B}' | '\u{7F}' => false,
        _ => ch.is_control(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trial {
    Accepted(EncodingCandidate),
    Exhausted,
}

pub fn run_trials<F>(mut bytes: Vec<u8>, candidates: &[EncodingCandidate], mut write: F) -> Trial
where
    F: FnMut(&[u8]) -> Result<()>,
{
    if strip_utf8_bom(&mut bytes) {
        debug!("stripped UTF-8 BOM");
    }

    for candidate in candidates {
        let text = match candidate.decode(&bytes) {
            Ok(text) => text,
            Err(rejection) => {
                debug!("{} rejected: {rejection}", candidate.label);
                continue;
            }
        };

        if let Err(err) = write(text.as_bytes()) {
            debug!("{} decoded but rewrite failed: {err:#}", candidate.label);
            continue;
        }

        debug!("converted from {}", candidate.label);
        return Trial::Accepted(*candidate);
    }

    Trial::Exhausted
}
