use std::fs;

use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::bom::{detect_bom, has_utf8_bom};
use crate::convert::ConversionOutcome;
use crate::encoding::is_disallowed_control;
use crate::files::FileTask;

pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const HEX_EXCERPT_BYTES: usize = 32;

pub trait CharsetSniffer {
    fn sniff(&self, bytes: &[u8]) -> Option<&'static Encoding>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSniffer;

impl CharsetSniffer for ContentSniffer {
    fn sniff(&self, bytes: &[u8]) -> Option<&'static Encoding> {
        if let Some(encoding) = detect_bom(bytes) {
            return Some(encoding);
        }

        if bytes.contains(&0) {
            return None;
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            // Control bytes mean UTF-16 or binary data that happens to be valid UTF-8.
            if text.chars().any(is_disallowed_control) {
                return None;
            }
            return Some(UTF_8);
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        Some(detector.guess(None, true))
    }
}

#[derive(Debug)]
pub enum Classification {
    Skip(ConversionOutcome),
    Convert(Vec<u8>),
}

pub fn classify(task: &FileTask, sniffer: &dyn CharsetSniffer) -> Result<Classification> {
    if task.len == 0 {
        return Ok(Classification::Skip(ConversionOutcome::SkippedEmpty));
    }
    if task.len > MAX_FILE_SIZE {
        return Ok(Classification::Skip(ConversionOutcome::SkippedTooLarge));
    }

    let bytes =
        fs::read(&task.path).with_context(|| format!("reading {}", task.path.display()))?;
    let charset = sniffer.sniff(&bytes);
    let has_bom = has_utf8_bom(&bytes);
    debug!(
        charset = charset.map_or("binary", Encoding::name),
        has_bom,
        head = %hex::encode(&bytes[..bytes.len().min(HEX_EXCERPT_BYTES)]),
        "sniffed {}",
        task.path.display()
    );

    if charset == Some(UTF_8) && !has_bom {
        return Ok(Classification::Skip(ConversionOutcome::SkippedAlreadyUtf8));
    }

    Ok(Classification::Convert(bytes))
}
