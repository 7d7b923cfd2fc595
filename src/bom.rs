use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

pub fn has_utf8_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(&UTF8_BOM)
}

pub fn strip_utf8_bom(bytes: &mut Vec<u8>) -> bool {
    if !has_utf8_bom(bytes) {
        return false;
    }
    bytes.drain(..UTF8_BOM.len());
    true
}

pub fn detect_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if has_utf8_bom(bytes) {
        return Some(UTF_8);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(UTF_16LE);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF_16BE);
    }

    None
}
