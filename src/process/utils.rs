use encoding_rs::WINDOWS_1252;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Decode CSV bytes. CVM publishes ISO-8859-1, newer files are UTF-8;
/// anything that is not valid UTF-8 is read as windows-1252 (the WHATWG
/// "latin1"), so 0x80..=0x9F become quotes and dashes, not C1 controls.
pub fn decode_text(buf: Vec<u8>) -> String {
    match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
            text.into_owned()
        }
    }
}

/// Header cleanup: BOM, surrounding whitespace and quotes.
pub fn clean_header(raw: &str) -> String {
    clean_str(raw.trim_start_matches('\u{feff}')).to_string()
}
