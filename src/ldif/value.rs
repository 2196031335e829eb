//! Decoding of the right-hand side of an attribute line.
//!
//! The character immediately after the separator colon picks the encoding:
//!
//! - nothing → empty value
//! - `:` → base64, standard alphabet with padding
//! - `<` → a URL whose content becomes the value (`file:` supported)
//! - anything else → plain UTF-8 after skipping leading spaces

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::trace;
use url::Url;

use super::config::ImportConfig;

/// Position of the separator colon, if the line has a well-placed one.
/// A missing colon, or a colon in the first column, means the line carries
/// no attribute name.
pub(crate) fn colon_position(line: &str) -> Option<usize> {
    match line.find(':') {
        Some(0) | None => None,
        Some(pos) => Some(pos),
    }
}

/// Decodes the value portion of `line` following the colon at `colon_pos`.
///
/// Errors are returned as bare messages; callers attach record context and
/// line numbers.
pub(crate) fn decode_value(
    line: &str,
    colon_pos: usize,
    config: &ImportConfig,
) -> Result<Vec<u8>, String> {
    let bytes = line.as_bytes();
    if colon_pos == line.len() - 1 {
        return Ok(Vec::new());
    }

    match bytes[colon_pos + 1] {
        b':' => {
            let encoded = skip_spaces(line, colon_pos + 2);
            STANDARD
                .decode(encoded)
                .map_err(|e| format!("unable to base64-decode the value '{encoded}': {e}"))
        }
        b'<' => {
            let spec = skip_spaces(line, colon_pos + 2);
            fetch_url_value(spec, config)
        }
        _ => {
            let value = skip_spaces(line, colon_pos + 1);
            Ok(value.as_bytes().to_vec())
        }
    }
}

/// Skips any number of spaces starting at byte offset `from`.
fn skip_spaces(line: &str, from: usize) -> &str {
    let bytes = line.as_bytes();
    let mut pos = from;
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }
    &line[pos..]
}

/// Parses an absolute URL and reads its content to end-of-file.
///
/// The scheme must be on the configuration's allow-list; of the allowed
/// schemes only `file:` can actually be fetched.
fn fetch_url_value(spec: &str, config: &ImportConfig) -> Result<Vec<u8>, String> {
    let url = Url::parse(spec).map_err(|e| format!("unable to parse the URL '{spec}': {e}"))?;
    let scheme = url.scheme();
    if !config.url_scheme_allowed(scheme) {
        return Err(format!(
            "the URL scheme '{scheme}' is not permitted by the import configuration"
        ));
    }
    if scheme != "file" {
        return Err(format!("the URL scheme '{scheme}' is not supported"));
    }
    let path = url
        .to_file_path()
        .map_err(|_| format!("the URL '{spec}' does not name a local file"))?;
    trace!("Reading URL-referenced value from {}", path.display());
    std::fs::read(&path)
        .map_err(|e| format!("unable to read the URL '{spec}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_separator_colon() {
        assert_eq!(colon_position("cn: value"), Some(2));
        assert_eq!(colon_position("cn:"), Some(2));
        assert_eq!(colon_position(": value"), None);
        assert_eq!(colon_position("no separator"), None);
    }

    #[test]
    fn decodes_plain_values() {
        let config = ImportConfig::new();
        let line = "cn:    spaced out";
        let value = decode_value(line, 2, &config).unwrap();
        assert_eq!(value, b"spaced out");
    }

    #[test]
    fn decodes_empty_value() {
        let config = ImportConfig::new();
        assert_eq!(decode_value("cn:", 2, &config).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decodes_base64_values() {
        let config = ImportConfig::new();
        let value = decode_value("cn:: SGVsbG8=", 2, &config).unwrap();
        assert_eq!(value, b"Hello");

        assert!(decode_value("cn:: !!!bad!!!", 2, &config).is_err());
    }

    #[test]
    fn file_url_values_are_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.bin");
        std::fs::write(&path, b"\x00\x01payload").unwrap();

        let config = ImportConfig::new();
        let line = format!("data:< file://{}", path.display());
        let colon = colon_position(&line).unwrap();
        let value = decode_value(&line, colon, &config).unwrap();
        assert_eq!(value, b"\x00\x01payload");
    }

    #[test]
    fn disallowed_url_schemes_are_refused() {
        let config = ImportConfig::new();
        let err = decode_value("data:< http://example.com/x", 4, &config).unwrap_err();
        assert!(err.contains("not permitted"), "unexpected message: {err}");
    }
}
