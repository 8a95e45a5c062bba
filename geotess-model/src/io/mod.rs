//! File-format support
//!
//! Two encodings share one structure: binary (little-endian, u32
//! length-prefixed UTF-8 strings) and ASCII (newline-separated records,
//! space-separated fields, binary values pretty-printed as decimal; the
//! binary encoding is canonical). Both start with the same ASCII magic,
//! so a file is sniffed by what follows it: a newline means ASCII, a
//! version word means binary.
//!
//! [`extension`] carries the derived-class hook: a class tag and format
//! version after the base payload, dispatched through an explicit
//! registry.

pub mod extension;
pub mod stream;

use std::path::Path;

/// True when `data` is the ASCII rendering of a file with this magic.
pub fn is_ascii_header(data: &[u8], magic: &str) -> bool {
    let m = magic.as_bytes();
    data.len() > m.len()
        && &data[..m.len()] == m
        && (data[m.len()] == b'\n' || data[m.len()] == b'\r')
}

/// File naming convention: `.ascii` paths hold the ASCII format.
pub fn is_ascii_path(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("ascii"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sniffing_distinguishes_the_encodings() {
        assert!(is_ascii_header(b"GEOTESSGRID\n2\n", "GEOTESSGRID"));
        assert!(is_ascii_header(b"GEOTESSGRID\r\n2\r\n", "GEOTESSGRID"));
        // Binary: the u32 version follows the magic directly.
        assert!(!is_ascii_header(
            b"GEOTESSGRID\x02\x00\x00\x00",
            "GEOTESSGRID"
        ));
        assert!(!is_ascii_header(b"GEOTESS", "GEOTESSGRID"));
    }

    #[test]
    fn ascii_paths_by_extension() {
        assert!(is_ascii_path(Path::new("model.ascii")));
        assert!(is_ascii_path(Path::new("model.ASCII")));
        assert!(!is_ascii_path(Path::new("model.geotess")));
        assert!(!is_ascii_path(Path::new("model")));
    }
}
