//! Canonical on-disk names for downloaded papers.
//!
//! The same name is used to probe for an existing artifact and to place a new
//! one, so every component must go through [`canonical_filename`].

use std::borrow::Cow;

pub const PDF_SUFFIX: &str = ".pdf";

/// Maps a DOI to a single path segment: percent-decode once, then
/// percent-encode every byte outside `A-Za-z0-9-._~`, then append `.pdf`.
///
/// Decoding first means `10.1000%2Fxyz` and `10.1000/xyz` share a file.
/// Malformed escapes are kept literally and re-encoded.
pub fn canonical_filename(doi: &str) -> String {
    let decoded = urlencoding::decode_binary(doi.as_bytes());
    let decoded: Cow<'_, str> = String::from_utf8_lossy(&decoded);
    format!("{}{PDF_SUFFIX}", urlencoding::encode(&decoded))
}

/// Name used by the first generation of the downloader: `/` swapped for `_`.
pub fn legacy_filename(doi: &str) -> String {
    format!("{}{PDF_SUFFIX}", doi.replace('/', "_"))
}
