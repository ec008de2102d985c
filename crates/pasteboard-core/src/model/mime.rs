//! MIME type and UTD (uniform type descriptor) identifiers.
//!
//! Producers usually talk in MIME strings, the record model stores entries
//! keyed by UTD id.  The five legacy types map one-to-one; any other string is
//! used as its own UTD id.

pub const MIMETYPE_TEXT_PLAIN: &str = "text/plain";
pub const MIMETYPE_TEXT_HTML: &str = "text/html";
pub const MIMETYPE_TEXT_URI: &str = "text/uri";
pub const MIMETYPE_TEXT_WANT: &str = "text/want";
pub const MIMETYPE_PIXELMAP: &str = "pixelMap";
pub const MIMETYPE_OCTET_STREAM: &str = "application/octet-stream";

/// UTD identifiers for the legacy entry types.
pub mod utd {
    pub const PLAIN_TEXT: &str = "general.plain-text";
    pub const HTML: &str = "general.html";
    pub const FILE_URI: &str = "general.file-uri";
    pub const WANT: &str = "openharmony.want";
    pub const PIXEL_MAP: &str = "openharmony.pixel-map";
}

const LEGACY: [(&str, &str); 5] = [
    (MIMETYPE_TEXT_PLAIN, utd::PLAIN_TEXT),
    (MIMETYPE_TEXT_HTML, utd::HTML),
    (MIMETYPE_TEXT_URI, utd::FILE_URI),
    (MIMETYPE_TEXT_WANT, utd::WANT),
    (MIMETYPE_PIXELMAP, utd::PIXEL_MAP),
];

/// Returns `true` for plain text, HTML and URI.
///
/// Basic types are always eagerly resolvable on the local side; everything
/// else (want, pixel map, custom UTD, octet-stream) may legitimately need a
/// delay getter.
pub fn is_basic_type(mime_type: &str) -> bool {
    matches!(
        mime_type,
        MIMETYPE_TEXT_PLAIN | MIMETYPE_TEXT_HTML | MIMETYPE_TEXT_URI
    )
}

/// Maps a MIME type to its UTD id.
pub fn utd_for_mime(mime_type: &str) -> &str {
    LEGACY
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, utd)| *utd)
        .unwrap_or(mime_type)
}

/// Maps a UTD id back to its MIME type.
pub fn mime_for_utd(utd_id: &str) -> &str {
    LEGACY
        .iter()
        .find(|(_, utd)| *utd == utd_id)
        .map(|(mime, _)| *mime)
        .unwrap_or(utd_id)
}
