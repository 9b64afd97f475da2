//! Content-type sniffing.
//!
//! Uploads are classified from their leading bytes, never from the
//! client-supplied part header. The table covers the formats web backends are
//! usually asked to accept; anything else is `text/plain; charset=utf-8` when
//! it contains no binary control bytes and `application/octet-stream`
//! otherwise. Only the first [`SNIFF_LEN`] bytes are looked at.

use std::path::Path;

/// How many leading bytes [`detect_content_type`] considers.
pub const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Exact prefixes, checked in order.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
];

/// Case-insensitive markup openers, matched after leading whitespace and
/// followed by a space or `>`.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML", b"<HTML", b"<HEAD", b"<SCRIPT", b"<IFRAME", b"<H1", b"<DIV",
    b"<FONT", b"<TABLE", b"<A", b"<STYLE", b"<TITLE", b"<B", b"<BODY", b"<BR", b"<P",
];

/// Infers the media type of `data` from its leading bytes.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(markup) = sniff_markup(data) {
        return markup;
    }

    if let Some(&(_, ct)) = SIGNATURES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return ct;
    }

    if let Some(ct) = sniff_riff(data).or_else(|| sniff_mp4(data)) {
        return ct;
    }

    if data.iter().any(|&b| is_binary(b)) { OCTET_STREAM } else { TEXT_PLAIN }
}

/// Whether `content_type` passes `allowed`. An empty list allows everything.
pub fn is_allowed(content_type: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(content_type))
}

/// Guesses a `Content-Type` header for a file served from disk, by extension.
pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "text/xml; charset=utf-8",
        "txt" | "md" => TEXT_PLAIN,
        "csv" => "text/csv; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => OCTET_STREAM,
    }
}

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    let start = data.iter().position(|b| !b.is_ascii_whitespace())?;
    let data = &data[start..];

    if data.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    if data.starts_with(b"<!--") {
        return Some("text/html; charset=utf-8");
    }

    HTML_TAGS
        .iter()
        .any(|tag| {
            data.len() > tag.len()
                && data[..tag.len()].eq_ignore_ascii_case(tag)
                && matches!(data[tag.len()], b' ' | b'>')
        })
        .then_some("text/html; charset=utf-8")
}

fn sniff_riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || !data.starts_with(b"RIFF") {
        return None;
    }
    match &data[8..12] {
        b"WEBP" => Some("image/webp"),
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        _ => None,
    }
}

fn sniff_mp4(data: &[u8]) -> Option<&'static str> {
    (data.len() >= 12 && &data[4..8] == b"ftyp").then_some("video/mp4")
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
