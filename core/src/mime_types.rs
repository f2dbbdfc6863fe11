/*
 * mime_types.rs
 * Copyright (C) 2023 Brian Reid (br45entei@gmail.com)
 *
 * This file is part of HTTP Server Tester, a manual HTTP/1.1 client.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! File extension <-> MIME type table used to name downloaded bodies.
//! Lookups ignore case. Entries for one type are listed preferred-extension first.

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("shtml", "text/html"),
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("log", "text/plain"),
    ("conf", "text/plain"),
    ("ini", "text/plain"),
    ("properties", "text/plain"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("xml", "text/xml"),
    ("js", "application/javascript"),
    ("mjs", "text/javascript"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("xhtml", "application/xhtml+xml"),
    ("rss", "application/rss+xml"),
    ("atom", "application/atom+xml"),
    ("xspf", "application/xspf+xml"),
    ("pdf", "application/pdf"),
    ("ps", "application/postscript"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tgz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    ("bz2", "application/x-bzip2"),
    ("xz", "application/x-xz"),
    ("jar", "application/java-archive"),
    ("class", "application/java-vm"),
    ("exe", "application/x-msdownload"),
    ("dll", "application/x-msdownload"),
    ("msi", "application/x-msi"),
    ("deb", "application/vnd.debian.binary-package"),
    ("rpm", "application/x-rpm"),
    ("apk", "application/vnd.android.package-archive"),
    ("iso", "application/x-iso9660-image"),
    ("bin", "application/octet-stream"),
    ("wasm", "application/wasm"),
    ("swf", "application/x-shockwave-flash"),
    ("reg", "application/registry-editor"),
    ("sh", "application/x-sh"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("jfif", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("svgz", "image/svg+xml"),
    ("webp", "image/webp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("avif", "image/avif"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("mid", "audio/midi"),
    ("midi", "audio/midi"),
    ("aac", "audio/aac"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("flv", "video/x-flv"),
    ("wmv", "video/x-ms-wmv"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("eml", "message/rfc822"),
    ("ics", "text/calendar"),
    ("vcf", "text/vcard"),
];

fn strip_dot(ext: &str) -> &str {
    ext.strip_prefix('.').unwrap_or(ext)
}

/// MIME type for a file extension (with or without the leading dot).
pub fn mime_type_for_extension(ext: &str) -> &'static str {
    let ext = strip_dot(ext.trim());
    MIME_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, m)| *m)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Every known extension for `mime_type`, preferred first.
pub fn extensions_for_mime_type(mime_type: &str) -> Vec<&'static str> {
    let mime_type = mime_type.trim();
    MIME_TYPES
        .iter()
        .filter(|(_, m)| m.eq_ignore_ascii_case(mime_type))
        .map(|(e, _)| *e)
        .collect()
}

/// Preferred extension (no dot) for `mime_type`.
///
/// Unknown types whose subtype (after its last `-`) is three or four characters long use
/// that subtype, so `application/x-lzma` gives `lzma`. Otherwise `fallback` is returned.
pub fn first_extension_for_mime_type<'a>(mime_type: &'a str, fallback: Option<&'a str>) -> Option<&'a str> {
    if let Some(ext) = extensions_for_mime_type(mime_type).first() {
        return Some(*ext);
    }
    let mime_type = mime_type.trim();
    if let Some(slash) = mime_type.find('/') {
        if slash > 0 && slash < mime_type.len() - 1 {
            let sub = &mime_type[slash + 1..];
            let sub = match sub.rfind('-') {
                Some(i) => &sub[i + 1..],
                None => sub,
            };
            if (3..=4).contains(&sub.len()) {
                return Some(sub);
            }
        }
    }
    fallback.map(strip_dot)
}
