/*
 * filename.rs
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

//! Download file naming: pick a name from the request path, `Content-Disposition` and
//! `Content-Type`, then make it safe to use as a single path component.

use crate::mime_types::first_extension_for_mime_type;

const ESCAPE: char = '%';

fn escape_into(out: &mut String, ch: char) {
    out.push(ESCAPE);
    if (ch as u32) < 0x10 {
        out.push('0');
    }
    out.push_str(&format!("{:x}", ch as u32));
}

/// Escape characters that are unsafe in a single file name as `%xx` (lowercase hex).
/// Control and non-ASCII characters, `/ \ ? : " * | < >`, `%` itself and a leading `.` are escaped.
pub fn make_string_filesystem_safe(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, ch) in s.chars().enumerate() {
        let unsafe_char = (ch as u32) < 0x20
            || (ch as u32) >= 0x7F
            || matches!(ch, '/' | '\\' | '?' | ':' | '"' | '*' | '|' | '<' | '>')
            || (ch == '.' && i == 0)
            || ch == ESCAPE;
        if unsafe_char {
            escape_into(&mut out, ch);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Like `make_string_filesystem_safe` but keeps path separators, `:` and leading dots.
pub fn make_path_filesystem_safe(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let unsafe_char = (ch as u32) < 0x20
            || (ch as u32) >= 0x7F
            || matches!(ch, '?' | '"' | '*' | '|' | '<' | '>')
            || ch == ESCAPE;
        if unsafe_char {
            escape_into(&mut out, ch);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Last path component (after the last `/` or `\`).
pub fn file_name_of(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Extension (no dot) of the last path component, or "".
pub fn extension_of(path: &str) -> &str {
    let name = file_name_of(path);
    match name.rfind('.') {
        Some(i) => &name[i + 1..],
        None => "",
    }
}

/// Last path component without its extension.
pub fn base_name_of(path: &str) -> &str {
    let name = file_name_of(path);
    match name.rfind('.') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// `filename` parameter of an `attachment` disposition, if usable.
pub fn attachment_filename(content_disposition: &str) -> Option<String> {
    let value = content_disposition.trim();
    let mut parts = value.split(';');
    let disposition_type = parts.next()?.trim();
    if !disposition_type.eq_ignore_ascii_case("attachment") || !value.contains(';') {
        return None;
    }
    for part in parts {
        let part = part.trim();
        let Some(eq) = part.find('=') else {
            continue;
        };
        if !part[..eq].trim().eq_ignore_ascii_case("filename") {
            continue;
        }
        let mut name = part[eq + 1..].trim();
        if name.len() > 2 && name.starts_with('"') && name.ends_with('"') {
            name = &name[1..name.len() - 1];
        }
        if name.trim().is_empty() || name.contains('"') {
            return None;
        }
        return Some(name.to_string());
    }
    None
}

/// Response facts that influence the saved file's name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameHints<'a> {
    /// Request URI of the leg that produced the body.
    pub request_uri: &'a str,
    /// Host the body came from; last-resort name.
    pub host: &'a str,
    pub content_type: Option<&'a str>,
    pub content_disposition: Option<&'a str>,
}

/// Derive the (not yet filesystem-safe) name a downloaded body is saved under.
pub fn derive_file_name(hints: &NameHints<'_>) -> String {
    let uri = hints.request_uri;
    let path_only = uri.split('?').next().unwrap_or("");
    let path_only = path_only.split('#').next().unwrap_or("");
    let mut file_name = file_name_of(path_only).to_string();

    if let Some(name) = hints.content_disposition.and_then(attachment_filename) {
        file_name = name;
    }

    let mut ext = extension_of(&file_name).to_string();
    if let Some(content_type) = hints.content_type {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        if let Some(mime_ext) = first_extension_for_mime_type(mime, None) {
            file_name = if ext.trim().is_empty() {
                format!("{}.{}", file_name, mime_ext)
            } else {
                format!("{}.{}", base_name_of(&file_name), mime_ext)
            };
            ext = mime_ext.to_string();
        }
    }
    if ext.trim().is_empty() {
        ext = "html".to_string();
        if !file_name.ends_with('.') {
            file_name.push('.');
        }
        file_name.push_str(&ext);
    }

    if base_name_of(&file_name).trim().is_empty() {
        let mut name = uri.split('?').next().unwrap_or("");
        while let Some(stripped) = name.strip_suffix('/') {
            name = stripped;
        }
        let name = match name.rfind('/') {
            Some(i) => &name[i..],
            None => name,
        };
        if !name.trim().is_empty() {
            file_name = format!("{}.{}", name.trim(), ext);
        }
    }
    if base_name_of(&file_name).trim().is_empty() {
        let host = hints.host.replace([':', '%'], "-");
        file_name = if file_name.trim().is_empty() {
            format!("{}.txt", host)
        } else {
            format!("{}.{}", host, extension_of(&file_name))
        };
    }

    match file_name.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => file_name,
    }
}
