/*
 * parser.rs
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

//! HTTP/1.x response head reader: status line and header lines up to the blank line.
//!
//! Reads through a buffered reader one line at a time and never consumes past the
//! blank separator, so whatever follows stays in the reader for the body stage.
//! Bytes are mapped to chars one-to-one (ISO-8859-1), matching what the wire carries.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// `HTTP/1.1 200 OK` split into its three parts. Missing parts are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    pub protocol: String,
    pub code: String,
    pub message: String,
}

impl StatusLine {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split(' ');
        let protocol = tokens.next().unwrap_or("").to_string();
        let code = tokens.next().unwrap_or("").to_string();
        let message = tokens.collect::<Vec<_>>().join(" ");
        Self {
            protocol,
            code,
            message: message.trim_end().to_string(),
        }
    }

    pub fn code_u16(&self) -> Option<u16> {
        self.code.parse().ok()
    }
}

/// Status line and headers of one leg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundResponse {
    /// First line as received, trimmed. Empty if the peer sent nothing.
    pub status_text: String,
    pub status: StatusLine,
    /// Header lines as received (line terminator removed), in order.
    pub header_lines: Vec<String>,
    /// Parsed `(name, value)` pairs for lines of the form `name: value`.
    pub headers: Vec<(String, String)>,
    /// True when the blank separator line was read (a body may follow).
    pub header_ended: bool,
}

impl InboundResponse {
    /// Case-insensitive lookup; the last entry with that name wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn protocol_matches(&self, sent: &str) -> bool {
        self.status.protocol.eq_ignore_ascii_case(sent)
    }

    /// Status line and header lines, one per line, as shown to the user.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        if !self.status_text.is_empty() {
            out.push_str(&self.status_text);
            out.push('\n');
        }
        for line in &self.header_lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn split_header(line: &str) -> Option<(String, String)> {
    let colon = line.find(':')?;
    let value = &line[colon + 1..];
    if value.is_empty() {
        return None;
    }
    let name = line[..colon].trim();
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name.to_string(), value.to_string()))
}

/// Read one line including its `\n` into `buf`. Returns false at end of stream.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    Ok(n > 0)
}

/// Read status line and headers, stopping after the first blank line or at end of stream.
pub async fn read_response_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<InboundResponse> {
    let mut response = InboundResponse::default();
    let mut buf = Vec::with_capacity(256);
    let mut have_status = false;
    while read_line(reader, &mut buf).await? {
        // UTF-8, so a Location can go back out on the request line byte for byte.
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            response.header_ended = true;
            break;
        }
        if !have_status {
            have_status = true;
            response.status_text = line.trim().to_string();
            response.status = StatusLine::parse(&response.status_text);
            continue;
        }
        if let Some(pair) = split_header(line) {
            response.headers.push(pair);
        }
        response.header_lines.push(line.to_string());
    }
    Ok(response)
}

/// Header facts the engine acts on. Later headers overwrite earlier ones,
/// but the first `Location` ends the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub location: Option<String>,
    pub chunked: bool,
    pub gzip: bool,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub www_authenticate: Option<String>,
}

impl ResponseMeta {
    pub fn scan(response: &InboundResponse) -> Self {
        let mut meta = ResponseMeta::default();
        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("Location") {
                meta.location = Some(value.trim().to_string());
                break;
            }
            if name.eq_ignore_ascii_case("Transfer-Encoding") {
                meta.chunked = value.trim().eq_ignore_ascii_case("chunked");
            }
            if name.eq_ignore_ascii_case("Content-Encoding") {
                meta.gzip = value.trim().eq_ignore_ascii_case("gzip");
            }
            if name.eq_ignore_ascii_case("Content-Type") {
                meta.content_type = Some(value.trim().to_string());
            }
            if name.eq_ignore_ascii_case("Content-Disposition") {
                meta.content_disposition = Some(value.trim().to_string());
            }
            if name.eq_ignore_ascii_case("WWW-Authenticate") {
                meta.www_authenticate = Some(value.trim().to_string());
            }
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn head_stops_at_blank_line() {
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nBODY";
        let mut reader = BufReader::new(wire);
        let head = read_response_head(&mut reader).await.unwrap();
        assert_eq!(head.status.protocol, "HTTP/1.1");
        assert_eq!(head.status.code, "200");
        assert_eq!(head.status.message, "OK");
        assert_eq!(head.headers, vec![("Content-Type".to_string(), "text/plain".to_string())]);
        assert!(head.header_ended);
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "BODY");
    }

    #[tokio::test]
    async fn utf8_header_values_survive() {
        let wire: &[u8] = b"HTTP/1.1 302 Found\r\nLocation: /caf\xc3\xa9\r\n\r\n";
        let mut reader = BufReader::new(wire);
        let head = read_response_head(&mut reader).await.unwrap();
        assert_eq!(head.header("Location"), Some("/caf\u{e9}"));
        assert_eq!(head.header("Location").unwrap().as_bytes(), b"/caf\xc3\xa9");
    }

    #[tokio::test]
    async fn eof_before_blank_line() {
        let wire: &[u8] = b"HTTP/1.0 404 Not   Found\nServer: x";
        let mut reader = BufReader::new(wire);
        let head = read_response_head(&mut reader).await.unwrap();
        assert_eq!(head.status.code_u16(), Some(404));
        assert_eq!(head.status.message, "Not   Found");
        assert_eq!(head.header("server"), Some("x"));
        assert!(!head.header_ended);
        assert_eq!(head.transcript(), "HTTP/1.0 404 Not   Found\nServer: x\n");
    }

    #[tokio::test]
    async fn empty_stream() {
        let mut reader = BufReader::new(&b""[..]);
        let head = read_response_head(&mut reader).await.unwrap();
        assert_eq!(head.status_text, "");
        assert!(!head.header_ended);
        assert!(!head.protocol_matches("HTTP/1.1"));
    }

    #[test]
    fn protocol_compare_ignores_case() {
        let head = InboundResponse {
            status: StatusLine::parse("http/1.1 200 OK"),
            ..Default::default()
        };
        assert!(head.protocol_matches("HTTP/1.1"));
        assert!(!head.protocol_matches("HTTP/1.0"));
    }

    #[test]
    fn last_header_wins() {
        let head = InboundResponse {
            headers: vec![
                ("Set-Cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            ..Default::default()
        };
        assert_eq!(head.header("SET-COOKIE"), Some("b=2"));
    }

    #[test]
    fn location_ends_scan() {
        let head = InboundResponse {
            headers: vec![
                ("Content-Encoding".into(), "gzip".into()),
                ("Location".into(), " /first ".into()),
                ("Location".into(), "/second".into()),
                ("Transfer-Encoding".into(), "chunked".into()),
            ],
            ..Default::default()
        };
        let meta = ResponseMeta::scan(&head);
        assert_eq!(meta.location.as_deref(), Some("/first"));
        assert!(meta.gzip);
        assert!(!meta.chunked);
    }

    #[test]
    fn header_value_keeps_colons() {
        assert_eq!(
            split_header("Location: http://h:8080/x"),
            Some(("Location".to_string(), "http://h:8080/x".to_string()))
        );
        assert_eq!(split_header("X-Empty:"), None);
        assert_eq!(split_header("garbage"), None);
    }
}
