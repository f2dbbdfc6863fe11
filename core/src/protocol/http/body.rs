/*
 * body.rs
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

//! Response body decoding: chunked transfer framing, then optional gzip.
//!
//! Framing errors are not fatal. A chunk-size line that is not hex, or a chunk that is
//! not followed by a blank two-byte terminator, abandons framing for the rest of the
//! body: the offending bytes and everything after them are kept verbatim.
//! The only end of a chunked body is end of stream.

use std::io::Read;

use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt};

use crate::protocol::http::h1::read_line;

/// Copy everything left on the stream.
pub async fn read_to_end<R: AsyncRead + Unpin>(reader: &mut R, out: &mut BytesMut) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Copy at most `len` bytes; fewer if the stream ends first.
async fn read_up_to<R: AsyncRead + Unpin>(reader: &mut R, len: u64, out: &mut BytesMut) -> std::io::Result<()> {
    let mut data = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut data).await?;
    out.extend_from_slice(&data);
    Ok(())
}

fn parse_chunk_size(line: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(line).ok()?;
    let text = text.strip_suffix('\n').unwrap_or(text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    if text.is_empty() || text.starts_with('+') {
        return None;
    }
    u64::from_str_radix(text, 16).ok()
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

/// Undo chunked framing, falling back to a raw copy on the first framing error.
pub async fn read_chunked<R: AsyncBufRead + Unpin>(reader: &mut R, out: &mut BytesMut) -> std::io::Result<()> {
    let mut line = Vec::with_capacity(16);
    while read_line(reader, &mut line).await? {
        let len = match parse_chunk_size(&line) {
            Some(len) => len,
            None => {
                warn!(
                    "expected hex chunk length, got {:?}; copying rest of body raw",
                    String::from_utf8_lossy(&line)
                );
                out.extend_from_slice(&line);
                return read_to_end(reader, out).await;
            }
        };
        debug!("chunk length {:x} ({})", len, len);
        read_up_to(reader, len, out).await?;

        let mut terminator = Vec::with_capacity(2);
        (&mut *reader).take(2).read_to_end(&mut terminator).await?;
        if terminator.len() < 2 {
            // Stream ended inside the terminator.
            out.extend_from_slice(&terminator);
            return Ok(());
        }
        if !is_blank(&terminator) {
            warn!(
                "unexpected data at end of chunk: {:?}; copying rest of body raw",
                String::from_utf8_lossy(&terminator)
            );
            out.extend_from_slice(&terminator);
            return read_to_end(reader, out).await;
        }
    }
    Ok(())
}

/// Gunzip every member of `data`. On any failure the input is returned unchanged.
pub fn gunzip_or_original(data: Bytes) -> Bytes {
    let mut decoded = Vec::new();
    match MultiGzDecoder::new(&data[..]).read_to_end(&mut decoded) {
        Ok(_) => {
            debug!("gunzipped {} bytes into {}", data.len(), decoded.len());
            Bytes::from(decoded)
        }
        Err(e) => {
            warn!("could not gunzip {} byte body, keeping it as received: {}", data.len(), e);
            data
        }
    }
}

/// Read and decode the body that follows a response head.
pub async fn decode_body<R: AsyncBufRead + Unpin>(reader: &mut R, chunked: bool, gzip: bool) -> std::io::Result<Bytes> {
    let mut out = BytesMut::with_capacity(8192);
    if chunked {
        debug!("Transfer-Encoding is chunked");
        read_chunked(reader, &mut out).await?;
    } else {
        read_to_end(reader, &mut out).await?;
    }
    let body = out.freeze();
    Ok(if gzip { gunzip_or_original(body) } else { body })
}
