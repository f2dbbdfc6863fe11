/*
 * connection.rs
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

//! HTTP connection: one TCP or TLS stream behind a buffered reader. Carries one leg, or
//! two when a CONNECT tunnel is upgraded in place.

use std::io;

use bytes::Bytes;
use log::{debug, warn};
use tokio::io::{AsyncWriteExt, BufReader};

use crate::error::HttpError;
use crate::net::{self, HttpStream};
use crate::protocol::http::body::decode_body;
use crate::protocol::http::h1::{read_response_head, InboundResponse};
use crate::uri::Target;

pub struct HttpConnection {
    reader: BufReader<HttpStream>,
    target: Target,
}

impl HttpConnection {
    /// Connect to `target`; `host_override` (the caller's Host header) becomes the TLS server name.
    pub async fn open(target: &Target, host_override: Option<&str>) -> Result<Self, HttpError> {
        let stream = net::connect(target, host_override).await?;
        Ok(Self::from_stream(stream, target.clone()))
    }

    pub fn from_stream(stream: HttpStream, target: Target) -> Self {
        Self {
            reader: BufReader::new(stream),
            target,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_tls(&self) -> bool {
        self.reader.get_ref().is_tls()
    }

    /// Write a serialized request head and flush.
    pub async fn send_head(&mut self, head: &str) -> io::Result<()> {
        debug!("-> {}", head.lines().next().unwrap_or(""));
        let stream = self.reader.get_mut();
        stream.write_all(head.as_bytes()).await?;
        stream.flush().await
    }

    pub async fn read_head(&mut self) -> io::Result<InboundResponse> {
        let head = read_response_head(&mut self.reader).await?;
        debug!("<- {}", head.status_text);
        Ok(head)
    }

    /// Wrap the open socket in TLS for `destination` (tunnel established). No new TCP connection.
    pub async fn upgrade_to_tls(self, destination: &Target) -> Result<Self, HttpError> {
        if !self.reader.buffer().is_empty() {
            warn!(
                "discarding {} bytes the proxy sent after the tunnel was established",
                self.reader.buffer().len()
            );
        }
        let stream = self.reader.into_inner();
        let stream = net::upgrade_to_tls(stream, destination).await?;
        Ok(Self::from_stream(stream, destination.clone()))
    }

    /// Read and decode everything after the head.
    pub async fn read_body(&mut self, chunked: bool, gzip: bool) -> io::Result<Bytes> {
        decode_body(&mut self.reader, chunked, gzip).await
    }

    pub async fn close(mut self) {
        if let Err(e) = self.reader.get_mut().shutdown().await {
            debug!("shutdown of {} failed: {}", self.target, e);
        }
    }
}
