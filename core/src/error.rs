/*
 * error.rs
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

//! Request engine errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failures that end a request cycle before a usable response exists.
///
/// Every variant renders to the descriptive text the UI shows in place of the
/// server's response (see `HttpClient::execute_to_text`).
#[derive(Debug)]
pub enum HttpError {
    /// Target host/port did not resolve (or the port was unparsable).
    Resolve { host: String, port: Option<u16> },
    /// The caller's Host header is not usable as a TLS server name.
    Sni {
        host: String,
        port: u16,
        server_name: String,
    },
    /// TLS handshake failed.
    Tls {
        host: String,
        port: u16,
        source: io::Error,
    },
    /// Any other I/O failure during a leg.
    Io(io::Error),
    /// Redirect / tunnel chain exceeded the configured hop limit.
    TooManyHops { limit: usize },
    /// Writing a downloaded body failed.
    Save { file: PathBuf, source: io::Error },
}

impl HttpError {
    pub fn resolve(host: impl Into<String>, port: Option<u16>) -> Self {
        Self::Resolve {
            host: host.into(),
            port,
        }
    }

    /// Message plus the chain of underlying causes, one per line.
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\r\n\tcaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

fn port_str(port: Option<u16>) -> String {
    match port {
        Some(p) => p.to_string(),
        None => "-1".to_string(),
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Resolve { host, port } => write!(
                f,
                "Failed to connect to server \"{}:{}\": Address is unresolved",
                host,
                port_str(*port)
            ),
            HttpError::Sni {
                host,
                port,
                server_name,
            } => write!(
                f,
                "Failed to connect to server \"{}:{}\": Invalid SNI Hostname: \"{}\"",
                host, port, server_name
            ),
            HttpError::Tls { host, port, source } => write!(
                f,
                "TLS handshake with https://{}:{} failed: {}",
                host, port, source
            ),
            HttpError::Io(e) => write!(f, "I/O error: {}", e),
            HttpError::TooManyHops { limit } => {
                write!(f, "Gave up after {} redirect/tunnel hops", limit)
            }
            HttpError::Save { file, source } => write!(
                f,
                "Failed to download file \"{}\": {}",
                file.display(),
                source
            ),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Tls { source, .. } => Some(source),
            HttpError::Io(e) => std::error::Error::source(e),
            HttpError::Save { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        HttpError::Io(err)
    }
}
