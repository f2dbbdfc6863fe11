/*
 * lib.rs
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

//! HTTP Server Tester core: a hand-written HTTP/1.1 client for poking at servers.
//!
//! Requests are written and responses parsed by hand over TCP or trust-all TLS, with
//! CONNECT tunnelling, redirects, Basic authentication and chunked/gzip body decoding.
//! Downloaded bodies are saved under the configured downloads directory.

pub mod config;
pub mod download;
pub mod error;
pub mod mime_types;
pub mod net;
pub mod protocol;
pub mod uri;

pub use config::ClientConfig;
pub use error::HttpError;
pub use protocol::http::{Exchange, HttpClient, Method, OutboundRequest, Outcome, Session};
pub use uri::Target;
