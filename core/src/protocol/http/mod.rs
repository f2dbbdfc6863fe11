/*
 * mod.rs
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

//! HTTP/1.1 client written against raw sockets.
//!
//! - `request`: outbound request model and the request-head writer.
//! - `h1`: status line and header reader over a buffered stream; stops exactly at the blank line.
//! - `body`: chunked and gzip decoding of whatever follows the head.
//! - `auth`: Basic challenge parsing and the credential prompt seam.
//! - `connection`: one socket (plain, TLS, or TLS inside a CONNECT tunnel).
//! - `client`: the leg loop (tunnel, redirect, auth retry, save).

pub mod auth;
pub mod body;
pub mod client;
pub mod connection;
pub mod h1;
pub mod request;

pub use auth::{CredentialPrompt, CredentialReply, CredentialRequest, Credentials, NoPrompt};
pub use client::{Exchange, HttpClient, Leg, Outcome, Session};
pub use connection::HttpConnection;
pub use h1::{InboundResponse, StatusLine};
pub use request::{HeaderBlock, Method, OutboundRequest};
