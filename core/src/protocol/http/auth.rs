/*
 * auth.rs
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

//! HTTP Basic authentication: challenge parsing, the credential prompt seam and the
//! `Authorization` header value.
//!
//! The prompt is answered through a one-shot channel. The UI fulfils it exactly once
//! with `CredentialReply`; dropping the sender counts as cancellation.

use base64::{engine::general_purpose, Engine as _};
use tokio::sync::oneshot;

use crate::uri::Target;

/// Username and password typed into the prompt. Lives for one retry only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialReply {
    Provided(Credentials),
    Cancelled,
}

/// What the prompt shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    pub target: Target,
    pub title: String,
    pub message: String,
    pub realm: Option<String>,
}

impl CredentialRequest {
    pub fn new(target: Target, code: &str, reason: &str, realm: Option<String>) -> Self {
        let title = format!("{} {}", code, reason).trim().to_string() + " (Login Required)";
        let mut message =
            "The webpage you are attempting to access requires a username and password.".to_string();
        if let Some(r) = realm.as_deref().filter(|r| !r.trim().is_empty()) {
            message.push_str("\r\nThe server says:\r\n\r\n");
            message.push_str(r);
        }
        Self {
            target,
            title,
            message,
            realm,
        }
    }
}

/// Something that can ask the user for a username and password.
///
/// Called from the request task; implementations marshal to their UI thread and
/// answer through the returned receiver.
pub trait CredentialPrompt: Send + Sync {
    fn request_credentials(&self, request: CredentialRequest) -> oneshot::Receiver<CredentialReply>;
}

/// Prompt for headless use: every challenge is cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn request_credentials(&self, _request: CredentialRequest) -> oneshot::Receiver<CredentialReply> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(CredentialReply::Cancelled);
        rx
    }
}

/// `WWW-Authenticate` value: scheme token plus the realm parameter, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: String,
    pub realm: Option<String>,
}

impl AuthChallenge {
    pub fn is_basic(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("Basic")
    }
}

/// Parse `Scheme param=value, param="quoted value"`.
pub fn parse_challenge(value: &str) -> AuthChallenge {
    let value = value.trim();
    let (scheme, rest) = match value.find(char::is_whitespace) {
        Some(i) => (&value[..i], value[i..].trim_start()),
        None => (value, ""),
    };
    let mut realm = None;
    for (name, param) in parse_params(rest) {
        if name.eq_ignore_ascii_case("realm") {
            realm = Some(param);
            break;
        }
    }
    AuthChallenge {
        scheme: scheme.to_string(),
        realm,
    }
}

fn parse_params(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            break;
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            // Bare token (e.g. token68); no value.
            continue;
        }
        chars.next();
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' || c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        out.push((name, value));
    }
    out
}

/// `Basic base64(username:password)`, the pair encoded as ISO-8859-1 (unmappable chars become `?`).
pub fn basic_authorization(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.username, credentials.password);
    let bytes: Vec<u8> = pair
        .chars()
        .map(|c| if (c as u32) <= 0xFF { c as u32 as u8 } else { b'?' })
        .collect();
    format!("Basic {}", general_purpose::STANDARD.encode(bytes))
}
