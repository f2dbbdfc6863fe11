/*
 * client.rs
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

//! HTTP client: drives one top-level request through its legs.
//!
//! Each leg opens a fresh socket, writes the head and reads the response head. A
//! successful CONNECT bootstrap upgrades that same socket and sends the real request
//! through it. Redirects and the single Basic-auth retry loop back with a rebuilt
//! request; the redirect count is capped by `ClientConfig::max_hops`.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use log::{info, warn};

use crate::config::ClientConfig;
use crate::download::{derive_file_name, save_download, NameHints};
use crate::error::HttpError;
use crate::protocol::http::auth::{
    basic_authorization, parse_challenge, CredentialPrompt, CredentialReply, CredentialRequest, NoPrompt,
};
use crate::protocol::http::connection::HttpConnection;
use crate::protocol::http::h1::{InboundResponse, ResponseMeta};
use crate::protocol::http::request::{write_request_head, OutboundRequest};
use crate::uri::Target;

const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];
const TUNNEL_ESTABLISHED: &str = "200 connection established";

/// Context threaded through every leg of a call: settings plus whatever can prompt for credentials.
#[derive(Clone)]
pub struct Session {
    pub config: ClientConfig,
    pub prompt: Arc<dyn CredentialPrompt>,
}

impl Session {
    pub fn new(config: ClientConfig, prompt: Arc<dyn CredentialPrompt>) -> Self {
        Self { config, prompt }
    }

    /// No UI: authentication challenges are treated as cancelled.
    pub fn headless(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(NoPrompt))
    }
}

/// How the final leg ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Terminal response reached; body handled if saving was requested.
    Completed,
    /// Status line carried a different protocol token than the one sent.
    ProtocolMismatch { expected: String, received: String },
    /// 3xx redirect code with no `Location`.
    RedirectWithoutLocation,
    /// 401 with no `WWW-Authenticate`.
    Unauthorized,
    /// 401 challenging with a scheme other than Basic.
    AuthUnsupported { scheme: String },
    /// Prompt cancelled or returned a blank username.
    AuthCancelled,
    /// Server challenged again after the credentials were sent.
    AuthRejected,
}

/// One response head and the endpoint it came from.
#[derive(Debug, Clone)]
pub struct Leg {
    pub target: Target,
    pub response: InboundResponse,
}

/// Result of a top-level call.
#[derive(Debug)]
pub struct Exchange {
    pub legs: Vec<Leg>,
    pub outcome: Outcome,
    /// Decoded body of the terminal leg, when saving was requested and there was one.
    pub body: Option<Bytes>,
    pub saved_to: Option<PathBuf>,
    pub save_error: Option<HttpError>,
    headers_reported: bool,
}

impl Exchange {
    fn new() -> Self {
        Self {
            legs: Vec::new(),
            outcome: Outcome::Completed,
            body: None,
            saved_to: None,
            save_error: None,
            headers_reported: false,
        }
    }

    /// Last response head read.
    pub fn response(&self) -> Option<&InboundResponse> {
        self.legs.last().map(|leg| &leg.response)
    }

    /// Status and header lines of every leg, in order.
    pub fn transcript(&self) -> String {
        self.legs.iter().map(|leg| leg.response.transcript()).collect()
    }
}

enum Next {
    Retry(OutboundRequest),
    Done,
}

pub struct HttpClient {
    session: Session,
}

impl HttpClient {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the request, following redirects, tunnels and one Basic-auth retry.
    pub async fn execute(&self, request: OutboundRequest) -> Result<Exchange, HttpError> {
        self.execute_observed(request, |_: &str| {}).await
    }

    /// Like `execute`, calling `on_headers` once with the transcript as soon as the final
    /// response head is known, before any body is read or saved.
    pub async fn execute_observed<F>(&self, request: OutboundRequest, mut on_headers: F) -> Result<Exchange, HttpError>
    where
        F: FnMut(&str) + Send,
    {
        let mut exchange = Exchange::new();
        let mut request = request;
        let mut hops = 0usize;
        let mut auth_retried = false;
        loop {
            let next = self
                .run_leg(&request, &mut exchange, &mut hops, &mut auth_retried, &mut on_headers)
                .await?;
            match next {
                Next::Retry(next) => request = next,
                Next::Done => {
                    if !exchange.headers_reported {
                        exchange.headers_reported = true;
                        on_headers(&exchange.transcript());
                    }
                    return Ok(exchange);
                }
            }
        }
    }

    /// Like `execute`, but every failure becomes descriptive text in place of the response.
    pub async fn execute_to_text(&self, request: OutboundRequest) -> String {
        match self.execute(request).await {
            Ok(exchange) => exchange.transcript(),
            Err(e) => e.diagnostic(),
        }
    }

    async fn run_leg(
        &self,
        request: &OutboundRequest,
        exchange: &mut Exchange,
        hops: &mut usize,
        auth_retried: &mut bool,
        on_headers: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Next, HttpError> {
        let config = &self.session.config;
        let host_override = request.headers.value("host").map(str::to_string);
        info!(
            "Connecting to {}://{} (HTTP Request: {} {} {})",
            request.target.scheme().as_str(),
            request.target.authority(),
            request.method,
            request.request_uri,
            request.version
        );
        let mut conn = HttpConnection::open(&request.target, host_override.as_deref()).await?;
        conn.send_head(&write_request_head(request, &config.user_agent)).await?;
        let mut response = conn.read_head().await?;

        let mut effective = request.clone();
        let destination = request.connect_destination();
        if let Some(dest) = destination.as_ref() {
            if response.status_text.to_ascii_lowercase().contains(TUNNEL_ESTABLISHED) {
                info!("Tunnel established through {} to {}", request.target.authority(), dest);
                exchange.legs.push(Leg {
                    target: request.target.clone(),
                    response,
                });
                if dest.is_ssl() {
                    conn = conn.upgrade_to_tls(dest).await?;
                }
                effective = request.tunneled(dest.clone());
                conn.send_head(&write_request_head(&effective, &config.user_agent)).await?;
                response = conn.read_head().await?;
            }
        }
        exchange.legs.push(Leg {
            target: effective.target.clone(),
            response: response.clone(),
        });

        if !response.protocol_matches(&effective.version) {
            warn!(
                "HTTP protocol and/or version mismatch! Expected \"{}\", received: \"{}\"",
                effective.version, response.status.protocol
            );
            exchange.outcome = Outcome::ProtocolMismatch {
                expected: effective.version.clone(),
                received: response.status.protocol.clone(),
            };
            conn.close().await;
            return Ok(Next::Done);
        }

        let meta = ResponseMeta::scan(&response);
        let code = response.status.code_u16();

        if code.is_some_and(|c| REDIRECT_CODES.contains(&c)) {
            conn.close().await;
            let Some(location) = meta.location else {
                exchange.outcome = Outcome::RedirectWithoutLocation;
                return Ok(Next::Done);
            };
            *hops += 1;
            if *hops > config.max_hops {
                return Err(HttpError::TooManyHops {
                    limit: config.max_hops,
                });
            }
            let next = redirect_request(request, &effective, destination.as_ref(), &location);
            info!("Redirect {} -> {}", response.status.code, location);
            return Ok(Next::Retry(next));
        }

        if code == Some(401) {
            conn.close().await;
            let Some(header) = meta.www_authenticate else {
                exchange.outcome = Outcome::Unauthorized;
                return Ok(Next::Done);
            };
            let challenge = parse_challenge(&header);
            if !challenge.is_basic() {
                exchange.outcome = Outcome::AuthUnsupported {
                    scheme: challenge.scheme,
                };
                return Ok(Next::Done);
            }
            if *auth_retried {
                warn!("{} rejected the supplied credentials", effective.target.authority());
                exchange.outcome = Outcome::AuthRejected;
                return Ok(Next::Done);
            }
            let prompt = CredentialRequest::new(
                effective.target.clone(),
                &response.status.code,
                &response.status.message,
                challenge.realm,
            );
            let reply = self
                .session
                .prompt
                .request_credentials(prompt)
                .await
                .unwrap_or(CredentialReply::Cancelled);
            return match reply {
                CredentialReply::Provided(credentials) if !credentials.username.trim().is_empty() => {
                    *auth_retried = true;
                    info!("Retrying {} with Basic credentials", effective.target);
                    let headers = request
                        .headers
                        .replacing("Authorization", &basic_authorization(&credentials));
                    Ok(Next::Retry(request.with_header_block(headers)))
                }
                _ => {
                    exchange.outcome = Outcome::AuthCancelled;
                    Ok(Next::Done)
                }
            };
        }

        exchange.headers_reported = true;
        on_headers(&exchange.transcript());

        if effective.save_body && response.header_ended {
            let file_name = derive_file_name(&NameHints {
                request_uri: &effective.request_uri,
                host: effective.target.host(),
                content_type: meta.content_type.as_deref(),
                content_disposition: meta.content_disposition.as_deref(),
            });
            match conn.read_body(meta.chunked, meta.gzip).await {
                Ok(body) => {
                    if !body.is_empty() {
                        match save_download(&config.downloads_dir, &file_name, &body).await {
                            Ok(path) => exchange.saved_to = Some(path),
                            Err(e) => {
                                warn!("{}", e.diagnostic());
                                exchange.save_error = Some(e);
                            }
                        }
                    }
                    exchange.body = Some(body);
                }
                Err(source) => {
                    let e = HttpError::Save {
                        file: config.downloads_dir.join(&file_name),
                        source,
                    };
                    warn!("{}", e.diagnostic());
                    exchange.save_error = Some(e);
                }
            }
        }
        conn.close().await;
        Ok(Next::Done)
    }
}

/// Request for the next hop after a redirect to `location`.
///
/// Absolute locations connect straight to the new endpoint. Relative ones keep the endpoint;
/// through a tunnel that means bootstrapping a new CONNECT to the same destination.
fn redirect_request(
    request: &OutboundRequest,
    effective: &OutboundRequest,
    destination: Option<&Target>,
    location: &str,
) -> OutboundRequest {
    let lower = location.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let target = Target::parse(location);
        let path = target.request_path().to_string();
        return effective.retargeted(target, path);
    }
    match destination {
        Some(dest) if effective.target == *dest => {
            request.retargeted(request.target.clone(), dest.with_path(location).to_string())
        }
        _ => effective.retargeted(effective.target.with_path(location), location),
    }
}
