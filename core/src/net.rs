/*
 * net.rs
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

//! Sockets for the request engine: plain TCP or TLS, where TLS may be layered over
//! an already-open stream (CONNECT tunnel upgrade).
//!
//! Certificates are NOT validated. This client is a server-testing tool and talks to
//! development servers with self-signed certificates; never reuse this config for
//! anything that needs authenticity.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use log::{debug, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::HttpError;
use crate::uri::Target;

/// Accepts any certificate chain and any handshake signature.
#[derive(Debug)]
struct TrustAnyCertificate;

impl ServerCertVerifier for TrustAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

/// TLS client config with the trust-all verifier and no client auth. HTTP/1.1 only.
pub fn trust_all_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustAnyCertificate))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

static CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

fn connector() -> &'static TlsConnector {
    CONNECTOR.get_or_init(|| TlsConnector::from(trust_all_client_config()))
}

/// Plain TCP, or TLS over another `HttpStream` (so a tunnel through a TLS proxy nests).
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<HttpStream>>),
}

impl HttpStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, HttpStream::Tls(_))
    }
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Server name for the handshake. A caller-supplied Host header wins but must be a DNS name.
pub fn server_name_for(
    target: &Target,
    host_override: Option<&str>,
) -> Result<ServerName<'static>, HttpError> {
    let port = target.port().unwrap_or(0);
    if let Some(name) = host_override {
        return match ServerName::try_from(name) {
            Ok(sn @ ServerName::DnsName(_)) => Ok(sn.to_owned()),
            _ => {
                warn!("rejecting SNI override {:?} for {}", name, target);
                Err(HttpError::Sni {
                    host: target.host().to_string(),
                    port,
                    server_name: name.to_string(),
                })
            }
        };
    }
    ServerName::try_from(target.host())
        .map(|sn| sn.to_owned())
        .map_err(|_| HttpError::Sni {
            host: target.host().to_string(),
            port,
            server_name: target.host().to_string(),
        })
}

/// Open a socket to `target` (TLS when `target.is_ssl()`), Nagle disabled.
pub async fn connect(target: &Target, host_override: Option<&str>) -> Result<HttpStream, HttpError> {
    let addr = target
        .socket_addr_string()
        .ok_or_else(|| HttpError::resolve(target.host(), target.port()))?;
    let addrs: Vec<_> = match lookup_host(&addr).await {
        Ok(it) => it.collect(),
        Err(e) => {
            debug!("lookup of {} failed: {}", addr, e);
            Vec::new()
        }
    };
    if addrs.is_empty() {
        return Err(HttpError::resolve(target.host(), target.port()));
    }
    // Resolution failures are reported ahead of a bad SNI override.
    let server_name = if target.is_ssl() {
        Some(server_name_for(target, host_override)?)
    } else {
        None
    };
    let tcp = TcpStream::connect(&addrs[..]).await?;
    tcp.set_nodelay(true)?;
    let stream = HttpStream::Plain(tcp);
    match server_name {
        Some(name) => handshake(stream, name, target).await,
        None => Ok(stream),
    }
}

/// Client-mode TLS handshake over an already-open stream; no new TCP connection.
pub async fn upgrade_to_tls(stream: HttpStream, target: &Target) -> Result<HttpStream, HttpError> {
    let name = server_name_for(target, None)?;
    handshake(stream, name, target).await
}

async fn handshake(
    stream: HttpStream,
    name: ServerName<'static>,
    target: &Target,
) -> Result<HttpStream, HttpError> {
    let tls = connector()
        .connect(name, stream)
        .await
        .map_err(|source| HttpError::Tls {
            host: target.host().to_string(),
            port: target.port().unwrap_or(0),
            source,
        })?;
    Ok(HttpStream::Tls(Box::new(tls)))
}
