/*
 * uri.rs
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

//! Request targets: scheme, host, port and request path resolved from a URI string.
//! Accepts URIs without a scheme (`example.com:8080/x`), IPv6 literals with or without
//! brackets, and infers `https` when a scheme-less URI names port 443.

use std::fmt;
use std::net::{IpAddr, ToSocketAddrs};

use tokio::runtime::{Handle, RuntimeFlavor};

/// URI scheme. Only the two HTTP schemes are meaningful to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    fn from_prefix(prefix: &str) -> Self {
        if prefix.eq_ignore_ascii_case("https://") {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }
}

/// Resolved scheme/host/port/path tuple. Immutable; a new one is built for every hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    /// `None` when the port text was not a valid 16-bit integer.
    port: Option<u16>,
    request_path: String,
}

impl Target {
    /// Target for an explicit endpoint (host field, port spinner and https checkbox of the form).
    pub fn new(host: impl Into<String>, port: u16, https: bool, request_path: impl Into<String>) -> Self {
        let host = host.into();
        let host = strip_brackets(host.trim()).to_string();
        let request_path = request_path.into();
        Self {
            scheme: if https { Scheme::Https } else { Scheme::Http },
            host,
            port: Some(port),
            request_path: if request_path.trim().is_empty() {
                "/".to_string()
            } else {
                request_path
            },
        }
    }

    /// Resolve a URI string. Never fails: unparsable ports become `None`.
    pub fn parse(uri: &str) -> Self {
        let explicit_scheme = uri.find("://");
        let (prefix, rest) = match explicit_scheme {
            Some(i) => (&uri[..i + 3], &uri[i + 3..]),
            None => ("http://", uri),
        };
        let mut scheme = Scheme::from_prefix(prefix);
        let (host_part, request_path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        let default_port = scheme.default_port().to_string();
        let (host, port_text) = match host_part.matches(':').count() {
            0 => (host_part, default_port.as_str()),
            1 => {
                let colon = host_part.rfind(':').unwrap_or(host_part.len());
                (&host_part[..colon], &host_part[colon + 1..])
            }
            _ => {
                // IPv6 literal, possibly followed by :port.
                let colon = host_part.rfind(':').unwrap_or(host_part.len());
                let candidate_host = &host_part[..colon];
                let candidate_port = &host_part[colon + 1..];
                if candidate_port.parse::<i32>().is_ok() && host_resolves(candidate_host) {
                    (candidate_host, candidate_port)
                } else {
                    (host_part, default_port.as_str())
                }
            }
        };

        let port = port_text.parse::<u16>().ok();
        if port == Some(443) && explicit_scheme.is_none() {
            scheme = Scheme::Https;
        }
        Self {
            scheme,
            host: strip_brackets(host).to_string(),
            port,
            request_path: request_path.to_string(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// True for `https` or one of the conventional TLS ports.
    pub fn is_ssl(&self) -> bool {
        self.scheme == Scheme::Https || matches!(self.port, Some(443) | Some(8443) | Some(8843))
    }

    /// Same endpoint, different request path (relative redirect).
    pub fn with_path(&self, request_path: impl Into<String>) -> Self {
        Self {
            request_path: request_path.into(),
            ..self.clone()
        }
    }

    /// `host[:port]`, omitting the port when it is the scheme default; IPv6 hosts are bracketed.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(p) if p == self.scheme.default_port() => host,
            Some(p) => format!("{}:{}", host, p),
            None => host,
        }
    }

    /// `host:port` for socket address lookup.
    pub fn socket_addr_string(&self) -> Option<String> {
        let port = self.port?;
        if self.host.contains(':') {
            Some(format!("[{}]:{}", self.host, port))
        } else {
            Some(format!("{}:{}", self.host, port))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority(), self.request_path)
    }
}

fn strip_brackets(host: &str) -> &str {
    if host.len() >= 2 && host.starts_with('[') && host.ends_with(']') {
        &host[1..host.len() - 1]
    } else {
        host
    }
}

/// Name/address lookup used to decide whether an IPv6 `addr:port` split is genuine.
///
/// The lookup is blocking. On a multi-thread tokio runtime it runs under `block_in_place`
/// so other tasks move off this worker; on a current-thread runtime it blocks that thread.
fn host_resolves(host: &str) -> bool {
    let host = strip_brackets(host);
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    let lookup = || {
        (host, 0u16)
            .to_socket_addrs()
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false)
    };
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(lookup)
        }
        _ => lookup(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults() {
        let t = Target::parse("example.com");
        assert_eq!(t.scheme(), Scheme::Http);
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), Some(80));
        assert_eq!(t.request_path(), "/");
        assert!(!t.is_ssl());
    }

    #[test]
    fn explicit_scheme_port_and_path() {
        let t = Target::parse("https://example.com:8443/a/b");
        assert_eq!(t.scheme(), Scheme::Https);
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), Some(8443));
        assert_eq!(t.request_path(), "/a/b");
        assert!(t.is_ssl());
    }

    #[test]
    fn port_443_without_scheme_forces_https() {
        let t = Target::parse("example.com:443");
        assert_eq!(t.scheme(), Scheme::Https);
        assert_eq!(t.port(), Some(443));
        // An explicit http scheme is kept even on 443, but TLS is still used.
        let t = Target::parse("http://example.com:443/");
        assert_eq!(t.scheme(), Scheme::Http);
        assert!(t.is_ssl());
    }

    #[test]
    fn ipv6_with_port() {
        let t = Target::parse("[::1]:8080/x");
        assert_eq!(t.host(), "::1");
        assert_eq!(t.port(), Some(8080));
        assert_eq!(t.request_path(), "/x");
        assert_eq!(t.authority(), "[::1]:8080");
    }

    #[test]
    fn ipv6_without_port_uses_default() {
        let t = Target::parse("https://[fe80::abcd]/");
        assert_eq!(t.host(), "fe80::abcd");
        assert_eq!(t.port(), Some(443));
    }

    #[test]
    fn unparsable_port_is_unknown() {
        let t = Target::parse("example.com:http/x");
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), None);
        assert_eq!(t.socket_addr_string(), None);
    }

    #[test]
    fn authority_omits_default_port() {
        assert_eq!(Target::parse("http://h:80/").authority(), "h");
        assert_eq!(Target::parse("http://h:8080/").authority(), "h:8080");
        assert_eq!(Target::parse("https://h/").authority(), "h");
    }

    #[test]
    fn with_path_keeps_endpoint() {
        let t = Target::parse("http://host/old").with_path("/new");
        assert_eq!(t.to_string(), "http://host/new");
    }

    #[test]
    fn endpoint_constructor_defaults_blank_path() {
        let t = Target::new("127.0.0.1", 8080, false, "  ");
        assert_eq!(t.request_path(), "/");
        assert_eq!(t.socket_addr_string().as_deref(), Some("127.0.0.1:8080"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolvable_ipv6_split_inside_runtime() {
        let t = Target::parse("not-a-host.invalid::80/x");
        assert_eq!(t.host(), "not-a-host.invalid::80");
        assert_eq!(t.port(), Some(80));
        assert_eq!(t.request_path(), "/x");
    }

    #[tokio::test]
    async fn ipv6_literal_on_current_thread_runtime() {
        let t = Target::parse("[::1]:8080/x");
        assert_eq!(t.host(), "::1");
        assert_eq!(t.port(), Some(8080));
    }
}
