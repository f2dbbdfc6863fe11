/*
 * request.rs
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

//! Outbound requests and the Request Writer.
//!
//! The caller's headers are a raw newline-delimited block typed into the UI. It is sent
//! verbatim; the writer only synthesizes Host, User-Agent and Accept-Encoding when the
//! block lacks them, and always asserts `Connection: close`.

use std::fmt;

use crate::uri::Target;

/// HTTP request method. Anything typed into the method field is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            "CONNECT" => Method::Connect,
            _ => Method::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw header block as typed by the user. Keys compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock(String);

impl HeaderBlock {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lines with any trailing CR removed.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Whether some line starts with `name:`.
    pub fn contains(&self, name: &str) -> bool {
        self.lines().any(|l| line_has_name(l, name))
    }

    /// Value of the last line starting with `name:`, trimmed.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.lines()
            .filter(|l| line_has_name(l, name))
            .last()
            .map(|l| l[name.len() + 1..].trim())
    }

    /// Block without lines whose name starts with `prefix` (e.g. `proxy-`).
    pub fn without_prefix(&self, prefix: &str) -> Self {
        let kept: Vec<&str> = self
            .lines()
            .filter(|l| !starts_with_ignore_case(l, prefix))
            .collect();
        Self(kept.join("\r\n").trim_end_matches(['\r', '\n']).to_string())
    }

    /// Block with every `name:` line removed and `name: value` appended.
    pub fn replacing(&self, name: &str, value: &str) -> Self {
        let mut out = String::new();
        for line in self.lines() {
            let header_name = line.split(':').next().unwrap_or("").trim();
            if line.contains(':') && header_name.eq_ignore_ascii_case(name) {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\r\n");
            }
            out.push_str(line);
        }
        let mut out = out.trim_end_matches(['\r', '\n']).to_string();
        if !out.is_empty() {
            out.push_str("\r\n");
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        Self(out)
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn line_has_name(line: &str, name: &str) -> bool {
    starts_with_ignore_case(line, name) && line[name.len()..].starts_with(':')
}

/// One request as the engine will send it. Rebuilt, never mutated, for each retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: Method,
    /// Protocol token sent on the request line and expected back on the status line.
    pub version: String,
    /// Endpoint the socket connects to.
    pub target: Target,
    /// Request URI as given: an origin path, or an absolute URI (CONNECT / proxy GET).
    pub request_uri: String,
    pub headers: HeaderBlock,
    pub accept_gzip: bool,
    pub save_body: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, target: Target, request_uri: impl Into<String>) -> Self {
        let request_uri = request_uri.into();
        let request_uri = if request_uri.trim().is_empty() {
            "/".to_string()
        } else {
            request_uri
        };
        Self {
            method,
            version: "HTTP/1.1".to_string(),
            target,
            request_uri,
            headers: HeaderBlock::default(),
            accept_gzip: false,
            save_body: false,
        }
    }

    /// Request for a URL, connecting to the URL's own host.
    pub fn from_url(method: Method, url: &str) -> Self {
        let target = Target::parse(url);
        let path = target.request_path().to_string();
        Self::new(method, target, path)
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn headers(mut self, headers: HeaderBlock) -> Self {
        self.headers = headers;
        self
    }

    pub fn accept_gzip(mut self, accept: bool) -> Self {
        self.accept_gzip = accept;
        self
    }

    pub fn save_body(mut self, save: bool) -> Self {
        self.save_body = save;
        self
    }

    /// Destination of a CONNECT bootstrap: method CONNECT with a request URI carrying its own scheme.
    pub fn connect_destination(&self) -> Option<Target> {
        if self.method == Method::Connect && self.request_uri.contains("://") {
            Some(Target::parse(&self.request_uri))
        } else {
            None
        }
    }

    /// Same request against a new endpoint and request URI (redirect hop).
    pub fn retargeted(&self, target: Target, request_uri: impl Into<String>) -> Self {
        Self {
            target,
            request_uri: request_uri.into(),
            ..self.clone()
        }
    }

    /// Same request with a different header block (auth retry).
    pub fn with_header_block(&self, headers: HeaderBlock) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    /// The GET sent inside an established tunnel to `destination`; `proxy-*` headers stay behind.
    pub fn tunneled(&self, destination: Target) -> Self {
        let path = destination.request_path().to_string();
        Self {
            method: Method::Get,
            request_uri: path,
            headers: self.headers.without_prefix("proxy-"),
            target: destination,
            ..self.clone()
        }
    }
}

/// Escape only what breaks the request line.
pub fn escape_request_uri(uri: &str) -> String {
    uri.replace(' ', "%20").replace('#', "%23")
}

/// Serialize request line and header block, terminated by the blank line.
pub fn write_request_head(request: &OutboundRequest, user_agent: &str) -> String {
    let mut head = String::with_capacity(256 + request.headers.as_str().len());
    let destination = request.connect_destination();
    match &destination {
        Some(dest) => {
            head.push_str(&format!("CONNECT {}/ {}\r\n", dest.authority(), request.version));
        }
        None => {
            head.push_str(&format!(
                "{} {} {}\r\n",
                request.method,
                escape_request_uri(&request.request_uri),
                request.version
            ));
        }
    }
    if !request.headers.contains("host") {
        let host = match &destination {
            Some(dest) => dest.authority(),
            None => request.target.authority(),
        };
        head.push_str(&format!("Host: {}\r\n", host));
    }
    if !request.headers.contains("user-agent") {
        head.push_str(&format!("User-Agent: {}\r\n", user_agent));
    }
    if request.accept_gzip && !request.headers.contains("accept-encoding") {
        head.push_str("Accept-Encoding: gzip\r\n");
    }
    head.push_str("Connection: close\r\n");
    let block = request.headers.as_str().trim_end_matches(['\r', '\n']);
    if !block.is_empty() {
        for line in block.split('\n') {
            head.push_str(line.strip_suffix('\r').unwrap_or(line));
            head.push_str("\r\n");
        }
    }
    head.push_str("\r\n");
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Test/1.0";

    fn count(head: &str, prefix: &str) -> usize {
        head.lines()
            .filter(|l| l.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()))
            .count()
    }

    #[test]
    fn origin_request_line_is_escaped() {
        let req = OutboundRequest::new(Method::Get, Target::new("example.com", 80, false, "/"), "/a b#frag");
        let head = write_request_head(&req, UA);
        assert!(head.starts_with("GET /a%20b%23frag HTTP/1.1\r\n"));
        assert_eq!(count(&head, "Host:"), 1);
        assert_eq!(count(&head, "User-Agent:"), 1);
        assert_eq!(count(&head, "Connection: close"), 1);
        assert_eq!(count(&head, "Accept-Encoding:"), 0);
        assert!(head.contains("Host: example.com\r\n"));
        assert!(head.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn caller_headers_suppress_synthesis() {
        let req = OutboundRequest::new(Method::Get, Target::new("10.0.0.1", 8080, false, "/"), "/")
            .headers(HeaderBlock::new("host: site.test\nUser-Agent: mine\nAccept-Encoding: br\n"))
            .accept_gzip(true);
        let head = write_request_head(&req, UA);
        assert_eq!(count(&head, "Host:"), 1);
        assert!(head.contains("host: site.test\r\n"));
        assert_eq!(count(&head, "User-Agent:"), 1);
        assert!(!head.contains("gzip"));
        assert!(head.ends_with("Accept-Encoding: br\r\n\r\n"));
    }

    #[test]
    fn gzip_and_non_default_port_host() {
        let req = OutboundRequest::new(Method::Get, Target::new("10.0.0.1", 8080, false, "/"), "/").accept_gzip(true);
        let head = write_request_head(&req, UA);
        assert!(head.contains("Host: 10.0.0.1:8080\r\n"));
        assert!(head.contains("Accept-Encoding: gzip\r\n"));
    }

    #[test]
    fn connect_bootstrap_line() {
        let proxy = Target::new("proxy.local", 3128, false, "/");
        let req = OutboundRequest::new(Method::Connect, proxy.clone(), "https://secure.test/index.html");
        let head = write_request_head(&req, UA);
        assert!(head.starts_with("CONNECT secure.test/ HTTP/1.1\r\n"));
        assert!(head.contains("Host: secure.test\r\n"));

        let req = OutboundRequest::new(Method::Connect, proxy, "http://plain.test:8080/x");
        let head = write_request_head(&req, UA);
        assert!(head.starts_with("CONNECT plain.test:8080/ HTTP/1.1\r\n"));
        assert!(head.contains("Host: plain.test:8080\r\n"));
    }

    #[test]
    fn connect_without_scheme_is_ordinary() {
        let req = OutboundRequest::new(Method::Connect, Target::new("proxy", 3128, false, "/"), "secure.test:443");
        assert!(req.connect_destination().is_none());
        assert!(write_request_head(&req, UA).starts_with("CONNECT secure.test:443 HTTP/1.1\r\n"));
    }

    #[test]
    fn tunneled_request_drops_proxy_headers() {
        let req = OutboundRequest::new(Method::Connect, Target::new("proxy", 3128, false, "/"), "https://secure.test/a")
            .headers(HeaderBlock::new("Proxy-Authorization: Basic eA==\r\nX-Trace: 1"));
        let dest = req.connect_destination().unwrap();
        let inner = req.tunneled(dest);
        assert_eq!(inner.method, Method::Get);
        assert_eq!(inner.request_uri, "/a");
        assert_eq!(inner.headers.as_str(), "X-Trace: 1");
        let head = write_request_head(&inner, UA);
        assert!(head.starts_with("GET /a HTTP/1.1\r\nHost: secure.test\r\n"));
    }

    #[test]
    fn replacing_removes_every_prior_value() {
        let block = HeaderBlock::new("Authorization: Basic old\nX-A: 1\nauthorization: Bearer t\n");
        let replaced = block.replacing("Authorization", "Basic new");
        assert_eq!(replaced.as_str(), "X-A: 1\r\nAuthorization: Basic new");
        assert_eq!(HeaderBlock::default().replacing("Authorization", "Basic z").as_str(), "Authorization: Basic z");
    }

    #[test]
    fn header_value_lookup() {
        let block = HeaderBlock::new("Host: a\r\nHost: b.example\r\nHostile: no");
        assert_eq!(block.value("host"), Some("b.example"));
        assert!(!block.contains("hostile-x"));
        assert!(block.contains("HOSTILE"));
    }

    #[test]
    fn method_parse_round_trips_unknown() {
        assert_eq!(Method::parse("connect"), Method::Connect);
        assert_eq!(Method::parse("PROPFIND").as_str(), "PROPFIND");
    }
}
