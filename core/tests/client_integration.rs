/*
 * client_integration.rs
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

//! End-to-end legs against scripted loopback servers.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use httptester_core::protocol::http::{
    CredentialPrompt, CredentialReply, CredentialRequest, Credentials, HeaderBlock, Method, OutboundRequest,
    Outcome,
};
use httptester_core::{ClientConfig, HttpClient, HttpError, Session, Target};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Read one request head (through the blank line) from the server side.
async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.unwrap();
        if n == 0 {
            break;
        }
        head.push_str(&line);
        if line.trim().is_empty() {
            break;
        }
    }
    head
}

/// Serve one canned response per accepted connection; yields the request heads received.
async fn serve(responses: Vec<Vec<u8>>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut heads = Vec::new();
        for response in responses {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            heads.push(read_head(&mut reader).await);
            let socket = reader.get_mut();
            // The client may hang up once it has the head; unread body bytes can reset the socket.
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
        heads
    });
    (addr, handle)
}

/// Server side TLS with the self-signed `localhost` fixture (SANs: localhost, secure.test, 127.0.0.1).
fn tls_acceptor() -> TlsAcceptor {
    let cert = CertificateDer::from(include_bytes!("fixtures/localhost.cert.der").to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        include_bytes!("fixtures/localhost.key.der").to_vec(),
    ));
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

const DEADLINE: Duration = Duration::from_secs(10);

fn client_with(downloads: &std::path::Path, prompt: Option<Arc<dyn CredentialPrompt>>) -> HttpClient {
    let config = ClientConfig {
        downloads_dir: downloads.to_path_buf(),
        ..ClientConfig::default()
    };
    let session = match prompt {
        Some(p) => Session::new(config, p),
        None => Session::headless(config),
    };
    HttpClient::new(session)
}

fn get(addr: SocketAddr, path: &str) -> OutboundRequest {
    OutboundRequest::new(Method::Get, Target::new(addr.ip().to_string(), addr.port(), false, path), path)
}

/// Answers every challenge with fixed credentials and records the realm shown.
struct FixedPrompt {
    realms: Mutex<Vec<Option<String>>>,
}

impl CredentialPrompt for FixedPrompt {
    fn request_credentials(&self, request: CredentialRequest) -> oneshot::Receiver<CredentialReply> {
        self.realms.lock().unwrap().push(request.realm.clone());
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(CredentialReply::Provided(Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }));
        rx
    }
}

#[tokio::test]
async fn relative_redirect_follows_on_same_host() {
    init_logging();
    let (addr, server) = serve(vec![
        b"HTTP/1.1 302 Found\r\nLocation: /new\r\nLocation: /ignored\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nmoved here".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = get(addr, "/old").headers(HeaderBlock::new("X-Trace: 7"));
    let exchange = client.execute(request).await.unwrap();
    let heads = server.await.unwrap();

    assert_eq!(exchange.outcome, Outcome::Completed);
    assert_eq!(exchange.legs.len(), 2);
    assert!(heads[0].starts_with("GET /old HTTP/1.1\r\n"));
    assert!(heads[1].starts_with("GET /new HTTP/1.1\r\n"));
    assert!(heads[1].contains("X-Trace: 7\r\n"));
    assert!(exchange.transcript().starts_with("HTTP/1.1 302 Found\n"));
    assert_eq!(exchange.response().unwrap().status.code, "200");
}

#[tokio::test]
async fn absolute_redirect_switches_host() {
    init_logging();
    let (second, second_server) = serve(vec![b"HTTP/1.1 200 OK\r\n\r\n".to_vec()]).await;
    let location = format!("http://127.0.0.1:{}/x", second.port());
    let first_response = format!("HTTP/1.1 301 Moved Permanently\r\nLocation: {}\r\n\r\n", location);
    let (first, first_server) = serve(vec![first_response.into_bytes()]).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(first, "/start")).await.unwrap();

    assert_eq!(exchange.outcome, Outcome::Completed);
    assert_eq!(first_server.await.unwrap().len(), 1);
    let heads = second_server.await.unwrap();
    assert!(heads[0].starts_with("GET /x HTTP/1.1\r\n"));
    assert!(heads[0].contains(&format!("Host: 127.0.0.1:{}\r\n", second.port())));
}

#[tokio::test]
async fn non_ascii_location_is_sent_unchanged() {
    let (addr, server) = serve(vec![
        b"HTTP/1.1 302 Found\r\nLocation: /caf\xc3\xa9\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/old")).await.unwrap();
    let heads = server.await.unwrap();
    assert_eq!(exchange.outcome, Outcome::Completed);
    assert!(heads[1].starts_with("GET /caf\u{e9} HTTP/1.1\r\n"), "{:?}", heads[1]);
}

#[tokio::test]
async fn redirect_without_location_stops() {
    let (addr, server) = serve(vec![b"HTTP/1.1 302 Found\r\n\r\nbody".to_vec()]).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/").save_body(true)).await.unwrap();
    server.await.unwrap();
    assert_eq!(exchange.outcome, Outcome::RedirectWithoutLocation);
    assert!(exchange.body.is_none());
}

#[tokio::test]
async fn redirect_loop_hits_hop_limit() {
    let loop_response = b"HTTP/1.1 307 Temporary Redirect\r\nLocation: /again\r\n\r\n".to_vec();
    let (addr, server) = serve(vec![loop_response.clone(), loop_response.clone(), loop_response]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        max_hops: 2,
        downloads_dir: dir.path().to_path_buf(),
        ..ClientConfig::default()
    };
    let client = HttpClient::new(Session::headless(config));
    let err = client.execute(get(addr, "/")).await.unwrap_err();
    assert!(matches!(err, HttpError::TooManyHops { limit: 2 }));
    assert_eq!(server.await.unwrap().len(), 3);
}

#[tokio::test]
async fn chunked_gzip_body_is_saved() {
    init_logging();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"hello world").unwrap();
    let gz = encoder.finish().unwrap();
    let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
    response.extend_from_slice(format!("{:x}\r\n", gz.len()).as_bytes());
    response.extend_from_slice(&gz);
    response.extend_from_slice(b"\r\n0\r\n\r\n");
    let (addr, server) = serve(vec![response]).await;

    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = get(addr, "/greeting.txt?lang=en").save_body(true).accept_gzip(true);
    let exchange = client.execute(request).await.unwrap();
    let heads = server.await.unwrap();

    assert!(heads[0].contains("Accept-Encoding: gzip\r\n"));
    assert_eq!(exchange.body.as_deref(), Some(&b"hello world"[..]));
    let saved = exchange.saved_to.expect("saved");
    assert_eq!(saved.file_name().unwrap(), "greeting.txt");
    assert_eq!(std::fs::read(saved).unwrap(), b"hello world");
}

#[tokio::test]
async fn invalid_gzip_is_kept_verbatim() {
    let (addr, server) = serve(vec![
        b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\nnot gzip at all".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/raw.bin").save_body(true)).await.unwrap();
    server.await.unwrap();
    assert_eq!(exchange.body.as_deref(), Some(&b"not gzip at all"[..]));
    assert_eq!(std::fs::read(exchange.saved_to.unwrap()).unwrap(), b"not gzip at all");
}

#[tokio::test]
async fn body_is_not_read_unless_saving() {
    let (addr, server) = serve(vec![b"HTTP/1.1 200 OK\r\n\r\nignored".to_vec()]).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/")).await.unwrap();
    server.await.unwrap();
    assert!(exchange.body.is_none());
    assert!(exchange.saved_to.is_none());
}

#[tokio::test]
async fn basic_auth_retries_once_with_credentials() {
    init_logging();
    let (addr, server) = serve(vec![
        b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"x\"\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let prompt = Arc::new(FixedPrompt {
        realms: Mutex::new(Vec::new()),
    });
    let client = client_with(dir.path(), Some(prompt.clone() as Arc<dyn CredentialPrompt>));
    let request = get(addr, "/private").headers(HeaderBlock::new("Authorization: Basic b2xkOm9sZA==\nX-A: 1"));
    let exchange = client.execute(request).await.unwrap();
    let heads = server.await.unwrap();

    assert_eq!(exchange.outcome, Outcome::Completed);
    assert_eq!(heads.len(), 2);
    assert!(heads[1].contains("Authorization: Basic YWRtaW46c2VjcmV0\r\n"));
    assert_eq!(heads[1].matches("Authorization:").count(), 1);
    assert!(heads[1].contains("X-A: 1\r\n"));
    assert_eq!(*prompt.realms.lock().unwrap(), vec![Some("x".to_string())]);
}

#[tokio::test]
async fn second_challenge_is_not_retried() {
    let challenge = b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"x\"\r\n\r\n".to_vec();
    let (addr, server) = serve(vec![challenge.clone(), challenge]).await;
    let dir = tempfile::tempdir().unwrap();
    let prompt = Arc::new(FixedPrompt {
        realms: Mutex::new(Vec::new()),
    });
    let client = client_with(dir.path(), Some(prompt as Arc<dyn CredentialPrompt>));
    let exchange = client.execute(get(addr, "/private")).await.unwrap();
    assert_eq!(server.await.unwrap().len(), 2);
    assert_eq!(exchange.outcome, Outcome::AuthRejected);
}

#[tokio::test]
async fn cancelled_prompt_abandons_request() {
    let (addr, server) = serve(vec![
        b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"x\"\r\n\r\nsecret page".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/private").save_body(true)).await.unwrap();
    server.await.unwrap();
    assert_eq!(exchange.outcome, Outcome::AuthCancelled);
    assert!(exchange.saved_to.is_none());
}

#[tokio::test]
async fn non_basic_challenge_is_terminal() {
    let (addr, server) = serve(vec![
        b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Digest realm=\"x\", nonce=\"1\"\r\n\r\n".to_vec(),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/")).await.unwrap();
    server.await.unwrap();
    assert_eq!(
        exchange.outcome,
        Outcome::AuthUnsupported {
            scheme: "Digest".to_string()
        }
    );
}

#[tokio::test]
async fn connect_tunnel_to_plain_destination() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let connect = read_head(&mut reader).await;
        reader
            .get_mut()
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .unwrap();
        let inner = read_head(&mut reader).await;
        let socket = reader.get_mut();
        socket.write_all(b"HTTP/1.1 200 OK\r\n\r\ntunnelled").await.unwrap();
        let _ = socket.shutdown().await;
        (connect, inner)
    });

    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = OutboundRequest::new(
        Method::Connect,
        Target::new(proxy.ip().to_string(), proxy.port(), false, "/"),
        "http://example.test:8080/inner",
    )
    .headers(HeaderBlock::new("Proxy-Authorization: Basic eDp5\nX-Keep: 1"))
    .save_body(true);
    let exchange = client.execute(request).await.unwrap();
    let (connect, inner) = server.await.unwrap();

    assert!(connect.starts_with("CONNECT example.test:8080/ HTTP/1.1\r\n"));
    assert!(connect.contains("Host: example.test:8080\r\n"));
    assert!(connect.contains("Proxy-Authorization: Basic eDp5\r\n"));
    assert!(inner.starts_with("GET /inner HTTP/1.1\r\n"));
    assert!(!inner.contains("Proxy-Authorization"));
    assert!(inner.contains("X-Keep: 1\r\n"));
    assert_eq!(exchange.legs.len(), 2);
    assert_eq!(exchange.legs[1].target.host(), "example.test");
    assert_eq!(exchange.body.as_deref(), Some(&b"tunnelled"[..]));
}

#[tokio::test]
async fn protocol_mismatch_skips_body() {
    let (addr, server) = serve(vec![b"HTTP/1.0 200 OK\r\n\r\nbody".to_vec()]).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let exchange = client.execute(get(addr, "/").save_body(true)).await.unwrap();
    server.await.unwrap();
    assert_eq!(
        exchange.outcome,
        Outcome::ProtocolMismatch {
            expected: "HTTP/1.1".to_string(),
            received: "HTTP/1.0".to_string(),
        }
    );
    assert!(exchange.body.is_none());
    assert_eq!(exchange.transcript(), "HTTP/1.0 200 OK\n");
}

#[tokio::test]
async fn unresolved_host_becomes_text() {
    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = OutboundRequest::new(
        Method::Get,
        Target::new("no-such-host.invalid", 80, false, "/"),
        "/",
    );
    let text = client.execute_to_text(request).await;
    assert_eq!(
        text,
        "Failed to connect to server \"no-such-host.invalid:80\": Address is unresolved"
    );
}

#[tokio::test]
async fn headers_are_reported_before_body_is_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        read_head(&mut reader).await;
        let socket = reader.get_mut();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n")
            .await
            .unwrap();
        // Body only once the client has reported the head.
        let _ = release_rx.await;
        socket.write_all(b"late body").await.unwrap();
        let _ = socket.shutdown().await;
    });

    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let mut release = Some(release_tx);
    let request = get(addr, "/late.txt").save_body(true);
    let exchange = timeout(
        DEADLINE,
        client.execute_observed(request, move |text: &str| {
            seen_in.lock().unwrap().push(text.to_string());
            if let Some(tx) = release.take() {
                let _ = tx.send(());
            }
        }),
    )
    .await
    .expect("head was not reported before the body")
    .unwrap();
    server.await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["HTTP/1.1 200 OK\nContent-Type: text/plain\n".to_string()]
    );
    assert_eq!(exchange.body.as_deref(), Some(&b"late body"[..]));
}

#[tokio::test]
async fn https_target_accepts_self_signed_certificate() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = tls_acceptor();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let tls = acceptor.accept(socket).await.unwrap();
        let mut reader = BufReader::new(tls);
        let head = read_head(&mut reader).await;
        let tls = reader.get_mut();
        tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nover tls")
            .await
            .unwrap();
        let _ = tls.shutdown().await;
        head
    });

    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = OutboundRequest::new(
        Method::Get,
        Target::new("127.0.0.1", addr.port(), true, "/secure.txt"),
        "/secure.txt",
    )
    .save_body(true);
    let exchange = timeout(DEADLINE, client.execute(request)).await.expect("timed out").unwrap();
    let head = server.await.unwrap();

    assert!(head.starts_with("GET /secure.txt HTTP/1.1\r\n"));
    assert!(head.contains(&format!("Host: 127.0.0.1:{}\r\n", addr.port())));
    assert_eq!(exchange.outcome, Outcome::Completed);
    assert_eq!(exchange.body.as_deref(), Some(&b"over tls"[..]));
}

#[tokio::test]
async fn connect_tunnel_upgrades_same_socket_to_tls() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let acceptor = tls_acceptor();
    // One accept only: a second TCP connection from the client would never be served.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let connect = read_head(&mut reader).await;
        reader
            .get_mut()
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .unwrap();
        let tls = acceptor.accept(reader.into_inner()).await.unwrap();
        let sni = tls.get_ref().1.server_name().map(str::to_string);
        let mut reader = BufReader::new(tls);
        let inner = read_head(&mut reader).await;
        let tls = reader.get_mut();
        tls.write_all(b"HTTP/1.1 200 OK\r\n\r\nsecret").await.unwrap();
        let _ = tls.shutdown().await;
        (connect, inner, sni)
    });

    let dir = tempfile::tempdir().unwrap();
    let client = client_with(dir.path(), None);
    let request = OutboundRequest::new(
        Method::Connect,
        Target::new(proxy.ip().to_string(), proxy.port(), false, "/"),
        "https://secure.test/inner",
    )
    .headers(HeaderBlock::new("Proxy-Connection: keep-alive"))
    .save_body(true);
    let exchange = timeout(DEADLINE, client.execute(request)).await.expect("timed out").unwrap();
    let (connect, inner, sni) = server.await.unwrap();

    assert!(connect.starts_with("CONNECT secure.test/ HTTP/1.1\r\n"));
    assert_eq!(sni.as_deref(), Some("secure.test"));
    assert!(inner.starts_with("GET /inner HTTP/1.1\r\n"));
    assert!(inner.contains("Host: secure.test\r\n"));
    assert!(!inner.contains("Proxy-Connection"));
    assert_eq!(exchange.legs.len(), 2);
    assert!(exchange.legs[1].target.is_ssl());
    assert_eq!(exchange.body.as_deref(), Some(&b"secret"[..]));
}
