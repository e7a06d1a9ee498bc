//! End-to-end relay tests.
//!
//! Each test boots the full Pingora service on a loopback port, talks to it
//! over a raw TCP socket, and (where relevant) stands up a stub upstream so
//! we can assert on what actually crossed the wire in both directions.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;

use imgrelay::config::RelayConfig;
use imgrelay::proxy::RelayProxy;

/// Stub origin that answers every connection with one canned response and
/// records what it was asked.
struct StubUpstream {
    port: u16,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubUpstream {
    fn spawn(response: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let conn_count = Arc::clone(&connections);
        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                conn_count.fetch_add(1, Ordering::SeqCst);
                stream
                    .set_read_timeout(Some(Duration::from_secs(5)))
                    .unwrap();

                // Read just the request head; the relay never sends a body
                let mut head = Vec::new();
                let mut byte = [0u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    match stream.read(&mut byte) {
                        Ok(1) => head.push(byte[0]),
                        _ => break,
                    }
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).to_string());

                let _ = stream.write_all(&response);
            }
        });

        StubUpstream {
            port,
            connections,
            requests,
        }
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn first_request(&self) -> String {
        self.requests.lock().unwrap().first().cloned().unwrap_or_default()
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Boot the relay against the given upstream port and return the port it
/// listens on. The server thread runs for the remainder of the process.
fn spawn_relay(upstream_port: u16) -> u16 {
    let port = free_port();
    let yaml = format!(
        r#"
server:
  address: "127.0.0.1"
  port: {port}

upstream:
  base_url: "http://127.0.0.1:{upstream_port}"
  auth_token: "stub-token"
  timeout: 2

bucket_whitelist:
  - assets
"#
    );

    let config = RelayConfig::from_yaml_with_env(&yaml).unwrap();
    config.validate().unwrap();
    let proxy = RelayProxy::new(config).unwrap();

    thread::spawn(move || {
        let mut server = Server::new(Some(Opt::default())).unwrap();
        server.bootstrap();

        let mut service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
        service.add_tcp(&format!("127.0.0.1:{}", port));
        server.add_service(service);
        server.run_forever();
    });

    // Wait for the listener to come up
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return port;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("relay did not start listening on port {}", port);
}

/// One-shot HTTP/1.1 exchange. Returns (status, lowercased head, body).
fn http_request(port: u16, method: &str, target: &str) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        method, target
    )
    .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();

    let head_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&raw[..head_end]).to_lowercase();
    let body = raw[head_end + 4..].to_vec();
    let status: u16 = head
        .lines()
        .next()
        .unwrap()
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();

    (status, head, body)
}

#[test]
fn test_relay_streams_upstream_body_unchanged() {
    let image: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
    let mut response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: image/png\r\n\
         Content-Length: {}\r\n\
         Server: stub-origin\r\n\
         Connection: close\r\n\r\n",
        image.len()
    )
    .into_bytes();
    response.extend_from_slice(&image);

    let upstream = StubUpstream::spawn(response);
    let relay_port = spawn_relay(upstream.port);

    let (status, head, body) = http_request(
        relay_port,
        "GET",
        "/_next/imgproxy?src=assets%2Fphotos%2Fcat.png&params=w:300",
    );

    assert_eq!(status, 200);
    assert_eq!(body, image);
    assert!(head.contains("content-type: image/png"));
    assert!(head.contains("x-request-id:"));
    // Origin-identifying headers never reach the client
    assert!(!head.contains("stub-origin"));

    assert_eq!(upstream.connection_count(), 1);
    let forwarded = upstream.first_request();
    assert!(forwarded.starts_with("GET /w:300/plain/s3://assets/photos/cat.png HTTP/1.1"));
    assert!(forwarded
        .to_lowercase()
        .contains("authorization: bearer stub-token"));
}

#[test]
fn test_rejected_request_makes_no_outbound_call() {
    let upstream = StubUpstream::spawn(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec());
    let relay_port = spawn_relay(upstream.port);

    // Malformed source: no object key
    let (status, _, body) = http_request(relay_port, "GET", "/_next/imgproxy?src=assets");
    assert_eq!(status, 400);
    assert!(body.is_empty());

    // Unknown path
    let (status, _, body) = http_request(relay_port, "GET", "/favicon.ico");
    assert_eq!(status, 404);
    assert!(body.is_empty());

    assert_eq!(upstream.connection_count(), 0);
}

#[test]
fn test_refused_upstream_returns_plain_500() {
    // Nothing listens on this port
    let relay_port = spawn_relay(free_port());

    let (status, _, body) = http_request(
        relay_port,
        "GET",
        "/_next/imgproxy?src=assets%2Fcat.png",
    );

    assert_eq!(status, 500);
    assert!(body.is_empty());
}

#[test]
fn test_non_get_methods_are_rejected() {
    let upstream = StubUpstream::spawn(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec());
    let relay_port = spawn_relay(upstream.port);

    for method in ["POST", "HEAD", "DELETE"] {
        let (status, _, _) = http_request(relay_port, method, "/_next/imgproxy?src=assets%2Fa.png");
        assert_eq!(status, 405, "{} should be rejected", method);
    }

    assert_eq!(upstream.connection_count(), 0);
}
