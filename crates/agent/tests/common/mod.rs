//! Common test utilities for integration tests.
//!
//! Integration tests run against an in-memory SQLite database and, where a
//! remote endpoint is involved, a minimal canned HTTP responder.

// Allow dead code in this module - these are helper utilities that may not
// be used by all integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use sqlx::SqlitePool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use phone_tracker_agent::registry::DeviceRegistry;

/// Freshness window used by test registries.
pub const TEST_FRESHNESS_MINUTES: i64 = 15;

/// Create an in-memory pool with migrations applied.
pub async fn setup_pool() -> SqlitePool {
    let pool = persistence::db::create_test_pool()
        .await
        .expect("Failed to create in-memory pool");

    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Registry over the given pool with the standard test freshness window.
pub fn test_registry(pool: SqlitePool) -> Arc<DeviceRegistry> {
    Arc::new(DeviceRegistry::new(
        pool,
        Duration::minutes(TEST_FRESHNESS_MINUTES),
    ))
}

/// Build a complete HTTP/1.1 response with the given status line and body.
pub fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Spawn a canned HTTP endpoint answering every request with `response`.
///
/// Returns the bound address and a channel yielding each received request
/// body, so tests can assert on what was actually sent over the wire.
pub async fn spawn_stub_endpoint(response: String) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub endpoint");
    let addr = listener.local_addr().expect("stub endpoint address");
    let (body_tx, body_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let response = response.clone();
            let body_tx = body_tx.clone();
            tokio::spawn(async move {
                if let Some(body) = handle_request(socket, &response).await {
                    let _ = body_tx.send(body);
                }
            });
        }
    });

    (addr, body_rx)
}

/// Spawn an endpoint that accepts connections but never responds, for
/// timeout tests.
pub async fn spawn_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind black hole");
    let addr = listener.local_addr().expect("black hole address");

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            // keep the socket open without ever answering
            held.push(socket);
        }
    });

    addr
}

async fn handle_request(mut socket: TcpStream, response: &str) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // read until the end of headers
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    // then drain the body per Content-Length
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();

    socket.write_all(response.as_bytes()).await.ok()?;
    socket.shutdown().await.ok();
    Some(body)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
