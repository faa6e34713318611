//! Shared test fixtures: a canned single-connection HTTP backend.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Serve one canned HTTP 200 response per entry in `bodies`, in order, each
/// on its own connection. Every raw request is recorded for inspection.
pub async fn serve_script(bodies: Vec<String>) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test backend");
    let addr = listener.local_addr().expect("test backend addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for body in bodies {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        raw.extend_from_slice(&buf[..n]);
                        if request_complete(&raw) {
                            break;
                        }
                    }
                    Err(_) => return,
                }
            }
            let _ = tx.send(raw);

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.shutdown().await;
        }
    });

    (addr, rx)
}

fn request_complete(raw: &[u8]) -> bool {
    let Some(header_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let content_length = String::from_utf8_lossy(&raw[..header_end])
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

/// Parse the JSON body out of a recorded raw request.
pub fn request_body(raw: &[u8]) -> serde_json::Value {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("complete request")
        + 4;
    serde_json::from_slice(&raw[header_end..]).expect("JSON request body")
}
