//! Local HTTP server answering with canned responses
//!
//! Routes are matched on the request path with the query string stripped.
//! Unknown paths answer 404. Each connection serves one request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::settings::CatalogSettings;

type Routes = Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>;

pub struct TestServer {
    addr: SocketAddr,
    routes: Routes,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();

        let served = routes.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(answer(socket, served.clone()));
            }
        });

        Self { addr, routes }
    }

    pub fn route(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .insert(path.to_string(), (status, body.into()));
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Catalog endpoints at `/search`, `/play` and `/lyrics`
    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            search_url: self.url("/search"),
            play_url: self.url("/play"),
            lyric_url: self.url("/lyrics"),
            request_timeout_secs: 5,
            download_timeout_secs: 5,
            ..Default::default()
        }
    }
}

async fn answer(mut socket: TcpStream, routes: Routes) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request);
    let path = request
        .split_whitespace()
        .nth(1)
        .and_then(|target| target.split('?').next())
        .unwrap_or("/");
    let (status, body) = routes
        .lock()
        .get(path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));

    let reason = if status == 200 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&body).await;
    let _ = socket.shutdown().await;
}
