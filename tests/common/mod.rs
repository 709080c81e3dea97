//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use route_gateway::config::GatewayConfig;
use route_gateway::http::HttpServer;
use route_gateway::lifecycle::Shutdown;

/// A request as the mock backend received it.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Received {
    /// Values of `name` (case-insensitive) in arrival order.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// What the mock backend answers.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Requests seen by a backend, shared with the test.
pub type Log = Arc<Mutex<Vec<Received>>>;

/// Start a programmable backend on an ephemeral port.
///
/// `respond` gets the zero-based call number and the received request.
pub async fn start_backend<F, Fut>(respond: F) -> (SocketAddr, Log)
where
    F: Fn(usize, Received) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::default();
    let respond = Arc::new(respond);

    let seen = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let respond = respond.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let _ = serve(socket, respond.as_ref(), &seen).await;
            });
        }
    });

    (addr, log)
}

/// A backend that always answers 200 with `body`.
pub async fn start_fixed_backend(body: &'static str) -> (SocketAddr, Log) {
    start_backend(move |_, _| async move { Reply::new(200, body) }).await
}

async fn serve<F, Fut>(mut socket: TcpStream, respond: &F, seen: &Log) -> std::io::Result<()>
where
    F: Fn(usize, Received) -> Fut,
    Fut: Future<Output = Reply>,
{
    let mut buf = Vec::new();
    let head_end = loop {
        let mut chunk = [0u8; 4096];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end..].to_vec();
    while body.len() < length {
        let mut chunk = [0u8; 4096];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let received = Received {
        method,
        path,
        headers,
        body,
    };
    let call = {
        let mut seen = seen.lock().unwrap();
        seen.push(received.clone());
        seen.len() - 1
    };

    let reply = respond(call, received).await;
    let mut response = format!("HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n", reply.status, reply.body.len());
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Parse a TOML configuration, substituting `{backend}` with `backend`.
pub fn config(toml_str: &str, backend: SocketAddr) -> GatewayConfig {
    toml::from_str(&toml_str.replace("{backend}", &backend.to_string())).unwrap()
}

/// A client that does not reuse connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
