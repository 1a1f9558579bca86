//! In-process streaming HTTP server for exercising the client.
//!
//! Serves one connection at a time, the way a real event-stream endpoint
//! holds a single long-lived response per subscriber. Tests drive the body
//! through commands: push bytes, or drop the active connection to force the
//! client into its reconnect path. Request heads are recorded so tests can
//! assert on resume headers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug)]
enum Command {
    Send(String),
    DropConnection,
}

/// Request head captured from an incoming connection.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub last_event_id: Option<String>,
    pub accept: Option<String>,
    pub cache_control: Option<String>,
    pub authorization: Option<String>,
    pub at: Option<Instant>,
}

pub struct ServerConfig {
    /// Content type served on every response.
    pub content_type: String,
    /// Status code for served requests.
    pub status: u16,
    /// Requests answered with a stream before the server starts replying
    /// 204 No Content.
    pub max_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            content_type: EVENT_STREAM.to_string(),
            status: 200,
            max_requests: 1,
        }
    }
}

pub struct StreamServer {
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StreamServer {
    pub async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let command_rx = Arc::new(Mutex::new(command_rx));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut remaining = config.max_requests;
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                serve_connection(socket, &config, &mut remaining, &recorded, &command_rx).await;
            }
        });

        Self {
            addr,
            commands,
            requests,
        }
    }

    pub async fn start_default() -> Self {
        Self::start(ServerConfig::default()).await
    }

    pub fn url(&self) -> reqwest::Url {
        format!("http://{}/", self.addr)
            .parse()
            .expect("test server url")
    }

    /// Pushes raw bytes onto the active (or next) streamed response body.
    pub fn send(&self, payload: impl Into<String>) {
        let _ = self.commands.send(Command::Send(payload.into()));
    }

    /// Pushes bytes and then drops the connection, forcing the client to
    /// observe end of stream.
    pub fn send_and_close(&self, payload: impl Into<String>) {
        self.send(payload);
        self.drop_connection();
    }

    /// Drops the active streamed connection.
    pub fn drop_connection(&self) {
        let _ = self.commands.send(Command::DropConnection);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

async fn serve_connection(
    socket: TcpStream,
    config: &ServerConfig,
    remaining: &mut usize,
    recorded: &Arc<Mutex<Vec<RecordedRequest>>>,
    command_rx: &Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
) {
    let (mut reader, mut writer) = socket.into_split();

    let request = read_request_head(&mut reader).await;
    recorded.lock().await.push(request);

    if *remaining == 0 {
        let head = format!(
            "HTTP/1.1 204 No Content\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
            config.content_type
        );
        let _ = writer.write_all(head.as_bytes()).await;
        return;
    }
    *remaining -= 1;

    if config.status != 200 {
        let head = format!(
            "HTTP/1.1 {} Nope\r\ncontent-type: {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            config.status, config.content_type
        );
        let _ = writer.write_all(head.as_bytes()).await;
        return;
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        config.content_type
    );
    if writer.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = writer.flush().await;

    let mut commands = command_rx.lock().await;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    if writer.write_all(payload.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = writer.flush().await;
                }
                Some(Command::DropConnection) | None => return,
            },
            _ = wait_for_disconnect(&mut reader) => return,
        }
    }
}

async fn wait_for_disconnect(reader: &mut OwnedReadHalf) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn read_request_head(reader: &mut OwnedReadHalf) -> RecordedRequest {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head);
    let mut request = RecordedRequest {
        at: Some(Instant::now()),
        ..RecordedRequest::default()
    };
    for line in head.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match name.to_ascii_lowercase().as_str() {
            "last-event-id" => request.last_event_id = Some(value),
            "accept" => request.accept = Some(value),
            "cache-control" => request.cache_control = Some(value),
            "authorization" => request.authorization = Some(value),
            _ => {}
        }
    }
    request
}
