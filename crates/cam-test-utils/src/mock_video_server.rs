// mock_video_server: A mock per-camera stream-socket server.
//
// Captures the request URI of every accepted connection (so tests can assert
// the quality query parameter), pushes binary frames on demand, closes the
// current connection with a chosen code, and counts client-initiated closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Operations a test can apply to the currently connected client.
enum ServerOp {
    SendBinary(Vec<u8>),
    Close(u16),
}

#[derive(Default)]
struct ServerState {
    accepted: AtomicUsize,
    client_closes: AtomicUsize,
    reject_handshakes: AtomicBool,
    uris: Mutex<Vec<String>>,
    current: Mutex<Option<mpsc::UnboundedSender<ServerOp>>>,
}

/// A mock video-socket server for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address. The server
/// accepts any path; the full request URI of each connection is recorded so
/// tests can assert on `websocket_path` and the `quality` query parameter.
///
/// # Close accounting
///
/// [`client_close_count`] counts close frames *initiated by the client*.
/// When the server closes first (via [`close_current`]) the handler stops
/// reading immediately, so the client's protocol-level close ack is never
/// counted. This lets teardown tests assert "exactly one close".
///
/// [`client_close_count`]: MockVideoServer::client_close_count
/// [`close_current`]: MockVideoServer::close_current
pub struct MockVideoServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    /// Handle to the background accept loop; detached when the server drops.
    _task: tokio::task::JoinHandle<()>,
}

impl MockVideoServer {
    /// Start the mock server, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            accept_loop(listener, accept_state).await;
        });

        Ok(Self {
            addr,
            state,
            _task: task,
        })
    }

    /// Return the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the server, usable as the client's socket base URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Total connections accepted so far, including rejected handshakes.
    pub fn connection_count(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Close frames received from clients.
    pub fn client_close_count(&self) -> usize {
        self.state.client_closes.load(Ordering::SeqCst)
    }

    /// When set, new TCP connections are dropped before the WebSocket
    /// handshake completes, so client dials fail.
    pub fn set_reject_handshakes(&self, reject: bool) {
        self.state
            .reject_handshakes
            .store(reject, Ordering::SeqCst);
    }

    /// Request URIs of completed handshakes, oldest first, including path
    /// and query (e.g. `/ws/cameras/7/stream?quality=high`).
    pub async fn connected_uris(&self) -> Vec<String> {
        self.state.uris.lock().await.clone()
    }

    /// Push one binary frame to the currently connected client.
    pub async fn send_binary(
        &self,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.op(ServerOp::SendBinary(bytes.into())).await
    }

    /// Close the current connection with the given close code.
    pub async fn close_current(&self, code: u16) -> Result<(), Box<dyn std::error::Error>> {
        self.op(ServerOp::Close(code)).await
    }

    /// Wait until at least `n` connections have been accepted. Panics after
    /// five seconds so a hung test fails fast.
    pub async fn wait_for_connections(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connection_count() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} connections (got {})",
                self.connection_count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until at least `n` handshakes have completed and recorded URIs.
    pub async fn wait_for_uris(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connected_uris().await.len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} completed handshakes"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until at least `n` client-initiated close frames have arrived.
    pub async fn wait_for_client_closes(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.client_close_count() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} client closes (got {})",
                self.client_close_count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn op(&self, op: ServerOp) -> Result<(), Box<dyn std::error::Error>> {
        let guard = self.state.current.lock().await;
        let tx = guard.as_ref().ok_or("no client connected")?;
        tx.send(op).map_err(|_| "client connection gone")?;
        Ok(())
    }
}

/// Accept loop: counts dial attempts, registers the connection's operation
/// queue, and spawns a handler.
async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                state.accepted.fetch_add(1, Ordering::SeqCst);
                if state.reject_handshakes.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                // Registered before the handshake so tests can queue
                // operations as soon as the dial attempt is visible.
                let (op_tx, op_rx) = mpsc::unbounded_channel();
                *state.current.lock().await = Some(op_tx);
                let conn_state = Arc::clone(&state);
                tokio::spawn(async move {
                    // Connection errors are expected in tests (client drops,
                    // forced closes); swallow them.
                    let _ = handle_connection(stream, op_rx, conn_state).await;
                });
            }
            Err(_) => break,
        }
    }
}

/// Handle a single connection: capture the URI, apply test operations, and
/// count client-initiated closes.
async fn handle_connection(
    stream: TcpStream,
    mut op_rx: mpsc::UnboundedReceiver<ServerOp>,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut uri = String::new();
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, res: Response| {
        uri = req.uri().to_string();
        Ok(res)
    })
    .await?;
    state.uris.lock().await.push(uri);

    loop {
        tokio::select! {
            op = op_rx.recv() => match op {
                Some(ServerOp::SendBinary(bytes)) => {
                    ws.send(Message::Binary(bytes.into())).await?;
                }
                Some(ServerOp::Close(code)) => {
                    ws.close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    }))
                    .await?;
                    break;
                }
                None => break,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Close(_))) => {
                    state.client_closes.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    Ok(())
}
